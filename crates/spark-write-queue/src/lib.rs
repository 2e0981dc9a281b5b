#![doc = r#"
# spark-write-queue

## 设计动机（Why）
- **定位**：该 crate 位于应用写入与反应器（事件循环）之间，为每条非阻塞连接提供异步写队列：
  任意多个生产者可以并发写入同一连接，调用线程永不因套接字可写性而阻塞。
- **架构角色**：套接字写原语、可写通知与任务执行上下文都是外部协作者，
  以 [`WriteSocket`] 与 [`Reactor`] 两个 trait 接入；默认特性 `runtime-tokio` 提供 Tokio 适配。
- **设计理念**：强调“消息边界完整”“积压有界”“通知恰好一次”“栈深有界”四条约束，
  其余策略（重试、连接失效判定）一律交给调用方。

## 核心契约（What）
- [`AsyncQueueWriter::write`]：背压检查 → 空队列直写 → 剩余部分入队；失败同步返回，
  若附带 [`CompletionHandler`] 则同时收到 `failed`；
- [`AsyncQueueWriter::on_writable`]：反应器报告可写时从队首排空，逐条触发完成回调，
  并在每个有进展的步骤之后求值 [`QueueMonitor`]；
- [`TaskQueue`]：单连接 FIFO，`space_in_bytes` 恒等于排队消息未写出字节之和；
- 连接关闭时所有排队消息以 [`WriteQueueError::Closed`] 失败。

## 实现策略（How）
- **写权**：队列锁内的单一写权标记保证同一时刻只有一个上下文触碰套接字；
  直写只在队列为空时发生，未写完的剩余部分放回队首，字节按接受顺序上线；
- **背压**：入口读取原子积压计数与上限比较，属于软约束，并发下可能瞬时超出一条在途消息；
- **重入上限**：线程局部计数记录写入嵌套深度，超出上限的完成回调交给反应器的任务执行上下文（蹦床）。

## 风险与考量（Trade-offs）
- 完成回调与监视器回调可能运行在生产者线程、排空线程或任务执行上下文中，须避免长时间阻塞；
- 排空时的 IO 失败只失败在途消息，是否关闭连接由连接层决定。
"#]

mod address;
mod config;
mod connection;
mod error;
mod message;
mod monitor;
mod reentrant;
#[cfg(feature = "runtime-tokio")]
mod runtime_tokio;
mod sync;
mod task_queue;
mod writer;

pub use address::TransportSocketAddr;
pub use config::{DEFAULT_MAX_WRITE_REENTRANTS, UNLIMITED_PENDING_BYTES, WriteQueueConfig};
pub use connection::{Connection, ConnectionId, Reactor, Task, WriteSocket};
pub use error::{ErrorCategory, Result, WriteQueueError};
pub use message::{CompletionHandler, FnCompletion, QueuedMessage, WriteResult};
pub use monitor::{FnMonitor, FreeSpaceMonitor, QueueMonitor, QueueSnapshot};
#[cfg(feature = "runtime-tokio")]
pub use runtime_tokio::{
    TokioReactor, TokioTcpSocket, TokioUdpSocket, tokio_tcp_connection, tokio_udp_connection,
};
pub use task_queue::TaskQueue;
pub use writer::{AsyncQueueWriter, WriteOutcome};
