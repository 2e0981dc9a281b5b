use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use crate::address::TransportSocketAddr;
use crate::sync::{AtomicBool, Ordering};
use crate::task_queue::TaskQueue;

/// 交给反应器任务执行上下文运行的任务。
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// 非阻塞写原语。
///
/// # 契约 (What)
/// - `try_write` 绝不阻塞：返回本次被套接字接受的字节数；
/// - `Ok(0)` 或 `ErrorKind::WouldBlock` 表示“当前不可写”，写队列会登记可写兴趣后返回；
/// - 其它错误视为传输层 IO 失败；
/// - `destination` 仅对无连接传输有意义，流式实现可以忽略。
pub trait WriteSocket: Send + Sync {
    fn try_write(
        &self,
        buf: &[u8],
        destination: Option<&TransportSocketAddr>,
    ) -> io::Result<usize>;
}

/// 反应器（事件循环）在写队列边界上暴露的能力。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 写队列自身不探测套接字可写性，也不拥有线程；两者都由外部反应器提供。
///
/// ## 契约 (What)
/// - `request_writable`：登记可写兴趣；套接字可写后反应器应调用
///   [`AsyncQueueWriter::on_writable`](crate::AsyncQueueWriter::on_writable)。重复登记允许合并；
/// - `execute`：在**另一个**执行上下文中运行任务，用于超过重入上限后延迟触发的完成回调；
/// - 两个方法都不得同步回调写队列，否则会重新引入递归。
pub trait Reactor: Send + Sync {
    fn request_writable(&self, connection: &Connection);

    fn execute(&self, task: Task);
}

/// 连接标识，仅用于日志与调试。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct ConnectionInner {
    id: ConnectionId,
    socket: Arc<dyn WriteSocket>,
    reactor: Arc<dyn Reactor>,
    queue: TaskQueue,
    paused: AtomicBool,
}

/// 单条连接的写侧句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把套接字写原语、反应器、写队列以及暂停状态绑定在一起，作为写入器各操作的统一入参；
/// - 暂停状态是显式的连接级状态，而非全局开关：测试与运维可以单独暂停某条连接以积压队列。
///
/// ## 契约（What）
/// - `Clone` 只复制 `Arc`，所有克隆共享同一个队列；
/// - 暂停期间不直写也不排空，生产者仍可在背压上限内入队；
/// - [`Connection::resume`] 只切换状态，排空需经由
///   [`AsyncQueueWriter::resume`](crate::AsyncQueueWriter::resume) 或反应器的下一次可写事件触发。
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn new(socket: Arc<dyn WriteSocket>, reactor: Arc<dyn Reactor>) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id: ConnectionId::next(),
                socket,
                reactor,
                queue: TaskQueue::new(),
                paused: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// 该连接的写队列。
    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    pub fn socket(&self) -> &Arc<dyn WriteSocket> {
        &self.inner.socket
    }

    pub fn reactor(&self) -> &Arc<dyn Reactor> {
        &self.inner.reactor
    }

    /// 暂停排空，返回此前是否处于运行状态。
    pub fn pause(&self) -> bool {
        !self.inner.paused.swap(true, Ordering::AcqRel)
    }

    /// 恢复排空，返回此前是否处于暂停状态。
    pub fn resume(&self) -> bool {
        self.inner.paused.swap(false, Ordering::AcqRel)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// 两个句柄是否指向同一条连接。
    pub fn same_connection(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("paused", &self.is_paused())
            .field("queue", &self.inner.queue)
            .finish()
    }
}
