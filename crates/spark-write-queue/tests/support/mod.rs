//! 写队列集成测试的共享桩件。
//!
//! # 教案级导览
//!
//! - **Why**：写队列的外部协作者（非阻塞套接字、反应器）在测试中需要可控：
//!   能够限定每次写入接受的字节数、模拟“不可写”与 IO 失败，并由测试线程显式驱动排空。
//! - **How**：[`MockSocket`] 以互斥状态记录上线字节与每次写入的目的地址，同时统计并发写者数量；
//!   [`ManualReactor`] 只记录可写兴趣，由测试调用 `pump` 触发排空，延迟任务交给独立的执行线程。
//! - **What**：所有桩件均为 `Send + Sync`，可在多线程场景中共享。
#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use spark_write_queue::{
    AsyncQueueWriter, Connection, Reactor, Task, TransportSocketAddr, WriteSocket,
};

#[derive(Default)]
struct SocketState {
    wire: Vec<u8>,
    writes: Vec<(Option<TransportSocketAddr>, Vec<u8>)>,
    chunk_limit: Option<usize>,
    blocked: bool,
    fail_next: Option<io::ErrorKind>,
}

/// 可编排容量的非阻塞套接字桩。
#[derive(Default)]
pub struct MockSocket {
    state: Mutex<SocketState>,
    active_writers: AtomicUsize,
    max_concurrent_writers: AtomicUsize,
}

impl MockSocket {
    /// 每次写入接受全部字节。
    pub fn unbounded() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 每次写入至多接受 `chunk` 字节，模拟发送缓冲区逐步腾空。
    pub fn with_chunk_limit(chunk: usize) -> Arc<Self> {
        let socket = Self::default();
        socket.state.lock().expect("socket lock").chunk_limit = Some(chunk);
        Arc::new(socket)
    }

    pub fn set_blocked(&self, blocked: bool) {
        self.state.lock().expect("socket lock").blocked = blocked;
    }

    pub fn fail_next(&self, kind: io::ErrorKind) {
        self.state.lock().expect("socket lock").fail_next = Some(kind);
    }

    /// 已上线的全部字节。
    pub fn wire(&self) -> Vec<u8> {
        self.state.lock().expect("socket lock").wire.clone()
    }

    /// 每次成功写入的目的地址与字节。
    pub fn writes(&self) -> Vec<(Option<TransportSocketAddr>, Vec<u8>)> {
        self.state.lock().expect("socket lock").writes.clone()
    }

    pub fn max_concurrent_writers(&self) -> usize {
        self.max_concurrent_writers.load(Ordering::SeqCst)
    }
}

impl WriteSocket for MockSocket {
    fn try_write(
        &self,
        buf: &[u8],
        destination: Option<&TransportSocketAddr>,
    ) -> io::Result<usize> {
        let active = self.active_writers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_writers.fetch_max(active, Ordering::SeqCst);
        thread::yield_now();

        let result = {
            let mut state = self.state.lock().expect("socket lock");
            if let Some(kind) = state.fail_next.take() {
                Err(io::Error::from(kind))
            } else if state.blocked {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            } else {
                let accepted = state.chunk_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
                state.wire.extend_from_slice(&buf[..accepted]);
                state
                    .writes
                    .push((destination.copied(), buf[..accepted].to_vec()));
                Ok(accepted)
            }
        };

        self.active_writers.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// 由测试显式驱动的反应器。
pub struct ManualReactor {
    pending: Mutex<Vec<Connection>>,
    requests: AtomicUsize,
    executor: Mutex<mpsc::Sender<Task>>,
    executor_thread: ThreadId,
}

impl ManualReactor {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<Task>();
        let worker = thread::Builder::new()
            .name("manual-reactor-executor".into())
            .spawn(move || {
                while let Ok(task) = rx.recv() {
                    task();
                }
            })
            .expect("执行线程必须启动成功");
        Arc::new(Self {
            pending: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
            executor: Mutex::new(tx),
            executor_thread: worker.thread().id(),
        })
    }

    /// 延迟任务运行所在线程。
    pub fn executor_thread(&self) -> ThreadId {
        self.executor_thread
    }

    /// 累计收到的可写登记次数（含合并掉的重复登记）。
    pub fn writable_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().expect("reactor lock").is_empty()
    }

    /// 对所有登记了可写兴趣的连接执行一次排空，返回写出的字节数。
    pub fn pump(&self, writer: &AsyncQueueWriter) -> usize {
        let ready: Vec<Connection> =
            std::mem::take(&mut *self.pending.lock().expect("reactor lock"));
        ready
            .iter()
            .map(|connection| writer.on_writable(connection).unwrap_or(0))
            .sum()
    }

    /// 反复排空直到没有连接再登记可写兴趣，返回触发的可写事件轮数。
    pub fn pump_until_idle(&self, writer: &AsyncQueueWriter) -> usize {
        let mut rounds = 0;
        while self.has_pending() {
            self.pump(writer);
            rounds += 1;
            assert!(rounds < 1_000_000, "排空未能收敛");
        }
        rounds
    }
}

impl Reactor for ManualReactor {
    fn request_writable(&self, connection: &Connection) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut pending = self.pending.lock().expect("reactor lock");
        if !pending
            .iter()
            .any(|registered| registered.same_connection(connection))
        {
            pending.push(connection.clone());
        }
    }

    fn execute(&self, task: Task) {
        self.executor
            .lock()
            .expect("executor lock")
            .send(task)
            .expect("执行线程必须存活");
    }
}

/// 以给定套接字与反应器构造连接。
pub fn connection(socket: &Arc<MockSocket>, reactor: &Arc<ManualReactor>) -> Connection {
    let socket: Arc<dyn WriteSocket> = socket.clone();
    let reactor: Arc<dyn Reactor> = reactor.clone();
    Connection::new(socket, reactor)
}

/// 轮询等待条件成立，超时返回 `false`。
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
