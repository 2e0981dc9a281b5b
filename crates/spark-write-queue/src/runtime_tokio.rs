use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::{TcpStream, UdpSocket};
use tokio::runtime::Handle;

use crate::address::TransportSocketAddr;
use crate::connection::{Connection, Reactor, Task, WriteSocket};
use crate::writer::AsyncQueueWriter;

/// 基于 Tokio `TcpStream::try_write` 的非阻塞写原语。
#[derive(Clone, Debug)]
pub struct TokioTcpSocket {
    stream: Arc<TcpStream>,
}

impl TokioTcpSocket {
    pub fn new(stream: Arc<TcpStream>) -> Self {
        Self { stream }
    }
}

impl WriteSocket for TokioTcpSocket {
    fn try_write(
        &self,
        buf: &[u8],
        _destination: Option<&TransportSocketAddr>,
    ) -> io::Result<usize> {
        self.stream.try_write(buf)
    }
}

/// 基于 Tokio `UdpSocket` 的非阻塞写原语；携带目的地址时走 `try_send_to`。
#[derive(Clone, Debug)]
pub struct TokioUdpSocket {
    socket: Arc<UdpSocket>,
}

impl TokioUdpSocket {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl WriteSocket for TokioUdpSocket {
    fn try_write(
        &self,
        buf: &[u8],
        destination: Option<&TransportSocketAddr>,
    ) -> io::Result<usize> {
        match destination {
            Some(addr) => self.socket.try_send_to(buf, addr.to_socket_addr()),
            None => self.socket.try_send(buf),
        }
    }
}

#[derive(Clone, Debug)]
enum Readiness {
    Tcp(Arc<TcpStream>),
    Udp(Arc<UdpSocket>),
}

impl Readiness {
    async fn writable(&self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.writable().await,
            Self::Udp(socket) => socket.writable().await,
        }
    }
}

/// 以 Tokio 运行时充当反应器的单连接适配器。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 为写队列提供真实的“可写通知 + 任务执行上下文”，无需自研事件循环。
///
/// ## 逻辑 (How)
/// - `request_writable`：派生一个等待套接字可写的任务，就绪后调用
///   [`AsyncQueueWriter::on_writable`]；`armed` 标记合并重复登记，排空前先解除，
///   以便排空中途写满时能够重新登记；
/// - `execute`：把任务派生到运行时，在工作线程上执行。
///
/// ## 注意事项 (Trade-offs)
/// - 可写就绪可能是伪就绪，此时排空写出 0 字节并再次登记，代价是一次额外的任务调度；
/// - 等待可写失败时视为连接失效，直接关闭写队列。
#[derive(Debug)]
pub struct TokioReactor {
    handle: Handle,
    writer: AsyncQueueWriter,
    readiness: Readiness,
    armed: Arc<AtomicBool>,
}

impl TokioReactor {
    fn new(handle: Handle, writer: AsyncQueueWriter, readiness: Readiness) -> Self {
        Self {
            handle,
            writer,
            readiness,
            armed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Reactor for TokioReactor {
    fn request_writable(&self, connection: &Connection) {
        if self.armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let connection = connection.clone();
        let writer = self.writer.clone();
        let readiness = self.readiness.clone();
        let armed = Arc::clone(&self.armed);
        self.handle.spawn(async move {
            let ready = readiness.writable().await;
            armed.store(false, Ordering::Release);
            match ready {
                Ok(()) => {
                    if let Err(error) = writer.on_writable(&connection) {
                        tracing::warn!(
                            connection = %connection.id(),
                            error = %error,
                            "tokio reactor drain failed"
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        connection = %connection.id(),
                        error = %error,
                        "socket writability wait failed, closing write queue"
                    );
                    writer.close(&connection);
                }
            }
        });
    }

    fn execute(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }
}

/// 用 Tokio `TcpStream` 构造写队列连接。
pub fn tokio_tcp_connection(
    stream: TcpStream,
    writer: &AsyncQueueWriter,
    handle: Handle,
) -> Connection {
    let stream = Arc::new(stream);
    let socket = Arc::new(TokioTcpSocket::new(Arc::clone(&stream)));
    let reactor = Arc::new(TokioReactor::new(
        handle,
        writer.clone(),
        Readiness::Tcp(stream),
    ));
    Connection::new(socket, reactor)
}

/// 用 Tokio `UdpSocket` 构造写队列连接；目的地址随每条消息传入。
pub fn tokio_udp_connection(
    socket: UdpSocket,
    writer: &AsyncQueueWriter,
    handle: Handle,
) -> Connection {
    let socket = Arc::new(socket);
    let write_socket = Arc::new(TokioUdpSocket::new(Arc::clone(&socket)));
    let reactor = Arc::new(TokioReactor::new(
        handle,
        writer.clone(),
        Readiness::Udp(socket),
    ));
    Connection::new(write_socket, reactor)
}
