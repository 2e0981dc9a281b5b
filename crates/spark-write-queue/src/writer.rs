use std::io;
use std::sync::Arc;

use bytes::Bytes;

use crate::address::TransportSocketAddr;
use crate::config::{WriteQueueConfig, WriterSettings};
use crate::connection::Connection;
use crate::error::{Result, WriteQueueError};
use crate::message::{CompletionHandler, QueuedMessage, WriteResult};
use crate::reentrant::{self, WriteReentrant};
use crate::task_queue::{Offer, Restore};

/// `write` 的成功结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// 直写路径一次写完，完成回调已触发或已交给任务执行上下文。
    Written(WriteResult),
    /// 消息（或直写后的剩余部分）已入队，等待反应器排空。
    Queued { queued_bytes: usize },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// 异步写队列的入口。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 让任意数量的生产者在不阻塞调用线程的前提下向同一连接写入，
///   同时保证消息边界完整、积压有界、空闲通知恰好一次、同步链式写入的栈深有界。
///
/// ## 逻辑 (How)
/// 1. **背压**：`write` 入口读取原子积压计数，`积压 + 本次 > 上限` 即拒绝；
///    这是唯一的背压执行点，检查与入队之间不加锁，因此上限是软约束，
///    并发生产者可能瞬时超出至多一条在途消息的大小；
/// 2. **直写**：队列为空、无人持有写权且连接未暂停时，调用方获得写权并尝试一次非阻塞写；
///    写完则释放写权并触发完成回调，未写完的剩余部分放回队首并登记可写兴趣；
/// 3. **入队**：队列非空或写权被占用时一律追加到队尾，保证同一连接上字节按接受顺序上线；
/// 4. **排空**：反应器报告可写时由 [`AsyncQueueWriter::on_writable`] 从队首依次写出，
///    每写完一条触发其完成回调，每个有进展的步骤之后求值队列监视器；
/// 5. **重入上限**：直写完成时若当前写入的重入深度超过 `max_write_reentrants`，
///    完成回调交给反应器的任务执行上下文，在那里从深度 0 重新计数。
///
/// ## 契约 (What)
/// - `Clone` 共享同一组运行时设置，适合在反应器与生产者之间分发；
/// - 同步失败（背压、已关闭、直写 IO 错误）一律以 `Err` 返回；若提供了完成回调，
///   回调同时收到一次 `failed`；
/// - 写入器内部不做任何重试。
///
/// ## 注意事项 (Trade-offs)
/// - 多路复用优化模式下每次写入都先入队，吞吐依赖反应器排空频率，但不会发生同步递归；
/// - 完成回调可能在生产者线程、排空线程或任务执行上下文中运行。
#[derive(Clone, Debug)]
pub struct AsyncQueueWriter {
    settings: Arc<WriterSettings>,
}

impl Default for AsyncQueueWriter {
    fn default() -> Self {
        Self::new(WriteQueueConfig::default())
    }
}

impl AsyncQueueWriter {
    pub fn new(config: WriteQueueConfig) -> Self {
        Self {
            settings: Arc::new(WriterSettings::from_config(&config)),
        }
    }

    /// 追加 `additional_bytes` 后积压是否仍在上限之内；上限 `<= 0` 时恒为真。
    ///
    /// 仅为建议性检查：并发生产者可能在检查与写入之间占用空间，`write` 会重新校验。
    pub fn can_write(&self, connection: &Connection, additional_bytes: usize) -> bool {
        self.settings.admits(connection.queue().space_in_bytes(), additional_bytes)
    }

    pub fn max_pending_bytes_per_connection(&self) -> i64 {
        self.settings.max_pending_bytes()
    }

    /// 调整单连接积压上限，`<= 0` 表示不限制。立即对所有连接生效。
    pub fn set_max_pending_bytes_per_connection(&self, limit: i64) {
        self.settings.set_max_pending_bytes(limit);
    }

    pub fn max_write_reentrants(&self) -> usize {
        self.settings.max_write_reentrants()
    }

    pub fn set_max_write_reentrants(&self, reentrants: usize) {
        self.settings.set_max_write_reentrants(reentrants);
    }

    pub fn is_optimized_for_multiplexing(&self) -> bool {
        self.settings.optimized_for_multiplexing()
    }

    /// 向连接写入一条消息。
    ///
    /// - `destination`：无连接传输的目的地址，流式连接传 `None`；
    /// - `completion`：完成回调；为 `None` 时为“发后不理”，错误只通过返回值报告。
    pub fn write(
        &self,
        connection: &Connection,
        payload: impl Into<Bytes>,
        destination: Option<TransportSocketAddr>,
        completion: Option<Arc<dyn CompletionHandler>>,
    ) -> Result<WriteOutcome> {
        let payload = payload.into();
        let size = payload.len();
        let queue = connection.queue();

        let pending = queue.space_in_bytes();
        if !self.settings.admits(pending, size) {
            let limit = self.settings.max_pending_bytes();
            tracing::debug!(
                connection = %connection.id(),
                pending,
                additional = size,
                limit,
                "write rejected by pending write queue limit"
            );
            return Err(reject(
                completion,
                WriteQueueError::limit_exceeded(pending, size, limit),
            ));
        }

        let frame = WriteReentrant::enter();

        if size == 0 {
            if queue.is_closed() {
                return Err(reject(completion, WriteQueueError::Closed));
            }
            let result = WriteResult::new(0, destination);
            if let Some(handler) = completion {
                self.dispatch_completion(connection, handler, result, &frame);
            }
            return Ok(WriteOutcome::Written(result));
        }

        let message = QueuedMessage::new(payload, destination, completion);
        let allow_direct = !self.settings.optimized_for_multiplexing() && !connection.is_paused();
        match queue.offer(message, allow_direct) {
            Offer::Owned(message) => self.write_direct(connection, message, &frame),
            Offer::Queued {
                pending,
                needs_drain,
            } => {
                tracing::trace!(
                    connection = %connection.id(),
                    queued = size,
                    pending,
                    "message queued"
                );
                if needs_drain {
                    connection.reactor().request_writable(connection);
                }
                Ok(WriteOutcome::Queued { queued_bytes: size })
            }
            Offer::Closed(message) => {
                message.fail(WriteQueueError::Closed);
                Err(WriteQueueError::Closed)
            }
        }
    }

    /// 反应器报告套接字可写时调用：从队首开始排空，返回本次写出的字节数。
    ///
    /// 连接暂停、已有其它写者或队列为空时立即返回 `Ok(0)`。
    /// 套接字写满时放回未写完的队首并重新登记可写兴趣；IO 失败只失败在途消息并停止本轮排空，
    /// 队列中仍有消息时重新登记可写兴趣，由下一次可写事件继续处理。
    pub fn on_writable(&self, connection: &Connection) -> Result<usize> {
        let queue = connection.queue();
        if connection.is_paused() {
            tracing::trace!(connection = %connection.id(), "drain skipped, connection paused");
            return Ok(0);
        }
        if !queue.begin_drain() {
            return Ok(0);
        }

        let mut total = 0usize;
        loop {
            if connection.is_paused() {
                queue.release();
                break;
            }
            let Some(mut head) = queue.take_head() else {
                break;
            };

            let written = match try_write(connection, &head) {
                Ok(written) => written,
                Err(error) => {
                    queue.release_space(head.remaining());
                    tracing::warn!(
                        connection = %connection.id(),
                        error = %error,
                        "drain failed, in-flight message dropped"
                    );
                    head.fail(error.clone());
                    if queue.release() {
                        connection.reactor().request_writable(connection);
                    }
                    queue.notify_monitors();
                    return Err(error);
                }
            };
            head.advance(written);
            queue.release_space(written);
            total += written;

            if head.is_drained() {
                let (handler, result) = head.into_completion();
                queue.notify_monitors();
                if let Some(handler) = handler {
                    handler.completed(result);
                }
                continue;
            }

            match queue.restore_head(head) {
                Restore::Requeued => {
                    if written > 0 {
                        queue.notify_monitors();
                    }
                    connection.reactor().request_writable(connection);
                }
                Restore::Closed(head) => {
                    queue.release_space(head.remaining());
                    head.fail(WriteQueueError::Closed);
                }
            }
            break;
        }

        tracing::trace!(
            connection = %connection.id(),
            written = total,
            pending = queue.space_in_bytes(),
            "drain step finished"
        );
        Ok(total)
    }

    /// 恢复连接并立即尝试排空。
    pub fn resume(&self, connection: &Connection) -> Result<usize> {
        connection.resume();
        self.on_writable(connection)
    }

    /// 连接关闭：以 [`WriteQueueError::Closed`] 失败所有排队消息，此后的写入一律被拒绝。
    pub fn close(&self, connection: &Connection) -> usize {
        let failed = connection
            .queue()
            .close_and_fail_all(WriteQueueError::Closed);
        tracing::debug!(connection = %connection.id(), failed, "write queue closed");
        failed
    }

    fn write_direct(
        &self,
        connection: &Connection,
        mut message: QueuedMessage,
        frame: &WriteReentrant,
    ) -> Result<WriteOutcome> {
        let queue = connection.queue();
        match try_write(connection, &message) {
            Ok(written) => message.advance(written),
            Err(error) => {
                tracing::warn!(
                    connection = %connection.id(),
                    error = %error,
                    "direct write failed"
                );
                if queue.release() {
                    connection.reactor().request_writable(connection);
                }
                message.fail(error.clone());
                return Err(error);
            }
        }

        if message.is_drained() {
            if queue.release() {
                connection.reactor().request_writable(connection);
            }
            let (handler, result) = message.into_completion();
            tracing::trace!(
                connection = %connection.id(),
                written = result.written(),
                depth = frame.depth(),
                "direct write completed"
            );
            if let Some(handler) = handler {
                self.dispatch_completion(connection, handler, result, frame);
            }
            return Ok(WriteOutcome::Written(result));
        }

        let queued_bytes = message.remaining();
        match queue.release_direct(Some(message)) {
            Ok(_) => {
                tracing::trace!(
                    connection = %connection.id(),
                    queued = queued_bytes,
                    "direct write partial, remainder queued"
                );
                connection.reactor().request_writable(connection);
                Ok(WriteOutcome::Queued { queued_bytes })
            }
            Err(message) => {
                message.fail(WriteQueueError::Closed);
                Err(WriteQueueError::Closed)
            }
        }
    }

    fn dispatch_completion(
        &self,
        connection: &Connection,
        handler: Arc<dyn CompletionHandler>,
        result: WriteResult,
        frame: &WriteReentrant,
    ) {
        if frame.permits_inline(self.settings.max_write_reentrants()) {
            handler.completed(result);
            return;
        }
        tracing::trace!(
            connection = %connection.id(),
            depth = frame.depth(),
            "write reentrant limit reached, completion deferred"
        );
        connection
            .reactor()
            .execute(Box::new(move || reentrant::detached(|| handler.completed(result))));
    }
}

/// 对消息剩余部分执行一次非阻塞写；`WouldBlock` 视为写出 0 字节。
fn try_write(connection: &Connection, message: &QueuedMessage) -> Result<usize> {
    let destination = message.destination();
    match connection
        .socket()
        .try_write(message.chunk(), destination.as_ref())
    {
        Ok(written) => Ok(written.min(message.remaining())),
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(0),
        Err(error) => Err(error.into()),
    }
}

fn reject(
    completion: Option<Arc<dyn CompletionHandler>>,
    error: WriteQueueError,
) -> WriteQueueError {
    if let Some(handler) = completion {
        handler.failed(error.clone());
    }
    error
}
