use std::fmt;
use std::sync::Arc;

use bytes::{Buf, Bytes};

use crate::address::TransportSocketAddr;
use crate::error::WriteQueueError;

/// 写操作完成后回调给调用方的元数据。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteResult {
    written: usize,
    destination: Option<TransportSocketAddr>,
}

impl WriteResult {
    pub(crate) fn new(written: usize, destination: Option<TransportSocketAddr>) -> Self {
        Self {
            written,
            destination,
        }
    }

    /// 消息累计写出的字节数。
    pub fn written(&self) -> usize {
        self.written
    }

    /// 数据报目的地址；流式连接为 `None`。
    pub fn destination(&self) -> Option<TransportSocketAddr> {
        self.destination
    }
}

/// 写完成通知契约。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 写入可能立即完成，也可能在反应器排空队列时于其它执行上下文完成；
///   回调把两条路径统一为同一个通知点。
///
/// ## 契约 (What)
/// - 每条消息的回调只会收到 `completed` 或 `failed` 之一，且仅一次；
/// - 回调在队列内部锁之外执行，可以安全地再次调用 `write`；
/// - 同一个处理器实例可以被多条消息共享（例如在 `completed` 中链式写入时传递自身）。
///
/// ## 注意事项 (Trade-offs)
/// - 回调可能运行在反应器的任务执行上下文中，应避免长时间阻塞。
pub trait CompletionHandler: Send + Sync {
    /// 消息已完整写入套接字。
    fn completed(&self, result: WriteResult);

    /// 消息被拒绝或写入失败。
    fn failed(&self, error: WriteQueueError);
}

type CompletedFn = Box<dyn Fn(WriteResult) + Send + Sync>;
type FailedFn = Box<dyn Fn(WriteQueueError) + Send + Sync>;

/// 基于闭包的 [`CompletionHandler`]。
pub struct FnCompletion {
    completed: CompletedFn,
    failed: FailedFn,
}

impl FnCompletion {
    pub fn new<C, F>(completed: C, failed: F) -> Self
    where
        C: Fn(WriteResult) + Send + Sync + 'static,
        F: Fn(WriteQueueError) + Send + Sync + 'static,
    {
        Self {
            completed: Box::new(completed),
            failed: Box::new(failed),
        }
    }

    /// 仅关心成功路径，失败被忽略。
    pub fn on_completed<C>(completed: C) -> Self
    where
        C: Fn(WriteResult) + Send + Sync + 'static,
    {
        Self::new(completed, |_| {})
    }

    /// 仅关心失败路径。
    pub fn on_failed<F>(failed: F) -> Self
    where
        F: Fn(WriteQueueError) + Send + Sync + 'static,
    {
        Self::new(|_| {}, failed)
    }
}

impl CompletionHandler for FnCompletion {
    fn completed(&self, result: WriteResult) {
        (self.completed)(result)
    }

    fn failed(&self, error: WriteQueueError) {
        (self.failed)(error)
    }
}

impl fmt::Debug for FnCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCompletion").finish_non_exhaustive()
    }
}

/// 写队列中的单条消息。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把负载、可选目的地址与可选完成回调绑定为一个不可拆分的单元，
///   保证部分写出时只推进读游标，消息边界永不与其它消息交织。
///
/// ## 契约说明（What）
/// - 入队后所有权转移给队列；任一时刻只有持有写权的排空者能访问其负载；
/// - `remaining()` 为尚未写出的字节数，队列的 `space_in_bytes` 恰为所有排队消息的 `remaining()` 之和；
/// - 没有回调时为“发后不理”，错误只会同步返回给 `write` 的调用方。
pub struct QueuedMessage {
    payload: Bytes,
    original_len: usize,
    destination: Option<TransportSocketAddr>,
    completion: Option<Arc<dyn CompletionHandler>>,
}

impl QueuedMessage {
    pub fn new(
        payload: Bytes,
        destination: Option<TransportSocketAddr>,
        completion: Option<Arc<dyn CompletionHandler>>,
    ) -> Self {
        let original_len = payload.len();
        Self {
            payload,
            original_len,
            destination,
            completion,
        }
    }

    /// 尚未写出的字节数。
    pub fn remaining(&self) -> usize {
        self.payload.remaining()
    }

    /// 已写出的字节数。
    pub fn written(&self) -> usize {
        self.original_len - self.payload.remaining()
    }

    pub fn is_drained(&self) -> bool {
        !self.payload.has_remaining()
    }

    pub fn destination(&self) -> Option<TransportSocketAddr> {
        self.destination
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    /// 当前读游标之后的未写出字节。
    pub(crate) fn chunk(&self) -> &[u8] {
        self.payload.chunk()
    }

    /// 推进读游标；`count` 超过剩余量时截断。
    pub(crate) fn advance(&mut self, count: usize) {
        let count = count.min(self.payload.remaining());
        self.payload.advance(count);
    }

    /// 拆出完成回调与结果，供调用方在锁外触发通知。
    pub(crate) fn into_completion(self) -> (Option<Arc<dyn CompletionHandler>>, WriteResult) {
        let result = WriteResult::new(self.written(), self.destination);
        (self.completion, result)
    }

    /// 以给定错误失败该消息；无回调时静默丢弃。
    pub(crate) fn fail(self, error: WriteQueueError) {
        if let Some(handler) = self.completion {
            handler.failed(error);
        }
    }
}

impl fmt::Debug for QueuedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedMessage")
            .field("remaining", &self.remaining())
            .field("written", &self.written())
            .field("destination", &self.destination)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn advance_tracks_written_and_remaining() {
        let mut message = QueuedMessage::new(Bytes::from_static(b"hello world"), None, None);
        assert_eq!(message.remaining(), 11);
        message.advance(6);
        assert_eq!(message.chunk(), b"world");
        assert_eq!(message.written(), 6);
        message.advance(100);
        assert!(message.is_drained());
        assert_eq!(message.written(), 11);
    }

    #[test]
    fn completion_result_carries_destination() {
        let dest = TransportSocketAddr::V4 {
            addr: [192, 168, 1, 2],
            port: 5004,
        };
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn CompletionHandler> = Arc::new(FnCompletion::on_completed(move |r| {
            *sink.lock().expect("lock") = Some(r);
        }));
        let mut message = QueuedMessage::new(Bytes::from_static(b"rtp"), Some(dest), Some(handler));
        message.advance(3);
        let (handler, result) = message.into_completion();
        handler.expect("handler present").completed(result);
        let observed = seen.lock().expect("lock").expect("completed");
        assert_eq!(observed.written(), 3);
        assert_eq!(observed.destination(), Some(dest));
    }

    #[test]
    fn fail_routes_error_to_handler() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let handler: Arc<dyn CompletionHandler> = Arc::new(FnCompletion::on_failed(move |e| {
            sink.lock().expect("lock").push(e);
        }));
        QueuedMessage::new(Bytes::from_static(b"x"), None, Some(handler))
            .fail(WriteQueueError::Closed);
        assert_eq!(
            failures.lock().expect("lock").as_slice(),
            &[WriteQueueError::Closed]
        );
    }
}
