use std::io;
use thiserror::Error;

/// 写队列对外暴露的稳定错误码。
pub(crate) const LIMIT_EXCEEDED_CODE: &str = "spark.transport.write_queue.limit_exceeded";
pub(crate) const IO_CODE: &str = "spark.transport.write_queue.io_failed";
pub(crate) const CLOSED_CODE: &str = "spark.transport.write_queue.closed";

/// 写队列错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“背压拒绝”“套接字 IO 失败”“连接已关闭”三类失败集中在同一枚举中，
///   同步返回值与完成回调 [`CompletionHandler::failed`](crate::CompletionHandler::failed)
///   共享同一语义，调用方无需区分来源。
/// - **契约 (What)**：
///   - 枚举实现 `Clone`，同一错误可以同时交给回调与调用方；
///   - `code()` 返回稳定错误码，`category()` 给出可重试性分类；
///   - 写队列内部从不自动重试，恢复策略完全由调用方决定。
/// - **设计权衡 (Trade-offs)**：`Io` 仅保存 `ErrorKind` 与文案而非原始 `io::Error`，
///   以换取 `Clone`；需要原始错误链的场景应在套接字实现层记录。
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum WriteQueueError {
    /// 写入会使待发送字节数超过单连接上限。
    #[error(
        "pending write queue limit exceeded: {pending} pending + {additional} new > {limit} bytes"
    )]
    PendingWriteQueueLimitExceeded {
        pending: usize,
        additional: usize,
        limit: i64,
    },

    /// 底层非阻塞写原语失败。
    #[error("write queue io failure ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    /// 连接已关闭，排队消息被整体失败或新写入被拒绝。
    #[error("connection closed, pending write dropped")]
    Closed,
}

/// 错误分类，供上层决定是否退避或放弃连接。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// 背压拒绝：重新检查 `can_write` 或等待队列监视器通知后再写。
    Backpressure,
    /// 瞬时性 IO 故障，可由连接层择机重试。
    Retryable,
    /// 不可恢复的 IO 故障，连接层应视为致命。
    NonRetryable,
    /// 连接已关闭。
    Closed,
}

impl WriteQueueError {
    /// 构造背压拒绝错误。
    pub(crate) fn limit_exceeded(pending: usize, additional: usize, limit: i64) -> Self {
        Self::PendingWriteQueueLimitExceeded {
            pending,
            additional,
            limit,
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::PendingWriteQueueLimitExceeded { .. } => LIMIT_EXCEEDED_CODE,
            Self::Io { .. } => IO_CODE,
            Self::Closed => CLOSED_CODE,
        }
    }

    /// 返回错误分类。
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PendingWriteQueueLimitExceeded { .. } => ErrorCategory::Backpressure,
            Self::Io { kind, .. } => categorize_io_kind(*kind),
            Self::Closed => ErrorCategory::Closed,
        }
    }

    /// 是否为背压拒绝。
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::PendingWriteQueueLimitExceeded { .. })
    }
}

impl From<io::Error> for WriteQueueError {
    fn from(error: io::Error) -> Self {
        Self::Io {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

fn categorize_io_kind(kind: io::ErrorKind) -> ErrorCategory {
    use io::ErrorKind;
    match kind {
        ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut => {
            ErrorCategory::Retryable
        }
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe => ErrorCategory::Closed,
        _ => ErrorCategory::NonRetryable,
    }
}

/// 写队列内部统一的 `Result` 别名。
pub type Result<T, E = WriteQueueError> = std::result::Result<T, E>;
