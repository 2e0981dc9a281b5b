use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// 默认的同步重入上限。
pub const DEFAULT_MAX_WRITE_REENTRANTS: usize = 10;

/// 表示“不限制单连接待发送字节数”的默认上限。
pub const UNLIMITED_PENDING_BYTES: i64 = -1;

/// 写队列配置项，实现对背压与重入策略的显式控制。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将“单连接最多可积压多少未发送字节”“完成回调可以同步链式写入多少层”两条约束配置化，
///   避免调用方散落魔法数字；
/// - 区分“多路复用优化”队列：此类队列的每次写入都先入队，由反应器统一排空，
///   天然不会出现同步递归。
///
/// ## 契约说明（What）
/// - `max_pending_bytes_per_connection`：软上限，`<= 0` 表示不限制；
/// - `max_write_reentrants`：同一执行上下文中允许内联执行完成回调的最大重入深度；
/// - `optimized_for_multiplexing`：为 `true` 时关闭直写路径，重入上限不再生效；
/// - **后置条件**：配置只在构造 [`AsyncQueueWriter`](crate::AsyncQueueWriter) 时读取一次，
///   运行时调整通过写入器的 setter 完成。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteQueueConfig {
    max_pending_bytes_per_connection: i64,
    max_write_reentrants: usize,
    optimized_for_multiplexing: bool,
}

impl Default for WriteQueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteQueueConfig {
    /// 创建默认配置：不限背压、重入上限 10、关闭多路复用优化。
    pub const fn new() -> Self {
        Self {
            max_pending_bytes_per_connection: UNLIMITED_PENDING_BYTES,
            max_write_reentrants: DEFAULT_MAX_WRITE_REENTRANTS,
            optimized_for_multiplexing: false,
        }
    }

    /// 设置单连接待发送字节上限。
    pub fn with_max_pending_bytes_per_connection(mut self, limit: i64) -> Self {
        self.max_pending_bytes_per_connection = limit;
        self
    }

    /// 设置同步重入上限。
    pub fn with_max_write_reentrants(mut self, reentrants: usize) -> Self {
        self.max_write_reentrants = reentrants;
        self
    }

    /// 切换多路复用优化模式。
    pub fn with_optimized_for_multiplexing(mut self, optimized: bool) -> Self {
        self.optimized_for_multiplexing = optimized;
        self
    }

    pub fn max_pending_bytes_per_connection(&self) -> i64 {
        self.max_pending_bytes_per_connection
    }

    pub fn max_write_reentrants(&self) -> usize {
        self.max_write_reentrants
    }

    pub fn optimized_for_multiplexing(&self) -> bool {
        self.optimized_for_multiplexing
    }
}

/// 写入器在运行时共享、可动态调整的设置。
///
/// 背压上限与重入上限均以原子变量保存，调整立即对所有连接可见；
/// 读取侧不加锁，因此上限本身就是软约束的一部分。
#[derive(Debug)]
pub(crate) struct WriterSettings {
    max_pending_bytes: AtomicI64,
    max_write_reentrants: AtomicUsize,
    optimized_for_multiplexing: bool,
}

impl WriterSettings {
    pub(crate) fn from_config(config: &WriteQueueConfig) -> Self {
        Self {
            max_pending_bytes: AtomicI64::new(config.max_pending_bytes_per_connection),
            max_write_reentrants: AtomicUsize::new(config.max_write_reentrants),
            optimized_for_multiplexing: config.optimized_for_multiplexing,
        }
    }

    pub(crate) fn max_pending_bytes(&self) -> i64 {
        self.max_pending_bytes.load(Ordering::Acquire)
    }

    pub(crate) fn set_max_pending_bytes(&self, limit: i64) {
        self.max_pending_bytes.store(limit, Ordering::Release);
    }

    pub(crate) fn max_write_reentrants(&self) -> usize {
        self.max_write_reentrants.load(Ordering::Acquire)
    }

    pub(crate) fn set_max_write_reentrants(&self, reentrants: usize) {
        self.max_write_reentrants.store(reentrants, Ordering::Release);
    }

    pub(crate) fn optimized_for_multiplexing(&self) -> bool {
        self.optimized_for_multiplexing
    }

    /// 判断在当前积压 `pending` 之上再追加 `additional` 字节是否仍在上限之内。
    pub(crate) fn admits(&self, pending: usize, additional: usize) -> bool {
        admits(self.max_pending_bytes(), pending, additional)
    }
}

/// 背压判定的纯函数形式：上限 `<= 0` 时恒为真。
pub(crate) fn admits(limit: i64, pending: usize, additional: usize) -> bool {
    if limit <= 0 {
        return true;
    }
    let total = (pending as u128).saturating_add(additional as u128);
    total <= limit as u128
}
