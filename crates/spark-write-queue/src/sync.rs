//! 写队列并发原语的统一出口。
//!
//! # 教案级导览
//!
//! - **Why**：写权移交与积压计数是写队列的并发核心，需要在 Loom 下穷举调度验证；
//!   队列、监视器注册表与连接状态都经由本模块取得锁与原子类型，切换实现时无需改动调用点。
//! - **How**：常规构建使用 `parking_lot::Mutex` 与标准库原子类型；
//!   以 `--cfg spark_loom`（或 `--cfg loom`）并启用 `loom-model` 特性构建时，切换为 `loom::sync`。
//!   Loom 的互斥锁返回 `LockResult`，这里包装为与 `parking_lot` 一致的 `lock()` 签名。
//! - **What**：Loom 模式下的类型只能在 `loom::model` 内构造，运行方式：
//!   `RUSTFLAGS="--cfg spark_loom" cargo test -p spark-write-queue --no-default-features --features loom-model --lib loom_`。

#[cfg(not(any(loom, spark_loom)))]
pub(crate) use parking_lot::Mutex;
#[cfg(not(any(loom, spark_loom)))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[cfg(any(loom, spark_loom))]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[cfg(any(loom, spark_loom))]
pub(crate) struct Mutex<T> {
    inner: loom::sync::Mutex<T>,
}

#[cfg(any(loom, spark_loom))]
impl<T> Mutex<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: loom::sync::Mutex::new(value),
        }
    }

    /// 毒化只会发生在测试断言失败之后，直接取回内部状态。
    pub(crate) fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
