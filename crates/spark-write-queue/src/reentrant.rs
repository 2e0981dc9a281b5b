//! 同步写重入计数。
//!
//! # 教案级导览
//!
//! - **Why**：完成回调内再次 `write`、且该写入又立即完成时，调用栈会随链长线性增长。
//!   这里用显式计数代替调用栈递归：超过上限后，完成通知交给反应器的任务执行上下文，
//!   在新的执行上下文中从零开始计数（蹦床）。
//! - **How**：每个线程维护一个 `Cell<usize>`，每个 `write` 栈帧持有一个 [`WriteReentrant`] 守卫，
//!   构造时加一、析构时减一；守卫的 `depth()` 即当前写入之外还包裹着多少层写入。
//! - **What**：`depth() <= max_write_reentrants` 时可以内联触发完成回调。

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static WRITE_FRAMES: Cell<usize> = const { Cell::new(0) };
}

/// 单个 `write` 栈帧的重入守卫。
///
/// 守卫不可跨线程移动，析构时恢复计数。
pub(crate) struct WriteReentrant {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl WriteReentrant {
    /// 进入一个写入栈帧。
    pub(crate) fn enter() -> Self {
        let frames = WRITE_FRAMES.with(|cell| {
            let frames = cell.get() + 1;
            cell.set(frames);
            frames
        });
        Self {
            depth: frames - 1,
            _not_send: PhantomData,
        }
    }

    /// 当前写入的重入深度：顶层写入为 0，其完成回调中发起的写入为 1，依此类推。
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// 重入深度是否仍允许内联触发完成回调。
    pub(crate) fn permits_inline(&self, max_reentrants: usize) -> bool {
        self.depth <= max_reentrants
    }
}

impl Drop for WriteReentrant {
    fn drop(&mut self) {
        WRITE_FRAMES.with(|cell| cell.set(cell.get().saturating_sub(1)));
    }
}

/// 以清零的重入计数执行 `f`，结束后恢复原值。
///
/// 延迟到任务执行上下文的完成回调经由此处运行；即便执行器就是当前线程，
/// 回调内发起的写入也从深度 0 重新计数。
pub(crate) fn detached<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(usize);

    impl Drop for Restore {
        fn drop(&mut self) {
            let saved = self.0;
            WRITE_FRAMES.with(|cell| cell.set(saved));
        }
    }

    let _restore = Restore(WRITE_FRAMES.with(|cell| cell.replace(0)));
    f()
}

#[cfg(test)]
pub(crate) fn current_frames() -> usize {
    WRITE_FRAMES.with(Cell::get)
}
