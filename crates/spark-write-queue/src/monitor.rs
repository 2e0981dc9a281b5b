use std::fmt;
use std::sync::Arc;

use crate::sync::Mutex;

/// 队列监视器判定时看到的队列状态快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// 排队消息尚未写出的字节总数。
    pub pending_bytes: usize,
    /// 排队消息条数。
    pub queued_messages: usize,
}

/// 一次性的队列空闲空间观察者。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 背压拒绝之后，生产者需要知道“何时可以再写”；轮询 `can_write` 会造成忙等，
///   监视器把这个问题变成一次性回调。
///
/// ## 契约 (What)
/// - `should_notify`：对快照的纯谓词，可能在任意线程、在队列监视器锁内被调用，必须无副作用且快速返回；
/// - `on_notify`：谓词首次成立时调用，每次注册至多一次；调用前监视器已从队列注销，
///   回调内可以安全地重新注册或再次写入；
/// - 谓词在排空步骤之后求值，不保证在每个中间状态都被观察到。
pub trait QueueMonitor: Send + Sync {
    fn should_notify(&self, snapshot: &QueueSnapshot) -> bool;

    fn on_notify(&self);
}

/// 当 `limit - pending_bytes > free_space` 时触发的监视器。
pub struct FreeSpaceMonitor {
    limit: i64,
    free_space: usize,
    notify: Box<dyn Fn() + Send + Sync>,
}

impl FreeSpaceMonitor {
    /// `limit` 通常取写入器当前的单连接上限，`free_space` 为期望的空闲字节阈值。
    pub fn new<F>(limit: i64, free_space: usize, notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            limit,
            free_space,
            notify: Box::new(notify),
        }
    }
}

impl QueueMonitor for FreeSpaceMonitor {
    fn should_notify(&self, snapshot: &QueueSnapshot) -> bool {
        let free = self.limit as i128 - snapshot.pending_bytes as i128;
        free > self.free_space as i128
    }

    fn on_notify(&self) {
        (self.notify)()
    }
}

impl fmt::Debug for FreeSpaceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeSpaceMonitor")
            .field("limit", &self.limit)
            .field("free_space", &self.free_space)
            .finish_non_exhaustive()
    }
}

type Predicate = Box<dyn Fn(&QueueSnapshot) -> bool + Send + Sync>;

/// 由谓词闭包与通知闭包组成的监视器。
pub struct FnMonitor {
    predicate: Predicate,
    notify: Box<dyn Fn() + Send + Sync>,
}

impl FnMonitor {
    pub fn new<P, N>(predicate: P, notify: N) -> Self
    where
        P: Fn(&QueueSnapshot) -> bool + Send + Sync + 'static,
        N: Fn() + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            notify: Box::new(notify),
        }
    }
}

impl QueueMonitor for FnMonitor {
    fn should_notify(&self, snapshot: &QueueSnapshot) -> bool {
        (self.predicate)(snapshot)
    }

    fn on_notify(&self) {
        (self.notify)()
    }
}

impl fmt::Debug for FnMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMonitor").finish_non_exhaustive()
    }
}

/// 队列持有的监视器注册表。
///
/// 注销与谓词求值在同一把锁内完成，`on_notify` 则由调用方在锁外触发，
/// 因此并发求值时同一监视器只会被取出一次。
pub(crate) struct MonitorSet {
    monitors: Mutex<Vec<Arc<dyn QueueMonitor>>>,
}

impl Default for MonitorSet {
    fn default() -> Self {
        Self {
            monitors: Mutex::new(Vec::new()),
        }
    }
}

impl MonitorSet {
    /// 注册监视器；若谓词已成立则不保留并返回 `false`，由调用方立即通知。
    ///
    /// 快照在锁内读取：排空者先更新计数再取锁求值，
    /// 因此“注册”与“排空后求值”之间不会遗漏状态变化。
    pub(crate) fn register<S>(&self, monitor: Arc<dyn QueueMonitor>, snapshot: S) -> bool
    where
        S: FnOnce() -> QueueSnapshot,
    {
        let mut monitors = self.monitors.lock();
        if monitor.should_notify(&snapshot()) {
            return false;
        }
        monitors.push(monitor);
        true
    }

    pub(crate) fn remove(&self, monitor: &Arc<dyn QueueMonitor>) -> bool {
        let target = Arc::as_ptr(monitor) as *const ();
        let mut monitors = self.monitors.lock();
        let before = monitors.len();
        monitors.retain(|candidate| Arc::as_ptr(candidate) as *const () != target);
        monitors.len() != before
    }

    /// 取出所有谓词成立的监视器。
    pub(crate) fn take_ready<S>(&self, snapshot: S) -> Vec<Arc<dyn QueueMonitor>>
    where
        S: FnOnce() -> QueueSnapshot,
    {
        let mut monitors = self.monitors.lock();
        if monitors.is_empty() {
            return Vec::new();
        }
        let snapshot = snapshot();
        let mut ready = Vec::new();
        monitors.retain(|monitor| {
            if monitor.should_notify(&snapshot) {
                ready.push(Arc::clone(monitor));
                false
            } else {
                true
            }
        });
        ready
    }

    pub(crate) fn clear(&self) {
        self.monitors.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.monitors.lock().len()
    }
}
