use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, WriteQueueError};
use crate::message::QueuedMessage;
use crate::monitor::{MonitorSet, QueueMonitor, QueueSnapshot};
use crate::sync::{AtomicUsize, Mutex, Ordering};

#[derive(Default)]
struct QueueState {
    items: VecDeque<QueuedMessage>,
    /// 是否有执行上下文持有套接字写权（直写者或排空者）。
    writing: bool,
    closed: bool,
}

/// 入队或抢占写权的结果。
pub(crate) enum Offer {
    /// 队列为空且无人持有写权：调用方获得写权并取回消息，负责直写。
    Owned(QueuedMessage),
    /// 消息已排入队尾；`needs_drain` 表示当前无人持有写权，需要向反应器登记可写兴趣。
    Queued { pending: usize, needs_drain: bool },
    /// 队列已关闭，消息原样退回。
    Closed(QueuedMessage),
}

/// 排空者归还消息的结果。
pub(crate) enum Restore {
    /// 消息已放回队首，写权已释放。
    Requeued,
    /// 排空期间连接被关闭，消息退回由调用方失败处理。
    Closed(QueuedMessage),
}

/// 单连接的并发安全写队列。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 多个生产者可以同时向同一连接提交消息，而套接字同一时刻只允许一个写者；
///   队列把“入队顺序 = 上线顺序”与“单一写权”两件事收拢到同一把锁下。
/// - `space_in_bytes` 以原子变量对外发布，背压检查无需取锁。
///
/// ## 逻辑（How）
/// - `state` 互斥保护消息序列、写权标记与关闭标记；生产者的负载准备在锁外完成，
///   锁内只做 O(1) 的入队/出队；
/// - 写权随“取出队首”一并转移给排空者，队首在写出期间对其它上下文不可见；
/// - 监视器注册表独立加锁，回调一律在两把锁之外触发。
///
/// ## 契约（What）
/// - `space_in_bytes()` 恒等于所有排队消息（含正在排空的队首）未写出字节之和，永不为负；
/// - 关闭后不再接受入队，排队消息全部以给定错误失败；
/// - **前置条件**：通过 [`TaskQueue::push`] 直接入队的调用方需自行触发排空
///   （[`AsyncQueueWriter::on_writable`](crate::AsyncQueueWriter::on_writable)）。
pub struct TaskQueue {
    state: Mutex<QueueState>,
    space: AtomicUsize,
    queued: AtomicUsize,
    monitors: MonitorSet,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            space: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            monitors: MonitorSet::default(),
        }
    }

    /// 排队消息尚未写出的字节总数。
    pub fn space_in_bytes(&self) -> usize {
        self.space.load(Ordering::Acquire)
    }

    /// 排队消息条数。
    pub fn len(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// 当前队列状态快照。
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending_bytes: self.space_in_bytes(),
            queued_messages: self.len(),
        }
    }

    /// 队首消息的剩余字节数；队列为空或队首正在被排空时返回 `None`。
    pub fn head_remaining(&self) -> Option<usize> {
        self.state.lock().items.front().map(QueuedMessage::remaining)
    }

    /// 将消息追加到队尾。
    ///
    /// 队列已关闭时消息立即以 [`WriteQueueError::Closed`] 失败，并返回同一错误。
    pub fn push(&self, message: QueuedMessage) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            message.fail(WriteQueueError::Closed);
            return Err(WriteQueueError::Closed);
        }
        self.enqueue(&mut state, message);
        Ok(())
    }

    /// 注册一次性队列监视器。
    ///
    /// 谓词已成立时立即触发 `on_notify` 且不保留注册，返回 `false`；否则返回 `true`。
    pub fn set_queue_monitor(&self, monitor: Arc<dyn QueueMonitor>) -> bool {
        if self.monitors.register(Arc::clone(&monitor), || self.snapshot()) {
            return true;
        }
        tracing::trace!(
            pending = self.space_in_bytes(),
            "queue monitor satisfied on registration"
        );
        monitor.on_notify();
        false
    }

    /// 注销尚未触发的监视器，返回是否找到。
    pub fn remove_queue_monitor(&self, monitor: &Arc<dyn QueueMonitor>) -> bool {
        self.monitors.remove(monitor)
    }

    /// 仍在等待触发的监视器数量。
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// 关闭队列并以 `error` 失败所有排队消息，返回被失败的消息数。
    ///
    /// 正在被排空的队首不在此列：排空者归还它时会得到 [`Restore::Closed`]。
    pub fn close_and_fail_all(&self, error: WriteQueueError) -> usize {
        let drained: Vec<QueuedMessage> = {
            let mut state = self.state.lock();
            state.closed = true;
            let drained: Vec<QueuedMessage> = state.items.drain(..).collect();
            let bytes: usize = drained.iter().map(QueuedMessage::remaining).sum();
            self.release_space(bytes);
            self.queued.store(0, Ordering::Release);
            drained
        };
        self.monitors.clear();
        let count = drained.len();
        for message in drained {
            message.fail(error.clone());
        }
        count
    }

    /// 入队或抢占写权。
    ///
    /// `allow_direct` 为真且队列为空、无人持有写权时，调用方获得写权，消息不入队也不计入
    /// `space_in_bytes`。
    pub(crate) fn offer(&self, message: QueuedMessage, allow_direct: bool) -> Offer {
        let mut state = self.state.lock();
        if state.closed {
            return Offer::Closed(message);
        }
        if allow_direct && !state.writing && state.items.is_empty() {
            state.writing = true;
            return Offer::Owned(message);
        }
        let pending = self.enqueue(&mut state, message);
        Offer::Queued {
            pending,
            needs_drain: !state.writing,
        }
    }

    /// 在持锁状态下追加到队尾并计入积压，返回入队后的 `space_in_bytes`。
    fn enqueue(&self, state: &mut QueueState, message: QueuedMessage) -> usize {
        let remaining = message.remaining();
        state.items.push_back(message);
        self.queued.fetch_add(1, Ordering::AcqRel);
        self.space.fetch_add(remaining, Ordering::AcqRel) + remaining
    }

    /// 直写者归还写权；未写完的剩余部分放回队首。
    ///
    /// 返回 `Ok(needs_drain)`：队列非空时需要登记可写兴趣。连接已关闭时剩余部分原样退回。
    pub(crate) fn release_direct(
        &self,
        remainder: Option<QueuedMessage>,
    ) -> std::result::Result<bool, QueuedMessage> {
        let mut state = self.state.lock();
        state.writing = false;
        if let Some(message) = remainder {
            if state.closed {
                return Err(message);
            }
            self.space.fetch_add(message.remaining(), Ordering::AcqRel);
            self.queued.fetch_add(1, Ordering::AcqRel);
            state.items.push_front(message);
        }
        Ok(!state.items.is_empty())
    }

    /// 尝试成为排空者；已有写者、已关闭或队列为空时返回 `false`。
    pub(crate) fn begin_drain(&self) -> bool {
        let mut state = self.state.lock();
        if state.writing || state.closed || state.items.is_empty() {
            return false;
        }
        state.writing = true;
        true
    }

    /// 排空者取出队首；队列为空时同时释放写权。
    pub(crate) fn take_head(&self) -> Option<QueuedMessage> {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(message) => {
                self.queued.fetch_sub(1, Ordering::AcqRel);
                Some(message)
            }
            None => {
                state.writing = false;
                None
            }
        }
    }

    /// 排空者将未写完的队首放回原位并释放写权。
    pub(crate) fn restore_head(&self, message: QueuedMessage) -> Restore {
        let mut state = self.state.lock();
        state.writing = false;
        if state.closed {
            return Restore::Closed(message);
        }
        state.items.push_front(message);
        self.queued.fetch_add(1, Ordering::AcqRel);
        Restore::Requeued
    }

    /// 释放写权而不归还消息，返回队列是否仍有待排空的消息。
    pub(crate) fn release(&self) -> bool {
        let mut state = self.state.lock();
        state.writing = false;
        !state.closed && !state.items.is_empty()
    }

    /// 扣减已写出（或被丢弃）的字节。
    pub(crate) fn release_space(&self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let previous = self
            .space
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            })
            .unwrap_or_else(|current| current);
        debug_assert!(previous >= bytes, "space_in_bytes underflow");
    }

    /// 在排空步骤之后求值监视器，触发所有新满足条件的监视器。
    pub(crate) fn notify_monitors(&self) {
        for monitor in self.monitors.take_ready(|| self.snapshot()) {
            tracing::trace!(pending = self.space_in_bytes(), "queue monitor notified");
            monitor.on_notify();
        }
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("space_in_bytes", &self.space_in_bytes())
            .field("len", &self.len())
            .field("monitors", &self.monitor_count())
            .finish()
    }
}


#[cfg(all(test, any(loom, spark_loom)))]
mod loom_tests {
    use super::*;
    use bytes::Bytes;
    use loom::sync::atomic::AtomicUsize as Owners;

    const SIZE: usize = 4;

    fn message() -> QueuedMessage {
        QueuedMessage::new(Bytes::from_static(b"abcd"), None, None)
    }

    /// 模拟一次套接字写入：进入时写者计数必须为 1。
    fn write_exclusively(owners: &Owners) {
        assert_eq!(owners.fetch_add(1, Ordering::SeqCst), 0, "出现并发写者");
        loom::thread::yield_now();
        owners.fetch_sub(1, Ordering::SeqCst);
    }

    /// 生产者入队与排空者释放写权竞争时，不得丢失排空唤醒，也不得出现两个写者。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：排空者发现队列为空而释放写权的同时，生产者可能正在入队；
    ///   若双方都认为对方会负责排空，消息将滞留直到下一次写入；
    /// - **逻辑 (How)**：队列预置一条消息，排空线程按 `begin_drain`/`take_head` 循环写出，
    ///   生产线程走 `offer` 的直写或入队路径，并记录是否向反应器登记了可写兴趣；
    /// - **契约 (What)**：任意调度下写者互斥；结束时队列要么为空，要么已登记可写兴趣且写权空闲，
    ///   同时 `space_in_bytes` 与队列内容一致。
    #[test]
    fn loom_offer_and_drain_never_lose_a_wakeup() {
        loom::model(|| {
            let queue = loom::sync::Arc::new(TaskQueue::new());
            let owners = loom::sync::Arc::new(Owners::new(0));
            queue.push(message()).expect("队列未关闭");

            let drainer = {
                let queue = loom::sync::Arc::clone(&queue);
                let owners = loom::sync::Arc::clone(&owners);
                loom::thread::spawn(move || {
                    if queue.begin_drain() {
                        while let Some(head) = queue.take_head() {
                            write_exclusively(&owners);
                            queue.release_space(head.remaining());
                        }
                    }
                })
            };

            let producer = {
                let queue = loom::sync::Arc::clone(&queue);
                let owners = loom::sync::Arc::clone(&owners);
                loom::thread::spawn(move || match queue.offer(message(), true) {
                    Offer::Owned(_) => {
                        write_exclusively(&owners);
                        matches!(queue.release_direct(None), Ok(true))
                    }
                    Offer::Queued { needs_drain, .. } => needs_drain,
                    Offer::Closed(_) => panic!("队列未关闭"),
                })
            };

            drainer.join().expect("排空线程不应 panic");
            let requested = producer.join().expect("生产线程不应 panic");

            assert_eq!(queue.space_in_bytes(), queue.len() * SIZE);
            if !queue.is_empty() {
                assert!(requested, "队列非空却无人登记可写兴趣");
                assert!(queue.begin_drain(), "写权未被释放");
            }
        });
    }
}
