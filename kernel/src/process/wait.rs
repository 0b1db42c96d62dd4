//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 等待队列 (Wait Queue)
//!
//! 经典 Linux 的 `sleep_on()` 只有一个指针槽，多个睡眠者通过各自栈帧里
//! 保存的前一个占用者串成隐式链表。这里把这条链显式化：
//!
//! - 队列是一个 pid 栈，最后到达的在栈顶
//! - `wake_up()` 取走整条链，唤醒栈顶，并把剩余部分交给它作为"级联"
//! - 被唤醒者的睡眠调用返回时，再唤醒级联中的下一个并把余下的交出去
//!
//! 于是 A、B、C 依次睡眠后一次 `wake_up()` 的恢复顺序是 C、B、A，
//! 每次恢复都发生在前一个睡眠调用结束之后。

use spin::Mutex;

use super::task::Pid;

/// 等待队列头
///
/// 对应 Linux 的 `struct task_struct *` 等待指针
pub struct WaitQueue {
    waiters: Mutex<Vec<Pid>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self { waiters: Mutex::new(Vec::new()) }
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// 当前等待者快照，栈底在前
    pub fn waiters(&self) -> Vec<Pid> {
        self.waiters.lock().clone()
    }

    /// 最后到达的等待者
    pub fn top(&self) -> Option<Pid> {
        self.waiters.lock().last().copied()
    }

    pub(crate) fn push(&self, pid: Pid) {
        self.waiters.lock().push(pid);
    }

    /// 取走整条等待链
    pub(crate) fn take_all(&self) -> Vec<Pid> {
        core::mem::take(&mut *self.waiters.lock())
    }

    /// `pid` 上方还有多少后到的等待者；不在队列中返回 `None`
    pub(crate) fn depth_of(&self, pid: Pid) -> Option<usize> {
        let waiters = self.waiters.lock();
        waiters.iter().rposition(|&p| p == pid).map(|pos| waiters.len() - 1 - pos)
    }

    /// 把 `pid` 从队列中摘下
    ///
    /// 返回排在它下面（更早到达）的等待者，它们从队列中一并移走，
    /// 由 `pid` 负责继续唤醒；排在它上面的等待者留在队列中。
    pub(crate) fn detach(&self, pid: Pid) -> Option<Vec<Pid>> {
        let mut waiters = self.waiters.lock();
        let pos = waiters.iter().rposition(|&p| p == pid)?;
        let mut older: Vec<Pid> = waiters.drain(..=pos).collect();
        older.pop();
        Some(older)
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_all_empties_the_queue() {
        let wq = WaitQueue::new();
        wq.push(1);
        wq.push(2);
        assert_eq!(wq.top(), Some(2));
        assert_eq!(wq.take_all(), vec![1, 2]);
        assert!(wq.is_empty());
        assert_eq!(wq.top(), None);
    }

    #[test]
    fn depth_counts_later_arrivals() {
        let wq = WaitQueue::new();
        for pid in [3, 4, 5] {
            wq.push(pid);
        }
        assert_eq!(wq.depth_of(5), Some(0));
        assert_eq!(wq.depth_of(3), Some(2));
        assert_eq!(wq.depth_of(9), None);
    }

    #[test]
    fn detach_takes_older_waiters_and_leaves_newer_ones() {
        let wq = WaitQueue::new();
        for pid in [1, 2, 3, 4] {
            wq.push(pid);
        }
        assert_eq!(wq.detach(3), Some(vec![1, 2]));
        assert_eq!(wq.waiters(), vec![4]);
        assert_eq!(wq.detach(3), None);
        assert_eq!(wq.detach(4), Some(vec![]));
        assert!(wq.is_empty());
    }
}
