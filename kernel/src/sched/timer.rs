//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内核定时器
//!
//! 按相对时间排序的单链表 (kernel/sched.c 的 timer_list)：每个节点
//! 保存的是"前一个节点到期后还要再等多少个滴答"。时钟中断只需递减
//! 链表头，头节点归零时连同后面同样归零的节点一起触发。
//!
//! 节点放在固定容量的槽位池里，链接使用槽位下标。

use log::trace;

use crate::kernel::Kernel;
use crate::kernel_panic;

/// 定时器回调，在时钟中断上下文中执行，不能睡眠
pub type TimerFn = Box<dyn FnOnce(&Kernel) + Send>;

struct TimerEntry {
    /// 相对前一个节点的滴答数
    jiffies: i64,
    func: TimerFn,
    next: Option<usize>,
}

/// 定时器链表
pub struct TimerList {
    slots: Vec<Option<TimerEntry>>,
    head: Option<usize>,
}

impl TimerList {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: None,
        }
    }

    /// 已登记的定时器数量
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn entry(&self, i: usize) -> &TimerEntry {
        match self.slots[i].as_ref() {
            Some(entry) => entry,
            None => kernel_panic!("timer list corrupted at slot {}", i),
        }
    }

    fn entry_mut(&mut self, i: usize) -> &mut TimerEntry {
        match self.slots[i].as_mut() {
            Some(entry) => entry,
            None => kernel_panic!("timer list corrupted at slot {}", i),
        }
    }

    /// 按到期时间插入，`delay` 必须为正
    ///
    /// 到期时间相同的定时器按登记顺序触发。
    pub(crate) fn insert(&mut self, delay: i64, func: TimerFn) {
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            kernel_panic!("No more time requests free");
        };

        let mut delay = delay;
        let mut prev = None;
        let mut cur = self.head;
        while let Some(i) = cur {
            let entry = self.entry(i);
            if delay < entry.jiffies {
                break;
            }
            delay -= entry.jiffies;
            prev = Some(i);
            cur = entry.next;
        }

        // 后继节点的相对时间扣掉新节点占去的部分
        if let Some(i) = cur {
            self.entry_mut(i).jiffies -= delay;
        }
        self.slots[slot] = Some(TimerEntry { jiffies: delay, func, next: cur });
        match prev {
            Some(p) => self.entry_mut(p).next = Some(slot),
            None => self.head = Some(slot),
        }
    }

    /// 时钟滴答：递减链表头，摘下所有到期的定时器
    pub(crate) fn expire(&mut self) -> Vec<TimerFn> {
        let mut due = Vec::new();
        if let Some(h) = self.head {
            self.entry_mut(h).jiffies -= 1;
        }
        while let Some(h) = self.head {
            if self.entry(h).jiffies > 0 {
                break;
            }
            if let Some(entry) = self.slots[h].take() {
                self.head = entry.next;
                due.push(entry.func);
            }
        }
        due
    }

    /// 每个定时器的绝对剩余滴答数，按触发顺序
    pub fn deadlines(&self) -> Vec<i64> {
        let mut out = Vec::new();
        let mut total = 0;
        let mut cur = self.head;
        while let Some(i) = cur {
            let entry = self.entry(i);
            total += entry.jiffies;
            out.push(total);
            cur = entry.next;
        }
        out
    }
}

impl Kernel {
    /// 登记一个 `jiffies` 个滴答后执行的回调
    ///
    /// 对应 Linux 的 add_timer()。`jiffies <= 0` 时立即执行。
    /// 定时器池耗尽是致命错误。
    pub fn add_timer<F>(&self, jiffies: i64, func: F)
    where
        F: FnOnce(&Kernel) + Send + 'static,
    {
        if jiffies <= 0 {
            func(self);
            return;
        }
        trace!("add_timer: {} ticks", jiffies);
        self.timers.lock().insert(jiffies, Box::new(func));
    }

    /// 推进定时器并执行到期回调（回调执行时不持有定时器锁）
    pub(crate) fn run_timers(&self) {
        let due = self.timers.lock().expire();
        for func in due {
            func(self);
        }
    }

    /// 尚未触发的定时器数量
    pub fn pending_timers(&self) -> usize {
        self.timers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TimerFn {
        Box::new(|_: &Kernel| {})
    }

    #[test]
    fn deltas_keep_partial_sums_sorted() {
        let mut list = TimerList::new(8);
        list.insert(5, noop());
        list.insert(2, noop());
        list.insert(9, noop());
        list.insert(5, noop());
        assert_eq!(list.deadlines(), vec![2, 5, 5, 9]);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn expire_pops_only_due_entries() {
        let mut list = TimerList::new(4);
        list.insert(1, noop());
        list.insert(1, noop());
        list.insert(3, noop());
        assert_eq!(list.expire().len(), 2);
        assert_eq!(list.deadlines(), vec![2]);
        assert!(list.expire().is_empty());
        assert_eq!(list.expire().len(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn slots_are_reused_after_expiry() {
        let mut list = TimerList::new(1);
        list.insert(1, noop());
        assert_eq!(list.expire().len(), 1);
        list.insert(4, noop());
        assert_eq!(list.deadlines(), vec![4]);
    }

    #[test]
    #[should_panic(expected = "No more time requests free")]
    fn overflow_is_fatal() {
        let mut list = TimerList::new(2);
        list.insert(1, noop());
        list.insert(2, noop());
        list.insert(3, noop());
    }
}
