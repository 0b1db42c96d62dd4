//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! Buffer I/O 层 - 块缓存管理
//!
//! 遵循 Linux 的 buffer cache 设计 (fs/buffer.c, include/linux/buffer_head.h)
//!
//! 核心概念：
//! - `struct buffer_head`: 缓冲区头，表示一个被缓存的块
//! - 哈希表：按 (设备号, 块号) 快速查找已缓存的块
//! - 空闲表：包含全部缓冲区的环形双向链表，顺序即淘汰顺序；
//!   "空闲"只表示引用计数为零，缓冲区从不离开这张表
//!
//! 缓冲区在初始化后数量固定，只会被重新标记到别的块上。链接全部使用
//! 槽位下标。每次可能睡眠的等待之后，getblk() 都重新检查它依赖的条件。

use bitflags::bitflags;
use log::{debug, trace, warn};

use crate::drivers::blkdev::{DevT, ReqCmd, NODEV};
use crate::kconfig::BufferConfig;
use crate::kernel::Kernel;
use crate::kernel_panic;

/// 缓冲区槽位下标
pub type BufferId = usize;

bitflags! {
    /// 缓冲区状态位
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BufferState: u8 {
        /// 内容与磁盘一致，或已被完整写入 (BH_Uptodate)
        const UPTODATE = 1 << 0;
        /// 内容比磁盘新，需要写回 (BH_Dirty)
        const DIRTY = 1 << 1;
        /// I/O 进行中 (BH_Lock)
        const LOCKED = 1 << 2;
        /// 最近一次写请求失败，下次提交写请求时清除 (BH_Write_EIO)
        const WRITE_ERR = 1 << 3;
    }
}

/// 缓冲区头
pub struct BufferHead {
    /// 设备号，`NODEV` 表示未分配
    pub b_dev: DevT,
    /// 块号
    pub b_blocknr: u32,
    /// 缓冲区状态
    pub b_state: BufferState,
    /// 引用计数
    pub b_count: u32,
    /// 数据
    pub b_data: Box<[u8]>,
    /// 哈希链
    b_prev: Option<BufferId>,
    b_next: Option<BufferId>,
    /// 空闲表（环形）
    b_prev_free: BufferId,
    b_next_free: BufferId,
}

impl BufferHead {
    fn new(id: BufferId, nr: usize, block_size: usize) -> Self {
        Self {
            b_dev: NODEV,
            b_blocknr: 0,
            b_state: BufferState::empty(),
            b_count: 0,
            b_data: vec![0u8; block_size].into_boxed_slice(),
            b_prev: None,
            b_next: None,
            b_prev_free: (id + nr - 1) % nr,
            b_next_free: (id + 1) % nr,
        }
    }

    pub fn is_uptodate(&self) -> bool {
        self.b_state.contains(BufferState::UPTODATE)
    }

    pub fn is_dirty(&self) -> bool {
        self.b_state.contains(BufferState::DIRTY)
    }

    pub fn is_locked(&self) -> bool {
        self.b_state.contains(BufferState::LOCKED)
    }

    /// 淘汰代价：脏块要先写回，上锁的块要先等
    fn badness(&self) -> u32 {
        ((self.is_dirty() as u32) << 1) + self.is_locked() as u32
    }
}

/// 块缓存统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    /// 查找命中
    pub hits: u64,
    /// 查找未命中
    pub misses: u64,
    /// 缓冲区被重新标记的次数
    pub claims: u64,
    /// 提交的写请求
    pub writebacks: u64,
    /// 失败的请求
    pub io_errors: u64,
    /// 其中失败的写请求
    pub write_errors: u64,
}

/// 缓冲区状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub dev: DevT,
    pub blocknr: u32,
    pub count: u32,
    pub state: BufferState,
}

/// 已持有的缓冲区
///
/// getblk()/bread() 返回，必须交回 brelse()。持有期间缓冲区不会被
/// 重新标记到别的块。
#[must_use = "buffer must be released with brelse()"]
#[derive(Debug, PartialEq, Eq)]
pub struct BufferHandle {
    id: BufferId,
    dev: DevT,
    blocknr: u32,
}

impl BufferHandle {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn dev(&self) -> DevT {
        self.dev
    }

    pub fn blocknr(&self) -> u32 {
        self.blocknr
    }
}

/// 缓冲池：缓冲区头数组 + 哈希表 + 空闲表
pub struct BufferPool {
    buffers: Vec<BufferHead>,
    hash_table: Vec<Option<BufferId>>,
    /// 空闲表头，淘汰扫描从这里开始
    free_list: BufferId,
    block_size: usize,
    pub(crate) stats: BufferStats,
}

impl BufferPool {
    pub fn new(config: &BufferConfig) -> Self {
        let nr = config.nr_buffers;
        Self {
            buffers: (0..nr).map(|id| BufferHead::new(id, nr, config.block_size)).collect(),
            hash_table: vec![None; config.nr_hash],
            free_list: 0,
            block_size: config.block_size,
            stats: BufferStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn head(&self, id: BufferId) -> &BufferHead {
        &self.buffers[id]
    }

    pub(crate) fn head_mut(&mut self, id: BufferId) -> &mut BufferHead {
        &mut self.buffers[id]
    }

    pub fn info(&self, id: BufferId) -> BufferInfo {
        let bh = &self.buffers[id];
        BufferInfo { dev: bh.b_dev, blocknr: bh.b_blocknr, count: bh.b_count, state: bh.b_state }
    }

    fn hashfn(&self, dev: DevT, blocknr: u32) -> usize {
        ((dev as u32 ^ blocknr) as usize) % self.hash_table.len()
    }

    /// 从哈希链和空闲表上摘下
    fn remove_from_queues(&mut self, id: BufferId) {
        let bh = &self.buffers[id];
        let (dev, blocknr) = (bh.b_dev, bh.b_blocknr);
        let (prev, next) = (bh.b_prev, bh.b_next);
        let (prev_free, next_free) = (bh.b_prev_free, bh.b_next_free);

        if dev != NODEV {
            match prev {
                Some(p) => self.buffers[p].b_next = next,
                None => {
                    let h = self.hashfn(dev, blocknr);
                    if self.hash_table[h] == Some(id) {
                        self.hash_table[h] = next;
                    }
                }
            }
            if let Some(n) = next {
                self.buffers[n].b_prev = prev;
            }
        }
        self.buffers[id].b_prev = None;
        self.buffers[id].b_next = None;

        if self.buffers[prev_free].b_next_free != id || self.buffers[next_free].b_prev_free != id {
            kernel_panic!("Free block list corrupted");
        }
        self.buffers[prev_free].b_next_free = next_free;
        self.buffers[next_free].b_prev_free = prev_free;
        if self.free_list == id {
            self.free_list = next_free;
        }
    }

    /// 放到空闲表尾，挂到新哈希链的链头
    fn insert_into_queues(&mut self, id: BufferId) {
        let head = self.free_list;
        let tail = self.buffers[head].b_prev_free;
        self.buffers[id].b_next_free = head;
        self.buffers[id].b_prev_free = tail;
        self.buffers[tail].b_next_free = id;
        self.buffers[head].b_prev_free = id;

        let (dev, blocknr) = (self.buffers[id].b_dev, self.buffers[id].b_blocknr);
        if dev == NODEV {
            return;
        }
        let h = self.hashfn(dev, blocknr);
        let first = self.hash_table[h];
        self.buffers[id].b_prev = None;
        self.buffers[id].b_next = first;
        if let Some(f) = first {
            self.buffers[f].b_prev = Some(id);
        }
        self.hash_table[h] = Some(id);
    }

    /// 在哈希表中查找，不睡眠，不改变引用计数
    pub fn find_buffer(&self, dev: DevT, blocknr: u32) -> Option<BufferId> {
        let mut cur = self.hash_table[self.hashfn(dev, blocknr)];
        while let Some(id) = cur {
            let bh = &self.buffers[id];
            if bh.b_dev == dev && bh.b_blocknr == blocknr {
                return Some(id);
            }
            cur = bh.b_next;
        }
        None
    }

    /// 沿空闲表选出淘汰代价最小的未引用缓冲区
    ///
    /// 代价相同时取先遇到的；代价为零立即返回。
    pub fn select_victim(&self) -> Option<BufferId> {
        let mut best: Option<(BufferId, u32)> = None;
        let mut id = self.free_list;
        loop {
            let bh = &self.buffers[id];
            if bh.b_count == 0 {
                let badness = bh.badness();
                if best.map_or(true, |(_, b)| badness < b) {
                    best = Some((id, badness));
                    if badness == 0 {
                        break;
                    }
                }
            }
            id = bh.b_next_free;
            if id == self.free_list {
                break;
            }
        }
        best.map(|(id, _)| id)
    }

    /// 把缓冲区重新标记为 (dev, blocknr) 并取得第一个引用
    pub(crate) fn claim(&mut self, id: BufferId, dev: DevT, blocknr: u32) {
        self.remove_from_queues(id);
        let bh = &mut self.buffers[id];
        bh.b_count = 1;
        bh.b_state.remove(BufferState::DIRTY | BufferState::UPTODATE | BufferState::WRITE_ERR);
        bh.b_dev = dev;
        bh.b_blocknr = blocknr;
        self.insert_into_queues(id);
        self.stats.claims += 1;
    }

    pub(crate) fn get(&mut self, id: BufferId) {
        self.buffers[id].b_count += 1;
    }

    /// 释放一个引用；引用计数已为零是致命错误
    pub(crate) fn put(&mut self, id: BufferId) {
        let bh = &mut self.buffers[id];
        if bh.b_count == 0 {
            kernel_panic!("Trying to free free buffer");
        }
        bh.b_count -= 1;
    }

    /// 检查哈希表与空闲表的一致性
    pub fn check(&self) -> Result<(), &'static str> {
        let nr = self.buffers.len();
        let mut seen = vec![false; nr];
        let mut id = self.free_list;
        for _ in 0..nr {
            if seen[id] {
                return Err("buffer appears twice on the free list");
            }
            seen[id] = true;
            let next = self.buffers[id].b_next_free;
            if self.buffers[next].b_prev_free != id {
                return Err("free list links are inconsistent");
            }
            id = next;
        }
        if id != self.free_list || seen.iter().any(|s| !s) {
            return Err("free list does not cover the pool");
        }

        let mut hashed = 0;
        for (h, first) in self.hash_table.iter().enumerate() {
            let mut prev = None;
            let mut cur = *first;
            while let Some(id) = cur {
                let bh = &self.buffers[id];
                if bh.b_dev == NODEV {
                    return Err("unassigned buffer on a hash chain");
                }
                if self.hashfn(bh.b_dev, bh.b_blocknr) != h {
                    return Err("buffer on the wrong hash chain");
                }
                if bh.b_prev != prev {
                    return Err("hash chain links are inconsistent");
                }
                hashed += 1;
                if hashed > nr {
                    return Err("hash chain loops");
                }
                prev = cur;
                cur = bh.b_next;
            }
        }
        if hashed != self.buffers.iter().filter(|bh| bh.b_dev != NODEV).count() {
            return Err("assigned buffer missing from the hash table");
        }
        Ok(())
    }
}

impl Kernel {
    /// 等待缓冲区解锁
    pub fn wait_on_buffer(&self, id: BufferId) {
        while self.pool.lock().head(id).is_locked() {
            self.sleep_on(&self.b_wait[id]);
        }
    }

    /// 查找已缓存的块并取得引用
    ///
    /// 先增加引用计数再等待解锁，这样等待期间缓冲区不会被挪作他用；
    /// 醒来后块号变了（只可能是被失效后重新标记）就放弃重找。
    pub fn get_hash_table(&self, dev: DevT, blocknr: u32) -> Option<BufferHandle> {
        loop {
            let id = {
                let mut pool = self.pool.lock();
                let id = pool.find_buffer(dev, blocknr)?;
                pool.get(id);
                id
            };
            self.wait_on_buffer(id);
            let mut pool = self.pool.lock();
            let bh = pool.head(id);
            if bh.b_dev == dev && bh.b_blocknr == blocknr {
                pool.stats.hits += 1;
                return Some(BufferHandle { id, dev, blocknr });
            }
            pool.put(id);
        }
    }

    /// 取得 (dev, blocknr) 对应的缓冲区
    ///
    /// 对应 Linux 的 getblk()。返回的缓冲区已解锁、引用计数加一，内容
    /// 不一定有效。过程中的每次等待都可能让别的任务改变缓冲池，所以
    /// 醒来后都要重新验证。
    pub fn getblk(&self, dev: DevT, blocknr: u32) -> BufferHandle {
        'repeat: loop {
            if let Some(bh) = self.get_hash_table(dev, blocknr) {
                return bh;
            }

            let victim = {
                let mut pool = self.pool.lock();
                pool.stats.misses += 1;
                pool.select_victim()
            };
            let Some(id) = victim else {
                trace!("getblk: no free buffer, waiting");
                self.sleep_on(&self.buffer_wait);
                continue 'repeat;
            };

            self.wait_on_buffer(id);
            if self.pool.lock().head(id).b_count != 0 {
                continue 'repeat;
            }

            while self.pool.lock().head(id).is_dirty() {
                self.ll_rw_block(ReqCmd::Write, id);
                self.wait_on_buffer(id);
                let mut pool = self.pool.lock();
                let bh = pool.head_mut(id);
                if bh.b_count != 0 {
                    continue 'repeat;
                }
                if bh.b_state.contains(BufferState::WRITE_ERR) {
                    // 写不出去的块不重试，丢弃数据换取进展
                    warn!("getblk: dropping unwritable block {} of dev {:04x}", bh.b_blocknr, bh.b_dev);
                    bh.b_state.remove(BufferState::DIRTY | BufferState::WRITE_ERR);
                }
            }

            // 睡眠期间别的任务可能已经把这个块装进来了
            let mut pool = self.pool.lock();
            if pool.find_buffer(dev, blocknr).is_some() {
                continue 'repeat;
            }
            pool.claim(id, dev, blocknr);
            debug!("getblk: buffer {} -> dev {:04x} block {}", id, dev, blocknr);
            return BufferHandle { id, dev, blocknr };
        }
    }

    /// 释放缓冲区
    ///
    /// 对应 Linux 的 brelse()。不改变缓冲区在空闲表中的位置。
    pub fn brelse(&self, bh: BufferHandle) {
        self.wait_on_buffer(bh.id);
        self.pool.lock().put(bh.id);
        self.wake_up(&self.buffer_wait);
    }

    /// 放弃引用但不等待解锁（预读的缓冲区用）
    pub(crate) fn bforget(&self, bh: BufferHandle) {
        self.pool.lock().put(bh.id);
        self.wake_up(&self.buffer_wait);
    }

    /// 使设备的全部缓冲区失效
    ///
    /// 对应 Linux 的 invalidate_buffers()，换盘时使用。
    pub fn invalidate_buffers(&self, dev: DevT) {
        for id in 0..self.nr_buffers() {
            if self.pool.lock().head(id).b_dev != dev {
                continue;
            }
            self.wait_on_buffer(id);
            let mut pool = self.pool.lock();
            let bh = pool.head_mut(id);
            if bh.b_dev == dev {
                bh.b_state.remove(BufferState::UPTODATE | BufferState::DIRTY | BufferState::WRITE_ERR);
            }
        }
    }

    /// 从缓冲区 `offset` 处读出数据，返回读出的字节数
    pub fn read_buffer(&self, bh: &BufferHandle, offset: usize, buf: &mut [u8]) -> usize {
        let pool = self.pool.lock();
        let data = &pool.head(bh.id).b_data;
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        n
    }

    /// 向缓冲区 `offset` 处写入数据并置脏，返回写入的字节数
    ///
    /// 覆盖整块的写入同时把缓冲区置为最新。
    pub fn write_buffer(&self, bh: &BufferHandle, offset: usize, buf: &[u8]) -> usize {
        let mut pool = self.pool.lock();
        let head = pool.head_mut(bh.id);
        if offset >= head.b_data.len() {
            return 0;
        }
        let n = buf.len().min(head.b_data.len() - offset);
        head.b_data[offset..offset + n].copy_from_slice(&buf[..n]);
        head.b_state.insert(BufferState::DIRTY);
        if offset == 0 && n == head.b_data.len() {
            head.b_state.insert(BufferState::UPTODATE);
        }
        n
    }

    pub fn mark_dirty(&self, bh: &BufferHandle) {
        self.pool.lock().head_mut(bh.id).b_state.insert(BufferState::DIRTY);
    }

    pub fn is_uptodate(&self, bh: &BufferHandle) -> bool {
        self.pool.lock().head(bh.id).is_uptodate()
    }

    pub fn is_dirty(&self, bh: &BufferHandle) -> bool {
        self.pool.lock().head(bh.id).is_dirty()
    }

    pub fn buffer_info(&self, id: BufferId) -> BufferInfo {
        self.pool.lock().info(id)
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.pool.lock().stats
    }

    /// 检查缓冲池结构完整性
    pub fn check_buffers(&self) -> Result<(), &'static str> {
        self.pool.lock().check()
    }

    pub fn nr_buffers(&self) -> usize {
        self.pool.lock().len()
    }

    /// 缓冲区最近一次写请求是否失败
    pub(crate) fn write_failed(&self, id: BufferId) -> bool {
        self.pool.lock().head(id).b_state.contains(BufferState::WRITE_ERR)
    }
}
