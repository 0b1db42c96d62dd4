//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内存盘驱动
//!
//! 每个次设备是一段按块划分的内存。请求在提交时排队，在 `poll()`
//! 时按提交顺序完成，模拟"提交后稍晚由中断报告完成"的时序。
//!
//! `RamDisk` 是一个可克隆的句柄：注册给内核的那份和测试手里的那份
//! 指向同一块存储，测试因此可以注入坏块、模拟换盘、检查落盘内容。

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use spin::Mutex;

use super::{minor, BlockDriver, Completion, DevT, ReqCmd, Request};

struct RamDiskInner {
    block_size: usize,
    /// 次设备号 -> 存储
    disks: BTreeMap<u8, Vec<u8>>,
    queue: VecDeque<Request>,
    removable: bool,
    changed: BTreeSet<DevT>,
    bad_blocks: BTreeSet<(DevT, u32)>,
    reads: u64,
    writes: u64,
}

impl RamDiskInner {
    fn range(&self, dev: DevT, blocknr: u32) -> Option<core::ops::Range<usize>> {
        let disk = self.disks.get(&minor(dev))?;
        let start = blocknr as usize * self.block_size;
        let end = start + self.block_size;
        (end <= disk.len()).then_some(start..end)
    }

    fn execute(&mut self, req: Request) -> Completion {
        if self.bad_blocks.contains(&(req.dev, req.blocknr)) {
            return Completion::failed(req);
        }
        let Some(range) = self.range(req.dev, req.blocknr) else {
            return Completion::failed(req);
        };
        let Some(disk) = self.disks.get_mut(&minor(req.dev)) else {
            return Completion::failed(req);
        };
        match req.cmd {
            ReqCmd::Read | ReqCmd::ReadAhead => {
                self.reads += 1;
                let data = disk[range].to_vec();
                Completion::ok(req, data)
            }
            ReqCmd::Write => {
                self.writes += 1;
                let n = req.data.len().min(range.len());
                disk[range.start..range.start + n].copy_from_slice(&req.data[..n]);
                Completion::ok(req, Vec::new())
            }
        }
    }
}

/// 内存盘
#[derive(Clone)]
pub struct RamDisk {
    inner: Arc<Mutex<RamDiskInner>>,
}

impl RamDisk {
    pub fn new(block_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RamDiskInner {
                block_size,
                disks: BTreeMap::new(),
                queue: VecDeque::new(),
                removable: false,
                changed: BTreeSet::new(),
                bad_blocks: BTreeSet::new(),
                reads: 0,
                writes: 0,
            })),
        }
    }

    /// 添加一个 `nr_blocks` 块、内容全零的次设备
    pub fn add_disk(&self, dev: DevT, nr_blocks: usize) {
        let mut inner = self.inner.lock();
        let size = nr_blocks * inner.block_size;
        inner.disks.insert(minor(dev), vec![0; size]);
    }

    pub fn set_removable(&self, removable: bool) {
        self.inner.lock().removable = removable;
    }

    /// 模拟换盘：换上一张全零的盘，并记下更换标志
    pub fn change_media(&self, dev: DevT) {
        let mut inner = self.inner.lock();
        if let Some(disk) = inner.disks.get_mut(&minor(dev)) {
            disk.fill(0);
        }
        inner.changed.insert(dev);
    }

    /// 之后对该块的读写都失败
    pub fn fail_block(&self, dev: DevT, blocknr: u32) {
        self.inner.lock().bad_blocks.insert((dev, blocknr));
    }

    pub fn heal_block(&self, dev: DevT, blocknr: u32) {
        self.inner.lock().bad_blocks.remove(&(dev, blocknr));
    }

    /// 绕过缓存直接读盘上的块
    pub fn read_raw(&self, dev: DevT, blocknr: u32) -> Option<Vec<u8>> {
        let inner = self.inner.lock();
        let range = inner.range(dev, blocknr)?;
        inner.disks.get(&minor(dev)).map(|disk| disk[range].to_vec())
    }

    /// 绕过缓存直接写盘上的块
    pub fn write_raw(&self, dev: DevT, blocknr: u32, data: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        let Some(range) = inner.range(dev, blocknr) else {
            return false;
        };
        let Some(disk) = inner.disks.get_mut(&minor(dev)) else {
            return false;
        };
        let n = data.len().min(range.len());
        disk[range.start..range.start + n].copy_from_slice(&data[..n]);
        true
    }

    /// 已完成的读请求数
    pub fn reads(&self) -> u64 {
        self.inner.lock().reads
    }

    /// 已完成的写请求数
    pub fn writes(&self) -> u64 {
        self.inner.lock().writes
    }
}

impl BlockDriver for RamDisk {
    fn submit(&mut self, req: Request) {
        self.inner.lock().queue.push_back(req);
    }

    fn poll(&mut self) -> Option<Completion> {
        let mut inner = self.inner.lock();
        let req = inner.queue.pop_front()?;
        Some(inner.execute(req))
    }

    fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    fn is_removable(&self, _dev: DevT) -> bool {
        self.inner.lock().removable
    }

    fn media_changed(&mut self, dev: DevT) -> bool {
        self.inner.lock().changed.remove(&dev)
    }
}
