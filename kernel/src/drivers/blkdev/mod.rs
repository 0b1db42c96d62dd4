//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 块设备驱动层
//!
//! 遵循 Linux 块设备的请求/完成模型 (drivers/block/ll_rw_blk.c)：
//!
//! - 驱动按主设备号注册 (blk_dev[major])
//! - `ll_rw_block()` 给缓冲区上锁后提交异步请求
//! - 请求完成以消息形式由驱动交回，`end_request()` 更新缓冲区状态、
//!   解锁并唤醒等待者；`do_block_irq()` 相当于块设备中断处理

pub mod ramdisk;

pub use ramdisk::RamDisk;

use log::{error, trace, warn};

use crate::errno::Errno;
use crate::fs::bio::{BufferId, BufferState};
use crate::kernel::Kernel;

/// 设备号 (dev_t)：高 8 位主设备号，低 8 位次设备号
pub type DevT = u16;

/// 未分配的设备号
pub const NODEV: DevT = 0;

pub const fn mkdev(major: u8, minor: u8) -> DevT {
    ((major as DevT) << 8) | minor as DevT
}

pub const fn major(dev: DevT) -> u8 {
    (dev >> 8) as u8
}

pub const fn minor(dev: DevT) -> u8 {
    (dev & 0xff) as u8
}

/// 请求类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqCmd {
    /// 读
    Read,
    /// 写
    Write,
    /// 预读：缓冲区已上锁时直接放弃
    ReadAhead,
}

/// 块 I/O 请求
#[derive(Debug, Clone)]
pub struct Request {
    pub cmd: ReqCmd,
    pub dev: DevT,
    pub blocknr: u32,
    /// 发起请求的缓冲区，完成时原样带回
    pub buffer: BufferId,
    /// 写请求的数据快照；读请求为空
    pub data: Vec<u8>,
}

/// 请求完成消息
#[derive(Debug, Clone)]
pub struct Completion {
    pub cmd: ReqCmd,
    pub dev: DevT,
    pub blocknr: u32,
    pub buffer: BufferId,
    /// 传输是否成功
    pub uptodate: bool,
    /// 读成功时的块内容
    pub data: Vec<u8>,
}

impl Completion {
    /// 以成功结束请求
    pub fn ok(req: Request, data: Vec<u8>) -> Self {
        Self { cmd: req.cmd, dev: req.dev, blocknr: req.blocknr, buffer: req.buffer, uptodate: true, data }
    }

    /// 以失败结束请求
    pub fn failed(req: Request) -> Self {
        Self { cmd: req.cmd, dev: req.dev, blocknr: req.blocknr, buffer: req.buffer, uptodate: false, data: Vec::new() }
    }
}

/// 块设备驱动
///
/// 提交是异步的：`submit()` 只登记请求，传输结果通过 `poll()` 交回。
pub trait BlockDriver: Send {
    /// 提交一个请求
    fn submit(&mut self, req: Request);

    /// 取出一个已完成的请求
    fn poll(&mut self) -> Option<Completion>;

    /// 尚未完成的请求数
    fn pending(&self) -> usize;

    /// 是否可移动介质（软盘一类）
    fn is_removable(&self, _dev: DevT) -> bool {
        false
    }

    /// 介质自上次询问以来是否被更换过，询问后标志清零
    fn media_changed(&mut self, _dev: DevT) -> bool {
        false
    }
}

impl Kernel {
    /// 注册块设备驱动
    ///
    /// 对应 Linux 的 register_blkdev()；主设备号已被占用时返回 `Errno::DeviceOrResourceBusy`
    pub fn register_blkdev(&self, major: u8, driver: Box<dyn BlockDriver>) -> Result<(), Errno> {
        if major == 0 {
            return Err(Errno::InvalidArgument);
        }
        let mut blk_dev = self.blk_dev.lock();
        if blk_dev.contains_key(&major) {
            return Err(Errno::DeviceOrResourceBusy);
        }
        blk_dev.insert(major, driver);
        Ok(())
    }

    /// 给缓冲区上锁，已上锁时睡眠等待
    fn lock_buffer(&self, id: BufferId) {
        loop {
            {
                let mut pool = self.pool.lock();
                let bh = pool.head_mut(id);
                if !bh.is_locked() {
                    bh.b_state.insert(BufferState::LOCKED);
                    return;
                }
            }
            self.sleep_on(&self.b_wait[id]);
        }
    }

    /// 提交缓冲区读写
    ///
    /// 对应 Linux 的 ll_rw_block()。请求是异步的，调用者需要时自行
    /// wait_on_buffer()。写干净的缓冲区、读已是最新的缓冲区不会产生请求；
    /// 预读遇到已上锁的缓冲区直接放弃。
    pub fn ll_rw_block(&self, cmd: ReqCmd, id: BufferId) {
        let (dev, locked) = {
            let pool = self.pool.lock();
            let bh = pool.head(id);
            (bh.b_dev, bh.is_locked())
        };
        if !self.blk_dev.lock().contains_key(&major(dev)) {
            error!("ll_rw_block: Trying to read nonexistent block-device {:04x}", dev);
            if cmd == ReqCmd::Write && !locked {
                // 永远写不出去，丢弃脏数据，否则淘汰它的 getblk() 会一直重试
                let mut pool = self.pool.lock();
                let bh = pool.head_mut(id);
                bh.b_state.remove(BufferState::DIRTY);
                bh.b_state.insert(BufferState::WRITE_ERR);
                pool.stats.io_errors += 1;
                pool.stats.write_errors += 1;
            }
            return;
        }
        if cmd == ReqCmd::ReadAhead && locked {
            return;
        }

        self.lock_buffer(id);

        let req = {
            let mut pool = self.pool.lock();
            let bh = pool.head_mut(id);
            let skip = match cmd {
                ReqCmd::Write => !bh.is_dirty(),
                ReqCmd::Read | ReqCmd::ReadAhead => bh.is_uptodate(),
            };
            if skip {
                bh.b_state.remove(BufferState::LOCKED);
                None
            } else {
                let data = if cmd == ReqCmd::Write {
                    // 提交时清除脏标志，之后的修改会重新置脏；写失败时恢复
                    bh.b_state.remove(BufferState::DIRTY | BufferState::WRITE_ERR);
                    bh.b_data.to_vec()
                } else {
                    Vec::new()
                };
                let req = Request { cmd, dev: bh.b_dev, blocknr: bh.b_blocknr, buffer: id, data };
                if cmd == ReqCmd::Write {
                    pool.stats.writebacks += 1;
                }
                Some(req)
            }
        };

        let Some(req) = req else {
            self.wake_up(&self.b_wait[id]);
            return;
        };

        trace!("ll_rw_block: {:?} dev {:04x} block {}", req.cmd, req.dev, req.blocknr);
        let mut blk_dev = self.blk_dev.lock();
        match blk_dev.get_mut(&major(req.dev)) {
            Some(driver) => driver.submit(req),
            None => {
                drop(blk_dev);
                self.end_request(Completion::failed(req));
            }
        }
    }

    /// 结束一个请求
    ///
    /// 对应 Linux 的 end_request()：读成功时填充数据并置为最新，读失败时
    /// 清除最新标志，写失败时恢复脏标志；最后解锁并唤醒等待者。
    pub fn end_request(&self, done: Completion) {
        let id = done.buffer;
        {
            let mut pool = self.pool.lock();
            let bh = pool.head_mut(id);
            if !bh.is_locked() {
                warn!("end_request: buffer {} not locked", id);
            }
            match done.cmd {
                ReqCmd::Read | ReqCmd::ReadAhead => {
                    if done.uptodate {
                        let n = done.data.len().min(bh.b_data.len());
                        bh.b_data[..n].copy_from_slice(&done.data[..n]);
                        bh.b_state.insert(BufferState::UPTODATE);
                    } else {
                        bh.b_state.remove(BufferState::UPTODATE);
                    }
                }
                ReqCmd::Write => {
                    if !done.uptodate {
                        bh.b_state.insert(BufferState::DIRTY | BufferState::WRITE_ERR);
                    }
                }
            }
            bh.b_state.remove(BufferState::LOCKED);
            if !done.uptodate {
                error!("I/O error: dev {:04x}, block {}", done.dev, done.blocknr);
                pool.stats.io_errors += 1;
                if done.cmd == ReqCmd::Write {
                    pool.stats.write_errors += 1;
                }
            }
        }
        self.wake_up(&self.b_wait[id]);
    }

    /// 块设备中断：投递所有驱动中已完成的请求，返回投递的数量
    pub fn do_block_irq(&self) -> usize {
        let mut delivered = 0;
        loop {
            let done = {
                let mut blk_dev = self.blk_dev.lock();
                blk_dev.values_mut().find_map(|driver| driver.poll())
            };
            match done {
                Some(done) => {
                    self.end_request(done);
                    delivered += 1;
                }
                None => return delivered,
            }
        }
    }

    /// 所有驱动中尚未完成的请求数
    pub fn blk_pending(&self) -> usize {
        self.blk_dev.lock().values().map(|driver| driver.pending()).sum()
    }

    /// 可移动设备的介质是否更换过
    pub(crate) fn media_changed(&self, dev: DevT) -> bool {
        let mut blk_dev = self.blk_dev.lock();
        match blk_dev.get_mut(&major(dev)) {
            Some(driver) if driver.is_removable(dev) => driver.media_changed(dev),
            _ => false,
        }
    }
}
