//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 块读取与回写
//!
//! 遵循 Linux 的 fs/buffer.c：
//! - bread() / breada() / bread_page(): 经缓冲区读块
//! - sync_dev() / sys_sync(): 两遍回写，中间让文件系统把元数据写进缓冲区
//! - check_disk_change(): 可移动介质更换后丢弃旧缓存
//!
//! 所有读写请求都经 ll_rw_block() 异步提交，这里负责等待它们完成。

use log::{debug, info, warn};

use crate::drivers::blkdev::{DevT, ReqCmd};
use crate::errno::Errno;
use crate::fs::bio::{BufferHandle, BufferId};
use crate::kernel::Kernel;

impl Kernel {
    /// 读取一个块
    ///
    /// 对应 Linux 的 bread()
    ///
    /// # 返回
    /// 持有引用且内容有效的缓冲区；读失败时释放缓冲区并返回 `Errno::IOError`
    pub fn bread(&self, dev: DevT, blocknr: u32) -> Result<BufferHandle, Errno> {
        let bh = self.getblk(dev, blocknr);
        if self.is_uptodate(&bh) {
            return Ok(bh);
        }
        self.ll_rw_block(ReqCmd::Read, bh.id());
        self.wait_on_buffer(bh.id());
        if self.is_uptodate(&bh) {
            return Ok(bh);
        }
        self.brelse(bh);
        Err(Errno::IOError)
    }

    /// 读取一个块，同时为后续的块发起预读
    ///
    /// 对应 Linux 的 breada()。预读的缓冲区提交后立即放弃引用，
    /// 它们在完成后留在缓存里供之后的 bread() 命中。
    pub fn breada(&self, dev: DevT, first: u32, rest: &[u32]) -> Result<BufferHandle, Errno> {
        let bh = self.getblk(dev, first);
        if !self.is_uptodate(&bh) {
            self.ll_rw_block(ReqCmd::Read, bh.id());
        }
        for &blocknr in rest {
            let tmp = self.getblk(dev, blocknr);
            if !self.is_uptodate(&tmp) {
                self.ll_rw_block(ReqCmd::ReadAhead, tmp.id());
            }
            self.bforget(tmp);
        }
        self.wait_on_buffer(bh.id());
        if self.is_uptodate(&bh) {
            return Ok(bh);
        }
        self.brelse(bh);
        Err(Errno::IOError)
    }

    /// 一次读取最多 4 个块到连续内存
    ///
    /// 对应 Linux 的 bread_page()。块号为 0 的位置跳过；第 i 个块复制到
    /// `dest[i * block_size..]`，放不下的部分截断。
    ///
    /// # 返回
    /// 成功复制的块数。无论成功与否，所有缓冲区都会被释放。
    pub fn bread_page(&self, dev: DevT, blocks: [u32; 4], dest: &mut [u8]) -> usize {
        let block_size = self.block_size();
        let mut bhs: [Option<BufferHandle>; 4] = Default::default();
        for (slot, &blocknr) in bhs.iter_mut().zip(blocks.iter()) {
            if blocknr == 0 {
                continue;
            }
            let bh = self.getblk(dev, blocknr);
            if !self.is_uptodate(&bh) {
                self.ll_rw_block(ReqCmd::Read, bh.id());
            }
            *slot = Some(bh);
        }

        let mut copied = 0;
        for (i, slot) in bhs.into_iter().enumerate() {
            let Some(bh) = slot else { continue };
            self.wait_on_buffer(bh.id());
            if self.is_uptodate(&bh) {
                let start = (i * block_size).min(dest.len());
                let end = (start + block_size).min(dest.len());
                self.read_buffer(&bh, 0, &mut dest[start..end]);
                copied += 1;
            }
            self.brelse(bh);
        }
        copied
    }

    /// 提交 `dev` 上（`None` 表示所有设备）的全部脏缓冲区，记下提交过的缓冲区
    fn write_dirty(&self, dev: Option<DevT>, submitted: &mut Vec<(BufferId, DevT, u32)>) {
        for id in 0..self.nr_buffers() {
            self.wait_on_buffer(id);
            let wanted = {
                let pool = self.pool.lock();
                let bh = pool.head(id);
                (bh.is_dirty() && dev.map_or(true, |dev| bh.b_dev == dev)).then_some((id, bh.b_dev, bh.b_blocknr))
            };
            if let Some(entry) = wanted {
                self.ll_rw_block(ReqCmd::Write, id);
                if !submitted.contains(&entry) {
                    submitted.push(entry);
                }
            }
        }
    }

    /// 等待 `dev` 上（`None` 表示所有设备）的全部缓冲区解锁
    fn wait_all(&self, dev: Option<DevT>) {
        for id in 0..self.nr_buffers() {
            let wanted = dev.map_or(true, |dev| self.pool.lock().head(id).b_dev == dev);
            if wanted {
                self.wait_on_buffer(id);
            }
        }
    }

    fn do_sync(&self, dev: Option<DevT>) -> Result<(), Errno> {
        let mut submitted = Vec::new();
        self.write_dirty(dev, &mut submitted);
        if let Some(ops) = self.super_operations() {
            ops.sync_inodes(self);
        }
        self.write_dirty(dev, &mut submitted);
        self.wait_all(dev);
        // 只看本次提交过、且仍是同一个块的缓冲区
        let failed = submitted
            .iter()
            .filter(|&&(id, b_dev, b_blocknr)| {
                let info = self.buffer_info(id);
                info.dev == b_dev && info.blocknr == b_blocknr && self.write_failed(id)
            })
            .count();
        if failed > 0 {
            warn!("sync: {} block(s) could not be written", failed);
            return Err(Errno::IOError);
        }
        Ok(())
    }

    /// 把设备上的脏块全部写回
    ///
    /// 对应 Linux 的 sync_dev()。第一遍回写数据块，然后让文件系统把
    /// inode 写进缓冲区，第二遍再回写一次；返回时所有写请求都已完成。
    ///
    /// # 返回
    /// 期间有写请求失败时返回 `Errno::IOError`，失败的块仍然是脏的
    pub fn sync_dev(&self, dev: DevT) -> Result<(), Errno> {
        debug!("sync_dev: {:04x}", dev);
        self.do_sync(Some(dev))
    }

    /// 把所有设备的脏块写回
    ///
    /// 对应 Linux 的 sys_sync()
    pub fn sys_sync(&self) -> Result<(), Errno> {
        debug!("sys_sync");
        self.do_sync(None)
    }

    /// 写回单个持有的缓冲区并等待完成
    pub fn sync_dirty_buffer(&self, bh: &BufferHandle) -> Result<(), Errno> {
        self.ll_rw_block(ReqCmd::Write, bh.id());
        self.wait_on_buffer(bh.id());
        if self.write_failed(bh.id()) {
            return Err(Errno::IOError);
        }
        Ok(())
    }

    /// 检查可移动介质是否被更换
    ///
    /// 对应 Linux 的 check_disk_change()。介质更换过时卸下设备上的超级块，
    /// 丢弃其 inode 和全部缓冲区。
    ///
    /// # 返回
    /// 是否检测到更换
    pub fn check_disk_change(&self, dev: DevT) -> bool {
        if !self.media_changed(dev) {
            return false;
        }
        info!("VFS: Disk change detected on device {:04x}", dev);
        if let Some(ops) = self.super_operations() {
            ops.put_super(self, dev);
            ops.invalidate_inodes(self, dev);
        }
        self.invalidate_buffers(dev);
        true
    }
}
