//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! Hearth 演示内核
//!
//! 启动流程：
//! 1. 读取配置（命令行给出的 TOML 文件，否则用编译期默认值）
//! 2. 初始化日志
//! 3. 创建内核，在主设备号 1 上注册内存盘
//! 4. 创建写者、读者、时钟三个任务，空闲任务驱动它们直到全部结束
//!
//! 用法：
//! ```bash
//! cargo run --package hearth -- Kernel.toml
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};

use hearth::drivers::blkdev::{major, mkdev, DevT, RamDisk};
use hearth::kconfig::KernelConfig;
use hearth::process::wait::WaitQueue;
use hearth::sched::sched::Privilege;
use hearth::{klog, Kernel};

const RAMDISK: DevT = mkdev(1, 0);
const RAMDISK_BLOCKS: usize = 256;
const DEMO_BLOCKS: u32 = 16;

fn load_config() -> Result<KernelConfig, String> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).map_err(|e| format!("{}: {}", path, e))?;
            KernelConfig::from_toml(&text).map_err(|e| format!("{}: {}", path, e))
        }
        None => Ok(KernelConfig::default()),
    }
}

/// 写者：给每个块填上块号，然后 sync
fn writer(k: &Kernel) -> i32 {
    for blocknr in 1..=DEMO_BLOCKS {
        let bh = k.getblk(RAMDISK, blocknr);
        let data = vec![blocknr as u8; k.block_size()];
        k.write_buffer(&bh, 0, &data);
        k.brelse(bh);
    }
    match k.sync_dev(RAMDISK) {
        Ok(()) => 0,
        Err(err) => {
            error!("writer: sync_dev failed: {}", err);
            err.as_neg_i32()
        }
    }
}

/// 读者：等写者完成后逐块校验
fn reader(k: &Kernel, done: &WaitQueue) -> i32 {
    k.sleep_on(done);
    let mut bad = 0;
    for blocknr in 1..=DEMO_BLOCKS {
        let next = (blocknr % DEMO_BLOCKS) + 1;
        match k.breada(RAMDISK, blocknr, &[next]) {
            Ok(bh) => {
                let mut byte = [0u8; 1];
                k.read_buffer(&bh, 0, &mut byte);
                if byte[0] != blocknr as u8 {
                    warn!("reader: block {} holds {:#x}", blocknr, byte[0]);
                    bad += 1;
                }
                k.brelse(bh);
            }
            Err(err) => {
                error!("reader: block {}: {}", blocknr, err);
                bad += 1;
            }
        }
    }
    bad
}

fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("hearth: {}", msg);
            return ExitCode::FAILURE;
        }
    };
    klog::init(config.log_level());

    let kernel = match Kernel::new(config) {
        Ok(kernel) => kernel,
        Err(err) => {
            error!("hearth: bad configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let disk = RamDisk::new(kernel.block_size());
    disk.add_disk(RAMDISK, RAMDISK_BLOCKS);
    if let Err(err) = kernel.register_blkdev(major(RAMDISK), Box::new(disk.clone())) {
        error!("hearth: cannot register ramdisk: {}", err);
        return ExitCode::FAILURE;
    }

    let done = Arc::new(WaitQueue::new());
    let spawned = (|| {
        let reader_wq = done.clone();
        let reader_pid = kernel.spawn(move |k| reader(k, &reader_wq))?;
        let writer_wq = done.clone();
        let writer_pid = kernel.spawn_with_priority(20, move |k| {
            let code = writer(k);
            k.wake_up(&writer_wq);
            code
        })?;
        let ticker_pid = kernel.spawn_with_priority(5, |k| {
            for _ in 0..10 {
                k.do_timer(Privilege::User);
            }
            0
        })?;
        Ok::<_, hearth::errno::Errno>([writer_pid, reader_pid, ticker_pid])
    })();
    let pids = match spawned {
        Ok(pids) => pids,
        Err(err) => {
            error!("hearth: spawn failed: {}", err);
            return ExitCode::FAILURE;
        }
    };

    kernel.run_until_idle();
    kernel.show_stat();

    let mut failed = false;
    for (name, pid) in ["writer", "reader", "ticker"].into_iter().zip(pids) {
        match kernel.reap(pid) {
            Ok(0) => info!("{} (pid {}) finished", name, pid),
            Ok(code) => {
                warn!("{} (pid {}) exited with {}", name, pid, code);
                failed = true;
            }
            Err(err) => {
                warn!("{} (pid {}) did not finish: {}", name, pid, err);
                failed = true;
            }
        }
    }

    let stats = kernel.buffer_stats();
    info!(
        "buffer cache: {} hits, {} misses, {} claims, {} writebacks, {} I/O errors; disk: {} reads, {} writes",
        stats.hits, stats.misses, stats.claims, stats.writebacks, stats.io_errors,
        disk.reads(), disk.writes()
    );

    if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}
