use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::{BlockDevice, SECTOR_SIZE};

/// 内存中的块设备，所有扇区初始为零
#[derive(Debug)]
pub struct RamDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    pub fn new(sector_count: usize) -> Self {
        Self {
            sectors: Mutex::new(vec![[0; SECTOR_SIZE]; sector_count]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// 绕过驱动统计，直接取得扇区内容的副本
    pub fn snapshot(&self, sector_id: usize) -> [u8; SECTOR_SIZE] {
        self.sectors.lock()[sector_id]
    }

    /// 驱动层发生过的扇区读次数
    #[inline]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// 驱动层发生过的扇区写次数
    #[inline]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl BlockDevice for RamDisk {
    fn read_sector(&self, sector_id: usize, buf: &mut [u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE, "not a complete sector!");
        self.reads.fetch_add(1, Ordering::Relaxed);
        buf.copy_from_slice(&self.sectors.lock()[sector_id]);
    }

    fn write_sector(&self, sector_id: usize, buf: &[u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE, "not a complete sector!");
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.sectors.lock()[sector_id].copy_from_slice(buf);
    }

    #[inline]
    fn sector_count(&self) -> usize {
        self.sectors.lock().len()
    }
}
