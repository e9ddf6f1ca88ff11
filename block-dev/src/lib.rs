//! # 块设备接口层
//!
//! 块设备是以**扇区**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 文件系统只通过块设备驱动读写块设备，且每次读写恰好一个扇区。

#![no_std]

extern crate alloc;

use core::fmt::Debug;

mod ram_disk;

pub use self::ram_disk::RamDisk;

/// 扇区字节数
pub const SECTOR_SIZE: usize = 512;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Debug {
    /// 读出一整个扇区，`buf` 的长度必须为 [`SECTOR_SIZE`]
    fn read_sector(&self, sector_id: usize, buf: &mut [u8]);

    /// 写入一整个扇区，`buf` 的长度必须为 [`SECTOR_SIZE`]
    fn write_sector(&self, sector_id: usize, buf: &[u8]);

    /// 设备的扇区总数
    fn sector_count(&self) -> usize;
}
