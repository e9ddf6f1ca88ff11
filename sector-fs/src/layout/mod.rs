//! # 磁盘数据结构层
//!
//! sector-fs 的卷布局：
//! 空闲位图的 inode (扇区 0) | 根目录的 inode (扇区 1) | 由空闲位图分配的扇区
//!
//! 每个磁盘 inode 恰好占据一个扇区。

mod inode;

pub use self::inode::{
    DIRECT_COUNT, DiskInode, INDIRECT_COUNT, IndirectBlock, Location, MAX_FILE_SECTORS, locate,
};
