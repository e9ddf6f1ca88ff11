#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* sector-fs 的整体架构，自上而下 */

// 卷：格式化、挂载与卸载，持有下面各层
mod fs;

// 索引节点层：打开的 inode 表，文件的创建、打开、读写与回收
mod inode;

// 磁盘数据结构层：磁盘 inode 与索引块，以及逻辑偏移到扇区的映射
mod layout;

// 空闲扇区管理：位图分配器
mod free_map;

// 缓冲区缓存层：所有扇区读写的唯一通路
mod cache;

mod error;
mod sector;

pub use block_dev::{BlockDevice, SECTOR_SIZE};

pub use self::{
    cache::BufferCache,
    error::Error,
    free_map::{FreeMap, SectorAllocator},
    fs::FileSystem,
    inode::{Inode, InodeTable, Stat, StatKind},
    layout::{
        DIRECT_COUNT, DiskInode, INDIRECT_COUNT, IndirectBlock, Location, MAX_FILE_SECTORS,
        locate,
    },
    sector::SectorId,
};

/// 磁盘 inode 的魔数，用于识别误当作 inode 读取的扇区
pub const INODE_MAGIC: u32 = 0x494e_4f44;
/// 缓冲区缓存默认的槽位数
pub const CACHE_CAPACITY: usize = 64;
/// 空闲位图文件的 inode 所在扇区
pub const FREE_MAP_SECTOR: SectorId = SectorId::new(0);
/// 根目录的 inode 所在扇区
pub const ROOT_DIR_SECTOR: SectorId = SectorId::new(1);

type DataSector = [u8; SECTOR_SIZE];
