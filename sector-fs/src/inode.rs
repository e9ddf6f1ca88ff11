//! # 索引节点层
//!
//! 内存中的 [`Inode`] 由打开它的所有调用者共享，用打开计数管理生命周期；
//! [`InodeTable`] 记录所有已打开的 inode，保证同一扇区只对应一个内存 inode。
//!
//! 最后一个打开者关闭 inode 时，若它已被标记删除，
//! 则释放其全部数据扇区、索引块以及 inode 自身所在的扇区。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use enumflags2::bitflags;
use log::{debug, warn};
use spin::Mutex;

use crate::layout::DiskInode;
use crate::{BufferCache, Error, SectorAllocator, SectorId};

/// 已打开的 inode 表
#[derive(Debug)]
pub struct InodeTable {
    cache: Arc<BufferCache>,
    allocator: Arc<dyn SectorAllocator>,
    open_inodes: Mutex<BTreeMap<SectorId, Arc<Inode>>>,
}

#[derive(Debug)]
pub struct Inode {
    /// inode所在扇区，同时作为 inode 编号
    sector: SectorId,
    cache: Arc<BufferCache>,
    allocator: Arc<dyn SectorAllocator>,
    state: Mutex<InodeState>,
    /// 只在“检查长度、增长、写回长度”期间持有
    growth: Mutex<()>,
}

#[derive(Debug, Default)]
struct InodeState {
    open_count: u32,
    deny_write_count: u32,
    removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub sector: SectorId,
    pub kind: StatKind,
    /// 文件字节数
    pub length: usize,
    /// 数据扇区与索引块的总数
    pub sectors: usize,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}

impl InodeTable {
    pub fn new(cache: Arc<BufferCache>, allocator: Arc<dyn SectorAllocator>) -> Self {
        Self {
            cache,
            allocator,
            open_inodes: Mutex::new(BTreeMap::new()),
        }
    }

    /// 在 `sector` 上写入一个长度为 `length` 的新 inode，其数据全部清零。
    ///
    /// 即便增长失败，inode 也会带着已登记的扇区写入 `sector`。
    pub fn create(&self, sector: SectorId, length: usize, is_dir: bool) -> Result<(), Error> {
        let mut disk_inode = DiskInode::new(is_dir);
        let result = disk_inode.grow(length, &self.cache, self.allocator.as_ref());
        disk_inode.store(sector, &self.cache);

        debug!("inode: create {sector:?} length={length} dir={is_dir} -> {result:?}");
        result
    }

    /// 打开 `sector` 上的 inode；已打开则返回同一个内存 inode
    pub fn open(&self, sector: SectorId) -> Result<Arc<Inode>, Error> {
        let mut open_inodes = self.open_inodes.lock();

        if let Some(inode) = open_inodes.get(&sector) {
            inode.state.lock().open_count += 1;
            return Ok(inode.clone());
        }

        if !DiskInode::load(sector, &self.cache).is_valid() {
            warn!("inode: {sector:?} does not hold an inode");
            return Err(Error::BadMagic(sector));
        }

        let inode = Arc::new(Inode {
            sector,
            cache: self.cache.clone(),
            allocator: self.allocator.clone(),
            state: Mutex::new(InodeState {
                open_count: 1,
                ..Default::default()
            }),
            growth: Mutex::new(()),
        });
        open_inodes.insert(sector, inode.clone());

        debug!("inode: open {sector:?}");
        Ok(inode)
    }

    /// 再次打开一个已打开的 inode
    pub fn reopen(&self, inode: &Arc<Inode>) -> Arc<Inode> {
        let _open_inodes = self.open_inodes.lock();
        inode.state.lock().open_count += 1;
        inode.clone()
    }

    /// 关闭 inode；最后一个打开者关闭时将其移出表，若已标记删除则回收其扇区。
    ///
    /// 回收期间一直持有表锁，同一扇区的 `open` 要等回收结束才能进行。
    pub fn close(&self, inode: Arc<Inode>) {
        let mut open_inodes = self.open_inodes.lock();
        let removed = {
            let mut state = inode.state.lock();
            assert!(state.open_count > 0, "closing {:?} too many times", inode.sector);

            state.open_count -= 1;
            if state.open_count > 0 {
                return;
            }
            state.removed
        };

        open_inodes.remove(&inode.sector);
        debug!("inode: close {:?}", inode.sector);
        if removed {
            inode.reclaim();
        }
    }

    /// 表中已打开的 inode 个数
    pub fn open_count(&self) -> usize {
        self.open_inodes.lock().len()
    }
}

impl Inode {
    #[inline]
    pub fn sector(&self) -> SectorId {
        self.sector
    }

    #[inline]
    pub fn open_count(&self) -> u32 {
        self.state.lock().open_count
    }

    /// 从指定位置读出数据填充`buf`，返回实际读到的字节数
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        self.disk_inode().read_at(offset, buf, &self.cache)
    }

    /// 从指定位置写入`buf`，必要时先增长文件；返回实际写入的字节数。
    ///
    /// 禁止写入期间返回 0。增长失败时只写入原长度以内的部分。
    pub fn write_at(&self, buf: &[u8], offset: usize) -> usize {
        if self.state.lock().deny_write_count > 0 || buf.is_empty() {
            return 0;
        }
        let Some(end) = offset.checked_add(buf.len()) else {
            warn!("inode: write at {offset} overflows the file offset");
            return 0;
        };

        let disk_inode = {
            let _growth = self.growth.lock();
            // 持锁后重新读取，其他写者可能已经增长过
            let mut disk_inode = self.disk_inode();
            if end > disk_inode.length() {
                if let Err(err) = disk_inode.grow(end, &self.cache, self.allocator.as_ref()) {
                    warn!("inode: {:?} failed to grow to {end} bytes: {err:?}", self.sector);
                }
                disk_inode.store(self.sector, &self.cache);
            }
            disk_inode
        };

        disk_inode.write_at(offset, buf, &self.cache)
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.disk_inode().length()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.disk_inode().is_dir()
    }

    /// 标记删除，待最后一个打开者关闭时回收
    #[inline]
    pub fn remove(&self) {
        self.state.lock().removed = true;
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    /// 禁止写入，每个打开者至多调用一次
    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        state.deny_write_count += 1;
        assert!(state.deny_write_count <= state.open_count);
    }

    /// 恢复写入，调用过 [`Self::deny_write`] 的打开者须在关闭前调用
    pub fn allow_write(&self) {
        let mut state = self.state.lock();
        assert!(state.deny_write_count > 0);
        assert!(state.deny_write_count <= state.open_count);
        state.deny_write_count -= 1;
    }

    pub fn stat(&self) -> Stat {
        let disk_inode = self.disk_inode();
        Stat {
            sector: self.sector,
            kind: if disk_inode.is_dir() {
                StatKind::DIR
            } else {
                StatKind::FILE
            },
            length: disk_inode.length(),
            sectors: DiskInode::count_total_sectors(disk_inode.length()),
        }
    }

    /// 通过缓存读出磁盘 inode 的副本
    pub(crate) fn disk_inode(&self) -> DiskInode {
        let disk_inode = DiskInode::load(self.sector, &self.cache);
        debug_assert!(disk_inode.is_valid(), "{:?} lost its magic", self.sector);
        disk_inode
    }

    fn reclaim(&self) {
        let disk_inode = self.disk_inode();
        disk_inode.free_sectors(&self.cache, self.allocator.as_ref());
        self.allocator.release(self.sector, 1);
        debug!(
            "inode: reclaim {:?} ({} bytes)",
            self.sector,
            disk_inode.length()
        );
    }
}
