//! 磁盘 inode 与间接索引块
//! - 直接索引：inode 内连续存储 [`DIRECT_COUNT`] 个**数据扇区**号
//! - 一级索引：整个扇区连续存储扇区号，每个编号都指向一个数据扇区
//! - 二级索引：整个扇区连续存储扇区号，每个编号都指向一个一级索引块
//!
//! 扇区号 0 表示未分配。文件只会按逻辑顺序增长，
//! 因此每一级索引中已分配的项总是一段从头开始的连续前缀。
//!
//! ## 块索引编码
//!
//! - 逻辑扇区序号减去直接索引与一级索引的容量，得到二级索引内的序号
//! - 二级索引内的序号除以索引块的**可编号数量**，得到外层索引块内的位置；
//!   取模得到内层索引块内的位置

use core::{mem, ptr, slice};

use log::{debug, warn};

use crate::{BufferCache, DataSector, Error, INODE_MAGIC, SECTOR_SIZE, SectorAllocator, SectorId};

/// 索引块的编号容量
pub const INDIRECT_COUNT: usize = SECTOR_SIZE / mem::size_of::<SectorId>();
/// 直接索引可编号数量，恰好让 inode 填满一个扇区
pub const DIRECT_COUNT: usize = 123;
/// 用上一级索引时的编号容量
const INDIRECT_CAP: usize = DIRECT_COUNT + INDIRECT_COUNT;
/// 用上二级索引时的编号容量，即文件最多占据的数据扇区数
pub const MAX_FILE_SECTORS: usize = INDIRECT_CAP + INDIRECT_COUNT * INDIRECT_COUNT;

static ZEROS: DataSector = [0; SECTOR_SIZE];

/// 逻辑扇区在块映射中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// 直接索引的下标
    Direct(usize),
    /// 一级索引块内的下标
    Indirect(usize),
    /// 外层索引块内的下标，内层索引块内的下标
    DoubleIndirect(usize, usize),
    /// 超出寻址能力
    OutOfRange,
}

/// 把文件内的字节偏移映射到块映射中的位置
pub fn locate(offset: usize) -> Location {
    let sector_index = offset / SECTOR_SIZE;

    if sector_index < DIRECT_COUNT {
        Location::Direct(sector_index)
    } else if sector_index < INDIRECT_CAP {
        // 剔去直接索引的部分
        Location::Indirect(sector_index - DIRECT_COUNT)
    } else if sector_index < MAX_FILE_SECTORS {
        // 剔去使用了一级索引的部分
        let index = sector_index - INDIRECT_CAP;
        Location::DoubleIndirect(index / INDIRECT_COUNT, index % INDIRECT_COUNT)
    } else {
        Location::OutOfRange
    }
}

impl Location {
    /// [`locate`] 的逆映射：位置对应的逻辑扇区序号
    pub fn sector_index(self) -> Option<usize> {
        match self {
            Location::Direct(index) => Some(index),
            Location::Indirect(index) => Some(DIRECT_COUNT + index),
            Location::DoubleIndirect(outer, inner) => {
                Some(INDIRECT_CAP + outer * INDIRECT_COUNT + inner)
            }
            Location::OutOfRange => None,
        }
    }
}

#[derive(Debug, Clone)]
#[repr(C)]
pub struct DiskInode {
    /// 文件字节数，不用usize是为了严控布局
    length: u32,
    magic: u32,
    /// 用u32是为了从任意扇区读出时都不会构造出非法的bool
    is_dir: u32,
    /// 直接索引，存储容量：DIRECT_COUNT * SECTOR_SIZE 字节
    direct: [SectorId; DIRECT_COUNT],
    /// 指向一个一级索引块
    indirect: SectorId,
    /// 指向一个二级索引块
    double_indirect: SectorId,
}

const _: () = assert!(mem::size_of::<DiskInode>() == SECTOR_SIZE);

/// 间接索引块，只存在于缓存与磁盘上，内存中的副本不超出一次寻址操作
#[derive(Debug, Clone)]
#[repr(C)]
pub struct IndirectBlock([SectorId; INDIRECT_COUNT]);

const _: () = assert!(mem::size_of::<IndirectBlock>() == SECTOR_SIZE);

impl DiskInode {
    /// 长度为 0、块映射全空的 inode
    pub fn new(is_dir: bool) -> Self {
        Self {
            length: 0,
            magic: INODE_MAGIC,
            is_dir: is_dir as u32,
            direct: [SectorId::NONE; DIRECT_COUNT],
            indirect: SectorId::NONE,
            double_indirect: SectorId::NONE,
        }
    }

    /// 通过缓存读出 `sector` 上的 inode，不做合法性检查
    pub fn load(sector: SectorId, cache: &BufferCache) -> Self {
        let mut disk_inode = Self::new(false);
        cache.read(sector, disk_inode.as_bytes_mut(), 0, SECTOR_SIZE, 0);
        disk_inode
    }

    #[inline]
    pub fn store(&self, sector: SectorId, cache: &BufferCache) {
        cache.write(sector, self.as_bytes(), 0, SECTOR_SIZE, 0);
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length as usize
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }

    #[inline]
    pub fn indirect_sector(&self) -> SectorId {
        self.indirect
    }

    #[inline]
    pub fn double_indirect_sector(&self) -> SectorId {
        self.double_indirect
    }

    /// 偏移 `offset` 所在的数据扇区；偏移不在文件内时返回 [`SectorId::NONE`]
    pub fn byte_to_sector(&self, offset: usize, cache: &BufferCache) -> SectorId {
        if offset >= self.length() {
            return SectorId::NONE;
        }

        self.lookup(locate(offset), cache)
    }

    /// 不看文件长度，直接读取块映射中 `location` 处的扇区号
    fn lookup(&self, location: Location, cache: &BufferCache) -> SectorId {
        match location {
            Location::Direct(index) => self.direct[index],
            Location::Indirect(index) => {
                if !self.indirect.is_allocated() {
                    return SectorId::NONE;
                }
                IndirectBlock::entry(self.indirect, index, cache)
            }
            Location::DoubleIndirect(outer, inner) => {
                if !self.double_indirect.is_allocated() {
                    return SectorId::NONE;
                }
                let inner_block = IndirectBlock::entry(self.double_indirect, outer, cache);
                if !inner_block.is_allocated() {
                    return SectorId::NONE;
                }
                IndirectBlock::entry(inner_block, inner, cache)
            }
            Location::OutOfRange => SectorId::NONE,
        }
    }

    /// 把 `new_sector` 登记到块映射的 `location` 处，途中缺少的索引块现场分配
    pub fn register_sector(
        &mut self,
        new_sector: SectorId,
        location: Location,
        cache: &BufferCache,
        allocator: &dyn SectorAllocator,
    ) -> Result<(), Error> {
        match location {
            Location::Direct(index) => self.direct[index] = new_sector,
            Location::Indirect(index) => {
                let mut block = if self.indirect.is_allocated() {
                    IndirectBlock::load(self.indirect, cache)
                } else {
                    self.indirect = allocate_one(allocator)?;
                    IndirectBlock::zeroed()
                };

                block.set(index, new_sector);
                block.store(self.indirect, cache);
            }
            Location::DoubleIndirect(outer_index, inner_index) => {
                let mut outer = if self.double_indirect.is_allocated() {
                    IndirectBlock::load(self.double_indirect, cache)
                } else {
                    let sector = allocate_one(allocator)?;
                    self.double_indirect = sector;
                    // 新的外层索引块先写成空表
                    let outer = IndirectBlock::zeroed();
                    outer.store(sector, cache);
                    outer
                };

                let mut inner_sector = outer.get(outer_index);
                let mut inner = if inner_sector.is_allocated() {
                    IndirectBlock::load(inner_sector, cache)
                } else {
                    inner_sector = allocate_one(allocator)?;
                    outer.set(outer_index, inner_sector);
                    IndirectBlock::zeroed()
                };

                inner.set(inner_index, new_sector);
                outer.store(self.double_indirect, cache);
                inner.store(inner_sector, cache);
            }
            Location::OutOfRange => return Err(Error::OutOfRange),
        }

        Ok(())
    }

    /// 把文件增长到 `new_length` 字节。
    ///
    /// 落在扇区边界上且尚未分配的每个逻辑扇区都会分配一个新的数据扇区，
    /// 登记到块映射并通过缓存清零。成功后才更新长度。
    ///
    /// 中途分配失败时已登记的扇区不会回滚，长度保持不变；
    /// 它们仍在块映射的连续前缀中，回收 inode 时由 [`Self::free_sectors`] 一并释放。
    pub fn grow(
        &mut self,
        new_length: usize,
        cache: &BufferCache,
        allocator: &dyn SectorAllocator,
    ) -> Result<(), Error> {
        let old_length = self.length();
        if new_length <= old_length {
            return Ok(());
        }

        let end_index = Self::count_data_sectors(new_length);
        if end_index > MAX_FILE_SECTORS {
            warn!("inode: cannot grow to {new_length} bytes, addressing exhausted");
            return Err(Error::OutOfRange);
        }

        for sector_index in Self::count_data_sectors(old_length)..end_index {
            let location = locate(sector_index * SECTOR_SIZE);
            if self.lookup(location, cache).is_allocated() {
                continue;
            }

            let Some(sector) = allocator.allocate(1) else {
                warn!("inode: out of sectors while growing {old_length} -> {new_length} bytes");
                return Err(Error::NoSpace);
            };
            if let Err(err) = self.register_sector(sector, location, cache, allocator) {
                // 没登记上的数据扇区无处可寻，当场还回去
                allocator.release(sector, 1);
                warn!("inode: failed to register {sector:?} at {location:?}: {err:?}");
                return Err(err);
            }
            cache.write(sector, &ZEROS, 0, SECTOR_SIZE, 0);
        }

        debug!("inode: grew {old_length} -> {new_length} bytes");
        self.length = new_length as u32;
        Ok(())
    }

    /// 释放块映射中的全部扇区：先数据扇区，再索引块本身。
    ///
    /// 每一级都从头扫描，遇到第一个未分配项即停止。
    pub fn free_sectors(&self, cache: &BufferCache, allocator: &dyn SectorAllocator) {
        /******************** 直接索引 ********************/
        for sector in self.direct.iter().copied().take_while(|s| s.is_allocated()) {
            allocator.release(sector, 1);
        }
        /******************** END ********************/

        /******************** 一级索引 ********************/
        if self.indirect.is_allocated() {
            let block = IndirectBlock::load(self.indirect, cache);
            for sector in block.allocated() {
                allocator.release(sector, 1);
            }
            allocator.release(self.indirect, 1);
        }
        /******************** END ********************/

        /******************** 二级索引 ********************/
        if self.double_indirect.is_allocated() {
            let outer = IndirectBlock::load(self.double_indirect, cache);
            for inner_sector in outer.allocated() {
                let inner = IndirectBlock::load(inner_sector, cache);
                for sector in inner.allocated() {
                    allocator.release(sector, 1);
                }
                allocator.release(inner_sector, 1);
            }
            allocator.release(self.double_indirect, 1);
        }
        /******************** END ********************/
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，读到文件末尾为止
    pub fn read_at(&self, offset: usize, buf: &mut [u8], cache: &BufferCache) -> usize {
        let length = self.length();
        let mut offset = offset;
        let mut read_size = 0;

        while read_size < buf.len() {
            let sector = self.byte_to_sector(offset, cache);
            if !sector.is_allocated() {
                break;
            }

            // 请求剩余、扇区剩余、文件剩余三者取小
            let sector_offset = offset % SECTOR_SIZE;
            let chunk = (buf.len() - read_size)
                .min(SECTOR_SIZE - sector_offset)
                .min(length - offset);
            cache.read(sector, buf, read_size, chunk, sector_offset);

            read_size += chunk;
            offset += chunk;
        }

        read_size
    }

    /// 从指定位置(字节偏移)写入`buf`，不会越过文件末尾；增长由调用者先行完成
    pub fn write_at(&self, offset: usize, buf: &[u8], cache: &BufferCache) -> usize {
        let length = self.length();
        let mut offset = offset;
        let mut written_size = 0;

        while written_size < buf.len() {
            let sector = self.byte_to_sector(offset, cache);
            if !sector.is_allocated() {
                break;
            }

            let sector_offset = offset % SECTOR_SIZE;
            let chunk = (buf.len() - written_size)
                .min(SECTOR_SIZE - sector_offset)
                .min(length - offset);
            cache.write(sector, buf, written_size, chunk, sector_offset);

            written_size += chunk;
            offset += chunk;
        }

        written_size
    }

    /// 计算容纳指定数据量需要多少个**数据扇区**
    #[inline]
    pub fn count_data_sectors(length: usize) -> usize {
        length.div_ceil(SECTOR_SIZE)
    }

    /// 计算容纳指定数据量需要多少个 **数据扇区** 和 **索引块**
    pub fn count_total_sectors(length: usize) -> usize {
        let data_sectors = Self::count_data_sectors(length);
        let mut total = data_sectors;

        // 超出直接索引，使用一级索引块
        if data_sectors > DIRECT_COUNT {
            total += 1;
        }

        // 超出一级索引，使用外层索引块与若干内层索引块
        if data_sectors > INDIRECT_CAP {
            total += 1 + (data_sectors - INDIRECT_CAP).div_ceil(INDIRECT_COUNT);
        }

        total
    }

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), SECTOR_SIZE) }
    }

    #[inline]
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), SECTOR_SIZE) }
    }
}

impl IndirectBlock {
    /// 全部项均未分配的索引块
    #[inline]
    pub const fn zeroed() -> Self {
        Self([SectorId::NONE; INDIRECT_COUNT])
    }

    pub fn load(sector: SectorId, cache: &BufferCache) -> Self {
        let mut block = Self::zeroed();
        cache.read(sector, block.as_bytes_mut(), 0, SECTOR_SIZE, 0);
        block
    }

    #[inline]
    pub fn store(&self, sector: SectorId, cache: &BufferCache) {
        cache.write(sector, self.as_bytes(), 0, SECTOR_SIZE, 0);
    }

    /// 只从缓存中取出索引块 `sector` 的第 `index` 项
    pub fn entry(sector: SectorId, index: usize, cache: &BufferCache) -> SectorId {
        const LEN: usize = mem::size_of::<SectorId>();
        let mut raw = [0u8; LEN];
        cache.read(sector, &mut raw, 0, LEN, index * LEN);
        SectorId::new(u32::from_ne_bytes(raw))
    }

    #[inline]
    pub fn get(&self, index: usize) -> SectorId {
        self.0[index]
    }

    #[inline]
    pub fn set(&mut self, index: usize, sector: SectorId) {
        self.0[index] = sector;
    }

    /// 已分配项构成的连续前缀
    pub fn allocated(&self) -> impl Iterator<Item = SectorId> + '_ {
        self.0.iter().copied().take_while(|s| s.is_allocated())
    }

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), SECTOR_SIZE) }
    }

    #[inline]
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), SECTOR_SIZE) }
    }
}

#[inline]
fn allocate_one(allocator: &dyn SectorAllocator) -> Result<SectorId, Error> {
    allocator.allocate(1).ok_or(Error::NoSpace)
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    use block_dev::RamDisk;

    use super::*;
    use crate::free_map::{FreeMap, Rationed};
    use crate::{FREE_MAP_SECTOR, ROOT_DIR_SECTOR};

    fn volume(sectors: usize) -> (BufferCache, Arc<FreeMap>) {
        let disk = Arc::new(RamDisk::new(sectors));
        let free_map = Arc::new(FreeMap::new(sectors));
        free_map.reserve(FREE_MAP_SECTOR);
        free_map.reserve(ROOT_DIR_SECTOR);
        (BufferCache::with_capacity(disk, 16), free_map)
    }

    /// 按长度收集 inode 的全部数据扇区
    fn data_sectors(disk_inode: &DiskInode, cache: &BufferCache) -> Vec<SectorId> {
        (0..DiskInode::count_data_sectors(disk_inode.length()))
            .map(|index| disk_inode.byte_to_sector(index * SECTOR_SIZE, cache))
            .collect()
    }

    #[test]
    fn locate_tier_boundaries() {
        assert_eq!(locate(0), Location::Direct(0));
        assert_eq!(locate(SECTOR_SIZE - 1), Location::Direct(0));
        assert_eq!(locate(DIRECT_COUNT * SECTOR_SIZE - 1), Location::Direct(DIRECT_COUNT - 1));
        assert_eq!(locate(DIRECT_COUNT * SECTOR_SIZE), Location::Indirect(0));
        assert_eq!(
            locate(INDIRECT_CAP * SECTOR_SIZE - 1),
            Location::Indirect(INDIRECT_COUNT - 1)
        );
        assert_eq!(locate(INDIRECT_CAP * SECTOR_SIZE), Location::DoubleIndirect(0, 0));
        assert_eq!(
            locate((INDIRECT_CAP + INDIRECT_COUNT + 1) * SECTOR_SIZE),
            Location::DoubleIndirect(1, 1)
        );
        assert_eq!(
            locate(MAX_FILE_SECTORS * SECTOR_SIZE - 1),
            Location::DoubleIndirect(INDIRECT_COUNT - 1, INDIRECT_COUNT - 1)
        );
        assert_eq!(locate(MAX_FILE_SECTORS * SECTOR_SIZE), Location::OutOfRange);
    }

    #[test]
    fn locate_is_a_bijection_on_sector_indices() {
        for sector_index in 0..MAX_FILE_SECTORS {
            let location = locate(sector_index * SECTOR_SIZE + sector_index % SECTOR_SIZE);
            assert_eq!(location.sector_index(), Some(sector_index));
        }
        assert_eq!(Location::OutOfRange.sector_index(), None);
    }

    #[test]
    fn total_sectors_include_index_blocks() {
        assert_eq!(DiskInode::count_total_sectors(0), 0);
        assert_eq!(DiskInode::count_total_sectors(1), 1);
        assert_eq!(DiskInode::count_total_sectors(DIRECT_COUNT * SECTOR_SIZE), DIRECT_COUNT);
        assert_eq!(
            DiskInode::count_total_sectors(DIRECT_COUNT * SECTOR_SIZE + 1),
            DIRECT_COUNT + 2
        );
        assert_eq!(
            DiskInode::count_total_sectors(INDIRECT_CAP * SECTOR_SIZE + 1),
            INDIRECT_CAP + 1 + 1 + 1 + 1
        );
        assert_eq!(
            DiskInode::count_total_sectors(MAX_FILE_SECTORS * SECTOR_SIZE),
            MAX_FILE_SECTORS + 1 + 1 + INDIRECT_COUNT
        );
    }

    #[test]
    fn grow_covers_every_sector_with_zeroes() {
        let (cache, free_map) = volume(1024);
        let mut disk_inode = DiskInode::new(false);
        let length = (INDIRECT_CAP + INDIRECT_COUNT + 3) * SECTOR_SIZE - 10;

        disk_inode.grow(length, &cache, free_map.as_ref()).unwrap();

        assert_eq!(disk_inode.length(), length);
        let mut sectors = data_sectors(&disk_inode, &cache);
        assert!(sectors.iter().all(|s| s.is_allocated()));
        sectors.sort();
        sectors.dedup();
        assert_eq!(sectors.len(), DiskInode::count_data_sectors(length));
        assert_eq!(
            1024 - 2 - free_map.free_count(),
            DiskInode::count_total_sectors(length)
        );

        let mut buf = alloc::vec![0xFFu8; length];
        assert_eq!(disk_inode.read_at(0, &mut buf, &cache), length);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn grow_from_unaligned_length_reuses_the_tail_sector() {
        let (cache, free_map) = volume(64);
        let mut disk_inode = DiskInode::new(false);
        disk_inode.grow(100, &cache, free_map.as_ref()).unwrap();
        let before = free_map.free_count();

        disk_inode.grow(SECTOR_SIZE, &cache, free_map.as_ref()).unwrap();
        assert_eq!(free_map.free_count(), before);

        disk_inode.grow(SECTOR_SIZE + 1, &cache, free_map.as_ref()).unwrap();
        assert_eq!(free_map.free_count(), before - 1);
    }

    #[test]
    fn grow_past_addressing_limit_fails() {
        let (cache, free_map) = volume(64);
        let mut disk_inode = DiskInode::new(false);

        assert_eq!(
            disk_inode.grow(MAX_FILE_SECTORS * SECTOR_SIZE + 1, &cache, free_map.as_ref()),
            Err(Error::OutOfRange)
        );
        assert_eq!(disk_inode.length(), 0);
        assert_eq!(free_map.free_count(), 62);
    }

    #[test]
    fn register_sector_builds_double_indirect_chain() {
        let (cache, free_map) = volume(64);
        let mut disk_inode = DiskInode::new(false);
        let data = SectorId::new(40);
        free_map.reserve(data);

        disk_inode
            .register_sector(data, Location::DoubleIndirect(2, 5), &cache, free_map.as_ref())
            .unwrap();

        let outer = disk_inode.double_indirect_sector();
        assert!(outer.is_allocated());
        let inner = IndirectBlock::entry(outer, 2, &cache);
        assert!(inner.is_allocated());
        assert_eq!(IndirectBlock::entry(outer, 0, &cache), SectorId::NONE);
        assert_eq!(IndirectBlock::entry(inner, 5, &cache), data);
        assert_eq!(IndirectBlock::entry(inner, 4, &cache), SectorId::NONE);
        assert_eq!(disk_inode.lookup(Location::DoubleIndirect(2, 5), &cache), data);
        assert_eq!(disk_inode.lookup(Location::DoubleIndirect(3, 5), &cache), SectorId::NONE);
    }

    #[test]
    fn entry_reads_one_word_of_an_index_block() {
        let (cache, _) = volume(64);
        let mut block = IndirectBlock::zeroed();
        block.set(0, SectorId::new(7));
        block.set(INDIRECT_COUNT - 1, SectorId::new(0x0102_0304));
        block.store(SectorId::new(9), &cache);

        assert_eq!(IndirectBlock::entry(SectorId::new(9), 0, &cache), SectorId::new(7));
        assert_eq!(IndirectBlock::entry(SectorId::new(9), 1, &cache), SectorId::NONE);
        assert_eq!(
            IndirectBlock::entry(SectorId::new(9), INDIRECT_COUNT - 1, &cache),
            SectorId::new(0x0102_0304)
        );
    }

    #[test]
    fn free_sectors_returns_everything_grow_took() {
        let (cache, free_map) = volume(1024);
        let initial = free_map.free_count();
        let mut disk_inode = DiskInode::new(false);

        disk_inode
            .grow((INDIRECT_CAP + 2 * INDIRECT_COUNT + 7) * SECTOR_SIZE, &cache, free_map.as_ref())
            .unwrap();
        assert!(free_map.free_count() < initial);

        disk_inode.free_sectors(&cache, free_map.as_ref());
        assert_eq!(free_map.free_count(), initial);
    }

    #[test]
    fn exhausted_grow_keeps_length_but_not_rolled_back() {
        let (cache, free_map) = volume(64);
        let initial = free_map.free_count();
        let rationed = Rationed::new(free_map.clone(), 5);
        let mut disk_inode = DiskInode::new(false);

        assert_eq!(
            disk_inode.grow(10 * SECTOR_SIZE, &cache, &rationed),
            Err(Error::NoSpace)
        );
        assert_eq!(disk_inode.length(), 0);
        // 已登记的 5 个扇区仍被占用，直到 inode 被回收
        assert_eq!(free_map.free_count(), initial - 5);

        disk_inode.free_sectors(&cache, free_map.as_ref());
        assert_eq!(free_map.free_count(), initial);
    }

    #[test]
    fn failed_index_allocation_returns_the_data_sector() {
        let (cache, free_map) = volume(1024);
        let initial = free_map.free_count();
        let mut disk_inode = DiskInode::new(false);
        disk_inode
            .grow(DIRECT_COUNT * SECTOR_SIZE, &cache, free_map.as_ref())
            .unwrap();

        // 只够分配数据扇区，一级索引块分配失败
        let rationed = Rationed::new(free_map.clone(), 1);
        assert_eq!(
            disk_inode.grow(DIRECT_COUNT * SECTOR_SIZE + 1, &cache, &rationed),
            Err(Error::NoSpace)
        );
        assert_eq!(free_map.free_count(), initial - DIRECT_COUNT);
        assert!(!disk_inode.indirect_sector().is_allocated());
    }

    #[test]
    fn read_and_write_clamp_to_length() {
        let (cache, free_map) = volume(64);
        let mut disk_inode = DiskInode::new(false);
        disk_inode.grow(700, &cache, free_map.as_ref()).unwrap();

        assert_eq!(disk_inode.write_at(600, &[7; 200], &cache), 100);
        let mut buf = [0u8; 300];
        assert_eq!(disk_inode.read_at(500, &mut buf, &cache), 200);
        assert!(buf[..100].iter().all(|&b| b == 0));
        assert!(buf[100..200].iter().all(|&b| b == 7));

        assert_eq!(disk_inode.read_at(700, &mut buf, &cache), 0);
        assert_eq!(disk_inode.read_at(5000, &mut buf, &cache), 0);
    }

    #[test]
    fn load_store_round_trip_through_cache() {
        let (cache, free_map) = volume(64);
        let mut disk_inode = DiskInode::new(true);
        disk_inode.grow(3000, &cache, free_map.as_ref()).unwrap();
        disk_inode.store(SectorId::new(1), &cache);

        let loaded = DiskInode::load(SectorId::new(1), &cache);
        assert!(loaded.is_valid());
        assert!(loaded.is_dir());
        assert_eq!(loaded.length(), 3000);
        assert_eq!(data_sectors(&loaded, &cache), data_sectors(&disk_inode, &cache));

        assert!(!DiskInode::load(SectorId::new(60), &cache).is_valid());
    }
}
