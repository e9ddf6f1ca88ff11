//! # 缓冲区缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟固定数量的槽位，
//! 把即将操作的扇区复制到槽位中，提高对块设备的操作效率。
//!
//! 缓存层对使用者来说是透明的，上层对扇区的读写都经过缓存层，
//! 且**拷贝发生时扇区一定驻留在槽位当中**。
//!
//! 没有空槽位时按时钟（二次机会）算法挑选牺牲者：
//! 指针扫过的槽位若被访问过，则清除访问位并跳过；遇到未被访问的槽位即淘汰之。
//! 脏槽位在淘汰时写回设备。
//!
//! 整个缓存由一把锁保护，锁在一次读写期间一直持有，包括其间的淘汰与设备 I/O。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use log::trace;
use spin::Mutex;

use crate::{CACHE_CAPACITY, DataSector, SECTOR_SIZE, SectorId};

#[derive(Debug)]
pub struct BufferCache {
    /// 底层块设备的引用
    device: Arc<dyn BlockDevice>,
    inner: Mutex<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    slots: Vec<Slot>,
    /// 时钟指针，下一次扫描的起点
    clock_hand: usize,
}

/// 缓存槽位
#[derive(Debug)]
struct Slot {
    /// 槽位绑定的扇区，空槽位为 `None`
    sector: Option<SectorId>,
    /// 是否为脏槽位
    dirty: bool,
    /// 上次扫描后是否被访问过
    accessed: bool,
    data: DataSector,
}

impl BufferCache {
    #[inline]
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self::with_capacity(device, CACHE_CAPACITY)
    }

    pub fn with_capacity(device: Arc<dyn BlockDevice>, capacity: usize) -> Self {
        assert!(capacity > 0, "buffer cache needs at least one slot");

        Self {
            device,
            inner: Mutex::new(CacheInner {
                slots: (0..capacity).map(|_| Slot::empty()).collect(),
                clock_hand: 0,
            }),
        }
    }

    /// 把 `sector` 内自 `sector_offset` 起的 `length` 字节拷贝到 `dst[dst_offset..]`
    pub fn read(
        &self,
        sector: SectorId,
        dst: &mut [u8],
        dst_offset: usize,
        length: usize,
        sector_offset: usize,
    ) {
        assert!(sector_offset + length <= SECTOR_SIZE);

        let mut inner = self.inner.lock();
        let slot = inner.resident(sector, self.device.as_ref());
        dst[dst_offset..dst_offset + length]
            .copy_from_slice(&slot.data[sector_offset..sector_offset + length]);
        slot.accessed = true;
    }

    /// 把 `src[src_offset..]` 的 `length` 字节拷贝到 `sector` 内自 `sector_offset` 起的位置
    pub fn write(
        &self,
        sector: SectorId,
        src: &[u8],
        src_offset: usize,
        length: usize,
        sector_offset: usize,
    ) {
        assert!(sector_offset + length <= SECTOR_SIZE);

        let mut inner = self.inner.lock();
        let slot = inner.resident(sector, self.device.as_ref());
        slot.data[sector_offset..sector_offset + length]
            .copy_from_slice(&src[src_offset..src_offset + length]);
        slot.dirty = true;
        slot.accessed = true;
    }

    /// 扇区当前是否驻留在缓存中
    #[inline]
    pub fn is_resident(&self, sector: SectorId) -> bool {
        self.inner.lock().lookup(sector).is_some()
    }

    /// 写回所有脏槽位，但保留它们的驻留
    pub fn sync(&self) {
        let mut inner = self.inner.lock();
        for slot in inner.slots.iter_mut().filter(|slot| slot.dirty) {
            if let Some(sector) = slot.sector {
                self.device.write_sector(sector.index(), &slot.data);
            }
            slot.dirty = false;
        }
    }

    /// 清空每个槽位，脏槽位先写回设备
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        for slot in inner.slots.iter_mut() {
            slot.flush(self.device.as_ref());
        }
        inner.clock_hand = 0;
    }
}

impl Drop for BufferCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl CacheInner {
    /// 线性查找绑定到 `sector` 的槽位
    fn lookup(&self, sector: SectorId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.sector == Some(sector))
    }

    fn find_empty(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.sector.is_none())
    }

    /// 时钟扫描：清除沿途的访问位，返回第一个未被访问的槽位，指针停在其后。
    ///
    /// 最多两圈必然找到：第一圈清掉所有访问位，第二圈的第一个槽位即是牺牲者。
    fn find_victim(&mut self) -> usize {
        let len = self.slots.len();
        loop {
            let hand = self.clock_hand;
            self.clock_hand = (hand + 1) % len;

            let slot = &mut self.slots[hand];
            if slot.accessed {
                slot.accessed = false;
            } else {
                return hand;
            }
        }
    }

    /// 确保 `sector` 驻留，返回其槽位
    fn resident(&mut self, sector: SectorId, device: &dyn BlockDevice) -> &mut Slot {
        let index = match self.lookup(sector) {
            Some(index) => {
                trace!("cache: hit {sector:?} in slot {index}");
                index
            }
            None => {
                trace!("cache: miss {sector:?}");
                let index = match self.find_empty() {
                    Some(index) => index,
                    None => {
                        let victim = self.find_victim();
                        trace!(
                            "cache: evict {:?} (dirty={}) for {sector:?}",
                            self.slots[victim].sector,
                            self.slots[victim].dirty
                        );
                        self.slots[victim].flush(device);
                        victim
                    }
                };

                let slot = &mut self.slots[index];
                device.read_sector(sector.index(), &mut slot.data);
                slot.sector = Some(sector);
                index
            }
        };

        &mut self.slots[index]
    }
}

impl Slot {
    #[inline]
    fn empty() -> Self {
        Self {
            sector: None,
            dirty: false,
            accessed: false,
            data: [0; SECTOR_SIZE],
        }
    }

    /// 脏则写回，然后把槽位复位为空
    fn flush(&mut self, device: &dyn BlockDevice) {
        if self.dirty {
            if let Some(sector) = self.sector {
                device.write_sector(sector.index(), &self.data);
            }
        }
        *self = Self::empty();
    }
}

#[cfg(test)]
mod tests {
    use block_dev::RamDisk;

    use super::*;

    fn cache(capacity: usize) -> (Arc<RamDisk>, BufferCache) {
        let disk = Arc::new(RamDisk::new(32));
        let cache = BufferCache::with_capacity(disk.clone(), capacity);
        (disk, cache)
    }

    fn sector(raw: u32) -> SectorId {
        SectorId::new(raw)
    }

    fn touch(cache: &BufferCache, raw: u32) {
        let mut byte = [0u8; 1];
        cache.read(sector(raw), &mut byte, 0, 1, 0);
    }

    #[test]
    fn write_then_read_returns_written_bytes() {
        let (disk, cache) = cache(4);

        cache.write(sector(3), b"hello, sector", 0, 13, 100);
        let mut buf = [0u8; 20];
        cache.read(sector(3), &mut buf, 2, 13, 100);

        assert_eq!(&buf[2..15], b"hello, sector");
        assert_eq!(buf[..2], [0, 0]);
        // 尚未写回
        assert_eq!(disk.snapshot(3), [0; SECTOR_SIZE]);
    }

    #[test]
    fn miss_loads_from_device_and_hit_does_not() {
        let (disk, cache) = cache(4);
        let mut raw = [0u8; SECTOR_SIZE];
        raw[..4].copy_from_slice(&[1, 2, 3, 4]);
        disk.write_sector(7, &raw);

        let mut buf = [0u8; 4];
        cache.read(sector(7), &mut buf, 0, 4, 0);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(disk.reads(), 1);

        cache.read(sector(7), &mut buf, 0, 2, 2);
        assert_eq!(buf[..2], [3, 4]);
        assert_eq!(disk.reads(), 1);
    }

    #[test]
    fn eviction_writes_back_exactly_one_dirty_sector() {
        let (disk, cache) = cache(4);
        for raw in 1..=4 {
            cache.write(sector(raw), &[raw as u8; SECTOR_SIZE], 0, SECTOR_SIZE, 0);
        }
        assert_eq!(disk.writes(), 0);

        touch(&cache, 5);

        let evicted: Vec<u32> = (1..=4).filter(|&raw| !cache.is_resident(sector(raw))).collect();
        assert_eq!(evicted, [1]);
        assert!(cache.is_resident(sector(5)));
        assert_eq!(disk.writes(), 1);
        assert_eq!(disk.snapshot(1), [1; SECTOR_SIZE]);
    }

    #[test]
    fn clean_victim_is_not_written() {
        let (disk, cache) = cache(2);
        touch(&cache, 1);
        touch(&cache, 2);
        touch(&cache, 3);

        assert_eq!(disk.writes(), 0);
        assert!(!cache.is_resident(sector(1)));
    }

    #[test]
    fn accessed_slot_gets_a_second_chance() {
        let (_disk, cache) = cache(4);
        for raw in 1..=4 {
            touch(&cache, raw);
        }
        // 第一圈清空访问位，淘汰槽位 0 (扇区 1)，指针停在槽位 1
        touch(&cache, 5);
        assert!(!cache.is_resident(sector(1)));

        // 扇区 2 在两次扫描之间被访问
        touch(&cache, 2);
        touch(&cache, 6);

        assert!(cache.is_resident(sector(2)));
        assert!(!cache.is_resident(sector(3)));
        assert!(cache.is_resident(sector(4)));
        assert!(cache.is_resident(sector(5)));
        assert!(cache.is_resident(sector(6)));
    }

    #[test]
    fn victim_found_within_two_passes() {
        let (_disk, cache) = cache(8);
        for raw in 1..=8 {
            touch(&cache, raw);
        }

        let mut inner = cache.inner.lock();
        inner.clock_hand = 3;
        assert!(inner.slots.iter().all(|slot| slot.accessed));

        let victim = inner.find_victim();
        assert_eq!(victim, 3);
        assert_eq!(inner.clock_hand, 4);
        assert!(inner.slots.iter().all(|slot| !slot.accessed));
    }

    #[test]
    fn never_caches_a_sector_twice() {
        let (_disk, cache) = cache(3);
        for raw in [1, 2, 1, 3, 4, 1, 2, 5, 1] {
            touch(&cache, raw);
            let inner = cache.inner.lock();
            let mut bound: Vec<SectorId> = inner.slots.iter().filter_map(|slot| slot.sector).collect();
            let count = bound.len();
            bound.sort();
            bound.dedup();
            assert_eq!(bound.len(), count);
        }
    }

    #[test]
    fn sync_keeps_residency() {
        let (disk, cache) = cache(4);
        cache.write(sector(9), &[0xAB; 8], 0, 8, 0);

        cache.sync();

        assert!(cache.is_resident(sector(9)));
        assert_eq!(disk.snapshot(9)[..8], [0xAB; 8]);
        assert_eq!(disk.writes(), 1);

        cache.sync();
        assert_eq!(disk.writes(), 1);
    }

    #[test]
    fn shutdown_flushes_every_slot() {
        let (disk, cache) = cache(4);
        cache.write(sector(1), &[1; 4], 0, 4, 0);
        touch(&cache, 2);
        cache.write(sector(3), &[3; 4], 0, 4, 508);

        cache.shutdown();

        assert_eq!(disk.writes(), 2);
        assert_eq!(disk.snapshot(1)[..4], [1; 4]);
        assert_eq!(disk.snapshot(3)[508..], [3; 4]);
        assert!((1..=3).all(|raw| !cache.is_resident(sector(raw))));
    }

    #[test]
    fn drop_writes_back_dirty_slots() {
        let (disk, cache) = cache(4);
        cache.write(sector(4), &[4; 16], 0, 16, 0);

        drop(cache);

        assert_eq!(disk.snapshot(4)[..16], [4; 16]);
    }
}
