//! # 空闲扇区管理
//!
//! 索引节点层只依赖 [`SectorAllocator`]；[`FreeMap`] 是它的位图实现，
//! 每个设备扇区对应一位，位图常驻内存，由卷持久化到扇区 0 的 inode 中。

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::mem::size_of;

use log::trace;
use spin::Mutex;

use crate::SectorId;

/// 空闲扇区分配器
pub trait SectorAllocator: Send + Sync + Debug {
    /// 分配连续的 `count` 个扇区并返回首个扇区号；空间不足时返回空
    fn allocate(&self, count: usize) -> Option<SectorId>;

    /// 释放自 `sector` 起连续的 `count` 个扇区
    fn release(&self, sector: SectorId, count: usize);
}

/// 位图中的一组
type BitGroup = u64;

const GROUP_BITS: usize = BitGroup::BITS as usize;

/// 空闲位图
#[derive(Debug)]
pub struct FreeMap {
    /// 位图所指示的扇区总数
    sectors: usize,
    groups: Mutex<Vec<BitGroup>>,
}

impl FreeMap {
    pub fn new(sectors: usize) -> Self {
        let mut groups = vec![0; sectors.div_ceil(GROUP_BITS)];

        // 设备之外的尾部位视为已分配
        let tail = sectors % GROUP_BITS;
        if tail != 0 {
            if let Some(last) = groups.last_mut() {
                *last = BitGroup::MAX << tail;
            }
        }

        Self {
            sectors,
            groups: Mutex::new(groups),
        }
    }

    /// 把一个固定用途的扇区标记为已分配
    pub fn reserve(&self, sector: SectorId) {
        let (group_index, mask) = bit_of(sector.index());
        let mut groups = self.groups.lock();
        assert_eq!(groups[group_index] & mask, 0, "{sector:?} is already allocated");
        groups[group_index] |= mask;
    }

    pub fn is_allocated(&self, sector: SectorId) -> bool {
        let (group_index, mask) = bit_of(sector.index());
        self.groups.lock()[group_index] & mask != 0
    }

    /// 空闲扇区数
    pub fn free_count(&self) -> usize {
        self.groups
            .lock()
            .iter()
            .map(|bits| bits.count_zeros() as usize)
            .sum()
    }

    /// 位图持久化后的字节数
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.groups.lock().len() * size_of::<BitGroup>()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.groups
            .lock()
            .iter()
            .flat_map(|bits| bits.to_le_bytes())
            .collect()
    }

    /// 用持久化的位图覆盖内存中的位图
    pub fn load_bytes(&self, bytes: &[u8]) {
        let mut groups = self.groups.lock();
        assert_eq!(bytes.len(), groups.len() * size_of::<BitGroup>());

        for (bits, chunk) in groups
            .iter_mut()
            .zip(bytes.chunks_exact(size_of::<BitGroup>()))
        {
            let mut raw = [0u8; size_of::<BitGroup>()];
            raw.copy_from_slice(chunk);
            *bits = BitGroup::from_le_bytes(raw);
        }
    }
}

impl SectorAllocator for FreeMap {
    fn allocate(&self, count: usize) -> Option<SectorId> {
        assert!(count > 0);
        let mut groups = self.groups.lock();

        let start = if count == 1 {
            // 寻找还有 0 位的组
            groups.iter().enumerate().find_map(|(group_index, &bits)| {
                (bits != BitGroup::MAX)
                    .then(|| group_index * GROUP_BITS + bits.trailing_ones() as usize)
            })?
        } else {
            // 首次适配：找到第一段足够长的连续空闲位
            let mut run = 0;
            let end = (0..self.sectors).find(|&bit| {
                let (group_index, mask) = bit_of(bit);
                if groups[group_index] & mask == 0 {
                    run += 1;
                } else {
                    run = 0;
                }
                run == count
            })?;
            end + 1 - count
        };

        for bit in start..start + count {
            let (group_index, mask) = bit_of(bit);
            groups[group_index] |= mask;
        }

        trace!("free map: allocate {count} at {start}");
        Some(SectorId::new(start as u32))
    }

    fn release(&self, sector: SectorId, count: usize) {
        let mut groups = self.groups.lock();

        for bit in sector.index()..sector.index() + count {
            let (group_index, mask) = bit_of(bit);
            // 编号一定得有对应的位
            assert_ne!(groups[group_index] & mask, 0, "sector {bit} is not allocated");
            groups[group_index] &= !mask;
        }

        trace!("free map: release {count} at {sector:?}");
    }
}

/// 扇区号所在的组，以及组内的掩码
#[inline]
fn bit_of(bit: usize) -> (usize, BitGroup) {
    (bit / GROUP_BITS, 1 << (bit % GROUP_BITS))
}

/// 只放行有限次分配的分配器，用来制造空间耗尽
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct Rationed {
    inner: alloc::sync::Arc<FreeMap>,
    budget: core::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl Rationed {
    pub(crate) fn new(inner: alloc::sync::Arc<FreeMap>, budget: usize) -> Self {
        Self {
            inner,
            budget: core::sync::atomic::AtomicUsize::new(budget),
        }
    }
}

#[cfg(test)]
impl SectorAllocator for Rationed {
    fn allocate(&self, count: usize) -> Option<SectorId> {
        use core::sync::atomic::Ordering;

        self.budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .ok()?;
        self.inner.allocate(count)
    }

    fn release(&self, sector: SectorId, count: usize) {
        self.inner.release(sector, count);
    }
}
