use derive_more::{From, Into};

/// 文件系统设备上的扇区号。
///
/// 在块映射中 0 表示“未分配”，因为扇区 0 永远属于空闲位图的 inode，
/// 不会被分配为数据块或索引块。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct SectorId(u32);

impl SectorId {
    /// 块映射中的未分配项
    pub const NONE: Self = Self(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn is_allocated(self) -> bool {
        self.0 != 0
    }

    /// 扇区号作为设备下标
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}
