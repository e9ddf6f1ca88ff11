use crate::SectorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 空闲扇区耗尽
    NoSpace,
    /// 文件长度超出三级寻址的上限
    OutOfRange,
    /// 扇区内不是合法的磁盘 inode
    BadMagic(SectorId),
}
