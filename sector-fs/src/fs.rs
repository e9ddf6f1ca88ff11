//! # 卷
//!
//! 把缓冲区缓存、空闲位图与 inode 表组装成一个可以格式化、挂载与卸载的卷。
//! 空闲位图以文件的形式保存在扇区 0 的 inode 中，根目录的 inode 固定在扇区 1。

use alloc::sync::Arc;
use alloc::vec;

use block_dev::BlockDevice;
use log::{debug, info, warn};

use crate::{
    BufferCache, CACHE_CAPACITY, Error, FREE_MAP_SECTOR, FreeMap, Inode, InodeTable,
    ROOT_DIR_SECTOR, SectorAllocator, SectorId,
};

#[derive(Debug)]
pub struct FileSystem {
    cache: Arc<BufferCache>,
    free_map: Arc<FreeMap>,
    inodes: InodeTable,
}

impl FileSystem {
    #[inline]
    pub fn format(device: Arc<dyn BlockDevice>) -> Result<Self, Error> {
        Self::format_with_capacity(device, CACHE_CAPACITY)
    }

    /// 在设备上建立空卷：空闲位图文件与空的根目录
    pub fn format_with_capacity(
        device: Arc<dyn BlockDevice>,
        cache_capacity: usize,
    ) -> Result<Self, Error> {
        info!("formatting file system ({} sectors)", device.sector_count());
        // 至少要放下两个固定 inode 和位图文件的一个数据扇区
        if device.sector_count() <= ROOT_DIR_SECTOR.index() + 1 {
            warn!("device is too small to hold a file system");
            return Err(Error::NoSpace);
        }

        let fs = Self::assemble(device, cache_capacity);
        fs.free_map.reserve(FREE_MAP_SECTOR);
        fs.free_map.reserve(ROOT_DIR_SECTOR);
        fs.inodes
            .create(FREE_MAP_SECTOR, fs.free_map.byte_len(), false)?;
        fs.inodes.create(ROOT_DIR_SECTOR, 0, true)?;
        fs.sync()?;

        info!("format done, {} sectors free", fs.free_sectors());
        Ok(fs)
    }

    #[inline]
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self, Error> {
        Self::mount_with_capacity(device, CACHE_CAPACITY)
    }

    /// 打开设备上已有的卷，载入空闲位图
    pub fn mount_with_capacity(
        device: Arc<dyn BlockDevice>,
        cache_capacity: usize,
    ) -> Result<Self, Error> {
        let fs = Self::assemble(device, cache_capacity);

        let inode = fs.inodes.open(FREE_MAP_SECTOR)?;
        let mut bytes = vec![0; fs.free_map.byte_len()];
        let read_size = inode.read_at(&mut bytes, 0);
        fs.inodes.close(inode);

        if read_size != bytes.len() {
            warn!(
                "free map holds {read_size} bytes, device needs {}",
                bytes.len()
            );
            return Err(Error::BadMagic(FREE_MAP_SECTOR));
        }
        fs.free_map.load_bytes(&bytes);

        info!("mounted file system, {} sectors free", fs.free_sectors());
        Ok(fs)
    }

    /// 分配一个扇区并在其上创建 inode，返回 inode 所在扇区。
    ///
    /// 失败时归还 inode 扇区；已经登记进块映射的数据扇区不会归还。
    pub fn create(&self, length: usize, is_dir: bool) -> Result<SectorId, Error> {
        let sector = self.free_map.allocate(1).ok_or(Error::NoSpace)?;

        if let Err(err) = self.inodes.create(sector, length, is_dir) {
            self.free_map.release(sector, 1);
            return Err(err);
        }

        Ok(sector)
    }

    #[inline]
    pub fn open(&self, sector: SectorId) -> Result<Arc<Inode>, Error> {
        self.inodes.open(sector)
    }

    #[inline]
    pub fn open_root(&self) -> Result<Arc<Inode>, Error> {
        self.inodes.open(ROOT_DIR_SECTOR)
    }

    #[inline]
    pub fn close(&self, inode: Arc<Inode>) {
        self.inodes.close(inode);
    }

    /// 删除 `sector` 上的 inode，其扇区在最后一个打开者关闭后回收
    pub fn remove(&self, sector: SectorId) -> Result<(), Error> {
        let inode = self.inodes.open(sector)?;
        inode.remove();
        self.inodes.close(inode);
        Ok(())
    }

    #[inline]
    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    /// 空闲扇区数
    #[inline]
    pub fn free_sectors(&self) -> usize {
        self.free_map.free_count()
    }

    /// 持久化空闲位图，并写回所有脏槽位
    pub fn sync(&self) -> Result<(), Error> {
        self.store_free_map()?;
        self.cache.sync();
        Ok(())
    }

    /// 卸载：持久化空闲位图，然后清空缓存
    pub fn shutdown(self) -> Result<(), Error> {
        self.store_free_map()?;
        if self.inodes.open_count() > 0 {
            debug!("shutting down with {} inodes open", self.inodes.open_count());
        }
        self.cache.shutdown();

        info!("file system shut down");
        Ok(())
    }

    fn assemble(device: Arc<dyn BlockDevice>, cache_capacity: usize) -> Self {
        let cache = Arc::new(BufferCache::with_capacity(device.clone(), cache_capacity));
        let free_map = Arc::new(FreeMap::new(device.sector_count()));
        let inodes = InodeTable::new(cache.clone(), free_map.clone());

        Self {
            cache,
            free_map,
            inodes,
        }
    }

    /// 位图文件的长度在格式化时就已固定，写入不会再触发分配
    fn store_free_map(&self) -> Result<(), Error> {
        let inode = self.inodes.open(FREE_MAP_SECTOR)?;
        let bytes = self.free_map.to_bytes();
        let written_size = inode.write_at(&bytes, 0);
        self.inodes.close(inode);

        debug_assert_eq!(written_size, bytes.len());
        Ok(())
    }
}
