
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use block_dev::{BlockDevice, SECTOR_SIZE};

/// 以宿主机上的镜像文件充当块设备
#[derive(Debug)]
pub struct BlockFile {
    inner: Mutex<File>,
    sector_count: usize,
}

impl BlockFile {
    /// 镜像文件的长度决定设备的扇区数，不足一个扇区的尾部被忽略
    pub fn new(fd: File) -> std::io::Result<Self> {
        let sector_count = fd.metadata()?.len() as usize / SECTOR_SIZE;

        Ok(Self {
            inner: Mutex::new(fd),
            sector_count,
        })
    }
}

impl BlockDevice for BlockFile {
    fn read_sector(&self, sector_id: usize, buf: &mut [u8]) {
        let mut file = self.inner.lock().unwrap();
        file.seek(SeekFrom::Start((sector_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete sector!");
    }

    fn write_sector(&self, sector_id: usize, buf: &[u8]) {
        let mut file = self.inner.lock().unwrap();
        file.seek(SeekFrom::Start((sector_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete sector!");
    }

    #[inline]
    fn sector_count(&self) -> usize {
        self.sector_count
    }
}
