mod cli;

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use block_dev::{BlockDevice, SECTOR_SIZE};
use clap::Parser;
use sector_fs::{FREE_MAP_SECTOR, FileSystem, ROOT_DIR_SECTOR, SectorId};
use sector_fs_fuse::BlockFile;

use self::cli::{Cli, Command};

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    log::info!("image={:?}", cli.image);

    let fs = match cli.command {
        Command::Format { sectors } => format(&cli.image, sectors, cli.cache)?,
        command => {
            let fd = OpenOptions::new().read(true).write(true).open(&cli.image)?;
            let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd)?);
            let fs = FileSystem::mount_with_capacity(block_dev, cli.cache).map_err(fs_error)?;
            run(&fs, command)?;
            fs
        }
    };

    println!("free sectors: {}", fs.free_sectors());
    fs.shutdown().map_err(fs_error)
}

fn format(image: &Path, sectors: usize, cache: usize) -> io::Result<FileSystem> {
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)?;
    fd.set_len((sectors * SECTOR_SIZE) as u64)?;

    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd)?);
    FileSystem::format_with_capacity(block_dev, cache).map_err(fs_error)
}

fn run(fs: &FileSystem, command: Command) -> io::Result<()> {
    match command {
        Command::Format { .. } => {}
        Command::Put { source } => {
            let data = fs::read(&source)?;
            let sector = fs.create(0, false).map_err(fs_error)?;

            let inode = fs.open(sector).map_err(fs_error)?;
            let written_size = inode.write_at(&data, 0);
            fs.close(inode);

            if written_size < data.len() {
                log::warn!("only {written_size} of {} bytes fit", data.len());
            }
            println!("{source:?} -> sector {}", sector.index());
        }
        Command::Get { sector, out } => {
            let inode = fs.open(SectorId::new(sector)).map_err(fs_error)?;
            let mut data = vec![0; inode.length()];
            let read_size = inode.read_at(&mut data, 0);
            fs.close(inode);

            fs::write(&out, &data[..read_size])?;
        }
        Command::Stat { sector } => {
            let inode = fs.open(SectorId::new(sector)).map_err(fs_error)?;
            let stat = inode.stat();
            fs.close(inode);

            println!(
                "sector={} kind={:?} length={} sectors={}",
                stat.sector.index(),
                stat.kind,
                stat.length,
                stat.sectors
            );
        }
        Command::Rm { sector } => {
            let sector = SectorId::new(sector);
            if sector == FREE_MAP_SECTOR || sector == ROOT_DIR_SECTOR {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{sector:?} belongs to the volume itself"),
                ));
            }
            fs.remove(sector).map_err(fs_error)?;
        }
    }

    Ok(())
}

fn fs_error(err: sector_fs::Error) -> io::Error {
    io::Error::other(format!("{err:?}"))
}
