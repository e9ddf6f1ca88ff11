use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sector_fs::CACHE_CAPACITY;

#[derive(Parser)]
pub struct Cli {
    /// Image file
    #[arg(long, short)]
    pub image: PathBuf,

    /// Buffer cache slots
    #[arg(long, default_value_t = CACHE_CAPACITY)]
    pub cache: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create (or truncate) the image and lay out an empty volume
    Format {
        /// Image size in sectors
        #[arg(long, short, default_value_t = 16 * 2048)]
        sectors: usize,
    },

    /// Copy a host file into a new inode and print its sector
    Put {
        /// Host file
        source: PathBuf,
    },

    /// Copy an inode's contents out to a host file
    Get {
        /// Inode sector
        sector: u32,

        /// Host file
        #[arg(long, short = 'O')]
        out: PathBuf,
    },

    /// Show an inode's kind, length and sector usage
    Stat {
        /// Inode sector
        sector: u32,
    },

    /// Remove an inode and free its sectors
    Rm {
        /// Inode sector
        sector: u32,
    },
}
