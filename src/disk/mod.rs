pub mod ram;
pub mod raw;

use std::io;

pub trait Info {
    /// Size of the image in bytes
    fn disk_size(&self) -> u64;
}

/// Random access byte store holding a FAT32 image
pub trait Disk: io::Read + io::Seek + io::Write + Info {}
