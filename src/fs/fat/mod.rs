mod bpb;
pub mod dir;
pub mod dir_stack;
pub mod file;
pub mod format;
pub mod open_files;
pub mod session;
pub mod table;

pub use bpb::{BpbFat32, Geometry};
pub use dir::{Attributes, DirEntry, EntryLocation};
pub use file::WriteOutcome;
pub use format::{format_volume, FormatOptions};
pub use open_files::AccessMode;
pub use session::{Listing, Session};

use crate::disk::Disk;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{BufReader, Seek, SeekFrom};

/// A mounted FAT32 volume.
///
/// Every structure is read from and written straight to the underlying
/// image, nothing besides the boot sector is cached.
pub struct Fat32<'a> {
    device: &'a mut dyn Disk,
    bpb: BpbFat32,
    geometry: Geometry,
    cluster_limit: u32,
    /// Clusters returned by the allocator that have no FAT link yet
    pending: Vec<u32>,
}

impl<'a> Fat32<'a> {
    pub fn open(device: &'a mut dyn Disk) -> Result<Self> {
        if device.disk_size() < BpbFat32::SIZE as u64 {
            return Err(Error::InvalidBpb(format!(
                "image is {} bytes long, too short for a boot sector",
                device.disk_size()
            )));
        }

        let bpb = {
            let mut reader = BufReader::with_capacity(BpbFat32::SIZE, &mut *device);
            reader.seek(SeekFrom::Start(0))?;
            BpbFat32::decode(&mut reader)?
        };
        debug!("{}", bpb);

        let geometry = bpb.geometry()?;
        let cluster_limit = geometry.cluster_limit(device.disk_size());
        if geometry.root_cluster >= cluster_limit {
            return Err(Error::InvalidBpb(format!(
                "root cluster {} is outside of the data region",
                geometry.root_cluster
            )));
        }
        debug!(
            "cluster size {} bytes, {} data clusters",
            geometry.cluster_size(),
            cluster_limit - 2
        );

        Ok(Self {
            device,
            bpb,
            geometry,
            cluster_limit,
            pending: Vec::new(),
        })
    }

    #[inline]
    pub fn bpb(&self) -> &BpbFat32 {
        &self.bpb
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// One past the highest usable cluster number
    #[inline]
    pub fn cluster_limit(&self) -> u32 {
        self.cluster_limit
    }

    #[inline]
    pub fn root_cluster(&self) -> u32 {
        self.geometry.root_cluster
    }

    /// Bytes held by all data clusters together, used or not
    pub fn data_capacity(&self) -> u64 {
        (self.cluster_limit as u64).saturating_sub(2) * self.geometry.cluster_size()
    }

    pub(crate) fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.device.seek(SeekFrom::Start(offset))?;
        self.device.read_exact(buf)?;
        Ok(())
    }

    pub(crate) fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.device.seek(SeekFrom::Start(offset))?;
        self.device.write_all(buf)?;
        Ok(())
    }

    pub(crate) fn read_u32_at(&mut self, offset: u64) -> Result<u32> {
        self.device.seek(SeekFrom::Start(offset))?;
        Ok(self.device.read_u32::<LittleEndian>()?)
    }

    pub(crate) fn write_u32_at(&mut self, offset: u64, value: u32) -> Result<()> {
        self.device.seek(SeekFrom::Start(offset))?;
        self.device.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.device.flush()?;
        Ok(())
    }
}
