use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

pub struct BpbFat32 {
    pub jump: [u8; 3],
    pub oem_id: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub number_of_reserved_sectors: u16,
    pub number_of_fats: u8,
    pub number_of_directory_entries: u16,
    pub sectors_total: u32,
    pub media_descriptor: u8,
    pub sectors_per_fat: u32,
    pub sectors_per_track: u16,
    pub number_of_heads: u16,
    pub number_of_hidden_sectors: u32,
    pub flags: u16,
    pub fat_version: u16,
    pub root_directory_cluster: u32,
    pub fsinfo_lba: u16,
    pub backup_bs_lba: u16,
    pub reserved: [u8; 12],
    pub drive_number: u8,
    pub winnt_flags: u8,
    pub signature: u8,
    pub serial: [u8; 4],
    pub label: [u8; 11],
    pub identifier: [u8; 8],
}

impl BpbFat32 {
    /// Boot sector bytes covered by the BPB and the FAT32 extended BPB
    pub const SIZE: usize = 90;

    pub fn decode(reader: &mut dyn Read) -> Result<Self> {
        #[cfg(debug_assertions)]
        let mut total_read = 0u64;

        macro_rules! read {
            (array($size:expr)) => {{
                let mut a = [0u8; $size];
                #[cfg(debug_assertions)]
                {
                    total_read += $size as u64;
                }
                reader.read_exact(&mut a)?;
                a
            }};
            (u8) => {{
                let x = reader.read_u8()?;
                #[cfg(debug_assertions)]
                {
                    total_read += 1;
                }
                x
            }};
            (u16) => {{
                let x = reader.read_u16::<LittleEndian>()?;
                #[cfg(debug_assertions)]
                {
                    total_read += 2;
                }
                x
            }};
            (u32) => {{
                let x = reader.read_u32::<LittleEndian>()?;
                #[cfg(debug_assertions)]
                {
                    total_read += 4;
                }
                x
            }};
        }

        let jump = read!(array(3));
        let oem_id = read!(array(8));
        let bytes_per_sector = read!(u16);
        let sectors_per_cluster = read!(u8);
        let number_of_reserved_sectors = read!(u16);
        let number_of_fats = read!(u8);
        let number_of_directory_entries = read!(u16);
        let mut sectors_total = read!(u16) as u32;
        let media_descriptor = read!(u8);
        let _ = read!(u16);
        let sectors_per_track = read!(u16);
        let number_of_heads = read!(u16);
        let number_of_hidden_sectors = read!(u32);
        if sectors_total == 0 {
            sectors_total = read!(u32);
        } else {
            let _ = read!(u32);
        }
        let sectors_per_fat = read!(u32);
        let flags = read!(u16);
        let fat_version = read!(u16);
        let root_directory_cluster = read!(u32);
        let fsinfo_lba = read!(u16);
        let backup_bs_lba = read!(u16);
        let reserved = read!(array(12));
        let drive_number = read!(u8);
        let winnt_flags = read!(u8);
        let signature = read!(u8);
        let serial = read!(array(4));
        let label = read!(array(11));
        let identifier = read!(array(8));

        #[cfg(debug_assertions)]
        debug_assert_eq!(total_read, Self::SIZE as u64);

        Ok(Self {
            jump,
            oem_id,
            bytes_per_sector,
            sectors_per_cluster,
            number_of_reserved_sectors,
            number_of_fats,
            number_of_directory_entries,
            media_descriptor,
            sectors_per_fat,
            number_of_heads,
            number_of_hidden_sectors,
            sectors_total,
            sectors_per_track,
            flags,
            fat_version,
            root_directory_cluster,
            fsinfo_lba,
            backup_bs_lba,
            reserved,
            drive_number,
            winnt_flags,
            signature,
            serial,
            label,
            identifier,
        })
    }

    pub fn encode(&self, writer: &mut dyn Write) -> Result<()> {
        writer.write_all(&self.jump)?;
        writer.write_all(&self.oem_id)?;
        writer.write_u16::<LittleEndian>(self.bytes_per_sector)?;
        writer.write_u8(self.sectors_per_cluster)?;
        writer.write_u16::<LittleEndian>(self.number_of_reserved_sectors)?;
        writer.write_u8(self.number_of_fats)?;
        writer.write_u16::<LittleEndian>(self.number_of_directory_entries)?;
        // FAT32 always stores the sector count in the 32 bit field
        writer.write_u16::<LittleEndian>(0)?;
        writer.write_u8(self.media_descriptor)?;
        writer.write_u16::<LittleEndian>(0)?;
        writer.write_u16::<LittleEndian>(self.sectors_per_track)?;
        writer.write_u16::<LittleEndian>(self.number_of_heads)?;
        writer.write_u32::<LittleEndian>(self.number_of_hidden_sectors)?;
        writer.write_u32::<LittleEndian>(self.sectors_total)?;
        writer.write_u32::<LittleEndian>(self.sectors_per_fat)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.fat_version)?;
        writer.write_u32::<LittleEndian>(self.root_directory_cluster)?;
        writer.write_u16::<LittleEndian>(self.fsinfo_lba)?;
        writer.write_u16::<LittleEndian>(self.backup_bs_lba)?;
        writer.write_all(&self.reserved)?;
        writer.write_u8(self.drive_number)?;
        writer.write_u8(self.winnt_flags)?;
        writer.write_u8(self.signature)?;
        writer.write_all(&self.serial)?;
        writer.write_all(&self.label)?;
        writer.write_all(&self.identifier)?;
        Ok(())
    }

    pub fn geometry(&self) -> Result<Geometry> {
        let bytes_per_sector = self.bytes_per_sector as u32;
        let sectors_per_cluster = self.sectors_per_cluster as u32;

        if bytes_per_sector < 64 || !is_power_of_2!(bytes_per_sector) {
            return Err(Error::InvalidBpb(format!(
                "bytes per sector ({}) is not a power of 2 or is below 64",
                bytes_per_sector
            )));
        }
        if !is_power_of_2!(sectors_per_cluster) {
            return Err(Error::InvalidBpb(format!(
                "sectors per cluster ({}) is not a power of 2",
                sectors_per_cluster
            )));
        }
        if self.number_of_fats == 0 || self.sectors_per_fat == 0 {
            return Err(Error::InvalidBpb("volume has no FAT".to_owned()));
        }
        if self.root_directory_cluster < 2 {
            return Err(Error::InvalidBpb(format!(
                "root cluster ({}) is reserved",
                self.root_directory_cluster
            )));
        }

        Ok(Geometry {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors: self.number_of_reserved_sectors as u32,
            fat_count: self.number_of_fats as u32,
            sectors_per_fat: self.sectors_per_fat,
            root_cluster: self.root_directory_cluster,
            total_sectors: self.sectors_total,
        })
    }
}

impl fmt::Display for BpbFat32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Oem ID                      : {}
Bytes per sector            : {}
Sectors per cluster         : {}
Reserved sectors            : {}
Number of FATs              : {}
Sectors per FAT             : {}
Root directory cluster      : {}
Total sectors               : {}
Label                       : {}",
            String::from_utf8_lossy(&self.oem_id),
            self.bytes_per_sector,
            self.sectors_per_cluster,
            self.number_of_reserved_sectors,
            self.number_of_fats,
            self.sectors_per_fat,
            self.root_directory_cluster,
            self.sectors_total,
            String::from_utf8_lossy(&self.label)
        )
    }
}

/// Volume layout derived from the BPB, fixed for the lifetime of a session.
///
/// Clusters 0 and 1 are reserved, the first data cluster is 2.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub fat_count: u32,
    pub sectors_per_fat: u32,
    pub root_cluster: u32,
    pub total_sectors: u32,
}

impl Geometry {
    #[inline]
    pub fn cluster_size(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// Byte offset of the first FAT
    #[inline]
    pub fn fat_offset(&self) -> u64 {
        self.reserved_sectors as u64 * self.bytes_per_sector as u64
    }

    /// Size of a single FAT copy in bytes
    #[inline]
    pub fn fat_size(&self) -> u64 {
        self.sectors_per_fat as u64 * self.bytes_per_sector as u64
    }

    #[inline]
    pub fn data_offset(&self) -> u64 {
        self.fat_offset() + self.fat_count as u64 * self.fat_size()
    }

    pub fn cluster_to_data_offset(&self, cluster: u32) -> u64 {
        debug_assert!(cluster >= 2);
        self.data_offset() + (cluster as u64 - 2) * self.cluster_size()
    }

    /// One past the highest cluster number that has both a FAT entry and
    /// a data region payload inside an image of `disk_size` bytes.
    pub fn cluster_limit(&self, disk_size: u64) -> u32 {
        let fat_entries = self.fat_size() / 4;

        let data_sectors = (self.total_sectors as u64)
            .saturating_sub(self.data_offset() / self.bytes_per_sector as u64);
        let by_sectors = 2 + data_sectors / self.sectors_per_cluster as u64;

        let by_image = 2 + disk_size.saturating_sub(self.data_offset()) / self.cluster_size();

        fat_entries.min(by_sectors).min(by_image).min(u32::MAX as u64) as u32
    }
}
