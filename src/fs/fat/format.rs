use super::bpb::{BpbFat32, Geometry};
use super::table::END_OF_CHAIN;
use crate::disk::Disk;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::io::SeekFrom;

const MEDIA_DESCRIPTOR: u8 = 0xF8;
const ROOT_CLUSTER: u32 = 2;
const FSINFO_SECTOR: u16 = 1;
const BACKUP_BOOT_SECTOR: u16 = 6;

const FSINFO_LEAD_SIGNATURE: u32 = 0x4161_5252;
const FSINFO_STRUCT_SIGNATURE: u32 = 0x6141_7272;
const FSINFO_TRAIL_SIGNATURE: u32 = 0xAA55_0000;
const FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub label: [u8; 11],
    pub serial: [u8; 4],
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            fat_count: 2,
            label: *b"NO NAME    ",
            serial: [0x78, 0x56, 0x34, 0x12],
        }
    }
}

impl FormatOptions {
    /// Default options with the cluster size commonly used for a volume of
    /// `size` bytes.
    pub fn for_volume_size(size: u64) -> Self {
        const MIB: u64 = 1024 * 1024;
        let sectors_per_cluster = match size {
            _ if size <= 260 * MIB => 1,
            _ if size <= 8 * 1024 * MIB => 8,
            _ if size <= 16 * 1024 * MIB => 16,
            _ if size <= 32 * 1024 * MIB => 32,
            _ => 64,
        };

        Self {
            sectors_per_cluster,
            ..Self::default()
        }
    }
}

/// Lays down an empty FAT32 volume covering the whole disk.
pub fn format_volume(disk: &mut dyn Disk, options: &FormatOptions) -> Result<Geometry> {
    let bytes_per_sector = options.bytes_per_sector as u64;
    if bytes_per_sector < 512 || !is_power_of_2!(bytes_per_sector) {
        return Err(Error::InvalidBpb(format!(
            "cannot format with {} bytes per sector",
            bytes_per_sector
        )));
    }

    let total_sectors = (disk.disk_size() / bytes_per_sector).min(u32::MAX as u64);
    let sectors_per_cluster = options.sectors_per_cluster as u64;
    let reserved_sectors = options.reserved_sectors as u64;
    let fat_count = options.fat_count as u64;

    if reserved_sectors <= BACKUP_BOOT_SECTOR as u64 + 1 {
        return Err(Error::InvalidBpb(format!(
            "{} reserved sectors do not leave room for the backup boot sector",
            reserved_sectors
        )));
    }

    // upper bound, assumes the FATs take no space
    let clusters = total_sectors.saturating_sub(reserved_sectors) / sectors_per_cluster.max(1);
    let sectors_per_fat = units_needed!((clusters + 2) * 4, bytes_per_sector);

    let metadata = reserved_sectors + fat_count * sectors_per_fat;
    if total_sectors < metadata + sectors_per_cluster {
        return Err(Error::InvalidBpb(format!(
            "image of {} sectors is too small for a FAT32 volume",
            total_sectors
        )));
    }

    let bpb = BpbFat32 {
        jump: [0xEB, 0x58, 0x90],
        oem_id: *b"FAT32SH ",
        bytes_per_sector: options.bytes_per_sector,
        sectors_per_cluster: options.sectors_per_cluster,
        number_of_reserved_sectors: options.reserved_sectors,
        number_of_fats: options.fat_count,
        number_of_directory_entries: 0,
        sectors_total: total_sectors as u32,
        media_descriptor: MEDIA_DESCRIPTOR,
        sectors_per_fat: sectors_per_fat as u32,
        sectors_per_track: 32,
        number_of_heads: 64,
        number_of_hidden_sectors: 0,
        flags: 0,
        fat_version: 0,
        root_directory_cluster: ROOT_CLUSTER,
        fsinfo_lba: FSINFO_SECTOR,
        backup_bs_lba: BACKUP_BOOT_SECTOR,
        reserved: [0; 12],
        drive_number: 0x80,
        winnt_flags: 0,
        signature: 0x29,
        serial: options.serial,
        label: options.label,
        identifier: *b"FAT32   ",
    };
    let geometry = bpb.geometry()?;

    let mut boot_sector = vec![0u8; bytes_per_sector as usize];
    bpb.encode(&mut &mut boot_sector[..BpbFat32::SIZE])?;
    boot_sector[510] = 0x55;
    boot_sector[511] = 0xAA;

    let mut fsinfo = vec![0u8; bytes_per_sector as usize];
    LittleEndian::write_u32(&mut fsinfo[0..4], FSINFO_LEAD_SIGNATURE);
    LittleEndian::write_u32(&mut fsinfo[484..488], FSINFO_STRUCT_SIGNATURE);
    LittleEndian::write_u32(&mut fsinfo[488..492], FSINFO_UNKNOWN);
    LittleEndian::write_u32(&mut fsinfo[492..496], FSINFO_UNKNOWN);
    LittleEndian::write_u32(&mut fsinfo[508..512], FSINFO_TRAIL_SIGNATURE);

    // reserved area and every FAT copy start out zeroed
    fill_zero(disk, 0, geometry.data_offset())?;

    for base in [0, BACKUP_BOOT_SECTOR as u64].iter() {
        disk.seek(SeekFrom::Start(base * bytes_per_sector))?;
        disk.write_all(&boot_sector)?;
        disk.seek(SeekFrom::Start((base + FSINFO_SECTOR as u64) * bytes_per_sector))?;
        disk.write_all(&fsinfo)?;
    }

    let mut head = [0u8; 12];
    LittleEndian::write_u32(&mut head[0..4], 0x0FFF_FF00 | MEDIA_DESCRIPTOR as u32);
    LittleEndian::write_u32(&mut head[4..8], END_OF_CHAIN);
    LittleEndian::write_u32(&mut head[8..12], END_OF_CHAIN);
    for copy in 0..fat_count {
        disk.seek(SeekFrom::Start(geometry.fat_offset() + copy * geometry.fat_size()))?;
        disk.write_all(&head)?;
    }

    fill_zero(
        disk,
        geometry.cluster_to_data_offset(ROOT_CLUSTER),
        geometry.cluster_size(),
    )?;
    disk.flush()?;

    info!(
        "formatted {} sectors, {} bytes per cluster, {} sectors per FAT",
        total_sectors,
        geometry.cluster_size(),
        sectors_per_fat
    );
    Ok(geometry)
}

fn fill_zero(disk: &mut dyn Disk, offset: u64, length: u64) -> Result<()> {
    const CHUNK: u64 = 64 * 1024;
    let zero = vec![0u8; CHUNK.min(length) as usize];

    disk.seek(SeekFrom::Start(offset))?;
    let mut left = length;
    while left > 0 {
        let n = left.min(CHUNK);
        disk.write_all(&zero[..n as usize])?;
        left -= n;
    }
    Ok(())
}
