use super::table::ClusterChain;
use super::Fat32;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

pub const ENTRY_SIZE: usize = 32;
/// Name byte marking the end of a directory
pub const END_OF_DIRECTORY: u8 = 0x00;
/// Name byte marking a deleted record
pub const DELETED: u8 = 0xE5;
/// Ordinal written into the placeholder preceding every created record
pub const PLACEHOLDER_ORDINAL: u8 = 0x41;
pub const LONG_NAME_ATTRIBUTE: u8 = 0x0F;
/// Longest name accepted for new records
pub const MAX_NAME_LENGTH: usize = 8;

const DOT_NAME: [u8; 11] = *b".          ";
const DOT_DOT_NAME: [u8; 11] = *b"..         ";

bitflags! {
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attributes: Attributes,
    pub nt_reserved: u8,
    pub creation_time_tenth: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub access_date: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster: u32,
    pub file_size: u32,
}

impl DirEntry {
    pub fn new(name: [u8; 11], attributes: Attributes, first_cluster: u32) -> Self {
        let (date, time) = encode_timestamp(&chrono::Local::now().naive_local());
        Self {
            name,
            attributes,
            nt_reserved: 0,
            creation_time_tenth: 0,
            creation_time: time,
            creation_date: date,
            access_date: date,
            write_time: time,
            write_date: date,
            first_cluster,
            file_size: 0,
        }
    }

    pub fn dot(cluster: u32) -> Self {
        Self::new(DOT_NAME, Attributes::DIRECTORY, cluster)
    }

    /// `parent` is 0 when the parent is the root directory
    pub fn dot_dot(parent: u32) -> Self {
        Self::new(DOT_DOT_NAME, Attributes::DIRECTORY, parent)
    }

    pub fn decode(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= ENTRY_SIZE);

        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[..11]);

        let high = LittleEndian::read_u16(&raw[20..22]) as u32;
        let low = LittleEndian::read_u16(&raw[26..28]) as u32;

        Self {
            name,
            attributes: Attributes::from_bits_truncate(raw[11]),
            nt_reserved: raw[12],
            creation_time_tenth: raw[13],
            creation_time: LittleEndian::read_u16(&raw[14..16]),
            creation_date: LittleEndian::read_u16(&raw[16..18]),
            access_date: LittleEndian::read_u16(&raw[18..20]),
            write_time: LittleEndian::read_u16(&raw[22..24]),
            write_date: LittleEndian::read_u16(&raw[24..26]),
            first_cluster: high << 16 | low,
            file_size: LittleEndian::read_u32(&raw[28..32]),
        }
    }

    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut raw = [0u8; ENTRY_SIZE];
        raw[..11].copy_from_slice(&self.name);
        raw[11] = self.attributes.bits();
        raw[12] = self.nt_reserved;
        raw[13] = self.creation_time_tenth;
        LittleEndian::write_u16(&mut raw[14..16], self.creation_time);
        LittleEndian::write_u16(&mut raw[16..18], self.creation_date);
        LittleEndian::write_u16(&mut raw[18..20], self.access_date);
        LittleEndian::write_u16(&mut raw[20..22], (self.first_cluster >> 16) as u16);
        LittleEndian::write_u16(&mut raw[22..24], self.write_time);
        LittleEndian::write_u16(&mut raw[24..26], self.write_date);
        LittleEndian::write_u16(&mut raw[26..28], self.first_cluster as u16);
        LittleEndian::write_u32(&mut raw[28..32], self.file_size);
        raw
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(Attributes::READ_ONLY)
    }

    pub fn display_name(&self) -> String {
        display_name(&self.name)
    }

    pub fn touch(&mut self) {
        let (date, time) = encode_timestamp(&chrono::Local::now().naive_local());
        self.write_date = date;
        self.write_time = time;
        self.access_date = date;
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        decode_timestamp(self.write_date, self.write_time)
    }
}

/// Classification of a raw 32 byte directory slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    End,
    Deleted,
    /// Long name record or placeholder, never decoded
    SkipMarker,
    Record(DirEntry),
}

impl Slot {
    pub fn classify(raw: &[u8]) -> Self {
        if raw[0] == END_OF_DIRECTORY {
            Self::End
        } else if raw[11] == LONG_NAME_ATTRIBUTE {
            Self::SkipMarker
        } else if raw[0] == DELETED {
            Self::Deleted
        } else {
            Self::Record(DirEntry::decode(raw))
        }
    }
}

/// Where a record lives on disk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntryLocation {
    /// Directory cluster holding the record
    pub cluster: u32,
    /// Absolute image offset of the record
    pub offset: u64,
    /// Absolute image offset of the skip-marker run preceding the record,
    /// equal to `offset` when there is none
    pub run_start: u64,
}

pub(crate) enum DirEvent {
    Record {
        entry: DirEntry,
        location: EntryLocation,
        dot: bool,
    },
    Deleted {
        location: EntryLocation,
    },
    End {
        location: EntryLocation,
    },
}

pub(crate) enum FreeSlot {
    At {
        cluster: u32,
        offset: u64,
        filler: Option<u64>,
    },
    ChainFull {
        last_cluster: u32,
        filler: Option<u64>,
    },
}

pub fn placeholder(name: &[u8; 11]) -> [u8; ENTRY_SIZE] {
    let mut raw = [0u8; ENTRY_SIZE];
    raw[0] = PLACEHOLDER_ORDINAL;
    raw[11] = LONG_NAME_ATTRIBUTE;
    raw[13] = short_name_checksum(name);
    raw
}

fn short_name_checksum(name: &[u8; 11]) -> u8 {
    name.iter().fold(0u8, |sum, &byte| {
        ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(byte)
    })
}

/// Validates a user supplied name and pads it into an 11 byte field.
pub fn encode_name(name: &str) -> Result<[u8; 11]> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidName(name.to_owned()));
    }
    if name
        .bytes()
        .any(|x| !x.is_ascii_graphic() || x == b'/' || x == b'\\')
    {
        return Err(Error::InvalidName(name.to_owned()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::NameTooLong(name.to_owned()));
    }

    let mut field = [b' '; 11];
    field[..name.len()].copy_from_slice(name.as_bytes());
    Ok(field)
}

pub fn display_name(field: &[u8; 11]) -> String {
    fn trim(x: &[u8]) -> &[u8] {
        let end = x.iter().rposition(|&c| c != b' ').map_or(0, |i| i + 1);
        &x[..end]
    }

    if field.contains(&b'.') {
        return String::from_utf8_lossy(trim(field)).into_owned();
    }

    let base = String::from_utf8_lossy(trim(&field[..8]));
    let extension = trim(&field[8..]);
    if extension.is_empty() {
        base.into_owned()
    } else {
        format!("{}.{}", base, String::from_utf8_lossy(extension))
    }
}

pub fn encode_timestamp(datetime: &NaiveDateTime) -> (u16, u16) {
    let year = datetime.year().max(1980).min(2107) as u16;
    let date = (year - 1980) << 9 | (datetime.month() as u16) << 5 | datetime.day() as u16;
    let time = (datetime.hour() as u16) << 11
        | (datetime.minute() as u16) << 5
        | (datetime.second() as u16 / 2);
    (date, time)
}

pub fn decode_timestamp(date: u16, time: u16) -> Option<NaiveDateTime> {
    let year = 1980 + (date >> 9) as i32;
    let month = (date >> 5 & 0x0F) as u32;
    let day = (date & 0x1F) as u32;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(
        (time >> 11) as u32,
        (time >> 5 & 0x3F) as u32,
        (time & 0x1F) as u32 * 2,
    )
}

impl<'a> Fat32<'a> {
    /// Visits every slot of the directory starting at `first` in order.
    ///
    /// The first cluster of a subdirectory yields "." and ".." unprefixed,
    /// everything else is [skip markers..., record]. Volume labels are not
    /// reported. The walk stops at the first end marker, when `visit`
    /// returns `false` or when the chain ends. Returns the last cluster
    /// visited.
    pub(crate) fn walk_directory<F>(&mut self, first: u32, mut visit: F) -> Result<u32>
    where
        F: FnMut(DirEvent) -> bool,
    {
        let is_root = first == self.root_cluster();
        let cluster_size = self.geometry.cluster_size() as usize;
        let mut buf = vec![0u8; cluster_size];

        let mut chain = ClusterChain::new(first);
        let mut last = first;
        let mut first_cluster = true;

        while let Some((cluster, base)) = chain.next(self)? {
            last = cluster;
            self.read_at(base, &mut buf)?;

            let mut pos = 0;
            if first_cluster && !is_root {
                for _ in 0..2 {
                    let offset = base + pos as u64;
                    let event = DirEvent::Record {
                        entry: DirEntry::decode(&buf[pos..pos + ENTRY_SIZE]),
                        location: EntryLocation {
                            cluster,
                            offset,
                            run_start: offset,
                        },
                        dot: true,
                    };
                    if !visit(event) {
                        return Ok(cluster);
                    }
                    pos += ENTRY_SIZE;
                }
            }
            first_cluster = false;

            let mut run_start = None;
            while pos + ENTRY_SIZE <= cluster_size {
                let offset = base + pos as u64;
                let location = EntryLocation {
                    cluster,
                    offset,
                    run_start: run_start.unwrap_or(offset),
                };
                pos += ENTRY_SIZE;

                let keep_going = match Slot::classify(&buf[pos - ENTRY_SIZE..pos]) {
                    Slot::End => {
                        visit(DirEvent::End { location });
                        return Ok(cluster);
                    }
                    Slot::SkipMarker => {
                        run_start.get_or_insert(offset);
                        continue;
                    }
                    Slot::Deleted => visit(DirEvent::Deleted { location }),
                    Slot::Record(entry) => {
                        if entry.attributes.contains(Attributes::VOLUME_ID) {
                            true
                        } else {
                            visit(DirEvent::Record {
                                entry,
                                location,
                                dot: false,
                            })
                        }
                    }
                };
                if !keep_going {
                    return Ok(cluster);
                }
                run_start = None;
            }
        }

        Ok(last)
    }

    /// Looks up `name` in the directory starting at `dir`.
    ///
    /// "." and ".." only match in subdirectories.
    pub fn find_entry(
        &mut self,
        dir: u32,
        name: &str,
    ) -> Result<Option<(DirEntry, EntryLocation)>> {
        let mut found = None;
        self.walk_directory(dir, |event| match event {
            DirEvent::Record {
                entry, location, ..
            } if entry.display_name() == name => {
                found = Some((entry, location));
                false
            }
            _ => true,
        })?;
        Ok(found)
    }

    /// Same walk as [`find_entry`](Self::find_entry), only the record position.
    pub fn find_entry_offset(&mut self, dir: u32, name: &str) -> Result<Option<u64>> {
        Ok(self.find_entry(dir, name)?.map(|(_, location)| location.offset))
    }

    /// Live records in directory order, including "." and ".."
    pub fn list_directory(&mut self, dir: u32) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        self.walk_directory(dir, |event| {
            if let DirEvent::Record { entry, .. } = event {
                entries.push(entry);
            }
            true
        })?;
        Ok(entries)
    }

    pub fn is_directory_empty(&mut self, dir: u32) -> Result<bool> {
        let mut empty = true;
        self.walk_directory(dir, |event| match event {
            DirEvent::Record { dot: false, .. } => {
                empty = false;
                false
            }
            _ => true,
        })?;
        Ok(empty)
    }

    /// Finds room for a [placeholder, record] pair.
    ///
    /// A deleted record is reused together with its skip-marker run. A
    /// single slot left before the cluster end is reported as `filler`, it
    /// has to be marked deleted so the walk reaches the next cluster.
    pub(crate) fn find_free_slot(&mut self, dir: u32) -> Result<FreeSlot> {
        let pair = 2 * ENTRY_SIZE as u64;
        let cluster_size = self.geometry.cluster_size();

        let mut reusable = None;
        let mut end = None;
        let last_cluster = self.walk_directory(dir, |event| match event {
            DirEvent::Deleted { location }
                if location.offset >= location.run_start + ENTRY_SIZE as u64 =>
            {
                reusable = Some(location);
                false
            }
            DirEvent::End { location } => {
                end = Some(location);
                false
            }
            _ => true,
        })?;

        if let Some(location) = reusable {
            return Ok(FreeSlot::At {
                cluster: location.cluster,
                offset: location.run_start,
                filler: None,
            });
        }

        let location = match end {
            Some(x) => x,
            None => {
                return Ok(FreeSlot::ChainFull {
                    last_cluster,
                    filler: None,
                })
            }
        };

        let cluster_end = self.geometry.cluster_to_data_offset(location.cluster) + cluster_size;
        if cluster_end - location.run_start >= pair {
            return Ok(FreeSlot::At {
                cluster: location.cluster,
                offset: location.run_start,
                filler: None,
            });
        }

        let filler = Some(location.run_start);
        match self.following_cluster(location.cluster)? {
            Some(next) => Ok(FreeSlot::At {
                cluster: next,
                offset: self.geometry.cluster_to_data_offset(next),
                filler,
            }),
            None => Ok(FreeSlot::ChainFull {
                last_cluster: location.cluster,
                filler,
            }),
        }
    }

    /// Writes a [placeholder, record] pair into the directory, extending its
    /// chain when every cluster is full.
    pub fn insert_entry(&mut self, dir: u32, entry: &DirEntry) -> Result<EntryLocation> {
        let (cluster, offset, filler) = match self.find_free_slot(dir)? {
            FreeSlot::At {
                cluster,
                offset,
                filler,
            } => (cluster, offset, filler),
            FreeSlot::ChainFull {
                last_cluster,
                filler,
            } => {
                let cluster = self.extend_chain(last_cluster)?;
                debug!("directory {} extended with cluster {}", dir, cluster);
                (cluster, self.geometry.cluster_to_data_offset(cluster), filler)
            }
        };

        if let Some(stray) = filler {
            trace!("marking stray slot at 0x{:X} deleted", stray);
            self.write_at(stray, &[DELETED])?;
        }

        let mut pair = [0u8; 2 * ENTRY_SIZE];
        pair[..ENTRY_SIZE].copy_from_slice(&placeholder(&entry.name));
        pair[ENTRY_SIZE..].copy_from_slice(&entry.encode());
        self.write_at(offset, &pair)?;

        Ok(EntryLocation {
            cluster,
            offset: offset + ENTRY_SIZE as u64,
            run_start: offset,
        })
    }

    pub fn update_entry(&mut self, location: &EntryLocation, entry: &DirEntry) -> Result<()> {
        self.write_at(location.offset, &entry.encode())
    }

    /// Marks a record deleted.
    ///
    /// When another slot follows the record in directory order it becomes
    /// `0xE5`, otherwise the record and its skip-marker run become the new
    /// end of the directory.
    pub fn remove_entry(&mut self, location: &EntryLocation) -> Result<()> {
        let next_offset = location.offset + ENTRY_SIZE as u64;
        let cluster_end =
            self.geometry.cluster_to_data_offset(location.cluster) + self.geometry.cluster_size();

        let follower = if next_offset < cluster_end {
            Some(next_offset)
        } else {
            self.following_cluster(location.cluster)?
                .map(|next| self.geometry.cluster_to_data_offset(next))
        };

        let follows = match follower {
            Some(offset) => {
                let mut byte = [0u8; 1];
                self.read_at(offset, &mut byte)?;
                byte[0] != END_OF_DIRECTORY
            }
            None => false,
        };

        if follows {
            trace!("record at 0x{:X} marked deleted", location.offset);
            self.write_at(location.offset, &[DELETED])
        } else {
            trace!("record at 0x{:X} is the new end of directory", location.offset);
            let run = vec![0u8; (location.offset - location.run_start) as usize];
            self.write_at(location.run_start, &run)?;
            self.write_at(location.offset, &[END_OF_DIRECTORY])
        }
    }

    /// Writes "." and ".." into a freshly allocated directory cluster.
    pub fn init_directory(&mut self, cluster: u32, parent: u32) -> Result<()> {
        let parent = if parent == self.root_cluster() { 0 } else { parent };

        let mut header = [0u8; 2 * ENTRY_SIZE];
        header[..ENTRY_SIZE].copy_from_slice(&DirEntry::dot(cluster).encode());
        header[ENTRY_SIZE..].copy_from_slice(&DirEntry::dot_dot(parent).encode());

        let offset = self.geometry.cluster_to_data_offset(cluster);
        self.write_at(offset, &header)
    }

    /// Points the ".." record of the directory at `cluster` to `parent`.
    pub fn set_parent(&mut self, cluster: u32, parent: u32) -> Result<()> {
        let parent = if parent == self.root_cluster() { 0 } else { parent };
        let offset = self.geometry.cluster_to_data_offset(cluster) + ENTRY_SIZE as u64;

        let mut raw = [0u8; ENTRY_SIZE];
        self.read_at(offset, &mut raw)?;
        let mut entry = DirEntry::decode(&raw);
        entry.first_cluster = parent;
        self.write_at(offset, &entry.encode())
    }
}
