use crate::disk::{Disk, Info};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Fixed size in-memory image, writes past the end are truncated
pub struct RamDisk {
    buffer: Cursor<Vec<u8>>,
}

impl RamDisk {
    pub fn new_zeroed(size_in_bytes: usize) -> Self {
        Self {
            buffer: Cursor::new(vec![0u8; size_in_bytes]),
        }
    }

    pub fn from_vec(vector: Vec<u8>) -> Self {
        Self {
            buffer: Cursor::new(vector),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buffer.get_ref().as_slice()
    }
}

impl Read for RamDisk {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}

impl Seek for RamDisk {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl Write for RamDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let size = self.buffer.get_ref().len() as u64;
        let available = size.saturating_sub(self.buffer.position());
        let n = buf.len().min(available as usize);
        self.buffer.write(&buf[..n])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }
}

impl Info for RamDisk {
    fn disk_size(&self) -> u64 {
        self.buffer.get_ref().len() as u64
    }
}

impl Disk for RamDisk {}
