use crate::disk::{Disk, Info};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Image backed by any seekable stream, usually a `File`
pub struct RawDisk<B>
where
    B: Read + Seek + Write,
{
    backend: B,
    disk_size: u64,
}

impl<B> RawDisk<B>
where
    B: Read + Seek + Write,
{
    pub fn open(mut backend: B) -> io::Result<Self> {
        let disk_size = backend.seek(SeekFrom::End(0))?;
        backend.seek(SeekFrom::Start(0))?;

        Ok(Self { backend, disk_size })
    }
}

impl<B> Read for RawDisk<B>
where
    B: Read + Seek + Write,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.backend.read(buf)
    }
}

impl<B> Seek for RawDisk<B>
where
    B: Read + Seek + Write,
{
    fn seek(&mut self, seek: SeekFrom) -> io::Result<u64> {
        self.backend.seek(seek)
    }
}

impl<B> Write for RawDisk<B>
where
    B: Read + Seek + Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.backend.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.backend.flush()
    }
}

impl<B> Info for RawDisk<B>
where
    B: Read + Seek + Write,
{
    fn disk_size(&self) -> u64 {
        self.disk_size
    }
}

impl<B> Disk for RawDisk<B> where B: Read + Seek + Write {}
