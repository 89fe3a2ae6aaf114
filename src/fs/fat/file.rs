use super::dir::{DirEntry, EntryLocation};
use super::table::{ClusterChain, END_OF_CHAIN};
use super::Fat32;
use crate::{Error, Result};

/// Result of a write that may stop half way.
///
/// Bytes before the failure stay on disk and are accounted for in the
/// file size.
#[derive(Debug)]
pub struct WriteOutcome {
    pub written: u32,
    pub error: Option<Error>,
}

impl WriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<u32> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.written),
        }
    }
}

impl<'a> Fat32<'a> {
    /// Reads up to `length` bytes starting at `offset`, clamped to the file
    /// size.
    pub fn read_file(&mut self, entry: &DirEntry, offset: u32, length: u32) -> Result<Vec<u8>> {
        let length = length.min(entry.file_size.saturating_sub(offset)) as usize;
        let mut buf = vec![0u8; length];
        if length == 0 {
            return Ok(buf);
        }

        let cluster_size = self.geometry.cluster_size();
        let skip = offset as u64 / cluster_size;
        let mut within = offset as u64 % cluster_size;

        let mut chain = ClusterChain::new(entry.first_cluster);
        let mut hops = 0;
        let mut done = 0;
        let mut last = entry.first_cluster;
        while done < length {
            let (cluster, base) = chain.next(self)?.ok_or(Error::CorruptChain(last))?;
            last = cluster;
            if hops < skip {
                hops += 1;
                continue;
            }

            let span = ((cluster_size - within) as usize).min(length - done);
            self.read_at(base + within, &mut buf[done..done + span])?;
            done += span;
            within = 0;
        }

        Ok(buf)
    }

    /// Writes `data` at `offset`, allocating the first cluster and growing
    /// the chain as needed, then stores the new size and write time in the
    /// record at `location`.
    ///
    /// `offset` must not exceed the file size.
    pub fn write_file(
        &mut self,
        location: &EntryLocation,
        entry: &mut DirEntry,
        offset: u32,
        data: &[u8],
    ) -> WriteOutcome {
        debug_assert!(offset <= entry.file_size);

        let data = &data[..data.len().min((u32::MAX - offset) as usize)];
        let mut written = 0;
        let mut error = self.write_spans(location, entry, offset, data, &mut written).err();

        if written > 0 {
            entry.file_size = entry.file_size.max(offset + written as u32);
            entry.touch();
            if let Err(e) = self.update_entry(location, entry) {
                error.get_or_insert(e);
            }
        }

        if let Some(e) = &error {
            warn!(
                "write to {} stopped after {} of {} bytes: {}",
                entry.display_name(),
                written,
                data.len(),
                e
            );
        }

        WriteOutcome {
            written: written as u32,
            error,
        }
    }

    fn write_spans(
        &mut self,
        location: &EntryLocation,
        entry: &mut DirEntry,
        offset: u32,
        data: &[u8],
        written: &mut usize,
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        if entry.first_cluster == 0 {
            let cluster = self.allocate_free_cluster()?;
            self.set_next_cluster(cluster, END_OF_CHAIN)?;
            entry.first_cluster = cluster;
            self.update_entry(location, entry)?;
            debug!("{} bound to cluster {}", entry.display_name(), cluster);
        }

        let cluster_size = self.geometry.cluster_size();
        let mut cluster = entry.first_cluster;
        for _ in 0..offset as u64 / cluster_size {
            cluster = self.next_or_extend(cluster)?;
        }

        let mut within = offset as u64 % cluster_size;
        while *written < data.len() {
            if within == cluster_size {
                cluster = self.next_or_extend(cluster)?;
                within = 0;
            }

            let span = ((cluster_size - within) as usize).min(data.len() - *written);
            let base = self.geometry.cluster_to_data_offset(cluster);
            self.write_at(base + within, &data[*written..*written + span])?;
            *written += span;
            within += span as u64;
        }

        Ok(())
    }

    fn next_or_extend(&mut self, cluster: u32) -> Result<u32> {
        match self.following_cluster(cluster)? {
            Some(next) => Ok(next),
            None => self.extend_chain(cluster),
        }
    }
}
