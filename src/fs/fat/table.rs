use super::Fat32;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

pub const FREE_CLUSTER: u32 = 0;
/// Value written to terminate a chain
pub const END_OF_CHAIN: u32 = 0x0FFF_FFFF;
/// Any link at or above this value terminates a chain
pub const END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF6;

#[inline]
pub fn is_end_of_chain(link: u32) -> bool {
    link >= END_OF_CHAIN_MIN
}

impl<'a> Fat32<'a> {
    /// Byte offset of the FAT entry for `cluster` in the first FAT copy
    #[inline]
    pub fn cluster_to_fat_offset(&self, cluster: u32) -> u64 {
        self.geometry.fat_offset() + cluster as u64 * 4
    }

    pub fn next_cluster(&mut self, cluster: u32) -> Result<u32> {
        let offset = self.cluster_to_fat_offset(cluster);
        self.read_u32_at(offset)
    }

    /// Cluster linked after `cluster`, `None` when the chain ends there.
    ///
    /// Free, reserved and out of range links are reported as corruption.
    pub(crate) fn following_cluster(&mut self, cluster: u32) -> Result<Option<u32>> {
        let next = self.next_cluster(cluster)?;
        if is_end_of_chain(next) {
            Ok(None)
        } else if next < 2 || next >= self.cluster_limit {
            warn!("cluster {} links to invalid cluster 0x{:08X}", cluster, next);
            Err(Error::CorruptChain(cluster))
        } else {
            Ok(Some(next))
        }
    }

    /// Writes the link into every FAT copy.
    pub fn set_next_cluster(&mut self, cluster: u32, value: u32) -> Result<()> {
        trace!("FAT[{}] <- 0x{:08X}", cluster, value);

        let offset = self.cluster_to_fat_offset(cluster);
        let fat_size = self.geometry.fat_size();
        for copy in 0..self.geometry.fat_count as u64 {
            self.write_u32_at(offset + copy * fat_size, value)?;
        }

        self.pending.retain(|&x| x != cluster);
        Ok(())
    }

    /// Finds the first free cluster at or after the root cluster and zeroes
    /// its payload.
    ///
    /// The cluster is not marked in the FAT, the caller has to link it or
    /// terminate it. Until that happens it is not handed out again.
    pub fn allocate_free_cluster(&mut self) -> Result<u32> {
        let entries_per_sector = self.geometry.bytes_per_sector / 4;
        let mut buf = vec![0u8; self.geometry.bytes_per_sector as usize];

        let mut cluster = self.geometry.root_cluster;
        while cluster < self.cluster_limit {
            let first_in_sector = cluster - cluster % entries_per_sector;
            let offset = self.cluster_to_fat_offset(first_in_sector);
            self.read_at(offset, &mut buf)?;

            for index in (cluster - first_in_sector)..entries_per_sector {
                let candidate = first_in_sector + index;
                if candidate >= self.cluster_limit {
                    break;
                }

                let link = LittleEndian::read_u32(&buf[index as usize * 4..]);
                if link == FREE_CLUSTER && !self.pending.contains(&candidate) {
                    let zero = vec![0u8; self.geometry.cluster_size() as usize];
                    let data_offset = self.geometry.cluster_to_data_offset(candidate);
                    self.write_at(data_offset, &zero)?;

                    self.pending.push(candidate);
                    debug!("allocated cluster {}", candidate);
                    return Ok(candidate);
                }
            }

            cluster = first_in_sector + entries_per_sector;
        }

        warn!(
            "no free cluster in FAT ({} sectors, {} usable clusters)",
            self.geometry.sectors_per_fat,
            self.cluster_limit.saturating_sub(2)
        );
        Err(Error::OutOfSpace)
    }

    /// Allocates a cluster and appends it after `last`.
    pub fn extend_chain(&mut self, last: u32) -> Result<u32> {
        let cluster = self.allocate_free_cluster()?;
        self.set_next_cluster(cluster, END_OF_CHAIN)?;
        self.set_next_cluster(last, cluster)?;
        Ok(cluster)
    }

    /// Zeroes every link of the chain starting at `first`, returns the
    /// number of clusters released.
    pub fn free_chain(&mut self, first: u32) -> Result<u32> {
        let mut clusters = Vec::new();
        let mut chain = ClusterChain::new(first);
        while let Some((cluster, _)) = chain.next(self)? {
            clusters.push(cluster);
        }

        for cluster in clusters.iter().copied() {
            self.set_next_cluster(cluster, FREE_CLUSTER)?;
        }

        debug!("released {} cluster(s) starting at {}", clusters.len(), first);
        Ok(clusters.len() as u32)
    }

    /// Last cluster of the chain and the chain length
    pub fn chain_tail(&mut self, first: u32) -> Result<(u32, u32)> {
        let mut last = first;
        let mut count = 0;
        let mut chain = ClusterChain::new(first);
        while let Some((cluster, _)) = chain.next(self)? {
            last = cluster;
            count += 1;
        }
        Ok((last, count))
    }
}

/// Walks a cluster chain, yielding `(cluster, data region offset)` pairs.
///
/// Does not borrow the volume between steps, so the caller can do I/O while
/// walking. Walking again from the start only needs a new `ClusterChain`.
#[derive(Debug, Clone)]
pub struct ClusterChain {
    next: Option<u32>,
    previous: Option<u32>,
    hops: u32,
}

impl ClusterChain {
    pub fn new(first: u32) -> Self {
        Self {
            next: Some(first),
            previous: None,
            hops: 0,
        }
    }

    pub fn next(&mut self, fs: &mut Fat32) -> Result<Option<(u32, u64)>> {
        let cluster = match self.next {
            Some(x) => x,
            None => return Ok(None),
        };

        // a valid chain visits every cluster at most once
        self.hops += 1;
        if cluster < 2 || cluster >= fs.cluster_limit() || self.hops > fs.cluster_limit() {
            return Err(Error::CorruptChain(self.previous.unwrap_or(cluster)));
        }

        let link = fs.next_cluster(cluster)?;
        self.next = if is_end_of_chain(link) {
            None
        } else {
            Some(link)
        };
        self.previous = Some(cluster);

        Ok(Some((cluster, fs.geometry().cluster_to_data_offset(cluster))))
    }
}
