use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

pub const MAX_OPEN_FILES: usize = 100;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn can_read(self) -> bool {
        self == Self::ReadOnly || self == Self::ReadWrite
    }

    pub fn can_write(self) -> bool {
        self == Self::WriteOnly || self == Self::ReadWrite
    }
}

impl FromStr for AccessMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(Self::ReadOnly),
            "w" => Ok(Self::WriteOnly),
            "rw" | "wr" => Ok(Self::ReadWrite),
            _ => Err(Error::InvalidMode(s.to_owned())),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "r",
            Self::WriteOnly => "w",
            Self::ReadWrite => "rw",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    pub name: String,
    /// Cluster of the directory the file was opened in
    pub directory: u32,
    /// 0 until the first write allocates a cluster
    pub first_cluster: u32,
    pub mode: AccessMode,
    pub offset: u32,
}

/// Files opened in the current session, at most one handle per name
#[derive(Debug, Default)]
pub struct OpenFiles {
    files: Vec<OpenFile>,
}

impl OpenFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, file: OpenFile) -> Result<()> {
        if self.lookup(&file.name).is_some() {
            return Err(Error::AlreadyOpen(file.name));
        }
        if self.files.len() >= MAX_OPEN_FILES {
            return Err(Error::TooManyOpenFiles);
        }

        debug!(
            "opened {} (mode {}, first cluster {})",
            file.name, file.mode, file.first_cluster
        );
        self.files.push(file);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.files.iter().position(|x| x.name == name)
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&OpenFile> {
        self.files.iter().find(|x| x.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut OpenFile> {
        self.files.iter_mut().find(|x| x.name == name)
    }

    pub fn close(&mut self, name: &str) -> Result<OpenFile> {
        match self.lookup(name) {
            Some(index) => Ok(self.files.remove(index)),
            None => Err(Error::NotOpen(name.to_owned())),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
