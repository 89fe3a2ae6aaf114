use std::{io, result};

use thiserror::Error;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error("invalid BPB: {0}")]
    InvalidBpb(String),
    #[error("{0} not found in current working directory")]
    EntryNotFound(String),
    #[error("{0} is not a directory")]
    NotADirectory(String),
    #[error("{0} is a directory")]
    IsADirectory(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("name {0:?} too long, at most 8 characters are supported")]
    NameTooLong(String),
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("invalid mode {0:?}, expected r, w, rw or wr")]
    InvalidMode(String),
    #[error("{0} is read-only, open it with mode r")]
    ReadOnlyViolation(String),
    #[error("{0} is already open")]
    AlreadyOpen(String),
    #[error("{0} is not open")]
    NotOpen(String),
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("offset {offset} is greater than file size {size}")]
    OffsetExceedsFileSize { offset: u32, size: u32 },
    #[error("{name} is not open for {operation}")]
    WrongModeForOperation {
        name: String,
        operation: &'static str,
    },
    #[error("no free clusters left")]
    OutOfSpace,
    #[error("directory stack is limited to {0} entries")]
    DirectoryStackOverflow(usize),
    #[error("the name {0} is already being used by another file")]
    DestinationNameCollision(String),
    #[error("directory {0} is not empty")]
    DirectoryNotEmpty(String),
    #[error("{0} cannot be moved into itself")]
    InvalidMove(String),
    #[error("cluster chain is corrupted at cluster {0}")]
    CorruptChain(u32),
}
