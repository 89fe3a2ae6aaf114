use crate::{Error, Result};

pub const MAX_DEPTH: usize = 50;

/// Clusters of the directories entered with `cd`, innermost last.
///
/// The root directory is implied and never stored.
#[derive(Debug)]
pub struct DirStack {
    root: u32,
    stack: Vec<u32>,
}

impl DirStack {
    pub fn new(root: u32) -> Self {
        Self {
            root,
            stack: Vec::with_capacity(MAX_DEPTH),
        }
    }

    pub fn push(&mut self, cluster: u32) -> Result<()> {
        if self.stack.len() >= MAX_DEPTH {
            warn!("directory stack is full, {} not entered", cluster);
            return Err(Error::DirectoryStackOverflow(MAX_DEPTH));
        }
        self.stack.push(cluster);
        Ok(())
    }

    /// Leaves the innermost directory, returns the cluster of its parent.
    pub fn pop(&mut self) -> u32 {
        let parent = self.peek_parent();
        self.stack.pop();
        parent
    }

    pub fn peek_parent(&self) -> u32 {
        match self.stack.len() {
            0 | 1 => self.root,
            n => self.stack[n - 2],
        }
    }

    #[cfg(test)]
    pub fn current(&self) -> u32 {
        self.stack.last().copied().unwrap_or(self.root)
    }

    pub fn reset(&mut self) {
        self.stack.clear();
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
