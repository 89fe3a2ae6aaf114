use super::dir::{encode_name, Attributes, DirEntry, EntryLocation};
use super::dir_stack::DirStack;
use super::file::WriteOutcome;
use super::open_files::{AccessMode, OpenFile, OpenFiles};
use super::table::{END_OF_CHAIN, FREE_CLUSTER};
use super::{BpbFat32, Fat32};
use crate::disk::Disk;
use crate::{Error, Result};
use chrono::NaiveDateTime;

/// One line of a directory listing
#[derive(Debug, Clone)]
pub struct Listing {
    pub name: String,
    pub attributes: Attributes,
    pub file_size: u32,
    pub modified: Option<NaiveDateTime>,
}

impl Listing {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }
}

impl From<&DirEntry> for Listing {
    fn from(entry: &DirEntry) -> Self {
        Self {
            name: entry.display_name(),
            attributes: entry.attributes,
            file_size: entry.file_size,
            modified: entry.modified(),
        }
    }
}

/// Working directory, directory stack and open files on top of a volume.
///
/// Every verb checks its preconditions before touching the image.
pub struct Session<'a> {
    fs: Fat32<'a>,
    cwd: u32,
    stack: DirStack,
    open_files: OpenFiles,
}

impl<'a> Session<'a> {
    pub fn new(fs: Fat32<'a>) -> Self {
        let root = fs.root_cluster();
        Self {
            fs,
            cwd: root,
            stack: DirStack::new(root),
            open_files: OpenFiles::new(),
        }
    }

    pub fn open_volume(device: &'a mut dyn Disk) -> Result<Self> {
        Ok(Self::new(Fat32::open(device)?))
    }

    pub fn volume(&mut self) -> &mut Fat32<'a> {
        &mut self.fs
    }

    pub fn cwd(&self) -> u32 {
        self.cwd
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn open_files(&self) -> &OpenFiles {
        &self.open_files
    }

    pub fn info(&self) -> &BpbFat32 {
        self.fs.bpb()
    }

    pub fn size(&mut self, name: &str) -> Result<u32> {
        let (entry, _) = self.lookup(name)?;
        if entry.is_directory() {
            return Err(Error::IsADirectory(name.to_owned()));
        }
        Ok(entry.file_size)
    }

    pub fn ls(&mut self, dir: Option<&str>) -> Result<Vec<Listing>> {
        let cluster = match dir {
            None | Some(".") => self.cwd,
            Some("..") => self.stack.peek_parent(),
            Some(name) => {
                let (entry, _) = self.lookup(name)?;
                if !entry.is_directory() {
                    return Err(Error::NotADirectory(name.to_owned()));
                }
                self.directory_cluster(&entry)
            }
        };

        Ok(self
            .fs
            .list_directory(cluster)?
            .iter()
            .map(Listing::from)
            .collect())
    }

    /// Without an argument goes back to the root directory.
    pub fn cd(&mut self, dir: Option<&str>) -> Result<()> {
        match dir {
            None => {
                self.stack.reset();
                self.cwd = self.fs.root_cluster();
            }
            Some(".") => {}
            Some("..") => self.cwd = self.stack.pop(),
            Some(name) => {
                let (entry, _) = self.lookup(name)?;
                if !entry.is_directory() {
                    return Err(Error::NotADirectory(name.to_owned()));
                }
                let cluster = self.directory_cluster(&entry);
                self.stack.push(cluster)?;
                self.cwd = cluster;
            }
        }

        debug!("working directory is now cluster {}", self.cwd);
        Ok(())
    }

    pub fn creat(&mut self, name: &str) -> Result<()> {
        let field = self.check_new_name(self.cwd, name)?;
        let entry = DirEntry::new(field, Attributes::ARCHIVE, 0);
        self.fs.insert_entry(self.cwd, &entry)?;
        info!("created file {}", name);
        Ok(())
    }

    pub fn mkdir(&mut self, name: &str) -> Result<()> {
        let field = self.check_new_name(self.cwd, name)?;

        let cluster = self.fs.allocate_free_cluster()?;
        self.fs.set_next_cluster(cluster, END_OF_CHAIN)?;
        self.fs.init_directory(cluster, self.cwd)?;

        let entry = DirEntry::new(field, Attributes::DIRECTORY, cluster);
        if let Err(e) = self.fs.insert_entry(self.cwd, &entry) {
            self.fs.set_next_cluster(cluster, FREE_CLUSTER)?;
            return Err(e);
        }

        info!("created directory {} at cluster {}", name, cluster);
        Ok(())
    }

    pub fn open(&mut self, name: &str, mode: &str) -> Result<()> {
        let (entry, _) = self.lookup(name)?;
        if entry.is_directory() {
            return Err(Error::IsADirectory(name.to_owned()));
        }

        let mode: AccessMode = mode.parse()?;
        if entry.is_read_only() && mode != AccessMode::ReadOnly {
            return Err(Error::ReadOnlyViolation(name.to_owned()));
        }

        self.open_files.open(OpenFile {
            name: name.to_owned(),
            directory: self.cwd,
            first_cluster: entry.first_cluster,
            mode,
            offset: 0,
        })
    }

    pub fn close(&mut self, name: &str) -> Result<()> {
        self.handle(name)?;
        self.open_files.close(name)?;
        Ok(())
    }

    pub fn lseek(&mut self, name: &str, offset: u32) -> Result<()> {
        self.handle(name)?;
        let (entry, _) = self.lookup(name)?;
        if offset > entry.file_size {
            return Err(Error::OffsetExceedsFileSize {
                offset,
                size: entry.file_size,
            });
        }

        self.handle(name)?.offset = offset;
        Ok(())
    }

    pub fn read(&mut self, name: &str, length: u32) -> Result<Vec<u8>> {
        let handle = self.handle(name)?;
        if !handle.mode.can_read() {
            return Err(Error::WrongModeForOperation {
                name: name.to_owned(),
                operation: "reading",
            });
        }
        let offset = handle.offset;

        let (entry, _) = self.lookup(name)?;
        let data = self.fs.read_file(&entry, offset, length)?;
        self.handle(name)?.offset = offset + data.len() as u32;
        Ok(data)
    }

    /// Writes at the handle offset. A write cut short by a full volume
    /// still returns `Ok`, the outcome carries the error.
    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<WriteOutcome> {
        let handle = self.handle(name)?;
        if !handle.mode.can_write() {
            return Err(Error::WrongModeForOperation {
                name: name.to_owned(),
                operation: "writing",
            });
        }
        let offset = handle.offset;

        let (mut entry, location) = self.lookup(name)?;
        let outcome = self.fs.write_file(&location, &mut entry, offset, data);

        let handle = self.handle(name)?;
        handle.offset = offset + outcome.written;
        handle.first_cluster = entry.first_cluster;
        Ok(outcome)
    }

    pub fn rm(&mut self, name: &str) -> Result<()> {
        let (entry, location) = self.lookup(name)?;
        if entry.is_directory() {
            return Err(Error::IsADirectory(name.to_owned()));
        }

        self.close_if_open(name);
        self.release(&entry, &location)?;
        info!("removed {}", name);
        Ok(())
    }

    pub fn rmdir(&mut self, name: &str) -> Result<()> {
        if name == "." || name == ".." {
            return Err(Error::InvalidName(name.to_owned()));
        }

        let (entry, location) = self.lookup(name)?;
        if !entry.is_directory() {
            return Err(Error::NotADirectory(name.to_owned()));
        }
        if !self.fs.is_directory_empty(entry.first_cluster)? {
            return Err(Error::DirectoryNotEmpty(name.to_owned()));
        }

        self.release(&entry, &location)?;
        info!("removed directory {}", name);
        Ok(())
    }

    /// Moves `from` into the directory `to`, or renames it when `to` does
    /// not exist.
    pub fn mv(&mut self, from: &str, to: &str) -> Result<()> {
        if from == "." || from == ".." {
            return Err(Error::InvalidName(from.to_owned()));
        }

        let (mut entry, location) = self.lookup(from)?;
        let destination = match to {
            "." => return Ok(()),
            ".." => self.parent_of_cwd()?,
            _ => match self.fs.find_entry(self.cwd, to)? {
                Some((target, _)) if target.is_directory() => self.directory_cluster(&target),
                Some(_) => return Err(Error::DestinationNameCollision(to.to_owned())),
                None => {
                    let field = encode_name(to)?;
                    self.close_if_open(from);
                    entry.name = field;
                    self.fs.update_entry(&location, &entry)?;
                    info!("renamed {} to {}", from, to);
                    return Ok(());
                }
            },
        };

        if entry.is_directory() && entry.first_cluster == destination {
            return Err(Error::InvalidMove(from.to_owned()));
        }
        if self.fs.find_entry(destination, from)?.is_some() {
            return Err(Error::DestinationNameCollision(from.to_owned()));
        }

        self.close_if_open(from);
        self.fs.insert_entry(destination, &entry)?;
        self.fs.remove_entry(&location)?;
        if entry.is_directory() {
            self.fs.set_parent(entry.first_cluster, destination)?;
        }

        info!("moved {} to {}", from, to);
        Ok(())
    }

    /// Copies the content of `src` into a new file. `dst` is either a new
    /// name in the working directory or an existing directory.
    pub fn cp(&mut self, src: &str, dst: &str) -> Result<u32> {
        let (source, _) = self.lookup(src)?;
        if source.is_directory() {
            return Err(Error::IsADirectory(src.to_owned()));
        }

        let (directory, name) = match dst {
            "." => (self.cwd, src),
            ".." => (self.parent_of_cwd()?, src),
            _ => match self.fs.find_entry(self.cwd, dst)? {
                Some((target, _)) if target.is_directory() => {
                    (self.directory_cluster(&target), src)
                }
                Some(_) => return Err(Error::DestinationNameCollision(dst.to_owned())),
                None => (self.cwd, dst),
            },
        };

        let field = encode_name(name)?;
        if self.fs.find_entry(directory, name)?.is_some() {
            return Err(Error::DestinationNameCollision(name.to_owned()));
        }

        self.close_if_open(src);
        let data = self.fs.read_file(&source, 0, source.file_size)?;

        let mut copy = DirEntry::new(field, source.attributes, 0);
        let location = self.fs.insert_entry(directory, &copy)?;
        let written = self.fs.write_file(&location, &mut copy, 0, &data).into_result()?;

        info!("copied {} bytes from {} to {}", written, src, dst);
        Ok(written)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.fs.flush()
    }

    fn lookup(&mut self, name: &str) -> Result<(DirEntry, EntryLocation)> {
        self.fs
            .find_entry(self.cwd, name)?
            .ok_or_else(|| Error::EntryNotFound(name.to_owned()))
    }

    fn check_new_name(&mut self, dir: u32, name: &str) -> Result<[u8; 11]> {
        let field = encode_name(name)?;
        if self.fs.find_entry(dir, name)?.is_some() {
            return Err(Error::AlreadyExists(name.to_owned()));
        }
        Ok(field)
    }

    /// Handle opened in the working directory
    fn handle(&mut self, name: &str) -> Result<&mut OpenFile> {
        let cwd = self.cwd;
        match self.open_files.get_mut(name) {
            Some(handle) if handle.directory == cwd => Ok(handle),
            _ => Err(Error::NotOpen(name.to_owned())),
        }
    }

    fn close_if_open(&mut self, name: &str) {
        if self.handle(name).is_ok() && self.open_files.close(name).is_ok() {
            debug!("closed {}", name);
        }
    }

    fn parent_of_cwd(&self) -> Result<u32> {
        if self.cwd == self.fs.root_cluster() {
            Err(Error::EntryNotFound("..".to_owned()))
        } else {
            Ok(self.stack.peek_parent())
        }
    }

    fn directory_cluster(&self, entry: &DirEntry) -> u32 {
        if entry.first_cluster == 0 {
            self.fs.root_cluster()
        } else {
            entry.first_cluster
        }
    }

    fn release(&mut self, entry: &DirEntry, location: &EntryLocation) -> Result<()> {
        if entry.first_cluster != 0 {
            self.fs.free_chain(entry.first_cluster)?;
        }
        self.fs.remove_entry(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::ram::RamDisk;
    use crate::fs::fat::tests::test_image;

    fn names(session: &mut Session, dir: Option<&str>) -> Vec<String> {
        session
            .ls(dir)
            .unwrap()
            .into_iter()
            .map(|x| x.name)
            .collect()
    }

    fn write_file(session: &mut Session, name: &str, data: &[u8]) {
        session.creat(name).unwrap();
        session.open(name, "w").unwrap();
        session.write(name, data).unwrap().into_result().unwrap();
        session.close(name).unwrap();
    }

    fn read_file(session: &mut Session, name: &str) -> Vec<u8> {
        let size = session.size(name).unwrap();
        session.open(name, "r").unwrap();
        let data = session.read(name, size).unwrap();
        session.close(name).unwrap();
        data
    }

    fn mount(disk: &mut RamDisk) -> Session {
        Session::open_volume(disk).unwrap()
    }

    #[test]
    fn test_cd_round_trip() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);
        let root = session.cwd();

        session.mkdir("sub").unwrap();
        session.cd(Some("sub")).unwrap();
        assert_ne!(session.cwd(), root);
        assert_eq!(names(&mut session, None), vec![".", ".."]);
        session.cd(Some("..")).unwrap();
        assert_eq!(session.cwd(), root);
        assert_eq!(session.depth(), 0);
    }

    #[test]
    fn test_write_read() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.creat("a.txt").unwrap();
        session.open("a.txt", "w").unwrap();
        let outcome = session.write("a.txt", b"hello").unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.written, 5);
        session.close("a.txt").unwrap();

        session.open("a.txt", "r").unwrap();
        assert_eq!(session.read("a.txt", 5).unwrap(), b"hello");
        assert_eq!(session.size("a.txt").unwrap(), 5);
    }

    #[test]
    fn test_move_into_directory() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.mkdir("d").unwrap();
        session.creat("a.txt").unwrap();
        session.mv("a.txt", "d").unwrap();

        assert!(names(&mut session, Some("d")).contains(&"a.txt".to_owned()));
        assert_eq!(names(&mut session, None), vec!["d"]);
    }

    #[test]
    fn test_rm_directory() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.mkdir("a.txt").unwrap();
        let root = session.cwd();
        let (entry, _) = session.volume().find_entry(root, "a.txt").unwrap().unwrap();

        assert!(matches!(session.rm("a.txt"), Err(Error::IsADirectory(_))));
        assert_eq!(session.volume().next_cluster(entry.first_cluster).unwrap(), END_OF_CHAIN);
        assert_eq!(names(&mut session, None), vec!["a.txt"]);
    }

    #[test]
    fn test_out_of_space() {
        crate::tests_init();

        let mut disk = test_image(4);
        let mut session = mount(&mut disk);

        session.creat("big").unwrap();
        session.open("big", "rw").unwrap();
        let outcome = session.write("big", &[0x5A; 4096]).unwrap();
        assert!(matches!(outcome.error, Some(Error::OutOfSpace)));
        assert_eq!(outcome.written, 3 * 512);
        assert_eq!(session.size("big").unwrap(), outcome.written);

        // the handle offset follows the written prefix
        assert!(session.read("big", 10).unwrap().is_empty());
        session.lseek("big", 1530).unwrap();
        assert_eq!(session.read("big", 10).unwrap(), vec![0x5Au8; 6]);
    }

    #[test]
    fn test_size() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        write_file(&mut session, "a", b"0123456789");
        session.mkdir("d").unwrap();

        assert_eq!(session.size("a").unwrap(), 10);
        assert!(matches!(session.size("d"), Err(Error::IsADirectory(_))));
        assert!(matches!(session.size("x"), Err(Error::EntryNotFound(_))));
    }

    #[test]
    fn test_ls() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.mkdir("d").unwrap();
        session.creat("f").unwrap();

        let listing = session.ls(None).unwrap();
        assert_eq!(listing.len(), 2);
        assert!(listing[0].is_directory());
        assert!(!listing[1].is_directory());
        assert!(listing[1].modified.is_some());

        assert_eq!(names(&mut session, Some("d")), vec![".", ".."]);
        assert!(matches!(session.ls(Some("f")), Err(Error::NotADirectory(_))));
        assert!(matches!(session.ls(Some("x")), Err(Error::EntryNotFound(_))));
        assert_eq!(session.depth(), 0);

        session.cd(Some("d")).unwrap();
        assert_eq!(names(&mut session, Some("..")), vec!["d", "f"]);
        assert_eq!(names(&mut session, Some(".")), vec![".", ".."]);
    }

    #[test]
    fn test_cd() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);
        let root = session.cwd();

        session.mkdir("a").unwrap();
        session.creat("f").unwrap();
        assert!(matches!(session.cd(Some("f")), Err(Error::NotADirectory(_))));
        assert!(matches!(session.cd(Some("x")), Err(Error::EntryNotFound(_))));
        assert_eq!(session.cwd(), root);

        session.cd(Some("a")).unwrap();
        let a = session.cwd();
        session.cd(Some(".")).unwrap();
        assert_eq!(session.cwd(), a);

        session.mkdir("b").unwrap();
        session.cd(Some("b")).unwrap();
        assert_eq!(session.depth(), 2);
        session.cd(Some("..")).unwrap();
        assert_eq!(session.cwd(), a);

        session.cd(Some("b")).unwrap();
        session.cd(None).unwrap();
        assert_eq!(session.cwd(), root);
        assert_eq!(session.depth(), 0);

        // ".." at the root stays at the root
        session.cd(Some("..")).unwrap();
        assert_eq!(session.cwd(), root);
    }

    #[test]
    fn test_cd_overflow() {
        crate::tests_init();

        let mut disk = test_image(64);
        let mut session = mount(&mut disk);

        for _ in 0..50 {
            session.mkdir("d").unwrap();
            session.cd(Some("d")).unwrap();
        }
        session.mkdir("d").unwrap();
        let cwd = session.cwd();

        assert!(matches!(
            session.cd(Some("d")),
            Err(Error::DirectoryStackOverflow(50))
        ));
        assert_eq!(session.cwd(), cwd);
        assert_eq!(session.depth(), 50);
    }

    #[test]
    fn test_creat_and_mkdir_validation() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.creat("a").unwrap();
        assert!(matches!(session.creat("a"), Err(Error::AlreadyExists(_))));
        assert!(matches!(session.mkdir("a"), Err(Error::AlreadyExists(_))));
        assert!(matches!(session.creat("toolongname"), Err(Error::NameTooLong(_))));
        assert!(matches!(session.mkdir("toolongname"), Err(Error::NameTooLong(_))));
        assert!(matches!(session.mkdir(".."), Err(Error::InvalidName(_))));
        assert_eq!(names(&mut session, None), vec!["a"]);
    }

    #[test]
    fn test_mkdir_without_space() {
        crate::tests_init();

        let mut disk = test_image(1);
        let mut session = mount(&mut disk);

        assert!(matches!(session.mkdir("d"), Err(Error::OutOfSpace)));
        assert!(names(&mut session, None).is_empty());
    }

    #[test]
    fn test_mkdir_rolls_back_cluster() {
        crate::tests_init();

        let mut disk = test_image(2);
        let mut session = mount(&mut disk);

        // fill the root cluster so the next record needs a new cluster
        for i in 0..8 {
            session.creat(&format!("f{}", i)).unwrap();
        }
        assert!(matches!(session.mkdir("d"), Err(Error::OutOfSpace)));
        assert_eq!(session.volume().next_cluster(3).unwrap(), FREE_CLUSTER);

        // the cluster can still be used for the directory record
        session.creat("g").unwrap();
    }

    #[test]
    fn test_open() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.creat("a").unwrap();
        session.mkdir("d").unwrap();

        assert!(matches!(session.open("x", "r"), Err(Error::EntryNotFound(_))));
        assert!(matches!(session.open("d", "r"), Err(Error::IsADirectory(_))));
        assert!(matches!(session.open("a", "q"), Err(Error::InvalidMode(_))));

        session.open("a", "wr").unwrap();
        assert!(matches!(session.open("a", "r"), Err(Error::AlreadyOpen(_))));
        assert_eq!(session.open_files().len(), 1);
        session.close("a").unwrap();
        assert!(matches!(session.close("a"), Err(Error::NotOpen(_))));
    }

    #[test]
    fn test_open_read_only() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);
        session.creat("ro").unwrap();

        let root = session.cwd();
        let (mut entry, location) = session.volume().find_entry(root, "ro").unwrap().unwrap();
        entry.attributes |= Attributes::READ_ONLY;
        session.volume().update_entry(&location, &entry).unwrap();

        assert!(matches!(session.open("ro", "w"), Err(Error::ReadOnlyViolation(_))));
        assert!(matches!(session.open("ro", "rw"), Err(Error::ReadOnlyViolation(_))));
        session.open("ro", "r").unwrap();
    }

    #[test]
    fn test_modes() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);
        write_file(&mut session, "a", b"abc");

        session.open("a", "w").unwrap();
        assert!(matches!(
            session.read("a", 1),
            Err(Error::WrongModeForOperation { operation: "reading", .. })
        ));
        session.close("a").unwrap();

        session.open("a", "r").unwrap();
        assert!(matches!(
            session.write("a", b"x"),
            Err(Error::WrongModeForOperation { operation: "writing", .. })
        ));
        // seeking is allowed in any mode
        session.lseek("a", 1).unwrap();
        assert_eq!(session.read("a", 10).unwrap(), b"bc");
    }

    #[test]
    fn test_lseek() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);
        write_file(&mut session, "a", b"hello world");

        assert!(matches!(session.lseek("a", 0), Err(Error::NotOpen(_))));
        session.open("a", "rw").unwrap();
        assert!(matches!(
            session.lseek("a", 12),
            Err(Error::OffsetExceedsFileSize { offset: 12, size: 11 })
        ));

        session.lseek("a", 6).unwrap();
        assert_eq!(session.read("a", 5).unwrap(), b"world");

        session.lseek("a", 11).unwrap();
        session.write("a", b"!").unwrap().into_result().unwrap();
        assert_eq!(session.size("a").unwrap(), 12);

        session.lseek("a", 0).unwrap();
        session.write("a", b"J").unwrap().into_result().unwrap();
        assert_eq!(session.size("a").unwrap(), 12);
        session.lseek("a", 0).unwrap();
        assert_eq!(session.read("a", 100).unwrap(), b"Jello world!");
    }

    #[test]
    fn test_handle_belongs_to_directory() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.creat("a").unwrap();
        session.mkdir("d").unwrap();
        session.open("a", "rw").unwrap();

        session.cd(Some("d")).unwrap();
        session.creat("a").unwrap();
        assert!(matches!(session.write("a", b"x"), Err(Error::NotOpen(_))));
        assert!(matches!(session.close("a"), Err(Error::NotOpen(_))));
        assert!(matches!(session.open("a", "r"), Err(Error::AlreadyOpen(_))));

        session.cd(Some("..")).unwrap();
        session.close("a").unwrap();
    }

    #[test]
    fn test_multi_cluster_file() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        let data: Vec<u8> = (0..2000u32).map(|x| (x * 7) as u8).collect();
        write_file(&mut session, "big", &data);
        assert_eq!(session.size("big").unwrap(), 2000);
        assert_eq!(read_file(&mut session, "big"), data);

        session.open("big", "r").unwrap();
        session.lseek("big", 1000).unwrap();
        assert_eq!(session.read("big", 30).unwrap(), &data[1000..1030]);
        assert_eq!(session.read("big", 30).unwrap(), &data[1030..1060]);
    }

    #[test]
    fn test_rm() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        write_file(&mut session, "a", &[1u8; 1200]);
        let root = session.cwd();
        let (entry, location) = session.volume().find_entry(root, "a").unwrap().unwrap();
        let (_, clusters) = session.volume().chain_tail(entry.first_cluster).unwrap();
        assert_eq!(clusters, 3);

        session.open("a", "r").unwrap();
        session.rm("a").unwrap();
        assert!(session.open_files().is_empty());
        assert!(matches!(session.size("a"), Err(Error::EntryNotFound(_))));
        assert_eq!(session.volume().next_cluster(entry.first_cluster).unwrap(), FREE_CLUSTER);

        let mut byte = [0xFFu8; 1];
        session.volume().read_at(location.offset, &mut byte).unwrap();
        assert_eq!(byte[0], 0x00);

        assert!(matches!(session.rm("a"), Err(Error::EntryNotFound(_))));
    }

    #[test]
    fn test_rm_keeps_later_records_reachable() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.creat("a").unwrap();
        session.creat("b").unwrap();
        session.rm("a").unwrap();
        assert_eq!(names(&mut session, None), vec!["b"]);

        session.creat("c").unwrap();
        assert_eq!(names(&mut session, None), vec!["c", "b"]);
    }

    #[test]
    fn test_rmdir() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.mkdir("d").unwrap();
        session.creat("f").unwrap();
        session.cd(Some("d")).unwrap();
        session.creat("inner").unwrap();
        session.cd(Some("..")).unwrap();

        assert!(matches!(session.rmdir("f"), Err(Error::NotADirectory(_))));
        assert!(matches!(session.rmdir("d"), Err(Error::DirectoryNotEmpty(_))));
        assert!(matches!(session.rmdir("x"), Err(Error::EntryNotFound(_))));
        assert!(matches!(session.rmdir(".."), Err(Error::InvalidName(_))));

        session.cd(Some("d")).unwrap();
        session.rm("inner").unwrap();
        session.cd(Some("..")).unwrap();

        let root = session.cwd();
        let (entry, _) = session.volume().find_entry(root, "d").unwrap().unwrap();
        session.rmdir("d").unwrap();
        assert_eq!(names(&mut session, None), vec!["f"]);
        assert_eq!(session.volume().next_cluster(entry.first_cluster).unwrap(), FREE_CLUSTER);
    }

    #[test]
    fn test_mv_rename() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        write_file(&mut session, "a", b"data");
        session.creat("b").unwrap();

        assert!(matches!(session.mv("a", "b"), Err(Error::DestinationNameCollision(_))));
        assert!(matches!(session.mv("a", "a"), Err(Error::DestinationNameCollision(_))));
        assert!(matches!(session.mv("a", "muchtoolong"), Err(Error::NameTooLong(_))));
        assert!(matches!(session.mv("x", "y"), Err(Error::EntryNotFound(_))));
        assert!(matches!(session.mv("..", "y"), Err(Error::InvalidName(_))));

        session.open("a", "r").unwrap();
        session.mv("a", "c").unwrap();
        assert!(session.open_files().is_empty());
        assert_eq!(names(&mut session, None), vec!["c", "b"]);
        assert_eq!(read_file(&mut session, "c"), b"data");

        session.mv("c", ".").unwrap();
        assert_eq!(names(&mut session, None), vec!["c", "b"]);
    }

    #[test]
    fn test_mv_directory() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.mkdir("a").unwrap();
        session.mkdir("b").unwrap();
        assert!(matches!(session.mv("a", "a"), Err(Error::InvalidMove(_))));

        session.mv("a", "b").unwrap();
        assert_eq!(names(&mut session, None), vec!["b"]);

        session.cd(Some("b")).unwrap();
        let b = session.cwd();
        let (a, _) = session.volume().find_entry(b, "a").unwrap().unwrap();
        let (dot_dot, _) = session.volume().find_entry(a.first_cluster, "..").unwrap().unwrap();
        assert_eq!(dot_dot.first_cluster, b);

        // and back to the root
        session.mv("a", "..").unwrap();
        assert_eq!(names(&mut session, None), vec![".", ".."]);
        session.cd(None).unwrap();
        assert_eq!(names(&mut session, None), vec!["a", "b"]);

        let root = session.cwd();
        let (a, _) = session.volume().find_entry(root, "a").unwrap().unwrap();
        let (dot_dot, _) = session.volume().find_entry(a.first_cluster, "..").unwrap().unwrap();
        assert_eq!(dot_dot.first_cluster, 0);
    }

    #[test]
    fn test_mv_collision_in_destination() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.mkdir("d").unwrap();
        session.cd(Some("d")).unwrap();
        session.creat("f").unwrap();
        session.cd(Some("..")).unwrap();
        session.creat("f").unwrap();

        assert!(matches!(session.mv("f", "d"), Err(Error::DestinationNameCollision(_))));
        assert!(matches!(session.mv("f", ".."), Err(Error::EntryNotFound(_))));
        assert_eq!(names(&mut session, None), vec!["d", "f"]);
    }

    #[test]
    fn test_cp() {
        crate::tests_init();

        let mut disk = test_image(32);
        let mut session = mount(&mut disk);

        let data: Vec<u8> = (0..1500u32).map(|x| x as u8).collect();
        write_file(&mut session, "src", &data);
        session.mkdir("d").unwrap();

        assert_eq!(session.cp("src", "copy").unwrap(), 1500);
        assert_eq!(read_file(&mut session, "copy"), data);

        session.cp("src", "d").unwrap();
        session.cd(Some("d")).unwrap();
        assert_eq!(read_file(&mut session, "src"), data);
        session.cd(Some("..")).unwrap();

        assert!(matches!(session.cp("src", "d"), Err(Error::DestinationNameCollision(_))));
        assert!(matches!(session.cp("src", "copy"), Err(Error::DestinationNameCollision(_))));
        assert!(matches!(session.cp("src", "."), Err(Error::DestinationNameCollision(_))));
        assert!(matches!(session.cp("d", "e"), Err(Error::IsADirectory(_))));
        assert!(matches!(session.cp("x", "e"), Err(Error::EntryNotFound(_))));

        // the source keeps its own clusters
        session.open("copy", "w").unwrap();
        session.write("copy", b"XX").unwrap().into_result().unwrap();
        assert_eq!(read_file(&mut session, "src"), data);
    }

    #[test]
    fn test_cp_closes_source_and_copies_empty_file() {
        crate::tests_init();

        let mut disk = test_image(16);
        let mut session = mount(&mut disk);

        session.creat("e").unwrap();
        session.open("e", "r").unwrap();
        assert_eq!(session.cp("e", "f").unwrap(), 0);
        assert!(session.open_files().is_empty());
        assert_eq!(session.size("f").unwrap(), 0);
    }

    #[test]
    fn test_flush_and_remount() {
        crate::tests_init();

        let mut disk = test_image(16);
        {
            let mut session = mount(&mut disk);
            session.mkdir("d").unwrap();
            session.cd(Some("d")).unwrap();
            write_file(&mut session, "a", b"persisted");
            session.flush().unwrap();
        }

        let mut session = mount(&mut disk);
        session.cd(Some("d")).unwrap();
        assert_eq!(read_file(&mut session, "a"), b"persisted");
    }
}
