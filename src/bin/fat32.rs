use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use fat32sh::disk::raw::RawDisk;
use fat32sh::fs::fat::{format_volume, FormatOptions, Session};

mod cmd;
mod utils;

#[macro_use]
extern crate log;

/// Interactive shell for FAT32 disk images
#[derive(Parser)]
#[clap(version)]
struct Options {
    #[clap(short, long, parse(from_occurrences))]
    pub verbose: u32,

    /// Create a new image of this size and format it before opening
    #[clap(long, parse(try_from_str = utils::parse_size))]
    pub create: Option<u64>,

    pub image: PathBuf,
}

fn open_image(options: &Options) -> anyhow::Result<File> {
    match options.create {
        Some(size) => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&options.image)
                .context("failed to create image")?;
            file.set_len(size).context("failed to resize image")?;
            Ok(file)
        }
        None => OpenOptions::new()
            .read(true)
            .write(true)
            .open(&options.image)
            .context("failed to open image"),
    }
}

fn main() -> anyhow::Result<()> {
    better_panic::install();

    let options = Options::parse();
    utils::setup_logging(options.verbose)?;

    let file = open_image(&options)?;
    let mut disk = RawDisk::open(file).context("failed to initialize backend")?;
    if let Some(size) = options.create {
        format_volume(&mut disk, &FormatOptions::for_volume_size(size))
            .context("failed to format image")?;
    }

    let mut session = Session::open_volume(&mut disk).context("failed to mount FAT32 volume")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut lines = stdin.lock().lines();
    loop {
        {
            let mut out = stdout.lock();
            write!(out, "> ")?;
            out.flush()?;
        }

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };

        if cmd::execute(&mut session, &line, &mut stdout.lock())? == cmd::Flow::Exit {
            break;
        }
    }

    session.flush().context("failed to flush image")?;
    debug!("session closed");
    Ok(())
}
