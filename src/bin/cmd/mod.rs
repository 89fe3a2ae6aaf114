use std::io::{self, Write};

use clap::Parser;
use fat32sh::fs::fat::{Listing, Session};

/// Commands understood at the `>` prompt
#[derive(Parser, Debug, PartialEq)]
#[clap(name = "fat32", no_binary_name = true)]
pub enum Command {
    /// Print boot sector geometry
    Info,
    /// Print the size of a file in the working directory
    Size { file: String },
    /// List the working directory or one of its children
    Ls { dir: Option<String> },
    /// Change directory, without an argument go back to the root
    Cd { dir: Option<String> },
    /// Create an empty file
    Creat { file: String },
    Mkdir { dir: String },
    /// Rename an entry or move it into a directory
    Mv { from: String, to: String },
    /// Open a file with mode r, w, rw or wr
    Open { file: String, mode: String },
    Close { file: String },
    /// Set the offset of an open file
    Lseek { file: String, offset: u32 },
    /// Read bytes from the offset of an open file
    Read { file: String, size: u32 },
    /// Write exactly SIZE bytes of TEXT, padded with NUL bytes
    Write {
        file: String,
        size: u32,
        #[clap(required = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    Rm { file: String },
    /// Copy a file within the working directory or into a child directory
    Cp { file: String, to: String },
    /// Remove an empty directory
    Rmdir { dir: String },
    #[clap(alias = "quit")]
    Exit,
}

#[derive(Debug, PartialEq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Parses and runs one input line. Command failures are reported on `out`
/// and leave the session usable, only failing to write to `out` is an error.
pub fn execute(session: &mut Session, line: &str, out: &mut dyn Write) -> io::Result<Flow> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Flow::Continue);
    }

    let command = match Command::try_parse_from(&tokens) {
        Ok(c) => c,
        Err(e) => {
            write!(out, "{}", e)?;
            return Ok(Flow::Continue);
        }
    };
    trace!("{:?}", command);

    if command == Command::Exit {
        return Ok(Flow::Exit);
    }

    if let Err(e) = dispatch(session, command, out)? {
        writeln!(out, "error: {}", e)?;
    }
    Ok(Flow::Continue)
}

fn dispatch(
    session: &mut Session,
    command: Command,
    out: &mut dyn Write,
) -> io::Result<fat32sh::Result<()>> {
    let capacity = session.volume().data_capacity();
    let result = match command {
        Command::Info => {
            let bpb = session.info();
            writeln!(out, "Bytes Per Sector: {}", bpb.bytes_per_sector)?;
            writeln!(out, "Sectors Per Cluster: {}", bpb.sectors_per_cluster)?;
            writeln!(out, "Reserved Sector Count: {}", bpb.number_of_reserved_sectors)?;
            writeln!(out, "Number of FATs: {}", bpb.number_of_fats)?;
            writeln!(out, "Total Sectors: {}", bpb.sectors_total)?;
            writeln!(out, "FATsize: {} sectors", bpb.sectors_per_fat)?;
            writeln!(out, "Root Cluster: {}", bpb.root_directory_cluster)?;
            Ok(())
        }
        Command::Size { file } => match session.size(&file) {
            Ok(size) => {
                writeln!(out, "{} bytes", size)?;
                Ok(())
            }
            Err(e) => Err(e),
        },
        Command::Ls { dir } => match session.ls(dir.as_deref()) {
            Ok(listing) => {
                for entry in listing.iter() {
                    writeln!(out, "{}", format_listing(entry))?;
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        Command::Cd { dir } => session.cd(dir.as_deref()),
        Command::Creat { file } => session.creat(&file),
        Command::Mkdir { dir } => session.mkdir(&dir),
        Command::Mv { from, to } => session.mv(&from, &to),
        Command::Open { file, mode } => session.open(&file, &mode),
        Command::Close { file } => session.close(&file),
        Command::Lseek { file, offset } => session.lseek(&file, offset),
        Command::Read { file, size } => match session.read(&file, size) {
            Ok(data) => {
                out.write_all(&data)?;
                writeln!(out)?;
                Ok(())
            }
            Err(e) => Err(e),
        },
        Command::Write { file, size, .. } if size as u64 > capacity => {
            debug!("refusing to write {} bytes to {}", size, file);
            Err(fat32sh::Error::OutOfSpace)
        }
        Command::Write { file, size, text } => {
            let data = prepare_text(&text, size);
            match session.write(&file, &data) {
                Ok(outcome) => {
                    if let Some(e) = &outcome.error {
                        writeln!(
                            out,
                            "wrote {} of {} bytes before failing: {}",
                            outcome.written,
                            data.len(),
                            e
                        )?;
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Command::Rm { file } => session.rm(&file),
        Command::Cp { file, to } => session.cp(&file, &to).map(|_| ()),
        Command::Rmdir { dir } => session.rmdir(&dir),
        Command::Exit => Ok(()),
    };

    Ok(result)
}

/// Joins the text tokens back together, drops one pair of surrounding
/// double quotes and fits the result to exactly `size` bytes.
pub fn prepare_text(tokens: &[String], size: u32) -> Vec<u8> {
    let joined = tokens.join(" ");
    let text = match joined.strip_prefix('"').and_then(|x| x.strip_suffix('"')) {
        Some(inner) => inner,
        None => joined.as_str(),
    };

    let mut data = text.as_bytes().to_vec();
    data.resize(size as usize, 0);
    data
}

fn format_listing(entry: &Listing) -> String {
    let modified = match entry.modified {
        Some(t) => t.format("%d.%m.%Y %H:%M").to_string(),
        None => " ".repeat(16),
    };

    if entry.is_directory() {
        format!("{}  {:<10}  {}", modified, "<DIR>", entry.name)
    } else {
        format!("{}  {:>10}  {}", modified, entry.file_size, entry.name)
    }
}
