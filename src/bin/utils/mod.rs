use std::{io, result};

/// Routes the `log` macros to stderr, keeping stdout for command output.
pub fn setup_logging(verbosity_level: u32) -> anyhow::Result<()> {
    use fern::colors::{Color, ColoredLevelConfig};

    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::White)
        .debug(Color::BrightWhite)
        .trace(Color::Cyan);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let prefix = format!(
                "[{}][{}]\x1b[{}m ",
                record.target(),
                record.level(),
                colors.get_color(&record.level()).to_fg_str()
            );
            const SUFFIX: &str = "\x1b[0m";

            let text = message.to_string();
            let lines: Vec<String> = text
                .split('\n')
                .map(|line| format!("{}{}{}", prefix, line, SUFFIX))
                .collect();

            out.finish(format_args!("{}", lines.join("\n")))
        })
        .level(match verbosity_level {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .chain(io::stderr())
        .apply()?;

    Ok(())
}

/// Parses a byte count with an optional binary suffix, `64M` or `1G`.
pub fn parse_size(x: &str) -> result::Result<u64, String> {
    const KIB: u64 = 1024;

    let x = x.trim();
    let (digits, multiplier) = match x.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => {
            let shift = match c.to_ascii_uppercase() {
                'K' => 1,
                'M' => 2,
                'G' => 3,
                'T' => 4,
                'E' => 6,
                _ => return Err(format!("unknown unit {}", c)),
            };
            (&x[..x.len() - 1], KIB.pow(shift))
        }
        _ => (x, 1),
    };

    let n = digits.parse::<u64>().map_err(|e| e.to_string())?;
    n.checked_mul(multiplier)
        .ok_or_else(|| "size too large to fit into 64 bits".to_owned())
}
