//! Command-line argument parsing.
//!
//! Usage:
//!   scadasim [-d] [-l<logfile>] [-t<tick-ms>] [-f[<file>]] [-c<stmt>]

use std::path::PathBuf;

use crate::var::TICK_DELAY_MS;

pub const USAGE: &str = "Usage: scadasim [-d] [-l<logfile>] [-t<tick-ms>] [-f[<file>]] [-c<stmt>]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug)]
pub struct CliArgs {
    /// Startup-file specification.
    pub startup: StartupFile,
    /// Statements to run after the startup file (`-c<stmt>`, repeatable).
    pub commands: Vec<String>,
    /// Write a debug log (`-d`).
    pub debug: bool,
    /// Log file override (`-l<file>`).
    pub log_file: Option<PathBuf>,
    /// Tick interval in milliseconds (`-t<ms>`).
    pub tick_ms: u64,
}

impl Default for CliArgs {
    fn default() -> Self {
        CliArgs {
            startup: StartupFile::default(),
            commands: Vec::new(),
            debug: false,
            log_file: None,
            tick_ms: TICK_DELAY_MS,
        }
    }
}

/// How to choose the startup file.
#[derive(Debug, Default, PartialEq)]
pub enum StartupFile {
    /// Search `./scadasim.scada`, then `~/.scadasim` (default).
    #[default]
    Search,
    /// `-f` with no file argument: start empty.
    Skip,
    /// `-f<file>`: load this file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();
        let Some(flags) = arg.strip_prefix('-').filter(|f| !f.is_empty()) else {
            return Err(format!("unexpected argument: {arg}"));
        };

        let chars: Vec<char> = flags.chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.startup = StartupFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        i += 1;
                        args.startup = StartupFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.startup = StartupFile::Skip;
                    }
                }

                'c' => {
                    let stmt = flag_value(&chars, &mut j, argv, &mut i, "a statement")?;
                    args.commands.push(stmt);
                }

                'l' => {
                    let file = flag_value(&chars, &mut j, argv, &mut i, "a file name")?;
                    args.log_file = Some(PathBuf::from(file));
                }

                't' => {
                    let ms = flag_value(&chars, &mut j, argv, &mut i, "a tick interval")?;
                    args.tick_ms = match ms.parse::<u64>() {
                        Ok(n) if n > 0 => n,
                        _ => return Err(format!("invalid tick interval: {ms}")),
                    };
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    Ok(args)
}

/// Value of the flag at `chars[*j]`: the rest of this token, or the next one.
fn flag_value(
    chars: &[char],
    j: &mut usize,
    argv: &[String],
    i: &mut usize,
    what: &str,
) -> Result<String, String> {
    let flag = chars[*j];
    if *j + 1 < chars.len() {
        let s: String = chars[*j + 1..].iter().collect();
        *j = chars.len();
        Ok(s)
    } else if *i + 1 < argv.len() {
        *i += 1;
        Ok(argv[*i].clone())
    } else {
        Err(format!("-{flag} requires {what}"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
