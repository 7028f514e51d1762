//! Main event loop.
//!
//! Multiplexes operator input and the tick clock on the tokio runtime:
//!
//! - a dedicated thread reads stdin line by line and forwards each line over
//!   an mpsc channel;
//! - a short interval timer drives [`VarStore::poll`];
//! - SIGINT, SIGTERM, end of input or `exit` stop the loop.
//!
//! All store access happens on the loop itself, so the store needs no lock.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::{
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use log::{info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::command::{self, Outcome};
use crate::listing;
use crate::var::{FormulaError, VarStore};

pub const PROMPT: &str = ">";

/// Upper bound on how long the clock may go unpolled.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ── EventLoop ─────────────────────────────────────────────────────────────────

pub struct EventLoop<W: Write> {
    pub store: VarStore,
    out: W,
    start: Instant,
    /// Prompt and colour the output (stdin and stdout are a terminal).
    interactive: bool,
    quit: bool,
}

impl EventLoop<io::Stdout> {
    pub fn new(store: VarStore, interactive: bool) -> Self {
        Self::with_writer(store, io::stdout(), interactive)
    }
}

impl<W: Write> EventLoop<W> {
    pub fn with_writer(store: VarStore, out: W, interactive: bool) -> Self {
        EventLoop {
            store,
            out,
            start: Instant::now(),
            interactive,
            quit: false,
        }
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Milliseconds since the loop was created.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    /// Run one operator statement and print its outcome.
    pub fn handle_line(&mut self, line: &str) -> io::Result<()> {
        match command::execute(&mut self.store, line) {
            Outcome::Done | Outcome::Load(_) => {}
            Outcome::Value(v) => writeln!(self.out, "{v}")?,
            Outcome::Lines(lines) => {
                for l in lines {
                    writeln!(self.out, "{l}")?;
                }
            }
            Outcome::Loaded { count, errors } => {
                info!("loaded {count} statements, {} errors", errors.len());
                for e in errors {
                    writeln!(self.out, "{e}")?;
                }
            }
            Outcome::Unsupported(name) => writeln!(self.out, "{name}: not available")?,
            Outcome::Failed(msg) => writeln!(self.out, "{msg}")?,
            Outcome::Exit => self.quit = true,
            Outcome::Error { pos, kind } => {
                let indent = if self.interactive {
                    PROMPT.len()
                } else {
                    writeln!(self.out, "{}", line.trim_end())?;
                    0
                };
                self.print_caret(&listing::caret(indent, pos))?;
                writeln!(self.out, " ({kind})")?;
            }
        }
        self.out.flush()
    }

    /// Run a batch of statements (`-c` arguments).
    pub fn run_commands(&mut self, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.handle_line(line)?;
            if self.quit {
                break;
            }
        }
        Ok(())
    }

    // ── Clock ─────────────────────────────────────────────────────────────────

    /// Advance the store clock to `now_ms`, reporting failing formulas.
    pub fn tick(&mut self, now_ms: u64) -> io::Result<()> {
        let errors = self.store.poll(now_ms);
        for e in &errors {
            self.print_formula_error(e)?;
        }
        if !errors.is_empty() {
            self.out.flush()?;
        }
        Ok(())
    }

    fn print_formula_error(&mut self, e: &FormulaError) -> io::Result<()> {
        let [head, mark] = listing::formula_error(e);
        writeln!(self.out, "{head}")?;
        self.print_caret(&mark)?;
        writeln!(self.out)
    }

    fn print_caret(&mut self, mark: &str) -> io::Result<()> {
        if self.interactive {
            queue!(
                self.out,
                SetForegroundColor(Color::Red),
                Print(mark),
                ResetColor
            )
        } else {
            write!(self.out, "{mark}")
        }
    }

    fn prompt(&mut self) -> io::Result<()> {
        if self.interactive {
            write!(self.out, "{PROMPT}")?;
            self.out.flush()?;
        }
        Ok(())
    }

    // ── Run ───────────────────────────────────────────────────────────────────

    pub async fn run(&mut self) -> io::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        // A dedicated thread owns stdin; `None` marks end of input.
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<Option<String>>(16);
        std::thread::spawn(move || {
            use std::io::BufRead;
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(l) => {
                        if stdin_tx.blocking_send(Some(l)).is_err() {
                            return;
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = stdin_tx.blocking_send(None);
        });

        let tick = Duration::from_millis(self.store.config().tick_ms.max(1));
        let mut clock = interval(POLL_INTERVAL.min(tick));
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("event loop started");
        self.prompt()?;
        while !self.quit {
            tokio::select! {
                Some(input) = stdin_rx.recv() => match input {
                    Some(line) => {
                        self.handle_line(&line)?;
                        if !self.quit {
                            self.prompt()?;
                        }
                    }
                    None => self.quit = true,
                },
                _ = clock.tick() => {
                    let now = self.elapsed_ms();
                    self.tick(now)?;
                }
                _ = sigint.recv() => {
                    warn!("interrupted");
                    self.quit = true;
                }
                _ = sigterm.recv() => {
                    warn!("terminated");
                    self.quit = true;
                }
            }
        }
        if self.interactive {
            writeln!(self.out)?;
        }
        info!("event loop stopped after {} ticks", self.store.ticks());
        self.out.flush()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
