//! Process logging for logtable binaries.
//!
//! Everything goes to a size-rotated file under `$LOGTABLE_HOME/logs`, and to
//! stderr with a filter that follows the verbosity flags.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "logtable=info,logtable_sink=info";
const VERBOSE_LOG_FILTER: &str = "logtable=debug,logtable_sink=debug,logtable_db=debug";
const HOME_ENV: &str = "LOGTABLE_HOME";

/// How the file log rotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    /// Files kept including the active one.
    pub max_files: usize,
    /// Size in bytes at which the active file is rotated.
    pub max_size: u64,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Only warnings and errors on stderr.
    pub quiet: bool,
    pub rotation: Rotation,
}

impl<'a> LogConfig<'a> {
    pub fn new(app_name: &'a str) -> Self {
        Self {
            app_name,
            verbose: false,
            quiet: false,
            rotation: Rotation::default(),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the file filter.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = ensure_logs_dir()?;
    let appender = RollingFileAppender::new(&dir, config.app_name, config.rotation)
        .with_context(|| format!("Cannot open log file in {}", dir.display()))?;
    let file = SharedLog(Arc::new(Mutex::new(appender)));

    let stderr_filter = match (config.verbose, config.quiet) {
        (true, _) => EnvFilter::new(VERBOSE_LOG_FILTER),
        (false, true) => EnvFilter::new("warn"),
        (false, false) => default_filter(),
    };

    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_filter(default_filter());
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(stderr_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// `$LOGTABLE_HOME`, or `~/.logtable`.
pub fn logtable_home() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(HOME_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::home_dir()
        .map(|home| home.join(".logtable"))
        .context("No home directory; set LOGTABLE_HOME")
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(logtable_home()?.join("logs"))
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let dir = logs_dir()?;
    fs::create_dir_all(&dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    Ok(dir)
}

/// Appends to `<name>.log`, shifting full files to `<name>.log.1`, `.2`, ...
pub struct RollingFileAppender {
    dir: PathBuf,
    base_name: String,
    rotation: Rotation,
    file: Option<File>,
    written: u64,
}

impl RollingFileAppender {
    pub fn new(dir: impl Into<PathBuf>, app_name: &str, rotation: Rotation) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let mut appender = Self {
            dir,
            base_name: sanitize_name(app_name),
            rotation: Rotation {
                max_files: rotation.max_files.max(1),
                ..rotation
            },
            file: None,
            written: 0,
        };
        appender.reopen()?;
        if appender.written > appender.rotation.max_size {
            appender.rotate()?;
        }
        Ok(appender)
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    pub fn rotated_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        // Best effort; the file is closed either way.
        if let Some(file) = self.file.as_mut() {
            file.flush().ok();
        }
        self.file = None;
        self.shift_files()?;
        self.reopen()
    }

    fn shift_files(&self) -> io::Result<()> {
        let keep = self.rotation.max_files - 1;
        if keep == 0 {
            // Only the active file is kept; start it over.
            return remove_if_exists(&self.current_path());
        }

        remove_if_exists(&self.rotated_path(keep))?;
        for index in (1..keep).rev() {
            let from = self.rotated_path(index);
            if from.exists() {
                fs::rename(&from, self.rotated_path(index + 1))?;
            }
        }

        match fs::rename(self.current_path(), self.rotated_path(1)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.rotation.max_size {
            self.rotate()?;
        }

        let Some(file) = self.file.as_mut() else {
            return Err(io::Error::other("log file unavailable"));
        };
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// The appender shared by every event the file layer formats.
struct SharedLog(Arc<Mutex<RollingFileAppender>>);

struct SharedLogHandle(Arc<Mutex<RollingFileAppender>>);

impl SharedLogHandle {
    fn with<T>(&self, op: impl FnOnce(&mut RollingFileAppender) -> io::Result<T>) -> io::Result<T> {
        let mut appender = self
            .0
            .lock()
            .map_err(|_| io::Error::other("log writer lock poisoned"))?;
        op(&mut appender)
    }
}

impl<'a> MakeWriter<'a> for SharedLog {
    type Writer = SharedLogHandle;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogHandle(Arc::clone(&self.0))
    }
}

impl Write for SharedLogHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with(|appender| appender.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with(|appender| appender.flush())
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
            _ => '_',
        })
        .collect()
}
