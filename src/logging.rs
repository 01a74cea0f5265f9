//! Logging sink: stdout plus a size-rotated file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

/// Rotation threshold for the log file.
pub const MAX_LOG_SIZE: u64 = 1024 * 1024;

/// Appends to a file, renaming it away with a timestamp once it outgrows
/// [`MAX_LOG_SIZE`].
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
        })
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
        let rotated = self.path.with_file_name(format!("log.{stamp}.txt"));
        std::fs::rename(&self.path, rotated)?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > MAX_LOG_SIZE {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Duplicates everything to stdout and the rotating file.
struct Tee {
    file: RotatingFile,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

/// Sets up env_logger over the tee sink.
pub fn init(log_path: &Path) -> io::Result<()> {
    let tee = Tee {
        file: RotatingFile::open(log_path)?,
    };
    env_logger::builder()
        .target(env_logger::Target::Pipe(Box::new(tee)))
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    Ok(())
}
