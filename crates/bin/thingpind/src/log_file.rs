//! Size-capped log file for `--log`.
//!
//! Once the active file reaches `max_bytes` it is renamed to `<name>.1`,
//! older backups shift up by one, and the oldest past `backups` is dropped.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Size at which the active log file is rotated.
pub const MAX_BYTES: u64 = 10 * 1024 * 1024;
/// Rotated files kept next to the active one.
pub const BACKUPS: usize = 10;

/// Append-only writer that rotates by size.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    /// Open `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened.
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = append(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            max_bytes: max_bytes.max(1),
            backups,
            file,
            written,
        })
    }

    fn backup(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups == 0 {
            self.file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)?;
        } else {
            for index in (1..self.backups).rev() {
                let from = self.backup(index);
                if from.exists() {
                    std::fs::rename(&from, self.backup(index + 1))?;
                }
            }
            std::fs::rename(&self.path, self.backup(1))?;
            self.file = append(&self.path)?;
        }
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let count = self.file.write(buf)?;
        self.written += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scratch(PathBuf);

    impl Scratch {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "thingpind-log-{name}-{}",
                std::process::id()
            ));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn should_append_to_existing_file() {
        let scratch = Scratch::new("append");
        let path = scratch.0.join("thingpin.log");
        std::fs::write(&path, "old\n").unwrap();

        let mut file = RotatingFile::open(&path, 1024, 2).unwrap();
        file.write_all(b"new\n").unwrap();

        assert_eq!(read(&path), "old\nnew\n");
    }

    #[test]
    fn should_rotate_when_size_is_reached() {
        let scratch = Scratch::new("rotate");
        let path = scratch.0.join("thingpin.log");

        let mut file = RotatingFile::open(&path, 8, 2).unwrap();
        file.write_all(b"first\n").unwrap();
        file.write_all(b"second\n").unwrap();
        file.write_all(b"third\n").unwrap();

        assert_eq!(read(&path), "third\n");
        assert_eq!(read(&file.backup(1)), "second\n");
        assert_eq!(read(&file.backup(2)), "first\n");
    }

    #[test]
    fn should_drop_oldest_backup() {
        let scratch = Scratch::new("drop");
        let path = scratch.0.join("thingpin.log");

        let mut file = RotatingFile::open(&path, 4, 1).unwrap();
        for line in ["aaaa", "bbbb", "cccc"] {
            file.write_all(line.as_bytes()).unwrap();
        }

        assert_eq!(read(&path), "cccc");
        assert_eq!(read(&file.backup(1)), "bbbb");
        assert!(!file.backup(2).exists());
    }
}
