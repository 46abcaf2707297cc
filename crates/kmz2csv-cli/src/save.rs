//! Filesystem save target and console status output.

use std::io;
use std::path::{Path, PathBuf};

use kmz2csv::{ConvertError, SaveSink, Status, StatusLevel, StatusSink};
use tracing::debug;

/// Writes CSV output into a directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    overwrite: bool,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            dir: dir.into(),
            overwrite,
            written: Vec::new(),
        }
    }

    /// Output next to `input` unless `dir` overrides it.
    pub fn for_input(input: &Path, dir: Option<&Path>, overwrite: bool) -> Self {
        let dir = dir
            .map(Path::to_path_buf)
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        Self::new(dir, overwrite)
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl SaveSink for DirectorySink {
    fn save(&mut self, bytes: &[u8], suggested_name: &str, mime: &str) -> kmz2csv::Result<()> {
        if !self.dir.as_os_str().is_empty() {
            std::fs::create_dir_all(&self.dir)?;
        }
        let path = self.dir.join(suggested_name);
        if !self.overwrite && path.exists() {
            return Err(ConvertError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists (use --force to overwrite)", path.display()),
            )));
        }

        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), mime, bytes = bytes.len(), "saved output");
        self.written.push(path);
        Ok(())
    }
}

/// Prints status transitions the way the converter reports them.
#[derive(Debug, Default)]
pub struct ConsoleStatus {
    quiet: bool,
}

impl ConsoleStatus {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl StatusSink for ConsoleStatus {
    fn update(&mut self, status: &Status) {
        match status.level() {
            StatusLevel::Error => eprintln!("Status: {status}"),
            StatusLevel::Processing if self.quiet => {}
            _ => println!("Status: {status}"),
        }
    }

    fn set_busy(&mut self, busy: bool) {
        debug!(busy, "converter state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let mut sink = DirectorySink::new(&out, false);

        sink.save(b"Type\n", "trail.csv", "text/csv").unwrap();
        assert_eq!(sink.written(), &[out.join("trail.csv")]);
        assert_eq!(std::fs::read_to_string(out.join("trail.csv")).unwrap(), "Type\n");
    }

    #[test]
    fn test_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("trail.csv"), "old").unwrap();

        let mut sink = DirectorySink::new(dir.path(), false);
        let err = sink.save(b"new", "trail.csv", "text/csv").unwrap_err();
        assert!(matches!(err, ConvertError::Io(ref e) if e.kind() == io::ErrorKind::AlreadyExists));
        assert_eq!(std::fs::read_to_string(dir.path().join("trail.csv")).unwrap(), "old");

        let mut sink = DirectorySink::new(dir.path(), true);
        sink.save(b"new", "trail.csv", "text/csv").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("trail.csv")).unwrap(), "new");
    }

    #[test]
    fn test_for_input_defaults_to_parent() {
        let sink = DirectorySink::for_input(Path::new("maps/trail.kmz"), None, false);
        assert_eq!(sink.dir, PathBuf::from("maps"));

        let sink =
            DirectorySink::for_input(Path::new("maps/trail.kmz"), Some(Path::new("out")), false);
        assert_eq!(sink.dir, PathBuf::from("out"));
    }
}
