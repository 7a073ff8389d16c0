//! File-backed frontier store
//!
//! The frontier lives next to the output as `<output>.checkpoint`, holding a
//! single decimal integer. Updates go to `<output>.checkpoint.tmp`, are
//! fsynced, then renamed over the real file.

use crate::storage::traits::{CheckpointError, CheckpointResult, FrontierStore};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Frontier persisted in a small text file
#[derive(Debug, Clone)]
pub struct FileFrontierStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileFrontierStore {
    /// Store for the checkpoint that belongs to an output target
    pub fn for_target(output: &Path) -> Self {
        let path = with_suffix(output, ".checkpoint");
        let tmp_path = with_suffix(&path, ".tmp");
        Self { path, tmp_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl FrontierStore for FileFrontierStore {
    fn load(&self) -> CheckpointResult<u32> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        content
            .trim()
            .parse::<u32>()
            .map_err(|_| CheckpointError::Corrupt {
                path: self.path.clone(),
                content,
            })
    }

    fn persist(&self, frontier: u32) -> CheckpointResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
            }
        }

        let tmp = &self.tmp_path;
        let mut file = File::create(tmp).map_err(|e| self.io_error(tmp, e))?;
        writeln!(file, "{}", frontier).map_err(|e| self.io_error(tmp, e))?;
        file.sync_all().map_err(|e| self.io_error(tmp, e))?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path).map_err(|e| self.io_error(&self.path, e))?;
        Ok(())
    }

    fn reset(&self) -> CheckpointResult<()> {
        for path in [&self.path, &self.tmp_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(self.io_error(path, e)),
            }
        }
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
