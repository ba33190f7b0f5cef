use std::cell::Cell;
use std::fs;
use std::io::{ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::ChunkerError;
pub trait ProgressStore {
    fn load(&self) -> Result<Option<u64>, ChunkerError>;
    fn save(&self, last_completed_chunk: u64) -> Result<(), ChunkerError>;
}

#[derive(Debug, Clone)]
pub struct FileProgressStore {
    path: Utf8PathBuf,
}

impl FileProgressStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.as_std_path().exists()
    }
    pub fn clear(&self) -> Result<bool, ChunkerError> {
        match fs::remove_file(self.path.as_std_path()) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ChunkerError::Progress(format!(
                "remove {}: {err}",
                self.path
            ))),
        }
    }
}

impl ProgressStore for FileProgressStore {
    fn load(&self) -> Result<Option<u64>, ChunkerError> {
        let content = match fs::read_to_string(self.path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ChunkerError::Progress(format!("read {}: {err}", self.path)));
            }
        };
        let Some(line) = content.lines().next() else {
            return Err(ChunkerError::Progress(format!("{} is empty", self.path)));
        };
        line.trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|err| ChunkerError::Progress(format!("{}: {line:?}: {err}", self.path)))
    }

    fn save(&self, last_completed_chunk: u64) -> Result<(), ChunkerError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| ChunkerError::Progress(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("census-chunker-progress")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| ChunkerError::Progress(err.to_string()))?;
        temp.write_all(last_completed_chunk.to_string().as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|err| ChunkerError::Progress(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| ChunkerError::Progress(err.to_string()))?;
        Ok(())
    }
}
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    value: Cell<Option<u64>>,
    saves: Cell<usize>,
}

impl MemoryProgressStore {
    pub fn with_value(value: Option<u64>) -> Self {
        Self {
            value: Cell::new(value),
            saves: Cell::new(0),
        }
    }

    pub fn value(&self) -> Option<u64> {
        self.value.get()
    }

    pub fn saves(&self) -> usize {
        self.saves.get()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load(&self) -> Result<Option<u64>, ChunkerError> {
        Ok(self.value.get())
    }

    fn save(&self, last_completed_chunk: u64) -> Result<(), ChunkerError> {
        self.value.set(Some(last_completed_chunk));
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_none() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("progress.txt")).unwrap();
        let store = FileProgressStore::new(path);
        assert_eq!(store.load().unwrap(), None);
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn save_overwrites_single_value() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("state/progress.txt")).unwrap();
        let store = FileProgressStore::new(path.clone());
        store.save(3).unwrap();
        store.save(12).unwrap();
        assert_eq!(store.load().unwrap(), Some(12));
        assert_eq!(std::fs::read_to_string(path.as_std_path()).unwrap(), "12");
        assert!(store.clear().unwrap());
        assert!(!store.exists());
    }

    #[test]
    fn garbage_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("progress.txt");
        std::fs::write(&path, "not a number\n").unwrap();
        let store = FileProgressStore::new(Utf8PathBuf::from_path_buf(path).unwrap());
        assert!(matches!(store.load(), Err(ChunkerError::Progress(_))));
    }
}
