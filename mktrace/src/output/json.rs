// SPDX-License-Identifier: GPL-3.0-or-later

//! JSON documents on disk.
//!
//! Writes go to a temporary file next to the target first, which is then
//! renamed to the final name. Readers never see a half written document.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JsonFileError {
    #[error("IO error on {0}: {1}")]
    Io(PathBuf, io::Error),
    #[error("JSON error on {0}: {1}")]
    Format(PathBuf, serde_json::Error),
}

/// The temporary file name used while writing the given path.
pub fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn write_atomically<T: Serialize>(path: &Path, value: &T) -> Result<(), JsonFileError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| JsonFileError::Io(parent.to_path_buf(), err))?;
    }

    let temp_path = temporary_path(path);
    {
        let file = fs::File::create(&temp_path)
            .map(io::BufWriter::new)
            .map_err(|err| JsonFileError::Io(temp_path.clone(), err))?;
        serde_json::to_writer_pretty(file, value)
            .map_err(|err| JsonFileError::Format(temp_path.clone(), err))?;
    }

    fs::rename(&temp_path, path).map_err(|err| JsonFileError::Io(path.to_path_buf(), err))
}

pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T, JsonFileError> {
    let file = fs::File::open(path)
        .map(io::BufReader::new)
        .map_err(|err| JsonFileError::Io(path.to_path_buf(), err))?;

    serde_json::from_reader(file).map_err(|err| JsonFileError::Format(path.to_path_buf(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomically(&path, &vec!["one", "two"]).unwrap();

        let content: Vec<String> = read(&path).unwrap();
        assert_eq!(content, vec!["one", "two"]);
        assert!(!temporary_path(&path).exists());
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_atomically(&path, &1).unwrap();
        write_atomically(&path, &2).unwrap();

        assert_eq!(read::<u32>(&path).unwrap(), 2);
    }

    #[test]
    fn test_read_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(read::<u32>(&missing), Err(JsonFileError::Io(_, _))));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(read::<u32>(&broken), Err(JsonFileError::Format(_, _))));
    }

    #[test]
    fn test_temporary_path() {
        assert_eq!(temporary_path(Path::new("/w/.mktrace/cache.json")), PathBuf::from("/w/.mktrace/cache.json.tmp"));
    }
}
