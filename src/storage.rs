//! JSON file helpers shared by the file-backed stores.
//!
//! Writes go to a sibling `.tmp` file which is synced and renamed over the
//! target, so a crash mid-write leaves the previous contents intact.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::ScrapPosError;

/// Read a JSON document, or `T::default()` when the file does not exist.
pub fn load_or_default<T>(path: &Path) -> Result<T, ScrapPosError>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        tracing::debug!("No data at {}, starting fresh", path.display());
        return Ok(T::default());
    }
    let json = fs::read_to_string(path)?;
    if json.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&json)?)
}

/// Atomically replace `path` with the JSON form of `value`.
pub fn save_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ScrapPosError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;

    tracing::debug!("Saved {}", path.display());
    Ok(())
}
