//! Local output files: pretty JSON writes and loads.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::Path;

/// Write `data` as JSON indented with four spaces, replacing any existing file.
///
/// Parent directories are created if missing. The bytes go to a `.tmp`
/// sibling first and are then renamed over the target.
pub fn write_json_pretty<T: Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut ser).map_err(io::Error::other)?;
    buf.push(b'\n');
    atomic_write(path, &buf)
}

/// Write raw bytes, creating parent directories and replacing any existing file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load and deserialize a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
