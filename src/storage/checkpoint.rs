//! Atomic JSON persistence for endpoint dumps and the progress sidecar
//!
//! Every write goes to `<file>.tmp` first and is renamed onto the target, so
//! a reader either sees the previous complete file or the new one.

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::{DumpMetadata, DumpStatus, EndpointDump};
use crate::utils::error::CheckpointError;

/// Serialize `value` as pretty JSON and atomically replace `path`
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns `CheckpointError::Io` on any file system failure and
/// `CheckpointError::Json` if serialization fails
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CheckpointError::io(parent, e))?;
    }

    let temp_path = temp_path(path);
    let file = File::create(&temp_path).map_err(|e| CheckpointError::io(&temp_path, e))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| CheckpointError::json(&temp_path, e))?;
    writer
        .flush()
        .map_err(|e| CheckpointError::io(&temp_path, e))?;
    drop(writer);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        CheckpointError::io(path, e)
    })?;

    tracing::trace!(path = %path.display(), "JSON file written");
    Ok(())
}

/// Write an endpoint dump
///
/// # Errors
///
/// See [`write_json_atomic`]
pub fn save_dump(path: &Path, dump: &EndpointDump) -> Result<(), CheckpointError> {
    save_dump_parts(path, &dump.metadata, &dump.data)
}

/// Same layout as [`EndpointDump`], borrowing the records
#[derive(Serialize)]
struct DumpView<'a> {
    metadata: &'a DumpMetadata,
    data: &'a [Value],
}

/// Write an endpoint dump from its parts without copying the records
///
/// # Errors
///
/// See [`write_json_atomic`]
pub fn save_dump_parts(
    path: &Path,
    metadata: &DumpMetadata,
    data: &[Value],
) -> Result<(), CheckpointError> {
    write_json_atomic(path, &DumpView { metadata, data })?;
    tracing::debug!(
        path = %path.display(),
        records = metadata.total_records,
        pages = metadata.pages_downloaded,
        status = ?metadata.status,
        "Checkpoint saved"
    );
    Ok(())
}

/// Read an endpoint dump, `Ok(None)` when the file does not exist
///
/// # Errors
///
/// Returns `CheckpointError::Json` when the file is not a valid dump
pub fn load_dump(path: &Path) -> Result<Option<EndpointDump>, CheckpointError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CheckpointError::io(path, e)),
    };

    let dump = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| CheckpointError::json(path, e))?;
    Ok(Some(dump))
}

/// Completion marker of a JSON file on disk
///
/// Returns `Ok(None)` for plain JSON that is not a checkpoint document (no
/// `metadata` object), and the parsed status otherwise. An unrecognized
/// status string counts as in progress.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed, or when a checkpoint
/// document has no `metadata.status`
pub fn dump_status(path: &Path) -> Result<Option<DumpStatus>, CheckpointError> {
    let file = File::open(path).map_err(|e| CheckpointError::io(path, e))?;
    let header: DumpHeader = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| CheckpointError::json(path, e))?;

    let Some(Value::Object(metadata)) = header.metadata else {
        return Ok(None);
    };

    match metadata.get("status").and_then(|s| s.as_str()) {
        Some("complete") => Ok(Some(DumpStatus::Complete)),
        Some(_) => Ok(Some(DumpStatus::InProgress)),
        None => Err(CheckpointError::MissingStatus(path.to_path_buf())),
    }
}

/// Top-level `metadata` value of a JSON document
///
/// Every other value, `data` included, is skipped without being built.
struct DumpHeader {
    metadata: Option<Value>,
}

impl<'de> Deserialize<'de> for DumpHeader {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DumpHeaderVisitor)
    }
}

struct DumpHeaderVisitor;

impl DumpHeaderVisitor {
    fn none<E>(self) -> Result<DumpHeader, E> {
        Ok(DumpHeader { metadata: None })
    }
}

impl<'de> Visitor<'de> for DumpHeaderVisitor {
    type Value = DumpHeader;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON document")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<DumpHeader, A::Error> {
        let mut metadata = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == "metadata" && metadata.is_none() {
                metadata = Some(map.next_value::<Value>()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(DumpHeader { metadata })
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DumpHeader, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        self.none()
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<DumpHeader, E> {
        self.none()
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<DumpHeader, E> {
        self.none()
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<DumpHeader, E> {
        self.none()
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<DumpHeader, E> {
        self.none()
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<DumpHeader, E> {
        self.none()
    }

    fn visit_unit<E: de::Error>(self) -> Result<DumpHeader, E> {
        self.none()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
