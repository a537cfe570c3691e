//! Disk tier of the instrument encoding cache.
//!
//! Each entry is one file directly under the cache directory, named
//! `inst_enc_<group>_<note>_<version>`, holding:
//!
//! ```text
//! <type tag>\0 <version>\0 <i32 LE payload length> <payload digest>\0 \0 <payload>
//! ```
//!
//! Files are only ever deleted after their name passed [`is_cache_file`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::key::CacheKey;
use crate::container::content_digest;
use crate::error::{Error, Result};
use crate::io::{self, ByteInput};

/// Type tag at the start of every cache file.
pub const CACHE_FILE_TYPE: &str = "MorphStoreInstEncCache";

/// Filename prefix shared by all cache files.
pub const CACHE_FILE_PREFIX: &str = "inst_enc_";

/// The only file names the cache reads or deletes.
static SAFETY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^inst_enc_[0-9a-f]+_[0-9]+_[0-9a-f]+$")
        .unwrap_or_else(|e| panic!("static regex SAFETY_PATTERN failed to compile: {}", e))
});

/// Whether `name` is a cache file name this module may read or delete.
pub fn is_cache_file(name: &str) -> bool {
    SAFETY_PATTERN.is_match(name)
}

/// File name of the entry for `key` at `version`.
pub fn cache_file_name(key: &CacheKey, version: &str) -> String {
    format!("{}{}_{}", CACHE_FILE_PREFIX, key, version)
}

/// A cache file found while scanning the directory.
#[derive(Debug, Clone)]
pub struct DiskEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// List the cache files in `dir`. Other files are ignored.
pub fn list_entries(dir: &Path) -> Vec<DiskEntry> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => return Vec::new(),
    };

    let mut entries = Vec::new();
    for dirent in read_dir.flatten() {
        let name = match dirent.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if !is_cache_file(&name) {
            continue;
        }
        // The file may vanish between listing and stat.
        let meta = match dirent.metadata() {
            Ok(meta) if meta.is_file() => meta,
            _ => continue,
        };
        entries.push(DiskEntry {
            path: dirent.path(),
            name,
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    entries
}

/// Delete a cache file, refusing any name that is not a cache file name.
pub fn remove_checked(path: &Path) -> Result<()> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if !is_cache_file(name) {
        return Err(Error::Config(format!(
            "refusing to delete non-cache file {:?}",
            path
        )));
    }
    fs::remove_file(path)?;
    Ok(())
}

/// Find and verify the payload stored for `version`.
///
/// Missing files, unreadable files and digest mismatches all yield `None`.
/// The modification time of a file that loads successfully is refreshed.
pub fn load(dir: &Path, version: &str) -> Option<Vec<u8>> {
    let suffix = format!("_{}", version);
    for entry in list_entries(dir) {
        if !entry.name.ends_with(&suffix) {
            continue;
        }
        match read_entry(&entry.path, entry.size, version) {
            Ok(Some(data)) => {
                if let Err(e) = touch(&entry.path) {
                    log::debug!("could not touch {:?}: {}", entry.path, e);
                }
                return Some(data);
            }
            Ok(None) => log::warn!("ignoring corrupt cache file {:?}", entry.path),
            Err(e) => log::debug!("skipping cache file {:?}: {}", entry.path, e),
        }
    }
    None
}

/// Parse a cache file. `Ok(None)` means the file is malformed or stale.
fn read_entry(path: &Path, file_size: u64, version: &str) -> Result<Option<Vec<u8>>> {
    let mut input = io::open(path)?;

    let file_type = match read_cstring(input.as_mut()) {
        Some(s) => s,
        None => return Ok(None),
    };
    let file_version = match read_cstring(input.as_mut()) {
        Some(s) => s,
        None => return Ok(None),
    };
    if file_type != CACHE_FILE_TYPE || file_version != version {
        return Ok(None);
    }

    let mut len_bytes = [0u8; 4];
    if input.read(&mut len_bytes) != 4 {
        return Ok(None);
    }
    let len = match usize::try_from(i32::from_le_bytes(len_bytes)) {
        Ok(len) if (len as u64) <= file_size => len,
        _ => return Ok(None),
    };
    let digest = match read_cstring(input.as_mut()) {
        Some(s) => s,
        None => return Ok(None),
    };
    if input.get_byte() != Some(0) {
        return Ok(None);
    }

    let mut data = vec![0u8; len];
    if input.read(&mut data) != len || content_digest(&data) != digest {
        return Ok(None);
    }
    Ok(Some(data))
}

fn read_cstring(input: &mut dyn ByteInput) -> Option<String> {
    let mut bytes = Vec::new();
    loop {
        match input.get_byte()? {
            0 => break,
            b => bytes.push(b),
        }
    }
    String::from_utf8(bytes).ok()
}

fn touch(path: &Path) -> std::io::Result<()> {
    File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

/// Serialize a cache file.
pub fn encode_entry(version: &str, data: &[u8]) -> Result<Vec<u8>> {
    let len = i32::try_from(data.len()).map_err(|_| Error::BlockTooLarge {
        name: "cache payload".to_string(),
        len: data.len(),
    })?;
    let digest = content_digest(data);

    let mut out = Vec::with_capacity(data.len() + version.len() + digest.len() + 64);
    out.extend_from_slice(CACHE_FILE_TYPE.as_bytes());
    out.push(0);
    out.extend_from_slice(version.as_bytes());
    out.push(0);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(digest.as_bytes());
    out.push(0);
    out.push(0);
    out.extend_from_slice(data);
    Ok(out)
}

/// Store `data` for `key` at `version`, replacing older versions of `key`.
///
/// The file is written under a temporary name and renamed into place before
/// older files of the key are deleted, so a failed store leaves the previous
/// version intact. Returns the path of the new file.
pub fn store(dir: &Path, key: &CacheKey, version: &str, data: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let bytes = encode_entry(version, data)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;
    let name = cache_file_name(key, version);
    let path = dir.join(&name);
    tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
    log::info!("stored cache file {:?} ({} bytes)", path, bytes.len());

    let key_prefix = format!("{}{}_", CACHE_FILE_PREFIX, key);
    for entry in list_entries(dir) {
        if entry.name != name && entry.name.starts_with(&key_prefix) {
            if let Err(e) = remove_checked(&entry.path) {
                log::warn!("failed to delete old cache file {:?}: {}", entry.path, e);
            }
        }
    }

    Ok(path)
}

/// Delete the oldest cache files until the rest fits in `budget` bytes.
///
/// `keep` (usually the file stored last) ranks ahead of everything else,
/// then files go newest first with ties broken by name. The first ranked
/// file is always kept. Returns the number of deleted files.
pub fn evict(dir: &Path, budget: u64, keep: Option<&Path>) -> usize {
    let mut entries = list_entries(dir);
    entries.sort_by(|a, b| {
        let a_kept = keep == Some(a.path.as_path());
        let b_kept = keep == Some(b.path.as_path());
        b_kept
            .cmp(&a_kept)
            .then_with(|| b.modified.cmp(&a.modified))
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut total = 0u64;
    let mut over_budget = false;
    let mut removed = 0;
    for (i, entry) in entries.iter().enumerate() {
        total = total.saturating_add(entry.size);
        if i > 0 && total > budget {
            over_budget = true;
        }
        if over_budget {
            match remove_checked(&entry.path) {
                Ok(()) => {
                    log::debug!("evicted cache file {:?}", entry.path);
                    removed += 1;
                }
                Err(e) => log::warn!("failed to evict {:?}: {}", entry.path, e),
            }
        }
    }
    removed
}
