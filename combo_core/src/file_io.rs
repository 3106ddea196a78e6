//! # File I/O Module
//!
//! Handles interchange document files with safety features:
//! - **Atomic saves**: Write to a `.tmp` sibling, sync, rename over the target
//! - **File locking**: Prevent concurrent edits on shared drives
//! - **Version validation**: Documents are checked on load like any import
//!
//! ## File Format
//!
//! Documents are JSON files (see [`crate::serializer`]). Lock files add a
//! `.lock` suffix to the document's extension (`loads.json.lock`) and hold
//! metadata about who holds the lock.
//!
//! ## Example
//!
//! ```rust,no_run
//! use combo_core::combination_set::CombinationSet;
//! use combo_core::file_io::{save_document, FileLock};
//! use combo_core::serializer;
//! use std::path::Path;
//!
//! let set = CombinationSet::new("Warehouse");
//! let path = Path::new("combinations.json");
//!
//! // Acquire lock before saving
//! let lock = FileLock::acquire(path, "engineer@company.com").unwrap();
//!
//! // Save with atomic write
//! save_document(&serializer::export(&set, true, &[]), path).unwrap();
//!
//! // Lock is released when dropped
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{CalcError, CalcResult};
use crate::formula::FormulaParser;
use crate::serializer::{self, ExportDocument, ImportedDocument};

/// Lock file metadata stored in `.lock` sidecar files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// User identifier (email or username)
    pub user_id: String,
    /// Machine name where lock was acquired
    pub machine: String,
    /// Process ID that holds the lock
    pub pid: u32,
    /// When the lock was acquired
    pub locked_at: DateTime<Utc>,
}

impl LockInfo {
    /// Create new lock info for the current process
    pub fn new(user_id: impl Into<String>) -> Self {
        LockInfo {
            user_id: user_id.into(),
            machine: hostname().unwrap_or_else(|| "unknown".to_string()),
            pid: std::process::id(),
            locked_at: Utc::now(),
        }
    }
}

fn hostname() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("COMPUTERNAME").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOSTNAME").ok().or_else(|| std::env::var("HOST").ok())
    }
}

/// File lock guard that releases the lock when dropped.
///
/// Uses both:
/// 1. OS-level file locking (via fs2) for process safety
/// 2. A `.lock` file with metadata for user visibility
pub struct FileLock {
    document_path: PathBuf,
    lock_path: PathBuf,
    /// Keeps the OS lock alive
    _lock_file: File,
    pub info: LockInfo,
}

impl FileLock {
    /// Acquire an exclusive lock on a document file.
    ///
    /// # Errors
    ///
    /// [`CalcError::FileLocked`] when another live process holds the lock.
    /// Stale locks (dead process on this machine, or older than 24 hours)
    /// are taken over.
    pub fn acquire(path: &Path, user_id: impl Into<String>) -> CalcResult<Self> {
        let lock_path = lock_path_for(path);
        let info = LockInfo::new(user_id);

        if let Some(existing) = FileLock::check(path) {
            return Err(CalcError::file_locked(
                path.display().to_string(),
                format!("{} ({})", existing.user_id, existing.machine),
                existing.locked_at.to_rfc3339(),
            ));
        }

        let mut lock_file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| CalcError::file_error("create lock", lock_path.display().to_string(), e.to_string()))?;

        lock_file.try_lock_exclusive().map_err(|_| {
            CalcError::file_locked(path.display().to_string(), "another process", "unknown")
        })?;

        let lock_json = serde_json::to_string_pretty(&info).map_err(|e| CalcError::serialization(e.to_string()))?;
        lock_file
            .write_all(lock_json.as_bytes())
            .and_then(|_| lock_file.sync_all())
            .map_err(|e| CalcError::file_error("write lock", lock_path.display().to_string(), e.to_string()))?;

        debug!(path = %path.display(), user = %info.user_id, "Acquired document lock");

        Ok(FileLock {
            document_path: path.to_path_buf(),
            lock_path,
            _lock_file: lock_file,
            info,
        })
    }

    /// Check if a document is locked without acquiring the lock.
    ///
    /// Returns `Some(LockInfo)` if locked, `None` if available.
    pub fn check(path: &Path) -> Option<LockInfo> {
        let lock_path = lock_path_for(path);
        if !lock_path.exists() {
            return None;
        }
        read_lock_info(&lock_path).ok().filter(|info| !is_lock_stale(info))
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

/// Removes a temporary file unless disarmed after a successful rename
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        TempFileGuard { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn lock_path_for(document_path: &Path) -> PathBuf {
    sibling_with_suffix(document_path, "lock")
}

fn temp_path_for(document_path: &Path) -> PathBuf {
    sibling_with_suffix(document_path, "tmp")
}

/// `loads.json` → `loads.json.<suffix>`
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut sibling = path.to_path_buf();
    let extension = sibling
        .extension()
        .map(|e| format!("{}.{}", e.to_string_lossy(), suffix))
        .unwrap_or_else(|| suffix.to_string());
    sibling.set_extension(extension);
    sibling
}

fn read_lock_info(lock_path: &Path) -> CalcResult<LockInfo> {
    let contents = read_to_string(lock_path, "read lock")?;
    serde_json::from_str(&contents).map_err(|e| CalcError::serialization(e.to_string()))
}

/// A lock is stale when its process is gone (same machine only) or it is
/// more than 24 hours old
fn is_lock_stale(info: &LockInfo) -> bool {
    if hostname().as_deref() == Some(info.machine.as_str()) && !process_alive(info.pid) {
        return true;
    }
    (Utc::now() - info.locked_at).num_hours() > 24
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    fs::metadata(format!("/proc/{}", pid)).is_ok()
}

#[cfg(windows)]
fn process_alive(pid: u32) -> bool {
    use std::process::Command;
    match Command::new("tasklist").args(["/FI", &format!("PID eq {}", pid), "/NH"]).output() {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
        Err(_) => true,
    }
}

#[cfg(not(any(unix, windows)))]
fn process_alive(_pid: u32) -> bool {
    true
}

fn read_to_string(path: &Path, operation: &str) -> CalcResult<String> {
    let mut file = File::open(path).map_err(|e| CalcError::file_error(operation, path.display().to_string(), e.to_string()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| CalcError::file_error(operation, path.display().to_string(), e.to_string()))?;
    Ok(contents)
}

/// Serialize a value to a file with atomic write semantics.
///
/// The save process:
/// 1. Serialize to pretty JSON
/// 2. Write to a temporary sibling (`.tmp`)
/// 3. Sync to disk (fsync)
/// 4. Rename over the target (atomic on most filesystems)
///
/// The temporary file is removed on every failure path.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> CalcResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CalcError::serialization(e.to_string()))?;

    let tmp_path = temp_path_for(path);
    let mut guard = TempFileGuard::new(tmp_path.clone());

    let mut tmp_file = File::create(&tmp_path)
        .map_err(|e| CalcError::file_error("create temp file", tmp_path.display().to_string(), e.to_string()))?;
    tmp_file
        .write_all(json.as_bytes())
        .map_err(|e| CalcError::file_error("write temp file", tmp_path.display().to_string(), e.to_string()))?;
    tmp_file
        .sync_all()
        .map_err(|e| CalcError::file_error("sync temp file", tmp_path.display().to_string(), e.to_string()))?;
    drop(tmp_file);

    fs::rename(&tmp_path, path)
        .map_err(|e| CalcError::file_error("rename to final", path.display().to_string(), e.to_string()))?;
    guard.disarm();

    debug!(path = %path.display(), bytes = json.len(), "Saved file");
    Ok(())
}

/// Read and deserialize a JSON file
pub fn load_json<T: DeserializeOwned>(path: &Path) -> CalcResult<T> {
    let contents = read_to_string(path, "read")?;
    serde_json::from_str(&contents)
        .map_err(|e| CalcError::serialization(format!("Invalid JSON in {}: {}", path.display(), e)))
}

/// Save an interchange document atomically
pub fn save_document(document: &ExportDocument, path: &Path) -> CalcResult<()> {
    save_json(document, path)
}

/// Load and validate an interchange document.
///
/// The file is treated as untrusted input and goes through
/// [`serializer::import`], including schema version checks and formula
/// re-validation.
pub fn load_document(path: &Path, parser: &FormulaParser<'_>) -> CalcResult<ImportedDocument> {
    let contents = read_to_string(path, "read")?;
    serializer::import(&contents, parser).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Document rejected");
        e
    })
}

/// Load a document, also reporting whether another user holds its lock.
///
/// # Returns
///
/// * `Ok((doc, None))` - Loaded successfully, no lock
/// * `Ok((doc, Some(LockInfo)))` - Loaded, but another user has the lock
/// * `Err(_)` - Failed to load
pub fn load_document_with_lock_check(
    path: &Path,
    parser: &FormulaParser<'_>,
) -> CalcResult<(ImportedDocument, Option<LockInfo>)> {
    let document = load_document(path, parser)?;
    Ok((document, FileLock::check(path)))
}
