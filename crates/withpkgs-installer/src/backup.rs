use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use tracing::debug;
use withpkgs_core::PackageManagerInfo;

pub const DEFAULT_SCRATCH_PREFIX: &str = "withpkgs-packages-";

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where scratch directories are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchSettings {
    pub prefix: String,
    /// Parent directory; the platform temp dir when unset.
    pub root: Option<PathBuf>,
}

impl Default for ScratchSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_SCRATCH_PREFIX.to_string(),
            root: None,
        }
    }
}

impl ScratchSettings {
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Creates a fresh, private directory named `<prefix><pid>-<nanos>-<seq>`.
pub fn create_scratch_dir(settings: &ScratchSettings) -> Result<PathBuf> {
    let root = settings.root_dir();
    fs::create_dir_all(&root)
        .with_context(|| format!("failed to create scratch root {}", root.display()))?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_nanos();
    loop {
        let sequence = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = root.join(format!(
            "{}{}-{}-{}",
            settings.prefix,
            std::process::id(),
            nanos,
            sequence
        ));
        match private_dir_builder().create(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "created scratch directory");
                return Ok(path);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to create scratch directory {}", path.display())
                });
            }
        }
    }
}

#[cfg(unix)]
fn private_dir_builder() -> fs::DirBuilder {
    use std::os::unix::fs::DirBuilderExt;

    let mut builder = fs::DirBuilder::new();
    builder.mode(0o700);
    builder
}

#[cfg(not(unix))]
fn private_dir_builder() -> fs::DirBuilder {
    fs::DirBuilder::new()
}

/// Deletes the files directly inside `dir`, then `dir` itself.
pub fn remove_scratch_dir(dir: &Path) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", dir.display()))?
            .path();
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    fs::remove_dir(dir).with_context(|| format!("failed to remove {}", dir.display()))?;
    debug!(path = %dir.display(), "removed scratch directory");
    Ok(())
}

/// One original file and its copy inside the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub original: PathBuf,
    pub backup: PathBuf,
}

impl BackupEntry {
    /// Puts the backup bytes back over the original.
    pub fn restore(&self) -> Result<()> {
        remove_file_if_exists(&self.original)
            .with_context(|| format!("failed to remove {}", self.original.display()))?;
        fs::copy(&self.backup, &self.original).with_context(|| {
            format!(
                "failed to copy {} back to {}",
                self.backup.display(),
                self.original.display()
            )
        })?;
        Ok(())
    }
}

/// Backups of the manifest and, when present, the lockfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSet {
    pub scratch_dir: PathBuf,
    pub manifest: BackupEntry,
    pub lockfile: Option<BackupEntry>,
}

impl BackupSet {
    /// Copies the files owned by `manager` into `scratch_dir`.
    pub fn capture(manager: &PackageManagerInfo, scratch_dir: &Path) -> Result<Self> {
        let manifest = backup_file(&manager.package_json_path, scratch_dir, "manifest")?;
        let lockfile = manager
            .lockfile_path
            .as_deref()
            .map(|path| backup_file(path, scratch_dir, "lockfile"))
            .transpose()?;
        Ok(Self {
            scratch_dir: scratch_dir.to_path_buf(),
            manifest,
            lockfile,
        })
    }

    pub fn restore(&self) -> Result<()> {
        self.manifest.restore()?;
        if let Some(lockfile) = &self.lockfile {
            lockfile.restore()?;
        }
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = &BackupEntry> {
        std::iter::once(&self.manifest).chain(self.lockfile.iter())
    }
}

fn backup_file(original: &Path, scratch_dir: &Path, role: &str) -> Result<BackupEntry> {
    let file_name = original
        .file_name()
        .ok_or_else(|| anyhow!("{role} path has no file name: {}", original.display()))?;
    let backup = scratch_dir.join(format!("{role}-{}", file_name.to_string_lossy()));
    fs::copy(original, &backup).with_context(|| {
        format!(
            "failed to back up {role} {} to {}",
            original.display(),
            backup.display()
        )
    })?;
    debug!(original = %original.display(), backup = %backup.display(), "backed up {role}");
    Ok(BackupEntry {
        original: original.to_path_buf(),
        backup,
    })
}

fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
