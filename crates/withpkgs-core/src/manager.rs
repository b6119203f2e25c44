use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::kind::PackageManagerKind;

pub const MANIFEST_FILE_NAME: &str = "package.json";

/// Detection order when several lockfiles sit next to the manifest.
const LOCKFILE_DETECTION_ORDER: [PackageManagerKind; 3] = [
    PackageManagerKind::Pnpm,
    PackageManagerKind::Yarn,
    PackageManagerKind::Npm,
];

/// The package manager driving a project and the files it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManagerInfo {
    pub kind: PackageManagerKind,
    pub package_json_path: PathBuf,
    pub lockfile_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestPackageManagerField {
    #[serde(rename = "packageManager")]
    package_manager: Option<String>,
}

impl PackageManagerInfo {
    pub fn new(
        kind: PackageManagerKind,
        package_json_path: impl Into<PathBuf>,
        lockfile_path: Option<PathBuf>,
    ) -> Self {
        Self {
            kind,
            package_json_path: package_json_path.into(),
            lockfile_path,
        }
    }

    /// Inspects `project_dir` for a manifest and the lockfile of whichever
    /// tool manages it.
    pub fn detect(project_dir: &Path) -> Result<Self> {
        let package_json_path = manifest_path(project_dir)?;

        for kind in LOCKFILE_DETECTION_ORDER {
            if let Some(lockfile_path) = find_lockfile(project_dir, kind) {
                return Ok(Self::new(kind, package_json_path, Some(lockfile_path)));
            }
        }

        let kind = read_package_manager_field(&package_json_path)?
            .unwrap_or(PackageManagerKind::Npm);
        Ok(Self::new(kind, package_json_path, None))
    }

    /// Builds the info for a caller-chosen `kind`, picking up that tool's
    /// lockfile if one exists. The manifest's `packageManager` field is not
    /// consulted.
    pub fn for_kind(project_dir: &Path, kind: PackageManagerKind) -> Result<Self> {
        let package_json_path = manifest_path(project_dir)?;
        let lockfile_path = find_lockfile(project_dir, kind);
        Ok(Self::new(kind, package_json_path, lockfile_path))
    }

    pub fn project_dir(&self) -> Option<&Path> {
        self.package_json_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }
}

fn manifest_path(project_dir: &Path) -> Result<PathBuf> {
    let package_json_path = project_dir.join(MANIFEST_FILE_NAME);
    if !package_json_path.is_file() {
        return Err(anyhow!(
            "no {MANIFEST_FILE_NAME} found in project directory: {}",
            project_dir.display()
        ));
    }
    Ok(package_json_path)
}

fn find_lockfile(project_dir: &Path, kind: PackageManagerKind) -> Option<PathBuf> {
    kind.lockfile_names()
        .iter()
        .map(|name| project_dir.join(name))
        .find(|path| path.is_file())
}

fn read_package_manager_field(package_json_path: &Path) -> Result<Option<PackageManagerKind>> {
    let raw = fs::read_to_string(package_json_path)
        .with_context(|| format!("failed to read {}", package_json_path.display()))?;
    let field: ManifestPackageManagerField = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", package_json_path.display()))?;

    match field.package_manager {
        Some(value) => PackageManagerKind::from_package_manager_field(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("unsupported packageManager value: {value}")),
        None => Ok(None),
    }
}
