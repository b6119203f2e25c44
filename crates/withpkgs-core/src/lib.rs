mod kind;
mod manager;

pub use kind::PackageManagerKind;
pub use manager::{PackageManagerInfo, MANIFEST_FILE_NAME};
