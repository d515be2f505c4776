pub mod devtools;
pub mod error;
pub mod keystore;
pub mod manifest;
pub mod packer;
pub mod pipeline;
pub mod policy;
pub mod publish;
pub mod source;

pub use error::{InstallError, Result};
pub use pipeline::{install_from_github, install_from_upload, resolve_repo_path, DevtoolsTarget, InstallerConfig};
