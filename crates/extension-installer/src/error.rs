#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("invalid source: {0}")]
    InvalidSource(String),
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("packer produced no output at {0}")]
    MissingPackerOutput(String),
    #[error("chromium packer exited with status {0}: {1}")]
    PackerFailed(String, String),
    #[error("policy directory not writable: {0}")]
    PolicyDirNotWritable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Key(#[from] rsa::errors::Error),
    #[error(transparent)]
    Pkcs8(#[from] pkcs8::Error),
    #[error(transparent)]
    Spki(#[from] spki::Error),
}

pub type Result<T> = std::result::Result<T, InstallError>;
