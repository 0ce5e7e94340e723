//! Raw dataset transfer to and from an object-store bucket.

use std::env;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use tokio::fs;

use crate::config::TransferConfig;
use crate::error::{PipelineError, Result};

/// Object name of the raw dataset inside the bucket.
pub const RAW_OBJECT_KEY: &str = "heart.csv";

const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";

/// Access key identity. Both halves of the key pair must be present and
/// non-empty; only the key id is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
}

fn non_empty(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => {
            error!("Invalid credentials: {} is missing", name);
            Err(PipelineError::Credential {
                reason: format!("{} is missing or empty", name),
            })
        }
    }
}

impl Credentials {
    pub fn new(access_key_id: Option<String>, secret_access_key: Option<String>) -> Result<Self> {
        let access_key_id = non_empty(access_key_id, "access key id")?;
        non_empty(secret_access_key, "secret access key")?;
        Ok(Credentials { access_key_id })
    }

    /// Take the pair from the configuration, falling back to the
    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` environment variables.
    pub fn from_config(config: &TransferConfig) -> Result<Self> {
        Credentials::new(
            config
                .access_key_id
                .clone()
                .or_else(|| env::var(ACCESS_KEY_ENV).ok()),
            config
                .secret_access_key
                .clone()
                .or_else(|| env::var(SECRET_KEY_ENV).ok()),
        )
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }
}

/// Upload and download of the raw dataset object.
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    /// Store `local_file` as [`RAW_OBJECT_KEY`]; returns the object location.
    async fn upload(&self, local_file: &Path) -> Result<PathBuf>;

    /// Fetch [`RAW_OBJECT_KEY`] into `dest_dir`; returns the written file.
    async fn download(&self, dest_dir: &Path) -> Result<PathBuf>;
}

/// Bucket backed by a directory `root/<bucket>/` on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBucket {
    root: PathBuf,
    bucket: String,
    credentials: Credentials,
}

impl LocalBucket {
    pub fn new<P: AsRef<Path>>(root: P, bucket: &str, credentials: Credentials) -> Self {
        LocalBucket {
            root: root.as_ref().to_path_buf(),
            bucket: bucket.to_string(),
            credentials,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Result<Self> {
        let credentials = Credentials::from_config(config)?;
        Ok(LocalBucket::new(&config.root, &config.bucket, credentials))
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    fn object_path(&self) -> PathBuf {
        self.bucket_dir().join(RAW_OBJECT_KEY)
    }
}

impl ObjectStore for LocalBucket {
    async fn upload(&self, local_file: &Path) -> Result<PathBuf> {
        fs::create_dir_all(self.bucket_dir()).await?;
        let target = self.object_path();
        let bytes = fs::copy(local_file, &target).await?;
        debug!("Authenticated as {}", self.credentials.access_key_id());
        info!("Raw data uploaded to bucket {} ({} bytes)", self.bucket, bytes);
        Ok(target)
    }

    async fn download(&self, dest_dir: &Path) -> Result<PathBuf> {
        let source = self.object_path();
        if fs::metadata(&source).await.is_err() {
            error!("{} not found in bucket {}", RAW_OBJECT_KEY, self.bucket);
            return Err(PipelineError::ObjectNotFound {
                bucket: self.bucket.clone(),
                key: RAW_OBJECT_KEY.to_string(),
            });
        }
        fs::create_dir_all(dest_dir).await?;
        let target = dest_dir.join(RAW_OBJECT_KEY);
        fs::copy(&source, &target).await?;
        info!("Raw data downloaded from bucket {} to {}", self.bucket, target.display());
        Ok(target)
    }
}
