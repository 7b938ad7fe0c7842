use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use url::Url;

/// Retrieves the archive named by a package source URL to a local path on
/// disk. One implementation per supported scheme; `fetch_package` dispatches
/// on `Url::scheme()`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, destination_dir: &Path) -> Result<PathBuf>;
}

/// `file://` — the archive is already on the local filesystem.
pub struct LocalFetcher {
    path: PathBuf,
}

impl LocalFetcher {
    pub fn new(path: PathBuf) -> Self {
        LocalFetcher { path }
    }
}

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn fetch(&self, _destination_dir: &Path) -> Result<PathBuf> {
        if !self.path.exists() {
            return Err(anyhow!("package source not found: {}", self.path.display()));
        }
        Ok(self.path.clone())
    }
}

/// `s3://bucket/key` — downloaded into `destination_dir` before extraction.
pub struct S3Fetcher {
    bucket: String,
    key: String,
}

impl S3Fetcher {
    pub fn new(bucket: String, key: String) -> Self {
        S3Fetcher { bucket, key }
    }
}

#[async_trait]
impl Fetcher for S3Fetcher {
    async fn fetch(&self, destination_dir: &Path) -> Result<PathBuf> {
        let sdk_config = aws_config::load_from_env().await;
        let client = aws_sdk_s3::Client::new(&sdk_config);

        let object = client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .with_context(|| format!("failed to fetch s3://{}/{}", self.bucket, self.key))?;

        let bytes = object
            .body
            .collect()
            .await
            .context("failed to read s3 object body")?
            .into_bytes();

        let file_name = self
            .key
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("package.tar.gz");
        let destination = destination_dir.join(file_name);
        tokio::fs::write(&destination, &bytes)
            .await
            .with_context(|| format!("failed to write downloaded package to {}", destination.display()))?;

        Ok(destination)
    }
}

/// Parse `source` and build the matching `Fetcher`. Only `file://` and
/// `s3://` are recognized, per the package format contract.
pub fn fetcher_for(source: &str) -> Result<Box<dyn Fetcher>> {
    let url = Url::parse(source).with_context(|| format!("invalid package source: {source}"))?;
    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| anyhow!("invalid file:// source: {source}"))?;
            Ok(Box::new(LocalFetcher::new(path)))
        }
        "s3" => {
            let bucket = url
                .host_str()
                .ok_or_else(|| anyhow!("s3:// source is missing a bucket: {source}"))?
                .to_string();
            let key = url.path().trim_start_matches('/').to_string();
            if key.is_empty() {
                return Err(anyhow!("s3:// source is missing a key: {source}"));
            }
            Ok(Box::new(S3Fetcher::new(bucket, key)))
        }
        other => Err(anyhow!(
            "unsupported package source scheme {other:?}, expected file:// or s3://"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_scheme_resolves_to_local_fetcher() {
        let fetcher = fetcher_for("file:///tmp/pkg.tar.gz");
        assert!(fetcher.is_ok());
    }

    #[test]
    fn s3_scheme_requires_bucket_and_key() {
        assert!(fetcher_for("s3://").is_err());
        assert!(fetcher_for("s3://bucket").is_err());
        assert!(fetcher_for("s3://bucket/key/to/pkg.tar.gz").is_ok());
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(fetcher_for("https://example.com/pkg.tar.gz").is_err());
    }
}
