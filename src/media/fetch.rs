use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::foundation::error::{ClipforgeError, ClipforgeResult};

#[async_trait]
/// Loads the bytes behind a literal locator (prompt references, SRT caption files).
pub trait SourceFetcher: Send + Sync {
    /// Fetch `locator`. Failures are reported as resolution errors.
    async fn fetch(&self, locator: &str) -> ClipforgeResult<Vec<u8>>;

    /// Check that the media behind a literal `src` exists and return the location to reference
    /// it by. The default reads the whole source.
    async fn locate(&self, locator: &str) -> ClipforgeResult<String> {
        self.fetch(locator).await?;
        Ok(locator.to_string())
    }
}

/// Whether `locator` looks like a remote URL rather than a filesystem path.
pub fn is_remote(locator: &str) -> bool {
    let lower = locator.trim_start().to_ascii_lowercase();
    ["http://", "https://", "s3://", "gs://", "data:"]
        .iter()
        .any(|p| lower.starts_with(p))
}

#[derive(Clone, Debug, Default)]
/// Reads local paths with `tokio::fs`; relative paths resolve against an optional root.
pub struct LocalFetcher {
    root: Option<PathBuf>,
}

impl LocalFetcher {
    /// Fetcher resolving relative paths against the process working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetcher resolving relative paths against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn path_for(&self, locator: &str) -> PathBuf {
        let locator = locator.strip_prefix("file://").unwrap_or(locator);
        let p = Path::new(locator);
        match &self.root {
            Some(root) if p.is_relative() => root.join(p),
            _ => p.to_path_buf(),
        }
    }
}

#[async_trait]
impl SourceFetcher for LocalFetcher {
    async fn fetch(&self, locator: &str) -> ClipforgeResult<Vec<u8>> {
        if locator.trim().is_empty() {
            return Err(ClipforgeError::resolution("source locator must be non-empty"));
        }
        if is_remote(locator) {
            return Err(ClipforgeError::resolution(format!(
                "remote source '{locator}' is not supported by the local fetcher"
            )));
        }
        let path = self.path_for(locator);
        tokio::fs::read(&path).await.map_err(|e| {
            ClipforgeError::resolution(format!("read source '{}': {e}", path.display()))
        })
    }

    /// Remote locators are referenced as given; local files must exist and are referenced by
    /// their absolute path.
    async fn locate(&self, locator: &str) -> ClipforgeResult<String> {
        if locator.trim().is_empty() {
            return Err(ClipforgeError::resolution("source locator must be non-empty"));
        }
        if is_remote(locator) {
            return Ok(locator.to_string());
        }
        let path = self.path_for(locator);
        let meta = tokio::fs::metadata(&path).await.map_err(|e| {
            ClipforgeError::resolution(format!("source '{}': {e}", path.display()))
        })?;
        if !meta.is_file() {
            return Err(ClipforgeError::resolution(format!(
                "source '{}' is not a file",
                path.display()
            )));
        }
        let path = std::path::absolute(&path).unwrap_or(path);
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/fetch.rs"]
mod tests;
