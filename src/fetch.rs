//! Transport - scoped acquisition of the file to analyze
//!
//! Downloads land in a temporary file that is deleted when the
//! [`FetchedFile`] is dropped, on every exit path of the pipeline.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::request::FileType;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Download failed: {0}")]
    Http(String),

    #[error("I/O error while fetching: {0}")]
    Io(#[from] io::Error),
}

/// A file ready for analysis.
#[derive(Debug)]
pub enum FetchedFile {
    /// Downloaded copy, removed on drop
    Temp(NamedTempFile),
    /// Caller-owned file, left untouched
    Local(PathBuf),
}

impl FetchedFile {
    pub fn path(&self) -> &Path {
        match self {
            Self::Temp(file) => file.path(),
            Self::Local(path) => path,
        }
    }
}

pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, file_type: FileType) -> Result<FetchedFile, FetchError>;
}

/// http(s) via `ureq`; `file://` URLs and bare paths read in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFetcher;

impl DefaultFetcher {
    fn download(&self, url: &str, file_type: FileType) -> Result<FetchedFile, FetchError> {
        let response = ureq::get(url)
            .header("User-Agent", concat!("dfm-core/", env!("CARGO_PKG_VERSION")))
            .call()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let mut file = tempfile::Builder::new()
            .prefix("dfm-")
            .suffix(&format!(".{}", file_type))
            .tempfile()?;
        let mut body = response.into_body().into_reader();
        let bytes = io::copy(&mut body, file.as_file_mut())?;
        debug!(url, bytes, "Downloaded source file");
        Ok(FetchedFile::Temp(file))
    }

    fn local(&self, path: &str) -> Result<FetchedFile, FetchError> {
        let path = PathBuf::from(path);
        // Surface a missing file as a transport failure, not a parse failure
        fs::metadata(&path)?;
        Ok(FetchedFile::Local(path))
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, url: &str, file_type: FileType) -> Result<FetchedFile, FetchError> {
        match url.split_once("://") {
            Some(("http", _)) | Some(("https", _)) => self.download(url, file_type),
            Some(("file", path)) => self.local(path),
            Some((scheme, _)) => Err(FetchError::UnsupportedScheme(scheme.to_string())),
            None => self.local(url),
        }
    }
}
