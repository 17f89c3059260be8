//! Dataset downloads with completeness verification.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::config::DatasetConfig;
use crate::dataset::DatasetPaths;
use crate::error::FetchError;

/// Size of the buffer used to stream response bodies to disk.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Downloads dataset files over HTTP(S).
pub struct Fetcher {
    client: reqwest::blocking::Client,
}

impl Fetcher {
    /// Create a fetcher with no overall request timeout.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self { client })
    }

    /// Download `url` to `dest`, returning the number of bytes written.
    ///
    /// The body must match the declared `Content-Length` exactly. On a
    /// verification failure `dest` is left on disk and must not be used.
    pub fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let scheme_ok = reqwest::Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !scheme_ok {
            return Err(FetchError::UnsupportedScheme {
                url: url.to_string(),
            });
        }

        let mut response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status.as_u16()));
        }
        let expected = response.content_length();

        let mut file = File::create(dest)?;
        let written = copy_body(&mut response, &mut file, url)?;
        file.sync_all()?;

        match expected {
            Some(len) if len == written => {
                log::debug!("Fetched {} to {:?}: {} bytes", url, dest, written);
                Ok(written)
            }
            _ => Err(FetchError::IncompleteTransfer { expected, written }),
        }
    }

    /// Make sure both dataset files exist in the storage directory.
    ///
    /// Without `force`, files already on disk are kept as they are. With
    /// `force`, both files are deleted and downloaded again as a pair.
    pub fn check_and_download(&self, config: &DatasetConfig, force: bool) -> Result<(), FetchError> {
        if !config.dir.is_dir() {
            return Err(FetchError::MissingDirectory(config.dir.clone()));
        }

        let paths = DatasetPaths::in_dir(&config.dir);
        if force {
            remove_if_exists(&paths.city)?;
            remove_if_exists(&paths.asn)?;
        }

        self.ensure_file("city", &config.city_url, &paths.city)?;
        self.ensure_file("asn", &config.asn_url, &paths.asn)?;
        Ok(())
    }

    fn ensure_file(&self, role: &str, url: &str, dest: &Path) -> Result<(), FetchError> {
        if dest.exists() {
            log::info!("Using existing {} db at {:?}", role, dest);
            return Ok(());
        }

        match self.fetch(url, dest) {
            Ok(written) => {
                log::info!("Downloaded {} db: {} bytes", role, written);
                Ok(())
            }
            Err(e) => {
                // A partial file would be taken for a valid dataset on the next pass.
                if let Err(rm) = remove_if_exists(dest) {
                    log::warn!("Failed to discard partial {} db {:?}: {}", role, dest, rm);
                }
                Err(e)
            }
        }
    }
}

/// Copy the body in one linear pass and count what reached the file.
///
/// A broken body stream ends the copy; the short count is caught by the
/// length check.
fn copy_body(body: &mut impl Read, file: &mut File, url: &str) -> Result<u64, FetchError> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("Body of {} broke off after {} bytes: {}", url, written, e);
                break;
            }
        };
        file.write_all(&buf[..n])?;
        written += n as u64;
    }
    Ok(written)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
