use crate::types::{LakeError, LakeResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Blocking HTTP downloader for processed product archives.
///
/// The remote service hands back plain HTTPS URLs for finished products;
/// everything upstream of that (search, job submission, polling) is out
/// of this crate's hands.
pub struct ProductDownloader {
    client: reqwest::blocking::Client,
}

impl ProductDownloader {
    pub fn new() -> LakeResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LakeError::Download(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client })
    }

    /// Download one product archive into `output_dir`.
    ///
    /// Archives already present on disk are not fetched again, so an
    /// interrupted batch can be rerun without re-downloading.
    pub fn download(&self, url: &str, output_dir: &Path) -> LakeResult<PathBuf> {
        let file_name = archive_name_from_url(url)?;
        let output_path = output_dir.join(&file_name);

        if output_path.exists() {
            log::info!("{} already downloaded, skipping", file_name);
            return Ok(output_path);
        }

        fs::create_dir_all(output_dir)?;
        log::info!("Downloading {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| LakeError::Download(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(LakeError::Download(format!(
                "HTTP request for {} failed with status {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| LakeError::Download(format!("failed to read response body: {}", e)))?;

        fs::write(&output_path, &bytes)?;
        log::info!(
            "Saved {} ({} bytes) to {}",
            file_name,
            bytes.len(),
            output_path.display()
        );

        Ok(output_path)
    }

    /// Download every URL, skipping products that fail.
    ///
    /// A failed download is logged and dropped; the remaining products
    /// are still fetched.
    pub fn download_all(&self, urls: &[String], output_dir: &Path) -> Vec<PathBuf> {
        let mut archives = Vec::new();
        for url in urls {
            match self.download(url, output_dir) {
                Ok(path) => archives.push(path),
                Err(e) => log::warn!("Skipping {}: {}", url, e),
            }
        }
        archives
    }
}

/// File name of the archive a product URL points at
fn archive_name_from_url(url: &str) -> LakeResult<String> {
    let without_query = url.split(|c| c == '?' || c == '#').next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| LakeError::Download(format!("cannot derive file name from URL: {}", url)))
}
