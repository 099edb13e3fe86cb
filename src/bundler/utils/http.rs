//! HTTP utilities for fetching remote runtime bundles.
//!
//! Runtime bundles are read twice, so a remote one is first downloaded into
//! a staging directory. The local file name comes from the response's
//! `Content-Disposition` header when present, else from the last segment of
//! the URL.

use crate::bundler::error::{Error, ErrorExt, Result};
use reqwest::header::CONTENT_DISPOSITION;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

/// Builds the HTTP client used for downloads.
pub fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Downloads `url` into `dir` and returns the path of the downloaded file.
///
/// The body is streamed to `<name>.part` and renamed once complete. Any
/// transport failure or non-success status is an [`Error::Network`].
pub async fn download_to(client: &reqwest::Client, url: &Url, dir: &Path) -> Result<PathBuf> {
    log::info!("Downloading {}", url);
    let network = |reason: String| Error::Network {
        url: url.to_string(),
        reason,
    };

    let mut response = client
        .get(url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| network(e.to_string()))?;

    let name = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(file_name_from_content_disposition)
        .or_else(|| file_name_from_url(url))
        .ok_or_else(|| network("can't determine a file name for the download".to_string()))?;

    tokio::fs::create_dir_all(dir)
        .await
        .fs_context("creating staging directory", dir)?;
    let dest = dir.join(&name);
    let partial = dir.join(format!("{name}.part"));

    let mut file = tokio::fs::File::create(&partial)
        .await
        .fs_context("creating", &partial)?;
    let mut received: u64 = 0;
    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(network(e.to_string()));
            }
        };
        file.write_all(&chunk).await.fs_context("writing", &partial)?;
        received += chunk.len() as u64;
    }
    file.flush().await.fs_context("writing", &partial)?;
    drop(file);

    tokio::fs::rename(&partial, &dest)
        .await
        .fs_context("renaming download to", &dest)?;
    log::debug!("Downloaded {} bytes to {}", received, dest.display());
    Ok(dest)
}

/// Extracts the file name from a `Content-Disposition` header value.
///
/// `filename*` (RFC 5987, percent-encoded) wins over `filename`. Directory
/// components are dropped.
pub fn file_name_from_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let raw = raw.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'value
                let encoded = raw.splitn(3, '\'').nth(2).unwrap_or(raw);
                if let Some(name) = percent_decode(encoded.trim_matches('"')).and_then(sanitize) {
                    return Some(name);
                }
            }
            "filename" => plain = sanitize(raw.trim_matches('"').to_string()),
            _ => {}
        }
    }

    plain
}

/// Last non-empty path segment of `url`, percent-decoded.
pub fn file_name_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .and_then(percent_decode)
        .and_then(sanitize)
}

fn percent_decode(input: &str) -> Option<String> {
    let hex = |byte: u8| (byte as char).to_digit(16).map(|digit| digit as u8);
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(high << 4 | low);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).ok()
}

fn sanitize(name: String) -> Option<String> {
    let leaf = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match leaf {
        "" | "." | ".." => None,
        leaf => Some(leaf.to_string()),
    }
}
