//! Input resolution: turn a URL list file into conversion jobs.
//!
//! Each non-empty line becomes one [`ConversionJob`] whose output file name
//! is derived from the URL alone, so re-running the same list overwrites the
//! same PDFs instead of accumulating numbered copies.

use crate::error::StartupError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum length of the path-derived part of an output file name.
const MAX_PATH_CHARS: usize = 50;

/// One URL to convert, consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub url: String,
    /// 1-based position in the input list.
    pub sequence_index: usize,
    pub output_path: PathBuf,
}

/// Read a URL list: one URL per line, whitespace trimmed, blank lines dropped.
///
/// # Errors
/// [`StartupError::UrlFileUnreadable`] if the file cannot be read and
/// [`StartupError::NoUrls`] if it contains no URLs.
pub async fn read_url_file(path: &Path) -> Result<Vec<String>, StartupError> {
    let contents =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StartupError::UrlFileUnreadable {
                path: path.to_path_buf(),
                source,
            })?;

    let urls = parse_url_list(&contents);
    if urls.is_empty() {
        return Err(StartupError::NoUrls {
            path: path.to_path_buf(),
        });
    }

    debug!("Read {} URLs from {}", urls.len(), path.display());
    Ok(urls)
}

/// Split a URL list into trimmed, non-empty lines.
pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build one job per URL, numbered from 1, writing into `output_dir`.
pub fn build_jobs(urls: &[String], output_dir: &Path) -> Vec<ConversionJob> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| {
            let sequence_index = i + 1;
            ConversionJob {
                url: url.clone(),
                sequence_index,
                output_path: output_dir.join(safe_filename(url, sequence_index)),
            }
        })
        .collect()
}

/// Derive a file-system-safe PDF name from a URL.
///
/// `<host>_<path>.pdf`, where dots and colons in the host (and port) become
/// underscores and slashes in the path become underscores, the path part
/// capped at 50 characters. The port is kept as written, even when it is the
/// scheme's default. An empty path becomes `page_<index>`. A URL that does
/// not parse, or has no host, becomes `page_<index>.pdf`.
///
/// ```rust
/// use url2pdf::pipeline::input::safe_filename;
///
/// assert_eq!(safe_filename("https://example.com:8080/a/b/c", 3), "example_com_8080_a_b_c.pdf");
/// assert_eq!(safe_filename("not a url", 5), "page_5.pdf");
/// ```
pub fn safe_filename(url: &str, index: usize) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return format!("page_{index}.pdf");
    };
    let Some(host) = parsed.host_str() else {
        return format!("page_{index}.pdf");
    };

    let authority = match written_port(url) {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let domain = authority.replace([':', '.'], "_");

    let path: String = parsed
        .path()
        .trim_start_matches('/')
        .replace('/', "_")
        .chars()
        .take(MAX_PATH_CHARS)
        .collect();
    let path = if path.is_empty() {
        format!("page_{index}")
    } else {
        path
    };

    format!("{domain}_{path}.pdf")
}

/// Port as it appears in the URL text. `Url::port` hides default ports.
fn written_port(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let (_, port) = host_port.rsplit_once(':')?;
    (!port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())).then_some(port)
}
