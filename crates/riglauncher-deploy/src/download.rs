use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::CONNECTION;
use tracing::debug;

use riglauncher_core::{parse_release_feed, LauncherError, ProgressSink, ReleaseCatalog,
    RepositorySlug};

const CHUNK_SIZE: usize = 8192;
const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking HTTP client with the bounded per-request timeout every network
/// operation in the pipeline uses.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(NETWORK_TIMEOUT)
        .build()
        .context("failed to construct HTTP client")
}

/// Fetches and parses the release feed of a repository.
pub fn fetch_release_feed(client: &Client, slug: &RepositorySlug) -> Result<ReleaseCatalog> {
    fetch_release_feed_at(client, &slug.releases_url())
}

pub(crate) fn fetch_release_feed_at(client: &Client, url: &str) -> Result<ReleaseCatalog> {
    debug!(%url, "fetching release feed");
    let response = client
        .get(url)
        .header(CONNECTION, "close")
        .send()
        .map_err(|err| LauncherError::FeedUnreachable(format!("{url}: {err}")))?;
    if !response.status().is_success() {
        return Err(
            LauncherError::FeedUnreachable(format!("{url}: status {}", response.status())).into(),
        );
    }
    let body = response
        .text()
        .map_err(|err| LauncherError::FeedUnreachable(format!("{url}: {err}")))?;
    Ok(parse_release_feed(&body))
}

/// Streams a release archive to `destination` in fixed-size chunks,
/// reporting progress after each chunk. Returns the byte count written.
///
/// A response without a content length is rejected; progress reporting and
/// the truncation check both need the expected size up front.
pub fn download_archive(
    client: &Client,
    url: &str,
    destination: &Path,
    sink: &mut dyn ProgressSink,
) -> Result<u64> {
    debug!(%url, destination = %destination.display(), "downloading archive");
    let mut response = client
        .get(url)
        .header(CONNECTION, "close")
        .send()
        .with_context(|| format!("request failed: {url}"))?;
    if !response.status().is_success() {
        return Err(anyhow!("{url}: status {}", response.status()));
    }
    let total_size = response
        .content_length()
        .ok_or_else(|| anyhow!("{url}: server did not announce a content length"))?;

    let mut file = File::create(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut bytes_so_far = 0u64;
    loop {
        let read = response
            .read(&mut buffer)
            .with_context(|| format!("read failed mid-download: {url}"))?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .with_context(|| format!("failed writing to {}", destination.display()))?;
        bytes_so_far += read as u64;
        sink.download_progress(bytes_so_far, total_size);
    }

    if bytes_so_far != total_size {
        return Err(anyhow!(
            "{url}: truncated download, got {bytes_so_far} of {total_size} bytes"
        ));
    }
    Ok(bytes_so_far)
}
