//! Retrieval of one raw statistics document, from disk or from the
//! nameserver's statistics channel.

use crate::config::{StatisticsFormat, StatsSource};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub enum FetchError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Http {
        url: String,
        source: reqwest::Error,
    },
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    /// The text dump has no statistics-channel endpoint.
    NoChannel(StatisticsFormat),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Read { path, source } => {
                write!(f, "cannot read statistics file {}: {source}", path.display())
            }
            FetchError::Http { url, source } => write!(f, "request to {url} failed: {source}"),
            FetchError::Status { url, status } => write!(f, "{url} returned {status}"),
            FetchError::NoChannel(format) => {
                write!(f, "{format:?} statistics cannot be fetched over HTTP")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Read { source, .. } => Some(source),
            FetchError::Http { source, .. } => Some(source),
            FetchError::Status { .. } | FetchError::NoChannel(_) => None,
        }
    }
}

/// Read the statistics document named by `source`.
pub async fn fetch(
    source: &StatsSource,
    format: StatisticsFormat,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    match source {
        StatsSource::File(path) => {
            tracing::debug!(path = %path.display(), "reading statistics file");
            tokio::fs::read(path).await.map_err(|source| FetchError::Read {
                path: path.clone(),
                source,
            })
        }
        StatsSource::Channel(addr) => fetch_channel(*addr, format, timeout).await,
    }
}

async fn fetch_channel(
    addr: SocketAddr,
    format: StatisticsFormat,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let (path, media_type) = format.channel().ok_or(FetchError::NoChannel(format))?;
    let url = format!("http://{addr}{path}");
    let http_err = |source| FetchError::Http {
        url: url.clone(),
        source,
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(http_err)?;

    tracing::debug!(url = %url, timeout_secs = timeout.as_secs(), "fetching statistics");
    let resp = client
        .get(&url)
        .header(reqwest::header::ACCEPT, media_type)
        .send()
        .await
        .map_err(http_err)?;

    if !resp.status().is_success() {
        return Err(FetchError::Status {
            status: resp.status(),
            url,
        });
    }

    let body = resp.bytes().await.map_err(http_err)?;
    tracing::debug!(bytes = body.len(), "statistics received");
    Ok(body.to_vec())
}
