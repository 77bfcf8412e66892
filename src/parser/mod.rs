//! Statistics parsers: turn one raw statistics document into a flat,
//! parse-ordered list of tagged metrics.

pub mod json;
pub mod text;
pub mod xml;

use crate::config::StatisticsFormat;
use crate::metric::Metric;
use chrono::{DateTime, Utc};

/// Fatal errors for a single parse pass. Any of these aborts the whole
/// document; callers never see partial metrics.
#[derive(Debug)]
pub enum ParseError {
    /// The document is not valid UTF-8.
    Encoding(std::str::Utf8Error),
    /// XML syntax error or truncated document.
    Xml(quick_xml::DeError),
    /// JSON syntax error or truncated document.
    Json(serde_json::Error),
    /// The document carries no snapshot time.
    MissingTimestamp,
    /// The snapshot time is present but cannot be interpreted.
    InvalidTimestamp(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Encoding(e) => write!(f, "statistics are not valid UTF-8: {e}"),
            ParseError::Xml(e) => write!(f, "error parsing XML statistics: {e}"),
            ParseError::Json(e) => write!(f, "error parsing JSON statistics: {e}"),
            ParseError::MissingTimestamp => {
                write!(f, "statistics document has no current time")
            }
            ParseError::InvalidTimestamp(raw) => {
                write!(f, "invalid statistics current time: {raw:?}")
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Encoding(e) => Some(e),
            ParseError::Xml(e) => Some(e),
            ParseError::Json(e) => Some(e),
            ParseError::MissingTimestamp | ParseError::InvalidTimestamp(_) => None,
        }
    }
}

/// Parse a statistics document of the given format.
pub fn parse(format: StatisticsFormat, data: &[u8]) -> Result<Vec<Metric>, ParseError> {
    let metrics = match format {
        StatisticsFormat::File => text::parse(data)?,
        StatisticsFormat::Xml => xml::parse(data)?,
        StatisticsFormat::Json => json::parse(data)?,
    };
    tracing::debug!(?format, metrics = metrics.len(), "parsed statistics");
    Ok(metrics)
}

/// Parse an RFC 3339 snapshot time such as `2024-05-02T09:14:07.312Z`.
fn parse_snapshot_time(raw: Option<&str>) -> Result<DateTime<Utc>, ParseError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let raw = raw.ok_or(ParseError::MissingTimestamp)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidTimestamp(raw.to_string()))
}

/// Integer value of a leaf's text. Empty or non-numeric text counts as zero.
fn leaf_value(text: Option<&str>) -> i64 {
    text.and_then(|t| t.trim().parse().ok()).unwrap_or(0)
}
