//! One check run: fetch a statistics snapshot, flatten it, render it.

use crate::config::{CheckConfig, ConfigError};
use crate::fetch::{fetch, FetchError};
use crate::metric::Metric;
use crate::parser::{self, ParseError};
use crate::render::renderer_for;

/// Check-plugin result state, mapped to the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Ok,
    Critical,
    Unknown,
}

impl CheckState {
    pub fn exit_code(self) -> u8 {
        match self {
            CheckState::Ok => 0,
            CheckState::Critical => 2,
            CheckState::Unknown => 3,
        }
    }
}

impl std::fmt::Display for CheckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckState::Ok => write!(f, "OK"),
            CheckState::Critical => write!(f, "CRITICAL"),
            CheckState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug)]
pub enum CheckError {
    Config(ConfigError),
    Fetch(FetchError),
    Parse(ParseError),
}

impl CheckError {
    pub fn state(&self) -> CheckState {
        match self {
            CheckError::Config(_) => CheckState::Unknown,
            CheckError::Fetch(_) | CheckError::Parse(_) => CheckState::Critical,
        }
    }
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::Config(e) => write!(f, "{e}"),
            CheckError::Fetch(e) => write!(f, "{e}"),
            CheckError::Parse(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckError::Config(e) => Some(e),
            CheckError::Fetch(e) => Some(e),
            CheckError::Parse(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CheckError {
    fn from(e: ConfigError) -> Self {
        CheckError::Config(e)
    }
}

impl From<FetchError> for CheckError {
    fn from(e: FetchError) -> Self {
        CheckError::Fetch(e)
    }
}

impl From<ParseError> for CheckError {
    fn from(e: ParseError) -> Self {
        CheckError::Parse(e)
    }
}

/// Validate arguments, fetch the document and return the output lines.
pub async fn run(config: &CheckConfig) -> Result<Vec<String>, CheckError> {
    let source = config.validate()?;
    let data = fetch(&source, config.statistics.format, config.timeout()).await?;
    Ok(render_document(config, &data)?)
}

/// Parse an already-fetched document and render it. Nothing is rendered if
/// the parse fails.
pub fn render_document(config: &CheckConfig, data: &[u8]) -> Result<Vec<String>, ParseError> {
    let mut metrics = parser::parse(config.statistics.format, data)?;
    if config.output.skip_zero {
        drop_zeros(&mut metrics);
    }

    let renderer = renderer_for(config.output.format, &config.output.graphite_prefix);
    let lines = renderer.render(&metrics);
    tracing::debug!(
        renderer = renderer.name(),
        metrics = metrics.len(),
        lines = lines.len(),
        "rendered statistics"
    );
    Ok(lines)
}

fn drop_zeros(metrics: &mut Vec<Metric>) {
    metrics.retain(|m| {
        if m.value == 0 {
            tracing::trace!(metric = %m, "skipping zero value");
        }
        m.value != 0
    });
}
