use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from bind-stats-check.toml.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct CheckConfig {
    pub statistics: StatisticsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub format: StatisticsFormat,
    pub file_path: Option<PathBuf>,
    pub ip: Option<String>,
    /// Kept wider than `u16` so out-of-range ports get a proper message.
    pub port: Option<u32>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub graphite_prefix: String,
    pub skip_zero: bool,
}

/// Which statistics representation to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatisticsFormat {
    /// `named.stats` text dump
    #[default]
    #[serde(alias = "text")]
    #[value(alias = "text")]
    File,
    /// statistics channel XML (v3)
    Xml,
    /// statistics channel JSON (v1)
    Json,
}

impl StatisticsFormat {
    /// Statistics-channel URL path and `Accept` media type, if this format
    /// can be fetched over HTTP.
    pub fn channel(self) -> Option<(&'static str, &'static str)> {
        match self {
            StatisticsFormat::File => None,
            StatisticsFormat::Xml => Some(("/xml/v3", "application/xml")),
            StatisticsFormat::Json => Some(("/json/v1", "application/json")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Graphite,
    Prometheus,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            format: StatisticsFormat::File,
            file_path: None,
            ip: None,
            port: None,
            timeout_secs: 10,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Graphite,
            graphite_prefix: crate::render::graphite::DEFAULT_PREFIX.to_string(),
            skip_zero: false,
        }
    }
}

/// Values given on the command line or through the environment. Anything
/// set here wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub statistics_format: Option<StatisticsFormat>,
    pub file_path: Option<PathBuf>,
    pub ip: Option<String>,
    pub port: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub output_format: Option<OutputFormat>,
    pub graphite_prefix: Option<String>,
    pub skip_zero: bool,
}

/// Where the statistics document comes from once arguments are validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsSource {
    File(PathBuf),
    Channel(SocketAddr),
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    MissingFilePath,
    UnreadableFile {
        path: PathBuf,
        source: std::io::Error,
    },
    MissingAddress,
    InvalidIp(String),
    InvalidPort(u32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {source}", path.display())
            }
            ConfigError::MissingFilePath => {
                write!(f, "a statistics file path is required for the file format")
            }
            ConfigError::UnreadableFile { path, source } => {
                write!(f, "statistics file {} is not readable: {source}", path.display())
            }
            ConfigError::MissingAddress => write!(
                f,
                "a statistics channel IP and port (or a statistics file path) are required"
            ),
            ConfigError::InvalidIp(ip) => write!(f, "invalid statistics IP address: {ip:?}"),
            ConfigError::InvalidPort(port) => {
                write!(f, "invalid statistics port {port}: must be 1-65535")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::UnreadableFile { source, .. } => Some(source),
            ConfigError::MissingFilePath
            | ConfigError::MissingAddress
            | ConfigError::InvalidIp(_)
            | ConfigError::InvalidPort(_) => None,
        }
    }
}

/// Load the config file. A missing file is not an error.
pub fn load_config(path: &Path) -> Result<CheckConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(CheckConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl CheckConfig {
    /// Apply command-line/environment values on top of the file values.
    pub fn merge(mut self, overrides: Overrides) -> Self {
        let stats = &mut self.statistics;
        if let Some(format) = overrides.statistics_format {
            stats.format = format;
        }
        if overrides.file_path.is_some() {
            stats.file_path = overrides.file_path;
        }
        if overrides.ip.is_some() {
            stats.ip = overrides.ip;
        }
        if overrides.port.is_some() {
            stats.port = overrides.port;
        }
        if let Some(timeout) = overrides.timeout_secs {
            stats.timeout_secs = timeout;
        }

        let output = &mut self.output;
        if let Some(format) = overrides.output_format {
            output.format = format;
        }
        if let Some(prefix) = overrides.graphite_prefix {
            output.graphite_prefix = prefix;
        }
        output.skip_zero |= overrides.skip_zero;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.statistics.timeout_secs)
    }

    /// Check the arguments for the selected format and decide where the
    /// document will be read from.
    pub fn validate(&self) -> Result<StatsSource, ConfigError> {
        let stats = &self.statistics;
        if let Some(path) = &stats.file_path {
            check_readable(path)?;
            return Ok(StatsSource::File(path.clone()));
        }
        if stats.format == StatisticsFormat::File {
            return Err(ConfigError::MissingFilePath);
        }

        let (Some(ip), Some(port)) = (stats.ip.as_deref(), stats.port) else {
            return Err(ConfigError::MissingAddress);
        };
        let ip: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidIp(ip.to_string()))?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(ConfigError::InvalidPort(port))?;
        Ok(StatsSource::Channel(SocketAddr::new(ip, port)))
    }
}

fn check_readable(path: &Path) -> Result<(), ConfigError> {
    let unreadable = |source| ConfigError::UnreadableFile {
        path: path.to_path_buf(),
        source,
    };
    let meta = std::fs::metadata(path).map_err(unreadable)?;
    if meta.is_dir() {
        return Err(unreadable(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "is a directory",
        )));
    }
    std::fs::File::open(path).map_err(unreadable)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(format: StatisticsFormat, ip: &str, port: u32) -> CheckConfig {
        CheckConfig {
            statistics: StatisticsConfig {
                format,
                ip: Some(ip.to_string()),
                port: Some(port),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let config = CheckConfig::default();
        assert_eq!(config.statistics.format, StatisticsFormat::File);
        assert_eq!(config.statistics.timeout_secs, 10);
        assert_eq!(config.output.format, OutputFormat::Graphite);
        assert_eq!(config.output.graphite_prefix, "bind.dns");
        assert!(!config.output.skip_zero);
    }

    #[test]
    fn full_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bind-stats-check.toml");
        std::fs::write(
            &path,
            r#"
[statistics]
format = "json"
ip = "127.0.0.1"
port = 8053
timeout_secs = 3

[output]
format = "prometheus"
graphite_prefix = "dns.ns1"
skip_zero = true
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.statistics.format, StatisticsFormat::Json);
        assert_eq!(config.statistics.port, Some(8053));
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.output.format, OutputFormat::Prometheus);
        assert_eq!(config.output.graphite_prefix, "dns.ns1");
        assert!(config.output.skip_zero);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: CheckConfig = toml::from_str("[output]\nskip_zero = true\n").unwrap();
        assert!(config.output.skip_zero);
        assert_eq!(config.output.graphite_prefix, "bind.dns");
        assert_eq!(config.statistics, StatisticsConfig::default());
    }

    #[test]
    fn text_is_an_alias_for_file() {
        let config: CheckConfig = toml::from_str("[statistics]\nformat = \"text\"\n").unwrap();
        assert_eq!(config.statistics.format, StatisticsFormat::File);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, CheckConfig::default());
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[statistics]\nformat = \"yaml\"\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let file = channel(StatisticsFormat::Xml, "10.0.0.1", 8053);
        let merged = file.merge(Overrides {
            ip: Some("127.0.0.1".into()),
            output_format: Some(OutputFormat::Prometheus),
            skip_zero: true,
            ..Default::default()
        });
        assert_eq!(merged.statistics.ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(merged.statistics.port, Some(8053));
        assert_eq!(merged.statistics.format, StatisticsFormat::Xml);
        assert_eq!(merged.output.format, OutputFormat::Prometheus);
        assert!(merged.output.skip_zero);
    }

    #[test]
    fn file_format_requires_readable_path() {
        let config = CheckConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingFilePath)));

        let dir = tempfile::tempdir().unwrap();
        let mut config = CheckConfig::default();
        config.statistics.file_path = Some(dir.path().join("named.stats"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnreadableFile { .. })
        ));

        config.statistics.file_path = Some(dir.path().to_path_buf());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnreadableFile { .. })
        ));

        let path = dir.path().join("named.stats");
        std::fs::write(&path, "").unwrap();
        config.statistics.file_path = Some(path.clone());
        assert_eq!(config.validate().unwrap(), StatsSource::File(path));
    }

    #[test]
    fn channel_formats_require_ip_and_port() {
        let addr = channel(StatisticsFormat::Json, "127.0.0.1", 8053)
            .validate()
            .unwrap();
        assert_eq!(
            addr,
            StatsSource::Channel("127.0.0.1:8053".parse().unwrap())
        );

        let v6 = channel(StatisticsFormat::Xml, "::1", 80).validate().unwrap();
        assert_eq!(v6, StatsSource::Channel("[::1]:80".parse().unwrap()));

        let mut missing = CheckConfig::default();
        missing.statistics.format = StatisticsFormat::Xml;
        assert!(matches!(missing.validate(), Err(ConfigError::MissingAddress)));
    }

    #[test]
    fn bad_ip_and_ports_are_rejected() {
        assert!(matches!(
            channel(StatisticsFormat::Xml, "localhost", 8053).validate(),
            Err(ConfigError::InvalidIp(_))
        ));
        assert!(matches!(
            channel(StatisticsFormat::Xml, "127.0.0.1", 0).validate(),
            Err(ConfigError::InvalidPort(0))
        ));
        assert!(matches!(
            channel(StatisticsFormat::Json, "127.0.0.1", 65_536).validate(),
            Err(ConfigError::InvalidPort(65_536))
        ));
    }

    #[test]
    fn channel_paths() {
        assert_eq!(StatisticsFormat::File.channel(), None);
        assert_eq!(
            StatisticsFormat::Xml.channel(),
            Some(("/xml/v3", "application/xml"))
        );
        assert_eq!(
            StatisticsFormat::Json.channel(),
            Some(("/json/v1", "application/json"))
        );
    }
}
