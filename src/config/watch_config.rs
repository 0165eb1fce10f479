use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::debug;

use crate::ext::{AsyncTryFrom, PathDisplayExt};

pub const DEFAULT_CONFIG_FILE_NAME: &str = "pollwatch.yaml";

/// Settings read from a `pollwatch.yaml` file. Every key is optional; unset
/// keys fall back to command line flags or built-in defaults.
///
/// ```yaml
/// root: ./shared
/// interval_ms: 2000
/// state_file: .pollwatch/baseline.bin.zst
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchConfig {
    pub root: Option<PathBuf>,
    pub interval: Option<Duration>,
    pub state_file: Option<PathBuf>,
}

impl WatchConfig {
    /// Loads `explicit` if given, which then has to exist. Otherwise the
    /// default file in the working directory is used when present.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::async_try_from(path).await;
        }

        let default_path = Path::new(DEFAULT_CONFIG_FILE_NAME);
        match Self::async_try_from(default_path).await {
            Err(ConfigError::ReadError { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE_NAME);
                Ok(Self::default())
            }
            other => other,
        }
    }

    fn parse_top_level(top_level: &LinkedHashMap<Yaml, Yaml>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (key, value) in top_level.iter() {
            let Some(key) = key.as_str() else {
                debug!("Skipping non-string config key: {:?}", key);
                continue;
            };

            match key {
                "root" => config.root = string_value(key, value)?.map(PathBuf::from),
                "state_file" => config.state_file = string_value(key, value)?.map(PathBuf::from),
                "interval_ms" => config.interval = interval_value(value)?,
                other => debug!("Ignoring unknown config key '{}'", other),
            }
        }

        Ok(config)
    }
}

fn string_value(key: &str, value: &Yaml) -> Result<Option<String>, ConfigError> {
    match value {
        Yaml::Value(Scalar::String(text)) => Ok(Some(text.to_string())),
        Yaml::Value(Scalar::Null) => Ok(None),
        _ => InvalidValueSnafu {
            key,
            expected: "a string",
        }
        .fail(),
    }
}

fn interval_value(value: &Yaml) -> Result<Option<Duration>, ConfigError> {
    match value {
        Yaml::Value(Scalar::Integer(millis)) => {
            ensure!(*millis > 0, InvalidIntervalSnafu { value: *millis });
            Ok(Some(Duration::from_millis(millis.unsigned_abs())))
        }
        Yaml::Value(Scalar::Null) => Ok(None),
        _ => InvalidValueSnafu {
            key: "interval_ms",
            expected: "a positive integer",
        }
        .fail(),
    }
}

impl TryFrom<&str> for WatchConfig {
    type Error = ConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;

        // An empty file configures nothing
        let Some(document) = documents.first() else {
            return Ok(Self::default());
        };
        if matches!(document, Yaml::Value(Scalar::Null)) {
            return Ok(Self::default());
        }

        let top_level = document.as_mapping().context(TopLevelNotMapSnafu)?;
        Self::parse_top_level(top_level)
    }
}

impl AsyncTryFrom<&Path> for WatchConfig {
    type Error = ConfigError;

    async fn async_try_from(path: &Path) -> Result<Self, Self::Error> {
        debug!("Reading config file {}", path.display_best_effort());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.display_best_effort(),
        })?;
        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.display_best_effort(),
        })?;

        let config = Self::try_from(contents.as_str())?;
        debug!("Loaded config: {:?}", config);
        Ok(config)
    }
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: io::Error,
    },
    #[snafu(display("Config file {} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Config key '{}' should be {}", key, expected))]
    InvalidValue { key: String, expected: &'static str },
    #[snafu(display("interval_ms must be positive, got {}", value))]
    InvalidInterval { value: i64 },
}
