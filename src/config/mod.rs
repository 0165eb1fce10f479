mod watch_config;

pub use watch_config::{ConfigError, DEFAULT_CONFIG_FILE_NAME, WatchConfig};
