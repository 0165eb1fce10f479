use std::path::PathBuf;
use std::time::Duration;

use pollwatch::config::WatchConfig;

use crate::cli::Cli;

const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Settings the application runs with, after merging command line flags over
/// the config file over built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub root: PathBuf,
    pub interval: Duration,
    pub state_file: Option<PathBuf>,
    pub once: bool,
}

impl RuntimeConfig {
    pub fn resolve(cli: Cli, file: WatchConfig) -> Self {
        let root = cli
            .root
            .or(file.root)
            .unwrap_or_else(|| PathBuf::from("."));

        // Stored baselines are matched by root, so make it independent of
        // the working directory when possible
        let root = root.canonicalize().unwrap_or(root);

        Self {
            root,
            interval: cli
                .interval_ms
                .map(Duration::from_millis)
                .or(file.interval)
                .unwrap_or(DEFAULT_INTERVAL),
            state_file: cli.state_file.or(file.state_file),
            once: cli.once,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pollwatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = RuntimeConfig::resolve(cli(&[]), WatchConfig::default());

        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(config.state_file, None);
        assert_eq!(config.root, PathBuf::from(".").canonicalize().unwrap());
        assert!(!config.once);
    }

    #[test]
    fn config_file_fills_unset_flags() {
        let file = WatchConfig {
            root: Some(PathBuf::from("/does/not/exist")),
            interval: Some(Duration::from_millis(50)),
            state_file: Some(PathBuf::from("from-file.bin")),
        };

        let config = RuntimeConfig::resolve(cli(&["--state-file", "from-cli.bin"]), file);

        assert_eq!(config.root, PathBuf::from("/does/not/exist"));
        assert_eq!(config.interval, Duration::from_millis(50));
        assert_eq!(config.state_file, Some(PathBuf::from("from-cli.bin")));
    }

    #[test]
    fn flags_override_the_config_file() {
        let file = WatchConfig {
            root: Some(PathBuf::from("/does/not/exist")),
            interval: Some(Duration::from_millis(50)),
            state_file: None,
        };

        let config = RuntimeConfig::resolve(
            cli(&["/also/missing", "--interval-ms", "75", "--once"]),
            file,
        );

        assert_eq!(config.root, PathBuf::from("/also/missing"));
        assert_eq!(config.interval, Duration::from_millis(75));
        assert!(config.once);
    }
}
