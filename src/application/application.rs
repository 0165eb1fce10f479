use std::time::Duration;

use compio::runtime::spawn;
use futures::future::{Either, select};
use futures::pin_mut;
use pollwatch::baseline::{BaselineStore, BaselineStoreError};
use pollwatch::config::{ConfigError, WatchConfig};
use pollwatch::ext::PathDisplayExt;
use pollwatch::filesystem::OsFilesystem;
use pollwatch::poller::{PollOutcome, Poller, PollerCreationError, PollerStreams};
use pollwatch::snapshot::Snapshot;
use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use super::report::{print_events, report_errors};
use crate::application::RuntimeConfig;
use crate::cli::Cli;

pub struct Application;

impl Application {
    pub async fn run(cli: Cli) -> Result<(), ApplicationError> {
        let file_config = WatchConfig::load(cli.config.as_deref())
            .await
            .context(ConfigSnafu)?;
        let config = RuntimeConfig::resolve(cli, file_config);
        debug!("Resolved runtime config: {:?}", config);

        let store = config.state_file.as_ref().map(BaselineStore::new);
        let stored = match &store {
            Some(store) => store.read().await.context(BaselineReadSnafu)?,
            None => None,
        };

        let (mut poller, streams) = Self::create_poller(&config, stored)?;
        let PollerStreams { events, errors } = streams;
        let printer = spawn(print_events(events));
        let reporter = spawn(report_errors(errors));

        info!(
            "Watching {} every {:?}",
            config.root.display_best_effort(),
            config.interval
        );
        Self::poll_loop(&mut poller, config.interval, config.once).await;

        poller.close();
        let _ = printer.await;
        let _ = reporter.await;

        if let (Some(store), Some(baseline)) = (store, poller.into_baseline()) {
            store.write(&baseline).await.context(BaselineWriteSnafu)?;
            info!("Saved baseline to {}", store.path().display_best_effort());
        }

        Ok(())
    }

    fn create_poller(
        config: &RuntimeConfig,
        stored: Option<Snapshot>,
    ) -> Result<(Poller<OsFilesystem>, PollerStreams), ApplicationError> {
        let filesystem = OsFilesystem::new();
        match stored {
            Some(baseline) if baseline.root_path() == config.root => {
                Poller::with_baseline(filesystem, &config.root, baseline)
            }
            Some(baseline) => {
                warn!(
                    "Stored baseline belongs to {}, ignoring it",
                    baseline.root_path().display()
                );
                Poller::new(filesystem, &config.root)
            }
            None => Poller::new(filesystem, &config.root),
        }
        .context(PollerCreationSnafu)
    }

    async fn poll_loop(poller: &mut Poller<OsFilesystem>, interval: Duration, once: bool) {
        let shutdown = compio::signal::ctrl_c();
        pin_mut!(shutdown);

        loop {
            match poller.poll() {
                PollOutcome::Baselined { entries } => info!("Baseline has {} entries", entries),
                PollOutcome::Diffed { events } => debug!("Poll found {} changes", events),
                PollOutcome::Failed => {}
                PollOutcome::Closed => break,
            }
            if once {
                break;
            }

            let tick = compio::time::sleep(interval);
            pin_mut!(tick);
            match select(tick, shutdown.as_mut()).await {
                Either::Left(_) => {}
                Either::Right((result, _)) => {
                    if let Err(error) = result {
                        warn!("Failed to listen for ctrl-c: {}", error);
                    }
                    info!("Shutting down");
                    break;
                }
            }
        }
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered during configuration stage"))]
    ConfigError { source: ConfigError },
    #[snafu(display("Failed to load the stored baseline"))]
    BaselineReadError { source: BaselineStoreError },
    #[snafu(display("Failed to start watching"))]
    PollerCreationError { source: PollerCreationError },
    #[snafu(display("Failed to save the baseline"))]
    BaselineWriteError { source: BaselineStoreError },
}
