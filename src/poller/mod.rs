//! Repeatedly snapshotting a root and streaming what changed.
//!
//! The [`Poller`] owns the baseline snapshot. Each [`Poller::poll`] captures a
//! fresh snapshot, diffs it against the baseline and pushes the events (or the
//! capture error) to two independent streams, then replaces the baseline.
//!
//! Both streams are unbounded: a cycle never blocks on a slow consumer and no
//! event is ever dropped, so memory grows for as long as a consumer lags.

use std::path::{Path, PathBuf};

use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info};

use crate::diff::{DiffEvent, diff_with};
use crate::ext::PathDisplayExt;
use crate::filesystem::{Filesystem, FilesystemError};
use crate::snapshot::{Snapshot, stat_root};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// No snapshot has been taken yet.
    Uninitialized,
    Baselined,
}

/// What a single [`Poller::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// First successful capture, stored as the baseline without emitting events.
    Baselined { entries: usize },
    /// The baseline was diffed against a fresh capture.
    Diffed { events: usize },
    /// The capture failed; the error went to the error stream.
    Failed,
    /// The poller was closed before this call.
    Closed,
}

/// Receiving ends of a poller's outputs.
pub struct PollerStreams {
    pub events: UnboundedReceiver<DiffEvent>,
    pub errors: UnboundedReceiver<FilesystemError>,
}

struct Outputs {
    events: UnboundedSender<DiffEvent>,
    errors: UnboundedSender<FilesystemError>,
}

pub struct Poller<F> {
    filesystem: F,
    root: PathBuf,
    baseline: Option<Snapshot>,
    outputs: Option<Outputs>,
}

impl<F: Filesystem> Poller<F> {
    /// Creates an uninitialized poller; the first [`poll`](Self::poll) only
    /// establishes the baseline.
    pub fn new(
        filesystem: F,
        root: impl Into<PathBuf>,
    ) -> Result<(Self, PollerStreams), PollerCreationError> {
        Self::create(filesystem, root.into(), None)
    }

    /// Creates a poller that resumes from a previously captured baseline.
    pub fn with_baseline(
        filesystem: F,
        root: impl Into<PathBuf>,
        baseline: Snapshot,
    ) -> Result<(Self, PollerStreams), PollerCreationError> {
        let root = root.into();
        ensure!(
            baseline.root_path() == root,
            BaselineRootMismatchSnafu {
                expected: root.clone(),
                found: baseline.root_path().to_path_buf(),
            }
        );
        Self::create(filesystem, root, Some(baseline))
    }

    fn create(
        filesystem: F,
        root: PathBuf,
        baseline: Option<Snapshot>,
    ) -> Result<(Self, PollerStreams), PollerCreationError> {
        stat_root(&filesystem, &root).context(RootUnavailableSnafu)?;

        let (events_tx, events_rx) = mpsc::unbounded();
        let (errors_tx, errors_rx) = mpsc::unbounded();

        debug!(
            "Created poller for {} ({})",
            root.display_best_effort(),
            if baseline.is_some() {
                "resuming from stored baseline"
            } else {
                "no baseline yet"
            }
        );

        let poller = Self {
            filesystem,
            root,
            baseline,
            outputs: Some(Outputs {
                events: events_tx,
                errors: errors_tx,
            }),
        };
        let streams = PollerStreams {
            events: events_rx,
            errors: errors_rx,
        };

        Ok((poller, streams))
    }

    /// Runs one capture-and-diff cycle.
    ///
    /// Taking `&mut self` serializes cycles: two polls on the same poller can
    /// never overlap.
    pub fn poll(&mut self) -> PollOutcome {
        let Some(outputs) = &self.outputs else {
            debug!("Ignoring poll on closed poller for {}", self.root.display());
            return PollOutcome::Closed;
        };

        let next = match Snapshot::capture(&self.filesystem, &self.root) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                info!(
                    "Poll of {} failed, keeping previous baseline: {}",
                    self.root.display(),
                    error
                );
                if outputs.errors.unbounded_send(error).is_err() {
                    debug!("Error stream receiver is gone, dropping error");
                }
                return PollOutcome::Failed;
            }
        };

        let Some(baseline) = self.baseline.as_ref() else {
            let entries = next.len() - 1;
            info!(
                "Established baseline for {} with {} entries",
                self.root.display(),
                entries
            );
            self.baseline = Some(next);
            return PollOutcome::Baselined { entries };
        };

        let mut events = 0;
        let mut receiver_gone = false;
        diff_with(Some(baseline), &next, |event| {
            events += 1;
            if outputs.events.unbounded_send(event).is_err() {
                receiver_gone = true;
            }
        });
        if receiver_gone {
            debug!("Event stream receiver is gone, events of this cycle were dropped");
        }

        if events > 0 {
            info!("Detected {} changes under {}", events, self.root.display());
        } else {
            debug!("No changes under {}", self.root.display());
        }

        self.baseline = Some(next);
        PollOutcome::Diffed { events }
    }

    /// Ends both output streams. Consumers still receive everything that was
    /// already sent. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.outputs.take().is_some() {
            debug!("Closed poller for {}", self.root.display());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outputs.is_none()
    }

    pub fn state(&self) -> PollerState {
        match self.baseline {
            Some(_) => PollerState::Baselined,
            None => PollerState::Uninitialized,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn baseline(&self) -> Option<&Snapshot> {
        self.baseline.as_ref()
    }

    pub fn into_baseline(self) -> Option<Snapshot> {
        self.baseline
    }
}

#[derive(Debug, Snafu)]
pub enum PollerCreationError {
    #[snafu(display("Cannot watch the requested root"))]
    RootUnavailable { source: FilesystemError },
    #[snafu(display(
        "Stored baseline was captured from {} but the poller watches {}",
        found.display_best_effort(),
        expected.display_best_effort()
    ))]
    BaselineRootMismatch { expected: PathBuf, found: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffKind;
    use crate::filesystem::MemoryFilesystem;
    use crate::snapshot::tests::at;
    use futures::StreamExt;
    use futures::executor::block_on;
    use std::collections::HashSet;

    fn filled() -> MemoryFilesystem {
        let fs = MemoryFilesystem::new(at(1));
        fs.add_file("file1", at(10)).unwrap();
        fs.add_file("file2", at(10)).unwrap();
        fs.add_dir("subfolder", at(10)).unwrap();
        fs.add_file("subfolder/file3", at(10)).unwrap();
        fs
    }

    fn drain(streams: PollerStreams) -> (Vec<DiffEvent>, Vec<FilesystemError>) {
        block_on(async {
            let events: Vec<DiffEvent> = streams.events.collect().await;
            let errors: Vec<FilesystemError> = streams.errors.collect().await;
            (events, errors)
        })
    }

    #[test]
    fn first_poll_only_establishes_the_baseline() {
        let fs = filled();
        let (mut poller, streams) = Poller::new(fs.clone(), "/").unwrap();
        assert_eq!(poller.state(), PollerState::Uninitialized);

        assert_eq!(poller.poll(), PollOutcome::Baselined { entries: 4 });
        assert_eq!(poller.state(), PollerState::Baselined);

        poller.close();
        let (events, errors) = drain(streams);
        assert!(events.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn later_polls_stream_the_changes() {
        let fs = filled();
        let (mut poller, streams) = Poller::new(fs.clone(), "/").unwrap();
        poller.poll();

        fs.add_file("newFile1", at(20)).unwrap();
        fs.add_file("subfolder/newFile3", at(20)).unwrap();
        assert_eq!(poller.poll(), PollOutcome::Diffed { events: 2 });

        poller.close();
        let (events, errors) = drain(streams);
        assert_eq!(
            events.into_iter().collect::<HashSet<_>>(),
            HashSet::from([
                DiffEvent::created("newFile1"),
                DiffEvent::created("subfolder/newFile3"),
            ])
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn baseline_advances_after_each_cycle() {
        let fs = filled();
        let (mut poller, streams) = Poller::new(fs.clone(), "/").unwrap();
        poller.poll();

        fs.touch("file1", at(20)).unwrap();
        assert_eq!(poller.poll(), PollOutcome::Diffed { events: 1 });
        assert_eq!(poller.poll(), PollOutcome::Diffed { events: 0 });

        poller.close();
        let (events, _) = drain(streams);
        assert_eq!(events, vec![DiffEvent::modified("file1")]);
    }

    #[test]
    fn failed_capture_keeps_the_last_good_baseline() {
        let fs = filled();
        let (mut poller, streams) = Poller::new(fs.clone(), "/").unwrap();
        poller.poll();
        let baseline = poller.baseline().cloned();

        fs.set_unreadable("subfolder", true).unwrap();
        fs.add_file("newFile1", at(20)).unwrap();
        assert_eq!(poller.poll(), PollOutcome::Failed);
        assert_eq!(poller.baseline().cloned(), baseline);

        fs.set_unreadable("subfolder", false).unwrap();
        fs.remove("file2").unwrap();
        assert_eq!(poller.poll(), PollOutcome::Diffed { events: 2 });

        poller.close();
        let (events, errors) = drain(streams);
        assert_eq!(
            events.into_iter().collect::<HashSet<_>>(),
            HashSet::from([DiffEvent::created("newFile1"), DiffEvent::deleted("file2")])
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], FilesystemError::PermissionDenied { .. }));
    }

    #[test]
    fn failed_first_capture_stays_uninitialized() {
        let fs = filled();
        let (mut poller, streams) = Poller::new(fs.clone(), "/").unwrap();
        fs.set_unreadable("subfolder", true).unwrap();

        assert_eq!(poller.poll(), PollOutcome::Failed);
        assert_eq!(poller.state(), PollerState::Uninitialized);

        poller.close();
        let (events, errors) = drain(streams);
        assert!(events.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn close_is_idempotent_and_stops_polling() {
        let fs = filled();
        let (mut poller, streams) = Poller::new(fs.clone(), "/").unwrap();
        poller.poll();
        fs.add_file("newFile1", at(20)).unwrap();
        poller.poll();

        poller.close();
        poller.close();
        assert!(poller.is_closed());
        fs.add_file("newFile2", at(20)).unwrap();
        assert_eq!(poller.poll(), PollOutcome::Closed);

        let (events, _) = drain(streams);
        assert_eq!(events, vec![DiffEvent::created("newFile1")]);
    }

    #[test]
    fn dropped_receivers_do_not_break_polling() {
        let fs = filled();
        let (mut poller, streams) = Poller::new(fs.clone(), "/").unwrap();
        drop(streams);

        poller.poll();
        fs.add_file("newFile1", at(20)).unwrap();

        assert_eq!(poller.poll(), PollOutcome::Diffed { events: 1 });
    }

    #[test]
    fn resumed_poller_diffs_against_the_stored_baseline() {
        let fs = filled();
        let stored = Snapshot::capture(&fs, "/").unwrap();
        fs.remove("subfolder").unwrap();

        let (mut poller, streams) = Poller::with_baseline(fs.clone(), "/", stored).unwrap();
        assert_eq!(poller.state(), PollerState::Baselined);
        assert_eq!(poller.poll(), PollOutcome::Diffed { events: 2 });

        poller.close();
        let (events, _) = drain(streams);
        assert!(events.iter().all(|event| event.kind == DiffKind::Deleted));
        assert_eq!(events.last(), Some(&DiffEvent::deleted("subfolder")));
    }

    #[test]
    fn baseline_from_another_root_is_rejected() {
        let fs = filled();
        let stored = Snapshot::capture(&fs, "/subfolder").unwrap();

        let result = Poller::with_baseline(fs, "/", stored);

        assert!(matches!(
            result,
            Err(PollerCreationError::BaselineRootMismatch { .. })
        ));
    }

    #[test]
    fn root_must_be_an_existing_directory() {
        let fs = filled();

        assert!(matches!(
            Poller::new(fs.clone(), "/missing"),
            Err(PollerCreationError::RootUnavailable {
                source: FilesystemError::RootNotFound { .. }
            })
        ));
        assert!(matches!(
            Poller::new(fs, "/file1"),
            Err(PollerCreationError::RootUnavailable {
                source: FilesystemError::RootNotDirectory { .. }
            })
        ));
    }

    #[test]
    fn consumer_can_drain_while_the_poller_closes() {
        let fs = filled();
        let (mut poller, mut streams) = Poller::new(fs.clone(), "/").unwrap();
        poller.poll();
        fs.add_file("newFile1", at(20)).unwrap();
        poller.poll();

        let first = block_on(streams.events.next());
        poller.close();
        let rest: Vec<_> = block_on(streams.events.collect());

        assert_eq!(first, Some(DiffEvent::created("newFile1")));
        assert!(rest.is_empty());
    }
}
