//! Detects created, modified and deleted entries under a directory by
//! periodically capturing snapshots of it and diffing them.
//!
//! ```no_run
//! use pollwatch::filesystem::OsFilesystem;
//! use pollwatch::poller::Poller;
//!
//! let (mut poller, streams) = Poller::new(OsFilesystem::new(), "/srv/shared").unwrap();
//! poller.poll(); // baseline
//! poller.poll(); // changes since then go to `streams.events`
//! # drop(streams);
//! ```

#![allow(clippy::enum_variant_names)]

pub mod baseline;
pub mod config;
pub mod diff;
pub mod ext;
pub mod filesystem;
pub mod poller;
pub mod snapshot;
