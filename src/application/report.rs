use colored::{ColoredString, Colorize};
use futures::StreamExt;
use futures_channel::mpsc::UnboundedReceiver;
use pollwatch::diff::{DiffEvent, DiffKind};
use pollwatch::filesystem::FilesystemError;
use snafu::Report;
use tracing::{debug, warn};

fn label(kind: DiffKind) -> ColoredString {
    let text = format!("{kind:<8}");
    match kind {
        DiffKind::Created => text.green(),
        DiffKind::Modified => text.yellow(),
        DiffKind::Deleted => text.red(),
    }
}

pub fn render_event(event: &DiffEvent) -> String {
    format!("{} {}", label(event.kind), event.path.display())
}

/// Prints every event until the poller closes its event stream.
pub async fn print_events(mut events: UnboundedReceiver<DiffEvent>) {
    let mut printed = 0usize;
    while let Some(event) = events.next().await {
        println!("{}", render_event(&event));
        printed += 1;
    }
    debug!("Event stream closed after {} events", printed);
}

/// Logs every capture failure until the poller closes its error stream.
pub async fn report_errors(mut errors: UnboundedReceiver<FilesystemError>) {
    while let Some(error) = errors.next().await {
        warn!("{}", Report::from_error(error));
    }
    debug!("Error stream closed");
}
