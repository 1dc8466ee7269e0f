//! File watcher for live reload.
//!
//! Watches the site root and broadcasts a reload for every write to a
//! matching file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::registry::Broadcast;

/// Message sent to clients when a watched file changes.
pub(crate) const RELOAD_MESSAGE: &str = "reload";

/// Capacity of the channels between the notify thread and the watch loop.
const CHANNEL_CAPACITY: usize = 100;

/// Filesystem watch over the site root.
///
/// Holds the underlying notify watcher; dropping it releases the watch.
pub(crate) struct FileWatcher {
    root: PathBuf,
    patterns: Vec<glob::Pattern>,
    watcher: RecommendedWatcher,
    events: mpsc::Receiver<Event>,
    errors: mpsc::Receiver<notify::Error>,
}

impl FileWatcher {
    /// Establish a watch on `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory to watch
    /// * `recursive` - Whether subdirectories are watched too
    /// * `watch_patterns` - Glob patterns relative to `root`; empty matches everything
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be created or the root cannot be watched.
    pub(crate) fn start(
        root: &Path,
        recursive: bool,
        watch_patterns: &[String],
    ) -> Result<Self, notify::Error> {
        let (event_tx, events) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, errors) = mpsc::channel(CHANNEL_CAPACITY);

        // The callback runs on notify's own thread, so blocking sends are fine.
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            // Send fails only once the watch loop is gone.
            match res {
                Ok(event) => {
                    let _ = event_tx.blocking_send(event);
                }
                Err(err) => {
                    let _ = error_tx.blocking_send(err);
                }
            }
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(root, mode)?;

        let patterns = watch_patterns
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        tracing::info!(root = %root.display(), recursive, "Watching directory");

        Ok(Self {
            // notify reports absolute paths, so patterns are matched against
            // paths relative to the canonical root.
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            patterns,
            watcher,
            events,
            errors,
        })
    }

    /// Run the watch loop until `shutdown` is cancelled.
    ///
    /// Every write event on a matching path results in exactly one broadcast.
    /// Watch errors are logged and the loop continues.
    pub(crate) async fn run(mut self, broadcaster: Arc<dyn Broadcast>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                Some(event) = self.events.recv() => {
                    self.handle_event(&event, broadcaster.as_ref());
                }
                Some(err) = self.errors.recv() => {
                    tracing::warn!(error = %err, "Watcher error");
                }
                else => break,
            }
        }

        drop(self.watcher);
        tracing::info!("Watcher stopped");
    }

    /// Broadcast a reload if the event is a write to a watched file.
    fn handle_event(&self, event: &Event, broadcaster: &dyn Broadcast) {
        if !is_write(event.kind) {
            return;
        }

        let Some(path) = event
            .paths
            .iter()
            .find(|path| matches_patterns(path, &self.root, &self.patterns))
        else {
            return;
        };

        tracing::info!(path = %path.display(), "Modified");
        broadcaster.broadcast(RELOAD_MESSAGE);
    }
}

/// Whether an event kind describes a content write.
///
/// Some backends cannot tell what changed and report `Modify(Any)`; those
/// count as writes. Metadata changes and renames do not.
fn is_write(kind: EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
    )
}

/// Check if a path matches any watch pattern.
///
/// An empty pattern list matches every path.
fn matches_patterns(path: &Path, root: &Path, patterns: &[glob::Pattern]) -> bool {
    if patterns.is_empty() {
        return true;
    }

    let relative = path.strip_prefix(root).unwrap_or(path);
    patterns.iter().any(|pattern| pattern.matches_path(relative))
}
