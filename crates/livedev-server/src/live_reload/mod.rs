//! Live reload: client registry, file watcher and event stream endpoint.

mod registry;
mod script;
mod sse;
mod watcher;

pub(crate) use registry::{Broadcast, Registry};
pub(crate) use script::{SCRIPT_PATH, STREAM_PATH, inject_script, script_handler};
pub(crate) use sse::sse_handler;
pub(crate) use watcher::FileWatcher;
