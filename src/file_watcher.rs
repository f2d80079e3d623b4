use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecursiveMode, Watcher};

const SETTLE_TIME: Duration = Duration::from_millis(100);

// AIDEV-NOTE: Trigger source for --watch. Watches the parent directory because most
// editors save by writing a temp file and renaming it over the original.
pub struct FileWatcher {
    _watcher: notify::RecommendedWatcher,
    receiver: flume::Receiver<Event>,
    file_name: OsString,
    pending_since: Option<Instant>,
}

impl FileWatcher {
    pub fn new(file_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let file_path = file_path.canonicalize()?;
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = file_path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or("watched path has no file name")?;

        let (tx, rx) = flume::unbounded();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            match event {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => tracing::warn!("file watch error: {e}"),
            }
        })?;

        watcher.watch(&parent, RecursiveMode::NonRecursive)?;
        tracing::debug!(dir = %parent.display(), "watching for changes");

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            file_name,
            pending_since: None,
        })
    }

    /// True once the file changed and no further events arrived for a short while,
    /// so one save that emits several events triggers a single validation.
    pub fn check_for_changes(&mut self) -> bool {
        for event in self.receiver.try_iter() {
            if is_relevant(&event, &self.file_name) {
                self.pending_since = Some(Instant::now());
            }
        }

        match self.pending_since {
            Some(since) if since.elapsed() >= SETTLE_TIME => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    let kind_matches = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
    kind_matches
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name.as_os_str()))
}
