//! Directory watcher implementation

use std::path::{Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::config::WatcherConfig;

/// Paths of `event` that were created or modified
pub fn changed_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => &event.paths,
        _ => &[],
    }
}

/// Watches a directory tree and reports modified files over a channel
pub struct DirectoryWatcher {
    directory: PathBuf,
    config: WatcherConfig,
    sender: mpsc::Sender<PathBuf>,
    watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("directory", &self.directory)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

impl DirectoryWatcher {
    /// Create a new DirectoryWatcher; it does nothing until started
    pub fn new(directory: PathBuf, config: WatcherConfig, sender: mpsc::Sender<PathBuf>) -> Self {
        Self {
            directory,
            config,
            sender,
            watcher: None,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Start watching
    ///
    /// The watch is registered before returning, so every change made after
    /// this call is reported.
    pub fn start(&mut self) -> notify::Result<()> {
        if self.is_running() {
            debug!(directory = %self.directory.display(), "DirectoryWatcher::start: already running");
            return Ok(());
        }

        let sender = self.sender.clone();
        let config = Config::default().with_poll_interval(self.config.poll_interval());
        let mut watcher =
            RecommendedWatcher::new(move |result: notify::Result<Event>| forward(&sender, result), config)?;
        watcher.watch(&self.directory, RecursiveMode::Recursive)?;

        info!(
            directory = %self.directory.display(),
            poll_interval_ms = self.config.poll_interval_ms,
            "DirectoryWatcher started"
        );
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Stop watching; notifications already sent stay in the channel
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!(directory = %self.directory.display(), "DirectoryWatcher stopped");
        }
    }
}

/// Send every changed path of a notification without blocking the notify thread
fn forward(sender: &mpsc::Sender<PathBuf>, result: notify::Result<Event>) {
    let event = match result {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Directory watch error");
            return;
        }
    };

    for path in changed_paths(&event) {
        match sender.try_send(path.clone()) {
            Ok(()) => debug!(path = %path.display(), kind = ?event.kind, "forward: file modified"),
            Err(TrySendError::Full(path)) => {
                warn!(path = %path.display(), "Watcher channel full, dropping modified path");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("forward: receiver closed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RemoveKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_changed_paths_keeps_create_and_modify() {
        let created = event(EventKind::Create(CreateKind::File), "/a");
        let written = event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), "/b");

        assert_eq!(changed_paths(&created), [PathBuf::from("/a")]);
        assert_eq!(changed_paths(&written), [PathBuf::from("/b")]);
    }

    #[test]
    fn test_changed_paths_ignores_access_and_remove() {
        assert!(changed_paths(&event(EventKind::Access(AccessKind::Any), "/a")).is_empty());
        assert!(changed_paths(&event(EventKind::Remove(RemoveKind::File), "/a")).is_empty());
    }

    #[test]
    fn test_forward_sends_changed_paths() {
        let (tx, mut rx) = mpsc::channel(8);
        forward(&tx, Ok(event(EventKind::Create(CreateKind::File), "/cfg/new.conf")));
        forward(&tx, Ok(event(EventKind::Access(AccessKind::Any), "/cfg/read.conf")));

        assert_eq!(rx.try_recv().unwrap(), PathBuf::from("/cfg/new.conf"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_forward_drops_paths_when_channel_full_or_closed() {
        let (tx, mut rx) = mpsc::channel(1);
        forward(&tx, Ok(event(EventKind::Create(CreateKind::File), "/first")));
        forward(&tx, Ok(event(EventKind::Create(CreateKind::File), "/second")));
        assert_eq!(rx.try_recv().unwrap(), PathBuf::from("/first"));
        assert!(rx.try_recv().is_err());

        drop(rx);
        forward(&tx, Ok(event(EventKind::Create(CreateKind::File), "/third")));
    }

    #[test]
    fn test_start_fails_for_missing_directory() {
        let (tx, _rx) = mpsc::channel(8);
        let mut watcher = DirectoryWatcher::new(
            PathBuf::from("/nonexistent/autodot/dir"),
            WatcherConfig::default(),
            tx,
        );

        assert!(watcher.start().is_err());
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_watcher_start_and_stop() {
        let temp = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let mut watcher = DirectoryWatcher::new(temp.path().to_path_buf(), WatcherConfig::default(), tx);
        assert!(!watcher.is_running());

        watcher.start().unwrap();
        assert!(watcher.is_running());

        let expected = temp.path().join("late.conf");
        fs::write(&expected, "x").unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(path) = rx.recv().await {
                if path.file_name() == expected.file_name() {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(seen);

        watcher.stop();
        assert!(!watcher.is_running());
    }
}
