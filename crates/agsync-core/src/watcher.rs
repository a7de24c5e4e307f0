//! Debounced change detection on the working directory
//!
//! `notify` events are filtered down to sync-eligible paths and sent over a
//! channel to a single task that owns the pending set. Every event restarts
//! the quiet-period timer; when it expires the pending set is drained and
//! handed to the callback once.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agsync_fs::{FilterEngine, NormalizedPath};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::Result;

/// The pending-set task, fed by [`Debouncer::notify`].
#[derive(Debug)]
pub struct Debouncer {
    sender: mpsc::UnboundedSender<NormalizedPath>,
    handle: JoinHandle<()>,
}

impl Debouncer {
    /// Spawn on the current tokio runtime.
    pub fn spawn<F, Fut>(quiet: Duration, on_quiet: F) -> Self
    where
        F: Fn(BTreeSet<NormalizedPath>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<NormalizedPath>();
        let handle = tokio::spawn(async move {
            let mut pending = BTreeSet::new();
            let mut deadline: Option<Instant> = None;
            loop {
                tokio::select! {
                    received = receiver.recv() => match received {
                        Some(path) => {
                            pending.insert(path);
                            deadline = Some(Instant::now() + quiet);
                        }
                        None => break,
                    },
                    _ = sleep_until(deadline), if deadline.is_some() => {
                        deadline = None;
                        let batch = std::mem::take(&mut pending);
                        debug!(files = batch.len(), "Quiet period over");
                        on_quiet(batch).await;
                    }
                }
            }
        });
        Self { sender, handle }
    }

    /// Record one changed path.
    pub fn notify(&self, path: NormalizedPath) {
        let _ = self.sender.send(path);
    }

    fn sender(&self) -> mpsc::UnboundedSender<NormalizedPath> {
        self.sender.clone()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A `notify` watcher on the managed folders feeding a [`Debouncer`].
pub struct DebouncedWatcher {
    _watcher: RecommendedWatcher,
    debouncer: Debouncer,
}

impl std::fmt::Debug for DebouncedWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedWatcher")
            .field("debouncer", &self.debouncer)
            .finish_non_exhaustive()
    }
}

impl DebouncedWatcher {
    /// Watch `folders` under `root`. Paths outside them, excluded by
    /// `filter`, or inside `ignore_root` (the repository) never count.
    pub fn start<F, Fut>(
        root: &Path,
        folders: &[String],
        filter: FilterEngine,
        ignore_root: Option<PathBuf>,
        quiet: Duration,
        on_quiet: F,
    ) -> Result<Self>
    where
        F: Fn(BTreeSet<NormalizedPath>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let debouncer = Debouncer::spawn(quiet, on_quiet);
        let sender = debouncer.sender();
        let base = root.to_path_buf();
        let managed: Vec<String> = folders.to_vec();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "File watcher error");
                    return;
                }
            };
            if matches!(event.kind, EventKind::Access(_) | EventKind::Other) {
                return;
            }
            for path in event.paths {
                if ignore_root.as_ref().is_some_and(|r| path.starts_with(r)) {
                    continue;
                }
                let Some(rel) = NormalizedPath::relative(&base, &path) else {
                    continue;
                };
                if !managed.iter().any(|f| f == rel.top_level()) || filter.is_excluded(&rel) {
                    continue;
                }
                let _ = sender.send(rel);
            }
        })?;

        for folder in folders {
            let dir = root.join(folder);
            if dir.is_dir() {
                watcher.watch(&dir, RecursiveMode::Recursive)?;
            } else {
                debug!(folder = %folder, "Managed folder missing; not watched");
            }
        }

        Ok(Self {
            _watcher: watcher,
            debouncer,
        })
    }

    /// Feed a path as if the watcher had seen it.
    pub fn notify(&self, path: NormalizedPath) {
        self.debouncer.notify(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Batches = Arc<Mutex<Vec<BTreeSet<NormalizedPath>>>>;

    fn recorder() -> (Batches, impl Fn(BTreeSet<NormalizedPath>) -> std::future::Ready<()> + Send + 'static) {
        let batches: Batches = Arc::default();
        let sink = Arc::clone(&batches);
        (batches, move |batch| {
            sink.lock().unwrap().push(batch);
            std::future::ready(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_batch() {
        let (batches, on_quiet) = recorder();
        let debouncer = Debouncer::spawn(Duration::from_secs(30), on_quiet);

        for i in 0..5 {
            debouncer.notify(NormalizedPath::new(format!("brain/{i}.md")));
            time::sleep(Duration::from_secs(10)).await;
        }
        debouncer.notify(NormalizedPath::new("brain/0.md"));
        assert!(batches.lock().unwrap().is_empty());

        time::sleep(Duration::from_secs(31)).await;

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_fire_separately() {
        let (batches, on_quiet) = recorder();
        let debouncer = Debouncer::spawn(Duration::from_secs(5), on_quiet);

        debouncer.notify(NormalizedPath::new("brain/a.md"));
        time::sleep(Duration::from_secs(6)).await;
        debouncer.notify(NormalizedPath::new("brain/b.md"));
        time::sleep(Duration::from_secs(6)).await;

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches[1].contains(&NormalizedPath::new("brain/b.md")));
    }
}
