// Compilation handler - republishes bundle contents after every compilation

use super::{Stats, StatsAsset};
use crate::config::StatsOptions;
use crate::error::{CompilationError, PluginError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

type Bundles = Arc<RwLock<HashMap<String, String>>>;
type PendingStart = Arc<Mutex<Option<oneshot::Sender<Result<(), PluginError>>>>>;

const EVENT_CAPACITY: usize = 16;

/// Read-only view of the bundles emitted by the latest compilation
///
/// Keys are asset names exactly as webpack reports them, values the file
/// contents. Only the `CompilationHandler` that created the view can write.
#[derive(Clone, Default)]
pub struct BundlesView {
    inner: Bundles,
}

impl BundlesView {
    /// Contents of the asset named `name`
    pub fn get(&self, name: &str) -> Option<String> {
        self.inner.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Sorted asset names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Copy of the whole map
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().clone()
    }
}

/// Notification sent after each compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationEvent {
    /// Bundles were republished with these assets
    Rebuilt { assets: Vec<String> },

    /// The compilation failed and the bundles were cleared
    Failed { message: String },
}

/// Settles once, on the first compilation after start
pub struct CompilationReady {
    rx: oneshot::Receiver<Result<(), PluginError>>,
}

impl CompilationReady {
    /// Wait for the first compilation
    ///
    /// # Errors
    ///
    /// Returns the compilation failure, or `PluginError::CompilerExited` if
    /// the bundler dropped its handler without reporting anything.
    pub async fn wait(self) -> Result<(), PluginError> {
        self.rx.await.unwrap_or(Err(PluginError::CompilerExited))
    }
}

/// Callback side of a running compiler
///
/// Cheap to clone; every clone writes the same bundles, settles the same
/// pending start and feeds the same event channel.
#[derive(Clone)]
pub struct CompilationHandler {
    stats_options: Option<StatsOptions>,
    output_path: PathBuf,
    bundles: Bundles,
    pending: PendingStart,
    events: broadcast::Sender<CompilationEvent>,
}

impl CompilationHandler {
    /// Create a handler reading assets from `output_path`
    ///
    /// `stats_options` are the user's own stats settings, used to format the
    /// build report. Returns the handler and the future of the first
    /// compilation.
    pub fn new(
        stats_options: Option<StatsOptions>,
        output_path: PathBuf,
    ) -> (Self, CompilationReady) {
        let (tx, rx) = oneshot::channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let handler = Self {
            stats_options,
            output_path,
            bundles: Bundles::default(),
            pending: Arc::new(Mutex::new(Some(tx))),
            events,
        };

        (handler, CompilationReady { rx })
    }

    /// Read-only view of the bundles this handler publishes
    pub fn bundles(&self) -> BundlesView {
        BundlesView {
            inner: Arc::clone(&self.bundles),
        }
    }

    /// Subscribe to compilation events
    pub fn subscribe(&self) -> broadcast::Receiver<CompilationEvent> {
        self.events.subscribe()
    }

    /// Sending side of the event channel, for subscribing later on
    ///
    /// Holding it does not keep the pending start alive.
    pub fn events(&self) -> broadcast::Sender<CompilationEvent> {
        self.events.clone()
    }

    pub fn output_path(&self) -> &PathBuf {
        &self.output_path
    }

    pub fn stats_options(&self) -> Option<&StatsOptions> {
        self.stats_options.as_ref()
    }

    /// Whether the first compilation has been reported yet
    pub fn is_settled(&self) -> bool {
        self.pending.lock().is_none()
    }

    /// Process one finished compilation
    ///
    /// The bundles are cleared first and repopulated under the same write
    /// lock, so readers never see a mix of two compilations. A failure
    /// leaves them empty.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::ReadAsset` when an asset reported by the stats
    /// cannot be read from the output directory. A reported compilation
    /// error is not an error of this call.
    pub fn handle(&self, outcome: Result<&dyn Stats, CompilationError>) -> Result<(), PluginError> {
        let mut bundles = self.bundles.write();
        bundles.clear();

        let stats = match outcome {
            Ok(stats) => stats,
            Err(error) => {
                drop(bundles);
                log_compilation_error(&error);
                self.emit(CompilationEvent::Failed {
                    message: error.message.clone(),
                });
                self.settle(Err(error.into()));
                return Ok(());
            }
        };

        tracing::info!("{}", stats.render(self.stats_options.as_ref()));

        let assets = stats.to_json().assets;
        let mut names = Vec::with_capacity(assets.len());

        for StatsAsset { name } in assets {
            let path = self.output_path.join(&name);
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    bundles.insert(name.clone(), content);
                    names.push(name);
                }
                Err(source) => {
                    bundles.clear();
                    drop(bundles);
                    tracing::error!(path = %path.display(), error = %source, "Failed to read bundle asset");
                    self.emit(CompilationEvent::Failed {
                        message: source.to_string(),
                    });
                    self.settle(Err(PluginError::ReadAsset {
                        path: path.clone(),
                        source: std::io::Error::new(source.kind(), source.to_string()),
                    }));
                    return Err(PluginError::ReadAsset { path, source });
                }
            }
        }

        drop(bundles);
        tracing::debug!(assets = names.len(), "Republished bundles");
        self.emit(CompilationEvent::Rebuilt { assets: names });
        self.settle(Ok(()));
        Ok(())
    }

    fn settle(&self, result: Result<(), PluginError>) {
        if let Some(tx) = self.pending.lock().take() {
            // The session may have given up waiting
            let _ = tx.send(result);
        }
    }

    fn emit(&self, event: CompilationEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn log_compilation_error(error: &CompilationError) {
    match &error.stack {
        Some(stack) => tracing::error!("{stack}"),
        None => tracing::error!("{error}"),
    }

    if let Some(details) = &error.details {
        tracing::error!("{details}");
    }
}
