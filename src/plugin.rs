// Test runner plugin - lifecycle hooks wiring entries, config, bundler and serving

use crate::bundle::{
    output_path, Bundler, BundlesView, CompilationEvent, CompilationHandler, NodeWebpackBundler,
    Watching,
};
use crate::config::{generate_config, Configuration, OutputOptions};
use crate::entries::collect_entries;
use crate::error::PluginError;
use crate::serve::{serve, ServeResponse};
use async_trait::async_trait;
use tokio::sync::broadcast;

pub const PLUGIN_NAME: &str = "wtr-webpack-plugin";

/// Session settings the test runner exposes to plugins
#[derive(Debug, Clone, Default)]
pub struct TestRunnerConfig {
    /// Test file glob patterns
    pub files: Vec<String>,

    /// Whether the runner re-runs tests on changes
    pub watch: bool,
}

/// Arguments of the `server_start` hook
#[derive(Debug, Clone, Default)]
pub struct ServerStartParams {
    pub config: TestRunnerConfig,
}

/// Incoming file request
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub path: String,
}

/// Arguments of the `serve` hook
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub request: Request,
}

impl Context {
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            request: Request { path: path.into() },
        }
    }
}

/// Lifecycle hooks the test runner calls on a plugin
#[async_trait]
pub trait TestRunnerPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Called once when the runner's server starts
    async fn server_start(&mut self, params: &mut ServerStartParams) -> Result<(), PluginError>;

    /// Called once at teardown
    async fn server_stop(&mut self);

    /// Called for every file request
    fn serve(&self, context: &Context) -> ServeResponse;
}

/// Plugin that bundles the session's test files with webpack
pub struct WebpackPlugin<B: Bundler = NodeWebpackBundler> {
    user_config: Configuration,
    bundler: B,
    compiler: Option<Box<dyn Watching>>,
    bundles: BundlesView,
    events: Option<broadcast::Sender<CompilationEvent>>,
}

/// Create the plugin with the node-backed webpack bundler
///
/// # Errors
///
/// Returns `BundlerError::NodeNotFound` when node is not in PATH.
pub fn webpack_plugin(user_config: Configuration) -> Result<WebpackPlugin, PluginError> {
    Ok(WebpackPlugin::with_bundler(
        user_config,
        NodeWebpackBundler::new()?,
    ))
}

impl<B: Bundler> WebpackPlugin<B> {
    pub fn with_bundler(user_config: Configuration, bundler: B) -> Self {
        Self {
            user_config,
            bundler,
            compiler: None,
            bundles: BundlesView::default(),
            events: None,
        }
    }

    /// Bundles of the latest compilation
    pub fn bundles(&self) -> &BundlesView {
        &self.bundles
    }

    /// Compilation events of the running session
    ///
    /// `None` before the first `server_start`.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<CompilationEvent>> {
        self.events.as_ref().map(broadcast::Sender::subscribe)
    }

    /// Whether a compiler is running
    pub fn is_running(&self) -> bool {
        self.compiler.is_some()
    }

    pub fn user_config(&self) -> &Configuration {
        &self.user_config
    }
}

#[async_trait]
impl<B: Bundler> TestRunnerPlugin for WebpackPlugin<B> {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn server_start(&mut self, params: &mut ServerStartParams) -> Result<(), PluginError> {
        if let Some(mut previous) = self.compiler.take() {
            previous.close().await;
        }

        let config = &mut params.config;
        let entry = collect_entries(&config.files)?;
        let path = output_path();

        let webpack_config = generate_config(
            &self.user_config,
            Configuration {
                entry: Some(entry.into()),
                output: Some(OutputOptions {
                    path: Some(path.clone()),
                    ..Default::default()
                }),
                watch: Some(config.watch),
                ..Default::default()
            },
        );

        // webpack watches instead of the runner
        config.watch = false;

        let (handler, ready) = CompilationHandler::new(self.user_config.stats.clone(), path);
        self.bundles = handler.bundles();
        self.events = Some(handler.events());

        tracing::debug!(
            output = %handler.output_path().display(),
            watch = webpack_config.watch.unwrap_or(false),
            "Starting webpack"
        );
        self.compiler = Some(self.bundler.compile(webpack_config, handler)?);

        ready.wait().await
    }

    async fn server_stop(&mut self) {
        if let Some(mut compiler) = self.compiler.take() {
            compiler.close().await;
        }
    }

    fn serve(&self, context: &Context) -> ServeResponse {
        serve(&self.bundles, &context.request.path)
    }
}
