// webpack integration - runs the webpack compiler API in a node child process

use super::{Bundler, CompilationHandler, Stats, StatsAsset, StatsJson, Watching};
use crate::config::{Configuration, StatsOptions};
use crate::error::{BundlerError, CompilationError, PluginError};
use async_trait::async_trait;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use which::which;

/// Marks driver stdout lines that carry a compilation report
pub const REPORT_PREFIX: &str = "@@wtr-webpack@@";

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Driver executed with `node -e`
///
/// Reads `{ config, stats }` from the file named by its first argument,
/// starts webpack with a completion callback and prints one prefixed JSON
/// report per compilation. Closing its stdin closes the compiler.
pub const DRIVER: &str = r##"
const { readFileSync } = require("node:fs");
const webpack = require("webpack");

const PREFIX = "@@wtr-webpack@@";
const { config, stats: statsOptions } = JSON.parse(readFileSync(process.argv[1], "utf8"));

const report = (message) => process.stdout.write(PREFIX + JSON.stringify(message) + "\n");

const compiler = webpack(config, (err, stats) => {
  if (err) {
    report({
      error: {
        message: String(err.message ?? err),
        stack: err.stack ?? null,
        details: err.details ?? null,
      },
    });
    return;
  }

  const { assets = [] } = stats.toJson({ all: false, assets: true });
  report({
    stats: {
      report: stats.toString(statsOptions ?? undefined),
      assets: assets.map(({ name }) => ({ name })),
    },
  });
});

process.stdin.on("end", () => {
  if (compiler) {
    compiler.close(() => process.exit(0));
  } else {
    process.exit(0);
  }
});
process.stdin.resume();
"##;

/// One line of driver output, after the prefix
#[derive(Debug, Deserialize)]
struct DriverReport {
    #[serde(default)]
    error: Option<DriverError>,

    #[serde(default)]
    stats: Option<DriverStats>,
}

#[derive(Debug, Deserialize)]
struct DriverError {
    message: String,
    #[serde(default)]
    stack: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl From<DriverError> for CompilationError {
    fn from(error: DriverError) -> Self {
        Self {
            message: error.message,
            stack: error.stack,
            details: error.details,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DriverStats {
    report: String,
    #[serde(default)]
    assets: Vec<StatsAsset>,
}

/// Stats already rendered by the driver with the user's stats options
struct NodeStats {
    report: String,
    json: StatsJson,
}

impl From<DriverStats> for NodeStats {
    fn from(stats: DriverStats) -> Self {
        Self {
            report: stats.report,
            json: StatsJson {
                assets: stats.assets,
            },
        }
    }
}

impl Stats for NodeStats {
    fn render(&self, _options: Option<&StatsOptions>) -> String {
        self.report.clone()
    }

    fn to_json(&self) -> StatsJson {
        self.json.clone()
    }
}

/// webpack bundler backed by a `node` child process
///
/// `webpack` is resolved by node from the working directory, so it has to be
/// installed in the project whose tests are run.
pub struct NodeWebpackBundler {
    /// Path to the node executable
    node_path: PathBuf,

    /// Directory the driver runs in
    current_dir: Option<PathBuf>,
}

impl NodeWebpackBundler {
    /// Create a bundler by detecting node
    ///
    /// # Errors
    ///
    /// Returns `BundlerError::NodeNotFound` if node is not installed
    /// or not in PATH.
    pub fn new() -> Result<Self, BundlerError> {
        let node_path = which("node").map_err(|_| BundlerError::NodeNotFound)?;
        Ok(Self::with_node_path(node_path))
    }

    /// Create a bundler with a specific node path
    pub fn with_node_path(node_path: PathBuf) -> Self {
        Self {
            node_path,
            current_dir: None,
        }
    }

    /// Run the driver in `dir` instead of the current directory
    pub fn current_dir(mut self, dir: PathBuf) -> Self {
        self.current_dir = Some(dir);
        self
    }

    pub fn node_path(&self) -> &PathBuf {
        &self.node_path
    }
}

impl Bundler for NodeWebpackBundler {
    fn compile(
        &self,
        config: Configuration,
        handler: CompilationHandler,
    ) -> Result<Box<dyn Watching>, PluginError> {
        let mut config_file = NamedTempFile::new()?;
        serde_json::to_writer(
            &mut config_file,
            &serde_json::json!({
                "config": config,
                "stats": handler.stats_options(),
            }),
        )?;
        config_file.flush()?;

        let mut command = Command::new(&self.node_path);
        command
            .arg("-e")
            .arg(DRIVER)
            .arg(config_file.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| BundlerError::Spawn(format!("Failed to execute node: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BundlerError::Spawn("driver stdout is not piped".to_string()))?;
        let stdin = child.stdin.take();

        tracing::debug!(node = %self.node_path.display(), "Started webpack driver");
        let reader = tokio::spawn(relay_reports(stdout, handler));

        Ok(Box::new(NodeWatching {
            child,
            stdin,
            reader: Some(reader),
            _config_file: config_file,
        }))
    }
}

/// Running webpack driver
pub struct NodeWatching {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
    _config_file: NamedTempFile,
}

#[async_trait]
impl Watching for NodeWatching {
    async fn close(&mut self) {
        // EOF on stdin makes the driver close the compiler and exit
        drop(self.stdin.take());

        match tokio::time::timeout(CLOSE_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "webpack driver exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to wait for webpack driver"),
            Err(_) => {
                tracing::warn!("webpack driver did not close in time, killing it");
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill webpack driver");
                }
            }
        }

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn relay_reports(stdout: ChildStdout, handler: CompilationHandler) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(payload) = split_report(&line) else {
                    continue;
                };

                // Reading assets is blocking file I/O
                let handler = handler.clone();
                let payload = payload.to_string();
                if let Err(e) =
                    tokio::task::spawn_blocking(move || dispatch_report(&handler, &payload)).await
                {
                    tracing::error!(error = %e, "Compilation report handling panicked");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read webpack driver output");
                break;
            }
        }
    }
}

/// Relay driver output and return the report payload on `line`, if any
///
/// Output of user plugins and loaders that lacks a trailing newline ends up
/// in front of the next report marker on the same line.
fn split_report(line: &str) -> Option<&str> {
    match line.find(REPORT_PREFIX) {
        Some(start) => {
            let (output, report) = line.split_at(start);
            if !output.is_empty() {
                tracing::info!("{output}");
            }
            Some(&report[REPORT_PREFIX.len()..])
        }
        None => {
            tracing::info!("{line}");
            None
        }
    }
}

fn dispatch_report(handler: &CompilationHandler, payload: &str) {
    let result = match serde_json::from_str::<DriverReport>(payload) {
        Ok(DriverReport {
            error: Some(error), ..
        }) => handler.handle(Err(error.into())),
        Ok(DriverReport {
            stats: Some(stats), ..
        }) => handler.handle(Ok(&NodeStats::from(stats))),
        Ok(_) => handler.handle(Err(CompilationError::new(
            BundlerError::Protocol("report has neither stats nor error".to_string()).to_string(),
        ))),
        Err(e) => handler.handle(Err(CompilationError::new(
            BundlerError::Protocol(e.to_string()).to_string(),
        ))),
    };

    if let Err(error) = result {
        tracing::error!("{error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::CompilationEvent;
    use crate::test_support::{capture_logs, LogCapture};

    const STATS_REPORT: &str = r#"@@wtr-webpack@@{"stats":{"report":"compiled","assets":[]}}"#;

    /// Executable standing in for node, running `script` with sh
    #[cfg(unix)]
    fn fake_node(dir: &std::path::Path, script: &str) -> NodeWebpackBundler {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("node");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        NodeWebpackBundler::with_node_path(path)
    }

    #[test]
    fn driver_uses_report_prefix() {
        assert!(DRIVER.contains(REPORT_PREFIX));
        assert!(DRIVER.contains("require(\"webpack\")"));
    }

    #[test]
    fn bundler_with_custom_node_path() {
        let bundler = NodeWebpackBundler::with_node_path(PathBuf::from("/opt/node/bin/node"));
        assert_eq!(bundler.node_path(), &PathBuf::from("/opt/node/bin/node"));
    }

    #[tokio::test]
    async fn compile_without_node_fails_to_spawn() {
        let bundler = NodeWebpackBundler::with_node_path(PathBuf::from("/nonexistent/node"));
        let (handler, _ready) = CompilationHandler::new(None, std::env::temp_dir());

        let result = bundler.compile(Configuration::baseline(), handler);
        assert!(matches!(
            result,
            Err(PluginError::Bundler(BundlerError::Spawn(_)))
        ));
    }

    #[tokio::test]
    async fn stats_report_populates_bundles() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("runtime.js"), "runtime").unwrap();
        let (handler, ready) = CompilationHandler::new(None, dir.path().to_path_buf());

        dispatch_report(
            &handler,
            r#"{"stats":{"report":"compiled","assets":[{"name":"runtime.js"}]}}"#,
        );

        assert!(ready.wait().await.is_ok());
        assert_eq!(handler.bundles().get("runtime.js").as_deref(), Some("runtime"));
    }

    #[tokio::test]
    async fn error_report_rejects_start() {
        let (handler, ready) = CompilationHandler::new(None, std::env::temp_dir());

        dispatch_report(
            &handler,
            r#"{"error":{"message":"Module not found","stack":null,"details":"./missing"}}"#,
        );

        match ready.wait().await {
            Err(PluginError::Compilation(error)) => {
                assert_eq!(error.message, "Module not found");
                assert_eq!(error.stack, None);
                assert_eq!(error.details.as_deref(), Some("./missing"));
            }
            other => panic!("Expected compilation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_report_is_a_failed_compilation() {
        let (handler, ready) = CompilationHandler::new(None, std::env::temp_dir());
        let mut events = handler.subscribe();

        dispatch_report(&handler, "not json");

        assert!(matches!(
            ready.wait().await,
            Err(PluginError::Compilation(_))
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CompilationEvent::Failed { message } if message.starts_with("Malformed driver report")
        ));
    }

    #[test]
    fn split_report_at_line_start() {
        let logs = capture_logs(|| {
            assert_eq!(split_report(STATS_REPORT), Some(&STATS_REPORT[REPORT_PREFIX.len()..]));
        });
        assert!(logs.is_empty());
    }

    #[test]
    fn split_report_after_unterminated_output() {
        let line = format!("loader progress 50%{STATS_REPORT}");

        let logs = capture_logs(|| {
            assert_eq!(
                split_report(&line),
                Some(r#"{"stats":{"report":"compiled","assets":[]}}"#)
            );
        });
        assert!(logs.contains("loader progress 50%"));
    }

    #[test]
    fn plain_output_is_relayed() {
        let logs = capture_logs(|| assert_eq!(split_report("webpack 5.90.0 compiled"), None));
        assert!(logs.contains("webpack 5.90.0 compiled"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn report_after_unterminated_output_settles_start() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundler = fake_node(
            dir.path(),
            &format!("printf '%s' 'loader progress 50%'\nprintf '%s\\n' '{STATS_REPORT}'\ncat > /dev/null"),
        );
        let (handler, ready) = CompilationHandler::new(None, dir.path().to_path_buf());

        let mut watching = bundler.compile(Configuration::baseline(), handler).unwrap();

        let settled = tokio::time::timeout(Duration::from_secs(5), ready.wait())
            .await
            .expect("timeout waiting for the first compilation");
        assert!(settled.is_ok());
        watching.close().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn driver_output_is_logged() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundler = fake_node(
            dir.path(),
            &format!("echo 'asset main.js 1 KiB'\nprintf '%s\\n' '{STATS_REPORT}'\ncat > /dev/null"),
        );
        let (handler, ready) = CompilationHandler::new(None, dir.path().to_path_buf());
        let capture = LogCapture::start();

        let mut watching = bundler.compile(Configuration::baseline(), handler).unwrap();
        tokio::time::timeout(Duration::from_secs(5), ready.wait())
            .await
            .expect("timeout waiting for the first compilation")
            .unwrap();
        watching.close().await;

        assert!(capture.contents().contains("asset main.js 1 KiB"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn driver_exit_without_report_rejects_start() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundler = fake_node(dir.path(), "echo 'Cannot find module webpack'\nexit 1");
        let (handler, ready) = CompilationHandler::new(None, dir.path().to_path_buf());

        let mut watching = bundler.compile(Configuration::baseline(), handler).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), ready.wait())
            .await
            .expect("timeout waiting for driver exit");
        assert!(matches!(result, Err(PluginError::CompilerExited)));
        watching.close().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn close_ends_driver_on_stdin_eof() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundler = fake_node(
            dir.path(),
            &format!("printf '%s\\n' '{STATS_REPORT}'\ncat > /dev/null"),
        );
        let (handler, ready) = CompilationHandler::new(None, dir.path().to_path_buf());
        let bundles = handler.bundles();

        let mut watching = bundler.compile(Configuration::baseline(), handler).unwrap();
        ready.wait().await.unwrap();
        assert!(bundles.is_empty());

        // Well under the kill fallback
        tokio::time::timeout(Duration::from_secs(2), watching.close())
            .await
            .expect("driver did not exit on stdin EOF");
    }
}
