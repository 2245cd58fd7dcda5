//! Log output of the sync engine.
//!
//! [`SyncTracer`] installs the global [`tracing`] subscriber. Logs always go to stdout and can
//! additionally be written to a file, each destination with its own [`LogFormat`] and filter.
//! Filters are [`EnvFilter`] directives, the engine logs under the `sync::trie`, `net::fetch`
//! and `sync::state` targets.
//!
//! ```
//! use hyk_tracing::{tracing::level_filters::LevelFilter, LayerInfo, LogFormat, SyncTracer, Tracer};
//!
//! fn main() -> eyre::Result<()> {
//!     let _handle = SyncTracer::new()
//!         .with_stdout(LayerInfo::new(
//!             LogFormat::Json,
//!             LevelFilter::INFO.to_string(),
//!             "sync::trie=debug".to_string(),
//!             None,
//!         ))
//!         .init()?;
//!     Ok(())
//! }
//! ```

#![doc(issue_tracker_base_url = "https://github.com/hayekchain/hyk-sync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use tracing;
pub use tracing_appender;
pub use tracing_subscriber;

pub use formatter::LogFormat;
pub use test_tracer::TestTracer;

mod formatter;
mod test_tracer;

use core::fmt;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the subscriber used by a syncing node.
#[derive(Debug, Clone, Default)]
pub struct SyncTracer {
    stdout: LayerInfo,
    file: Option<(LayerInfo, FileInfo)>,
}

impl SyncTracer {
    /// Logs to stdout only, at `INFO`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stdout layer settings.
    pub fn with_stdout(mut self, config: LayerInfo) -> Self {
        self.stdout = config;
        self
    }

    /// Also writes logs to the given file.
    pub fn with_file(mut self, config: LayerInfo, file_info: FileInfo) -> Self {
        self.file = Some((config, file_info));
        self
    }
}

/// Settings of one log destination.
#[derive(Debug, Clone)]
pub struct LayerInfo {
    format: LogFormat,
    default_directive: String,
    filters: String,
    color: Option<String>,
}

impl LayerInfo {
    /// Creates the settings.
    ///
    /// `default_directive` applies when `RUST_LOG` is unset, `filters` is a comma separated
    /// list of extra directives such as `net::fetch=trace`. `color` is `always`, `auto` or
    /// `never`; `None` disables colors.
    pub const fn new(
        format: LogFormat,
        default_directive: String,
        filters: String,
        color: Option<String>,
    ) -> Self {
        Self { format, default_directive, filters, color }
    }
}

impl Default for LayerInfo {
    fn default() -> Self {
        Self {
            format: LogFormat::Terminal,
            default_directive: LevelFilter::INFO.to_string(),
            filters: String::new(),
            color: Some("always".to_string()),
        }
    }
}

/// Log file location, `<dir>/<file_name>`.
#[derive(Debug, Clone)]
pub struct FileInfo {
    dir: PathBuf,
    file_name: String,
}

impl FileInfo {
    /// Creates a new `FileInfo`.
    pub const fn new(dir: PathBuf, file_name: String) -> Self {
        Self { dir, file_name }
    }
}

/// Keeps the file writer alive. Buffered file logs are flushed when this is dropped.
#[derive(Default)]
pub struct TracerHandle {
    /// Guard of the non-blocking file writer.
    pub file_guard: Option<WorkerGuard>,
}

impl fmt::Debug for TracerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerHandle")
            .field("file_guard", &self.file_guard.is_some())
            .finish_non_exhaustive()
    }
}

/// Something that can install a global subscriber.
pub trait Tracer {
    /// Installs the subscriber. Installing twice is not an error, the first one stays active.
    fn init(self) -> eyre::Result<TracerHandle>;
}

impl Tracer for SyncTracer {
    fn init(self) -> eyre::Result<TracerHandle> {
        let mut layers = Vec::with_capacity(2);

        let filter = build_env_filter(&self.stdout.default_directive, &self.stdout.filters)?;
        layers.push(self.stdout.format.apply(filter, self.stdout.color, None));

        let mut file_guard = None;
        if let Some((config, file_info)) = self.file {
            std::fs::create_dir_all(&file_info.dir)?;
            let appender = tracing_appender::rolling::never(&file_info.dir, &file_info.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let filter = build_env_filter(&config.default_directive, &config.filters)?;
            layers.push(config.format.apply(filter, None, Some(writer)));
            file_guard = Some(guard);
        }

        if let Err(err) = tracing_subscriber::registry().with(layers).try_init() {
            tracing::warn!(%err, "Subscriber already installed");
        }

        Ok(TracerHandle { file_guard })
    }
}

fn build_env_filter(default_directive: &str, directives: &str) -> eyre::Result<EnvFilter> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_directive.parse()?)
        .from_env_lossy();

    directives
        .split(',')
        .filter(|d| !d.is_empty())
        .try_fold(env_filter, |env_filter, directive| {
            Ok(env_filter.add_directive(directive.parse()?))
        })
}

/// Installs the [`TestTracer`], ignoring failures. Filtered by `RUST_LOG`.
pub fn init_test_tracing() {
    let _ = TestTracer::default().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_filter_accepts_extra_directives() {
        let filter = build_env_filter("info", "sync::trie=trace,net::fetch=debug").unwrap();
        assert!(filter.to_string().contains("sync::trie=trace"));
        assert!(build_env_filter("info", "sync::trie=loud").is_err());
    }

    #[test]
    fn writes_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SyncTracer::new()
            .with_file(
                LayerInfo::default(),
                FileInfo::new(dir.path().join("logs"), "sync.log".to_string()),
            )
            .init()
            .unwrap();
        assert!(handle.file_guard.is_some());
        assert!(dir.path().join("logs").is_dir());
    }
}
