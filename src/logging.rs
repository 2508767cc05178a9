//! Tracing setup: stderr plus an append-only log file.
//!
//! The subscriber goes live before the configuration is read, writing to
//! stderr only. The log file named by the configuration is attached later
//! through [`LogHandle::attach_file`].
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

type OutputLayer = fmt::Layer<Registry, DefaultFields, Format, BoxMakeWriter>;

/// Swaps the output of the installed subscriber.
pub struct LogHandle {
    output: reload::Handle<OutputLayer, Registry>,
}

impl LogHandle {
    /// Tee all further events to `log_file` as well as stderr.
    ///
    /// Failing to open the log file is fatal: the service has no other record
    /// of refresh failures.
    pub fn attach_file(&self, log_file: &Path) -> Result<()> {
        let file = open_log_file(log_file)
            .with_context(|| format!("Failed to open log file '{}'", log_file.display()))?;

        self.output
            .modify(|layer| {
                *layer.writer_mut() = BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file)));
            })
            .map_err(|e| anyhow::anyhow!("Failed to attach log file: {e}"))?;

        tracing::debug!(path = %log_file.display(), "Logging to file");
        Ok(())
    }
}

/// Install the global subscriber, stderr only. `RUST_LOG` wins over the
/// `info` default.
pub fn init() -> Result<LogHandle> {
    let (subscriber, handle) = build();
    subscriber
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))?;
    Ok(handle)
}

fn build() -> (impl Subscriber + Send + Sync + 'static, LogHandle) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let output: OutputLayer = fmt::layer()
        .with_ansi(false)
        .with_writer(BoxMakeWriter::new(std::io::stderr));
    let (output, handle) = reload::Layer::new(output);

    let subscriber = tracing_subscriber::registry().with(output).with(env_filter);
    (subscriber, LogHandle { output: handle })
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
