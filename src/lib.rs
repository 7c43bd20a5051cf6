pub mod backend;
pub mod commands;
pub mod flow;
pub mod ingest;
pub mod ledger;
pub mod model;

use std::path::PathBuf;

use backend::{BackendClient, BackendError, ClientConfig};
use commands::FlowHandle;
use flow::ChatFlow;

/// Async mutex for types that require `.await` inside their methods.
pub type TokioMutex<T> = tokio::sync::Mutex<T>;

/// Return the platform-standard data directory for Arsflow.
///
/// - macOS: `~/Library/Application Support/se.arsflow.client/`
/// - Windows: `{FOLDERID_RoamingAppData}\se.arsflow.client\`
/// - Linux: `$XDG_DATA_HOME/se.arsflow.client/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.arsflow/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("se.arsflow.client");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".arsflow")
}

/// Initialize the tracing subscriber, writing to `flow.log` in the data directory.
///
/// On each start:
/// 1. Rotates existing logs (flow.log → flow.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh flow.log with a line-flushing writer for crash resilience.
/// 3. Logs a startup banner with the data directory path for discoverability.
///
/// Returns the log file path. Calling it twice keeps the first subscriber.
pub fn init_tracing() -> std::io::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("flow.log");
    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arsflow=info,warn"));

    let installed = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            data_dir = %log_dir.display(),
            log_file = %log_path.display(),
            pid = std::process::id(),
            "=== Arsflow starting ==="
        );
    }
    Ok(log_path)
}

/// Load the client config and open a chat session against the real backend.
pub fn open_session() -> Result<FlowHandle<BackendClient>, BackendError> {
    let config = ClientConfig::load_or_default();
    config.validate()?;
    let client = BackendClient::from_config(&config.api)?;
    tracing::info!(base_url = %client.base_url(), "session opened");
    Ok(FlowHandle::new(ChatFlow::new(client, config)))
}

/// Rotate log files: `flow.log` → `flow.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &std::path::Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// Without explicit flushing, log entries may sit in OS buffers and be lost
/// when the embedding shell is killed.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
