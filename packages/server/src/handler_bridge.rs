//! Handler Bridge: hands inbound events to an externally-configured
//! process via a payload file and a child-process invocation (spec §4.7).
//!
//! Dispatch is fire-and-forget with respect to the caller: failures are
//! logged, never propagated to the client, and never block the Broadcast
//! Engine (spec §5 suspension points -- the child-process wait is its own
//! suspension point, independent of any hub lock).

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng as _;
use socket_server_core::HandlerPayload;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How often the sweep task scans the payload directory for stale files.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Payload files older than this are removed by the sweep task.
const PAYLOAD_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const PAYLOAD_PREFIX: &str = "payload_";
const PAYLOAD_SUFFIX: &str = ".json";

/// Bridges hub events to an external handler process. Constructed once
/// per server; cheap to clone (all fields are `Arc`-free owned values
/// behind an outer `Arc` held by the hub's caller).
#[derive(Debug, Clone)]
pub struct HandlerBridge {
    /// `None` disables dispatch: events are logged but never written out
    /// or invoked, matching "if unset, the handler bridge is disabled."
    handler_bin: Option<PathBuf>,
    handler_cwd: Option<PathBuf>,
    handler_command: String,
    payload_dir: PathBuf,
}

impl HandlerBridge {
    #[must_use]
    pub fn new(
        handler_bin: Option<PathBuf>,
        handler_cwd: Option<PathBuf>,
        handler_command: String,
        payload_dir: PathBuf,
    ) -> Self {
        Self {
            handler_bin,
            handler_cwd,
            handler_command,
            payload_dir,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.handler_bin.is_some()
    }

    /// Ensures the payload directory exists. Call once at startup before
    /// the first dispatch or sweep.
    ///
    /// # Errors
    ///
    /// Propagates the underlying `std::io::Error` if the directory
    /// cannot be created.
    pub async fn ensure_payload_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.payload_dir).await
    }

    /// Serializes `payload`, writes it to a uniquely-named file, and
    /// invokes the handler as a child process with the file path and the
    /// configured command name as arguments. A no-op when the bridge is
    /// disabled.
    pub async fn dispatch(&self, payload: &HandlerPayload) {
        let Some(handler_bin) = &self.handler_bin else {
            debug!(action = %payload.action, "handler bridge disabled, dropping event");
            return;
        };

        let path = match self.write_payload(payload).await {
            Ok(path) => path,
            Err(err) => {
                warn!(error = %err, "failed to write handler payload");
                return;
            }
        };

        let mut command = Command::new(handler_bin);
        command.arg(&self.handler_command).arg(&path);
        if let Some(cwd) = &self.handler_cwd {
            command.current_dir(cwd);
        }

        match command.output().await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if output.status.success() {
                    debug!(
                        action = %payload.action,
                        exit_code = output.status.code(),
                        %stdout,
                        "handler process completed"
                    );
                } else {
                    warn!(
                        action = %payload.action,
                        exit_code = output.status.code(),
                        %stdout,
                        %stderr,
                        "handler process exited non-zero"
                    );
                }
            }
            Err(err) => {
                warn!(error = %err, handler = ?handler_bin, "failed to spawn handler process");
            }
        }
    }

    async fn write_payload(&self, payload: &HandlerPayload) -> std::io::Result<PathBuf> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        let path = self.payload_dir.join(payload_file_name());
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Runs forever, sweeping payload files older than 24 hours every
    /// hour. Intended to be spawned as its own task at startup.
    pub async fn run_sweep(&self) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_once().await {
                warn!(error = %err, "payload sweep failed to read directory");
            }
        }
    }

    /// A single sweep pass, exposed separately from [`run_sweep`] for
    /// testing.
    ///
    /// # Errors
    ///
    /// Propagates a failure to read the payload directory itself; errors
    /// removing individual files are logged and skipped.
    pub async fn sweep_once(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.payload_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_payload_file(name) {
                continue;
            }
            if file_is_stale(&entry.path()).await.unwrap_or(false) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(err) => warn!(error = %err, file = name, "failed to remove stale payload"),
                }
            }
        }
        if removed > 0 {
            info!(removed, "swept stale handler payloads");
        }
        Ok(removed)
    }
}

fn is_payload_file(name: &str) -> bool {
    name.starts_with(PAYLOAD_PREFIX) && name.ends_with(PAYLOAD_SUFFIX)
}

async fn file_is_stale(path: &Path) -> std::io::Result<bool> {
    let metadata = tokio::fs::metadata(path).await?;
    let modified = metadata.modified()?;
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    Ok(age >= PAYLOAD_MAX_AGE)
}

fn payload_file_name() -> String {
    let unix_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let random: u32 = rand::rng().random();
    format!("{PAYLOAD_PREFIX}{unix_ts}_{random:08x}{PAYLOAD_SUFFIX}")
}
