//! Lifecycle of the backend process: spawn, stream its output, watch for exit, terminate.


use std::{
    fs,
    io::ErrorKind,
    os::unix::fs::PermissionsExt as _,
    path::Path,
    pin::pin,
    process::Stdio,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures_lite::StreamExt as _;
use nix::{
    errno::Errno,
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use tokio::{
    process::{Child, ChildStderr, ChildStdout, Command},
    sync::mpsc,
    task::{spawn, JoinHandle},
};
use tracing::instrument;

use crate::{
    error::{BackendLost, DecodeError, SpawnError},
    line_reader::LineReader,
    protocol::decode_line,
    state::StateModel,
};

/// Process id of a live backend. Cleared exactly once, by `stop` or by the exit watch.
///
/// Records are only applied while holding this lock with the id still present.
type Attachment = Arc<Mutex<Option<u32>>>;

fn lock(attachment: &Attachment) -> MutexGuard<'_, Option<u32>> {
    attachment.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running (or exited) backend. Never reused: a restart creates a new handle.
pub struct BackendHandle {
    attachment: Attachment,
    stdout_reader: JoinHandle<()>,
    stderr_reader: JoinHandle<()>,
    exit_watch: JoinHandle<()>,
}

impl BackendHandle {
    /// `None` once the process has been stopped or has exited.
    #[must_use]
    pub fn process_id(&self) -> Option<u32> {
        *lock(&self.attachment)
    }

    fn terminate(&mut self) {
        if let Some(pid) = lock(&self.attachment).take() {
            tracing::info!(pid, "Stopping backend");
            send_sigterm(pid);
        }
        // Dropping the readers closes the pipes; dropping the exit watch leaves reaping to tokio.
        self.stdout_reader.abort();
        self.stderr_reader.abort();
        self.exit_watch.abort();
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn send_sigterm(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        tracing::error!(pid, "Process id out of range, cannot signal backend");
        return;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => tracing::debug!(pid, "Backend already exited"),
        Err(e) => tracing::warn!(pid, %e, "Failed to send SIGTERM to backend"),
    }
}

pub struct BackendSupervisor {
    model: Arc<StateModel>,
    lost_sender: mpsc::UnboundedSender<BackendLost>,
}

impl BackendSupervisor {
    /// Create a supervisor feeding `model`. Every backend that exits while attached is reported
    /// once on the returned receiver.
    #[must_use]
    pub fn new(model: Arc<StateModel>) -> (Self, mpsc::UnboundedReceiver<BackendLost>) {
        let (lost_sender, lost_receiver) = mpsc::unbounded_channel();
        (Self { model, lost_sender }, lost_receiver)
    }

    /// Spawn the backend with `working_dir` as its working directory and start streaming its
    /// output. Must be called from within the tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable is missing, not executable, or cannot be spawned.
    #[instrument(skip_all, fields(executable = %executable.display()))]
    pub fn start(&self, executable: &Path, working_dir: &Path) -> Result<BackendHandle, SpawnError> {
        check_executable(executable)?;

        let mut child = Command::new(executable)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                path: executable.to_owned(),
                source,
            })?;
        let (pid, stdout, stderr) = match take_pipes(&mut child) {
            Ok(i) => i,
            Err(e) => {
                kill_half_started(&mut child);
                return Err(e);
            }
        };
        tracing::info!(pid, "Backend started");

        let attachment = Arc::new(Mutex::new(Some(pid)));
        Ok(BackendHandle {
            stdout_reader: spawn(forward_records(
                LineReader::new("stdout", stdout),
                pid,
                Arc::clone(&attachment),
                Arc::clone(&self.model),
            )),
            stderr_reader: spawn(log_diagnostics(LineReader::new("stderr", stderr), pid)),
            exit_watch: spawn(watch_exit(
                child,
                pid,
                Arc::clone(&attachment),
                Arc::clone(&self.model),
                self.lost_sender.clone(),
            )),
            attachment,
        })
    }

    /// Ask the backend to terminate and release its readers. Returns without waiting for the
    /// process to exit. Calling it again is a no-op.
    pub fn stop(&self, handle: &mut BackendHandle) {
        handle.terminate();
    }
}

fn check_executable(path: &Path) -> Result<(), SpawnError> {
    let metadata = fs::metadata(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => SpawnError::NotFound(path.to_owned()),
        _ => SpawnError::Spawn {
            path: path.to_owned(),
            source,
        },
    })?;
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(SpawnError::NotExecutable(path.to_owned()));
    }
    Ok(())
}

/// Returns whether the kill request was delivered.
fn kill_half_started(child: &mut Child) -> bool {
    match child.start_kill() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(%e, "Failed to kill half-started backend");
            false
        }
    }
}

fn take_pipes(child: &mut Child) -> Result<(u32, ChildStdout, ChildStderr), SpawnError> {
    let pid = child.id().ok_or(SpawnError::Vanished)?;
    let stdout = child.stdout.take().ok_or(SpawnError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(SpawnError::MissingPipe("stderr"))?;
    Ok((pid, stdout, stderr))
}

async fn forward_records(
    mut reader: LineReader<ChildStdout>,
    pid: u32,
    attachment: Attachment,
    model: Arc<StateModel>,
) {
    while let Some(line) = reader.next_line().await {
        let state = match decode_line(&line) {
            Ok(state) => state,
            Err(DecodeError::NotARecord) => {
                tracing::debug!(pid, %line, "Backend output");
                continue;
            }
            Err(e) => {
                tracing::warn!(pid, %e, %line, "Dropping malformed backend record");
                continue;
            }
        };

        let attached = lock(&attachment);
        if attached.is_none() {
            tracing::debug!(pid, "Backend detached, discarding remaining output");
            return;
        }
        model.update(state);
    }
}

async fn log_diagnostics(reader: LineReader<ChildStderr>, pid: u32) {
    let mut lines = pin!(reader.into_stream());
    while let Some(line) = lines.next().await {
        tracing::info!(pid, stream = "stderr", "{line}");
    }
}

async fn watch_exit(
    mut child: Child,
    pid: u32,
    attachment: Attachment,
    model: Arc<StateModel>,
    lost_sender: mpsc::UnboundedSender<BackendLost>,
) {
    let status = child
        .wait()
        .await
        .inspect_err(|e| tracing::warn!(pid, ?e, "Failed to collect backend exit status"))
        .ok();

    let mut attached = lock(&attachment);
    if attached.take().is_none() {
        tracing::debug!(pid, ?status, "Backend exited after stop");
        return;
    }
    tracing::warn!(pid, ?status, "Backend exited unexpectedly");
    model.reset();
    drop(attached);

    if lost_sender.send(BackendLost { pid, status }).is_err() {
        tracing::debug!(pid, "Nobody is listening for lost backends");
    }
}
