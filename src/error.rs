//! Error taxonomy shared by the supervisor, the decoders and the bus proxy.

use std::{io, path::PathBuf, process::ExitStatus};

use thiserror::Error;

/// A backend could not be started. Fatal to that start attempt only.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("backend executable not found at {0}")]
    NotFound(PathBuf),
    #[error("backend at {0} is not an executable file")]
    NotExecutable(PathBuf),
    #[error("failed to spawn backend {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("backend process has no {0} pipe")]
    MissingPipe(&'static str),
    #[error("backend process exited before it could be tracked")]
    Vanished,
}

/// A line or bus payload that could not be turned into a state update.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Plain text the backend prints alongside its records.
    #[error("not a state record")]
    NotARecord,
    #[error("malformed state record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid {field}: {value}")]
    InvalidTiming { field: &'static str, value: f64 },
}

/// The remote MusicInfoService interface could not be reached.
#[derive(Error, Debug)]
pub enum BusConnectionError {
    #[error("failed to connect to the session bus: {0}")]
    Session(#[source] zbus::Error),
    #[error("failed to create MusicInfoService proxy: {0}")]
    Proxy(#[source] zbus::Error),
    #[error("failed to subscribe to StateChanged: {0}")]
    Subscribe(#[source] zbus::Error),
}

/// A backend process exited while it was still believed to be running.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("backend process {pid} exited ({})", describe_status(.status))]
pub struct BackendLost {
    pub pid: u32,
    /// `None` when the exit status could not be collected.
    pub status: Option<ExitStatus>,
}

fn describe_status(status: &Option<ExitStatus>) -> String {
    status.map_or_else(|| "unknown status".to_owned(), |s| s.to_string())
}
