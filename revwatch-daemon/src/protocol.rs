//! Control protocol over `~/.revwatch/daemon.sock`.
//!
//! One JSON object per line in each direction. Requests are tagged by `cmd`:
//!
//! ```text
//! → {"cmd":"reconcile"}
//! ← {"ok":true,"data":{"source":"socket","outcome":"created",...}}
//! ```

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::jobs::RunSummary;
use crate::paths::socket_path;

const STATUS_ATTEMPTS: u32 = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Reconcile,
    Stop,
}

impl ControlRequest {
    /// Decode one request line. The error is the message sent back to the
    /// client.
    pub fn parse(line: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(line).map_err(|err| format!("invalid request JSON: {err}"))?;
        let cmd = value
            .get("cmd")
            .and_then(Value::as_str)
            .ok_or_else(|| "request has no \"cmd\" field".to_string())?
            .to_string();
        serde_json::from_value(value).map_err(|_| format!("unknown command '{cmd}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// `data` on success (`null` if absent); the daemon's message otherwise.
    pub fn into_result(self) -> Result<Value, DaemonError> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.data.unwrap_or(Value::Null)),
            (false, Some(message)) => Err(DaemonError::Protocol(message)),
            (false, None) => Err(DaemonError::Protocol(
                "daemon reported failure without a message".to_string(),
            )),
        }
    }
}

/// Blocking client for the control socket; one connection per call.
#[derive(Debug, Clone)]
pub struct ControlClient {
    socket: PathBuf,
}

impl ControlClient {
    pub fn new(home: &Path) -> Self {
        Self {
            socket: socket_path(home),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Send `request` and return the response's `data`.
    pub fn call(&self, request: ControlRequest) -> Result<Value, DaemonError> {
        let mut stream = self.connect()?;

        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        stream
            .write_all(&line)
            .and_then(|()| stream.flush())
            .map_err(|e| io_err(&self.socket, e))?;

        let mut reply = String::new();
        BufReader::new(stream)
            .read_line(&mut reply)
            .map_err(|e| io_err(&self.socket, e))?;
        if reply.is_empty() {
            return Err(DaemonError::Protocol(format!(
                "no reply to {request:?} before the daemon hung up"
            )));
        }
        serde_json::from_str::<ControlResponse>(&reply)?.into_result()
    }

    /// Daemon status. A daemon that is still binding its socket gets a few
    /// short retries.
    pub fn status(&self) -> Result<Value, DaemonError> {
        let mut attempt = 1;
        loop {
            match self.call(ControlRequest::Status) {
                Err(DaemonError::DaemonNotRunning { .. }) if attempt < STATUS_ATTEMPTS => {
                    attempt += 1;
                    sleep(STATUS_RETRY_DELAY);
                }
                result => return result,
            }
        }
    }

    pub fn stop(&self) -> Result<(), DaemonError> {
        self.call(ControlRequest::Stop).map(drop)
    }

    /// Run one reconciliation through the daemon's processor queue.
    pub fn reconcile(&self) -> Result<RunSummary, DaemonError> {
        let data = self.call(ControlRequest::Reconcile)?;
        Ok(serde_json::from_value(data)?)
    }

    fn connect(&self) -> Result<UnixStream, DaemonError> {
        UnixStream::connect(&self.socket).map_err(|err| match err.kind() {
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                DaemonError::DaemonNotRunning {
                    socket: self.socket.clone(),
                }
            }
            _ => io_err(&self.socket, err),
        })
    }
}
