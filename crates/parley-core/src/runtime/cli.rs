//! CLI-backed agent runtime.
//!
//! Spawns the agent binary in stream-json mode, writes the prompt as a
//! JSON envelope on stdin, and forwards each stdout line as a
//! [`RuntimeEvent`]. The child is killed when the request's cancellation
//! token fires.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::{AgentRuntime, EventReceiver, RuntimeError, RuntimeEvent, RuntimeRequest};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Production [`AgentRuntime`] that drives the agent CLI as a child
/// process, one process per request.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    binary_path: String,
}

impl CliRuntime {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    fn build_args(request: &RuntimeRequest) -> Vec<String> {
        let mut args = vec![
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--input-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];

        if let Some(ref id) = request.resume {
            args.push("--resume".to_string());
            args.push(id.clone());
        }

        args
    }

    fn prompt_envelope(prompt: &str) -> String {
        serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": prompt
            }
        })
        .to_string()
    }
}

/// Parse one stdout line into an event, lifting a `session_id` field out
/// of the payload when present.
fn parse_event_line(line: &str) -> Result<RuntimeEvent, RuntimeError> {
    let payload: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| RuntimeError::Protocol(format!("{e}: {line}")))?;
    let session_id = payload
        .get("session_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Ok(RuntimeEvent {
        session_id,
        payload,
    })
}

impl AgentRuntime for CliRuntime {
    fn start(&self, request: RuntimeRequest) -> Result<EventReceiver, RuntimeError> {
        let mut child = Command::new(&self.binary_path)
            .args(Self::build_args(&request))
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Spawn(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RuntimeError::Spawn("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Spawn("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::Spawn("failed to capture stderr".to_string()))?;

        // Stderr is diagnostic only; log it, never forward it.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::warn!("agent stderr: {}", line);
            }
        });

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let envelope = Self::prompt_envelope(&request.prompt);
        let cancel = request.cancel.clone();

        tokio::spawn(async move {
            if let Err(err) = stdin.write_all(envelope.as_bytes()).await {
                let _ = tx.send(Err(RuntimeError::Io(err))).await;
                let _ = child.start_kill();
                return;
            }
            let _ = stdin.write_all(b"\n").await;
            // One prompt per process; closing stdin tells the agent no
            // follow-up input is coming.
            let _ = stdin.shutdown().await;

            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = child.start_kill();
                        break;
                    }
                    next = lines.next_line() => match next {
                        Ok(Some(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            match parse_event_line(&line) {
                                Ok(event) => {
                                    if tx.send(Ok(event)).await.is_err() {
                                        // Receiver gone; stop the agent too.
                                        let _ = child.start_kill();
                                        break;
                                    }
                                }
                                Err(err) => {
                                    // Non-JSON noise on stdout is skipped,
                                    // not terminal.
                                    log::warn!("skipping agent output line: {}", err);
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            let _ = tx.send(Err(RuntimeError::Io(err))).await;
                            break;
                        }
                    }
                }
            }
            let _ = child.wait().await;
        });

        Ok(rx)
    }
}
