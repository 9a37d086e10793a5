//! External downloader process

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::queue::{CONTEXT_CHANNEL_ID, Descriptor, TaskKind};
use crate::worker::{TaskError, TaskHandler, TaskOutcome};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for downloader: {0}")]
    Wait(#[source] std::io::Error),

    #[error("downloader timed out after {0:?}")]
    TimedOut(Duration),
}

/// Exit status of a finished downloader run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadStatus {
    pub success: bool,
    /// None when terminated by a signal
    pub code: Option<i32>,
}

/// Runs the downloader binary for one video id
#[derive(Debug, Clone)]
pub struct Downloader {
    binary: String,
    output_template: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl Downloader {
    pub fn new(config: &DownloadConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            output_template: config.output_template.clone(),
            extra_args: config.extra_args.clone(),
            timeout: config.timeout.as_duration(),
        }
    }

    /// Spawn the downloader and wait for it, bounded by the configured timeout
    ///
    /// Both output streams are drained concurrently into the log so a chatty
    /// child can never block on a full pipe. On timeout the child is killed.
    pub async fn run(&self, video_id: &str) -> Result<DownloadStatus, DownloadError> {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.extra_args)
            .arg("-o")
            .arg(&self.output_template)
            .arg("--")
            .arg(video_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| DownloadError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        info!(video_id, binary = %self.binary, "Downloader started");

        let mut stdout_task = tokio::spawn(drain_stream(
            child.stdout.take(),
            video_id.to_string(),
            "stdout",
        ));
        let mut stderr_task = tokio::spawn(drain_stream(
            child.stderr.take(),
            video_id.to_string(),
            "stderr",
        ));

        let waited = tokio::time::timeout(self.timeout, async {
            // Drains finish when the child closes its pipes
            let (stdout_lines, stderr_lines) = tokio::join!(&mut stdout_task, &mut stderr_task);
            debug!(
                video_id,
                stdout_lines = stdout_lines.unwrap_or_default(),
                stderr_lines = stderr_lines.unwrap_or_default(),
                "Downloader output drained"
            );
            child.wait().await
        })
        .await;

        match waited {
            Ok(Ok(status)) => {
                let result = DownloadStatus {
                    success: status.success(),
                    code: status.code(),
                };
                info!(video_id, success = result.success, code = ?result.code, "Downloader exited");
                Ok(result)
            }
            Ok(Err(e)) => Err(DownloadError::Wait(e)),
            Err(_) => {
                warn!(video_id, timeout = ?self.timeout, "Downloader timed out, killing");
                stdout_task.abort();
                stderr_task.abort();
                if let Err(e) = child.kill().await {
                    warn!(video_id, error = %e, "Failed to kill downloader");
                }
                Err(DownloadError::TimedOut(self.timeout))
            }
        }
    }
}

/// Forward each line of a child stream into tracing; returns the line count
async fn drain_stream<R>(stream: Option<R>, video_id: String, stream_name: &'static str) -> usize
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return 0;
    };

    let mut lines = BufReader::new(stream).lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                debug!(target: "downloader", video_id = %video_id, stream = stream_name, "{}", line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(target: "downloader", video_id = %video_id, stream = stream_name, error = %e, "Stopped reading output");
                break;
            }
        }
    }
    count
}

/// Drains the VideoFetch queue through the downloader
///
/// A non-zero exit is archived as a failed outcome; spawn errors and
/// timeouts are retried up to the attempt ceiling.
pub struct DownloadHandler {
    downloader: Downloader,
}

impl DownloadHandler {
    pub fn new(downloader: Downloader) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl TaskHandler for DownloadHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::VideoFetch
    }

    async fn handle(&self, descriptor: &Descriptor) -> Result<TaskOutcome, TaskError> {
        let video_id = descriptor.subject_id.as_str();
        let channel_id = descriptor.context_value(CONTEXT_CHANNEL_ID).unwrap_or("unknown");
        debug!(video_id, channel_id, "Downloading video");

        let status = self
            .downloader
            .run(video_id)
            .await
            .map_err(|e| TaskError::Download(e.to_string()))?;

        let outcome = if status.success {
            TaskOutcome::success(format!("downloaded {} for {}", video_id, channel_id))
        } else {
            let code = status
                .code
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            TaskOutcome::failure(format!("downloader exited with {}", code))
        };
        Ok(outcome.without_call())
    }
}
