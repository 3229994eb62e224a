//! ffmpeg process bridge
//!
//! A [`Transcoder`] owns one ffmpeg process that remuxes an MPEG-TS byte
//! stream (fed through [`Transcoder::input`]) into a temporary file, and
//! recovers the resulting resolution and duration from ffmpeg's diagnostic
//! output.
//!
//! ## Lifecycle
//!
//! 1. [`Transcoder::run`] spawns ffmpeg and three background tasks: the pump
//!    (pipe → stdin), the diagnostic drain (stderr → buffer) and the process
//!    task (waits for exit, kills on cancellation).
//! 2. The caller appends data to [`Transcoder::input`] and calls
//!    [`Transcoder::complete_input`].
//! 3. [`Transcoder::result`] waits for everything to finish and parses the
//!    diagnostics.
//! 4. [`Transcoder::dispose`] releases the process, tasks and temporary file.
//!    It must run on every path. `Drop` is a best-effort fallback that kills
//!    ffmpeg and deletes the file without reporting errors.
//!
//! ```no_run
//! use hls_uploader::config::ProcessingConfig;
//! use hls_uploader::transcoder::Transcoder;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cancel = CancellationToken::new();
//! let mut transcoder = Transcoder::new(ProcessingConfig::default());
//! transcoder.run("example", &cancel).await?;
//! transcoder.input()?.write(bytes::Bytes::from_static(b"...")).await?;
//! transcoder.complete_input();
//! let info = transcoder.result(&cancel).await;
//! transcoder.dispose().await?;
//! println!("{:?}", info?);
//! # Ok(())
//! # }
//! ```

mod diagnostics;
pub mod factory;


pub use diagnostics::{Diagnostics, last_line, parse_diagnostics};
pub use factory::TranscoderFactory;

use crate::config::ProcessingConfig;
use crate::error::{Error, Result, TranscodeError};
use crate::pipe::{PipeWriter, pipe};
use crate::pump::{WriterSink, pump};
use crate::types::VideoInfo;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One ffmpeg remux run writing to a temporary file
#[derive(Debug)]
pub struct Transcoder {
    config: ProcessingConfig,
    output_path: Option<PathBuf>,
    writer: Option<PipeWriter>,
    pump_task: Option<JoinHandle<Result<()>>>,
    stderr_task: Option<JoinHandle<()>>,
    process_task: Option<JoinHandle<Result<ExitStatus>>>,
    exit_status: Option<ExitStatus>,
    diagnostics: Arc<Mutex<String>>,
    /// Kills ffmpeg; a child of the run's token so disposal can stop the
    /// process without cancelling the caller
    halt: CancellationToken,
    disposed: bool,
}

impl Transcoder {
    /// Create an idle transcoder; nothing is started until [`run`](Self::run)
    pub fn new(config: ProcessingConfig) -> Self {
        Self {
            config,
            output_path: None,
            writer: None,
            pump_task: None,
            stderr_task: None,
            process_task: None,
            exit_status: None,
            diagnostics: Arc::new(Mutex::new(String::new())),
            halt: CancellationToken::new(),
            disposed: false,
        }
    }

    /// Start ffmpeg writing to the output path derived from `file_id`
    ///
    /// Creates missing parent directories. Cancelling `cancel` afterwards
    /// kills the process and aborts the pump.
    ///
    /// # Errors
    /// [`Error::ExternalTool`] if ffmpeg cannot be started,
    /// [`TranscodeError::AlreadyStarted`] on a second call.
    pub async fn run(&mut self, file_id: &str, cancel: &CancellationToken) -> Result<()> {
        if self.disposed {
            return Err(TranscodeError::Disposed.into());
        }
        if let Some(path) = &self.output_path {
            return Err(TranscodeError::AlreadyStarted { path: path.clone() }.into());
        }

        let output_path = self.config.output_path(file_id);
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::debug!(path = %output_path.display(), "Starting ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .arg("-i")
            .arg("pipe:0")
            .arg("-f")
            .arg(&self.config.container_format)
            .arg("-c")
            .arg("copy")
            .arg(&output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::ExternalTool(format!(
                    "Failed to execute {}: {}",
                    self.config.ffmpeg_path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::ExternalTool("Failed to get ffmpeg stdin handle".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("Failed to get ffmpeg stderr handle".to_string()))?;

        let (writer, mut reader) = pipe(self.config.pipe_capacity);

        let pump_cancel = cancel.clone();
        self.pump_task = Some(tokio::spawn(async move {
            let mut sink = WriterSink::new(stdin);
            pump(&mut reader, &mut sink, &pump_cancel).await
        }));

        self.stderr_task = Some(tokio::spawn(drain_diagnostics(
            stderr,
            Arc::clone(&self.diagnostics),
        )));

        self.halt = cancel.child_token();
        let kill_cancel = self.halt.clone();
        self.process_task = Some(tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => {
                        tracing::debug!(status = %status, "ffmpeg exited");
                        Ok(status)
                    }
                    Err(e) => Err(Error::Io(e)),
                },
                _ = kill_cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill ffmpeg");
                    }
                    Err(Error::Cancelled)
                }
            }
        }));

        self.writer = Some(writer);
        self.output_path = Some(output_path);
        Ok(())
    }

    /// Sink feeding ffmpeg's stdin
    ///
    /// # Errors
    /// [`TranscodeError::NotRunning`] before [`run`](Self::run),
    /// [`Error::PipeClosed`] after [`complete_input`](Self::complete_input).
    pub fn input(&self) -> Result<&PipeWriter> {
        if self.disposed {
            return Err(TranscodeError::Disposed.into());
        }
        if self.output_path.is_none() {
            return Err(TranscodeError::NotRunning.into());
        }
        self.writer
            .as_ref()
            .ok_or_else(|| Error::PipeClosed("transcoder input already completed".to_string()))
    }

    /// Signal that no more input follows; ffmpeg sees EOF once the pipe drains
    pub fn complete_input(&mut self) {
        self.writer = None;
    }

    /// Output path of the current run
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Whether [`dispose`](Self::dispose) has run
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Wait for ffmpeg to finish and return the video metadata
    ///
    /// Waits for the pump, then the process, then the diagnostic drain.
    ///
    /// # Errors
    /// [`TranscodeError::ProcessFailed`] on a non-zero exit,
    /// [`TranscodeError::MissingResolution`] / [`TranscodeError::MissingDuration`]
    /// if the diagnostics lack a marker, [`Error::Cancelled`] on cancellation.
    pub async fn result(&mut self, cancel: &CancellationToken) -> Result<VideoInfo> {
        if self.disposed {
            return Err(TranscodeError::Disposed.into());
        }
        let path = self
            .output_path
            .clone()
            .ok_or(TranscodeError::NotRunning)?;

        let pumped = match self.pump_task.as_mut() {
            Some(handle) => {
                let outcome = until_cancelled(cancel, handle).await?;
                self.pump_task = None;
                outcome?
            }
            None => Ok(()),
        };
        if matches!(pumped, Err(Error::Cancelled)) {
            return Err(Error::Cancelled);
        }

        if let Some(handle) = self.process_task.as_mut() {
            let outcome = until_cancelled(cancel, handle).await?;
            self.process_task = None;
            self.exit_status = Some(outcome??);
        }
        let status = self.exit_status.ok_or_else(|| {
            Error::Internal("ffmpeg exit status missing after process task finished".to_string())
        })?;

        if let Some(handle) = self.stderr_task.as_mut() {
            let outcome = until_cancelled(cancel, handle).await?;
            self.stderr_task = None;
            outcome?;
        }

        let output = self.diagnostic_output()?;
        if !status.success() {
            return Err(TranscodeError::ProcessFailed {
                status: status.to_string(),
                last_line: last_line(&output),
            }
            .into());
        }
        pumped?;

        let parsed = parse_diagnostics(&output)?;
        Ok(VideoInfo {
            path,
            width: parsed.width,
            height: parsed.height,
            duration_secs: parsed.duration_secs,
        })
    }

    /// Release the process, background tasks, pipe and temporary file
    ///
    /// Idempotent. Closes the input first so the pump can finish, then joins
    /// the pump and the diagnostic drain, kills ffmpeg if it is still running
    /// and deletes the output file. A failure to delete the file is logged;
    /// a panicked background task is returned as [`Error::Internal`].
    pub async fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        tracing::debug!(path = ?self.output_path, "Disposing transcoder");

        self.writer = None;
        let mut failure = None;

        if let Some(handle) = self.pump_task.take() {
            match handle.await {
                Ok(Err(e)) => tracing::debug!(error = %e, "ffmpeg input pump ended with error"),
                Ok(Ok(())) => {}
                Err(e) => failure = failure.or(join_failure(e)),
            }
        }

        if let Some(handle) = self.process_task.take() {
            if !handle.is_finished() {
                self.halt.cancel();
            }
            match handle.await {
                Ok(Ok(status)) => self.exit_status = Some(status),
                Ok(Err(e)) => tracing::debug!(error = %e, "ffmpeg process ended with error"),
                Err(e) => failure = failure.or(join_failure(e)),
            }
        }

        if let Some(handle) = self.stderr_task.take() {
            if let Err(e) = handle.await {
                failure = failure.or(join_failure(e));
            }
        }

        if let Some(path) = &self.output_path {
            match tokio::fs::try_exists(path).await {
                Ok(true) => {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to delete temporary video file");
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to check temporary video file")
                }
            }
        }

        tracing::debug!("Transcoder disposed");
        failure.map_or(Ok(()), Err)
    }

    fn diagnostic_output(&self) -> Result<String> {
        self.diagnostics
            .lock()
            .map(|text| text.clone())
            .map_err(|_| Error::Internal("diagnostic buffer lock poisoned".to_string()))
    }
}

/// Synchronous fallback for a transcoder that was never disposed
///
/// Inside a tokio runtime a still-running ffmpeg is killed and reaped by a
/// spawned task before the output file is deleted, so the process cannot
/// recreate the file afterwards. Without a runtime the process task is only
/// aborted (kill-on-drop) and the file is deleted immediately.
impl Drop for Transcoder {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }

        self.writer = None;
        if let Some(handle) = self.pump_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr_task.take() {
            handle.abort();
        }

        let path = self.output_path.take();
        let running = self.process_task.take().filter(|handle| !handle.is_finished());
        let Some(process) = running else {
            remove_output(path.as_deref());
            return;
        };

        self.halt.cancel();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _ = process.await;
                    remove_output(path.as_deref());
                });
            }
            Err(_) => {
                process.abort();
                remove_output(path.as_deref());
            }
        }
    }
}

fn remove_output(path: Option<&Path>) {
    if let Some(path) = path {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete temporary video file on drop");
            }
        }
    }
}

/// Await `future` unless `cancel` fires first
async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        output = future => Ok(output),
    }
}

/// Only panics are failures; an aborted task was released on purpose
fn join_failure(err: tokio::task::JoinError) -> Option<Error> {
    if err.is_cancelled() {
        None
    } else {
        Some(err.into())
    }
}

/// Collect stderr, splitting on `\n` and on the `\r` ffmpeg uses between
/// progress updates
async fn drain_diagnostics(stderr: ChildStderr, buffer: Arc<Mutex<String>>) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();

    loop {
        let available = match reader.fill_buf().await {
            Ok([]) => break,
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Error reading ffmpeg stderr");
                break;
            }
        };
        let (used, ended) = match available.iter().position(|b| matches!(b, b'\r' | b'\n')) {
            Some(at) => {
                line.extend_from_slice(&available[..at]);
                (at + 1, true)
            }
            None => {
                line.extend_from_slice(available);
                (available.len(), false)
            }
        };
        reader.consume(used);

        if ended {
            record_line(&line, &buffer);
            line.clear();
        }
    }
    record_line(&line, &buffer);
}

fn record_line(raw: &[u8], buffer: &Mutex<String>) {
    if raw.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(raw);
    tracing::debug!(line = %line, "ffmpeg");
    if let Ok(mut text) = buffer.lock() {
        text.push_str(&line);
        text.push('\n');
    }
}
