use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{EngineError, EngineEvent, EngineInvocation, TranscodeEngine, EVENT_BUFFER};

/// Runs the `ffmpeg` binary and turns its output into engine events
pub struct FfmpegEngine {
    ffmpeg_bin: PathBuf,
}

impl FfmpegEngine {
    pub fn new(ffmpeg_bin: PathBuf) -> Self {
        Self { ffmpeg_bin }
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn start(&self, invocation: EngineInvocation) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(run_ffmpeg(self.ffmpeg_bin.clone(), invocation, tx));
        rx
    }

    async fn probe(&self) -> Result<String, EngineError> {
        let output = Command::new(&self.ffmpeg_bin)
            .arg("-version")
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                bin: self.ffmpeg_bin.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(EngineError::Unavailable(format!(
                "ffmpeg -version exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .ok_or_else(|| EngineError::Unavailable("Empty output from ffmpeg -version".into()))
    }
}

async fn run_ffmpeg(bin: PathBuf, invocation: EngineInvocation, tx: mpsc::Sender<EngineEvent>) {
    let args = invocation.to_args();
    let command_line = format!("{} {}", bin.display(), args.join(" "));
    debug!("Executing FFmpeg: {}", command_line);

    let spawned = Command::new(&bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            let reason = format!("Failed to spawn FFmpeg at {}: {}", bin.display(), e);
            let _ = tx.send(EngineEvent::Failed { reason }).await;
            return;
        }
    };

    let _ = tx.send(EngineEvent::Started { command_line }).await;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.kill().await;
        let reason = "Failed to capture FFmpeg output".to_string();
        let _ = tx.send(EngineEvent::Failed { reason }).await;
        return;
    };

    let mut progress_lines = LossyLines::new(stdout);
    let mut log_lines = LossyLines::new(stderr);
    let mut progress_done = false;
    let mut log_done = false;

    let mut duration_secs: Option<f64> = None;
    let mut block = ProgressBlock::default();
    let mut last_log_line: Option<String> = None;

    // Both pipes are drained to EOF; a pipe left unread can block ffmpeg forever
    while !(progress_done && log_done) {
        tokio::select! {
            line = progress_lines.next_line(), if !progress_done => match line {
                Ok(Some(line)) => {
                    if let Some(event) = block.feed(&line, duration_secs) {
                        let _ = tx.send(event).await;
                    }
                }
                Ok(None) => progress_done = true,
                Err(e) => {
                    warn!("Failed to read FFmpeg progress output: {}", e);
                    let _ = child.start_kill();
                    progress_done = true;
                }
            },
            line = log_lines.next_line(), if !log_done => match line {
                Ok(Some(line)) => {
                    if duration_secs.is_none() {
                        duration_secs = parse_duration_line(&line);
                    }
                    if !line.trim().is_empty() {
                        last_log_line = Some(line.clone());
                    }
                    let _ = tx.send(EngineEvent::Diagnostic(line)).await;
                }
                Ok(None) => log_done = true,
                Err(e) => {
                    warn!("Failed to read FFmpeg log output: {}", e);
                    let _ = child.start_kill();
                    log_done = true;
                }
            },
        }
    }

    let terminal = match child.wait().await {
        Ok(status) if status.success() => {
            info!("FFmpeg execution completed successfully");
            EngineEvent::Finished
        }
        Ok(status) => EngineEvent::Failed {
            reason: format!(
                "FFmpeg exited with code {}: {}",
                status.code().unwrap_or(-1),
                last_log_line.unwrap_or_else(|| "no output".to_string())
            ),
        },
        Err(e) => EngineEvent::Failed {
            reason: format!("Failed to wait for FFmpeg process: {}", e),
        },
    };
    let _ = tx.send(terminal).await;
}

/// Newline-delimited reader that decodes lines lossily, so stray non-UTF-8
/// bytes (e.g. Latin-1 metadata) never end the stream
struct LossyLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LossyLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, `None` at end of stream.
    /// Bytes read by a cancelled call stay buffered for the next one.
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.reader.read_until(b'\n', &mut self.buf).await?;
        if self.buf.is_empty() {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }
}

/// Accumulates one `-progress` block (`key=value` lines ending in
/// `progress=continue` or `progress=end`)
#[derive(Debug, Default)]
struct ProgressBlock {
    out_time: Option<String>,
}

impl ProgressBlock {
    fn feed(&mut self, line: &str, duration_secs: Option<f64>) -> Option<EngineEvent> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time" => {
                self.out_time = Some(value.to_string());
                None
            }
            "progress" => {
                let out_time = self.out_time.take();
                let position = out_time.as_deref().and_then(parse_timestamp);
                let percent = match (position, duration_secs) {
                    (Some(position), Some(total)) if total > 0.0 => {
                        Some((position / total * 100.0).min(100.0))
                    }
                    _ => None,
                };
                Some(EngineEvent::Progress {
                    percent,
                    timemark: out_time.map(|t| timemark(&t)),
                })
            }
            _ => None,
        }
    }
}

/// `00:01:02.500000` -> `00:01:02.50`
fn timemark(out_time: &str) -> String {
    match out_time.split_once('.') {
        Some((whole, frac)) => format!("{}.{}", whole, frac.get(..2).unwrap_or(frac)),
        None => out_time.to_string(),
    }
}

/// Seconds in a `HH:MM:SS(.fraction)` timestamp; negative or malformed
/// values yield `None`.
fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.trim().split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Total duration from the stderr header, e.g.
/// `  Duration: 00:00:30.03, start: 0.000000, bitrate: 1205 kb/s`
fn parse_duration_line(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let value = rest.split(',').next()?.trim();
    parse_timestamp(value)
}
