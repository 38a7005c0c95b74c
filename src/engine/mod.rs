use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::jobs::EngineParameters;

pub mod ffmpeg;

pub use ffmpeg::FfmpegEngine;

/// Buffer size of the per-run event channel
pub const EVENT_BUFFER: usize = 64;

/// One message from a running transcode
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The engine process is up; carries the resolved command line
    Started { command_line: String },
    /// Completion in percent (0-100) when the engine can tell, plus the
    /// position reached in the media
    Progress {
        percent: Option<f64>,
        timemark: Option<String>,
    },
    /// Side-channel output; never terminal
    Diagnostic(String),
    Finished,
    Failed { reason: String },
}

impl EngineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineEvent::Finished | EngineEvent::Failed { .. })
    }
}

/// Everything the engine needs to transform one file
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInvocation {
    pub input: PathBuf,
    pub output: PathBuf,
    pub params: EngineParameters,
}

impl EngineInvocation {
    /// Full argument list. The quality-dependent part comes from the
    /// resolved parameters; pixel format, container layout and muxing queue
    /// are fixed.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            self.input.display().to_string(),
            "-c:v".into(),
            "libx264".into(),
            "-c:a".into(),
            "aac".into(),
            "-crf".into(),
            self.params.quality_factor.to_string(),
            "-preset".into(),
            self.params.speed_preset.ffmpeg_name().into(),
            "-b:a".into(),
            self.params.audio_bitrate(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-movflags".into(),
            "+faststart".into(),
            "-max_muxing_queue_size".into(),
            "9999".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-nostats".into(),
            self.output.display().to_string(),
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to execute {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine check failed: {0}")]
    Unavailable(String),
}

/// External transcoding engine driven through its event stream
///
/// `start` never fails directly: problems launching the engine arrive as a
/// `Failed` event so the consumer has a single place to handle termination.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    fn start(&self, invocation: EngineInvocation) -> mpsc::Receiver<EngineEvent>;

    /// Check the engine is usable and report its version line
    async fn probe(&self) -> Result<String, EngineError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Engine that replays a fixed event script
    ///
    /// Right before a terminal event it writes `output` (if any) to the
    /// invocation's output path.
    pub(crate) struct ScriptedEngine {
        events: Vec<EngineEvent>,
        output: Option<Vec<u8>>,
        invocations: Mutex<Vec<EngineInvocation>>,
    }

    impl ScriptedEngine {
        pub(crate) fn new(events: Vec<EngineEvent>, output: Option<Vec<u8>>) -> Self {
            Self {
                events,
                output,
                invocations: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn succeeding(output: &[u8]) -> Self {
            Self::new(
                vec![
                    EngineEvent::Started {
                        command_line: "ffmpeg -i input output".into(),
                    },
                    EngineEvent::Progress {
                        percent: Some(40.0),
                        timemark: Some("00:00:04.00".into()),
                    },
                    EngineEvent::Progress {
                        percent: Some(100.0),
                        timemark: Some("00:00:10.00".into()),
                    },
                    EngineEvent::Finished,
                ],
                Some(output.to_vec()),
            )
        }

        pub(crate) fn failing(reason: &str, partial_output: Option<&[u8]>) -> Self {
            Self::new(
                vec![
                    EngineEvent::Started {
                        command_line: "ffmpeg -i input output".into(),
                    },
                    EngineEvent::Failed {
                        reason: reason.into(),
                    },
                ],
                partial_output.map(|bytes| bytes.to_vec()),
            )
        }

        pub(crate) fn invocations(&self) -> Vec<EngineInvocation> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranscodeEngine for ScriptedEngine {
        fn start(&self, invocation: EngineInvocation) -> mpsc::Receiver<EngineEvent> {
            self.invocations.lock().unwrap().push(invocation.clone());
            let (tx, rx) = mpsc::channel(EVENT_BUFFER);
            let events = self.events.clone();
            let output = self.output.clone();

            tokio::spawn(async move {
                for event in events {
                    if event.is_terminal() {
                        if let Some(bytes) = &output {
                            tokio::fs::write(&invocation.output, bytes).await.unwrap();
                        }
                    }
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            });

            rx
        }

        async fn probe(&self) -> Result<String, EngineError> {
            Ok("scripted engine 1.0".to_string())
        }
    }
}
