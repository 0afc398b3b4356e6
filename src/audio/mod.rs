use async_trait::async_trait;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::adapters::SpeechAdapter;
use crate::content::{ContentUnit, ServiceResult};
use crate::utils::word_count;
use crate::{ProcessingError, Result};

/// Default segment size for chunked transcription (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Progress reached once every segment is transcribed; the rest is post-processing
pub const TRANSCRIPTION_PROGRESS_CEILING: u8 = 80;

/// Progress reported once synthesis and duration probing are done
pub const POST_PROCESSING_PROGRESS: u8 = 90;

/// Reports the playing time of an audio payload
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration in seconds, or `None` when it cannot be determined
    async fn probe(&self, content: &ContentUnit) -> Result<Option<f64>>;
}

/// Duration probe that never reports anything
pub struct NoopDurationProbe;

#[async_trait]
impl DurationProbe for NoopDurationProbe {
    async fn probe(&self, _content: &ContentUnit) -> Result<Option<f64>> {
        Ok(None)
    }
}

/// Duration probe backed by `ffprobe`
pub struct FfprobeDurationProbe {
    binary: String,
}

impl FfprobeDurationProbe {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn probe(&self, content: &ContentUnit) -> Result<Option<f64>> {
        // ffprobe needs a seekable file
        let mut file = tempfile::Builder::new()
            .prefix("accessify-probe-")
            .suffix(&format!(".{}", content.format()))
            .tempfile()?;
        file.write_all(content.data())?;
        file.flush()?;

        let output = Command::new(&self.binary)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(file.path())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            tracing::debug!("ffprobe could not analyze {}: {}", content.name(), error);
            return Ok(None);
        }

        let info: serde_json::Value = match serde_json::from_slice(&output.stdout) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("Unreadable ffprobe output for {}: {}", content.name(), e);
                return Ok(None);
            }
        };

        Ok(info["format"]["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok()))
    }
}

/// Transcribes audio in fixed-size byte segments, strictly in order, then
/// optionally narrates the joined transcript.
pub struct ChunkedAudioProcessor {
    speech: Arc<dyn SpeechAdapter>,
    probe: Arc<dyn DurationProbe>,
    chunk_size: usize,
    voice: Option<String>,
}

impl ChunkedAudioProcessor {
    pub fn new(speech: Arc<dyn SpeechAdapter>, probe: Arc<dyn DurationProbe>) -> Self {
        Self {
            speech,
            probe,
            chunk_size: DEFAULT_CHUNK_SIZE,
            voice: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Voice used to narrate the transcript; `None` disables synthesis
    pub fn with_voice(mut self, voice: Option<String>) -> Self {
        self.voice = voice;
        self
    }

    /// Number of segments a payload of `size` bytes is split into
    pub fn chunk_count(&self, size: usize) -> usize {
        size.div_ceil(self.chunk_size)
    }

    pub async fn process(
        &self,
        content: &ContentUnit,
        cancel: &CancellationToken,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<ServiceResult> {
        let size = content.data().len();
        let chunks = self.chunk_count(size);

        tracing::info!(
            name = content.name(),
            bytes = size,
            chunks,
            "Starting chunked transcription"
        );

        let mut transcripts = Vec::with_capacity(chunks);
        for index in 0..chunks {
            if cancel.is_cancelled() {
                tracing::info!(chunk = index, "Transcription cancelled");
                return Err(ProcessingError::Cancelled);
            }

            let start = index * self.chunk_size;
            let segment = content.slice(start..start + self.chunk_size);

            let text = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProcessingError::Cancelled),
                text = self.speech.transcribe(&segment) => text?,
            };
            tracing::debug!(chunk = index, chars = text.len(), "Segment transcribed");
            transcripts.push(text);

            let done = ((index + 1) * TRANSCRIPTION_PROGRESS_CEILING as usize) / chunks;
            progress(done as u8);
        }

        let transcript = transcripts.join(" ").trim().to_string();

        let audio = match &self.voice {
            Some(voice) if !transcript.is_empty() => {
                match self.speech.synthesize(&transcript, voice).await {
                    Ok(audio) => Some(audio),
                    Err(e) => {
                        tracing::warn!("Narration unavailable, continuing without audio: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let duration = match self.probe.probe(content).await {
            Ok(duration) => duration,
            Err(e) => {
                tracing::warn!("Could not determine audio duration: {}", e);
                None
            }
        };
        progress(POST_PROCESSING_PROGRESS);

        let analysis = json!({
            "duration": duration,
            "format": content.format(),
            "size": content.size(),
            "method": "chunked",
            "chunks": chunks,
            "wordCount": word_count(&transcript),
        });

        Ok(ServiceResult {
            accessible: transcript,
            analysis: serde_json::to_string_pretty(&analysis).unwrap_or_else(|_| analysis.to_string()),
            audio,
        })
    }
}
