//! Adapters for an OpenAI-compatible inference API.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{multipart, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    strip_code_fences, DocumentAdapter, ImageAnalysis, ParsedDocument, Sampling, SpeechAdapter,
    TextAnalysisAdapter, VisionAdapter,
};
use crate::content::{AudioArtifact, ContentUnit};
use crate::{ProcessingError, Result};

const ANALYZE_IMAGE_PROMPT: &str = "Describe this image for a person who cannot see it. \
Respond with a JSON object with the keys \"caption\" (one or two sentences of alt text), \
\"tags\" (an array of short keywords) and \"text\" (any legible text in the image, or null).";

const PARSE_DOCUMENT_PROMPT: &str = "Extract the content of this PDF for accessibility. \
Respond with a JSON object with the keys \"text\" (the full text in reading order), \
\"pages\" (an array of {\"page\": number, \"text\": string}), \
\"metadata\" ({\"title\", \"author\", \"pageCount\"}), \
\"summary\" (three sentences or fewer) and \
\"simplifiedText\" (the content rewritten in plain language at a grade 6 reading level).";

const SIMPLIFY_PROMPT: &str = "Rewrite the following text in plain language that is easy to read. \
Use short sentences and common words. Keep every fact. Reply with the rewritten text only.";

const SUMMARIZE_PROMPT: &str = "Summarize the following text in three sentences or fewer. \
Reply with the summary only.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Shared HTTP client for one inference endpoint
#[derive(Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl InferenceClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}/{}", self.base_url, path))
    }

    /// Send a request and return the successful response, or a readable
    /// description of what went wrong
    async fn send(&self, request: reqwest::RequestBuilder) -> std::result::Result<reqwest::Response, String> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| format!("request: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(format!("status {}: {}", status, body));
        }

        Ok(response)
    }

    /// Run a chat completion and return the assistant's text
    async fn chat(&self, model: &str, messages: Value, sampling: Sampling) -> std::result::Result<String, String> {
        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": sampling.temperature,
            "max_tokens": sampling.max_tokens,
            "stream": false
        });

        let response = self
            .send(self.post("chat/completions").json(&body))
            .await?;

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid completion body: {}", e))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| "completion contained no message".to_string())
    }
}

fn data_uri(content: &ContentUnit) -> String {
    format!("data:{};base64,{}", content.mime_type(), STANDARD.encode(content.data()))
}

/// Speech-to-text via `/audio/transcriptions`, text-to-speech via `/audio/speech`
pub struct OpenAiSpeech {
    client: InferenceClient,
    transcription_model: String,
    speech_model: String,
}

impl OpenAiSpeech {
    pub fn new(client: InferenceClient, transcription_model: &str, speech_model: &str) -> Self {
        Self {
            client,
            transcription_model: transcription_model.to_string(),
            speech_model: speech_model.to_string(),
        }
    }
}

#[async_trait]
impl SpeechAdapter for OpenAiSpeech {
    async fn transcribe(&self, content: &ContentUnit) -> Result<String> {
        let file_part = multipart::Part::bytes(content.data().to_vec())
            .file_name(content.name().to_string())
            .mime_str(content.mime_type())
            .map_err(|e| ProcessingError::TranscriptionFailed(format!("mime: {}", e)))?;

        let form = multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .text("response_format", "text")
            .part("file", file_part);

        tracing::debug!(
            model = %self.transcription_model,
            bytes = content.size(),
            "Sending audio segment for transcription"
        );

        let response = self
            .client
            .send(self.client.post("audio/transcriptions").multipart(form))
            .await
            .map_err(ProcessingError::TranscriptionFailed)?;

        let transcript = response
            .text()
            .await
            .map_err(|e| ProcessingError::TranscriptionFailed(format!("body: {}", e)))?;

        Ok(transcript.trim().to_string())
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioArtifact> {
        let body = json!({
            "model": self.speech_model,
            "input": text,
            "voice": voice_id,
            "response_format": "mp3"
        });

        let response = self
            .client
            .send(self.client.post("audio/speech").json(&body))
            .await
            .map_err(ProcessingError::SynthesisFailed)?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| ProcessingError::SynthesisFailed(format!("body: {}", e)))?;

        if data.is_empty() {
            return Err(ProcessingError::SynthesisFailed("empty audio response".to_string()));
        }

        tracing::info!(bytes = data.len(), voice = voice_id, "Speech synthesis completed");

        Ok(AudioArtifact {
            mime_type,
            data: data.to_vec(),
        })
    }
}

/// Captioning and visual question answering through chat completions
pub struct OpenAiVision {
    client: InferenceClient,
    model: String,
    sampling: Sampling,
}

impl OpenAiVision {
    pub fn new(client: InferenceClient, model: &str, sampling: Sampling) -> Self {
        Self {
            client,
            model: model.to_string(),
            sampling,
        }
    }

    async fn ask(&self, content: &ContentUnit, prompt: &str) -> Result<String> {
        let messages = json!([
            {
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": data_uri(content) } },
                    { "type": "text", "text": prompt }
                ]
            }
        ]);

        self.client
            .chat(&self.model, messages, self.sampling)
            .await
            .map_err(ProcessingError::AnalysisFailed)
    }
}

#[async_trait]
impl VisionAdapter for OpenAiVision {
    async fn analyze(&self, content: &ContentUnit) -> Result<ImageAnalysis> {
        let raw = self.ask(content, ANALYZE_IMAGE_PROMPT).await?;

        match serde_json::from_str::<ImageAnalysis>(strip_code_fences(&raw)) {
            Ok(analysis) => Ok(analysis),
            Err(e) => {
                // Fall back to the raw reply as the caption
                tracing::debug!("Vision reply was not structured JSON ({}), using it as caption", e);
                Ok(ImageAnalysis {
                    caption: raw,
                    tags: Vec::new(),
                    extracted_text: None,
                })
            }
        }
    }

    async fn answer_question(&self, content: &ContentUnit, question: &str) -> Result<String> {
        self.ask(content, question).await
    }
}

/// PDF understanding through chat completions with a file content part
pub struct OpenAiDocument {
    client: InferenceClient,
    model: String,
    sampling: Sampling,
}

impl OpenAiDocument {
    pub fn new(client: InferenceClient, model: &str, sampling: Sampling) -> Self {
        Self {
            client,
            model: model.to_string(),
            sampling,
        }
    }
}

#[async_trait]
impl DocumentAdapter for OpenAiDocument {
    async fn parse(&self, content: &ContentUnit) -> Result<ParsedDocument> {
        let messages = json!([
            {
                "role": "user",
                "content": [
                    {
                        "type": "file",
                        "file": { "filename": content.name(), "file_data": data_uri(content) }
                    },
                    { "type": "text", "text": PARSE_DOCUMENT_PROMPT }
                ]
            }
        ]);

        let raw = self
            .client
            .chat(&self.model, messages, self.sampling)
            .await
            .map_err(ProcessingError::DocumentParseFailed)?;

        match serde_json::from_str::<ParsedDocument>(strip_code_fences(&raw)) {
            Ok(document) => Ok(document),
            Err(e) => {
                tracing::debug!("Document reply was not structured JSON ({}), using it as text", e);
                Ok(ParsedDocument {
                    text: raw,
                    ..ParsedDocument::default()
                })
            }
        }
    }
}

/// Plain-language rewriting and summaries
pub struct OpenAiTextAnalysis {
    client: InferenceClient,
    model: String,
    sampling: Sampling,
}

impl OpenAiTextAnalysis {
    pub fn new(client: InferenceClient, model: &str, sampling: Sampling) -> Self {
        Self {
            client,
            model: model.to_string(),
            sampling,
        }
    }

    async fn run(&self, instruction: &str, text: &str) -> Result<String> {
        let messages = json!([
            { "role": "system", "content": instruction },
            { "role": "user", "content": text }
        ]);

        self.client
            .chat(&self.model, messages, self.sampling)
            .await
            .map_err(ProcessingError::AnalysisFailed)
    }
}

#[async_trait]
impl TextAnalysisAdapter for OpenAiTextAnalysis {
    async fn simplify(&self, text: &str) -> Result<String> {
        self.run(SIMPLIFY_PROMPT, text).await
    }

    async fn summarize(&self, text: &str) -> Result<String> {
        self.run(SUMMARIZE_PROMPT, text).await
    }
}
