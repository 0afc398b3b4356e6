use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::content::{AudioArtifact, ContentUnit};
use crate::Result;

pub mod openai;

pub use openai::{InferenceClient, OpenAiDocument, OpenAiSpeech, OpenAiTextAnalysis, OpenAiVision};

/// Bounds applied to every generative request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

/// Caption, tags and any legible text found in an image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    pub caption: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, alias = "text", skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

/// Text of one document page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageText {
    #[serde(default, alias = "page")]
    pub page_number: u32,

    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub page_count: Option<u32>,
}

/// Structured result of a document parse
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedDocument {
    pub text: String,
    pub pages: Vec<PageText>,
    pub metadata: DocumentMetadata,
    pub summary: Option<String>,
    pub simplified_text: Option<String>,
}

impl ParsedDocument {
    /// Page count from metadata, falling back to the number of parsed pages
    pub fn page_count(&self) -> u32 {
        self.metadata
            .page_count
            .unwrap_or(self.pages.len() as u32)
    }
}

/// Speech-to-text and text-to-speech
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechAdapter: Send + Sync {
    async fn transcribe(&self, content: &ContentUnit) -> Result<String>;

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioArtifact>;
}

/// Image captioning, tagging and visual question answering
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionAdapter: Send + Sync {
    async fn analyze(&self, content: &ContentUnit) -> Result<ImageAnalysis>;

    async fn answer_question(&self, content: &ContentUnit, question: &str) -> Result<String>;
}

/// PDF text extraction and structuring
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentAdapter: Send + Sync {
    async fn parse(&self, content: &ContentUnit) -> Result<ParsedDocument>;
}

/// Generic language transformations over plain text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextAnalysisAdapter: Send + Sync {
    async fn simplify(&self, text: &str) -> Result<String>;

    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Strip a surrounding Markdown code fence, if the model added one
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (e.g. `json`) on the opening line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  ```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("plain caption"), "plain caption");
    }

    #[test]
    fn test_image_analysis_accepts_text_alias() {
        let parsed: ImageAnalysis =
            serde_json::from_str(r#"{"caption":"A stop sign","tags":["sign"],"text":"STOP"}"#).unwrap();
        assert_eq!(parsed.extracted_text.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_parsed_document_page_count() {
        let doc: ParsedDocument = serde_json::from_str(
            r#"{"text":"a b","pages":[{"page":1,"text":"a"},{"page":2,"text":"b"}],"simplifiedText":"ab"}"#,
        )
        .unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.pages[1].page_number, 2);
        assert_eq!(doc.simplified_text.as_deref(), Some("ab"));
    }
}
