use anyhow::Result;
use serde_json::Value;

use crate::pipeline::{PreviewState, ProcessingState};
use crate::utils::format_duration;

/// A follow-up question about processed content and its answer
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub question: String,
    pub answer: String,
}

/// Format a session as human-readable text
pub fn format_as_text(state: &PreviewState, answer: Option<&Answer>) -> String {
    let mut output = String::new();

    if state.status == ProcessingState::Failed {
        output.push_str(&format!(
            "Error: {}\n",
            state.error.as_deref().unwrap_or("processing failed")
        ));
        return output;
    }

    output.push_str("=== Accessible Content ===\n");
    output.push_str(state.accessible.trim());
    output.push_str("\n\n");

    if let Some(kind) = state.content_type {
        match &state.mime_type {
            Some(mime) => output.push_str(&format!("Type: {} ({})\n", kind, mime)),
            None => output.push_str(&format!("Type: {}\n", kind)),
        }
    }
    if let Some(original) = &state.original {
        output.push_str(&format!("Original: {}\n", original));
    }
    if let Some(audio) = &state.audio_url {
        output.push_str(&format!("Narration: {}\n", audio));
    }
    if let Some(seconds) = serde_json::from_str::<Value>(&state.analysis)
        .ok()
        .and_then(|analysis| analysis["duration"].as_f64())
    {
        output.push_str(&format!("Duration: {}\n", format_duration(seconds)));
    }

    if !state.analysis.trim().is_empty() {
        output.push_str("\n=== Analysis ===\n");
        output.push_str(&pretty_analysis(&state.analysis));
        output.push('\n');
    }

    if let Some(answer) = answer {
        output.push_str("\n=== Question ===\n");
        output.push_str(&format!("Q: {}\n", answer.question));
        output.push_str(&format!("A: {}\n", answer.answer));
    }

    output
}

/// Format a session as JSON, embedding the analysis as structured data
pub fn format_as_json(state: &PreviewState, answer: Option<&Answer>) -> Result<String> {
    let mut value = serde_json::to_value(state)?;

    if let Ok(analysis) = serde_json::from_str::<Value>(&state.analysis) {
        value["analysis"] = analysis;
    }

    if let Some(answer) = answer {
        value["question"] = Value::String(answer.question.clone());
        value["answer"] = Value::String(answer.answer.clone());
    }

    Ok(serde_json::to_string_pretty(&value)?)
}

fn pretty_analysis(analysis: &str) -> String {
    serde_json::from_str::<Value>(analysis)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| analysis.to_string())
}
