mod common;

use std::time::Duration;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use accessify::adapters::{
    DocumentAdapter, InferenceClient, OpenAiDocument, OpenAiSpeech, OpenAiTextAnalysis,
    OpenAiVision, Sampling, SpeechAdapter, TextAnalysisAdapter, VisionAdapter,
};
use accessify::content::ContentUnit;
use accessify::ProcessingError;
use common::start_server;

fn client(base_url: &str) -> InferenceClient {
    InferenceClient::new(&format!("{}/v1", base_url), "test-key", Duration::from_secs(5)).unwrap()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Bearer test-key")
}

fn completion(content: &str) -> Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

/// Chat endpoint that always answers with `content`
fn chat_server(content: &'static str) -> Router {
    Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
            if !authorized(&headers) {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            assert_eq!(body["stream"], false);
            Json(completion(content)).into_response()
        }),
    )
}

fn audio_unit() -> ContentUnit {
    ContentUnit::new("memo.mp3", "audio/mpeg", b"ID3fake-mp3".to_vec(), 0)
}

fn image_unit() -> ContentUnit {
    ContentUnit::new("cat.png", "image/png", vec![0x89, b'P', b'N', b'G'], 0)
}

#[tokio::test]
async fn test_transcription_sends_multipart_and_trims_text() {
    let app = Router::new().route(
        "/v1/audio/transcriptions",
        post(|headers: HeaderMap| async move {
            let content_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if !authorized(&headers) || !content_type.starts_with("multipart/form-data") {
                return (StatusCode::BAD_REQUEST, "bad request").into_response();
            }
            "  hello from the recording \n".into_response()
        }),
    );
    let (base_url, shutdown_tx) = start_server(app).await;

    let speech = OpenAiSpeech::new(client(&base_url), "whisper-1", "tts-1");
    let transcript = speech.transcribe(&audio_unit()).await.unwrap();

    assert_eq!(transcript, "hello from the recording");
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_transcription_error_status() {
    let app = Router::new().route(
        "/v1/audio/transcriptions",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "overloaded") }),
    );
    let (base_url, shutdown_tx) = start_server(app).await;

    let speech = OpenAiSpeech::new(client(&base_url), "whisper-1", "tts-1");
    let result = speech.transcribe(&audio_unit()).await;

    match result {
        Err(ProcessingError::TranscriptionFailed(reason)) => {
            assert!(reason.contains("500"));
            assert!(reason.contains("overloaded"));
        }
        other => panic!("expected transcription failure, got {:?}", other),
    }
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_synthesis_returns_audio_bytes() {
    let app = Router::new().route(
        "/v1/audio/speech",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["model"], "tts-1");
            assert_eq!(body["voice"], "nova");
            assert_eq!(body["input"], "Read this aloud");
            ([(header::CONTENT_TYPE, "audio/mpeg")], vec![1u8, 2, 3])
        }),
    );
    let (base_url, shutdown_tx) = start_server(app).await;

    let speech = OpenAiSpeech::new(client(&base_url), "whisper-1", "tts-1");
    let audio = speech.synthesize("Read this aloud", "nova").await.unwrap();

    assert_eq!(audio.mime_type, "audio/mpeg");
    assert_eq!(audio.data, vec![1, 2, 3]);
    assert_eq!(audio.extension(), "mp3");
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_synthesis_empty_body_is_error() {
    let app = Router::new().route(
        "/v1/audio/speech",
        post(|| async { ([(header::CONTENT_TYPE, "audio/mpeg")], Vec::<u8>::new()) }),
    );
    let (base_url, shutdown_tx) = start_server(app).await;

    let speech = OpenAiSpeech::new(client(&base_url), "whisper-1", "tts-1");
    let result = speech.synthesize("Hello", "alloy").await;

    assert!(matches!(result, Err(ProcessingError::SynthesisFailed(_))));
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_vision_parses_fenced_json() {
    let reply = "```json\n{\"caption\": \"A cat asleep on a sofa\", \"tags\": [\"cat\", \"sofa\"], \"text\": null}\n```";
    let (base_url, shutdown_tx) = start_server(chat_server(reply)).await;

    let vision = OpenAiVision::new(client(&base_url), "gpt-4o-mini", Sampling::default());
    let analysis = vision.analyze(&image_unit()).await.unwrap();

    assert_eq!(analysis.caption, "A cat asleep on a sofa");
    assert_eq!(analysis.tags, vec!["cat", "sofa"]);
    assert!(analysis.extracted_text.is_none());
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_vision_plain_reply_becomes_caption() {
    let (base_url, shutdown_tx) = start_server(chat_server("A cat asleep on a sofa.")).await;

    let vision = OpenAiVision::new(client(&base_url), "gpt-4o-mini", Sampling::default());
    let analysis = vision.analyze(&image_unit()).await.unwrap();

    assert_eq!(analysis.caption, "A cat asleep on a sofa.");
    assert!(analysis.tags.is_empty());
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_vision_question_answer() {
    let (base_url, shutdown_tx) = start_server(chat_server("It is orange.")).await;

    let vision = OpenAiVision::new(client(&base_url), "gpt-4o-mini", Sampling::default());
    let answer = vision
        .answer_question(&image_unit(), "What color is the cat?")
        .await
        .unwrap();

    assert_eq!(answer, "It is orange.");
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_rejected_key_is_analysis_failure() {
    let (base_url, shutdown_tx) = start_server(chat_server("unused")).await;

    let client = InferenceClient::new(&format!("{}/v1", base_url), "wrong-key", Duration::from_secs(5)).unwrap();
    let vision = OpenAiVision::new(client, "gpt-4o-mini", Sampling::default());
    let result = vision.analyze(&image_unit()).await;

    match result {
        Err(ProcessingError::AnalysisFailed(reason)) => assert!(reason.contains("401")),
        other => panic!("expected analysis failure, got {:?}", other),
    }
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_document_parse_structured_reply() {
    let reply = r#"{
        "text": "Chapter one. Chapter two.",
        "pages": [{"page": 1, "text": "Chapter one."}, {"page": 2, "text": "Chapter two."}],
        "metadata": {"title": "Handbook", "author": null, "pageCount": 2},
        "summary": "Two chapters.",
        "simplifiedText": "There are two parts."
    }"#;
    let (base_url, shutdown_tx) = start_server(chat_server(reply)).await;

    let document = OpenAiDocument::new(client(&base_url), "gpt-4o-mini", Sampling::default());
    let pdf = ContentUnit::new("handbook.pdf", "application/pdf", b"%PDF-1.4".to_vec(), 0);
    let parsed = document.parse(&pdf).await.unwrap();

    assert_eq!(parsed.page_count(), 2);
    assert_eq!(parsed.metadata.title.as_deref(), Some("Handbook"));
    assert_eq!(parsed.simplified_text.as_deref(), Some("There are two parts."));
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_document_plain_reply_becomes_text() {
    let (base_url, shutdown_tx) = start_server(chat_server("Just the words.")).await;

    let document = OpenAiDocument::new(client(&base_url), "gpt-4o-mini", Sampling::default());
    let pdf = ContentUnit::new("notes.pdf", "application/pdf", b"%PDF-1.4".to_vec(), 0);
    let parsed = document.parse(&pdf).await.unwrap();

    assert_eq!(parsed.text, "Just the words.");
    assert!(parsed.simplified_text.is_none());
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_text_simplify() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["messages"][0]["role"], "system");
            assert_eq!(body["messages"][1]["content"], "Utilize the apparatus.");
            assert_eq!(body["max_tokens"], 1024);
            Json(completion("Use the tool."))
        }),
    );
    let (base_url, shutdown_tx) = start_server(app).await;

    let text = OpenAiTextAnalysis::new(client(&base_url), "gpt-4o-mini", Sampling::default());
    let simplified = text.simplify("Utilize the apparatus.").await.unwrap();

    assert_eq!(simplified, "Use the tool.");
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_empty_completion_is_error() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(json!({ "choices": [] })) }),
    );
    let (base_url, shutdown_tx) = start_server(app).await;

    let text = OpenAiTextAnalysis::new(client(&base_url), "gpt-4o-mini", Sampling::default());
    let result = text.summarize("Anything").await;

    assert!(matches!(result, Err(ProcessingError::AnalysisFailed(_))));
    shutdown_tx.send(()).ok();
}
