//! Google Generative AI (Gemini) API provider

use crate::{
    error::{Error, Result},
    providers::LlmProvider,
    stream::{MessageEvent, MessageEventStream},
    types::{Content, Context, FinishReason, Message, Model, ModelMetadata, Usage},
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

/// Google Generative AI client
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
}

impl GoogleProvider {
    /// Create a new Google provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| Error::InvalidConfig("API key contains invalid characters".into()))?;
        headers.insert("x-goog-api-key", key);
        Ok(headers)
    }
}

fn endpoint(model: &Model, method: &str) -> String {
    format!("{}/models/{}:{}", model.base_url, model.id, method)
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    async fn generate(&self, model: &Model, context: &Context) -> Result<Message> {
        let request = build_request(context);
        let url = endpoint(model, "generateContent");
        tracing::debug!(model = %model.id, turns = request.contents.len(), "generateContent");

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &body));
        }

        let reply: GeminiResponse = serde_json::from_str(&body)?;
        reply_to_message(reply, model)
    }

    async fn stream(&self, model: &Model, context: &Context) -> Result<MessageEventStream> {
        let request = build_request(context);
        let url = endpoint(model, "streamGenerateContent?alt=sse");
        tracing::debug!(model = %model.id, turns = request.contents.len(), "streamGenerateContent");

        let request_builder = self.client.post(&url).headers(self.headers()?).json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source, model.clone())))
    }
}

fn build_request(context: &Context) -> GeminiRequest {
    let contents = context
        .messages
        .iter()
        .filter_map(convert_message)
        .collect();

    let system_instruction = context.system_prompt.as_ref().map(|prompt| GeminiContent {
        role: None,
        parts: vec![GeminiPart::Text {
            text: prompt.clone(),
        }],
    });

    let generation_config = if context.generation.is_empty() {
        None
    } else {
        Some(GeminiGenerationConfig {
            max_output_tokens: context.generation.max_output_tokens,
            temperature: context.generation.temperature,
        })
    };

    GeminiRequest {
        contents,
        system_instruction,
        generation_config,
    }
}

fn convert_message(msg: &Message) -> Option<GeminiContent> {
    let parts: Vec<GeminiPart> = msg
        .content()
        .iter()
        .map(|c| match c {
            Content::Text { text } => GeminiPart::Text { text: text.clone() },
            Content::Image { data, mime_type } => GeminiPart::InlineData {
                inline_data: GeminiBlob {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                },
            },
        })
        .collect();

    // Gemini rejects turns without parts (e.g. an empty model reply)
    if parts.is_empty() {
        return None;
    }

    Some(GeminiContent {
        role: Some(msg.role().to_string()),
        parts,
    })
}

fn parse_error_body(status: u16, body: &str) -> Error {
    match serde_json::from_str::<GeminiErrorResponse>(body) {
        Ok(err) => api_error(err.error, &status.to_string()),
        Err(_) => Error::api(status.to_string(), body.trim()),
    }
}

fn api_error(error: GeminiError, fallback_status: &str) -> Error {
    let status = error
        .status
        .or_else(|| error.code.map(|c| c.to_string()))
        .unwrap_or_else(|| fallback_status.to_string());
    Error::api(status, error.message)
}

/// Concatenated text of the first candidate, ignoring thought parts
fn candidate_text(response: &GeminiResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default()
}

fn usage_of(response: &GeminiResponse) -> Option<Usage> {
    response.usage_metadata.as_ref().map(|usage| Usage {
        input: usage.prompt_token_count.unwrap_or(0),
        output: usage.candidates_token_count.unwrap_or(0),
    })
}

fn reply_to_message(mut response: GeminiResponse, model: &Model) -> Result<Message> {
    if let Some(error) = response.error.take() {
        return Err(api_error(error, "200"));
    }
    if response.candidates.is_empty() {
        let reason = response.prompt_feedback.and_then(|f| f.block_reason);
        return Err(Error::EmptyResponse(reason));
    }

    let text = candidate_text(&response);
    let finish_reason = response.candidates[0]
        .finish_reason
        .as_deref()
        .map(FinishReason::from_gemini);
    let usage = usage_of(&response).unwrap_or_default();
    tracing::debug!(input = usage.input, output = usage.output, "generateContent usage");

    let content = if text.is_empty() {
        vec![]
    } else {
        vec![Content::Text { text }]
    };

    Ok(Message::Model {
        content,
        metadata: ModelMetadata {
            model: Some(model.id.clone()),
            usage,
            finish_reason,
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    })
}

fn create_stream(
    mut event_source: EventSource,
    model: Model,
) -> impl futures::Stream<Item = MessageEvent> {
    stream! {
        let mut accumulated_text = String::new();
        let mut finish_reason: Option<String> = None;
        let mut usage = Usage::default();

        yield MessageEvent::Start {
            message: Message::Model {
                content: vec![],
                metadata: ModelMetadata {
                    model: Some(model.id.clone()),
                    ..Default::default()
                },
            },
        };

        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data.is_empty() {
                        tracing::warn!("skipping empty SSE event");
                        continue;
                    }

                    match serde_json::from_str::<GeminiResponse>(&msg.data) {
                        Ok(GeminiResponse { error: Some(error), .. }) => {
                            event_source.close();
                            yield MessageEvent::Error {
                                message: api_error(error, "stream").to_string(),
                            };
                            return;
                        }
                        Ok(chunk) => {
                            let text = candidate_text(&chunk);
                            if !text.is_empty() {
                                accumulated_text.push_str(&text);
                                yield MessageEvent::TextDelta { delta: text };
                            }

                            if let Some(reason) = chunk.candidates.first().and_then(|c| c.finish_reason.clone()) {
                                finish_reason = Some(reason);
                            }
                            if let Some(chunk_usage) = usage_of(&chunk) {
                                usage = chunk_usage;
                            }
                        }
                        Err(e) => {
                            event_source.close();
                            yield MessageEvent::Error {
                                message: format!("Failed to parse chunk: {}", e),
                            };
                            return;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    // Server closed the connection: the reply is complete.
                    event_source.close();
                    break;
                }
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    event_source.close();
                    let body = response.text().await.unwrap_or_default();
                    let error = parse_error_body(status.as_u16(), &body);
                    yield MessageEvent::Error {
                        message: error.to_string(),
                    };
                    return;
                }
                Err(e) => {
                    event_source.close();
                    yield MessageEvent::Error {
                        message: format!("SSE error: {}", e),
                    };
                    return;
                }
            }
        }

        tracing::debug!(
            input = usage.input,
            output = usage.output,
            finish_reason = ?finish_reason,
            "stream finished"
        );

        let finish_reason = finish_reason
            .as_deref()
            .map(FinishReason::from_gemini)
            .unwrap_or(FinishReason::Stop);

        let content = if accumulated_text.is_empty() {
            vec![]
        } else {
            vec![Content::Text { text: accumulated_text }]
        };

        yield MessageEvent::Done {
            message: Message::Model {
                content,
                metadata: ModelMetadata {
                    model: Some(model.id.clone()),
                    usage: usage.clone(),
                    finish_reason: Some(finish_reason),
                    timestamp: chrono::Utc::now().timestamp_millis(),
                },
            },
            finish_reason,
            usage,
        };
    }
}

// Request types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// Response types (shared by generateContent and each SSE chunk)

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    /// Set when the service reports a failure inside an otherwise successful response
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: Option<u16>,
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerationConfig;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_request_with_image_and_instruction() {
        let mut context = Context::default();
        context.push(Message::user_with_content(vec![
            Content::image("iVBORw0KGgo=", "image/png"),
            Content::text("Identify the plant in this image."),
        ]));

        let value = serde_json::to_value(build_request(&context)).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } },
                        { "text": "Identify the plant in this image." }
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_request_with_system_instruction_and_history() {
        let mut context = Context::with_system("You are Bloom.");
        context.generation = GenerationConfig {
            temperature: Some(0.5),
            max_output_tokens: None,
        };
        context.push(Message::user("Hi"));
        context.push(Message::Model {
            content: vec![Content::text("Hello, gardener!")],
            metadata: ModelMetadata::default(),
        });
        context.push(Message::user("How often should I water basil?"));

        let value = serde_json::to_value(build_request(&context)).unwrap();
        assert_eq!(value["systemInstruction"], json!({ "parts": [{ "text": "You are Bloom." }] }));
        assert_eq!(value["generationConfig"], json!({ "temperature": 0.5 }));
        let roles: Vec<&str> = value["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
    }

    #[test]
    fn test_empty_model_turn_is_skipped() {
        let mut context = Context::default();
        context.push(Message::user("Hi"));
        context.push(Message::Model {
            content: vec![],
            metadata: ModelMetadata::default(),
        });
        let request = build_request(&context);
        assert_eq!(request.contents.len(), 1);
    }

    #[test]
    fn test_chunk_text_skips_thoughts() {
        let chunk: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "pondering", "thought": true },
                        { "text": "## Monstera" },
                        { "text": "\nSwiss cheese plant" }
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 258, "candidatesTokenCount": 12, "totalTokenCount": 270 }
        }))
        .unwrap();

        assert_eq!(candidate_text(&chunk), "## Monstera\nSwiss cheese plant");
        assert_eq!(usage_of(&chunk), Some(Usage { input: 258, output: 12 }));
    }

    #[test]
    fn test_reply_to_message() {
        let reply: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "## Rose" }] },
                "finishReason": "MAX_TOKENS"
            }]
        }))
        .unwrap();

        let message = reply_to_message(reply, &Model::default()).unwrap();
        assert_eq!(message.text(), "## Rose");
        let metadata = message.metadata().unwrap();
        assert_eq!(metadata.finish_reason, Some(FinishReason::Length));
        assert_eq!(metadata.model.as_deref(), Some(crate::DEFAULT_MODEL_ID));
    }

    #[test]
    fn test_blocked_prompt_is_empty_response() {
        let reply: GeminiResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();

        match reply_to_message(reply, &Model::default()) {
            Err(Error::EmptyResponse(reason)) => assert_eq!(reason.as_deref(), Some("SAFETY")),
            other => panic!("expected EmptyResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_body() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let error = parse_error_body(429, body);
        assert!(matches!(&error, Error::Api { status, .. } if status == "RESOURCE_EXHAUSTED"));
        assert_eq!(error.to_string(), "API error: Quota exceeded (status: RESOURCE_EXHAUSTED)");

        let error = parse_error_body(502, "Bad Gateway\n");
        assert_eq!(error.to_string(), "API error: Bad Gateway (status: 502)");
    }

    #[test]
    fn test_endpoint() {
        let model = Model::gemini("gemini-2.5-flash");
        assert_eq!(
            endpoint(&model, "streamGenerateContent?alt=sse"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_error_inside_ok_response() {
        let reply: GeminiResponse = serde_json::from_value(json!({
            "error": { "code": 503, "message": "The model is overloaded", "status": "UNAVAILABLE" }
        }))
        .unwrap();

        match reply_to_message(reply, &Model::default()) {
            Err(Error::Api { status, message }) => {
                assert_eq!(status, "UNAVAILABLE");
                assert_eq!(message, "The model is overloaded");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    const OVERLOADED: &str =
        r#"{"error":{"code":503,"message":"The model is overloaded","status":"UNAVAILABLE"}}"#;

    fn sse_response(events: &[&str]) -> String {
        let mut response = String::from(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
        );
        for data in events {
            response.push_str(&format!("data: {}\n\n", data));
        }
        response
    }

    fn text_chunk(text: &str) -> String {
        json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
            .to_string()
    }

    /// Read one full HTTP request (headers plus Content-Length body)
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Serve a single canned HTTP response and return a model pointed at it
    async fn serve_once(response: String) -> Model {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        Model::gemini("gemini-test").with_base_url(format!("http://{}/v1beta", addr))
    }

    fn local_provider() -> GoogleProvider {
        GoogleProvider {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            api_key: "test-key".into(),
        }
    }

    async fn stream_events(model: &Model) -> Vec<MessageEvent> {
        let mut context = Context::with_system("You are Bloom.");
        context.push(Message::user("How do I prune roses?"));
        let events = local_provider().stream(model, &context).await.unwrap();
        events.collect().await
    }

    #[tokio::test]
    async fn test_stream_completes_when_server_closes() {
        let usage = json!({
            "candidates": [{ "content": { "parts": [{ "text": " in late winter." }] }, "finishReason": "STOP" }],
            "usageMetadata": { "promptTokenCount": 20, "candidatesTokenCount": 6 }
        })
        .to_string();
        let model = serve_once(sse_response(&[&text_chunk("Prune roses"), &usage])).await;

        let events = stream_events(&model).await;
        assert!(matches!(events[0], MessageEvent::Start { .. }));
        let deltas: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                MessageEvent::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["Prune roses", " in late winter."]);

        match events.last() {
            Some(MessageEvent::Done {
                message,
                finish_reason,
                usage,
            }) => {
                assert_eq!(message.text(), "Prune roses in late winter.");
                assert_eq!(*finish_reason, FinishReason::Stop);
                assert_eq!(*usage, Usage { input: 20, output: 6 });
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_chunk_mid_stream_fails_the_reply() {
        let model = serve_once(sse_response(&[&text_chunk("Roses need"), OVERLOADED])).await;

        let events = stream_events(&model).await;
        assert!(!events.iter().any(|e| matches!(e, MessageEvent::Done { .. })));
        match events.last() {
            Some(MessageEvent::Error { message }) => {
                assert!(message.contains("The model is overloaded"));
                assert!(message.contains("UNAVAILABLE"));
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_status_maps_body() {
        let response = format!(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            OVERLOADED.len(),
            OVERLOADED
        );
        let model = serve_once(response).await;

        let events = stream_events(&model).await;
        assert_eq!(events.len(), 2);
        match &events[1] {
            MessageEvent::Error { message } => {
                assert_eq!(message, "API error: The model is overloaded (status: UNAVAILABLE)");
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_stream_keeps_session_history_clean() {
        let model = serve_once(sse_response(&[&text_chunk("Roses need"), OVERLOADED])).await;
        let client = crate::Client::with_provider(
            std::sync::Arc::new(local_provider()),
            model,
            GenerationConfig::default(),
        );
        let mut chat = client.create_chat("You are Bloom.");

        let items: Vec<Result<String>> = chat.send_message_stream("How do I prune roses?").collect().await;
        assert_eq!(items[0].as_ref().unwrap(), "Roses need");
        assert!(matches!(items.last(), Some(Err(Error::Sse(_)))));
        assert!(chat.history().is_empty());
    }
}
