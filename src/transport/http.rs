//! HTTP transport for `POST /api/chat`
//!
//! The backend streams plain text and closes the connection when done.
//! Every network read re-emits the whole buffer so far; the buffer at
//! end-of-body is the final text.

use super::{failed_stream, ChatRequest, ChatTransport, ResponseStream, StreamEvent};
use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use std::fmt::Display;

const CHAT_PATH: &str = "/api/chat";

/// Fields a JSON completion body may carry the reply in
const FINAL_TEXT_FIELDS: [&str; 3] = ["response", "message", "content"];

pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        // No request timeout: a stalled stream ends only when the
        // connection itself fails.
        let client = Client::builder()
            .user_agent(concat!("medchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{CHAT_PATH}", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> ResponseStream {
        let response = match self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return failed_stream(classify_request_error(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return failed_stream(TransportError::from_status(status.as_u16(), &body));
        }

        cumulative_text(response.bytes_stream().boxed())
    }
}

fn classify_request_error(e: &reqwest::Error) -> TransportError {
    if e.is_connect() {
        TransportError::network(format!("Connection failed: {e}"))
    } else if e.is_timeout() {
        TransportError::network(format!("Request timeout: {e}"))
    } else if e.is_request() {
        TransportError::network(format!("Request failed: {e}"))
    } else {
        TransportError::unknown(format!("Request failed: {e}"))
    }
}

/// Decoder state carried between network reads
struct Cumulative<S> {
    body: S,
    text: String,
    /// Bytes of a multibyte character split across reads
    partial: Vec<u8>,
    finished: bool,
}

/// Map a body byte stream onto cumulative text chunks and one terminal
fn cumulative_text<S, B, E>(body: S) -> ResponseStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = Cumulative {
        body,
        text: String::new(),
        partial: Vec::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.partial.extend_from_slice(bytes.as_ref());
                    let before = state.text.len();
                    decode_utf8(&mut state.partial, &mut state.text);
                    if state.text.len() > before {
                        let chunk = StreamEvent::Chunk(state.text.clone());
                        return Some((chunk, state));
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let error = TransportError::network(format!("Failed to read response: {e}"));
                    return Some((StreamEvent::Failed(error), state));
                }
                None => {
                    state.finished = true;
                    if !state.partial.is_empty() {
                        state.text.push_str(&String::from_utf8_lossy(&state.partial));
                        state.partial.clear();
                    }
                    let final_text = final_text_from_body(&state.text);
                    return Some((StreamEvent::Done { final_text: Some(final_text) }, state));
                }
            }
        }
    })
    .boxed()
}

/// Move every complete character from `pending` into `out`. Invalid
/// sequences become U+FFFD; an incomplete trailing sequence stays in
/// `pending` for the next read.
fn decode_utf8(pending: &mut Vec<u8>, out: &mut String) {
    loop {
        match std::str::from_utf8(pending) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return;
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                let valid = pending.get(..valid_up_to).unwrap_or_default();
                out.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid_up_to + len);
                    }
                    None => {
                        pending.drain(..valid_up_to);
                        return;
                    }
                }
            }
        }
    }
}

/// The reply carried by a finished body. Plain text is used as is; a JSON
/// object with a known text field yields that field.
fn final_text_from_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(trimmed) {
            let field = FINAL_TEXT_FIELDS
                .iter()
                .find_map(|key| map.get(*key).and_then(serde_json::Value::as_str));
            if let Some(text) = field {
                return text.to_string();
            }
        }
    }
    body.to_string()
}
