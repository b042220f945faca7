//! Multipart response demultiplexer
//!
//! The speech endpoint answers with `multipart/form-data`: an optional
//! JSON directive envelope and zero or more MP3 audio parts, in any
//! order. The boundary is taken from the first line of the body rather
//! than the Content-Type header, and parts are located by scanning for
//! the known content-type markers. Part payloads start after the
//! `\r\n\r\n` header terminator and end two bytes before the next
//! boundary occurrence (stripping the trailing CRLF).

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("response body carries no multipart boundary")]
    MissingBoundary,

    #[error("response part is truncated (no header terminator or closing boundary)")]
    Truncated,
}

/// What a response part contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// `application/json` directive envelope.
    Json,
    /// `audio/mpeg` spoken answer.
    Mpeg,
}

/// One demultiplexed part, payload exactly as sent.
#[derive(Debug, Clone)]
pub struct Part {
    pub kind: PartKind,
    pub data: Vec<u8>,
}

const JSON_MARKER: &[u8] = b"application/json";
const MPEG_MARKER: &[u8] = b"audio/mpeg";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Split a buffered multipart response into its parts, in body order.
pub fn split_parts(body: &[u8]) -> Result<Vec<Part>, ResponseError> {
    let boundary = leading_token(body).ok_or(ResponseError::MissingBoundary)?;

    let mut parts = Vec::new();
    let mut cursor = boundary.len();

    loop {
        let json_at = find(body, JSON_MARKER, cursor);
        let mpeg_at = find(body, MPEG_MARKER, cursor);

        let (marker_at, marker_len, kind) = match (json_at, mpeg_at) {
            (None, None) => break,
            (Some(j), None) => (j, JSON_MARKER.len(), PartKind::Json),
            (None, Some(m)) => (m, MPEG_MARKER.len(), PartKind::Mpeg),
            (Some(j), Some(m)) if j < m => (j, JSON_MARKER.len(), PartKind::Json),
            (_, Some(m)) => (m, MPEG_MARKER.len(), PartKind::Mpeg),
        };

        let header_end = find(body, HEADER_END, marker_at + marker_len)
            .ok_or(ResponseError::Truncated)?;
        let payload_start = header_end + HEADER_END.len();

        let boundary_at =
            find(body, boundary, payload_start).ok_or(ResponseError::Truncated)?;
        // Payload ends two bytes before the boundary line's CRLF.
        let payload_end = boundary_at.saturating_sub(2).max(payload_start);

        parts.push(Part {
            kind,
            data: body[payload_start..payload_end].to_vec(),
        });
        cursor = boundary_at + boundary.len();
    }

    Ok(parts)
}

/// Should the next turn bypass the wake-word gate?
///
/// True when the directive envelope declares the `SpeechRecognizer`
/// namespace anywhere, which is how the service asks a follow-up
/// question. Malformed JSON counts as no.
pub fn wants_reask(json: &[u8]) -> bool {
    match serde_json::from_slice::<Value>(json) {
        Ok(value) => names_speech_recognizer(&value),
        Err(e) => {
            tracing::warn!("Unparseable directive JSON, not re-asking: {}", e);
            false
        }
    }
}

fn names_speech_recognizer(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            if map.get("namespace").and_then(Value::as_str) == Some("SpeechRecognizer") {
                return true;
            }
            map.values().any(names_speech_recognizer)
        }
        Value::Array(items) => items.iter().any(names_speech_recognizer),
        _ => false,
    }
}

/// First whitespace-delimited token of the body: the boundary line.
fn leading_token(body: &[u8]) -> Option<&[u8]> {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())?;
    let len = body[start..]
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(body.len() - start);
    if len == 0 {
        None
    } else {
        Some(&body[start..start + len])
    }
}

/// Locate `needle` in `haystack` at or after `from`.
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
