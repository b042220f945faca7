//! Alexa Voice Service protocol: OAuth credentials, the streaming speech
//! upload, and the multipart response demultiplexer.

pub mod auth;
pub mod response;
pub mod upload;

use std::time::Duration;

/// Speech recognition endpoint.
pub const SPEECH_URL: &str =
    "https://access-alexa-na.amazon.com/v1/avs/speechrecognizer/recognize";

/// Connect and total timeout for the speech request. A stuck ring-buffer
/// waiter inside the upload is bounded by this.
const SPEECH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech request timed out")]
    Timeout,

    #[error("speech endpoint answered with status {0}")]
    Status(u16),

    #[error("speech request failed: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for SpeechError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SpeechError::Timeout
        } else {
            SpeechError::Http(e)
        }
    }
}

/// Client for the speech endpoint.
pub struct SpeechClient {
    http: reqwest::blocking::Client,
    url: String,
}

impl SpeechClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(SPEECH_TIMEOUT)
            .timeout(SPEECH_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            url: SPEECH_URL.to_string(),
        })
    }

    /// Post one turn: the body reader streams the staged upload out of the
    /// capture ring while the microphone callback is still filling it.
    ///
    /// The unsized streaming body goes out with chunked transfer encoding;
    /// the reader delivers exactly the announced byte count and then ends
    /// the stream. Returns the raw response body on HTTP 200.
    pub fn recognize(
        &self,
        access_token: &str,
        body: upload::CaptureBody,
    ) -> Result<Vec<u8>, SpeechError> {
        let resp = self
            .http
            .post(&self.url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", access_token),
            )
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", upload::BOUNDARY),
            )
            .body(reqwest::blocking::Body::new(body))
            .send()?;

        let status = resp.status();
        if status.as_u16() != 200 {
            return Err(SpeechError::Status(status.as_u16()));
        }

        Ok(resp.bytes()?.to_vec())
    }
}
