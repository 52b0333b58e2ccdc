#![forbid(unsafe_code)]

// BigBlueButton control-plane client. Calls are authenticated with the API
// checksum scheme: sha1(callName + queryString + sharedSecret) appended as
// the final query parameter.

use crate::conference::{ConferenceClient, ConferenceError};
use async_trait::async_trait;
use sha1::{Digest, Sha1};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BbbHttpClient {
    base_url: String,
    secret: String,
    http: reqwest::Client,
}

impl BbbHttpClient {
    /// `base_url` is the server root, e.g. `https://bbb.example.org/bigbluebutton`.
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            secret: secret.into(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    fn checksum(&self, call: &str, query: &str) -> String {
        let digest = Sha1::digest(format!("{call}{query}{}", self.secret).as_bytes());
        digest.iter().fold(String::with_capacity(40), |mut out, b| {
            use std::fmt::Write;
            let _ = write!(out, "{b:02x}");
            out
        })
    }

    fn api_url(&self, call: &str, params: &[(&str, &str)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", encode_component(v)))
            .collect::<Vec<_>>()
            .join("&");
        let checksum = self.checksum(call, &query);
        format!("{}/api/{call}?{query}&checksum={checksum}", self.base_url)
    }
}

#[async_trait]
impl ConferenceClient for BbbHttpClient {
    async fn moderator_password(&self, meeting_id: &str) -> Result<String, ConferenceError> {
        let url = self.api_url("getMeetingInfo", &[("meetingID", meeting_id)]);
        debug!(meeting_id, "fetching moderator password");

        let body = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ConferenceError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| ConferenceError::Request(e.to_string()))?
            .text()
            .await
            .map_err(|e| ConferenceError::Request(e.to_string()))?;

        match extract_tag(&body, "returncode") {
            Some(code) if code == "SUCCESS" => {}
            Some(_) => {
                let message = extract_tag(&body, "message")
                    .unwrap_or_else(|| "no message in response".to_string());
                return Err(ConferenceError::Rejected(message));
            }
            None => {
                return Err(ConferenceError::Malformed(
                    "response carries no returncode".to_string(),
                ))
            }
        }

        extract_tag(&body, "moderatorPW")
            .ok_or_else(|| ConferenceError::Malformed("response carries no moderatorPW".to_string()))
    }

    fn join_url(
        &self,
        identity: &str,
        meeting_id: &str,
        password: &str,
    ) -> Result<String, ConferenceError> {
        Ok(self.api_url(
            "join",
            &[
                ("fullName", identity),
                ("meetingID", meeting_id),
                ("password", password),
                ("redirect", "true"),
            ],
        ))
    }
}

/// Minimal percent-encoding for query-string values. Unreserved characters
/// (RFC 3986) pass through, everything else becomes %XX. The checksum is
/// computed over the encoded form, so encoding and signing cannot drift.
fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => {
                use std::fmt::Write;
                let _ = write!(out, "%{other:02X}");
            }
        }
    }
    out
}

/// Pulls the text content of the first `<tag>...</tag>` pair. The BBB API
/// returns flat XML; a full parser would be overkill.
fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim().to_string())
}
