use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::article::{is_blank, time::parse_timestamp};

/// Shared shape for images, videos, audio and author portraits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichMedia {
    pub url: String,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub etag: Option<String>,
    #[serde(skip)]
    probed: bool,
}

impl RichMedia {
    /// Returns `None` for blank or `data:` URLs.
    pub fn new(url: impl AsRef<str>) -> Option<Self> {
        let url = url.as_ref().trim();
        if url.is_empty() || url.starts_with("data:") {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            ..Self::default()
        })
    }

    pub fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width.or(self.width);
        self.height = height.or(self.height);
        self
    }

    pub fn with_alt(mut self, alt: Option<&str>) -> Self {
        if let Some(alt) = alt.map(str::trim).filter(|a| !a.is_empty()) {
            self.alt = Some(alt.to_string());
        }
        self
    }

    pub fn with_mime_type(mut self, mime_type: Option<&str>) -> Self {
        if let Some(mime) = mime_type.map(str::trim).filter(|m| !m.is_empty()) {
            self.mime_type = Some(mime.to_string());
        }
        self
    }

    /// True while any header-derived field is unknown and no probe ran yet.
    pub fn needs_probe(&self) -> bool {
        !self.probed
            && (self.size.is_none()
                || self.mime_type.is_none()
                || self.last_modified.is_none()
                || self.etag.is_none())
    }
}

/// Parse a width/height attribute: `"640"`, `"640px"`, `640`, `640.0`.
pub fn parse_dimension(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0),
        Value::String(text) => parse_dimension_str(text),
        _ => None,
    }
}

pub fn parse_dimension_str(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text
        .strip_suffix("px")
        .or_else(|| text.strip_suffix("PX"))
        .unwrap_or(text)
        .trim();
    digits
        .parse::<u32>()
        .ok()
        .or_else(|| {
            digits
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.round() as u32)
        })
        .filter(|n| *n > 0)
}

/// Issues HEAD requests to fill in size, type, modification time and etag.
#[derive(Clone)]
pub struct MediaProbe {
    client: Client,
}

impl MediaProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fill unknown header-derived fields. Runs at most once per instance;
    /// timeouts and HTTP failures leave the fields unset.
    pub async fn backfill(&self, media: &mut RichMedia) {
        if !media.needs_probe() {
            return;
        }
        media.probed = true;

        let response = match self.client.head(&media.url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(url = %media.url, error = %err, "media probe failed");
                return;
            }
        };
        if !response.status().is_success() {
            debug!(url = %media.url, status = %response.status(), "media probe rejected");
            return;
        }

        let headers = response.headers();
        let header_str = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        if media.size.is_none() {
            media.size = header_str(header::CONTENT_LENGTH)
                .and_then(|len| len.parse::<u64>().ok())
                .filter(|len| *len > 0);
        }
        if media.mime_type.is_none() {
            media.mime_type = header_str(header::CONTENT_TYPE);
        }
        if media.last_modified.is_none() {
            media.last_modified =
                header_str(header::LAST_MODIFIED).and_then(|value| parse_timestamp(&value));
        }
        if media.etag.is_none() {
            media.etag = header_str(header::ETAG);
        }
    }
}
