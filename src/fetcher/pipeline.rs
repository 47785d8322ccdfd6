use chrono::Utc;
use encoding_rs::Encoding;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::fetcher::{
    errors::FetchError,
    types::{Charset, Page},
};

static CHARSET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).unwrap());

static META_CHARSET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<meta\s+[^>]*?charset\s*=\s*["']?([^"'\s/>]+)"#).unwrap());

static META_HTTP_EQUIV_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+[^>]*?http-equiv\s*=\s*["']?content-type["']?[^>]*?content\s*=\s*["']?[^"'>]*?charset\s*=\s*([^"'\s;/>]+)"#).unwrap()
});

/// How far into the body `<meta charset>` declarations are looked for.
const SNIFF_BYTES: usize = 4096;

/// Decode a downloaded body into a [`Page`].
pub fn process_response(url: Url, body: &[u8], content_type: &str) -> Result<Page, FetchError> {
    let charset = detect_charset(content_type, body);
    let body = decode_to_utf8(body, &charset)?;

    Ok(Page {
        url,
        body,
        charset,
        fetched_at: Utc::now(),
    })
}

fn charset_from(regex: &Regex, haystack: &str) -> Option<Charset> {
    let name = regex.captures(haystack)?.get(1)?.as_str().to_lowercase();
    Encoding::for_label(name.as_bytes()).map(Charset::from_encoding)
}

/// Content-Type header, then `<meta>` declarations in the first bytes,
/// then statistical detection.
pub fn detect_charset(content_type: &str, body: &[u8]) -> Charset {
    if let Some(charset) = charset_from(&CHARSET_REGEX, content_type) {
        return charset;
    }

    let head = &body[..body.len().min(SNIFF_BYTES)];
    let head_text = String::from_utf8_lossy(head);
    if let Some(charset) = charset_from(&META_CHARSET_REGEX, &head_text)
        .or_else(|| charset_from(&META_HTTP_EQUIV_REGEX, &head_text))
    {
        return charset;
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    Charset::from_encoding(detector.guess(None, true))
}

fn decode_to_utf8(body: &[u8], charset: &Charset) -> Result<String, FetchError> {
    let encoding = charset.encoding();
    let (decoded, _encoding, had_errors) = encoding.decode(body);

    if had_errors {
        return Err(FetchError::Charset(format!(
            "failed to decode content as {}",
            encoding.name()
        )));
    }

    Ok(decoded.into_owned())
}
