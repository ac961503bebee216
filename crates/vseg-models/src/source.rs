//! Source URL validation and canonical identifier extraction.
//!
//! Accepted shapes (host is matched case-insensitively, scheme optional):
//! - `https://www.youtube.com/watch?v=VIDEO_ID`
//! - `https://youtu.be/VIDEO_ID`
//! - `https://www.youtube.com/embed/VIDEO_ID` (also `youtube-nocookie.com`)
//! - `https://www.youtube.com/shorts/VIDEO_ID`, `/v/VIDEO_ID`, `/live/VIDEO_ID`
//!
//! Extra query parameters (`t`, `list`, `si`, ...) and fragments are ignored.
//! URLs are untrusted input: nothing here touches the network or a shell.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Length of a canonical video identifier.
const SOURCE_ID_LEN: usize = 11;

/// Hosts serving the full `watch`/`embed`/`shorts` URL shapes.
const FULL_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

/// Hosts serving the short `youtu.be/<id>` shape.
const SHORT_HOSTS: &[&str] = &["youtu.be", "www.youtu.be"];

/// Path prefixes that carry the identifier as the next path segment.
const ID_PATH_PREFIXES: &[&str] = &["embed", "shorts", "v", "live"];

/// Reasons a source URL is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceIdError {
    /// No URL was supplied at all.
    #[error("Source URL is required")]
    Missing,

    /// The URL was an empty or whitespace-only string.
    #[error("Source URL is empty")]
    Empty,

    /// The value supplied was not a string.
    #[error("Source URL must be a string")]
    NotAString,

    /// The string could not be parsed as an http(s) URL.
    #[error("Source URL is malformed")]
    Malformed,

    /// The URL points at a host we do not accept.
    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),

    /// The host is accepted but no identifier was found in the URL.
    #[error("Video ID not found in URL")]
    IdNotFound,

    /// An identifier was found but has the wrong length or characters.
    #[error("Video ID has invalid format")]
    InvalidId,
}

impl SourceIdError {
    /// Whether the caller simply did not provide a URL.
    pub fn is_missing(&self) -> bool {
        matches!(self, SourceIdError::Missing | SourceIdError::Empty)
    }
}

/// Result type for source identifier extraction.
pub type SourceIdResult<T> = Result<T, SourceIdError>;

/// Canonical 11-character media identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Parse a raw user-supplied URL into a canonical identifier.
    pub fn parse(raw: &str) -> SourceIdResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SourceIdError::Empty);
        }

        let url = parse_url(trimmed)?;
        let host = url
            .host_str()
            .ok_or(SourceIdError::Malformed)?
            .to_ascii_lowercase();

        let candidate = if SHORT_HOSTS.contains(&host.as_str()) {
            first_path_segment(&url)
        } else if FULL_HOSTS.contains(&host.as_str()) {
            extract_from_full_url(&url)
        } else {
            return Err(SourceIdError::UnsupportedHost(host));
        };

        let id = candidate.ok_or(SourceIdError::IdNotFound)?;
        validate_id(&id)?;
        Ok(Self(id))
    }

    /// Parse from a JSON value, distinguishing absent, non-string and string input.
    pub fn from_value(value: Option<&Value>) -> SourceIdResult<Self> {
        match value {
            None | Some(Value::Null) => Err(SourceIdError::Missing),
            Some(Value::String(raw)) => Self::parse(raw),
            Some(_) => Err(SourceIdError::NotAString),
        }
    }

    /// Get the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch URL handed to the download tool.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse with an implicit `https://` when the scheme is omitted.
fn parse_url(raw: &str) -> SourceIdResult<Url> {
    let lower = raw.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        raw.to_string()
    } else if lower.contains("://") {
        return Err(SourceIdError::Malformed);
    } else {
        format!("https://{}", raw)
    };

    let url = Url::parse(&candidate).map_err(|_| SourceIdError::Malformed)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(SourceIdError::Malformed),
    }
}

/// `watch?v=` first, then `/embed/<id>`-style path shapes.
fn extract_from_full_url(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    match segments.next() {
        Some("watch") => url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned()),
        Some(prefix) if ID_PATH_PREFIXES.contains(&prefix) => {
            segments.next().map(str::to_string)
        }
        _ => None,
    }
}

fn first_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn validate_id(id: &str) -> SourceIdResult<()> {
    if id.len() != SOURCE_ID_LEN {
        return Err(SourceIdError::InvalidId);
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SourceIdError::InvalidId);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn test_accepted_shapes_yield_same_id() {
        let urls = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?v=dQw4w9WgXcQ",
            "http://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://WWW.YouTube.COM/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "HTTPS://YOUTU.BE/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "  https://youtu.be/dQw4w9WgXcQ  ",
        ];

        for url in urls {
            assert_eq!(SourceId::parse(url).unwrap().as_str(), ID, "url: {}", url);
        }
    }

    #[test]
    fn test_extra_query_parameters_are_ignored() {
        let urls = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "https://www.youtube.com/watch?list=PL123&v=dQw4w9WgXcQ&index=3",
            "https://youtu.be/dQw4w9WgXcQ?t=10",
            "https://youtu.be/dQw4w9WgXcQ?si=abcdef",
            "https://www.youtube.com/embed/dQw4w9WgXcQ?start=5&autoplay=1",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ#comments",
        ];

        for url in urls {
            assert_eq!(SourceId::parse(url).unwrap().as_str(), ID, "url: {}", url);
        }
    }

    #[test]
    fn test_rejects_other_hosts() {
        assert_eq!(
            SourceId::parse("https://vimeo.com/123456"),
            Err(SourceIdError::UnsupportedHost("vimeo.com".to_string()))
        );
        assert!(matches!(
            SourceId::parse("https://notyoutube.com/watch?v=dQw4w9WgXcQ"),
            Err(SourceIdError::UnsupportedHost(_))
        ));
        assert!(matches!(
            SourceId::parse("https://youtube.com.evil.example/watch?v=dQw4w9WgXcQ"),
            Err(SourceIdError::UnsupportedHost(_))
        ));
    }

    #[test]
    fn test_rejects_missing_identifier() {
        assert_eq!(
            SourceId::parse("https://www.youtube.com/watch"),
            Err(SourceIdError::IdNotFound)
        );
        assert_eq!(
            SourceId::parse("https://youtu.be/"),
            Err(SourceIdError::IdNotFound)
        );
        assert_eq!(
            SourceId::parse("https://www.youtube.com/playlist?list=PL123"),
            Err(SourceIdError::IdNotFound)
        );
    }

    #[test]
    fn test_rejects_invalid_identifiers() {
        assert_eq!(
            SourceId::parse("https://youtube.com/watch?v=abc123"),
            Err(SourceIdError::InvalidId)
        );
        assert_eq!(
            SourceId::parse("https://youtube.com/watch?v=abc123def!!"),
            Err(SourceIdError::InvalidId)
        );
        assert_eq!(
            SourceId::parse("https://youtu.be/abc%20def%2012"),
            Err(SourceIdError::InvalidId)
        );
    }

    #[test]
    fn test_rejects_empty_and_bad_schemes() {
        assert_eq!(SourceId::parse(""), Err(SourceIdError::Empty));
        assert_eq!(SourceId::parse("   \t"), Err(SourceIdError::Empty));
        assert_eq!(
            SourceId::parse("ftp://youtube.com/watch?v=dQw4w9WgXcQ"),
            Err(SourceIdError::Malformed)
        );
        assert!(SourceId::parse("javascript:alert(1)").is_err());
        assert!(SourceId::parse("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_from_value() {
        assert_eq!(SourceId::from_value(None), Err(SourceIdError::Missing));
        assert_eq!(
            SourceId::from_value(Some(&Value::Null)),
            Err(SourceIdError::Missing)
        );
        assert_eq!(
            SourceId::from_value(Some(&json!(12345))),
            Err(SourceIdError::NotAString)
        );
        assert_eq!(
            SourceId::from_value(Some(&json!(["https://youtu.be/dQw4w9WgXcQ"]))),
            Err(SourceIdError::NotAString)
        );
        assert_eq!(
            SourceId::from_value(Some(&json!("https://youtu.be/dQw4w9WgXcQ")))
                .unwrap()
                .as_str(),
            ID
        );
    }

    #[test]
    fn test_watch_url() {
        let id = SourceId::parse("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(id.watch_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }
}
