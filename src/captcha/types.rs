use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// A captcha image as found in the page's `src` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaImage {
    /// Decoded bytes of a `data:image/...;base64,` source.
    Inline(Vec<u8>),
    /// An `http(s)` URL the solver fetches itself.
    Remote(String),
}

impl CaptchaImage {
    /// Parse an image source. `None` when the source is neither a base64
    /// data URL nor an http(s) URL, or the payload does not decode.
    pub fn from_source(source: &str) -> Option<Self> {
        let source = source.trim();
        let lower = source.to_ascii_lowercase();

        if lower.starts_with("data:image/") {
            let (_, payload) = source.split_once(',')?;
            return STANDARD.decode(payload.trim()).ok().map(CaptchaImage::Inline);
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(CaptchaImage::Remote(source.to_string()));
        }
        None
    }
}

/// Request body sent to the HTTP solving service.
#[derive(Debug, Serialize)]
pub struct SolveRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl From<&CaptchaImage> for SolveRequest {
    fn from(image: &CaptchaImage) -> Self {
        match image {
            CaptchaImage::Inline(bytes) => SolveRequest {
                image_base64: Some(STANDARD.encode(bytes)),
                image_url: None,
            },
            CaptchaImage::Remote(url) => SolveRequest {
                image_base64: None,
                image_url: Some(url.clone()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SolveResponse {
    #[serde(default)]
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_url() {
        let src = format!("data:image/png;base64,{}", STANDARD.encode(b"xyz"));
        assert_eq!(
            CaptchaImage::from_source(&src),
            Some(CaptchaImage::Inline(b"xyz".to_vec()))
        );
    }

    #[test]
    fn parses_remote_url() {
        assert_eq!(
            CaptchaImage::from_source("  https://example.org/c.png "),
            Some(CaptchaImage::Remote("https://example.org/c.png".into()))
        );
    }

    #[test]
    fn rejects_unknown_sources() {
        assert_eq!(CaptchaImage::from_source("blob:abc"), None);
        assert_eq!(CaptchaImage::from_source("data:image/png;base64,@@@"), None);
        assert_eq!(CaptchaImage::from_source("data:image/png;base64"), None);
    }

    #[test]
    fn request_carries_one_image_field() {
        let json = serde_json::to_value(SolveRequest::from(&CaptchaImage::Remote(
            "http://x/y.png".into(),
        )))
        .unwrap();
        assert_eq!(json, serde_json::json!({ "image_url": "http://x/y.png" }));
    }
}
