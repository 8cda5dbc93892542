use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use axum::http::response::Builder;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;

use crate::caption::ImagePayload;
use crate::error::CaptionAiError;

/// Previews are private to the visitor and change whenever they pick a new
/// photo, so the browser must revalidate every time.
const PREVIEW_CACHE_CONTROL: &str = "private, no-cache";

/// Cache headers derived from the selected photo.
#[derive(Clone, Debug)]
pub(crate) struct PreviewCacheHeaders {
    etag: Option<HeaderValue>,
}

impl PreviewCacheHeaders {
    /// Builds a content-derived ETag for the payload.
    pub(crate) fn for_payload(payload: &ImagePayload) -> Self {
        let mut hasher = DefaultHasher::new();
        payload.as_data_uri().hash(&mut hasher);
        let value = format!(
            "W/\"{}-{:016x}\"",
            payload.as_data_uri().len(),
            hasher.finish()
        );
        Self {
            etag: HeaderValue::from_str(&value).ok(),
        }
    }

    /// Returns the ETag header value, if available.
    pub(crate) fn etag(&self) -> Option<&HeaderValue> {
        self.etag.as_ref()
    }

    /// Short version tag for cache-busting preview URLs.
    pub(crate) fn version(&self) -> String {
        self.etag()
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                value
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Applies preview cache headers to a response builder.
pub(crate) fn apply_cache_headers(mut builder: Builder, cache: &PreviewCacheHeaders) -> Builder {
    builder = builder.header(CACHE_CONTROL, PREVIEW_CACHE_CONTROL);
    if let Some(etag) = cache.etag() {
        builder = builder.header(ETAG, etag.clone());
    }
    builder
}

/// Returns true when the browser already holds this preview.
pub(crate) fn is_not_modified(headers: &HeaderMap, cache: &PreviewCacheHeaders) -> bool {
    let Some(if_none_match) = headers.get(IF_NONE_MATCH) else {
        return false;
    };
    let Ok(value) = if_none_match.to_str() else {
        return false;
    };
    let value = value.trim();
    if value == "*" {
        return true;
    }
    cache
        .etag()
        .and_then(|etag| etag.to_str().ok())
        .is_some_and(|etag| value.split(',').any(|candidate| candidate.trim() == etag))
}

/// Builds a 304 response that preserves cache headers.
pub(crate) fn not_modified_response(
    cache: &PreviewCacheHeaders,
) -> Result<Response, CaptionAiError> {
    let builder = Response::builder().status(StatusCode::NOT_MODIFIED);
    let builder = apply_cache_headers(builder, cache);
    builder.body(Body::empty()).map_err(CaptionAiError::from)
}
