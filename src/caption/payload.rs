//! Data URI payloads for photos headed to the model.

use std::fmt;
use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CaptionError;
use crate::constants::MAX_IMAGE_BYTES;

/// Image types the model is sent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum ImageMime {
    /// `image/png`
    Png,
    /// `image/jpeg`
    Jpeg,
    /// `image/webp`
    WebP,
}

impl ImageMime {
    /// The MIME type string.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageMime::Png => "image/png",
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::WebP => "image/webp",
        }
    }

    fn from_mime(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageMime::Png),
            "image/jpeg" | "image/jpg" => Some(ImageMime::Jpeg),
            "image/webp" => Some(ImageMime::WebP),
            _ => None,
        }
    }

    fn from_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(ImageMime::Png),
            image::ImageFormat::Jpeg => Some(ImageMime::Jpeg),
            image::ImageFormat::WebP => Some(ImageMime::WebP),
            _ => None,
        }
    }

    fn image_format(self) -> image::ImageFormat {
        match self {
            ImageMime::Png => image::ImageFormat::Png,
            ImageMime::Jpeg => image::ImageFormat::Jpeg,
            ImageMime::WebP => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A photo encoded as `data:<mime>;base64,<data>`.
///
/// Only constructed through [`ImagePayload::parse`] or
/// [`ImagePayload::from_bytes`], so a value always carries a supported,
/// non-empty image.
#[derive(Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImagePayload {
    mime: ImageMime,
    data_uri: String,
}

impl ImagePayload {
    /// Parses and checks a data URI.
    pub fn parse(data_uri: &str) -> Result<Self, CaptionError> {
        let data_uri = data_uri.trim();
        if data_uri.is_empty() {
            return Err(CaptionError::InvalidInput("image data is missing".to_string()));
        }
        let rest = data_uri
            .strip_prefix("data:")
            .ok_or_else(|| CaptionError::InvalidInput("not a data URI".to_string()))?;
        let (header, encoded) = rest
            .split_once(',')
            .ok_or_else(|| CaptionError::InvalidInput("data URI has no payload".to_string()))?;
        let mut params = header.split(';');
        let declared = params.next().unwrap_or_default();
        if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
            return Err(CaptionError::InvalidInput(
                "data URI is not base64 encoded".to_string(),
            ));
        }
        let mime = ImageMime::from_mime(declared).ok_or_else(|| {
            CaptionError::InvalidInput(format!("unsupported image type {declared:?}"))
        })?;

        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| CaptionError::InvalidInput(format!("invalid base64: {err}")))?;
        check_size(&bytes)?;

        let sniffed = sniff(&bytes)?;
        if sniffed != mime {
            return Err(CaptionError::InvalidInput(format!(
                "declared {mime} but the data is {sniffed}"
            )));
        }

        Ok(Self {
            mime,
            data_uri: format!("data:{};base64,{}", mime, encoded.trim()),
        })
    }

    /// Builds a payload from the raw bytes of a selected file.
    ///
    /// The type comes from the bytes, not from whatever the browser claimed,
    /// and the image has to decode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CaptionError> {
        check_size(bytes)?;
        let mime = sniff(bytes)?;
        image::load_from_memory_with_format(bytes, mime.image_format()).map_err(|err| {
            debug!("Failed to decode {} upload: {}", mime, err);
            CaptionError::InvalidInput(format!("could not decode {mime} image"))
        })?;

        Ok(Self {
            mime,
            data_uri: format!(
                "data:{};base64,{}",
                mime,
                general_purpose::STANDARD.encode(bytes)
            ),
        })
    }

    /// The image's MIME type.
    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    /// The full data URI.
    pub fn as_data_uri(&self) -> &str {
        &self.data_uri
    }

    /// Decoded image bytes, for serving the preview.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CaptionError> {
        let encoded = self
            .data_uri
            .split_once(',')
            .map(|(_, encoded)| encoded)
            .unwrap_or_default();
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(|err| CaptionError::InvalidInput(format!("invalid base64: {err}")))
    }
}

// Data URIs run to megabytes; keep logs readable.
impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime", &self.mime)
            .field("data_uri_len", &self.data_uri.len())
            .finish()
    }
}

impl TryFrom<String> for ImagePayload {
    type Error = CaptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImagePayload> for String {
    fn from(value: ImagePayload) -> Self {
        value.data_uri
    }
}

fn check_size(bytes: &[u8]) -> Result<(), CaptionError> {
    if bytes.is_empty() {
        return Err(CaptionError::InvalidInput("image is empty".to_string()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(CaptionError::InvalidInput(format!(
            "image is {} bytes, the limit is {}",
            bytes.len(),
            MAX_IMAGE_BYTES
        )));
    }
    Ok(())
}

fn sniff(bytes: &[u8]) -> Result<ImageMime, CaptionError> {
    let format = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.format())
        .ok_or_else(|| CaptionError::InvalidInput("not a recognised image".to_string()))?;
    ImageMime::from_format(format).ok_or_else(|| {
        CaptionError::InvalidInput(format!("unsupported image format {format:?}"))
    })
}
