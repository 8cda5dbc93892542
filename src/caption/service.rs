//! The `generateCaption` operation.

use tracing::{debug, error, instrument};

use super::{CaptionError, CaptionGenerator, CaptionResult, ImagePayload};

/// Validates `photo_data_uri` and asks `generator` for a caption.
///
/// Input problems fail with [`CaptionError::InvalidInput`] before the
/// generator is touched. Every failure is logged here; callers only show the
/// generic message.
#[instrument(skip_all, fields(uri_len = photo_data_uri.len()))]
pub async fn generate_caption(
    generator: &dyn CaptionGenerator,
    photo_data_uri: &str,
) -> Result<CaptionResult, CaptionError> {
    let payload = ImagePayload::parse(photo_data_uri).inspect_err(|err| {
        error!("Error generating caption: {err}");
    })?;
    generate_for_payload(generator, &payload).await
}

/// Same as [`generate_caption`] for a payload that is already validated.
#[instrument(skip_all, fields(mime = %payload.mime()))]
pub async fn generate_for_payload(
    generator: &dyn CaptionGenerator,
    payload: &ImagePayload,
) -> Result<CaptionResult, CaptionError> {
    match generator.generate(payload).await {
        Ok(result) => {
            debug!("Generated caption with {} hashtags", result.hashtags.len());
            Ok(result)
        }
        Err(err) => {
            error!("Error generating caption: {err}");
            Err(err)
        }
    }
}
