//! JSON face of `generateCaption`.

use axum::Json;

use super::prelude::*;
use crate::caption::generate_caption;

#[derive(Debug, Deserialize)]
pub(crate) struct CaptionRequest {
    #[serde(default, rename = "photoDataUri")]
    photo_data_uri: String,
}

/// `POST /api/caption` with `{"photoDataUri": "data:image/png;base64,..."}`.
pub(crate) async fn caption_api_handler(
    State(state): State<AppState>,
    Json(request): Json<CaptionRequest>,
) -> Result<Json<CaptionResult>, CaptionAiError> {
    let result = generate_caption(state.generator.as_ref(), &request.photo_data_uri).await?;
    Ok(Json(result))
}
