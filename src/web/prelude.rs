pub(crate) use crate::caption::{CaptionResult, ImagePayload};
pub(crate) use crate::error::CaptionAiError;
pub(crate) use crate::ui::{CopyTarget, FileRead, Notice};
pub(crate) use crate::web::AppState;
pub(crate) use crate::web::visitor::visitor_id;
pub(crate) use askama::Template;
pub(crate) use askama_web::WebTemplate;
pub(crate) use axum::extract::{Form, Path, State};
pub(crate) use axum::http::{HeaderValue, header::CONTENT_TYPE};
pub(crate) use axum::response::Redirect;
pub(crate) use serde::Deserialize;
pub(crate) use tower_sessions::Session;
pub(crate) use tracing::{debug, info};
