//! The caption page and the form posts that drive it.

use axum::extract::Multipart;
use axum::http::HeaderMap;
use axum::response::Response;
use chrono::{DateTime, Utc};

use super::csrf::{csrf_token, validate_csrf};
use super::flash::{self, set_notice};
use super::images::{
    PreviewCacheHeaders, apply_cache_headers, is_not_modified, not_modified_response,
};
use super::prelude::*;
use crate::caption::service::generate_for_payload;
use crate::ui::CaptionSession;

#[derive(Deserialize)]
pub(crate) struct CsrfForm {
    csrf_token: String,
}

#[derive(Deserialize)]
pub(crate) struct CaptionEditForm {
    csrf_token: String,
    caption: String,
}

/// A copy outcome. `caption` carries the text box as the browser copied it.
#[derive(Deserialize)]
pub(crate) struct CopyForm {
    csrf_token: String,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub(crate) struct HomeTemplate {
    csrf_token: String,
    has_flash: bool,
    flash_title: String,
    flash_message: String,
    flash_class: String,
    has_image: bool,
    preview_url: String,
    is_loading: bool,
    can_generate: bool,
    has_error: bool,
    error_message: String,
    has_result: bool,
    caption: String,
    hashtags: Vec<String>,
    hashtags_text: String,
    caption_copied: bool,
    hashtags_copied: bool,
    copied_clear_after_ms: i64,
}

/// What the page shows of a visitor's state, copied out under the store lock.
struct PageState {
    has_image: bool,
    preview_url: String,
    is_loading: bool,
    can_generate: bool,
    error_message: Option<String>,
    result: Option<CaptionResult>,
    copied: Option<CopyTarget>,
    copied_clear_after_ms: i64,
}

impl PageState {
    fn capture(caption_session: &CaptionSession, now: DateTime<Utc>) -> Self {
        let copied = caption_session.copied(now);
        let copied_clear_after_ms = match (copied, caption_session.copied_indicator()) {
            (Some(_), Some(indicator)) => (indicator.expires_at() - now).num_milliseconds().max(0),
            _ => 0,
        };
        let preview_url = caption_session
            .image()
            .map(|payload| {
                format!(
                    "/image/preview?v={}",
                    PreviewCacheHeaders::for_payload(payload).version()
                )
            })
            .unwrap_or_default();
        Self {
            has_image: caption_session.image().is_some(),
            preview_url,
            is_loading: caption_session.is_loading(),
            can_generate: caption_session.can_generate(),
            error_message: caption_session.error().map(str::to_string),
            result: caption_session.result().cloned(),
            copied,
            copied_clear_after_ms,
        }
    }
}

/// handles the / GET
pub(crate) async fn root_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<HomeTemplate, CaptionAiError> {
    let visitor = visitor_id(&session).await?;
    let csrf_token = csrf_token(&session).await?;
    let flash = flash::take_flash_message(&session).await?;
    let (has_flash, flash_title, flash_message, flash_class) = match flash {
        Some(message) => (
            true,
            message.title.to_string(),
            message.text,
            message.class.to_string(),
        ),
        None => (false, String::new(), String::new(), String::new()),
    };

    let now = Utc::now();
    let page = state
        .visitors
        .read(&visitor, |caption_session| {
            PageState::capture(caption_session, now)
        })
        .await;

    let has_result = page.result.is_some();
    let result = page.result.unwrap_or_default();
    Ok(HomeTemplate {
        csrf_token,
        has_flash,
        flash_title,
        flash_message,
        flash_class,
        has_image: page.has_image,
        preview_url: page.preview_url,
        is_loading: page.is_loading,
        can_generate: page.can_generate,
        has_error: page.error_message.is_some(),
        error_message: page.error_message.unwrap_or_default(),
        has_result,
        hashtags_text: result.hashtags_text(),
        caption: result.caption,
        hashtags: result.hashtags,
        caption_copied: page.copied == Some(CopyTarget::Caption),
        hashtags_copied: page.copied == Some(CopyTarget::Hashtags),
        copied_clear_after_ms: page.copied_clear_after_ms,
    })
}

/// Accepts a photo from the file picker.
pub(crate) async fn upload_image_handler(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Redirect, CaptionAiError> {
    let mut csrf_token_value: Option<String> = None;
    let mut image_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| CaptionAiError::BadRequest(err.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "csrf_token" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| CaptionAiError::BadRequest(err.to_string()))?;
                csrf_token_value = Some(value);
            }
            "image" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| CaptionAiError::BadRequest(err.to_string()))?;
                image_bytes = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let csrf_token_value = csrf_token_value.ok_or(CaptionAiError::Unauthorized)?;
    validate_csrf(&session, &csrf_token_value).await?;
    let visitor = visitor_id(&session).await?;

    let read = read_selected_file(image_bytes.unwrap_or_default()).await?;
    let selected = state
        .visitors
        .update(&visitor, |caption_session| caption_session.file_read(read))
        .await;
    if let Err(notice) = selected {
        set_notice(&session, &notice).await?;
    }
    Ok(Redirect::to("/"))
}

/// Decodes the upload off the async runtime and reports a single completion.
async fn read_selected_file(bytes: Vec<u8>) -> Result<FileRead, CaptionAiError> {
    tokio::task::spawn_blocking(move || match ImagePayload::from_bytes(&bytes) {
        Ok(payload) => FileRead::Ready(payload),
        Err(err) => FileRead::Failed(err.to_string()),
    })
    .await
    .map_err(|err| CaptionAiError::InternalServerError(format!("file read task: {err}")))
}

/// Runs one generation for the visitor's photo.
///
/// The move to Loading happens under the visitor store's lock, so a second
/// generate from the same visitor is refused until this one settles. The
/// call runs on its own task and settles the state even if the browser
/// goes away.
pub(crate) async fn generate_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CsrfForm>,
) -> Result<Redirect, CaptionAiError> {
    validate_csrf(&session, &form.csrf_token).await?;
    let visitor = visitor_id(&session).await?;

    let begun = state
        .visitors
        .update(&visitor, CaptionSession::begin_generate)
        .await;
    let ticket = match begun {
        Ok(ticket) => ticket,
        Err(notice) => {
            debug!("Generate refused: {:?}", notice);
            set_notice(&session, &notice).await?;
            return Ok(Redirect::to("/"));
        }
    };

    let generator = state.generator.clone();
    let visitors = state.visitors.clone();
    let task_session = session.clone();
    let settled = tokio::spawn(async move {
        let outcome = generate_for_payload(generator.as_ref(), &ticket.payload).await;
        let completed = visitors
            .update(&visitor, |caption_session| {
                caption_session.complete_generate(outcome)
            })
            .await;
        if let Err(notice) = completed {
            set_notice(&task_session, &notice).await?;
            task_session.save().await?;
        }
        Ok::<_, CaptionAiError>(())
    });
    settled
        .await
        .map_err(|err| CaptionAiError::InternalServerError(format!("generate task: {err}")))??;

    Ok(Redirect::to("/"))
}

/// Saves an edited caption without calling the model again.
pub(crate) async fn edit_caption_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CaptionEditForm>,
) -> Result<Redirect, CaptionAiError> {
    validate_csrf(&session, &form.csrf_token).await?;
    let visitor = visitor_id(&session).await?;
    let edited = state
        .visitors
        .update(&visitor, |caption_session| {
            caption_session.edit_caption(&form.caption)
        })
        .await;
    if !edited {
        debug!("Caption edit outside Success ignored");
    }
    Ok(Redirect::to("/"))
}

fn parse_copy_target(target: &str) -> Result<CopyTarget, CaptionAiError> {
    target
        .parse()
        .map_err(|_| CaptionAiError::NotFound(format!("copy target {target}")))
}

/// Keeps the caption the browser copied, even when it was never saved.
fn keep_copied_caption(caption_session: &mut CaptionSession, target: CopyTarget, form: &CopyForm) {
    if let (CopyTarget::Caption, Some(caption)) = (target, form.caption.as_deref()) {
        caption_session.edit_caption(caption);
    }
}

/// Records that the browser put `target` on the clipboard.
pub(crate) async fn copied_handler(
    State(state): State<AppState>,
    session: Session,
    Path(target): Path<String>,
    Form(form): Form<CopyForm>,
) -> Result<Redirect, CaptionAiError> {
    validate_csrf(&session, &form.csrf_token).await?;
    let target = parse_copy_target(&target)?;
    let visitor = visitor_id(&session).await?;
    let now = Utc::now();
    let notice = state
        .visitors
        .update(&visitor, |caption_session| {
            keep_copied_caption(caption_session, target, &form);
            caption_session.mark_copied(target, now)
        })
        .await;
    if let Some(notice) = notice {
        set_notice(&session, &notice).await?;
    }
    Ok(Redirect::to("/"))
}

/// Records that the browser refused the clipboard write.
pub(crate) async fn copy_failed_handler(
    State(state): State<AppState>,
    session: Session,
    Path(target): Path<String>,
    Form(form): Form<CopyForm>,
) -> Result<Redirect, CaptionAiError> {
    validate_csrf(&session, &form.csrf_token).await?;
    let target = parse_copy_target(&target)?;
    info!("Clipboard write for {:?} failed in the browser", target);
    let visitor = visitor_id(&session).await?;
    state
        .visitors
        .update(&visitor, |caption_session| {
            keep_copied_caption(caption_session, target, &form)
        })
        .await;
    set_notice(&session, &Notice::CopyFailed).await?;
    Ok(Redirect::to("/"))
}

/// Serves the selected photo back as the preview.
pub(crate) async fn preview_handler(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response, CaptionAiError> {
    let visitor = visitor_id(&session).await?;
    let selected = state
        .visitors
        .read(&visitor, |caption_session| caption_session.image().cloned())
        .await;
    let Some(payload) = selected else {
        return Err(CaptionAiError::NotFound("preview".to_string()));
    };
    let cache_headers = PreviewCacheHeaders::for_payload(&payload);
    if is_not_modified(&headers, &cache_headers) {
        return not_modified_response(&cache_headers);
    }
    let bytes = payload
        .to_bytes()
        .map_err(|err| CaptionAiError::InternalServerError(err.to_string()))?;
    let builder = Response::builder().header(
        CONTENT_TYPE,
        HeaderValue::from_static(payload.mime().as_str()),
    );
    apply_cache_headers(builder, &cache_headers)
        .body(axum::body::Body::from(bytes))
        .map_err(CaptionAiError::from)
}
