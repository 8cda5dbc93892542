//! One-shot notices carried across the post/redirect/get hop.

use tower_sessions::Session;

use crate::error::CaptionAiError;
use crate::ui::Notice;

const NOTICE_KEY: &str = "notice";

/// What the template needs to draw a notice.
#[derive(Clone, Debug)]
pub(crate) struct FlashMessage {
    pub(crate) title: &'static str,
    pub(crate) text: String,
    pub(crate) class: &'static str,
}

impl From<&Notice> for FlashMessage {
    fn from(notice: &Notice) -> Self {
        Self {
            title: notice.title(),
            text: notice.description().to_string(),
            class: if notice.is_destructive() {
                "destructive"
            } else {
                "success"
            },
        }
    }
}

pub(crate) async fn set_notice(session: &Session, notice: &Notice) -> Result<(), CaptionAiError> {
    session.insert(NOTICE_KEY, notice).await?;
    Ok(())
}

pub(crate) async fn take_flash_message(
    session: &Session,
) -> Result<Option<FlashMessage>, CaptionAiError> {
    // Only touch the record when there is a notice to take.
    let Some(notice) = session.get::<Notice>(NOTICE_KEY).await? else {
        return Ok(None);
    };
    session.remove::<Notice>(NOTICE_KEY).await?;
    Ok(Some(FlashMessage::from(&notice)))
}
