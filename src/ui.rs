//! The upload/review state machine behind the caption page.
//!
//! A [`CaptionSession`] is the only owner of a visitor's state. Handlers
//! never poke at its fields; they call the transition methods and render
//! what comes out.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::caption::{CaptionResult, ImagePayload};
use crate::constants::{COPIED_INDICATOR_MILLIS, GENERATION_FAILED_MESSAGE};

/// Where the page is in the generate cycle.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum UiState {
    /// Nothing selected yet.
    #[default]
    Idle,
    /// A photo is selected and nothing has been generated for it.
    ImageSelected,
    /// A generation is in flight.
    Loading,
    /// The model answered.
    Success(CaptionResult),
    /// The model call failed; holds the message shown to the visitor.
    Failed(String),
}

/// Which field a copy action refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum CopyTarget {
    /// The caption text.
    Caption,
    /// The hashtags, space separated.
    Hashtags,
}

impl std::str::FromStr for CopyTarget {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "caption" => Ok(CopyTarget::Caption),
            "hashtags" => Ok(CopyTarget::Hashtags),
            _ => Err(()),
        }
    }
}

/// Transient messages shown once, the way toasts are.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum Notice {
    /// Generate was pressed with no photo.
    UploadRequired,
    /// The selected file could not be used.
    FileRejected,
    /// A photo change or second generate arrived while generating.
    GenerationInProgress,
    /// Generation failed.
    GenerationFailed(String),
    /// Something landed on the clipboard.
    Copied,
    /// The browser refused the clipboard write.
    CopyFailed,
}

impl Notice {
    /// Short heading for the notice.
    pub fn title(&self) -> &'static str {
        match self {
            Notice::UploadRequired | Notice::FileRejected => "Error",
            Notice::GenerationInProgress => "Please wait",
            Notice::GenerationFailed(_) => "Generation Failed",
            Notice::Copied => "Copied to clipboard!",
            Notice::CopyFailed => "Failed to copy",
        }
    }

    /// Body text, empty when the title says it all.
    pub fn description(&self) -> &str {
        match self {
            Notice::UploadRequired => "Please upload an image first.",
            Notice::FileRejected => "Please choose a PNG, JPEG or WEBP image.",
            Notice::GenerationInProgress => "A caption is already being generated.",
            Notice::GenerationFailed(message) => message,
            Notice::Copied => "",
            Notice::CopyFailed => "Could not copy text to clipboard.",
        }
    }

    /// Whether this is bad news.
    pub fn is_destructive(&self) -> bool {
        !matches!(self, Notice::Copied | Notice::GenerationInProgress)
    }
}

/// Completion of reading a selected file.
#[derive(Debug)]
pub enum FileRead {
    /// The file became a usable payload.
    Ready(ImagePayload),
    /// The file could not be read or is not a supported image.
    Failed(String),
}

/// Proof that [`CaptionSession::begin_generate`] moved to Loading, carrying
/// the photo to send.
#[derive(Debug)]
pub struct GenerateTicket {
    /// Photo to caption.
    pub payload: ImagePayload,
}

/// The "copied" check mark, lit for [`COPIED_INDICATOR_MILLIS`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct CopiedIndicator {
    target: CopyTarget,
    copied_at: DateTime<Utc>,
}

impl CopiedIndicator {
    /// The indicator's lifetime.
    pub fn duration() -> Duration {
        Duration::milliseconds(COPIED_INDICATOR_MILLIS)
    }

    /// When the indicator goes dark.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.copied_at + Self::duration()
    }

    fn is_lit(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

/// A visitor's photo, generation state and copy indicator.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CaptionSession {
    image: Option<ImagePayload>,
    state: UiState,
    copied: Option<CopiedIndicator>,
}

impl CaptionSession {
    /// Current state.
    pub fn state(&self) -> &UiState {
        &self.state
    }

    /// Selected photo, if any.
    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }

    /// The result while in Success.
    pub fn result(&self) -> Option<&CaptionResult> {
        match &self.state {
            UiState::Success(result) => Some(result),
            _ => None,
        }
    }

    /// The failure message while in Failed.
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            UiState::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// Whether a generation is in flight.
    pub fn is_loading(&self) -> bool {
        self.state == UiState::Loading
    }

    /// Whether the generate control is enabled.
    pub fn can_generate(&self) -> bool {
        self.image.is_some() && !self.is_loading()
    }

    /// Applies a finished file read.
    ///
    /// A usable photo replaces the old one and drops any result or error.
    /// Nothing changes on a failed read, or while generating.
    pub fn file_read(&mut self, read: FileRead) -> Result<(), Notice> {
        if self.is_loading() {
            return Err(Notice::GenerationInProgress);
        }
        match read {
            FileRead::Ready(payload) => {
                self.image = Some(payload);
                self.state = UiState::ImageSelected;
                self.copied = None;
                Ok(())
            }
            FileRead::Failed(reason) => {
                tracing::debug!("Rejected selected file: {reason}");
                Err(Notice::FileRejected)
            }
        }
    }

    /// Moves to Loading and hands back the photo to send.
    ///
    /// Without a photo this emits [`Notice::UploadRequired`] and stays put.
    pub fn begin_generate(&mut self) -> Result<GenerateTicket, Notice> {
        if self.is_loading() {
            return Err(Notice::GenerationInProgress);
        }
        let Some(payload) = self.image.clone() else {
            return Err(Notice::UploadRequired);
        };
        self.state = UiState::Loading;
        self.copied = None;
        Ok(GenerateTicket { payload })
    }

    /// Settles a Loading state with the service's outcome.
    ///
    /// Returns the failure notice on error. A completion outside Loading is
    /// dropped.
    pub fn complete_generate<E>(
        &mut self,
        outcome: Result<CaptionResult, E>,
    ) -> Result<(), Notice> {
        if !self.is_loading() {
            tracing::debug!("Ignoring completion outside Loading");
            return Ok(());
        }
        match outcome {
            Ok(result) => {
                self.state = UiState::Success(result);
                Ok(())
            }
            Err(_) => {
                let message = GENERATION_FAILED_MESSAGE.to_string();
                self.state = UiState::Failed(message.clone());
                Err(Notice::GenerationFailed(message))
            }
        }
    }

    /// Replaces the caption text in Success. Returns false elsewhere.
    pub fn edit_caption(&mut self, caption: &str) -> bool {
        match &mut self.state {
            UiState::Success(result) => {
                result.caption = caption.to_string();
                true
            }
            _ => false,
        }
    }

    /// Text to put on the clipboard for `target`, only in Success.
    pub fn copy_text(&self, target: CopyTarget) -> Option<String> {
        let result = self.result()?;
        Some(match target {
            CopyTarget::Caption => result.caption.clone(),
            CopyTarget::Hashtags => result.hashtags_text(),
        })
    }

    /// Records a successful copy at `now` and lights the indicator.
    pub fn mark_copied(&mut self, target: CopyTarget, now: DateTime<Utc>) -> Option<Notice> {
        self.result()?;
        self.copied = Some(CopiedIndicator {
            target,
            copied_at: now,
        });
        Some(Notice::Copied)
    }

    /// Which field's indicator is lit at `now`, if any.
    pub fn copied(&self, now: DateTime<Utc>) -> Option<CopyTarget> {
        self.copied
            .filter(|indicator| indicator.is_lit(now))
            .map(|indicator| indicator.target)
    }

    /// The raw indicator, lit or not.
    pub fn copied_indicator(&self) -> Option<CopiedIndicator> {
        self.copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::CaptionError;
    use crate::caption::payload::tests::sample_png;

    fn payload() -> ImagePayload {
        ImagePayload::from_bytes(&sample_png()).expect("payload")
    }

    fn sunset() -> CaptionResult {
        CaptionResult {
            caption: "Sunset vibes".to_string(),
            hashtags: vec!["#sunset".to_string(), "#vibes".to_string()],
        }
    }

    fn success_session() -> CaptionSession {
        let mut session = CaptionSession::default();
        session.file_read(FileRead::Ready(payload())).expect("select");
        session.begin_generate().expect("begin");
        session
            .complete_generate::<CaptionError>(Ok(sunset()))
            .expect("complete");
        session
    }

    #[test]
    fn generate_without_image_stays_idle() {
        let mut session = CaptionSession::default();
        assert!(!session.can_generate());
        assert_eq!(
            session.begin_generate().expect_err("no image"),
            Notice::UploadRequired
        );
        assert_eq!(session.state(), &UiState::Idle);
    }

    #[test]
    fn selecting_an_image_enables_generate() {
        let mut session = CaptionSession::default();
        session.file_read(FileRead::Ready(payload())).expect("select");
        assert_eq!(session.state(), &UiState::ImageSelected);
        assert!(session.can_generate());
    }

    #[test]
    fn failed_read_leaves_state_alone() {
        let mut session = success_session();
        assert_eq!(
            session.file_read(FileRead::Failed("not an image".to_string())),
            Err(Notice::FileRejected)
        );
        assert_eq!(session.result(), Some(&sunset()));
    }

    #[test]
    fn generate_goes_through_loading_to_success() {
        let mut session = CaptionSession::default();
        session.file_read(FileRead::Ready(payload())).expect("select");
        let ticket = session.begin_generate().expect("begin");
        assert_eq!(ticket.payload, payload());
        assert_eq!(session.state(), &UiState::Loading);
        assert!(!session.can_generate());

        session
            .complete_generate::<CaptionError>(Ok(sunset()))
            .expect("complete");
        assert_eq!(session.state(), &UiState::Success(sunset()));
        assert_eq!(session.error(), None);
    }

    #[test]
    fn failure_carries_generic_message_and_no_result() {
        let mut session = CaptionSession::default();
        session.file_read(FileRead::Ready(payload())).expect("select");
        session.begin_generate().expect("begin");
        let notice = session
            .complete_generate::<CaptionError>(Err(CaptionError::OutputValidation(
                "missing field `hashtags`".to_string(),
            )))
            .expect_err("failure notice");
        assert_eq!(
            notice,
            Notice::GenerationFailed(GENERATION_FAILED_MESSAGE.to_string())
        );
        assert_eq!(session.error(), Some(GENERATION_FAILED_MESSAGE));
        assert_eq!(session.result(), None);
        assert!(session.can_generate());
    }

    #[test]
    fn single_flight_while_loading() {
        let mut session = CaptionSession::default();
        session.file_read(FileRead::Ready(payload())).expect("select");
        session.begin_generate().expect("begin");
        assert_eq!(
            session.begin_generate().expect_err("second generate"),
            Notice::GenerationInProgress
        );
        assert_eq!(
            session.file_read(FileRead::Ready(payload())),
            Err(Notice::GenerationInProgress)
        );
        assert_eq!(session.state(), &UiState::Loading);
    }

    #[test]
    fn stray_completion_is_ignored() {
        let mut session = CaptionSession::default();
        session.file_read(FileRead::Ready(payload())).expect("select");
        session
            .complete_generate::<CaptionError>(Ok(sunset()))
            .expect("ignored");
        assert_eq!(session.state(), &UiState::ImageSelected);
    }

    #[test]
    fn new_image_clears_result_and_error() {
        let mut session = success_session();
        session.file_read(FileRead::Ready(payload())).expect("reselect");
        assert_eq!(session.state(), &UiState::ImageSelected);
        assert_eq!(session.result(), None);

        session.begin_generate().expect("begin");
        let _ = session.complete_generate(Err(CaptionError::Generation("down".to_string())));
        session.file_read(FileRead::Ready(payload())).expect("reselect");
        assert_eq!(session.state(), &UiState::ImageSelected);
        assert_eq!(session.error(), None);
    }

    #[test]
    fn editing_caption_keeps_hashtags() {
        let mut session = success_session();
        assert!(session.edit_caption("Golden hour on the pier"));
        let result = session.result().expect("still success");
        assert_eq!(result.caption, "Golden hour on the pier");
        assert_eq!(result.hashtags, vec!["#sunset", "#vibes"]);

        let mut idle = CaptionSession::default();
        assert!(!idle.edit_caption("nope"));
    }

    #[test]
    fn copy_only_in_success_and_hashtags_space_joined() {
        let idle = CaptionSession::default();
        assert_eq!(idle.copy_text(CopyTarget::Caption), None);

        let session = success_session();
        assert_eq!(
            session.copy_text(CopyTarget::Hashtags).as_deref(),
            Some("#sunset #vibes")
        );
        assert_eq!(
            session.copy_text(CopyTarget::Caption).as_deref(),
            Some("Sunset vibes")
        );
    }

    #[test]
    fn copied_indicator_clears_after_two_seconds() {
        let mut session = success_session();
        let now = Utc::now();
        assert_eq!(
            session.mark_copied(CopyTarget::Hashtags, now),
            Some(Notice::Copied)
        );
        assert_eq!(session.copied(now), Some(CopyTarget::Hashtags));
        assert_eq!(
            session.copied(now + Duration::milliseconds(1999)),
            Some(CopyTarget::Hashtags)
        );
        assert_eq!(session.copied(now + Duration::milliseconds(2000)), None);
        // the main state is untouched either way
        assert_eq!(session.state(), &UiState::Success(sunset()));

        let mut idle = CaptionSession::default();
        assert_eq!(idle.mark_copied(CopyTarget::Caption, now), None);
        assert_eq!(idle.copied(now), None);
    }

    #[test]
    fn round_trips_through_session_storage() {
        let session = success_session();
        let json = serde_json::to_value(&session).expect("serialize");
        let back: CaptionSession = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.state(), session.state());
        assert_eq!(back.image(), session.image());
    }
}
