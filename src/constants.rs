//! Shared constants for things
//!

use std::sync::LazyLock;

/// The only failure text a visitor ever sees for a generation.
pub const GENERATION_FAILED_MESSAGE: &str = "Failed to generate caption. Please try again.";

/// How long the "copied" indicator stays lit, in milliseconds.
pub const COPIED_INDICATOR_MILLIS: i64 = 2000;

/// How often expired sessions and idle visitors are swept, in seconds.
pub const SESSION_SWEEP_SECS: u64 = 60;

/// Largest decoded image we accept.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Largest request body, sized so a base64 data URI of a maximal image fits.
pub const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

/// Default model used for caption generation.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Default base URL of the OpenAI-compatible API.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Name of the structured output schema sent to the model.
pub const CAPTION_SCHEMA_NAME: &str = "marketing_caption";

/// Fixed instruction sent with every photo.
pub static CAPTION_INSTRUCTIONS: LazyLock<String> = LazyLock::new(|| {
    [
        "You are an AI marketing assistant specializing in creating engaging social media content.",
        "",
        "Based on the uploaded marketing photo, generate a caption and a list of relevant hashtags to increase audience reach.",
        "",
        "Caption: A creative and engaging caption for the photo.",
        "Hashtags: An array of relevant hashtags.",
    ]
    .join("\n")
});
