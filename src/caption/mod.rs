//! Caption generation: the payload a photo travels in, the shape a model
//! must answer with, and the service tying them together.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

pub mod openai;
pub mod payload;
pub mod service;

pub use payload::ImagePayload;
pub use service::generate_caption;

/// A generated caption and its hashtags.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct CaptionResult {
    /// Caption text, editable by the visitor after generation.
    pub caption: String,
    /// Hashtags in the order the model returned them. May be empty.
    pub hashtags: Vec<String>,
}

impl CaptionResult {
    /// Validates structured model output against the `{caption, hashtags}` shape.
    ///
    /// Unknown fields are tolerated, missing or mistyped ones are not.
    pub fn from_model_output(raw: &str) -> Result<Self, CaptionError> {
        serde_json::from_str(raw).map_err(|err| {
            CaptionError::OutputValidation(format!("model output does not match schema: {err}"))
        })
    }

    /// Hashtags as they go onto the clipboard.
    pub fn hashtags_text(&self) -> String {
        self.hashtags.join(" ")
    }

    /// JSON schema the model is held to.
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "caption": {
                    "type": "string",
                    "description": "The generated marketing caption for the image."
                },
                "hashtags": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "An array of relevant hashtags for the image."
                }
            },
            "required": ["caption", "hashtags"]
        })
    }
}

/// Ways a caption request can fail.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CaptionError {
    /// The photo was missing or not a supported image data URI.
    InvalidInput(String),
    /// The model could not be reached or refused the request.
    Generation(String),
    /// The model answered with something other than `{caption, hashtags}`.
    OutputValidation(String),
}

impl std::fmt::Display for CaptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(reason) => write!(f, "Invalid input: {reason}"),
            Self::Generation(reason) => write!(f, "Generation failed: {reason}"),
            Self::OutputValidation(reason) => write!(f, "Model output rejected: {reason}"),
        }
    }
}

impl std::error::Error for CaptionError {}

/// Future returned by [`CaptionGenerator::generate`].
pub type GenerateFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CaptionResult, CaptionError>> + Send + 'a>>;

/// Something that turns a photo into a caption, normally a hosted model.
pub trait CaptionGenerator: Send + Sync + std::fmt::Debug {
    /// Makes exactly one attempt at captioning `payload`.
    fn generate<'a>(&'a self, payload: &'a ImagePayload) -> GenerateFuture<'a>;
}
