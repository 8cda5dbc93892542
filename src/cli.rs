//! CLI parser
use clap::Parser;
use std::num::{NonZeroU16, NonZeroU64};
use url::Url;

use crate::constants::{DEFAULT_API_BASE, DEFAULT_MODEL};

#[derive(Parser, Debug)]
#[command(name = "captionai")]
#[command(about = "Generate marketing captions and hashtags for uploaded photos")]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "CAPTIONAI_DEBUG")]
    /// Enable debug logging. Env: CAPTIONAI_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "CAPTIONAI_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: CAPTIONAI_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "CAPTIONAI_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: CAPTIONAI_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    /// API key for the generative model provider.
    /// Env: OPENAI_API_KEY
    pub openai_api_key: String,

    #[clap(long, short, default_value = DEFAULT_MODEL, env = "CAPTIONAI_MODEL")]
    /// Vision-capable model used to write captions.
    /// Env: CAPTIONAI_MODEL
    pub model: String,

    #[clap(long, default_value = DEFAULT_API_BASE, env = "CAPTIONAI_API_BASE")]
    /// Base URL of an OpenAI-compatible API, eg `https://api.openai.com/v1`.
    /// Env: CAPTIONAI_API_BASE
    pub api_base: Url,

    #[clap(long, default_value = "60", env = "CAPTIONAI_REQUEST_TIMEOUT_SECS")]
    /// Seconds to wait for the model before giving up.
    /// Env: CAPTIONAI_REQUEST_TIMEOUT_SECS
    pub request_timeout_secs: NonZeroU64,

    #[clap(long, default_value = "60", env = "CAPTIONAI_SESSION_IDLE_MINUTES")]
    /// Minutes of inactivity before a visitor's photo and result are dropped.
    /// Env: CAPTIONAI_SESSION_IDLE_MINUTES
    pub session_idle_minutes: NonZeroU64,

    #[clap(long, env = "CAPTIONAI_SECURE_COOKIES")]
    /// Only send the session cookie over HTTPS. Turn on behind TLS.
    /// Env: CAPTIONAI_SECURE_COOKIES
    pub secure_cookies: bool,
}
