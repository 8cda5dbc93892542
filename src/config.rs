//! Config handling

use std::num::NonZeroU16;
use std::time::Duration;

use tracing::log::LevelFilter;
use url::Url;

use crate::cli::CliOptions;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("tower_sessions", LevelFilter::Warn)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Settings for the outbound model client.
#[derive(Clone)]
pub struct ModelConfig {
    /// Bearer token for the provider.
    pub api_key: String,
    /// Model name sent with each request.
    pub model: String,
    /// Base URL the `/responses` path is appended to.
    pub api_base: Url,
    /// Upper bound on a single generation request.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base", &self.api_base.as_str())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ModelConfig {
    /// Full URL of the Responses endpoint.
    pub fn responses_url(&self) -> String {
        format!("{}/responses", self.api_base.as_str().trim_end_matches('/'))
    }
}

/// Settings for the HTTP listener and visitor sessions.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind.
    pub listen_address: String,
    /// Port to bind.
    pub port: NonZeroU16,
    /// Inactivity window after which a session is dropped.
    pub session_idle: time::Duration,
    /// Mark the session cookie `Secure`.
    pub secure_cookies: bool,
}

impl ServerConfig {
    /// `host:port` string for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }
}

impl From<&CliOptions> for ModelConfig {
    fn from(cli: &CliOptions) -> Self {
        Self {
            api_key: cli.openai_api_key.clone(),
            model: cli.model.clone(),
            api_base: cli.api_base.clone(),
            request_timeout: Duration::from_secs(cli.request_timeout_secs.get()),
        }
    }
}

impl From<&CliOptions> for ServerConfig {
    fn from(cli: &CliOptions) -> Self {
        let minutes = i64::try_from(cli.session_idle_minutes.get()).unwrap_or(i64::MAX / 60);
        Self {
            listen_address: cli.listen_address.clone(),
            port: cli.port,
            session_idle: time::Duration::minutes(minutes),
            secure_cookies: cli.secure_cookies,
        }
    }
}
