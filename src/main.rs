use std::sync::Arc;

use captionai::caption::openai::OpenAiCaptioner;
use captionai::config::{ModelConfig, ServerConfig, setup_logging};
use clap::Parser;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = captionai::cli::CliOptions::parse();

    if let Err(err) = setup_logging(cli.debug) {
        eprintln!("Logging setup failed: {}", err);
    }

    let model_config = ModelConfig::from(&cli);
    info!(
        "Captioning with {} via {}",
        model_config.model,
        model_config.responses_url()
    );
    let captioner = match OpenAiCaptioner::new(model_config) {
        Ok(captioner) => captioner,
        Err(err) => {
            error!("Failed to set up the model client: {}", err);
            return;
        }
    };

    let server_config = ServerConfig::from(&cli);
    if let Err(err) = captionai::web::setup_server(&server_config, Arc::new(captioner)).await {
        error!("Application error: {}", err);
    }
}
