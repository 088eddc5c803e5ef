//! Stand-in packing engine.
//!
//! Speaks the engine side of the protocol on stdin/stdout without packing
//! anything. Used by the end-to-end tests and for trying the bridge without
//! the real engine.
//!
//! ```text
//! uvpack-stub-engine --mode identity --coverage 0.875 --progress-steps 4
//! ```

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use uvpack_bridge::engine::{identity_results, read_request, EngineResponder};
use uvpack_bridge::protocol::DEFAULT_MAX_FRAME_SIZE;
use uvpack_bridge::ResponseFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Return every UV unchanged.
    Identity,
    /// Report some progress, then never answer.
    Hang,
    /// Answer with an Error frame.
    Error,
    /// Exit without a terminal frame.
    Die,
}

#[derive(Parser, Debug)]
#[command(name = "uvpack-stub-engine")]
#[command(version)]
#[command(about = "Stand-in UV packing engine speaking the bridge protocol on stdio")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Mode::Identity)]
    mode: Mode,

    /// Coverage reported on success.
    #[arg(long, default_value_t = 0.875)]
    coverage: f64,

    /// Progress frames sent before answering.
    #[arg(long, default_value_t = 4)]
    progress_steps: u32,

    /// Message sent in error mode.
    #[arg(long, default_value = "Stub engine failure")]
    error_message: String,

    /// Send a frame with an unassigned message type before answering.
    #[arg(long)]
    emit_unknown: bool,

    /// Keep running after the terminal frame until killed.
    #[arg(long)]
    linger: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // stdout is the data plane
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Stub engine failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> uvpack_bridge::Result<ExitCode> {
    let mut stdin = tokio::io::stdin();
    let request = read_request(&mut stdin, DEFAULT_MAX_FRAME_SIZE).await?;

    match serde_json::to_string(&request.options) {
        Ok(json) => tracing::info!("Options: {}", json),
        Err(e) => tracing::warn!("Could not log options: {}", e),
    }
    tracing::info!(
        "Packing {} objects in {:?} mode",
        request.objects.len(),
        cli.mode
    );

    let mut responder = EngineResponder::new(tokio::io::stdout());
    if cli.emit_unknown {
        responder.send(&ResponseFrame::Unknown(0xFF)).await?;
    }

    let steps = cli.progress_steps.max(1);
    for step in 1..=steps {
        responder.progress(step as f64 / steps as f64).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    match cli.mode {
        Mode::Identity => {
            responder
                .success(&identity_results(&request, cli.coverage))
                .await?;
        }
        Mode::Error => responder.error(&cli.error_message).await?,
        Mode::Hang => {
            tracing::info!("Hanging until killed");
            std::future::pending::<()>().await;
        }
        Mode::Die => {
            tracing::info!("Exiting without a result");
            return Ok(ExitCode::from(3));
        }
    }

    if cli.linger {
        tracing::info!("Answered, lingering until killed");
        std::future::pending::<()>().await;
    }

    Ok(ExitCode::SUCCESS)
}
