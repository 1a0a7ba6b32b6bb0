mod cli;
mod config;
mod constants;
mod core;
mod engine;
mod error;
mod http;
mod ingest;
mod pipeline;
mod progress;
mod prompts;
mod providers;
mod retry;
mod store;
mod telemetry;
#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crossterm::style::Stylize;

use config::AppConfig;
use engine::Engine;
use error::ApiError;
use http::{ReqwestTransport, Sleeper, ThreadSleeper};
use ingest::LocalIngestor;
use pipeline::{ExternalPipeline, GenerationArgs, GenerationRequest, VideoPipeline};
use progress::StatusLine;
use providers::gemini::GeminiClient;
use retry::RequestExecutor;
use telemetry::RunMonitor;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let status = StatusLine::stderr();
    let result = match cli.cmd {
        cli::Command::Caption {
            directory,
            api_key,
            config,
        } => run_caption(&directory, api_key, config.as_deref(), status),
        cli::Command::Generate {
            prompt,
            base_model,
            text_encoder,
            lora,
            output,
            negative_prompt,
            input_image,
            height,
            width,
            num_frames,
            seed,
            config,
        } => run_generate(
            GenerationArgs {
                base_model,
                text_encoder,
                lora: Some(lora),
                output,
                prompt,
                negative_prompt,
                input_image,
                height,
                width,
                num_frames,
                seed,
            },
            config.as_deref(),
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ApiError>() {
                Some(api) if api.is_fatal() => {
                    status.fatal(&api.to_string());
                    eprintln!("Please provide a valid, active API Key.");
                }
                _ => eprintln!("{} {err:#}", "error:".red().bold()),
            }
            ExitCode::FAILURE
        }
    }
}

fn run_caption(
    directory: &Path,
    cli_key: Option<String>,
    config_path: Option<&Path>,
    status: StatusLine,
) -> anyhow::Result<()> {
    let cfg = AppConfig::load(config_path)?;
    let api_key = config::resolve_api_key(|name| std::env::var(name).ok(), cli_key)?;

    let monitor = RunMonitor::new(status);
    let sleeper: Arc<dyn Sleeper> = Arc::new(ThreadSleeper);
    let transport = ReqwestTransport::new(cfg.request_timeout)?;
    let executor = RequestExecutor::new(
        Box::new(transport),
        cfg.retry.clone(),
        sleeper.clone(),
        monitor.clone(),
    );
    let client = GeminiClient::new(
        api_key,
        cfg.base_url.clone(),
        executor,
        sleeper.clone(),
        monitor.clone(),
        cfg.client.clone(),
    );
    let engine = Engine {
        ingestor: LocalIngestor::default(),
        service: client,
        monitor,
        sleeper,
        options: cfg.batch.clone(),
    };

    let summary = engine
        .run(directory)
        .with_context(|| format!("captioning {}", directory.display()))?;
    status.line(&format!("Finished: {summary}"));
    for failure in &summary.failures {
        status.line(&format!(
            "  {} failed: {}",
            failure.file,
            failure.error.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

fn run_generate(args: GenerationArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let cfg = AppConfig::load(config_path)?;
    let request = GenerationRequest::build(args)?;
    let pipeline = ExternalPipeline::new(cfg.pipeline_command);
    let written: PathBuf = pipeline.generate(&request)?;
    println!("Video written to {}", written.display());
    Ok(())
}
