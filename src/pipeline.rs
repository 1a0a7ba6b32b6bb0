use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_NEGATIVE_PROMPT: &str = "worst quality, blurry, jittery";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoraSpec {
    pub path: PathBuf,
    pub strength: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageCondition {
    pub path: PathBuf,
    pub frame_index: u32,
    pub strength: f32,
}

/// One inference job, as handed to the pipeline process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub base_model: PathBuf,
    pub text_encoder: PathBuf,
    pub lora: Option<LoraSpec>,
    pub output: PathBuf,
    pub prompt: String,
    pub negative_prompt: String,
    pub images: Vec<ImageCondition>,
    pub height: u32,
    pub width: u32,
    pub num_frames: u32,
    pub seed: u64,
    pub frame_rate: f32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub fp8_transformer: bool,
}

/// Raw user input before the paths are checked.
#[derive(Debug, Clone)]
pub struct GenerationArgs {
    pub base_model: PathBuf,
    pub text_encoder: PathBuf,
    pub lora: Option<PathBuf>,
    pub output: PathBuf,
    pub prompt: String,
    pub negative_prompt: String,
    pub input_image: Option<PathBuf>,
    pub height: u32,
    pub width: u32,
    pub num_frames: u32,
    pub seed: u64,
}

impl GenerationRequest {
    /// Model and encoder must exist. A missing LoRA falls back to the base
    /// model; a named but missing input image is an error.
    pub fn build(args: GenerationArgs) -> Result<Self> {
        if !args.base_model.exists() {
            bail!("base model not found: {}", args.base_model.display());
        }
        if !args.text_encoder.exists() {
            bail!("text encoder not found: {}", args.text_encoder.display());
        }

        let lora = match args.lora {
            Some(path) if path.exists() => {
                info!(lora = %path.display(), "loading LoRA");
                Some(LoraSpec {
                    path,
                    strength: 1.0,
                })
            }
            other => {
                warn!(
                    lora = ?other.as_deref().map(Path::display),
                    "LoRA missing; generating with the base model only"
                );
                None
            }
        };

        let images = match args.input_image {
            Some(path) if !path.exists() => {
                bail!("input image not found: {}", path.display())
            }
            Some(path) => vec![ImageCondition {
                path,
                frame_index: 0,
                strength: 1.0,
            }],
            None => Vec::new(),
        };

        Ok(Self {
            base_model: args.base_model,
            text_encoder: args.text_encoder,
            lora,
            output: args.output,
            prompt: args.prompt,
            negative_prompt: args.negative_prompt,
            images,
            height: args.height,
            width: args.width,
            num_frames: args.num_frames,
            seed: args.seed,
            frame_rate: 25.0,
            num_inference_steps: 40,
            guidance_scale: 3.0,
            fp8_transformer: true,
        })
    }
}

pub trait VideoPipeline {
    /// Returns the path of the written video.
    fn generate(&self, request: &GenerationRequest) -> Result<PathBuf>;
}

/// Runs an inference program that reads one JSON request on stdin.
pub struct ExternalPipeline {
    command: Vec<String>,
}

impl ExternalPipeline {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl VideoPipeline for ExternalPipeline {
    fn generate(&self, request: &GenerationRequest) -> Result<PathBuf> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("no pipeline command configured; set pipeline.command in clipscribe.yaml or CLIPSCRIBE_PIPELINE");
        };
        let program = which::which(program)
            .with_context(|| format!("pipeline program '{program}' not found on PATH"))?;
        let payload = serde_json::to_vec(request)?;

        info!(
            program = %program.display(),
            output = %request.output.display(),
            size = %format!("{}x{}", request.width, request.height),
            frames = request.num_frames,
            "starting video generation"
        );
        let mut child = Command::new(&program)
            .args(args)
            .arg(&request.output)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {}", program.display()))?;
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&payload),
            None => Ok(()),
        };
        let status = child.wait()?;
        if !status.success() {
            bail!("pipeline exited with {status}");
        }
        written.context("writing request to pipeline stdin")?;
        if !request.output.exists() {
            bail!(
                "pipeline finished but {} was not written",
                request.output.display()
            );
        }
        info!(output = %request.output.display(), "video written");
        Ok(request.output.clone())
    }
}
