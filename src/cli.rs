use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "clipscribe",
    version,
    about = "Caption video clips with Gemini and drive the video generation pipeline"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Caption every video in a directory, resuming from captions.json
    Caption {
        directory: PathBuf,
        /// Used only when GEMINI_API_KEY / GOOGLE_API_KEY are unset
        api_key: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate a video with the configured inference pipeline
    Generate {
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value = "models/ltx-2-19b-dev.safetensors")]
        base_model: PathBuf,
        #[arg(long, default_value = "models/gemma-text-encoder")]
        text_encoder: PathBuf,
        #[arg(long, default_value = "outputs/ltx2_av_lora/checkpoints/latest.safetensors")]
        lora: PathBuf,
        #[arg(short = 'o', long, default_value = "generated_video.mp4")]
        output: PathBuf,
        #[arg(long, default_value = "worst quality, blurry, jittery")]
        negative_prompt: String,
        /// First frame for image-to-video
        #[arg(long)]
        input_image: Option<PathBuf>,
        #[arg(long, default_value_t = 512)]
        height: u32,
        #[arg(long, default_value_t = 768)]
        width: u32,
        #[arg(long, default_value_t = 121)]
        num_frames: u32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
