//! Command-line interface for redub
//!
//! Provides argument parsing using clap derive macros.

use crate::engines::{SttEngineId, TranslationEngineId, TtsEngineId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Re-dub a video into another language
#[derive(Parser, Debug)]
#[command(name = "redub", version, about = "Re-dub a video into another language")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Input video file (required unless a subcommand is given; enforced
    /// at startup so subcommands stay flag-free)
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Target language code (e.g. ca, de, pt-BR)
    #[arg(long, short = 't', value_name = "LANG")]
    pub target_language: Option<String>,

    /// Source language code (default: auto-detect)
    #[arg(long, short = 's', value_name = "LANG")]
    pub source_language: Option<String>,

    /// Directory for output and intermediate files
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output_directory: Option<PathBuf>,

    /// Speech-to-text engine
    #[arg(long, value_enum, value_name = "ENGINE")]
    pub stt: Option<SttEngineId>,

    /// Translation engine
    #[arg(long, value_enum, value_name = "ENGINE")]
    pub translation: Option<TranslationEngineId>,

    /// Text-to-speech engine
    #[arg(long, value_enum, value_name = "ENGINE")]
    pub tts: Option<TtsEngineId>,

    /// Delete per-utterance chunk files after a successful run
    #[arg(long)]
    pub clean_intermediate_files: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check system dependencies (ffmpeg, ffprobe)
    Check,
}
