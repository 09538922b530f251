use anyhow::{bail, Context, Result};
use clap::Parser;
use redub::cli::{Cli, Commands};
use redub::config::Config;
use redub::engines::remote::{
    RemoteDiarizer, RemoteSpeechToText, RemoteTextToSpeech, RemoteTranslator,
};
use redub::engines::EngineRegistry;
use redub::job::{EngineSelection, JobSpec, JobStatus};
use redub::media::FfmpegVideoProcessor;
use redub::scheduler::{QueueService, SchedulerConfig};
use redub::store::MemoryJobStore;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redub=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Check) => check_dependencies().await,
        None => run_dub(cli).await,
    }
}

/// Verify that the external tools the pipeline shells out to are present.
async fn check_dependencies() -> Result<()> {
    if FfmpegVideoProcessor::is_installed().await {
        println!("ffmpeg/ffprobe: ok");
        Ok(())
    } else {
        eprintln!("ffmpeg/ffprobe: not found in PATH");
        std::process::exit(1);
    }
}

/// Submit one job to a local scheduler and stream its progress.
async fn run_dub(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(directory) = cli.output_directory {
        config.output.directory = directory;
    }
    if cli.clean_intermediate_files {
        config.output.clean_intermediate_files = true;
    }

    let input = cli.input.context("input file is required")?;
    let target_language = cli.target_language.context("target language is required")?;
    let input_file_size = std::fs::metadata(&input)
        .with_context(|| format!("cannot read input file {}", input.display()))?
        .len();

    let engines = EngineSelection {
        stt: cli.stt.unwrap_or(config.engines.stt),
        translation: cli.translation.unwrap_or(config.engines.translation),
        tts: cli.tts.unwrap_or(config.engines.tts),
    };

    let registry = Arc::new(build_registry(&config, engines)?);
    let service = QueueService::start(
        Arc::new(MemoryJobStore::new()),
        registry,
        Arc::new(FfmpegVideoProcessor::new()),
        SchedulerConfig {
            max_concurrent_jobs: config.queue.max_concurrent_jobs,
            output_directory: config.output.directory.clone(),
            clean_intermediate_files: config.output.clean_intermediate_files,
        },
    );

    let original_filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let job_id = service
        .submit(JobSpec {
            original_filename,
            input_file_path: input,
            input_file_size,
            source_language: cli.source_language,
            target_language,
            engines,
        })
        .await?;
    let (_handle, mut events) = service.subscribe(&job_id).await;

    while let Some(event) = events.recv().await {
        println!("[{:>3}%] {} - {}", event.percentage, event.stage, event.message);
        if event.status.is_terminal() {
            break;
        }
    }

    let job = service
        .job(&job_id)
        .await?
        .context("job record disappeared")?;
    match job.status {
        JobStatus::Completed => {
            if let Some(output) = &job.output_file_path {
                println!("output: {}", output.display());
            }
            Ok(())
        }
        JobStatus::Cancelled => bail!("job was cancelled"),
        _ => bail!(
            "dubbing failed: {}",
            job.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

/// Build the engine registry from configured endpoint URLs. Every job runs
/// all four capabilities, so all four endpoints must be configured.
fn build_registry(config: &Config, selection: EngineSelection) -> Result<EngineRegistry> {
    let Some(diarization_url) = &config.engines.diarization_url else {
        bail!("engines.diarization_url is not configured");
    };
    let Some(stt_url) = &config.engines.stt_url else {
        bail!("engines.stt_url is not configured");
    };
    let Some(translation_url) = &config.engines.translation_url else {
        bail!("engines.translation_url is not configured");
    };
    let Some(tts_url) = &config.engines.tts_url else {
        bail!("engines.tts_url is not configured");
    };

    Ok(
        EngineRegistry::new(Arc::new(RemoteDiarizer::new(diarization_url)))
            .register_stt(selection.stt, Arc::new(RemoteSpeechToText::new(stt_url)))
            .register_translator(
                selection.translation,
                Arc::new(RemoteTranslator::new(translation_url)),
            )
            .register_tts(selection.tts, Arc::new(RemoteTextToSpeech::new(tts_url))),
    )
}
