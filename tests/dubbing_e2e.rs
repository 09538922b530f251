//! End-to-end scheduler tests with mock engines: admission, bounded
//! concurrency, cancellation, failure containment and progress delivery.

use redub::defaults::SAMPLE_RATE;
use redub::engines::{
    EngineRegistry, MockDiarizer, MockSpeechToText, MockTextToSpeech, MockTranslator, SttEngineId,
    TranslationEngineId, TtsEngineId,
};
use redub::media::{AudioTrack, MockVideoProcessor};
use redub::store::MemoryJobStore;
use redub::{
    EngineSelection, Job, JobSpec, JobStatus, QueueService, SchedulerConfig, UtteranceMetadata,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn write_input(dir: &Path) -> PathBuf {
    let path = dir.join("input.wav");
    AudioTrack::from_samples(vec![40; 10 * SAMPLE_RATE as usize], SAMPLE_RATE)
        .to_wav(&path)
        .expect("write input");
    path
}

fn default_registry() -> EngineRegistry {
    registry_with(
        MockSpeechToText::new(),
        MockTranslator::new(),
        MockTextToSpeech::new(),
    )
}

fn registry_with(
    stt: MockSpeechToText,
    translator: MockTranslator,
    tts: MockTextToSpeech,
) -> EngineRegistry {
    EngineRegistry::new(Arc::new(
        MockDiarizer::new()
            .with_segment(1.0, 3.0, "SPEAKER_00")
            .with_segment(5.0, 7.0, "SPEAKER_01"),
    ))
    .register_stt(SttEngineId::FasterWhisper, Arc::new(stt))
    .register_translator(TranslationEngineId::Nllb, Arc::new(translator))
    .register_tts(TtsEngineId::Mms, Arc::new(tts))
}

fn start_service(dir: &Path, registry: EngineRegistry, max: usize) -> Arc<QueueService> {
    QueueService::start(
        Arc::new(MemoryJobStore::new()),
        Arc::new(registry),
        Arc::new(MockVideoProcessor::new()),
        SchedulerConfig {
            max_concurrent_jobs: max,
            output_directory: dir.join("out"),
            clean_intermediate_files: false,
        },
    )
}

fn spec(input: &Path) -> JobSpec {
    JobSpec {
        original_filename: "input.wav".to_string(),
        input_file_path: input.to_path_buf(),
        input_file_size: 0,
        source_language: Some("en".to_string()),
        target_language: "ca".to_string(),
        engines: EngineSelection::default(),
    }
}

async fn wait_terminal(service: &QueueService, job_id: &str) -> Job {
    for _ in 0..500 {
        if let Ok(Some(job)) = service.job(job_id).await {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

#[tokio::test]
async fn test_every_job_reaches_exactly_one_terminal_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path());
    let service = start_service(dir.path(), default_registry(), 2);

    let mut receivers = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..4 {
        let id = service.submit(spec(&input)).await.expect("submit");
        let (_handle, rx) = service.subscribe(&id).await;
        receivers.push(rx);
        ids.push(id);
    }

    for id in &ids {
        let job = wait_terminal(&service, id).await;
        assert_eq!(job.status, JobStatus::Completed);
    }

    // Each observer sees exactly one terminal event, delivered last.
    for mut rx in receivers {
        let mut terminal = 0;
        while let Ok(event) = rx.try_recv() {
            if event.status.is_terminal() {
                terminal += 1;
            }
        }
        assert_eq!(terminal, 1);
    }
}

#[tokio::test]
async fn test_at_most_n_jobs_run_concurrently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path());
    let registry = registry_with(
        MockSpeechToText::new().with_delay(Duration::from_millis(50)),
        MockTranslator::new(),
        MockTextToSpeech::new(),
    );
    let service = start_service(dir.path(), registry, 2);

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(service.submit(spec(&input)).await.expect("submit"));
    }

    let mut peak_active = 0;
    loop {
        let status = service.queue_status();
        peak_active = peak_active.max(status.active_count);
        assert!(status.active_count <= 2, "active count exceeded the bound");

        let mut all_done = true;
        for id in &ids {
            let job = service.job(id).await.expect("get").expect("job");
            if !job.status.is_terminal() {
                all_done = false;
            }
        }
        if all_done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(peak_active >= 1);
    for id in &ids {
        assert_eq!(
            wait_terminal(&service, id).await.status,
            JobStatus::Completed
        );
    }
}

#[tokio::test]
async fn test_queued_cancel_never_observes_processing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path());
    let registry = registry_with(
        MockSpeechToText::new().with_delay(Duration::from_millis(100)),
        MockTranslator::new(),
        MockTextToSpeech::new(),
    );
    let service = start_service(dir.path(), registry, 1);

    let running = service.submit(spec(&input)).await.expect("submit");
    let queued = service.submit(spec(&input)).await.expect("submit");
    let (_handle, mut events) = service.subscribe(&queued).await;

    assert!(service.cancel(&queued).await);

    let job = wait_terminal(&service, &queued).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.completed_at.is_some());

    // The queued job never ran: the only event its observers see is the
    // terminal cancellation.
    let event = events.recv().await.expect("terminal event");
    assert_eq!(event.status, JobStatus::Cancelled);
    assert!(events.try_recv().is_err());

    // The running job is unaffected.
    assert_eq!(
        wait_terminal(&service, &running).await.status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_cancel_running_job_stops_at_stage_boundary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path());
    let registry = registry_with(
        MockSpeechToText::new().with_delay(Duration::from_millis(200)),
        MockTranslator::new(),
        MockTextToSpeech::new(),
    );
    let service = start_service(dir.path(), registry, 1);

    let job_id = service.submit(spec(&input)).await.expect("submit");

    // Wait until it actually holds the slot, then cancel.
    for _ in 0..200 {
        if service.queue_status().active_count == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(service.cancel(&job_id).await);

    let job = wait_terminal(&service, &job_id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.processing_time_seconds.is_some());
}

#[tokio::test]
async fn test_progress_is_non_decreasing_from_zero_to_hundred() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path());
    let service = start_service(dir.path(), default_registry(), 1);

    let job_id = service.submit(spec(&input)).await.expect("submit");
    let (_handle, mut events) = service.subscribe(&job_id).await;

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let terminal = event.status.is_terminal();
        seen.push(event);
        if terminal {
            break;
        }
    }

    assert_eq!(seen.first().expect("events").percentage, 0);
    assert_eq!(seen.last().expect("events").percentage, 100);
    for pair in seen.windows(2) {
        assert!(
            pair[0].percentage <= pair[1].percentage,
            "progress went backwards: {} -> {}",
            pair[0].percentage,
            pair[1].percentage
        );
    }
}

#[tokio::test]
async fn test_translator_misalignment_fails_job_but_not_scheduler() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path());
    let registry = registry_with(
        MockSpeechToText::new(),
        MockTranslator::new().with_script_response("<BREAK>mangled<BREAK>"),
        MockTextToSpeech::new(),
    );
    let service = start_service(dir.path(), registry, 1);

    let bad = service.submit(spec(&input)).await.expect("submit");
    let job = wait_terminal(&service, &bad).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(
        job.error_message
            .as_deref()
            .is_some_and(|m| m.contains("expected 2")),
        "error message was {:?}",
        job.error_message
    );

    // The dispatch loop survives: a later submission still reaches its own
    // terminal state.
    let next = service.submit(spec(&input)).await.expect("submit");
    let job = wait_terminal(&service, &next).await;
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_one_failed_synthesis_does_not_fail_the_job() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path());

    // Five utterances, one of which the TTS engine refuses to synthesize.
    let registry = EngineRegistry::new(Arc::new(
        MockDiarizer::new()
            .with_segment(0.5, 1.5, "SPEAKER_00")
            .with_segment(2.0, 3.0, "SPEAKER_00")
            .with_segment(3.5, 4.5, "SPEAKER_01")
            .with_segment(5.0, 6.0, "SPEAKER_00")
            .with_segment(7.0, 8.0, "SPEAKER_01"),
    ))
    .register_stt(
        SttEngineId::FasterWhisper,
        Arc::new(MockSpeechToText::new().with_responses(&[
            "one", "two", "bad three", "four", "five",
        ])),
    )
    .register_translator(TranslationEngineId::Nllb, Arc::new(MockTranslator::new()))
    .register_tts(
        TtsEngineId::Mms,
        Arc::new(MockTextToSpeech::new().with_failing_text("bad")),
    );
    let service = start_service(dir.path(), registry, 1);

    let job_id = service.submit(spec(&input)).await.expect("submit");
    let job = wait_terminal(&service, &job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.output_file_path.is_some());

    let metadata = UtteranceMetadata::load(
        &dir.path()
            .join("out")
            .join(&job_id)
            .join(UtteranceMetadata::file_name("ca")),
    )
    .expect("metadata");
    assert_eq!(metadata.utterances.len(), 5);
    let dubbed = metadata.utterances.iter().filter(|u| u.for_dubbing).count();
    assert_eq!(dubbed, 4);
}

#[tokio::test]
async fn test_invalid_media_fails_the_job() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path());
    let service = QueueService::start(
        Arc::new(MemoryJobStore::new()),
        Arc::new(default_registry()),
        Arc::new(MockVideoProcessor::new().with_split_failure()),
        SchedulerConfig {
            max_concurrent_jobs: 1,
            output_directory: dir.path().join("out"),
            clean_intermediate_files: false,
        },
    );

    let job_id = service.submit(spec(&input)).await.expect("submit");
    let job = wait_terminal(&service, &job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.is_some());
}

#[tokio::test]
async fn test_completed_job_snapshot_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path());
    let service = start_service(dir.path(), default_registry(), 1);

    let job_id = service.submit(spec(&input)).await.expect("submit");
    let job = wait_terminal(&service, &job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_stage.as_deref(), Some("done"));
    assert_eq!(job.progress_percentage, Some(100.0));
    assert!(job.output_file_size.is_some_and(|size| size > 0));
    assert_eq!(job.source_language.as_deref(), Some("en"));
}
