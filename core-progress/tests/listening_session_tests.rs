//! End-to-end listening sessions: a real playback engine over the fake
//! native backend, with the tracker attached to the shared event bus.

use bridge_desktop::InMemorySettingsStore;
use bridge_traits::FixedClock;
use chrono::{TimeZone, Utc};
use core_playback::testing::{FakeBackend, FakeHandleOptions};
use core_playback::{EngineConfig, PlaybackEngine, Topic};
use core_progress::{ProgressConfig, ProgressStore, ProgressTracker, ResumePolicy};
use core_runtime::events::{CoreEvent, EventBus, PlaybackState, ProgressEvent, Receiver};
use std::sync::Arc;
use std::time::Duration;

struct Session {
    backend: Arc<FakeBackend>,
    engine: PlaybackEngine,
    store: Arc<ProgressStore>,
    tracker: ProgressTracker,
    events: Receiver<CoreEvent>,
}

fn session(options: FakeHandleOptions) -> Session {
    let backend = Arc::new(FakeBackend::with_options(options));
    let bus = EventBus::default();
    let events = bus.subscribe();
    let engine = PlaybackEngine::new(backend.clone(), bus.clone(), EngineConfig::default());

    let settings = Arc::new(InMemorySettingsStore::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
    ));
    let store = Arc::new(ProgressStore::new(settings, clock));
    let tracker = ProgressTracker::new(
        store.clone(),
        Arc::new(engine.clone()),
        bus,
        ProgressConfig::default(),
    );
    tracker.attach();

    Session {
        backend,
        engine,
        store,
        tracker,
        events,
    }
}

fn body_scan() -> Topic {
    Topic::new(
        "body-scan",
        "Body Scan",
        "https://cdn.test/body-scan.mp3",
        300.0,
    )
}

/// Let the listener task catch up.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn progress_events(rx: &mut Receiver<CoreEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::Progress(event) = event {
            events.push(event);
        }
    }
    events
}

fn count_saves(events: &[ProgressEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, ProgressEvent::Saved { .. }))
        .count()
}

fn count_completions(events: &[ProgressEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, ProgressEvent::TopicCompleted { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_listening_session_end_to_end() {
    let mut s = session(FakeHandleOptions {
        fail_release: true,
        ..Default::default()
    });

    s.engine.play(&body_scan()).await.unwrap();
    settle().await;
    assert_eq!(s.engine.state(), PlaybackState::Playing);
    assert_eq!(
        s.tracker.tracked_topic_id().await.as_deref(),
        Some("body-scan")
    );

    let handle = s.backend.last_handle().unwrap();

    // Polled at 5s and 10s: two writes.
    handle.set_position(15.0);
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.set_position(40.0);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let events = progress_events(&mut s.events);
    assert_eq!(count_saves(&events), 2);
    assert_eq!(s.store.get_progress("body-scan").await.unwrap(), 40.0);

    // Crossing 95% completes exactly once.
    handle.set_position(290.0);
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.set_position(295.0);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let events = progress_events(&mut s.events);
    assert_eq!(count_saves(&events), 1);
    assert_eq!(count_completions(&events), 1);
    assert!(s.store.is_completed("body-scan").await.unwrap());

    let record = s.store.get_record("body-scan").await.unwrap().unwrap();
    assert_eq!(record.play_count, 1);
    assert_eq!(record.position_seconds, 290.0);

    // Release fails natively but the engine still winds down.
    s.engine.cleanup().await;
    settle().await;
    assert_eq!(s.engine.state(), PlaybackState::Idle);
    assert_eq!(handle.release_count(), 1);
    assert!(!s.tracker.is_tracking().await);
}

#[tokio::test(start_paused = true)]
async fn test_pause_flushes_and_resume_keeps_session() {
    let mut s = session(FakeHandleOptions::default());

    s.engine.play(&body_scan()).await.unwrap();
    settle().await;
    let handle = s.backend.last_handle().unwrap();

    handle.set_position(4.0);
    s.engine.pause().await;
    settle().await;

    let events = progress_events(&mut s.events);
    assert_eq!(count_saves(&events), 1);
    assert_eq!(s.store.get_progress("body-scan").await.unwrap(), 4.0);

    s.engine.play(&body_scan()).await.unwrap();
    settle().await;
    assert_eq!(s.backend.load_count(), 1);
    assert!(s.tracker.is_tracking().await);

    handle.set_position(60.0);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let record = s.store.get_record("body-scan").await.unwrap().unwrap();
    assert_eq!(record.position_seconds, 60.0);
    assert_eq!(record.play_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_natural_end_marks_completed() {
    let mut s = session(FakeHandleOptions::default());

    s.engine.play(&body_scan()).await.unwrap();
    settle().await;
    let handle = s.backend.last_handle().unwrap();

    handle.set_position(120.0);
    handle.finish();
    settle().await;

    assert_eq!(s.engine.state(), PlaybackState::Stopped);
    assert!(!s.tracker.is_tracking().await);

    let events = progress_events(&mut s.events);
    assert_eq!(count_completions(&events), 1);

    let record = s.store.get_record("body-scan").await.unwrap().unwrap();
    assert!(record.completed);
    assert_eq!(record.position_seconds, 300.0);

    let resume = ResumePolicy::new(s.store.clone(), s.tracker.config());
    assert!(!resume.should_show_resume_dialog("body-scan").await);
}

#[tokio::test(start_paused = true)]
async fn test_replaying_counts_another_session() {
    let s = session(FakeHandleOptions::default());

    s.engine.play(&body_scan()).await.unwrap();
    settle().await;
    s.backend.last_handle().unwrap().set_position(45.0);
    s.engine.pause().await;
    settle().await;
    s.engine.stop().await;
    settle().await;

    s.engine.play(&body_scan()).await.unwrap();
    settle().await;
    s.backend.last_handle().unwrap().set_position(50.0);
    s.engine.pause().await;
    settle().await;

    let record = s.store.get_record("body-scan").await.unwrap().unwrap();
    assert_eq!(record.play_count, 2);
    assert_eq!(record.position_seconds, 50.0);

    let resume = ResumePolicy::new(s.store.clone(), s.tracker.config());
    assert!(resume.should_show_resume_dialog("body-scan").await);
    assert_eq!(resume.get_resume_position("body-scan").await, 50.0);
}

#[tokio::test(start_paused = true)]
async fn test_native_duration_drives_completion_and_clamp() {
    let mut s = session(FakeHandleOptions {
        duration: Some(200.0),
        ..Default::default()
    });
    let untimed = Topic::new(
        "breathing",
        "Breathing",
        "https://cdn.test/breathing.mp3",
        0.0,
    );

    s.engine.play(&untimed).await.unwrap();
    settle().await;
    let handle = s.backend.last_handle().unwrap();

    handle.set_position(195.0);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let events = progress_events(&mut s.events);
    assert_eq!(count_completions(&events), 1);
    let record = s.store.get_record("breathing").await.unwrap().unwrap();
    assert!(record.completed);
    assert_eq!(record.position_seconds, 195.0);

    // Saved positions never exceed what the player reports as the length.
    handle.set_position(230.0);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let record = s.store.get_record("breathing").await.unwrap().unwrap();
    assert_eq!(record.position_seconds, 200.0);
    assert_eq!(count_completions(&progress_events(&mut s.events)), 0);
}
