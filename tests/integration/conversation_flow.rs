//! End-to-end conversation scenarios through the async controller runner.

use crate::helpers::{ScriptedBackend, fast_config, spawn_controller};
use interlocutor::llm::backend::GenerationBackend;
use interlocutor::llm::error::BackendError;
use interlocutor::runtime::{BargeInTrigger, ErrorKind};
use interlocutor::{InteractionState, LeafEvent, RuntimeEvent, Role, TranscriptDelta};
use std::sync::Arc;
use std::time::Duration;

fn say(text: &str) -> LeafEvent {
    LeafEvent::TranscriptDelta(TranscriptDelta::partial(text))
}

fn say_final(text: &str) -> LeafEvent {
    LeafEvent::TranscriptDelta(TranscriptDelta::final_text(text))
}

fn backends(list: &[&Arc<ScriptedBackend>]) -> Vec<Arc<dyn GenerationBackend>> {
    list.iter()
        .map(|b| -> Arc<dyn GenerationBackend> { (*b).clone() })
        .collect()
}

// ── happy path ─────────────────────────────────────────────────────

#[tokio::test]
async fn wake_listen_think_respond_and_record_both_turns() {
    let primary = ScriptedBackend::new("primary", vec![Ok("Try tomatoes.")]);
    let mut run = spawn_controller(fast_config(), backends(&[&primary]));

    run.handle
        .start_session(Some("hi-IN".into()), None)
        .unwrap();
    let standby = run.wait_for_state(InteractionState::Standby).await;
    assert_eq!(standby.language.as_deref(), Some("hi-IN"));

    run.sink.post(LeafEvent::WakeDetected);
    run.wait_for_state(InteractionState::Listening).await;
    run.sink.post(say("what should"));
    run.sink.post(say_final("what should I plant"));

    let responding = run.wait_for_state(InteractionState::Responding).await;
    assert_eq!(primary.prompts(), vec!["what should I plant"]);
    assert_eq!(run.spoken(), vec!["Try tomatoes."]);

    let handle = responding.playback_handle.expect("live playback handle");
    run.sink.post(LeafEvent::PlaybackFinished {
        handle,
        completed_normally: true,
    });
    let done = run
        .wait_until(|s| s.state == Some(InteractionState::Standby) && s.history.len() == 2)
        .await;
    assert_eq!(done.history[0].role(), Role::User);
    assert_eq!(done.history[0].text(), "what should I plant");
    assert_eq!(done.history[1].role(), Role::Agent);
    assert_eq!(done.history[1].text(), "Try tomatoes.");
    assert!(done.last_error.is_none());

    let states: Vec<_> = run
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            RuntimeEvent::StateChanged { to, .. } => to,
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            InteractionState::Standby,
            InteractionState::Listening,
            InteractionState::Thinking,
            InteractionState::Responding,
            InteractionState::Standby,
        ]
    );

    run.stop().await;
}

#[tokio::test]
async fn greeting_is_spoken_and_recorded() {
    let run = spawn_controller(fast_config(), Vec::new());
    run.handle
        .start_session(None, Some("Hello there.".into()))
        .unwrap();

    let responding = run.wait_for_state(InteractionState::Responding).await;
    assert_eq!(run.spoken(), vec!["Hello there."]);
    assert_eq!(responding.language.as_deref(), Some("en-US"));

    run.sink.post(LeafEvent::PlaybackFinished {
        handle: responding.playback_handle.unwrap(),
        completed_normally: true,
    });
    let done = run
        .wait_until(|s| s.state == Some(InteractionState::Standby) && s.history.len() == 1)
        .await;
    assert_eq!(done.history[0].role(), Role::Agent);
    run.stop().await;
}

// ── fallback ───────────────────────────────────────────────────────

#[tokio::test]
async fn failing_primary_falls_back_to_secondary() {
    let primary = ScriptedBackend::new(
        "primary",
        vec![Err(BackendError::Provider("HTTP 503".into()))],
    );
    let secondary = ScriptedBackend::new("secondary", vec![Ok("Plant basil.")]);
    let run = spawn_controller(fast_config(), backends(&[&primary, &secondary]));

    run.handle.start_session(None, None).unwrap();
    run.wait_for_state(InteractionState::Standby).await;
    run.handle.activate().unwrap();
    run.wait_for_state(InteractionState::Listening).await;
    run.sink.post(say_final("what grows in shade"));

    run.wait_for_state(InteractionState::Responding).await;
    assert_eq!(run.spoken(), vec!["Plant basil."]);
    assert_eq!(primary.prompts().len(), 1);
    assert_eq!(secondary.prompts().len(), 1);
    run.stop().await;
}

#[tokio::test]
async fn exhausted_backends_surface_apology_and_keep_user_turn() {
    let primary = ScriptedBackend::new("primary", vec![Err(BackendError::Auth("bad key".into()))]);
    let secondary = ScriptedBackend::new(
        "secondary",
        vec![Err(BackendError::RateLimited("slow down".into()))],
    );
    let config = fast_config();
    let apology = config.session.apology_text.clone();
    let run = spawn_controller(config, backends(&[&primary, &secondary]));

    run.handle.start_session(None, None).unwrap();
    run.wait_for_state(InteractionState::Standby).await;
    run.handle.activate().unwrap();
    run.wait_for_state(InteractionState::Listening).await;
    run.sink.post(say_final("tell me a joke"));

    let failed = run
        .wait_until(|s| s.state == Some(InteractionState::Standby) && s.last_error.is_some())
        .await;
    let error = failed.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::GenerationExhausted);
    assert_eq!(error.message, apology);
    assert!(error.recoverable);
    assert!(run.spoken().is_empty());
    assert_eq!(failed.history.len(), 1);
    assert_eq!(failed.history[0].role(), Role::User);
    run.stop().await;
}

#[tokio::test]
async fn slow_generation_times_out_as_exhaustion() {
    let slow = ScriptedBackend::with_delay(
        "slow",
        vec![Ok("too late")],
        Duration::from_millis(800),
    );
    let mut config = fast_config();
    config.generation.timeout_ms = 100;
    let run = spawn_controller(config, backends(&[&slow]));

    run.handle.start_session(None, None).unwrap();
    run.wait_for_state(InteractionState::Standby).await;
    run.handle.activate().unwrap();
    run.wait_for_state(InteractionState::Listening).await;
    run.sink.post(say_final("are you there"));

    let failed = run
        .wait_until(|s| s.state == Some(InteractionState::Standby) && s.last_error.is_some())
        .await;
    assert_eq!(
        failed.last_error.unwrap().kind,
        ErrorKind::GenerationExhausted
    );
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(run.spoken().is_empty(), "late result must never be spoken");
    run.stop().await;
}

// ── barge-in ───────────────────────────────────────────────────────

#[tokio::test]
async fn speech_during_response_cancels_playback_and_listens() {
    let primary = ScriptedBackend::new("primary", vec![Ok("A long answer"), Ok("Short answer")]);
    let mut run = spawn_controller(fast_config(), backends(&[&primary]));

    run.handle.start_session(None, None).unwrap();
    run.wait_for_state(InteractionState::Standby).await;
    run.handle.activate().unwrap();
    run.wait_for_state(InteractionState::Listening).await;
    run.sink.post(say_final("explain compost"));
    let responding = run.wait_for_state(InteractionState::Responding).await;
    let first_handle = responding.playback_handle.unwrap();

    run.sink.post(say("no wait, shorter"));
    let listening = run.wait_for_state(InteractionState::Listening).await;
    assert_eq!(listening.partial_transcript, "no wait, shorter");
    assert!(run.log().contains(&format!("cancel {}", first_handle.raw())));

    // The player's report for the cut-off playback arrives late.
    run.sink.post(LeafEvent::PlaybackFinished {
        handle: first_handle,
        completed_normally: false,
    });

    run.wait_until(|s| {
        s.state == Some(InteractionState::Responding) && s.playback_handle != Some(first_handle)
    })
    .await;
    assert_eq!(run.spoken(), vec!["A long answer", "Short answer"]);
    assert_eq!(primary.prompts(), vec!["explain compost", "no wait, shorter"]);

    let snapshot = run.handle.snapshot();
    assert!(
        snapshot.history.iter().all(|t| t.role() == Role::User),
        "interrupted response must not be recorded"
    );

    let events = run.drain_events();
    assert!(events.contains(&RuntimeEvent::BargeIn {
        trigger: BargeInTrigger::Speech
    }));
    assert!(events.contains(&RuntimeEvent::StaleResultDropped { what: "playback" }));
    run.stop().await;
}

#[tokio::test]
async fn speech_while_thinking_discards_the_pending_response() {
    let primary = ScriptedBackend::with_delay(
        "primary",
        vec![Ok("stale answer"), Ok("fresh answer")],
        Duration::from_millis(300),
    );
    let run = spawn_controller(fast_config(), backends(&[&primary]));

    run.handle.start_session(None, None).unwrap();
    run.wait_for_state(InteractionState::Standby).await;
    run.handle.activate().unwrap();
    run.wait_for_state(InteractionState::Listening).await;
    run.sink.post(say_final("what time is it"));
    run.wait_for_state(InteractionState::Thinking).await;

    run.sink.post(say_final("actually, what day is it"));
    run.wait_for_state(InteractionState::Listening).await;

    run.wait_for_state(InteractionState::Responding).await;
    assert_eq!(run.spoken(), vec!["fresh answer"]);
    assert_eq!(
        primary.prompts(),
        vec!["what time is it", "actually, what day is it"]
    );
    run.stop().await;
}

#[tokio::test]
async fn trivial_speech_during_response_is_held_for_the_next_turn() {
    let primary = ScriptedBackend::new("primary", vec![Ok("Sure."), Ok("Done.")]);
    let run = spawn_controller(fast_config(), backends(&[&primary]));

    run.handle.start_session(None, None).unwrap();
    run.wait_for_state(InteractionState::Standby).await;
    run.handle.activate().unwrap();
    run.wait_for_state(InteractionState::Listening).await;
    run.sink.post(say_final("set a timer"));
    let responding = run.wait_for_state(InteractionState::Responding).await;

    run.sink.post(say("ok"));
    let held = run
        .wait_until(|s| s.partial_transcript == "ok")
        .await;
    assert_eq!(held.state, Some(InteractionState::Responding));

    run.sink.post(LeafEvent::PlaybackFinished {
        handle: responding.playback_handle.unwrap(),
        completed_normally: true,
    });
    run.wait_until(|s| s.state == Some(InteractionState::Responding) && s.history.len() == 3)
        .await;
    assert_eq!(primary.prompts(), vec!["set a timer", "ok"]);
    run.stop().await;
}

#[tokio::test]
async fn manual_interrupt_reopens_listening() {
    let primary = ScriptedBackend::new("primary", vec![Ok("Here is a story.")]);
    let mut run = spawn_controller(fast_config(), backends(&[&primary]));

    run.handle.start_session(None, None).unwrap();
    run.wait_for_state(InteractionState::Standby).await;
    run.handle.activate().unwrap();
    run.wait_for_state(InteractionState::Listening).await;
    run.sink.post(say_final("tell me a story"));
    run.wait_for_state(InteractionState::Responding).await;

    run.handle.interrupt().unwrap();
    let listening = run.wait_for_state(InteractionState::Listening).await;
    assert!(listening.playback_handle.is_none());
    assert!(run.drain_events().contains(&RuntimeEvent::BargeIn {
        trigger: BargeInTrigger::Manual
    }));
    run.stop().await;
}

// ── session lifecycle ──────────────────────────────────────────────

#[tokio::test]
async fn ending_the_session_releases_everything() {
    let run = spawn_controller(fast_config(), Vec::new());
    run.handle.start_session(None, None).unwrap();
    run.wait_for_state(InteractionState::Standby).await;
    run.handle.activate().unwrap();
    run.wait_for_state(InteractionState::Listening).await;

    run.handle.end_session().unwrap();
    let ended = run.wait_until(|s| s.state.is_none()).await;
    assert!(ended.history.is_empty());
    assert!(ended.language.is_none());

    let log = run.log();
    assert_eq!(log.first().map(String::as_str), Some("stt.start en-US"));
    assert!(log.contains(&"stt.stop".to_owned()));
    assert!(run.handle.is_running());
    run.stop().await;
}

#[tokio::test]
async fn shutdown_stops_the_runner() {
    let run = spawn_controller(fast_config(), Vec::new());
    run.handle.start_session(None, None).unwrap();
    run.wait_for_state(InteractionState::Standby).await;

    let handle = run.handle.clone();
    let log = Arc::clone(&run.log);
    run.stop().await;

    assert!(!handle.is_running());
    assert!(handle.activate().is_err());
    assert!(log.lock().unwrap().contains(&"stt.stop".to_owned()));
}
