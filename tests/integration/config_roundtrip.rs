//! Config persistence and validation through real TOML files.

use interlocutor::config::{BackendConfig, BackendKind, InteractionConfig, PlaybackCaptureMode};

#[test]
fn save_then_load_preserves_every_section() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("nested").join("config.toml");

    let mut config = InteractionConfig::default();
    config.listening.silence_threshold_ms = 900;
    config.transcription.playback_mode = PlaybackCaptureMode::HalfDuplex;
    config.barge_in.assistant_start_holdoff_ms = 250;
    config.session.default_language = "hi-IN".to_owned();
    config.generation.backends.push(BackendConfig {
        name: "local".to_owned(),
        api_url: "http://127.0.0.1:11434".to_owned(),
        model: "llama3".to_owned(),
        max_tokens: Some(200),
        ..BackendConfig::default()
    });
    config.save_to_file(&path).unwrap();

    let loaded = InteractionConfig::from_file(&path).unwrap();
    assert_eq!(loaded.listening.silence_threshold_ms, 900);
    assert_eq!(loaded.transcription.playback_mode, PlaybackCaptureMode::HalfDuplex);
    assert_eq!(loaded.barge_in.assistant_start_holdoff_ms, 250);
    assert_eq!(loaded.session.default_language, "hi-IN");
    assert_eq!(loaded.generation.backends.len(), 1);
    assert_eq!(loaded.generation.backends[0].model, "llama3");
    assert_eq!(loaded.generation.backends[0].max_tokens, Some(200));
}

#[test]
fn partial_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[listening]
silence_threshold_ms = 1500

[[generation.backends]]
name = "hosted"
kind = "openai"
api_url = "https://api.example.com/v1"
model = "small"
api_key_env = "EXAMPLE_API_KEY"
"#,
    )
    .unwrap();

    let loaded = InteractionConfig::from_file(&path).unwrap();
    let defaults = InteractionConfig::default();
    assert_eq!(loaded.listening.silence_threshold_ms, 1500);
    assert_eq!(
        loaded.listening.min_barge_in_chars,
        defaults.listening.min_barge_in_chars
    );
    assert_eq!(loaded.generation.timeout_ms, defaults.generation.timeout_ms);
    assert_eq!(loaded.generation.backends[0].kind, BackendKind::OpenaiCompat);
    assert_eq!(
        loaded.generation.backends[0].api_key_env.as_deref(),
        Some("EXAMPLE_API_KEY")
    );
}

#[test]
fn invalid_values_are_rejected_on_load() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[listening]\nsilence_threshold_ms = 0\n").unwrap();
    assert!(InteractionConfig::from_file(&path).is_err());

    std::fs::write(&path, "[barge_in]\nmin_rms = 1.5\n").unwrap();
    assert!(InteractionConfig::from_file(&path).is_err());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = InteractionConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, interlocutor::InteractionError::Io(_)));
}
