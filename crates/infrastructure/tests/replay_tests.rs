//! Recorded streams replayed through the request pipeline, with settings
//! read from disk.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use apixt_application::{
    CancellationReceiver, ChunkReader, RunRequest, RunRequestInput, StreamError, process_stream,
};
use apixt_domain::{Node, TreeBuilder, TreeState};
use apixt_infrastructure::{ReplayFetcher, ReplayReader, SettingsRepository, SystemClock};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

const RECORDING: &str = r#"[
  {"cmd": 1, "name": "Query"},
  {"cmd": 6, "name": "SQL", "content": "select 1", "mime": "text/x-sql"},
  {"cmd": 2},
  {"cmd": 0}
]"#;

#[tokio::test]
async fn test_replay_through_run_request() {
    let dir = tempdir().unwrap();
    let repository = SettingsRepository::at(dir.path().join("settings.json"));
    let mut settings = repository.load().await.unwrap();
    settings
        .api_envs
        .insert("replay".to_string(), json!({ "url": "http://replay.local/" }));
    settings.active_api_env = Some("replay".to_string());
    repository.save(&settings).await.unwrap();

    let recording = dir.path().join("recording.json");
    std::fs::write(&recording, RECORDING).unwrap();
    let fetcher = ReplayFetcher::new(ReplayReader::load(&recording).await.unwrap());
    let use_case = RunRequest::new(Arc::new(fetcher), Arc::new(SystemClock::new()));

    let processed = use_case
        .execute(
            repository.load().await.unwrap(),
            RunRequestInput::get("/query"),
            TreeBuilder::new(),
        )
        .await;

    assert!(processed.result.is_ok());
    let run = processed.context;
    assert_eq!(
        run.request.map(|request| request.url).as_deref(),
        Some("http://replay.local/query")
    );
    assert_eq!(run.builder.state(), TreeState::Finished);
    assert_eq!(run.summary.map(|summary| summary.lines), Some(4));
}

#[tokio::test]
async fn test_truncated_recording_keeps_streaming_state() {
    let reader = ReplayReader::parse("{\"cmd\":1,\"name\":\"A\"}\n{\"cmd\":6}\n");
    let mut builder = TreeBuilder::new();
    let mut cancel = CancellationReceiver::never();

    let fetch = async move { Ok::<_, StreamError>(Box::new(reader) as Box<dyn ChunkReader>) };
    let summary = process_stream(&mut builder, fetch, &mut cancel).await;

    assert_eq!(summary.state, TreeState::Streaming);
    assert_eq!(builder.open_containers(), 1);
    assert_eq!(builder.tree(), Some(Node::Root { nodes: vec![Node::Loading] }));
}
