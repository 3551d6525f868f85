//! Snapshot persistence across engine restarts.

use serde_json::json;
use syncpoint::config::Settings;
use syncpoint::Engine;
use syncpoint_watcher::compute_hash;
use tempfile::TempDir;

fn settings_for(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.crud.base_directories = vec![dir.path().join("data")];
    settings.persistence.enabled = true;
    settings.persistence.state_file = Some(dir.path().join("state/state.json"));
    settings.persistence.write_debounce = 0.05;
    settings.watcher.enabled = false;
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    settings
}

#[tokio::test]
async fn fingerprints_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data/keep.txt").to_string_lossy().into_owned();

    let engine = Engine::start(settings_for(&dir)).await.unwrap();
    engine
        .invoke("write", json!({"path": path, "content": "persist me"}), None)
        .await;
    engine.shutdown().await;
    drop(engine);

    let engine = Engine::start(settings_for(&dir)).await.unwrap();
    let status = engine.invoke("status", json!({"path": path}), None).await;
    assert_eq!(status["exists"], true);
    assert_eq!(status["hash"], compute_hash(b"persist me"));

    let global = engine.invoke("status", json!({}), None).await;
    assert_eq!(global["tracked_files"], 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn restart_revalidates_against_disk() {
    let dir = TempDir::new().unwrap();
    let changed = dir
        .path()
        .join("data/changed.txt")
        .to_string_lossy()
        .into_owned();
    let removed = dir
        .path()
        .join("data/removed.txt")
        .to_string_lossy()
        .into_owned();

    let engine = Engine::start(settings_for(&dir)).await.unwrap();
    engine
        .invoke("write", json!({"path": changed, "content": "old"}), None)
        .await;
    engine
        .invoke("write", json!({"path": removed, "content": "soon gone"}), None)
        .await;
    engine.shutdown().await;
    drop(engine);

    // Mutate the world while the engine is down.
    std::fs::write(dir.path().join("data/changed.txt"), b"new").unwrap();
    std::fs::remove_file(dir.path().join("data/removed.txt")).unwrap();

    let engine = Engine::start(settings_for(&dir)).await.unwrap();

    // The surviving entry matches the bytes on disk.
    let status = engine.invoke("status", json!({"path": changed}), None).await;
    assert_eq!(status["hash"], compute_hash(b"new"));

    // The missing file is gone from the registry.
    let global = engine.invoke("status", json!({}), None).await;
    assert_eq!(global["tracked_files"], 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn persistence_disabled_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings_for(&dir);
    let path = dir.path().join("data/f.txt").to_string_lossy().into_owned();

    let engine = Engine::start(settings.clone()).await.unwrap();
    engine
        .invoke("write", json!({"path": path, "content": "x"}), None)
        .await;
    engine.shutdown().await;
    drop(engine);

    settings.persistence.enabled = false;
    let engine = Engine::start(settings).await.unwrap();
    let global = engine.invoke("status", json!({}), None).await;
    assert_eq!(global["tracked_files"], 0);
    engine.shutdown().await;
}
