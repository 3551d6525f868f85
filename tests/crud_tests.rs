//! End-to-end CRUD semantics through the engine dispatch surface.

use serde_json::{json, Value};
use syncpoint::config::Settings;
use syncpoint::Engine;
use syncpoint_watcher::compute_hash;
use tempfile::TempDir;

async fn engine_in(dir: &TempDir) -> Engine {
    let mut settings = Settings::default();
    settings.crud.base_directories = vec![dir.path().to_path_buf()];
    settings.watcher.enabled = false;
    Engine::start(settings).await.unwrap()
}

fn p(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

#[tokio::test]
async fn write_then_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let path = p(&dir, "notes.txt");

    let written = engine
        .invoke("write", json!({"path": path, "content": "hello\nworld\n"}), None)
        .await;
    assert_eq!(written["status"], "ok");
    assert_eq!(written["bytes_written"], 12);
    assert_eq!(written["hash"], compute_hash(b"hello\nworld\n"));

    let read = engine.invoke("read", json!({"path": path}), None).await;
    assert_eq!(read["status"], "ok");
    assert_eq!(read["content"], "hello\nworld\n");
    assert_eq!(read["hash"], written["hash"]);
    assert_eq!(read["total_lines"], 2);
    assert_eq!(read["lines_returned"], 2);
}

#[tokio::test]
async fn write_is_create_only() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let path = p(&dir, "once.txt");

    let first = engine
        .invoke("write", json!({"path": path, "content": "a"}), None)
        .await;
    assert_eq!(first["status"], "ok");

    let second = engine
        .invoke("write", json!({"path": path, "content": "b"}), None)
        .await;
    assert_eq!(second["status"], "error");
    assert_eq!(second["error_code"], "file-exists");
    // The original content is untouched.
    assert_eq!(std::fs::read(dir.path().join("once.txt")).unwrap(), b"a");
}

#[tokio::test]
async fn read_offset_and_limit_window() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let path = p(&dir, "lines.txt");

    engine
        .invoke("write", json!({"path": path, "content": "1\n2\n3\n4\n5\n"}), None)
        .await;

    let window = engine
        .invoke("read", json!({"path": path, "offset": 1, "limit": 2}), None)
        .await;
    assert_eq!(window["content"], "2\n3\n");
    assert_eq!(window["total_lines"], 5);
    assert_eq!(window["lines_returned"], 2);

    // Offset past the end returns zero lines, total_lines unchanged.
    let past = engine
        .invoke("read", json!({"path": path, "offset": 99}), None)
        .await;
    assert_eq!(past["status"], "ok");
    assert_eq!(past["content"], "");
    assert_eq!(past["lines_returned"], 0);
    assert_eq!(past["total_lines"], 5);
}

#[tokio::test]
async fn empty_file_reads_empty_with_empty_hash() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let path = p(&dir, "empty.txt");

    engine
        .invoke("write", json!({"path": path, "content": ""}), None)
        .await;
    let read = engine.invoke("read", json!({"path": path}), None).await;
    assert_eq!(read["status"], "ok");
    assert_eq!(read["content"], "");
    assert_eq!(read["total_lines"], 0);
    assert_eq!(read["hash"], compute_hash(b""));
}

#[tokio::test]
async fn read_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;

    let read = engine
        .invoke("read", json!({"path": p(&dir, "nope.txt")}), None)
        .await;
    assert_eq!(read["status"], "error");
    assert_eq!(read["error_code"], "file-not-found");
}

#[tokio::test]
async fn path_outside_base_is_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;

    let read = engine
        .invoke("read", json!({"path": "/etc/hostname"}), None)
        .await;
    assert_eq!(read["status"], "error");
    assert_eq!(read["error_code"], "path-outside-base");
}

#[tokio::test]
async fn file_size_limit_boundary() {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.crud.base_directories = vec![dir.path().to_path_buf()];
    settings.crud.max_file_size_bytes = 8;
    settings.watcher.enabled = false;
    let engine = Engine::start(settings).await.unwrap();

    // Exactly at the limit succeeds.
    let ok = engine
        .invoke("write", json!({"path": p(&dir, "fits.txt"), "content": "12345678"}), None)
        .await;
    assert_eq!(ok["status"], "ok");

    // One byte more fails before anything hits disk.
    let too_big = engine
        .invoke("write", json!({"path": p(&dir, "big.txt"), "content": "123456789"}), None)
        .await;
    assert_eq!(too_big["status"], "error");
    assert_eq!(too_big["error_code"], "file-too-large");
    assert!(!dir.path().join("big.txt").exists());
}

#[tokio::test]
async fn append_creates_and_separates() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let path = p(&dir, "log.txt");

    let missing = engine
        .invoke("append", json!({"path": path, "content": "x"}), None)
        .await;
    assert_eq!(missing["error_code"], "file-not-found");

    let first = engine
        .invoke(
            "append",
            json!({"path": path, "content": "one", "create_if_missing": true, "separator": "\n"}),
            None,
        )
        .await;
    // Separator is skipped on the empty file.
    assert_eq!(first["status"], "ok");
    assert_eq!(first["bytes_appended"], 3);

    let second = engine
        .invoke(
            "append",
            json!({"path": path, "content": "two", "separator": "\n"}),
            None,
        )
        .await;
    assert_eq!(second["status"], "ok");
    assert_eq!(second["total_size_bytes"], 7);
    assert_eq!(std::fs::read(dir.path().join("log.txt")).unwrap(), b"one\ntwo");
    assert_eq!(second["hash"], compute_hash(b"one\ntwo"));
}

#[tokio::test]
async fn append_is_associative() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let split = p(&dir, "split.txt");
    let whole = p(&dir, "whole.txt");

    for chunk in ["alpha", "beta"] {
        engine
            .invoke(
                "append",
                json!({"path": split, "content": chunk, "create_if_missing": true}),
                None,
            )
            .await;
    }
    engine
        .invoke(
            "append",
            json!({"path": whole, "content": "alphabeta", "create_if_missing": true}),
            None,
        )
        .await;

    assert_eq!(
        std::fs::read(dir.path().join("split.txt")).unwrap(),
        std::fs::read(dir.path().join("whole.txt")).unwrap()
    );
}

#[tokio::test]
async fn delete_returns_deleted_hash() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let path = p(&dir, "doomed.txt");

    engine
        .invoke("write", json!({"path": path, "content": "bye"}), None)
        .await;
    let deleted = engine.invoke("delete", json!({"path": path}), None).await;
    assert_eq!(deleted["status"], "ok");
    assert_eq!(deleted["deleted_hash"], compute_hash(b"bye"));
    assert!(!dir.path().join("doomed.txt").exists());

    let again = engine.invoke("delete", json!({"path": path}), None).await;
    assert_eq!(again["error_code"], "file-not-found");
}

#[tokio::test]
async fn rename_moves_content_and_registry_entry() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let old = p(&dir, "old.txt");
    let new = p(&dir, "sub/new.txt");

    engine
        .invoke("write", json!({"path": old, "content": "payload"}), None)
        .await;
    let renamed = engine
        .invoke("rename", json!({"old_path": old, "new_path": new}), None)
        .await;
    assert_eq!(renamed["status"], "ok");
    assert_eq!(renamed["hash"], compute_hash(b"payload"));
    assert_eq!(renamed["cross_filesystem"], false);
    assert!(!dir.path().join("old.txt").exists());
    assert_eq!(
        std::fs::read(dir.path().join("sub/new.txt")).unwrap(),
        b"payload"
    );

    // The registry entry moved with the file.
    let status = engine.invoke("status", json!({"path": new}), None).await;
    assert_eq!(status["hash"], compute_hash(b"payload"));
}

#[tokio::test]
async fn rename_to_same_path_is_invalid() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let path = p(&dir, "same.txt");
    engine
        .invoke("write", json!({"path": path, "content": "x"}), None)
        .await;

    let result = engine
        .invoke("rename", json!({"old_path": path, "new_path": path}), None)
        .await;
    assert_eq!(result["status"], "error");
    assert_eq!(result["error_code"], "invalid-path");
}

#[tokio::test]
async fn list_filters_and_attaches_hashes() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;

    engine
        .invoke("write", json!({"path": p(&dir, "a.txt"), "content": "a"}), None)
        .await;
    engine
        .invoke("write", json!({"path": p(&dir, "b.md"), "content": "b"}), None)
        .await;
    engine
        .invoke("write", json!({"path": p(&dir, "sub/c.txt"), "content": "c"}), None)
        .await;

    let flat = engine
        .invoke(
            "list",
            json!({"path": dir.path().to_string_lossy(), "pattern": "*.txt"}),
            None,
        )
        .await;
    assert_eq!(flat["status"], "ok");
    let names: Vec<&str> = flat["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a.txt"]);

    let recursive = engine
        .invoke(
            "list",
            json!({
                "path": dir.path().to_string_lossy(),
                "pattern": "*.txt",
                "recursive": true,
                "include_hashes": true
            }),
            None,
        )
        .await;
    let entries = recursive["entries"].as_array().unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["a.txt", "sub/c.txt"]);
    let a = entries.iter().find(|e| e["name"] == "a.txt").unwrap();
    assert_eq!(a["hash"], compute_hash(b"a"));
    assert_eq!(a["type"], "file");
}

#[tokio::test]
async fn list_of_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;

    let result = engine
        .invoke("list", json!({"path": p(&dir, "nowhere")}), None)
        .await;
    assert_eq!(result["error_code"], "dir-not-found");
}

#[tokio::test]
async fn global_status_reports_tracked_files() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;

    engine
        .invoke("write", json!({"path": p(&dir, "one.txt"), "content": "1"}), None)
        .await;
    engine
        .invoke("write", json!({"path": p(&dir, "two.txt"), "content": "2"}), None)
        .await;

    let status = engine.invoke("status", json!({}), None).await;
    assert_eq!(status["status"], "ok");
    assert_eq!(status["tracked_files"], 2);
    assert_eq!(status["queue_depth"], 0);
    assert_eq!(status["active_locks"]["read"], 0);
    assert_eq!(status["active_locks"]["write"], 0);
    assert!(status["server"]["uptime_seconds"].as_f64().unwrap() >= 0.0);
    assert_eq!(status["base_directories"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_tool_is_an_error_envelope() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;

    let result = engine.invoke("explode", Value::Null, None).await;
    assert_eq!(result["status"], "error");
    assert_eq!(result["error_code"], "server-error");
}

#[tokio::test]
async fn batch_read_reports_per_item_results() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    engine
        .invoke("write", json!({"path": p(&dir, "ok.txt"), "content": "fine"}), None)
        .await;

    let result = engine
        .invoke(
            "batch_read",
            json!({"files": [{"path": p(&dir, "ok.txt")}, {"path": p(&dir, "missing.txt")}]}),
            None,
        )
        .await;
    assert_eq!(result["summary"]["total"], 2);
    assert_eq!(result["summary"]["succeeded"], 1);
    assert_eq!(result["summary"]["failed"], 1);
    assert_eq!(result["results"][0]["status"], "ok");
    assert_eq!(result["results"][1]["status"], "error");
}
