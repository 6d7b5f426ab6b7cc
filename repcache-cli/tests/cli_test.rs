#![allow(deprecated)] // Command::cargo_bin: the macro alternative requires same-package binary

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

// ---------------------------------------------------------------------------
// Helper: build a Command with ambient REPCACHE_* vars removed so tests are
// hermetic regardless of the runner's environment.
// ---------------------------------------------------------------------------
fn repcache_cmd(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("repcache").unwrap();
    cmd.env_remove("REPCACHE_SERVERS")
        .env_remove("REPCACHE_CONTINUE_ON_ITEM_ERROR")
        .env_remove("REPCACHE_CONNECT_TIMEOUT_MS")
        .env_remove("REPCACHE_IO_TIMEOUT_MS")
        .env_remove("REPCACHE_EXPIRE_SECS")
        .env_remove("REPCACHE_MAX_VALUE_BYTES")
        .env("REPCACHE_CONFIG_DIR", config_dir);
    cmd
}

fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Helper: in-test memcached speaking set/get/quit. Every connection shares one
// store, so a `save` run and a later `load` run see the same data.
// ---------------------------------------------------------------------------
type Store = Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>;

fn serve_connection(stream: TcpStream, store: Store) {
    let mut reader = BufReader::new(stream);
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let parts: Vec<&str> = line.trim_end().split(' ').collect();
        let reply = match parts.as_slice() {
            ["set", key, _flags, _exp, len] => {
                let len: usize = len.parse().unwrap();
                let mut value = vec![0u8; len + 2];
                if reader.read_exact(&mut value).is_err() {
                    return;
                }
                value.truncate(len);
                store
                    .lock()
                    .unwrap()
                    .insert(key.as_bytes().to_vec(), value);
                b"STORED\r\n".to_vec()
            }
            ["get", key] => {
                let mut reply = Vec::new();
                if let Some(value) = store.lock().unwrap().get(key.as_bytes()) {
                    reply.extend_from_slice(format!("VALUE {} 0 {}\r\n", key, value.len()).as_bytes());
                    reply.extend_from_slice(value);
                    reply.extend_from_slice(b"\r\n");
                }
                reply.extend_from_slice(b"END\r\n");
                reply
            }
            ["quit"] => return,
            _ => b"ERROR\r\n".to_vec(),
        };
        if reader.get_mut().write_all(&reply).is_err() {
            return;
        }
    }
}

fn spawn_memcached() -> (String, Store) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let store: Store = Arc::new(Mutex::new(HashMap::new()));
    let shared = Arc::clone(&store);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let store = Arc::clone(&shared);
            thread::spawn(move || serve_connection(stream, store));
        }
    });
    (addr, store)
}

// ===== Configuration guards =================================================

#[test]
fn missing_server_list_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    repcache_cmd(dir.path())
        .arg("probe")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("at least one repcache server is required"));
}

#[test]
fn blank_server_list_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    repcache_cmd(dir.path())
        .args(["--servers", " , ", "probe"])
        .assert()
        .failure()
        .stderr(contains("at least one repcache server is required"));
}

// ===== Server selection ======================================================

#[test]
fn probe_reports_pool_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let servers = format!("{},{}", dead_address(), dead_address());
    repcache_cmd(dir.path())
        .args(["--servers", &servers, "probe"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("No repcache server available"));
}

#[test]
fn probe_prints_first_listening_server() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let live = listener.local_addr().unwrap().to_string();
    let servers = format!("{}, {}", dead_address(), live);

    repcache_cmd(dir.path())
        .args(["probe", "--servers", &servers])
        .assert()
        .success()
        .stdout(contains(live.as_str()));
}

#[test]
fn servers_can_come_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let live = listener.local_addr().unwrap().to_string();
    std::fs::write(
        dir.path().join("repcache.json"),
        format!(r#"{{"servers": ["{}"]}}"#, live),
    )
    .unwrap();

    repcache_cmd(dir.path())
        .arg("probe")
        .assert()
        .success()
        .stdout(contains(live.as_str()));
}

// ===== Input handling =========================================================

#[test]
fn save_rejects_malformed_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("retention.json");
    std::fs::write(&input, "not json").unwrap();

    repcache_cmd(dir.path())
        .args(["--servers", &dead_address(), "save", "--input"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("ERROR"));
}

#[test]
fn load_fails_when_pool_is_down() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("ids.json");
    std::fs::write(
        &input,
        r#"{"hosts": ["web1"], "services": [{"host_name": "web1", "service_description": "HTTP"}]}"#,
    )
    .unwrap();

    repcache_cmd(dir.path())
        .args(["--servers", &dead_address(), "load", "--input"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("No repcache server available"));
}

// ===== Save / load passes ======================================================

#[test]
fn save_then_load_round_trips_through_memcached() {
    let dir = tempfile::tempdir().unwrap();
    let (live, store) = spawn_memcached();
    let servers = format!("{}, {}", dead_address(), live);

    let retention = dir.path().join("retention.json");
    std::fs::write(
        &retention,
        json!({
            "hosts": {"web1": {"state_id": 0, "last_chk": 1700000000}},
            "services": [{
                "host_name": "web1",
                "service_description": "HTTP",
                "data": {"state_id": 2, "problem_has_been_acknowledged": true}
            }]
        })
        .to_string(),
    )
    .unwrap();

    let output = repcache_cmd(dir.path())
        .args(["--servers", &servers, "save", "--input"])
        .arg(&retention)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["stored"], 2);
    assert_eq!(report["pass"]["server"], live.as_str());
    assert!(report["pass"]["failures"].as_array().unwrap().is_empty());
    assert!(store.lock().unwrap().contains_key(b"SERVICE-web1,HTTP".as_slice()));

    let ids = dir.path().join("ids.json");
    std::fs::write(
        &ids,
        r#"{"hosts": ["web1", "never-saved"], "services": [{"host_name": "web1", "service_description": "HTTP"}]}"#,
    )
    .unwrap();

    let output = repcache_cmd(dir.path())
        .args(["--servers", &servers, "load", "--input"])
        .arg(&ids)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let loaded: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(
        loaded["hosts"],
        json!({"web1": {"state_id": 0, "last_chk": 1700000000}})
    );
    assert_eq!(
        loaded["services"],
        json!([{
            "host_name": "web1",
            "service_description": "HTTP",
            "data": {"state_id": 2, "problem_has_been_acknowledged": true}
        }])
    );
}

#[test]
fn strict_load_fails_on_corrupt_entry() {
    let dir = tempfile::tempdir().unwrap();
    let (live, store) = spawn_memcached();
    store
        .lock()
        .unwrap()
        .insert(b"HOST-web1".to_vec(), b"{truncated".to_vec());

    let ids = dir.path().join("ids.json");
    std::fs::write(&ids, r#"{"hosts": ["web1"], "services": []}"#).unwrap();

    repcache_cmd(dir.path())
        .args(["--servers", &live, "--strict", "load", "--input"])
        .arg(&ids)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("Pass aborted on decode failure for key HOST-web1"));

    // Without --strict the corrupt entry is skipped.
    let output = repcache_cmd(dir.path())
        .args(["--servers", &live, "load", "--input"])
        .arg(&ids)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let loaded: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(loaded["hosts"], json!({}));
}
