#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolcald");
    let mut child = Command::new(exe)
        .env_remove("SCHOOLCALD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolcald");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    serde_json::from_str(line.trim()).expect("parse response json")
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|v| v.get("code"))
        .and_then(|v| v.as_str())
}

/// Messages reported for one dotted field path of a `validation_failed` error.
pub fn field_messages(value: &serde_json::Value, path: &str) -> Vec<String> {
    value
        .get("error")
        .and_then(|v| v.get("details"))
        .and_then(|v| v.get("flat"))
        .and_then(|v| v.get(path))
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|m| m.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// A valid 2020 calendar: one holiday per semester, a VIII grade semester
/// end and a Corigente window after the second semester.
pub fn calendar_2020() -> serde_json::Value {
    json!({
        "academicYear": 2020,
        "firstSemester": {
            "startsAt": "2020-09-14",
            "endsAt": "2021-01-29",
            "events": [
                { "eventType": "holiday", "startsAt": "2020-10-26", "endsAt": "2020-11-01" },
                { "eventType": "holiday", "name": "Winter holiday", "startsAt": "2020-12-21", "endsAt": "2021-01-10" }
            ]
        },
        "secondSemester": {
            "startsAt": "2021-02-08",
            "endsAt": "2021-06-25",
            "events": [
                { "eventType": "holiday", "startsAt": "2021-04-02", "endsAt": "2021-04-11" },
                { "eventType": "second_semester_end_viii_grade", "startsAt": "2021-06-07", "endsAt": "2021-06-11" }
            ]
        },
        "events": [
            { "eventType": "corigente", "startsAt": "2021-07-05", "endsAt": "2021-07-09" }
        ]
    })
}

pub fn open_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    workspace
}
