use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classroomd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classroomd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = send(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = send(stdin, reader, id, method, params);
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{} should fail", method);
    value["error"]["code"].as_str().unwrap_or("").to_string()
}

fn select(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &std::path::Path) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        "select",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    )
}

fn student_names(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Vec<String> {
    let listed = request_ok(stdin, reader, "names", "students.list", json!({}));
    listed["students"]
        .as_array()
        .expect("students")
        .iter()
        .filter_map(|s| s["name"].as_str().map(|n| n.to_string()))
        .collect()
}

#[test]
fn workspace_state_survives_restart_and_restores_from_bundle() {
    let workspace = temp_dir("classroomd-restore");
    let bundle = workspace.join("exports").join("classroom.zip");
    let plain = workspace.join("exports").join("classroom.json");

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let opened = select(&mut stdin, &mut reader, &workspace);
        assert_eq!(opened["students"], 0);
        assert_eq!(opened["tools"], 5);
        let created = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "students.create",
            json!({ "name": "سارة", "className": "5/أ" }),
        );
        let sara = created["student"]["id"].as_str().expect("id").to_string();
        request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "grades.upsert",
            json!({ "studentId": sara, "category": "واجب", "maxScore": 5, "score": 4 }),
        );
        request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "tools.create",
            json!({ "name": "واجب", "maxScore": 5 }),
        );
        request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "setup.update",
            json!({ "section": "teacher", "patch": { "name": "أ. محمد", "school": "مدرسة النور" } }),
        );
        let exported = request_ok(
            &mut stdin,
            &mut reader,
            "5",
            "backup.export",
            json!({ "outPath": bundle.to_string_lossy() }),
        );
        assert_eq!(exported["summary"]["format"], "classroom-backup-v1");
        assert_eq!(exported["summary"]["studentCount"], 1);
        let exported = request_ok(
            &mut stdin,
            &mut reader,
            "6",
            "backup.export",
            json!({ "outPath": plain.to_string_lossy() }),
        );
        assert_eq!(exported["summary"]["format"], "json");
        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = select(&mut stdin, &mut reader, &workspace);
    assert_eq!(opened["students"], 1);
    assert_eq!(opened["tools"], 6);
    let setup = request_ok(&mut stdin, &mut reader, "10", "setup.get", json!({}));
    assert_eq!(setup["teacher"]["name"], "أ. محمد");

    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.create",
        json!({ "name": "علي", "className": "5/أ" }),
    );
    assert_eq!(student_names(&mut stdin, &mut reader), vec!["سارة", "علي"]);

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "backup.preview",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(preview["studentCount"], 1);
    assert_eq!(preview["gradeCount"], 1);
    assert_eq!(preview["hasTools"], true);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "13",
        "backup.restore",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(code, "confirmation_required");
    assert_eq!(student_names(&mut stdin, &mut reader).len(), 2);

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "backup.restore",
        json!({ "inPath": bundle.to_string_lossy(), "confirm": true }),
    );
    assert_eq!(restored["format"], "classroom-backup-v1");
    assert_eq!(restored["students"], 1);
    assert_eq!(restored["toolsRestored"], true);
    assert_eq!(student_names(&mut stdin, &mut reader), vec!["سارة"]);

    let code = request_err(&mut stdin, &mut reader, "15", "data.wipe", json!({}));
    assert_eq!(code, "confirmation_required");
    request_ok(&mut stdin, &mut reader, "16", "data.wipe", json!({ "confirm": true }));
    assert!(student_names(&mut stdin, &mut reader).is_empty());
    let tools = request_ok(&mut stdin, &mut reader, "17", "tools.list", json!({}));
    assert_eq!(tools["tools"].as_array().map(|t| t.len()), Some(5));
    assert_eq!(tools["sumOfCaps"], 80.0);
    let classes = request_ok(&mut stdin, &mut reader, "18", "classes.list", json!({}));
    assert_eq!(classes["classes"].as_array().map(|c| c.len()), Some(0));

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "backup.restore",
        json!({ "inPath": plain.to_string_lossy(), "confirm": true }),
    );
    assert_eq!(restored["format"], "json");
    assert_eq!(student_names(&mut stdin, &mut reader), vec!["سارة"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn restore_rejects_bad_documents_without_touching_the_roster() {
    let workspace = temp_dir("classroomd-restore-bad");
    let no_students = workspace.join("no-students.json");
    std::fs::write(&no_students, r#"{"classes":["5/أ"],"v":"3.0"}"#).expect("write json");
    let garbage = workspace.join("garbage.json");
    std::fs::write(&garbage, "{ not json").expect("write garbage");
    let legacy = workspace.join("legacy.json");
    std::fs::write(
        &legacy,
        r#"{"students":[{"id":"s-1","name":"منى","grade":"السادس","classes":["6/ب"],
            "grades":[{"id":"g-1","category":"التقرير","score":7,"maxScore":10}]}],
            "classes":["6/ب"],"v":"2.0","exportTime":"2023-11-02T09:00:00Z"}"#,
    )
    .expect("write legacy");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, &workspace);
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "name": "سارة", "className": "5/أ" }),
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "backup.restore",
        json!({ "inPath": no_students.to_string_lossy(), "confirm": true }),
    );
    assert_eq!(code, "missing_students");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "backup.restore",
        json!({ "inPath": garbage.to_string_lossy(), "confirm": true }),
    );
    assert_eq!(code, "bad_backup");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "backup.preview",
        json!({ "inPath": workspace.join("nope.zip").to_string_lossy() }),
    );
    assert_eq!(code, "io_failed");
    assert_eq!(student_names(&mut stdin, &mut reader), vec!["سارة"]);

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.preview",
        json!({ "inPath": legacy.to_string_lossy() }),
    );
    assert_eq!(preview["version"], "2.0");
    assert_eq!(preview["exportedAt"], "2023-11-02T09:00:00Z");
    assert_eq!(preview["hasTools"], false);

    let tools_before = request_ok(&mut stdin, &mut reader, "6", "tools.list", json!({}));
    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "backup.restore",
        json!({ "inPath": legacy.to_string_lossy(), "confirm": true }),
    );
    assert_eq!(restored["toolsRestored"], false);
    let tools_after = request_ok(&mut stdin, &mut reader, "8", "tools.list", json!({}));
    assert_eq!(tools_before, tools_after);

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "grades.summary",
        json!({ "studentId": "s-1" }),
    );
    // Untagged grades count toward the first semester.
    assert_eq!(summary["final"]["semester1"]["percentage"], 70);
    assert_eq!(summary["final"]["percentage"], 70);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
