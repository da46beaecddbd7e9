#[path = "../src/backup.rs"]
mod backup;
#[path = "../src/model.rs"]
mod model;

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
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

fn sample_document() -> backup::BackupDocument {
    let mut s = model::Student::new("سارة", vec!["5/أ".to_string()]);
    s.grades.push(model::GradeRecord {
        id: model::new_id(),
        subject: "المادة".to_string(),
        category: "التقرير".to_string(),
        tool_id: None,
        score: 8.0,
        max_score: 10.0,
        date: "2024-10-05T08:00:00+00:00".to_string(),
        semester: Some(model::Semester::First),
    });
    backup::BackupDocument::new(
        vec![s],
        vec!["5/أ".to_string()],
        model::TeacherInfo {
            name: "أ. محمد".to_string(),
            school: "مدرسة النور".to_string(),
        },
        vec![model::AssessmentTool {
            id: model::new_id(),
            name: "التقرير".to_string(),
            max_score: 10.0,
        }],
    )
}

fn read_entry(path: &Path, name: &str) -> Vec<u8> {
    let f = File::open(path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut out = Vec::new();
    archive
        .by_name(name)
        .expect("bundle entry")
        .read_to_end(&mut out)
        .expect("read entry");
    out
}

fn write_bundle_raw(path: &Path, manifest: &str, payload: &[u8]) {
    let f = File::create(path).expect("create bundle");
    let mut zip = zip::ZipWriter::new(f);
    let opts = zip::write::FileOptions::default();
    zip.start_file("manifest.json", opts).expect("start manifest");
    zip.write_all(manifest.as_bytes()).expect("write manifest");
    zip.start_file("data/backup.json", opts).expect("start payload");
    zip.write_all(payload).expect("write payload");
    zip.finish().expect("finish zip");
}

#[test]
fn zip_bundle_carries_manifest_and_roundtrips() {
    let out_dir = temp_dir("classroom-backup-zip");
    let bundle_path = out_dir.join("nested").join("classroom.zip");
    let doc = sample_document();

    let summary = backup::write_backup(&doc, &bundle_path).expect("export bundle");
    assert_eq!(summary.format, backup::BUNDLE_FORMAT);
    assert_eq!(summary.student_count, 1);
    assert_eq!(summary.sha256.len(), 64);

    let manifest: serde_json::Value =
        serde_json::from_slice(&read_entry(&bundle_path, "manifest.json")).expect("manifest json");
    assert_eq!(manifest["format"], backup::BUNDLE_FORMAT);
    assert_eq!(manifest["payload"], "data/backup.json");
    assert_eq!(manifest["sha256"], summary.sha256.as_str());
    assert_eq!(manifest["documentVersion"], backup::DOCUMENT_VERSION);
    let payload = read_entry(&bundle_path, "data/backup.json");
    assert_eq!(payload.len(), summary.bytes);

    let (restored, format) = backup::read_backup(&bundle_path).expect("read bundle");
    assert_eq!(format, backup::BUNDLE_FORMAT);
    assert_eq!(restored, doc);

    // Detection is by signature, not extension.
    let renamed = out_dir.join("classroom.bak");
    std::fs::copy(&bundle_path, &renamed).expect("copy bundle");
    let (_, format) = backup::read_backup(&renamed).expect("read renamed bundle");
    assert_eq!(format, backup::BUNDLE_FORMAT);

    let preview = backup::preview_backup(&bundle_path).expect("preview");
    assert_eq!(preview.student_count, 1);
    assert_eq!(preview.grade_count, 1);
    assert!(preview.has_tools);
    assert!(preview.has_teacher_info);

    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn plain_json_backup_roundtrips() {
    let out_dir = temp_dir("classroom-backup-json");
    let path = out_dir.join("classroom.json");
    let doc = sample_document();

    let summary = backup::write_backup(&doc, &path).expect("export json");
    assert_eq!(summary.format, "json");
    let text = std::fs::read_to_string(&path).expect("read json");
    assert!(text.contains("\"assessmentTools\""));
    assert!(text.contains("\"teacherInfo\""));

    let (restored, format) = backup::read_backup(&path).expect("read json");
    assert_eq!(format, "json");
    assert_eq!(restored.students[0].grades[0].score, 8.0);

    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_or_foreign_bundles_are_rejected() {
    let out_dir = temp_dir("classroom-backup-bad");
    let good = out_dir.join("good.zip");
    backup::write_backup(&sample_document(), &good).expect("export bundle");
    let manifest = String::from_utf8(read_entry(&good, "manifest.json")).expect("utf8 manifest");
    let payload = read_entry(&good, "data/backup.json");

    let tampered = out_dir.join("tampered.zip");
    let mut edited = payload.clone();
    edited.extend_from_slice(b"\n");
    write_bundle_raw(&tampered, &manifest, &edited);
    let err = backup::read_backup(&tampered).expect_err("checksum must fail");
    assert_eq!(err.code(), "checksum_mismatch");

    let foreign = out_dir.join("foreign.zip");
    write_bundle_raw(&foreign, r#"{"format":"gradebook-archive-v9"}"#, &payload);
    let err = backup::read_backup(&foreign).expect_err("format must fail");
    assert_eq!(err.code(), "unsupported_format");

    let err = backup::read_backup(&out_dir.join("missing.zip")).expect_err("missing file");
    assert_eq!(err.code(), "io_failed");

    let no_students = out_dir.join("empty.json");
    std::fs::write(&no_students, r#"{"classes":["5/أ"]}"#).expect("write json");
    let err = backup::read_backup(&no_students).expect_err("students required");
    assert_eq!(err.code(), "missing_students");

    let _ = std::fs::remove_dir_all(out_dir);
}
