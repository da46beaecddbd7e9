use crate::model::{now_timestamp, AssessmentTool, Student, TeacherInfo};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const PAYLOAD_ENTRY: &str = "data/backup.json";
pub const BUNDLE_FORMAT: &str = "classroom-backup-v1";
pub const DOCUMENT_VERSION: &str = "3.0";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Io(#[from] anyhow::Error),
    #[error("backup is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("backup has no students array")]
    MissingStudents,
    #[error("backup records are malformed: {0}")]
    Malformed(serde_json::Error),
    #[error("unsupported bundle format: {0}")]
    UnsupportedFormat(String),
    #[error("bundle payload checksum mismatch")]
    ChecksumMismatch,
}

impl BackupError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_failed",
            Self::InvalidJson(_) | Self::Malformed(_) => "bad_backup",
            Self::MissingStudents => "missing_students",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::ChecksumMismatch => "checksum_mismatch",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub students: Vec<Student>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_info: Option<TeacherInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment_tools: Option<Vec<AssessmentTool>>,
    #[serde(default, alias = "v")]
    pub version: Option<String>,
    #[serde(default, alias = "exportTime")]
    pub exported_at: Option<String>,
}

impl BackupDocument {
    pub fn new(
        students: Vec<Student>,
        classes: Vec<String>,
        teacher_info: TeacherInfo,
        tools: Vec<AssessmentTool>,
    ) -> Self {
        Self {
            students,
            classes,
            teacher_info: Some(teacher_info),
            assessment_tools: Some(tools),
            version: Some(DOCUMENT_VERSION.to_string()),
            exported_at: Some(now_timestamp()),
        }
    }

    /// Parses a document; a missing or non-array `students` is rejected
    /// before any record is decoded.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, BackupError> {
        let text = String::from_utf8_lossy(bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(BackupError::InvalidJson)?;
        if !value.get("students").map(|s| s.is_array()).unwrap_or(false) {
            return Err(BackupError::MissingStudents);
        }
        serde_json::from_value(value).map_err(BackupError::Malformed)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub format: String,
    pub bytes: usize,
    pub sha256: String,
    pub student_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPreview {
    pub format: String,
    pub version: Option<String>,
    pub exported_at: Option<String>,
    pub student_count: usize,
    pub class_count: usize,
    pub grade_count: usize,
    pub has_tools: bool,
    pub has_teacher_info: bool,
}

fn is_zip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Writes `doc` as pretty JSON, or as a zip bundle when `out_path` ends in
/// `.zip`.
pub fn write_backup(doc: &BackupDocument, out_path: &Path) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let payload = serde_json::to_vec_pretty(doc).context("failed to serialize backup")?;
    let sha256 = sha256_hex(&payload);

    let format = if is_zip_path(out_path) {
        write_bundle(&payload, &sha256, doc, out_path)?;
        BUNDLE_FORMAT.to_string()
    } else {
        std::fs::write(out_path, &payload)
            .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;
        "json".to_string()
    };

    Ok(ExportSummary {
        format,
        bytes: payload.len(),
        sha256,
        student_count: doc.students.len(),
    })
}

fn write_bundle(
    payload: &[u8],
    sha256: &str,
    doc: &BackupDocument,
    out_path: &Path,
) -> anyhow::Result<()> {
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "documentVersion": doc.version,
        "exportedAt": doc.exported_at,
        "payload": PAYLOAD_ENTRY,
        "sha256": sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(PAYLOAD_ENTRY, opts)
        .context("failed to start payload entry")?;
    zip.write_all(payload)
        .context("failed to write payload entry")?;

    zip.finish().context("failed to finalize zip bundle")?;
    Ok(())
}

fn has_zip_signature(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    Ok(read == 4 && sig == [0x50, 0x4B, 0x03, 0x04])
}

fn read_bundle_payload(path: &Path) -> Result<Vec<u8>, BackupError> {
    let in_file = File::open(path)
        .with_context(|| format!("failed to open bundle {}", path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).map_err(BackupError::InvalidJson)?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(BackupError::UnsupportedFormat(format.to_string()));
    }

    let mut payload = Vec::new();
    archive
        .by_name(PAYLOAD_ENTRY)
        .context("bundle missing data/backup.json")?
        .read_to_end(&mut payload)
        .context("failed to read backup payload")?;

    if let Some(expected) = manifest.get("sha256").and_then(|v| v.as_str()) {
        if !expected.eq_ignore_ascii_case(&sha256_hex(&payload)) {
            return Err(BackupError::ChecksumMismatch);
        }
    }
    Ok(payload)
}

/// Reads a plain JSON document or a zip bundle, detected by file signature.
pub fn read_backup(path: &Path) -> Result<(BackupDocument, String), BackupError> {
    if has_zip_signature(path)? {
        let payload = read_bundle_payload(path)?;
        return Ok((BackupDocument::from_json_bytes(&payload)?, BUNDLE_FORMAT.to_string()));
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    Ok((BackupDocument::from_json_bytes(&bytes)?, "json".to_string()))
}

pub fn preview_backup(path: &Path) -> Result<BackupPreview, BackupError> {
    let (doc, format) = read_backup(path)?;
    Ok(BackupPreview {
        format,
        version: doc.version.clone(),
        exported_at: doc.exported_at.clone(),
        student_count: doc.students.len(),
        class_count: doc.classes.len(),
        grade_count: doc.students.iter().map(|s| s.grades.len()).sum(),
        has_tools: doc.assessment_tools.is_some(),
        has_teacher_info: doc.teacher_info.is_some(),
    })
}
