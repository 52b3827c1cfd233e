//! On-disk archive layout and zip bundle creation.
//!
//! ```text
//! archives/
//!   attachments/{attachmentId}_{originalName}
//!   messages.json
//!   archive_{timestamp}.zip
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::attachments::AttachmentStore;
use crate::snapshot::MessageSnapshot;
use crate::{AppError, Result};

pub const MANIFEST_FILE: &str = "messages.json";
pub const ATTACHMENTS_DIR: &str = "attachments";

#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join(ATTACHMENTS_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn bundle_path(&self, stamp: &str) -> PathBuf {
        self.root.join(format!("archive_{}.zip", stamp))
    }

    pub fn attachment_store(&self) -> AttachmentStore {
        AttachmentStore::new(self.attachments_dir())
    }

    /// Destroy any previous archive directory and create a fresh, empty one.
    pub async fn reset(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.root).await? {
            tokio::fs::remove_dir_all(&self.root)
                .await
                .map_err(|e| AppError::WriteFile {
                    path: self.root.display().to_string(),
                    source: e,
                })?;
        }
        let attachments = self.attachments_dir();
        tokio::fs::create_dir_all(&attachments)
            .await
            .map_err(|e| AppError::WriteFile {
                path: attachments.display().to_string(),
                source: e,
            })?;
        Ok(())
    }
}

/// A packaged archive ready for delivery.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub path: PathBuf,
    pub manifest_path: PathBuf,
    pub stamp: String,
    pub message_count: usize,
}

/// ISO-8601 instant with `:` and `.` replaced by `-`, safe in file names.
pub fn bundle_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

/// Write the manifest and zip it together with the whole attachment store.
///
/// Both files are written on the blocking pool.
pub async fn package(layout: &ArchiveLayout, manifest: &[MessageSnapshot]) -> Result<Bundle> {
    let stamp = bundle_stamp(Utc::now());
    let manifest_path = layout.manifest_path();
    let bundle_path = layout.bundle_path(&stamp);
    let attachments_dir = layout.attachments_dir();
    let json = serde_json::to_vec_pretty(manifest)
        .map_err(|e| AppError::JsonSerialize(e.to_string()))?;
    {
        let manifest_path = manifest_path.clone();
        let bundle_path = bundle_path.clone();
        tokio::task::spawn_blocking(move || {
            write_manifest(&manifest_path, &json)?;
            write_zip(&bundle_path, &manifest_path, &attachments_dir)
        })
        .await
        .map_err(|e| AppError::Task(e.to_string()))??;
    }

    info!(bundle = %bundle_path.display(), messages = manifest.len(), "archive created");
    Ok(Bundle {
        path: bundle_path,
        manifest_path,
        stamp,
        message_count: manifest.len(),
    })
}

fn write_manifest(path: &Path, json: &[u8]) -> Result<()> {
    let file = File::create(path).map_err(|e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    writer.write_all(json).map_err(|e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    writer.flush().map_err(|e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

fn write_zip(bundle_path: &Path, manifest_path: &Path, attachments_dir: &Path) -> Result<()> {
    let file = File::create(bundle_path).map_err(|e| AppError::WriteFile {
        path: bundle_path.display().to_string(),
        source: e,
    })?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(9));

    zip.start_file(MANIFEST_FILE, options)?;
    let mut manifest = File::open(manifest_path).map_err(|e| AppError::ReadFile {
        path: manifest_path.display().to_string(),
        source: e,
    })?;
    std::io::copy(&mut manifest, &mut zip)?;

    zip.add_directory(format!("{}/", ATTACHMENTS_DIR), options)?;
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(attachments_dir).min_depth(1) {
        let entry = entry.map_err(|e| AppError::Archive(e.to_string()))?;
        if entry.file_type().is_file() {
            entries.push(entry.into_path());
        }
    }
    entries.sort();

    for path in entries {
        let relative = path
            .strip_prefix(attachments_dir)
            .map_err(|e| AppError::Archive(e.to_string()))?;
        let name = format!(
            "{}/{}",
            ATTACHMENTS_DIR,
            relative.to_string_lossy().replace('\\', "/")
        );
        zip.start_file(name, options)?;
        let mut f = File::open(&path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        std::io::copy(&mut f, &mut zip)?;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(())
}
