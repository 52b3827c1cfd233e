//! Local attachment store: one file per attachment, named `{id}_{name}`.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::model::Attachment;
use crate::session::ChatSession;
use crate::{AppError, Result};

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
}

impl AttachmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Fetch `attachment` into the store unless it is already there, and
    /// return the file name it lives under.
    ///
    /// A write error leaves whatever was written so far on disk; the next
    /// call for the same attachment will treat that file as present.
    pub async fn materialize(
        &self,
        session: &dyn ChatSession,
        attachment: &Attachment,
    ) -> Result<String> {
        let file_name = file_name(&attachment.id, &attachment.filename);
        let path = self.path_for(&file_name);

        if tokio::fs::try_exists(&path).await? {
            debug!(file = %file_name, "attachment already stored");
            return Ok(file_name);
        }

        let mut stream = session.download(&attachment.url).await?;
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| write_error(&path, e))?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| write_error(&path, e))?;
        }
        file.flush().await.map_err(|e| write_error(&path, e))?;

        debug!(file = %file_name, bytes = attachment.size, "attachment stored");
        Ok(file_name)
    }
}

fn write_error(path: &Path, source: std::io::Error) -> AppError {
    AppError::WriteFile {
        path: path.display().to_string(),
        source,
    }
}

/// Deterministic store name for an attachment. Path separators in the
/// platform-supplied name are replaced so the file stays inside the store.
pub fn file_name(id: &str, name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}_{}", id, name)
}
