//! Per-task artifact persistence.
//!
//! Generated files land under `{base_path}/{task_id}/`, one directory per
//! task, so concurrent tasks never contend on a path. Writes are best-effort
//! with per-file isolation: one bad filename or full disk loses that file
//! only, and the verbatim model response is always attempted separately as
//! [`RAW_RESPONSE_FILENAME`] so a failed extraction still leaves something to
//! debug from. When extraction produced nothing at all, a minimal runnable
//! skeleton is synthesized in its place.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::StorageError;

/// Fixed filename for the verbatim last model response.
pub const RAW_RESPONSE_FILENAME: &str = "raw_response.txt";

/// Filenames used by the synthesized fallback skeleton.
const FALLBACK_ENTRY: &str = "main.py";
const FALLBACK_MANIFEST: &str = "requirements.txt";
const FALLBACK_ENV: &str = ".env.example";
const FALLBACK_README: &str = "README.md";

/// Result of persisting one task's artifacts.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    /// Relative filenames written successfully.
    pub written: Vec<String>,
    /// Filenames that could not be written, with the reason.
    pub failed: Vec<(String, String)>,
    /// Whether the fallback skeleton was synthesized in place of extracted
    /// files.
    pub fallback_used: bool,
}

impl WriteReport {
    /// Number of files written.
    pub fn written_count(&self) -> usize {
        self.written.len()
    }

    /// Whether any file failed to write.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Filesystem writer for generated artifacts, partitioned by task id.
pub struct ArtifactWriter {
    base_path: PathBuf,
}

impl ArtifactWriter {
    /// Creates a writer rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the artifact root.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the directory for a task's artifacts.
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.base_path.join(task_id)
    }

    /// Creates the task's artifact directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DirectoryCreationFailed` when the directory
    /// cannot be created. Callers treat this as non-fatal: the per-file
    /// writes that follow will fail and be recorded individually.
    pub async fn ensure_directory(&self, task_id: &str) -> Result<PathBuf, StorageError> {
        let dir = self.task_dir(task_id);
        if !dir.exists() {
            fs::create_dir_all(&dir).await.map_err(|e| {
                StorageError::DirectoryCreationFailed {
                    path: dir.display().to_string(),
                    message: e.to_string(),
                }
            })?;
        }
        Ok(dir)
    }

    /// Writes each file in `files` independently.
    ///
    /// A failure writing one entry is logged and recorded in the report; the
    /// remaining entries are still written. Re-invoking for the same task id
    /// overwrites prior files.
    pub async fn write_files(
        &self,
        task_id: &str,
        files: &BTreeMap<String, String>,
    ) -> WriteReport {
        let dir = self.task_dir(task_id);
        let mut report = WriteReport::default();

        for (name, content) in files {
            let relative = match sanitize_filename(name) {
                Ok(relative) => relative,
                Err(err) => {
                    warn!(task_id = %task_id, name = %name, error = %err, "Skipping invalid artifact filename");
                    report.failed.push((name.clone(), err.to_string()));
                    continue;
                }
            };

            let path = dir.join(&relative);
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    if let Err(e) = fs::create_dir_all(parent).await {
                        warn!(task_id = %task_id, name = %name, error = %e, "Failed to create parent directory");
                        report.failed.push((name.clone(), e.to_string()));
                        continue;
                    }
                }
            }

            match fs::write(&path, content).await {
                Ok(()) => {
                    debug!(task_id = %task_id, name = %name, bytes = content.len(), "Wrote artifact");
                    report.written.push(relative.display().to_string());
                }
                Err(e) => {
                    warn!(task_id = %task_id, name = %name, error = %e, "Failed to write artifact");
                    report.failed.push((name.clone(), e.to_string()));
                }
            }
        }

        report
    }

    /// Persists the verbatim model response to [`RAW_RESPONSE_FILENAME`].
    pub async fn write_raw_response(&self, task_id: &str, text: &str) -> Result<(), StorageError> {
        let path = self.task_dir(task_id).join(RAW_RESPONSE_FILENAME);
        fs::write(&path, text)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Persists a task's complete artifact set.
    ///
    /// Writes the extracted files (or, when the mapping is empty, a
    /// synthesized fallback skeleton), then always attempts the raw model
    /// response. Nothing here is fatal; every failure is captured in the
    /// returned report.
    #[instrument(skip(self, files, raw_response))]
    pub async fn persist(
        &self,
        task_id: &str,
        files: &BTreeMap<String, String>,
        raw_response: Option<&str>,
    ) -> WriteReport {
        if let Err(err) = self.ensure_directory(task_id).await {
            warn!(task_id = %task_id, error = %err, "Failed to create artifact directory");
        }

        let mut report = if files.is_empty() {
            info!(task_id = %task_id, "No extracted files; synthesizing fallback skeleton");
            let fallback = synthesize_fallback(task_id, raw_response);
            let mut report = self.write_files(task_id, &fallback).await;
            report.fallback_used = true;
            report
        } else {
            self.write_files(task_id, files).await
        };

        if let Some(raw) = raw_response {
            match self.write_raw_response(task_id, raw).await {
                Ok(()) => report.written.push(RAW_RESPONSE_FILENAME.to_string()),
                Err(err) => {
                    warn!(task_id = %task_id, error = %err, "Failed to persist raw model response");
                    report
                        .failed
                        .push((RAW_RESPONSE_FILENAME.to_string(), err.to_string()));
                }
            }
        }

        info!(
            task_id = %task_id,
            written = report.written.len(),
            failed = report.failed.len(),
            fallback = report.fallback_used,
            "Persisted artifacts"
        );

        report
    }

    /// Lists a task's artifact files as sorted relative paths.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TaskNotFound` when the task has no artifact
    /// directory.
    pub async fn list_files(&self, task_id: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.task_dir(task_id);
        if !dir.is_dir() {
            return Err(StorageError::TaskNotFound(task_id.to_string()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&dir)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            files.push(relative);
        }
        files.sort();
        Ok(files)
    }

    /// Reads one artifact file's content.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TaskNotFound` for an unknown task,
    /// `StorageError::InvalidFilename` for an escaping name, or an IO error
    /// if the file cannot be read.
    pub async fn read_file(&self, task_id: &str, name: &str) -> Result<String, StorageError> {
        let dir = self.task_dir(task_id);
        if !dir.is_dir() {
            return Err(StorageError::TaskNotFound(task_id.to_string()));
        }
        let relative = sanitize_filename(name)?;
        let content = fs::read_to_string(dir.join(relative)).await?;
        Ok(content)
    }

    /// Removes task directories whose last modification is older than
    /// `max_age`. Returns the number of directories removed.
    pub async fn clean_older_than(&self, max_age: Duration) -> Result<usize, StorageError> {
        if !self.base_path.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            let age = modified.elapsed().unwrap_or_default();
            if age > max_age {
                match fs::remove_dir_all(entry.path()).await {
                    Ok(()) => {
                        info!(path = %entry.path().display(), "Removed stale task directory");
                        removed += 1;
                    }
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "Failed to remove stale task directory");
                    }
                }
            }
        }
        Ok(removed)
    }
}

/// Validates an artifact filename, returning it as a safe relative path.
///
/// Rejects empty names, absolute paths, and any path that escapes the task
/// directory through parent components.
fn sanitize_filename(name: &str) -> Result<PathBuf, StorageError> {
    if name.trim().is_empty() {
        return Err(StorageError::InvalidFilename(name.to_string()));
    }

    let path = Path::new(name);
    if path.is_absolute() {
        return Err(StorageError::InvalidFilename(name.to_string()));
    }

    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(StorageError::InvalidFilename(name.to_string())),
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(StorageError::InvalidFilename(name.to_string()));
    }

    Ok(clean)
}

/// Builds the fallback file set used when extraction found nothing.
///
/// With a raw response available, the entry file embeds it as commented
/// text above a runnable placeholder; without one, the skeleton is fully
/// generic. Either way the set includes a dependency manifest, an
/// environment example, and a readme referencing the task id.
fn synthesize_fallback(task_id: &str, raw_response: Option<&str>) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();

    let entry = match raw_response {
        Some(raw) => {
            let commented: String = raw
                .lines()
                .map(|line| format!("# {}", line))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "\"\"\"Generated server skeleton.\n\n\
                 Structured extraction found no usable files in the model response.\n\
                 The raw response is preserved below for reference.\n\"\"\"\n\n\
                 # --- raw model response ---\n{}\n# --- end raw model response ---\n\n{}",
                commented, PLACEHOLDER_SERVER
            )
        }
        None => format!(
            "\"\"\"Generated server skeleton.\n\n\
             No model response was captured for this task.\n\"\"\"\n\n{}",
            PLACEHOLDER_SERVER
        ),
    };

    files.insert(FALLBACK_ENTRY.to_string(), entry);
    files.insert(
        FALLBACK_MANIFEST.to_string(),
        "mcp\nhttpx\npydantic\npython-dotenv\n".to_string(),
    );
    files.insert(
        FALLBACK_ENV.to_string(),
        "API_KEY=your_api_key_here\nBASE_URL=https://api.example.com\n".to_string(),
    );
    files.insert(
        FALLBACK_README.to_string(),
        format!(
            "# Generated MCP Server\n\n\
             Task: `{}`\n\n\
             This file set is a placeholder skeleton: the generation pipeline\n\
             could not extract concrete files from the model output. See\n\
             `{}` for the last model response, if one was captured.\n",
            task_id, RAW_RESPONSE_FILENAME
        ),
    );

    files
}

/// Runnable placeholder appended to the synthesized entry file.
const PLACEHOLDER_SERVER: &str = r#"from mcp.server.fastmcp import FastMCP

mcp = FastMCP("generated-service")


@mcp.tool()
async def placeholder() -> str:
    """Replace with the tools described in the implementation plan."""
    return "not implemented"


if __name__ == "__main__":
    mcp.run(transport="stdio")
"#;
