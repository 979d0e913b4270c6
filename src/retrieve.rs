use std::io::{self, Seek};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::domain::{ArchivePayload, PathRegistry, PlanSet};
use crate::error::RetrieveError;
use crate::extract::{ExtractSummary, extract_archive};
use crate::fs_util::Filesystem;
use crate::platform::PlanExecutor;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveSummary {
    pub target: String,
    pub archives: usize,
    pub files_written: usize,
    pub files_merged: usize,
    pub retrieved_at: String,
}

/// Drives a full retrieve into one target directory.
pub struct Retriever<F: Filesystem> {
    target_root: Utf8PathBuf,
    metadata_dirs: Vec<String>,
    spool_dir: Option<Utf8PathBuf>,
    fs: F,
}

/// An archive payload copied to a temporary file, deleted on drop.
struct SpooledArchive {
    label: String,
    file: NamedTempFile,
}

impl<F: Filesystem> Retriever<F> {
    pub fn new(target_root: impl Into<Utf8PathBuf>, metadata_dirs: Vec<String>, fs: F) -> Self {
        Self {
            target_root: target_root.into(),
            metadata_dirs,
            spool_dir: None,
            fs,
        }
    }

    /// Spools downloaded archives under `dir` instead of the system temp dir.
    pub fn with_spool_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    pub fn target_root(&self) -> &Utf8Path {
        &self.target_root
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    /// Executes every plan in key order, spooling each response as soon as it
    /// arrives, then extracts all of them. Nothing under the target is touched
    /// until every plan has been downloaded.
    pub fn retrieve_all(
        &self,
        plans: &PlanSet,
        executor: &dyn PlanExecutor,
        sink: &dyn ProgressSink,
    ) -> Result<RetrieveSummary, RetrieveError> {
        let mut spools = Vec::with_capacity(plans.len());
        for (key, plan) in plans {
            sink.event(ProgressEvent {
                message: format!(
                    "Making retrieve request: URL: [{}] Type: [{}]",
                    plan.url, plan.kind
                ),
                elapsed: None,
            });
            let start = Instant::now();
            let payload = executor.execute(key, plan)?;
            spools.push(self.spool(payload)?);
            sink.event(ProgressEvent {
                message: format!("Success retrieving from source [{key}]"),
                elapsed: Some(start.elapsed()),
            });
        }
        self.extract_all(spools.into_iter().map(Ok), sink)
    }

    /// Clears the metadata directories and extracts each payload in turn,
    /// merging JSON files that more than one payload contributes.
    pub fn write_results<I>(
        &self,
        payloads: I,
        sink: &dyn ProgressSink,
    ) -> Result<RetrieveSummary, RetrieveError>
    where
        I: IntoIterator<Item = ArchivePayload>,
    {
        self.extract_all(
            payloads.into_iter().map(|payload| self.spool(payload)),
            sink,
        )
    }

    pub fn clear_metadata_dirs(&self, sink: &dyn ProgressSink) -> Result<(), RetrieveError> {
        for dir in &self.metadata_dirs {
            let path = self.target_root.join(dir);
            sink.event(ProgressEvent {
                message: format!("Deleting directory: {path}"),
                elapsed: None,
            });
            self.fs.remove_dir_all(&path)?;
        }
        Ok(())
    }

    fn extract_all<I>(&self, spools: I, sink: &dyn ProgressSink) -> Result<RetrieveSummary, RetrieveError>
    where
        I: IntoIterator<Item = Result<SpooledArchive, RetrieveError>>,
    {
        sink.event(ProgressEvent {
            message: format!("Writing results to {}", self.target_root),
            elapsed: None,
        });
        self.clear_metadata_dirs(sink)?;

        let mut registry = PathRegistry::new();
        let mut archives = 0usize;
        let mut totals = ExtractSummary::default();
        for spool in spools {
            let start = Instant::now();
            let SpooledArchive { label, mut file } = spool?;
            debug!(archive = %label, path = %file.path().display(), "extracting spooled archive");
            let summary =
                extract_archive(file.as_file_mut(), &self.target_root, &mut registry, &self.fs)?;
            archives += 1;
            totals.written += summary.written;
            totals.merged += summary.merged;
            info!(
                archive = %label,
                written = summary.written,
                merged = summary.merged,
                skipped = summary.skipped,
                "archive extracted"
            );
            sink.event(ProgressEvent {
                message: format!(
                    "Extracted [{label}]: {} written, {} merged",
                    summary.written, summary.merged
                ),
                elapsed: Some(start.elapsed()),
            });
        }

        Ok(RetrieveSummary {
            target: self.target_root.to_string(),
            archives,
            files_written: totals.written,
            files_merged: totals.merged,
            retrieved_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn spool(&self, mut payload: ArchivePayload) -> Result<SpooledArchive, RetrieveError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("meta-retrieve").suffix(".zip");
        let created = match &self.spool_dir {
            Some(dir) => builder.tempfile_in(dir.as_std_path()),
            None => builder.tempfile(),
        };
        let mut file = created.map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
        io::copy(&mut payload, file.as_file_mut()).map_err(|err| {
            RetrieveError::Transport(format!("read archive [{}]: {err}", payload.label()))
        })?;
        file.as_file_mut()
            .rewind()
            .map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
        Ok(SpooledArchive {
            label: payload.label().to_string(),
            file,
        })
    }
}
