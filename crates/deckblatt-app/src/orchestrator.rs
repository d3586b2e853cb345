// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local stand-in for a request orchestrator: reads files from disk, runs each
// through the pipeline concurrently, and writes what comes back.

use std::path::{Path, PathBuf};

use deckblatt_core::error::Result;
use deckblatt_core::types::{DocumentFormat, EmbedOutcome};
use deckblatt_pipeline::Pipeline;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// How one file ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Covered,
    Original,
    Rejected,
}

/// Per-status counts for a whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub covered: usize,
    pub original: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl Summary {
    fn record(&mut self, status: FileStatus) {
        match status {
            FileStatus::Covered => self.covered += 1,
            FileStatus::Original => self.original += 1,
            FileStatus::Rejected => self.rejected += 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Feed every file through `pipeline`, writing results into `out_dir`.
pub async fn run_files(
    pipeline: &Pipeline,
    files: &[PathBuf],
    out_dir: &Path,
    thumbnails: bool,
) -> Result<Summary> {
    tokio::fs::create_dir_all(out_dir).await?;

    let mut tasks = JoinSet::new();
    for path in files {
        let pipeline = pipeline.clone();
        let path = path.clone();
        let out_dir = out_dir.to_path_buf();
        tasks.spawn(async move {
            let result = process_file(&pipeline, &path, &out_dir, thumbnails).await;
            (path, result)
        });
    }

    let mut summary = Summary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(status))) => summary.record(status),
            Ok((path, Err(err))) => {
                error!(file = %path.display(), error = %err, "Document failed");
                summary.failed += 1;
            }
            Err(err) => {
                error!(error = %err, "Document task aborted");
                summary.failed += 1;
            }
        }
    }

    info!(
        covered = summary.covered,
        original = summary.original,
        rejected = summary.rejected,
        failed = summary.failed,
        "Run finished"
    );
    Ok(summary)
}

async fn process_file(
    pipeline: &Pipeline,
    path: &Path,
    out_dir: &Path,
    thumbnails: bool,
) -> Result<FileStatus> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Unsupported files never get read.
    let bytes = if DocumentFormat::from_filename(&filename).is_supported() {
        tokio::fs::read(path).await?
    } else {
        Vec::new()
    };

    match pipeline.process(&filename, bytes).await? {
        EmbedOutcome::Delivered {
            bytes,
            filename,
            thumbnail,
        } => {
            let target = out_dir.join(&filename);
            tokio::fs::write(&target, &bytes).await?;
            if let (true, Some(thumbnail)) = (thumbnails, thumbnail) {
                tokio::fs::write(thumbnail_path(out_dir, &filename), thumbnail).await?;
            }
            info!(output = %target.display(), "Wrote covered document");
            Ok(FileStatus::Covered)
        }
        EmbedOutcome::DeliveredOriginal {
            bytes,
            filename,
            reason,
        } => {
            let target = out_dir.join(&filename);
            tokio::fs::write(&target, &bytes).await?;
            warn!(output = %target.display(), %reason, "Wrote original document");
            Ok(FileStatus::Original)
        }
        EmbedOutcome::Rejected { reason } => {
            warn!(file = %path.display(), %reason, "Skipped");
            Ok(FileStatus::Rejected)
        }
    }
}

/// `<stem>.thumb.jpg` beside the covered document.
pub fn thumbnail_path(out_dir: &Path, filename: &str) -> PathBuf {
    let stem = Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    out_dir.join(format!("{stem}.thumb.jpg"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use deckblatt_document::fixtures;

    use super::*;

    fn pipeline(work_dir: &Path) -> Pipeline {
        let cover = fixtures::cover_image(40, 60);
        let thumbnail = cover.thumbnail(16, 85).unwrap();
        Pipeline::new(Arc::new(cover), Some(thumbnail), work_dir.to_path_buf(), 2)
    }

    #[test]
    fn thumbnail_sits_beside_document() {
        assert_eq!(
            thumbnail_path(Path::new("out"), "report.pdf"),
            PathBuf::from("out/report.thumb.jpg")
        );
    }

    #[tokio::test]
    async fn mixed_batch_is_sorted_into_outcomes() {
        let scratch = tempfile::tempdir().unwrap();
        let inputs = scratch.path().join("in");
        let out_dir = scratch.path().join("out");
        std::fs::create_dir_all(&inputs).unwrap();

        let pdf = inputs.join("report.pdf");
        let epub = inputs.join("novel.epub");
        let broken = inputs.join("broken.pdf");
        std::fs::write(&pdf, fixtures::sample_pdf(2)).unwrap();
        std::fs::write(&epub, fixtures::sample_epub(Some("Alpha"))).unwrap();
        std::fs::write(&broken, b"not a pdf").unwrap();
        // Never created: rejection must not read it.
        let docx = inputs.join("notes.docx");

        let summary = run_files(
            &pipeline(&scratch.path().join("work")),
            &[pdf, epub, broken, docx],
            &out_dir,
            true,
        )
        .await
        .unwrap();

        assert_eq!(
            summary,
            Summary {
                covered: 2,
                original: 1,
                rejected: 1,
                failed: 0,
            }
        );
        assert!(summary.is_success());
        assert!(out_dir.join("report.pdf").exists());
        assert!(out_dir.join("report.thumb.jpg").exists());
        assert!(out_dir.join("novel.epub").exists());
        assert!(!out_dir.join("novel.thumb.jpg").exists());
        assert_eq!(std::fs::read(out_dir.join("broken.pdf")).unwrap(), b"not a pdf");
    }

    #[tokio::test]
    async fn unreadable_input_counts_as_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let summary = run_files(
            &pipeline(&scratch.path().join("work")),
            &[scratch.path().join("missing.pdf")],
            &scratch.path().join("out"),
            false,
        )
        .await
        .unwrap();

        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
    }
}
