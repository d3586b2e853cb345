// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The pipeline exposed to request orchestrators.
//
// classify -> (reject | acquire artifacts -> embed -> read output -> release)
//
// Format errors degrade to handing back the original bytes. Everything else
// (storage trouble, worker faults) fails the request after cleanup.

use std::path::PathBuf;
use std::sync::Arc;

use deckblatt_core::AppConfig;
use deckblatt_core::error::{DeckblattError, Result};
use deckblatt_core::human_errors::humanize_error;
use deckblatt_core::types::{DocumentFormat, EmbedOutcome, SubmittedDocument};
use deckblatt_document::{CoverEmbedder, CoverImage, embedder_for};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::artifacts::ArtifactScope;
use crate::pool::WorkerPool;

/// Shared, cheaply cloneable request processor.
#[derive(Debug, Clone)]
pub struct Pipeline {
    cover: Arc<CoverImage>,
    thumbnail: Option<Arc<[u8]>>,
    work_dir: PathBuf,
    pool: WorkerPool,
}

impl Pipeline {
    /// Build the process-wide pipeline from configuration.
    ///
    /// Loads and normalizes the cover once; a missing or undecodable cover
    /// is an `ImageLoad` error and the caller must not serve requests.
    #[instrument(skip_all, fields(cover = %config.cover_image_path.display()))]
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let cover = CoverImage::shared(&config.cover_image_path, config.jpeg_quality)?;
        let thumbnail = cover.thumbnail(config.thumbnail_max_side, config.jpeg_quality)?;
        std::fs::create_dir_all(&config.work_dir)?;

        info!(
            width = cover.width(),
            height = cover.height(),
            thumbnail_bytes = thumbnail.len(),
            work_dir = %config.work_dir.display(),
            workers = config.worker_pool_size,
            "Pipeline ready"
        );
        Ok(Self::new(
            cover,
            Some(thumbnail),
            config.work_dir.clone(),
            config.worker_pool_size,
        ))
    }

    pub fn new(
        cover: Arc<CoverImage>,
        thumbnail: Option<Vec<u8>>,
        work_dir: PathBuf,
        workers: usize,
    ) -> Self {
        Self {
            cover,
            thumbnail: thumbnail.map(Arc::from),
            work_dir,
            pool: WorkerPool::new(workers),
        }
    }

    /// Process one document on the worker pool.
    pub async fn process(&self, filename: &str, bytes: Vec<u8>) -> Result<EmbedOutcome> {
        let document = SubmittedDocument::new(filename, bytes.len() as u64);
        let span = request_span(&document);

        async move {
            let Some(embedder) = embedder_for(document.format) else {
                return Ok(self.reject(&document));
            };

            let pipeline = self.clone();
            let job_document = document.clone();
            let (original, result) = self
                .pool
                .run(move || {
                    let result = pipeline.embed_document(embedder, &job_document, &bytes);
                    Ok((bytes, result))
                })
                .await?;

            self.settle(&document, original, result)
        }
        .instrument(span)
        .await
    }

    /// Process one document on the calling thread.
    pub fn process_blocking(&self, filename: &str, bytes: Vec<u8>) -> Result<EmbedOutcome> {
        let document = SubmittedDocument::new(filename, bytes.len() as u64);
        let _entered = request_span(&document).entered();

        let Some(embedder) = embedder_for(document.format) else {
            return Ok(self.reject(&document));
        };
        let result = self.embed_document(embedder, &document, &bytes);
        self.settle(&document, bytes, result)
    }

    /// Unsupported formats stop here, before any storage is allocated.
    fn reject(&self, document: &SubmittedDocument) -> EmbedOutcome {
        let human = humanize_error(&DeckblattError::UnsupportedFormat(
            document.filename.clone(),
        ));
        info!(reason = %human.message, "Document rejected");
        EmbedOutcome::Rejected {
            reason: human.message,
        }
    }

    /// The single embed attempt. The artifact scope is released on every
    /// path out of this function.
    fn embed_document(
        &self,
        embedder: &dyn CoverEmbedder,
        document: &SubmittedDocument,
        bytes: &[u8],
    ) -> Result<Vec<u8>> {
        let scope = ArtifactScope::acquire(&self.work_dir, &document.filename)?;
        scope.write_input(bytes)?;

        let report = match embedder.embed(scope.input_path(), scope.output_path(), &self.cover) {
            Ok(report) => report,
            Err(err) => {
                if let Err(cleanup) = scope.release() {
                    warn!(error = %cleanup, "Failed to remove artifact directory after embed failure");
                }
                return Err(err);
            }
        };
        debug!(
            units_before = report.units_before,
            units_after = report.units_after,
            output_len = report.output_len,
            "Embed finished"
        );

        scope.finish()
    }

    fn settle(
        &self,
        document: &SubmittedDocument,
        original: Vec<u8>,
        result: Result<Vec<u8>>,
    ) -> Result<EmbedOutcome> {
        match result {
            Ok(bytes) => {
                let thumbnail = match document.format {
                    DocumentFormat::Pdf => self.thumbnail.as_deref().map(<[u8]>::to_vec),
                    _ => None,
                };
                info!(output_bytes = bytes.len(), "Cover embedded");
                Ok(EmbedOutcome::Delivered {
                    bytes,
                    filename: document.filename.clone(),
                    thumbnail,
                })
            }
            Err(err) if err.is_recoverable() => {
                let human = humanize_error(&err);
                warn!(error = %err, "Embedding failed, delivering original document");
                Ok(EmbedOutcome::DeliveredOriginal {
                    bytes: original,
                    filename: document.filename.clone(),
                    reason: human.message,
                })
            }
            Err(err) => {
                error!(error = %err, "Request failed");
                Err(err)
            }
        }
    }
}

fn request_span(document: &SubmittedDocument) -> tracing::Span {
    info_span!(
        "request",
        request_id = %document.request_id,
        filename = %document.filename,
        format = %document.format,
        bytes_len = document.byte_len,
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use deckblatt_document::fixtures;
    use lopdf::Document;

    use super::*;

    fn pipeline(work_dir: &Path) -> Pipeline {
        let cover = fixtures::cover_image(60, 80);
        let thumbnail = cover.thumbnail(32, 85).unwrap();
        Pipeline::new(Arc::new(cover), Some(thumbnail), work_dir.to_path_buf(), 2)
    }

    fn leftover_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn pdf_is_delivered_with_cover_and_thumbnail() {
        let work = tempfile::tempdir().unwrap();
        let outcome = pipeline(work.path())
            .process("report.pdf", fixtures::sample_pdf(3))
            .await
            .unwrap();

        let EmbedOutcome::Delivered {
            bytes,
            filename,
            thumbnail,
        } = outcome
        else {
            panic!("expected delivery, got {outcome:?}");
        };
        assert_eq!(filename, "report.pdf");
        assert_eq!(Document::load_mem(&bytes).unwrap().get_pages().len(), 4);
        assert!(thumbnail.is_some());
        assert_eq!(leftover_entries(work.path()), 0);
    }

    #[tokio::test]
    async fn epub_is_delivered_without_thumbnail() {
        let work = tempfile::tempdir().unwrap();
        let outcome = pipeline(work.path())
            .process("Novel.EPUB", fixtures::sample_epub(Some("Alpha")))
            .await
            .unwrap();

        let EmbedOutcome::Delivered {
            bytes, thumbnail, ..
        } = outcome
        else {
            panic!("expected delivery, got {outcome:?}");
        };
        let package = deckblatt_document::epub::read_package(&bytes).unwrap();
        assert_eq!(package.spine.len(), 4);
        assert_eq!(thumbnail, None);
        assert_eq!(leftover_entries(work.path()), 0);
    }

    #[tokio::test]
    async fn unsupported_file_is_rejected_without_touching_storage() {
        let work = tempfile::tempdir().unwrap();
        let work_dir = work.path().join("never-created");

        let outcome = pipeline(&work_dir)
            .process("notes.docx", b"whatever".to_vec())
            .await
            .unwrap();

        assert!(matches!(outcome, EmbedOutcome::Rejected { .. }));
        assert!(!work_dir.exists());
    }

    #[tokio::test]
    async fn corrupt_pdf_degrades_to_original() {
        let work = tempfile::tempdir().unwrap();
        let input = b"%PDF-1.7 truncated nonsense".to_vec();

        let outcome = pipeline(work.path())
            .process("broken.pdf", input.clone())
            .await
            .unwrap();

        match outcome {
            EmbedOutcome::DeliveredOriginal {
                bytes,
                filename,
                reason,
            } => {
                assert_eq!(bytes, input);
                assert_eq!(filename, "broken.pdf");
                assert!(reason.contains("PDF"));
            }
            other => panic!("expected the original back, got {other:?}"),
        }
        assert_eq!(leftover_entries(work.path()), 0);
    }

    #[tokio::test]
    async fn corrupt_epub_degrades_to_original() {
        let work = tempfile::tempdir().unwrap();
        let outcome = pipeline(work.path())
            .process("broken.epub", b"not a zip".to_vec())
            .await
            .unwrap();

        assert!(matches!(outcome, EmbedOutcome::DeliveredOriginal { .. }));
        assert!(!outcome.is_embedded());
        assert_eq!(leftover_entries(work.path()), 0);
    }

    #[tokio::test]
    async fn storage_failure_fails_the_request() {
        let work = tempfile::tempdir().unwrap();
        let not_a_dir = work.path().join("occupied");
        std::fs::write(&not_a_dir, b"file in the way").unwrap();

        let err = pipeline(&not_a_dir)
            .process("report.pdf", fixtures::sample_pdf(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DeckblattError::Io(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_nothing_but_the_cover() {
        let work = tempfile::tempdir().unwrap();
        let pipeline = pipeline(work.path());

        let mut tasks = tokio::task::JoinSet::new();
        for index in 0..6 {
            let pipeline = pipeline.clone();
            tasks.spawn(async move {
                let pages = index + 1;
                let outcome = pipeline
                    .process("same-name.pdf", fixtures::sample_pdf(pages))
                    .await
                    .unwrap();
                (pages, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (pages, outcome) = joined.unwrap();
            let EmbedOutcome::Delivered { bytes, .. } = outcome else {
                panic!("request with {pages} pages was not delivered");
            };
            assert_eq!(
                Document::load_mem(&bytes).unwrap().get_pages().len(),
                pages + 1
            );
        }
        assert_eq!(leftover_entries(work.path()), 0);
    }

    #[test]
    fn blocking_variant_matches_async() {
        let work = tempfile::tempdir().unwrap();
        let outcome = pipeline(work.path())
            .process_blocking("book.epub", fixtures::sample_epub2())
            .unwrap();
        assert!(outcome.is_embedded());
        assert_eq!(leftover_entries(work.path()), 0);
    }

    #[test]
    fn missing_cover_is_fatal_at_startup() {
        let work = tempfile::tempdir().unwrap();
        let config = AppConfig {
            cover_image_path: work.path().join("no-such-cover.jpg"),
            work_dir: work.path().join("work"),
            ..AppConfig::default()
        };

        let err = Pipeline::from_config(&config).unwrap_err();
        assert!(matches!(err, DeckblattError::ImageLoad(_)));
    }

    #[test]
    fn invalid_config_is_rejected_before_loading_cover() {
        let config = AppConfig {
            jpeg_quality: 0,
            ..AppConfig::default()
        };
        let err = Pipeline::from_config(&config).unwrap_err();
        assert!(matches!(err, DeckblattError::Config(_)));
    }
}
