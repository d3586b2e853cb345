// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format dispatch: one `CoverEmbedder` strategy per supported format.

use std::path::{Path, PathBuf};

use deckblatt_core::error::Result;
use deckblatt_core::types::DocumentFormat;

use crate::cover::CoverImage;
use crate::epub::rewriter::EpubCoverRewriter;
use crate::pdf::embedder::PdfCoverEmbedder;

static PDF_EMBEDDER: PdfCoverEmbedder = PdfCoverEmbedder::new();
static EPUB_REWRITER: EpubCoverRewriter = EpubCoverRewriter::new();

/// A format-specific way of putting the cover into a document.
///
/// Implementations read `input`, and on success leave a complete document at
/// `output`. On failure nothing is written to `output`.
pub trait CoverEmbedder: Send + Sync {
    /// The format this strategy handles.
    fn format(&self) -> DocumentFormat;

    /// Embed `cover` into the document at `input`, writing the result to `output`.
    fn embed(&self, input: &Path, output: &Path, cover: &CoverImage) -> Result<EmbedReport>;
}

/// Summary of a successful embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedReport {
    pub format: DocumentFormat,
    pub output_path: PathBuf,
    pub output_len: u64,
    /// Pages (PDF) or spine entries (EPUB) before embedding.
    pub units_before: usize,
    /// Pages (PDF) or spine entries (EPUB) after embedding.
    pub units_after: usize,
}

/// Pick the embedder for `format`, or `None` if the format is unsupported.
pub fn embedder_for(format: DocumentFormat) -> Option<&'static dyn CoverEmbedder> {
    match format {
        DocumentFormat::Pdf => Some(&PDF_EMBEDDER),
        DocumentFormat::Epub => Some(&EPUB_REWRITER),
        DocumentFormat::Unsupported => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_supported_format_has_a_matching_embedder() {
        for format in [DocumentFormat::Pdf, DocumentFormat::Epub] {
            let embedder = embedder_for(format).unwrap();
            assert_eq!(embedder.format(), format);
        }
    }

    #[test]
    fn unsupported_format_has_no_embedder() {
        assert!(embedder_for(DocumentFormat::from_filename("notes.txt")).is_none());
    }
}
