// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// deckblatt-document — Cover embedding for PDF and EPUB documents.
//
// Provides the cover image normalizer, the PDF cover-page embedder, the EPUB
// package model with its cover rewriter, and the dispatcher that picks the
// right strategy for a submitted document.

pub mod cover;
pub mod dispatch;
pub mod epub;
pub mod pdf;

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;

// Re-export the primary structs so callers can use `deckblatt_document::CoverImage` etc.
pub use cover::normalizer::CoverImage;
pub use dispatch::{CoverEmbedder, EmbedReport, embedder_for};
pub use epub::rewriter::EpubCoverRewriter;
pub use pdf::embedder::PdfCoverEmbedder;
