// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: prepending a cover page to existing PDFs.

pub mod embedder;

pub use embedder::PdfCoverEmbedder;
