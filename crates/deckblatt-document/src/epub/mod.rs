// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// EPUB module: an in-memory package model (manifest, spine, TOC, metadata),
// its zip reader and writer, and the cover rewriter built on top of them.

pub mod archive;
pub mod opf;
pub mod package;
pub mod rewriter;
pub mod toc;

pub use archive::{read_package, write_package};
pub use package::{
    EpubPackage, GuideReference, ManifestItem, MetaKey, MetaNamespace, MetaValue, Metadata,
    SpineItem, TocEntry,
};
pub use rewriter::EpubCoverRewriter;
