// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Deckblatt.

use thiserror::Error;

/// Top-level error type for all Deckblatt operations.
#[derive(Debug, Error)]
pub enum DeckblattError {
    // -- Request admission --
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    // -- Cover image --
    #[error("cover image could not be loaded: {0}")]
    ImageLoad(String),

    #[error("cover image encoding failed: {0}")]
    ImageEncode(String),

    // -- Document errors --
    #[error("PDF could not be parsed: {0}")]
    PdfParse(String),

    #[error("PDF could not be written: {0}")]
    PdfWrite(String),

    #[error("EPUB could not be parsed: {0}")]
    EpubParse(String),

    #[error("EPUB could not be written: {0}")]
    EpubWrite(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Service plumbing --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl DeckblattError {
    /// Whether the request can still be answered with the original document.
    ///
    /// Only format-level failures inside an embedder qualify. Storage and
    /// worker faults are not recoverable and propagate to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PdfParse(_) | Self::PdfWrite(_) | Self::EpubParse(_) | Self::EpubWrite(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DeckblattError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_errors_are_recoverable() {
        assert!(DeckblattError::PdfParse("trailer missing".into()).is_recoverable());
        assert!(DeckblattError::EpubParse("no rootfile".into()).is_recoverable());
        assert!(DeckblattError::EpubWrite("id clash".into()).is_recoverable());
    }

    #[test]
    fn storage_errors_are_not_recoverable() {
        let io = std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full");
        assert!(!DeckblattError::Io(io).is_recoverable());
        assert!(!DeckblattError::ImageLoad("missing".into()).is_recoverable());
        assert!(!DeckblattError::Worker("panicked".into()).is_recoverable());
    }
}
