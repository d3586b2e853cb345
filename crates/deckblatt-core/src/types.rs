// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Deckblatt cover pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one processing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared format of a submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Pdf,
    Epub,
    Unsupported,
}

impl DocumentFormat {
    /// Classify a document by its filename suffix (case-insensitive).
    ///
    /// Pure function of the name: nothing is read from disk.
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            Self::Pdf
        } else if lower.ends_with(".epub") {
            Self::Epub
        } else {
            Self::Unsupported
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pdf => "PDF",
            Self::Epub => "EPUB",
            Self::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// One document handed to the pipeline by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedDocument {
    pub request_id: RequestId,
    pub filename: String,
    pub format: DocumentFormat,
    pub byte_len: u64,
}

impl SubmittedDocument {
    pub fn new(filename: impl Into<String>, byte_len: u64) -> Self {
        let filename = filename.into();
        Self {
            request_id: RequestId::new(),
            format: DocumentFormat::from_filename(&filename),
            filename,
            byte_len,
        }
    }
}

/// What the orchestrator receives back for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedOutcome {
    /// The cover was embedded.
    Delivered {
        bytes: Vec<u8>,
        filename: String,
        /// JPEG preview for transports that show one next to PDF documents.
        thumbnail: Option<Vec<u8>>,
    },
    /// Embedding failed; the untouched input is handed back.
    DeliveredOriginal {
        bytes: Vec<u8>,
        filename: String,
        reason: String,
    },
    /// Refused before any processing.
    Rejected { reason: String },
}

impl EmbedOutcome {
    /// Whether the cover made it into the returned document.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}
