// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the people sending documents.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The orchestrator decides how to present them; the pipeline only uses the
// message text for `Rejected` and `DeliveredOriginal` reasons.

use crate::error::DeckblattError;

/// Severity of an error from the sender's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Storage hiccup or overloaded worker; sending again may work.
    Transient,
    /// The sender must do something (send a different file, fix the setup).
    ActionRequired,
    /// Cannot be fixed by resending the same file.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary.
    pub message: String,
    /// What the sender should try.
    pub suggestion: String,
    /// Severity level.
    pub severity: Severity,
}

/// Convert a `DeckblattError` into a `HumanError`.
pub fn humanize_error(err: &DeckblattError) -> HumanError {
    match err {
        DeckblattError::UnsupportedFormat(detail) => HumanError {
            message: "Only PDF and EPUB files are supported.".into(),
            suggestion: format!("Send the document as a .pdf or .epub file. (Received: {detail})"),
            severity: Severity::ActionRequired,
        },

        DeckblattError::ImageLoad(_) | DeckblattError::ImageEncode(_) => HumanError {
            message: "The cover image is not available.".into(),
            suggestion: "The service is misconfigured. Ask the operator to check the cover image path.".into(),
            severity: Severity::Permanent,
        },

        DeckblattError::PdfParse(_) | DeckblattError::PdfWrite(_) => HumanError {
            message: "The cover could not be added to this PDF.".into(),
            suggestion: "The file may be encrypted or damaged. Your original file was sent back unchanged.".into(),
            severity: Severity::Permanent,
        },

        DeckblattError::EpubParse(_) | DeckblattError::EpubWrite(_) => HumanError {
            message: "The cover could not be added to this EPUB.".into(),
            suggestion: "The book's package structure could not be read. Your original file was sent back unchanged.".into(),
            severity: Severity::Permanent,
        },

        DeckblattError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::StorageFull {
                HumanError {
                    message: "The service ran out of storage space.".into(),
                    suggestion: "Try again in a few minutes.".into(),
                    severity: Severity::Transient,
                }
            } else {
                HumanError {
                    message: "There was a problem handling the file.".into(),
                    suggestion: "Try sending it again.".into(),
                    severity: Severity::Transient,
                }
            }
        }

        DeckblattError::Serialization(_) | DeckblattError::Config(_) => HumanError {
            message: "The service is misconfigured.".into(),
            suggestion: "Ask the operator to check the configuration file.".into(),
            severity: Severity::Permanent,
        },

        DeckblattError::Worker(_) => HumanError {
            message: "Processing stopped unexpectedly.".into(),
            suggestion: "Try sending the file again.".into(),
            severity: Severity::Transient,
        },
    }
}
