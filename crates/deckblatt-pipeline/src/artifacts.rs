// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Artifact lifecycle: one private working directory per request holding the
// input and output files.
//
// The directory is a `tempfile::TempDir`, so it is removed when the scope is
// dropped: on success, on an error return, and while unwinding from a panic.

use std::path::{Path, PathBuf};

use deckblatt_core::error::Result;
use tempfile::TempDir;
use tracing::{debug, instrument, warn};

/// Longest sanitised filename kept in artifact paths.
const MAX_NAME_LEN: usize = 64;

/// Input and output paths for one request, inside a directory no other
/// request shares.
#[derive(Debug)]
pub struct ArtifactScope {
    dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl ArtifactScope {
    /// Create a fresh working directory under `work_dir` for `filename`.
    #[instrument(skip_all, fields(work_dir = %work_dir.display(), filename))]
    pub fn acquire(work_dir: &Path, filename: &str) -> Result<Self> {
        std::fs::create_dir_all(work_dir)?;

        let name = sanitize_filename(filename);
        let stem = name.rsplit_once('.').map_or(name.as_str(), |(stem, _)| stem);
        let dir = tempfile::Builder::new()
            .prefix(&format!("{stem}-"))
            .tempdir_in(work_dir)?;

        let input = dir.path().join(format!("input-{name}"));
        let output = dir.path().join(format!("output-{name}"));
        debug!(dir = %dir.path().display(), "Artifact scope acquired");

        Ok(Self { dir, input, output })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn write_input(&self, bytes: &[u8]) -> Result<()> {
        std::fs::write(&self.input, bytes)?;
        Ok(())
    }

    /// Read the output fully, then release the directory.
    ///
    /// The bytes are already in memory by the time cleanup runs, so a
    /// cleanup failure is logged rather than returned.
    pub fn finish(self) -> Result<Vec<u8>> {
        let bytes = std::fs::read(&self.output)?;
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!(dir = %path.display(), error = %err, "Failed to remove artifact directory");
        }
        Ok(bytes)
    }

    /// Release the directory now, reporting cleanup errors.
    pub fn release(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!(dir = %path.display(), "Artifact scope released");
        Ok(())
    }
}

/// Reduce a submitted filename to a safe single path component.
///
/// Directory parts are dropped, anything outside `[A-Za-z0-9._-]` becomes
/// `_`, and leading dots are stripped.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    // Keep the extension when truncating.
    let cleaned = if cleaned.len() > MAX_NAME_LEN {
        match cleaned.rsplit_once('.') {
            Some((stem, ext)) if ext.len() < MAX_NAME_LEN / 2 => {
                format!("{}.{}", &stem[..MAX_NAME_LEN - ext.len() - 1], ext)
            }
            _ => cleaned[..MAX_NAME_LEN].to_string(),
        }
    } else {
        cleaned.to_string()
    };

    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitising_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd.pdf"), "passwd.pdf");
        assert_eq!(sanitize_filename("C:\\Users\\me\\Mein Buch.epub"), "Mein_Buch.epub");
        assert_eq!(sanitize_filename("...hidden.pdf"), "hidden.pdf");
        assert_eq!(sanitize_filename("Über.pdf"), "_ber.pdf");
        assert_eq!(sanitize_filename(""), "document");
    }

    #[test]
    fn long_names_keep_their_extension() {
        let long = format!("{}.epub", "a".repeat(200));
        let cleaned = sanitize_filename(&long);
        assert_eq!(cleaned.len(), MAX_NAME_LEN);
        assert!(cleaned.ends_with(".epub"));
    }

    #[test]
    fn same_filename_gets_distinct_directories() {
        let work = tempfile::tempdir().unwrap();
        let first = ArtifactScope::acquire(work.path(), "report.pdf").unwrap();
        let second = ArtifactScope::acquire(work.path(), "report.pdf").unwrap();

        assert_ne!(first.dir(), second.dir());
        assert!(first.input_path().starts_with(first.dir()));
        assert!(first.output_path().ends_with("output-report.pdf"));
    }

    #[test]
    fn finish_returns_output_and_cleans_up() {
        let work = tempfile::tempdir().unwrap();
        let scope = ArtifactScope::acquire(work.path(), "book.epub").unwrap();
        scope.write_input(b"in").unwrap();
        std::fs::write(scope.output_path(), b"out").unwrap();
        let dir = scope.dir().to_path_buf();

        assert_eq!(scope.finish().unwrap(), b"out");
        assert!(!dir.exists());
    }

    #[test]
    fn finish_without_output_is_io_error_and_cleans_up() {
        let work = tempfile::tempdir().unwrap();
        let scope = ArtifactScope::acquire(work.path(), "book.epub").unwrap();
        let dir = scope.dir().to_path_buf();

        let err = scope.finish().unwrap_err();
        assert!(matches!(err, deckblatt_core::DeckblattError::Io(_)));
        assert!(!dir.exists());
    }

    #[test]
    fn release_and_drop_remove_directory() {
        let work = tempfile::tempdir().unwrap();

        let released = ArtifactScope::acquire(work.path(), "a.pdf").unwrap();
        let released_dir = released.dir().to_path_buf();
        released.release().unwrap();
        assert!(!released_dir.exists());

        let dropped = ArtifactScope::acquire(work.path(), "b.pdf").unwrap();
        let dropped_dir = dropped.dir().to_path_buf();
        drop(dropped);
        assert!(!dropped_dir.exists());
    }

    #[test]
    fn panic_inside_scope_still_cleans_up() {
        let work = tempfile::tempdir().unwrap();
        let mut seen = None;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let scope = ArtifactScope::acquire(work.path(), "c.pdf").unwrap();
            scope.write_input(b"data").unwrap();
            seen = Some(scope.dir().to_path_buf());
            panic!("embedder blew up");
        }));

        assert!(result.is_err());
        assert!(!seen.unwrap().exists());
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }
}
