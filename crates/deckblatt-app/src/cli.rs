// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Embed the configured cover image into PDF and EPUB documents
#[derive(Parser, Debug)]
#[command(name = "deckblatt", version, about)]
pub struct Cli {
    /// JSON configuration file. `DECKBLATT_*` environment variables override it.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory the covered documents are written to
    #[arg(short, long, default_value = "covered")]
    pub out_dir: PathBuf,

    /// Also write `<name>.thumb.jpg` next to every covered PDF
    #[arg(long, default_value_t = false)]
    pub thumbnails: bool,

    /// Documents to process
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_flags_parse() {
        let cli = Cli::try_parse_from(["deckblatt", "a.pdf", "b.epub"]).unwrap();
        assert_eq!(cli.out_dir, PathBuf::from("covered"));
        assert!(!cli.thumbnails);
        assert_eq!(cli.files.len(), 2);

        let cli = Cli::try_parse_from([
            "deckblatt",
            "--config",
            "deckblatt.json",
            "-o",
            "out",
            "--thumbnails",
            "a.pdf",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("deckblatt.json")));
        assert_eq!(cli.out_dir, PathBuf::from("out"));
        assert!(cli.thumbnails);
    }

    #[test]
    fn at_least_one_file_is_required() {
        assert!(Cli::try_parse_from(["deckblatt"]).is_err());
    }
}
