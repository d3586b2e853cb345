// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cover module: loads the configured cover image once and re-encodes it into
// the canonical JPEG form both embedders consume.

pub mod normalizer;

pub use normalizer::{CoverImage, DEFAULT_JPEG_QUALITY, ImageEncoding};
