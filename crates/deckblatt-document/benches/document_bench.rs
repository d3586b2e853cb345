// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the deckblatt-document crate: cover normalization,
// the PDF cover page, and the EPUB rewrite, all on synthetic fixtures.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use deckblatt_document::fixtures;
use deckblatt_document::{EpubCoverRewriter, PdfCoverEmbedder};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Thumbnail rendering from a 600x800 normalized cover.
fn bench_thumbnail(c: &mut Criterion) {
    let cover = fixtures::cover_image(600, 800);

    c.bench_function("cover_thumbnail (600x800 -> 320)", |b| {
        b.iter(|| black_box(cover.thumbnail(320, 85).unwrap()));
    });
}

/// Prepend a cover page to a 20-page PDF, load and save included.
fn bench_pdf_embed(c: &mut Criterion) {
    let cover = fixtures::cover_image(600, 800);
    let pdf = fixtures::sample_pdf(20);
    let embedder = PdfCoverEmbedder::new();

    c.bench_function("pdf_embed (20 pages)", |b| {
        b.iter(|| black_box(embedder.embed_bytes(black_box(&pdf), &cover).unwrap()));
    });
}

/// Full unzip, rewrite, and re-zip of a small EPUB 3 package.
fn bench_epub_rewrite(c: &mut Criterion) {
    let cover = fixtures::cover_image(600, 800);
    let epub = fixtures::sample_epub(Some("Benchmark"));
    let rewriter = EpubCoverRewriter::new();

    c.bench_function("epub_rewrite (nav + ncx)", |b| {
        b.iter(|| black_box(rewriter.embed_bytes(black_box(&epub), &cover).unwrap()));
    });
}

criterion_group!(benches, bench_thumbnail, bench_pdf_embed, bench_epub_rewrite);
criterion_main!(benches);
