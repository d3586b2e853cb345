// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// deckblatt-pipeline — The per-request path from submitted bytes to an
// `EmbedOutcome`.
//
// Each request gets its own scoped working directory, runs its embed on a
// bounded pool of blocking workers, and falls back to the untouched input
// when the document itself cannot be processed.

pub mod artifacts;
pub mod pipeline;
pub mod pool;

pub use artifacts::ArtifactScope;
pub use pipeline::Pipeline;
pub use pool::WorkerPool;
