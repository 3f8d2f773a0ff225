//! Pipeline stages for document translation.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets a stage be swapped (another
//! reconstructor, another provider) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ load ──▶ extract ──▶ gate ──▶ translate ──▶ flow | overlay
//! (stage)  (lopdf)   (blocks)  (detect)  (chunked)     (docx)  (pdf)
//! ```
//!
//! 1. [`input`]   — stage the user-supplied path or URL into a temp dir
//! 2. [`load`]    — interpret content streams into a typed page tree; runs
//!    in `spawn_blocking` because parsing is CPU-bound
//! 3. [`extract`] — group text runs into ordered [`crate::document::TextBlock`]s
//! 4. [`gate`]    — check each block's language before translating it
//! 5. [`translate`] — provider calls with timeout, [`chunk`]ing and entity
//!    decoding; with [`gate`], the only stages with network I/O
//! 6. [`flow`] / [`overlay`] — rebuild the document in the chosen form
//!
//! [`normalize`] and [`metrics`] are shared helpers.

pub mod chunk;
pub mod extract;
pub mod flow;
pub mod gate;
pub mod input;
pub mod load;
pub mod metrics;
pub mod normalize;
pub mod overlay;
pub mod translate;

#[cfg(test)]
pub(crate) mod fixtures;
