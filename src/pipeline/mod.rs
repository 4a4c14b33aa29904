//! Pipeline stages for page-image-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and a backend (renderer, model client) can change
//! without touching the other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ select ──▶ render ──▶ encode ──▶ llm ──▶ postprocess
//! (sniff)   (range)    (pdfium)   (base64)   (model)  (cleanup)
//! ```
//!
//! 1. [`input`]  — wrap stdin or file bytes and detect PDF/PNG/JPEG/BMP
//! 2. [`select`] — validate the requested page range against the page count
//! 3. [`render`] — rasterise selected pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 4. [`encode`] — PNG-encode and base64-wrap each `DynamicImage`
//! 5. [`llm`]    — build the prompt and drive the model call with
//!    timeout/retry; the only stage with network I/O
//! 6. [`postprocess`] — deterministic text cleanup of model quirks
//!
//! Assembly of the final document lives in [`crate::assemble`].

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
pub mod select;
