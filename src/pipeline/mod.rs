//! Pipeline stages for URL-to-PDF conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the renderer can be swapped without touching the
//! network code.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ fetch ──▶ transcode ──▶ assemble ──▶ render
//! (jobs)    (HTTP)    (WebP→JPEG)   (<base>,      (temp file,
//!                                    MathJax)      wkhtmltopdf)
//! ```
//!
//! 1. [`input`]     — read the URL list and derive one job per URL
//! 2. [`fetch`]     — GET the page with bounded retry; job-fatal on failure
//! 3. [`transcode`] — inline WebP images as JPEG; per-image failures are
//!    logged and skipped
//! 4. [`assemble`]  — inject `<base>` and the MathJax loader into `<head>`
//! 5. [`render`]    — write a transient HTML file and run the renderer
//!
//! [`charset`] holds the byte-level rewriter shared by transcode and
//! assemble, so pages keep their original encoding.

pub mod assemble;
pub mod charset;
pub mod fetch;
pub mod input;
pub mod render;
pub mod transcode;
