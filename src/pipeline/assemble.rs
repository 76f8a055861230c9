//! Document assembly: make the fetched page self-describing for the renderer.
//!
//! The renderer loads the page from a local temp file, so every relative
//! link would resolve against `file:///tmp/…`. A `<base href>` placed first
//! in `<head>` points them back at the original site. A MathJax script is
//! appended so TeX/MathML formulas are typeset during the renderer's
//! JavaScript delay.

use crate::pipeline::charset::{rewrite_bytes, rewriter_settings};
use encoding_rs::Encoding;
use lol_html::html_content::ContentType;
use lol_html::{element, Settings};
use std::cell::Cell;
use std::rc::Rc;
use tracing::debug;

/// MathJax 2.x build that typesets TeX, MathML and AsciiMath with HTML-CSS
/// output. MathJax 3 needs newer JavaScript than wkhtmltopdf's WebKit runs.
pub const MATHJAX_URL: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/mathjax/2.7.9/MathJax.js?config=TeX-MML-AM_CHTML";

/// Inject `<base href=page_url>` as the first child of `<head>` and a MathJax
/// `<script async>` as its last child.
///
/// `declared` is the charset from the page's `Content-Type`. The injected
/// tags are ASCII, so the page keeps its own encoding.
///
/// Never fails: the rewriter is tolerant of malformed markup, and a document
/// without `<head>` gets one synthesized.
pub fn assemble(document: &[u8], page_url: &str, declared: Option<&'static Encoding>) -> Vec<u8> {
    let base_tag = format!(r#"<base href="{}">"#, escape_attr(page_url));
    let script_tag = format!(r#"<script src="{}" async></script>"#, escape_attr(MATHJAX_URL));

    if let Some(out) = inject_into_head(document, &base_tag, &script_tag, declared) {
        return out;
    }

    debug!("No <head> in {}, synthesizing one", page_url);
    let head = format!("<head>{base_tag}{script_tag}</head>");
    if let Some(out) = prepend_to_html(document, &head, declared) {
        return out;
    }
    let mut out = head.into_bytes();
    out.extend_from_slice(document);
    out
}

/// `None` when the document has no `<head>` element or cannot be rewritten.
fn inject_into_head(
    document: &[u8],
    base_tag: &str,
    script_tag: &str,
    declared: Option<&'static Encoding>,
) -> Option<Vec<u8>> {
    let seen = Rc::new(Cell::new(false));

    let out = rewrite_bytes(
        document,
        Settings {
            element_content_handlers: vec![element!("head", {
                let seen = Rc::clone(&seen);
                move |el| {
                    if seen.replace(true) {
                        return Ok(());
                    }
                    el.prepend(base_tag, ContentType::Html);
                    el.append(script_tag, ContentType::Html);
                    Ok(())
                }
            })],
            ..rewriter_settings(declared)
        },
    )
    .ok()?;

    seen.get().then_some(out)
}

fn prepend_to_html(
    document: &[u8],
    head: &str,
    declared: Option<&'static Encoding>,
) -> Option<Vec<u8>> {
    let seen = Rc::new(Cell::new(false));

    let out = rewrite_bytes(
        document,
        Settings {
            element_content_handlers: vec![element!("html", {
                let seen = Rc::clone(&seen);
                move |el| {
                    if !seen.replace(true) {
                        el.prepend(head, ContentType::Html);
                    }
                    Ok(())
                }
            })],
            ..rewriter_settings(declared)
        },
    )
    .ok()?;

    seen.get().then_some(out)
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
