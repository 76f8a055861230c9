//! Image transcoding: inline WebP images as base64 JPEG.
//!
//! wkhtmltopdf's bundled WebKit predates WebP, so WebP images vanish from the
//! PDF. This stage finds every `<img src>`, downloads the target under a byte
//! cap, sniffs the payload, and replaces WebP sources with a
//! `data:image/jpeg;base64,…` URI.
//!
//! The format is sniffed from the bytes, never from the extension or the
//! `Content-Type` header: CDNs routinely serve WebP as `image/jpeg` (content
//! negotiation) and PNG as `application/octet-stream`.
//!
//! Every per-image failure is an [`ImageError`] that the caller logs and
//! drops. The document as a whole never fails here.
//!
//! `src` values are read with character references decoded
//! (`?w=1&amp;h=2` requests `?w=1&h=2`), but replacements are keyed by the
//! attribute value as the rewriter reports it.

use crate::config::RenderConfig;
use crate::error::ImageError;
use crate::pipeline::charset::{decode_attribute_entities, rewrite_bytes, rewriter_settings};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use encoding_rs::Encoding;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageReader};
use lol_html::errors::RewritingError;
use lol_html::{element, Settings};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use reqwest::{Client, Url};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Format that gets re-encoded.
pub const SOURCE_FORMAT: ImageFormat = ImageFormat::WebP;

/// MIME type of the inlined replacement.
pub const TARGET_MIME: &str = "image/jpeg";

const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";

/// An `<img src>` value and the absolute URL it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Attribute value as written, character references intact.
    pub original: String,
    pub resolved: Url,
}

/// Resolve an `src` attribute to an absolute URL.
///
/// * `//host/path` is upgraded to `https://host/path`.
/// * `data:` URIs return `None`; they are already inline.
/// * Anything without a host is joined onto `base_url`. An empty path
///   component therefore resolves to the page itself.
pub fn normalize_image_url(src: &str, base_url: &Url) -> Option<Url> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    if src.starts_with("//") {
        return Url::parse(&format!("https:{src}")).ok();
    }
    match Url::parse(src) {
        Ok(url) if url.has_host() => Some(url),
        _ => base_url.join(src).ok(),
    }
}

/// Collect every non-inline image reference in document order, deduplicated
/// by `src` value.
pub fn collect_image_references(
    document: &[u8],
    base_url: &Url,
    declared: Option<&'static Encoding>,
) -> Result<Vec<ImageReference>, RewritingError> {
    let found = Rc::new(RefCell::new(Vec::<ImageReference>::new()));

    rewrite_bytes(
        document,
        Settings {
            element_content_handlers: vec![element!("img[src]", {
                let found = Rc::clone(&found);
                move |el| {
                    if let Some(src) = el.get_attribute("src") {
                        let decoded = decode_attribute_entities(&src);
                        if let Some(resolved) = normalize_image_url(&decoded, base_url) {
                            let mut found = found.borrow_mut();
                            if !found.iter().any(|r| r.original == src) {
                                found.push(ImageReference {
                                    original: src,
                                    resolved,
                                });
                            }
                        }
                    }
                    Ok(())
                }
            })],
            ..rewriter_settings(declared)
        },
    )?;

    Ok(found.take())
}

/// Replace `src` attributes found in `replacements` (keyed by the original
/// attribute value).
pub fn replace_image_sources(
    document: &[u8],
    replacements: &HashMap<String, String>,
    declared: Option<&'static Encoding>,
) -> Result<Vec<u8>, RewritingError> {
    rewrite_bytes(
        document,
        Settings {
            element_content_handlers: vec![element!("img[src]", |el| {
                if let Some(new_src) = el
                    .get_attribute("src")
                    .and_then(|src| replacements.get(&src))
                {
                    el.set_attribute("src", new_src)?;
                }
                Ok(())
            })],
            ..rewriter_settings(declared)
        },
    )
}

/// Inline every WebP image of `document` as JPEG.
///
/// `declared` is the charset from the page's `Content-Type`, if any.
///
/// Returns the input bytes untouched when nothing was replaced, so a
/// document that only holds `data:` images round-trips byte for byte and
/// triggers no network traffic.
pub async fn transcode(
    client: &Client,
    document: &[u8],
    base_url: &Url,
    declared: Option<&'static Encoding>,
    config: &RenderConfig,
) -> Vec<u8> {
    let references = match collect_image_references(document, base_url, declared) {
        Ok(refs) => refs,
        Err(e) => {
            warn!("Could not scan images in {}: {}", base_url, e);
            return document.to_vec();
        }
    };
    if references.is_empty() {
        return document.to_vec();
    }
    debug!("{}: {} image reference(s)", base_url, references.len());

    let headers = image_headers(&config.user_agent, base_url);
    let mut replacements = HashMap::new();

    for reference in &references {
        match inline_image(client, reference, &headers, config).await {
            Ok(Some(data_uri)) => {
                info!("Converted WebP image: {}", truncate(reference.resolved.as_str()));
                replacements.insert(reference.original.clone(), data_uri);
            }
            Ok(None) => debug!("Kept non-WebP image: {}", truncate(reference.resolved.as_str())),
            Err(e) => warn!("Skipping image: {}", e),
        }
    }

    if replacements.is_empty() {
        return document.to_vec();
    }

    match replace_image_sources(document, &replacements, declared) {
        Ok(rewritten) => rewritten,
        Err(e) => {
            warn!("Could not rewrite images in {}: {}", base_url, e);
            document.to_vec()
        }
    }
}

/// Download, sniff, and re-encode one image.
///
/// `Ok(None)` means the image is fine as-is (not the source format).
async fn inline_image(
    client: &Client,
    reference: &ImageReference,
    headers: &HeaderMap,
    config: &RenderConfig,
) -> Result<Option<String>, ImageError> {
    let url = reference.resolved.as_str();
    let bytes = download_capped(client, url, headers, config).await?;

    let quality = config.target_image_quality;
    let owned_url = url.to_string();
    tokio::task::spawn_blocking(move || reencode_if_source_format(&owned_url, &bytes, quality))
        .await
        .map_err(|e| ImageError::Task {
            url: url.to_string(),
            detail: e.to_string(),
        })?
}

/// Stream an image body, aborting as soon as it passes `max_image_bytes`.
pub async fn download_capped(
    client: &Client,
    url: &str,
    headers: &HeaderMap,
    config: &RenderConfig,
) -> Result<Vec<u8>, ImageError> {
    let download_err = |reason: String| ImageError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let mut response = client
        .get(url)
        .headers(headers.clone())
        .timeout(config.timeout())
        .send()
        .await
        .map_err(|e| download_err(e.to_string()))?;

    if !response.status().is_success() {
        return Err(download_err(format!("HTTP {}", response.status())));
    }

    let limit = config.max_image_bytes;
    let mut data = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| download_err(e.to_string()))?
    {
        if (data.len() + chunk.len()) as u64 > limit {
            return Err(ImageError::TooLarge {
                url: url.to_string(),
                limit,
            });
        }
        data.extend_from_slice(&chunk);
    }

    Ok(data)
}

/// Identify the image format from the payload itself.
///
/// Returns `None` for anything that is not a recognisable image.
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.format())
}

/// True when the payload is the format this stage re-encodes.
pub fn is_source_format(bytes: &[u8]) -> bool {
    sniff_format(bytes) == Some(SOURCE_FORMAT)
}

/// Re-encode `bytes` as a JPEG data URI when they hold a WebP image.
pub fn reencode_if_source_format(
    url: &str,
    bytes: &[u8],
    quality: u8,
) -> Result<Option<String>, ImageError> {
    if !is_source_format(bytes) {
        return Ok(None);
    }
    let codec_err = |source| ImageError::Codec {
        url: url.to_string(),
        source,
    };

    let decoded = image::load_from_memory_with_format(bytes, SOURCE_FORMAT).map_err(codec_err)?;
    // JPEG has no alpha channel.
    let rgb = decoded.to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(codec_err)?;

    Ok(Some(format!(
        "data:{TARGET_MIME};base64,{}",
        STANDARD.encode(&jpeg)
    )))
}

fn image_headers(user_agent: &str, referer: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, ua);
    }
    if let Ok(r) = HeaderValue::from_str(referer.as_str()) {
        headers.insert(REFERER, r);
    }
    headers.insert(ACCEPT, HeaderValue::from_static(IMAGE_ACCEPT));
    headers
}

fn truncate(s: &str) -> String {
    if s.chars().count() > 50 {
        format!("{}…", s.chars().take(50).collect::<String>())
    } else {
        s.to_string()
    }
}
