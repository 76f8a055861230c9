//! Byte-level HTML rewriting in the page's own character encoding.
//!
//! Pages are never decoded into a Rust `String`. The rewriter runs over the
//! raw bytes with the encoding the server declared in `Content-Type`. When
//! the header names no charset, the rewriter starts as UTF-8 and switches on
//! a `<meta charset>` tag. Content the handlers do not touch is emitted byte
//! for byte, so Latin-1 or Shift_JIS text reaches the renderer intact.

use encoding_rs::Encoding;
use lol_html::errors::RewritingError;
use lol_html::{AsciiCompatibleEncoding, HtmlRewriter, Settings};

/// Extract the charset from a `Content-Type` header value.
///
/// `text/html; charset="ISO-8859-1"` yields `windows-1252` (the WHATWG
/// mapping). Unknown labels yield `None`.
pub fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    let lower = content_type.to_ascii_lowercase();
    let label = lower
        .split("charset=")
        .nth(1)?
        .trim_start_matches(['"', '\''])
        .split(['"', '\'', ';', ',', ' '])
        .next()?
        .trim();

    if label.is_empty() {
        return None;
    }
    Encoding::for_label(label.as_bytes())
}

/// Rewriter settings for a document whose declared encoding is `declared`.
///
/// Encodings the rewriter cannot handle (UTF-16 and friends) fall back to
/// UTF-8 with `<meta>` detection, which still passes unknown bytes through.
pub fn rewriter_settings<'h, 's>(declared: Option<&'static Encoding>) -> Settings<'h, 's> {
    match declared.and_then(AsciiCompatibleEncoding::new) {
        Some(encoding) => Settings {
            encoding,
            adjust_charset_on_meta_tag: false,
            ..Settings::new()
        },
        None => Settings {
            encoding: AsciiCompatibleEncoding::utf_8(),
            adjust_charset_on_meta_tag: true,
            ..Settings::new()
        },
    }
}

/// Run `settings` over `document` and collect the output bytes.
pub fn rewrite_bytes(
    document: &[u8],
    settings: Settings<'_, '_>,
) -> Result<Vec<u8>, RewritingError> {
    let mut output = Vec::with_capacity(document.len() + 256);
    let mut rewriter = HtmlRewriter::new(settings, |chunk: &[u8]| output.extend_from_slice(chunk));
    rewriter.write(document)?;
    rewriter.end()?;
    Ok(output)
}

/// Decode the character references HTML allows inside attribute values.
///
/// Covers numeric references and the named ones that show up in URLs.
/// Unknown or malformed references are kept verbatim, as browsers do.
pub fn decode_attribute_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        match rest.find(';').and_then(|semi| {
            decode_reference(&rest[1..semi]).map(|decoded| (decoded, semi))
        }) {
            Some((decoded, semi)) => {
                out.push(decoded);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "sol" => Some('/'),
        "quest" => Some('?'),
        "equals" => Some('='),
        "num" => Some('#'),
        "percnt" => Some('%'),
        "plus" => Some('+'),
        "colon" => Some(':'),
        "comma" => Some(','),
        "period" => Some('.'),
        "lowbar" => Some('_'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lol_html::element;

    #[test]
    fn content_type_charset_is_detected() {
        let enc = charset_from_content_type("text/html; charset=ISO-8859-1").unwrap();
        assert_eq!(enc, encoding_rs::WINDOWS_1252);
        let enc = charset_from_content_type(r#"text/html;charset="shift_jis""#).unwrap();
        assert_eq!(enc, encoding_rs::SHIFT_JIS);
        assert!(charset_from_content_type("text/html").is_none());
        assert!(charset_from_content_type("text/html; charset=").is_none());
        assert!(charset_from_content_type("text/html; charset=klingon").is_none());
    }

    #[test]
    fn untouched_latin1_bytes_pass_through() {
        let doc = b"<html><head><meta charset=\"iso-8859-1\"></head><body>caf\xe9</body></html>";
        let out = rewrite_bytes(doc, rewriter_settings(None)).unwrap();
        assert_eq!(out, doc.to_vec());
    }

    #[test]
    fn declared_encoding_is_used_for_attributes() {
        let doc = b"<img alt=\"caf\xe9\" src=\"x.png\">";
        let seen = std::cell::RefCell::new(String::new());
        let out = rewrite_bytes(
            doc,
            Settings {
                element_content_handlers: vec![element!("img", |el| {
                    *seen.borrow_mut() = el.get_attribute("alt").unwrap_or_default();
                    el.set_attribute("src", "data:image/jpeg;base64,AA")?;
                    Ok(())
                })],
                ..rewriter_settings(Some(encoding_rs::WINDOWS_1252))
            },
        )
        .unwrap();
        assert_eq!(seen.into_inner(), "café");
        assert!(out.starts_with(b"<img alt=\"caf\xe9\""), "got: {out:?}");
    }

    #[test]
    fn entities_in_attribute_values_are_decoded() {
        assert_eq!(decode_attribute_entities("/i.webp?w=1&amp;h=2"), "/i.webp?w=1&h=2");
        assert_eq!(decode_attribute_entities("a&#38;b&#x26;c"), "a&b&c");
        assert_eq!(decode_attribute_entities("plain.png"), "plain.png");
    }

    #[test]
    fn unknown_entities_are_kept_verbatim() {
        assert_eq!(decode_attribute_entities("?a=1&b=2"), "?a=1&b=2");
        assert_eq!(decode_attribute_entities("&bogus;x"), "&bogus;x");
        assert_eq!(decode_attribute_entities("trailing&"), "trailing&");
        assert_eq!(decode_attribute_entities("&#xZZ;"), "&#xZZ;");
    }
}
