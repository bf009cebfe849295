//! Decoding of origin text bodies into UTF-8.

use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;

use crate::dispatch::charset_param;

/// Decodes `body` using the `charset` of `content_type` (UTF-8 when absent or
/// unknown). A byte-order mark overrides the declared charset. Malformed
/// sequences become U+FFFD.
pub fn decode_text<'a>(body: &'a [u8], content_type: Option<&str>) -> Cow<'a, str> {
    let encoding = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        tracing::debug!("body contained invalid {} sequences", used.name());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_default() {
        assert_eq!(decode_text("héllo".as_bytes(), None), "héllo");
    }

    #[test]
    fn declared_latin1() {
        let body = [b'c', b'a', b'f', 0xE9];
        assert_eq!(decode_text(&body, Some("text/html; charset=iso-8859-1")), "café");
    }

    #[test]
    fn unknown_label_falls_back_to_utf8() {
        assert_eq!(decode_text(b"abc", Some("text/css; charset=bogus")), "abc");
    }

    #[test]
    fn bom_wins() {
        let body = [0xEF, 0xBB, 0xBF, b'o', b'k'];
        assert_eq!(decode_text(&body, Some("text/html; charset=windows-1252")), "ok");
    }
}
