//! JavaScript / JSON rewriting of string literals that hold absolute or
//! protocol-relative URLs.
//!
//! Lexical only: URLs assembled by concatenation, template literals, or
//! escaped slashes (`https:\/\/`) are not touched here. The runtime shim
//! catches those when they are used.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::RewriteContext;

static URL_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""((?i:https?:)?//[^"\\\s]+)"|'((?i:https?:)?//[^'\\\s]+)'"#)
        .expect("js url literal pattern")
});

/// Replaces the contents of URL-looking string literals with proxy paths,
/// keeping the original quote character.
pub fn rewrite_js(js: &str, ctx: &RewriteContext<'_>) -> String {
    URL_LITERAL
        .replace_all(js, |caps: &Captures<'_>| {
            let (quote, literal) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => ('"', m.as_str()),
                (None, Some(m)) => ('\'', m.as_str()),
                (None, None) => return caps[0].to_string(),
            };
            match ctx.rewrite(literal) {
                Some(path) => format!("{quote}{path}{quote}"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::UrlCodec;
    use url::Url;

    fn rewrite(js: &str) -> String {
        let codec = UrlCodec::default();
        let base = Url::parse("https://site.com/app/").unwrap();
        rewrite_js(js, &RewriteContext::new(&codec, &base))
    }

    fn literal_target(out: &str, quote: char) -> String {
        let start = out.find(quote).unwrap() + 1;
        let end = out[start..].find(quote).unwrap() + start;
        UrlCodec::default()
            .decode_path(&out[start..end])
            .unwrap()
            .unwrap()
            .to_string()
    }

    #[test]
    fn double_quoted_absolute() {
        let out = rewrite(r#"fetch("https://api.site.com/v1/items?x=1")"#);
        assert!(out.starts_with("fetch(\"/~/"));
        assert_eq!(literal_target(&out, '"'), "https://api.site.com/v1/items?x=1");
    }

    #[test]
    fn single_quoted_protocol_relative() {
        let out = rewrite("s.src = '//cdn.site.com/lib.js';");
        assert!(out.starts_with("s.src = '/~/"));
        assert_eq!(literal_target(&out, '\''), "https://cdn.site.com/lib.js");
    }

    #[test]
    fn json_values() {
        let out = rewrite(r#"{"avatar":"http://img.site.com/u/1.png","name":"bob"}"#);
        assert!(out.contains(r#""name":"bob""#));
        assert!(!out.contains("img.site.com"));
    }

    #[test]
    fn relative_and_plain_strings_untouched() {
        let js = r#"var a = "/api/items"; var b = 'hello'; var c = "data:text/plain,x";"#;
        assert_eq!(rewrite(js), js);
    }

    #[test]
    fn idempotent() {
        let once = rewrite(r#"load("https://a.com/x.js", 'http://b.com/y')"#);
        assert_eq!(rewrite(&once), once);
    }

    #[test]
    fn mismatched_quotes_not_joined() {
        let js = r#"x = "https://a.com/'; y = 'z';"#;
        assert_eq!(rewrite(js), js);
    }

    // Accepted gap: concatenated and escaped URLs stay as written and are
    // handled at runtime by the shim instead.
    #[test]
    fn concatenation_and_escaped_slashes_left_for_runtime() {
        let js = r#"var u = "https://" + host + "/x"; var j = "https:\/\/a.com\/y";"#;
        assert_eq!(rewrite(js), js);
    }
}
