//! Content-type dispatch: picks exactly one rewrite path per response.

/// Which rewriter handles a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    /// JavaScript or JSON.
    Script,
    /// Anything else, forwarded byte for byte.
    Passthrough,
}

/// Lowercased media type without parameters (`text/html; charset=x` -> `text/html`).
pub fn media_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Value of the `charset` parameter, if any.
pub fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

impl ContentKind {
    /// Maps a declared `Content-Type` to a rewrite path. Missing or unknown
    /// types are passed through untouched.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type else {
            return ContentKind::Passthrough;
        };
        let essence = media_essence(ct);
        if essence.starts_with("text/html") {
            ContentKind::Html
        } else if essence.contains("javascript") || essence == "application/json" {
            ContentKind::Script
        } else if essence == "text/css" {
            ContentKind::Css
        } else {
            ContentKind::Passthrough
        }
    }

    pub fn is_text(self) -> bool {
        !matches!(self, ContentKind::Passthrough)
    }

    /// `Content-Type` sent to the client after rewriting. Rewritten bodies
    /// are always UTF-8.
    pub fn output_content_type(self, original: Option<&str>) -> Option<String> {
        match self {
            ContentKind::Html => Some("text/html; charset=utf-8".to_string()),
            ContentKind::Css => Some("text/css; charset=utf-8".to_string()),
            ContentKind::Script => {
                let essence = original
                    .map(media_essence)
                    .unwrap_or_else(|| "text/javascript".to_string());
                Some(format!("{}; charset=utf-8", essence))
            }
            ContentKind::Passthrough => original.map(str::to_string),
        }
    }
}
