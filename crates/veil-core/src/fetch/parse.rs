//! Parse collected response header lines into status and header list.

use crate::headers::HeaderList;

/// Status and headers of the last response block in `lines`.
///
/// libcurl reports header lines of every response it sees (`100 Continue`,
/// each redirect hop); a status line starts a new block, so only the final
/// response's headers survive.
pub(crate) fn parse_response_head(lines: &[String]) -> (Option<u16>, HeaderList) {
    let mut status = None;
    let mut headers = HeaderList::new();

    for line in lines {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            status = line
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse::<u16>().ok());
            headers.clear();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            headers.push((name.to_string(), value.trim().to_string()));
        }
    }

    (status, headers)
}
