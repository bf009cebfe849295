//! libcurl-backed [`Fetcher`].

use curl::easy::{Easy, List};
use std::cell::Cell;
use std::str;
use std::time::Duration;

use super::parse::parse_response_head;
use super::{FetchError, FetchRequest, Fetcher, OriginResponse};
use crate::config::FetchConfig;

/// Request headers never sent upstream. Without `Accept-Encoding` the origin
/// answers with identity-coded bytes the rewriters can read.
const DROPPED_REQUEST_HEADERS: &[&str] = &["accept-encoding", "host", "content-length", "connection"];

/// Fetches with one `Easy` handle per request.
#[derive(Debug, Clone, Default)]
pub struct CurlFetcher {
    config: FetchConfig,
}

impl CurlFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }

    fn configure(&self, easy: &mut Easy, request: &FetchRequest) -> Result<(), FetchError> {
        easy.url(request.url.as_str())?;
        easy.follow_location(self.config.follow_redirects)?;
        easy.max_redirections(self.config.max_redirects)?;
        easy.connect_timeout(Duration::from_secs(self.config.connect_timeout_secs))?;
        easy.timeout(Duration::from_secs(self.config.timeout_secs))?;

        let method = request.method.to_ascii_uppercase();
        if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(FetchError::Method(request.method.clone()));
        }
        match method.as_str() {
            "GET" => easy.get(true)?,
            "HEAD" => easy.nobody(true)?,
            "POST" => {
                easy.post(true)?;
                easy.post_fields_copy(request.body.as_deref().unwrap_or_default())?;
            }
            other => {
                easy.custom_request(other)?;
                if let Some(body) = &request.body {
                    easy.post_fields_copy(body)?;
                }
            }
        }

        let mut list = List::new();
        let mut has_user_agent = false;
        for (k, v) in &request.headers {
            let name = k.trim();
            if DROPPED_REQUEST_HEADERS.iter().any(|d| name.eq_ignore_ascii_case(d)) {
                continue;
            }
            has_user_agent |= name.eq_ignore_ascii_case("user-agent");
            list.append(&format!("{}: {}", name, v.trim()))?;
        }
        // Suppress curl's `Expect: 100-continue` on bodies.
        list.append("Expect:")?;
        easy.http_headers(list)?;
        if !has_user_agent {
            easy.useragent(&self.config.user_agent)?;
        }
        Ok(())
    }
}

impl Fetcher for CurlFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<OriginResponse, FetchError> {
        let mut easy = Easy::new();
        self.configure(&mut easy, request)?;

        let limit = self.config.max_body_bytes;
        let overflow = Cell::new(false);
        let mut lines: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();

        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                if (body.len() + data.len()) as u64 > limit {
                    overflow.set(true);
                    return Ok(0); // abort transfer
                }
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()
        };
        if overflow.get() {
            return Err(FetchError::BodyTooLarge { limit });
        }
        performed?;

        let (parsed_status, headers) = parse_response_head(&lines);
        let code = easy.response_code()?;
        let status = u16::try_from(code)
            .ok()
            .filter(|c| *c > 0)
            .or(parsed_status)
            .ok_or(FetchError::NoStatus)?;

        let final_url = easy
            .effective_url()?
            .filter(|u| *u != request.url.as_str())
            .map(str::to_string);

        tracing::debug!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.url,
            status,
            body.len()
        );

        Ok(OriginResponse {
            status,
            headers,
            body,
            final_url,
        })
    }
}
