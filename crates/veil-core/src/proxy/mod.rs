//! The proxy engine: decode the inbound reference, fetch the origin, sanitize
//! headers, dispatch the body to its rewriter.

mod context;
mod error;

pub use context::{decode_referer, ProxyContext};
pub use error::ProxyError;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStats, ResponseCache, TtlCache};
use crate::codec::{normalize_user_input, resolve, CodecError, TargetUrl, UrlCodec};
use crate::config::VeilConfig;
use crate::dispatch::ContentKind;
use crate::fetch::{CurlFetcher, FetchRequest, Fetcher, OriginResponse};
use crate::headers::{header_value, sanitize_response_headers, HeaderList, HeaderPolicy};
use crate::rewrite::{decode_text, rewrite_text, RewriteContext};

/// Inbound request headers copied to the origin request as-is.
const FORWARDED_REQUEST_HEADERS: &[&str] = &["user-agent", "accept", "accept-language", "content-type"];

/// A request as the front-end received it.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    /// Path only, e.g. `/~/aHR0cHM6Ly9hLmNvbS8`.
    pub path: String,
    /// Raw query string without `?`.
    pub query: Option<String>,
    /// Scheme and host the browser used to reach the proxy.
    pub proxy_origin: Option<String>,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

/// Response handed back to the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl ProxyResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Body of the entry endpoint's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryLink {
    pub success: bool,
    pub proxy_url: String,
    pub direct_url: String,
}

/// Engine knobs that are not part of the codec.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub cookie_prefix: Option<String>,
    pub trackers: Vec<String>,
    pub cache_ttl: Duration,
    /// Larger origin bodies are never cached.
    pub cache_max_body: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cookie_prefix: None,
            trackers: Vec::new(),
            cache_ttl: Duration::from_secs(300),
            cache_max_body: 2 * 1024 * 1024,
        }
    }
}

/// Stateless request handler; the cache is the only shared mutable state.
#[derive(Clone)]
pub struct ProxyEngine {
    codec: UrlCodec,
    settings: EngineSettings,
    fetcher: Arc<dyn Fetcher>,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl ProxyEngine {
    pub fn new(codec: UrlCodec, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            codec,
            settings: EngineSettings::default(),
            fetcher,
            cache: None,
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Engine backed by [`CurlFetcher`] and, when enabled, a [`TtlCache`].
    pub fn from_config(cfg: &VeilConfig) -> anyhow::Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(CurlFetcher::new(cfg.fetch.clone()));
        let settings = EngineSettings {
            cookie_prefix: cfg.cookie_prefix.clone(),
            trackers: cfg.tracker_denylist.clone(),
            cache_ttl: Duration::from_secs(cfg.cache.ttl_secs),
            cache_max_body: cfg.cache.max_body_bytes,
        };
        let mut engine = Self::new(cfg.codec()?, fetcher).with_settings(settings);
        if cfg.cache.enabled {
            let cache: Arc<dyn ResponseCache> =
                Arc::new(TtlCache::<OriginResponse>::new(cfg.cache.max_entries));
            engine = engine.with_cache(cache);
        }
        Ok(engine)
    }

    pub fn codec(&self) -> &UrlCodec {
        &self.codec
    }

    /// Counters of the response cache, `None` when caching is off.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            tracing::info!("response cache cleared");
        }
    }

    /// Turns user input (`example.com`, a full URL) into an entry link.
    pub fn entry(&self, input: &str) -> Result<EntryLink, CodecError> {
        let target = normalize_user_input(input)?;
        Ok(EntryLink {
            success: true,
            proxy_url: self.codec.proxy_path(&target),
            direct_url: target.to_string(),
        })
    }

    /// Proxy path for a request that escaped the path space (e.g. `/style.css`
    /// requested by a proxied page), resolved against the decoded `Referer`.
    pub fn recover_from_referer(&self, path_and_query: &str, referer: Option<&str>) -> Option<String> {
        if path_and_query.starts_with(self.codec.prefix()) {
            return None;
        }
        let page = decode_referer(&self.codec, referer?)?;
        let target = resolve(path_and_query, page.as_url()).ok()?;
        Some(self.codec.proxy_path(&target))
    }

    fn target_for(&self, request: &InboundRequest) -> Result<TargetUrl, ProxyError> {
        let target = self
            .codec
            .decode_path(&request.path)
            .ok_or_else(|| ProxyError::NotProxyPath(request.path.clone()))??;
        // GET form submissions replace the action URL's query.
        match request.query.as_deref().filter(|q| !q.is_empty()) {
            Some(q) => Ok(target.with_query(Some(q))),
            None => Ok(target),
        }
    }

    fn origin_request(&self, target: &TargetUrl, request: &InboundRequest, ctx: &ProxyContext) -> FetchRequest {
        let method = if request.method.is_empty() {
            "GET".to_string()
        } else {
            request.method.to_ascii_uppercase()
        };
        let mut out = FetchRequest {
            method,
            url: target.clone(),
            headers: HeaderList::new(),
            body: None,
        };
        for (name, value) in &request.headers {
            if FORWARDED_REQUEST_HEADERS.iter().any(|f| name.eq_ignore_ascii_case(f)) {
                out.headers.push((name.clone(), value.clone()));
            }
        }
        if let Some(cookie) = ctx.origin_cookie(self.settings.cookie_prefix.as_deref()) {
            out.headers.push(("Cookie".to_string(), cookie));
        }
        if let Some(referer) = ctx.origin_referer(&self.codec) {
            out.headers.push(("Referer".to_string(), referer));
        }
        if !matches!(out.method.as_str(), "GET" | "HEAD") {
            out.body = Some(request.body.clone());
        }
        out
    }

    /// Handles one request for a proxy path.
    pub fn handle(&self, request: &InboundRequest) -> Result<ProxyResponse, ProxyError> {
        let target = self.target_for(request)?;
        let mut ctx = ProxyContext::new(target.clone(), request);
        let fetch = self.origin_request(&target, request, &ctx);
        tracing::debug!("{} {} -> {}", fetch.method, request.path, target);

        let cacheable = fetch.method == "GET" && ctx.cookie.is_none();
        let cache = self.cache.as_ref().filter(|_| cacheable);
        let cached = cache.and_then(|c| c.get(target.as_str()));
        let hit = cached.is_some();

        let origin = match cached {
            Some(resp) => resp,
            None => {
                let resp = self.fetcher.fetch(&fetch).map_err(|e| {
                    tracing::warn!("fetch {} failed: {}", target, e);
                    e
                })?;
                if let Some(c) = cache {
                    // A stored Set-Cookie would be replayed to every later client.
                    let storable = resp.status == 200
                        && resp.body.len() <= self.settings.cache_max_body
                        && resp.header("set-cookie").is_none();
                    if storable {
                        c.set(target.as_str(), resp.clone(), self.settings.cache_ttl);
                    }
                }
                resp
            }
        };

        ctx.settle_base(origin.final_url.as_deref());
        let mut response = self.render(&ctx, origin);
        if cache.is_some() {
            let marker = if hit { "HIT" } else { "MISS" };
            response.headers.push(("X-Cache".to_string(), marker.to_string()));
        }
        Ok(response)
    }

    /// Sanitizes headers and rewrites the body of an origin response.
    pub fn render(&self, ctx: &ProxyContext, origin: OriginResponse) -> ProxyResponse {
        let base = ctx.base.as_url();
        let proxy_origin = ctx.proxy_origin.as_deref();
        let policy = HeaderPolicy {
            codec: &self.codec,
            base,
            proxy_origin,
            cookie_prefix: self.settings.cookie_prefix.as_deref(),
        };
        let mut headers = sanitize_response_headers(&origin.headers, &policy);

        let content_type = origin.content_type();
        let kind = ContentKind::from_content_type(content_type);
        if !kind.is_text() || origin.body.is_empty() {
            return ProxyResponse {
                status: origin.status,
                headers,
                body: origin.body,
            };
        }

        let text = decode_text(&origin.body, content_type);
        let rctx = RewriteContext::new(&self.codec, base)
            .with_proxy_origin(proxy_origin)
            .with_trackers(&self.settings.trackers);
        let body = rewrite_text(kind, &text, &rctx).into_bytes();

        if let Some(ct) = kind.output_content_type(content_type) {
            headers.retain(|(n, _)| !n.eq_ignore_ascii_case("content-type"));
            headers.push(("Content-Type".to_string(), ct));
        }

        ProxyResponse {
            status: origin.status,
            headers,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves one canned response and records every request it sees.
    struct StubFetcher {
        response: OriginResponse,
        seen: Mutex<Vec<FetchRequest>>,
    }

    impl StubFetcher {
        fn new(status: u16, content_type: &str, body: &str) -> Self {
            Self {
                response: OriginResponse {
                    status,
                    headers: vec![("Content-Type".to_string(), content_type.to_string())],
                    body: body.as_bytes().to_vec(),
                    final_url: None,
                },
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Fetcher for StubFetcher {
        fn fetch(&self, request: &FetchRequest) -> Result<OriginResponse, crate::fetch::FetchError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    fn engine(stub: Arc<StubFetcher>) -> ProxyEngine {
        ProxyEngine::new(UrlCodec::default(), stub)
    }

    fn get(engine: &ProxyEngine, url: &str) -> InboundRequest {
        let target = TargetUrl::parse(url).unwrap();
        InboundRequest {
            method: "GET".to_string(),
            path: engine.codec().proxy_path(&target),
            ..Default::default()
        }
    }

    #[test]
    fn html_page_is_rewritten() {
        let stub = Arc::new(StubFetcher::new(
            200,
            "text/html",
            r#"<html><head></head><body><a href="/about">A</a></body></html>"#,
        ));
        let engine = engine(stub);
        let resp = engine.handle(&get(&engine, "https://example.com/")).unwrap();
        let body = String::from_utf8(resp.body).unwrap();
        assert!(body.contains("<head><script data-veil-shim>"));
        assert_eq!(resp.headers.iter().filter(|(n, _)| n == "Content-Type").count(), 1);
        assert_eq!(
            header_value(&resp.headers, "content-type"),
            Some("text/html; charset=utf-8")
        );
    }

    #[test]
    fn binary_passthrough_is_byte_exact() {
        let stub = Arc::new(StubFetcher::new(200, "image/png", "\u{1}PNG"));
        let engine = engine(stub);
        let resp = engine.handle(&get(&engine, "https://example.com/a.png")).unwrap();
        assert_eq!(resp.body, "\u{1}PNG".as_bytes());
        assert_eq!(resp.header("content-type"), Some("image/png"));
    }

    #[test]
    fn non_2xx_is_forwarded() {
        let stub = Arc::new(StubFetcher::new(404, "text/css", "a{background:url(/x.png)}"));
        let engine = engine(stub);
        let resp = engine.handle(&get(&engine, "https://example.com/s.css")).unwrap();
        assert_eq!(resp.status, 404);
        assert!(String::from_utf8(resp.body).unwrap().contains("url('/~/"));
    }

    #[test]
    fn non_proxy_path_is_404() {
        let engine = engine(Arc::new(StubFetcher::new(200, "text/plain", "")));
        let req = InboundRequest {
            path: "/style.css".to_string(),
            ..Default::default()
        };
        assert_eq!(engine.handle(&req).unwrap_err().status_code(), 404);
    }

    #[test]
    fn undecodable_reference_is_400() {
        let engine = engine(Arc::new(StubFetcher::new(200, "text/plain", "")));
        let req = InboundRequest {
            path: "/~/%%%".to_string(),
            ..Default::default()
        };
        assert_eq!(engine.handle(&req).unwrap_err().status_code(), 400);
    }

    #[test]
    fn form_query_replaces_target_query() {
        let stub = Arc::new(StubFetcher::new(200, "text/plain", "ok"));
        let engine = engine(Arc::clone(&stub));
        let mut req = get(&engine, "https://example.com/search?old=1");
        req.query = Some("q=rust".to_string());
        engine.handle(&req).unwrap();
        let seen = stub.seen.lock().unwrap();
        assert_eq!(seen[0].url.as_str(), "https://example.com/search?q=rust");
    }

    #[test]
    fn only_whitelisted_headers_forwarded() {
        let stub = Arc::new(StubFetcher::new(200, "text/plain", "ok"));
        let engine = engine(Arc::clone(&stub));
        let mut req = get(&engine, "https://example.com/");
        req.headers = vec![
            ("User-Agent".to_string(), "test-agent".to_string()),
            ("Accept-Encoding".to_string(), "gzip".to_string()),
            ("X-Forwarded-For".to_string(), "10.0.0.1".to_string()),
        ];
        engine.handle(&req).unwrap();
        let seen = stub.seen.lock().unwrap();
        assert_eq!(
            seen[0].headers,
            vec![("User-Agent".to_string(), "test-agent".to_string())]
        );
    }

    #[test]
    fn post_body_forwarded() {
        let stub = Arc::new(StubFetcher::new(200, "application/json", "{}"));
        let engine = engine(Arc::clone(&stub));
        let mut req = get(&engine, "https://example.com/api");
        req.method = "post".to_string();
        req.body = b"a=1".to_vec();
        engine.handle(&req).unwrap();
        let seen = stub.seen.lock().unwrap();
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].body.as_deref(), Some(&b"a=1"[..]));
    }

    #[test]
    fn cache_hit_skips_fetch() {
        let stub = Arc::new(StubFetcher::new(200, "text/css", "a{}"));
        let cache: Arc<dyn ResponseCache> = Arc::new(TtlCache::<OriginResponse>::new(8));
        let engine = engine(Arc::clone(&stub)).with_cache(cache);
        let req = get(&engine, "https://example.com/s.css");
        let first = engine.handle(&req).unwrap();
        let second = engine.handle(&req).unwrap();
        assert_eq!(stub.calls(), 1);
        assert_eq!(first.header("x-cache"), Some("MISS"));
        assert_eq!(second.header("x-cache"), Some("HIT"));
        engine.clear_cache();
        engine.handle(&req).unwrap();
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn response_setting_cookie_is_not_cached() {
        let mut stub = StubFetcher::new(200, "text/css", "a{}");
        stub.response
            .headers
            .push(("Set-Cookie".to_string(), "session=alice-secret; HttpOnly".to_string()));
        let stub = Arc::new(stub);
        let cache: Arc<dyn ResponseCache> = Arc::new(TtlCache::<OriginResponse>::new(8));
        let engine = engine(Arc::clone(&stub)).with_cache(cache);
        let req = get(&engine, "https://example.com/login.css");
        let first = engine.handle(&req).unwrap();
        let second = engine.handle(&req).unwrap();
        assert_eq!(stub.calls(), 2);
        assert_eq!(first.header("x-cache"), Some("MISS"));
        assert_eq!(second.header("x-cache"), Some("MISS"));
        assert_eq!(second.header("set-cookie"), Some("session=alice-secret; HttpOnly"));
        assert_eq!(engine.cache_stats().map(|s| s.entries), Some(0));
    }

    #[test]
    fn cache_stats_track_engine_lookups() {
        let stub = Arc::new(StubFetcher::new(200, "text/css", "a{}"));
        assert_eq!(engine(Arc::clone(&stub)).cache_stats(), None);
        let cache: Arc<dyn ResponseCache> = Arc::new(TtlCache::<OriginResponse>::new(8));
        let engine = engine(stub).with_cache(cache);
        let req = get(&engine, "https://example.com/s.css");
        engine.handle(&req).unwrap();
        engine.handle(&req).unwrap();
        let stats = engine.cache_stats().unwrap();
        assert_eq!((stats.entries, stats.hits, stats.misses), (1, 1, 1));
    }

    #[test]
    fn redirect_target_becomes_base() {
        let mut stub = StubFetcher::new(200, "text/css", "a{background:url(img.png)}");
        stub.response.final_url = Some("https://cdn.example.net/css/site.css".to_string());
        let engine = engine(Arc::new(stub));
        let resp = engine.handle(&get(&engine, "https://example.com/site.css")).unwrap();
        let expected = engine
            .codec()
            .proxy_path(&TargetUrl::parse("https://cdn.example.net/css/img.png").unwrap());
        assert!(String::from_utf8(resp.body).unwrap().contains(&expected));
    }

    #[test]
    fn referer_recovery() {
        let engine = engine(Arc::new(StubFetcher::new(200, "text/plain", "")));
        let page = TargetUrl::parse("https://example.com/blog/post").unwrap();
        let referer = format!("http://127.0.0.1:8080{}", engine.codec().proxy_path(&page));
        let recovered = engine
            .recover_from_referer("/static/app.js?v=2", Some(&referer))
            .unwrap();
        let decoded = engine.codec().decode_path(&recovered).unwrap().unwrap();
        assert_eq!(decoded.as_str(), "https://example.com/static/app.js?v=2");
        assert_eq!(engine.recover_from_referer("/x", None), None);
        assert_eq!(engine.recover_from_referer("/x", Some("https://other.org/")), None);
    }

    #[test]
    fn entry_link_from_bare_host() {
        let engine = engine(Arc::new(StubFetcher::new(200, "text/plain", "")));
        let link = engine.entry("example.com").unwrap();
        assert!(link.success);
        assert_eq!(link.direct_url, "https://example.com/");
        assert!(link.proxy_url.starts_with("/~/"));
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["proxyUrl"], link.proxy_url.as_str());
        assert!(engine.entry("  ").is_err());
    }
}
