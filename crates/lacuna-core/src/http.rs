//! Rate-limited synchronous HTTP client
//!
//! Uses async reqwest internally with a shared tokio runtime, but presents a
//! sync interface: the whole pipeline is sequential per source, which is what
//! makes per-source rate limits and last-used key rotation meaningful.
//!
//! Per-status handlers let a caller patch the next attempt declaratively
//! (headers/params/body) without re-dispatching themselves — the Dimensions
//! JWT refresh on 401 is the motivating case. A handler fires at most once
//! per request and does not count against the retry budget.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::FetchError;

/// Connect timeout for all outbound requests
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Statuses retried with growing backoff by default
const DEFAULT_RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Request body payload.
#[derive(Debug, Clone)]
pub enum Body {
    Text(String),
    Json(Value),
}

/// A single outbound request, described declaratively so retries and
/// status-handler overrides can rewrite it.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: reqwest::Method,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: reqwest::Method::GET,
            url: url.into(),
            params: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: reqwest::Method::POST,
            ..Self::get(url)
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body_text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Body::Text(body.into()));
        self
    }

    pub fn body_json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }
}

/// Partial override returned by a status handler, merged into the retry.
///
/// Headers and params replace same-key values and append new ones; a body
/// replaces the previous body wholesale.
#[derive(Debug, Clone, Default)]
pub struct RequestDelta {
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
}

impl RequestDelta {
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Apply this delta to a request spec in place.
    pub fn apply(self, spec: &mut RequestSpec) {
        for (key, value) in self.headers {
            match spec.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
                Some(slot) => slot.1 = value,
                None => spec.headers.push((key, value)),
            }
        }
        for (key, value) in self.params {
            match spec.params.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => spec.params.push((key, value)),
            }
        }
        if let Some(body) = self.body {
            spec.body = Some(body);
        }
    }
}

/// Response body and metadata handed back to callers and status handlers.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    headers: HashMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    /// Look up a response header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<Value, FetchError> {
        serde_json::from_str(&self.body)
            .map_err(|e| FetchError::Parse(format!("invalid JSON response: {e}")))
    }
}

type StatusHandler = Box<dyn FnMut(&ApiResponse) -> Result<RequestDelta, FetchError> + Send>;

/// Synchronous request executor with per-source pacing and retry.
pub struct RequestClient {
    client: reqwest::Client,
    proxy: Option<String>,
    timeout: Duration,
    min_delay: Duration,
    delay: Duration,
    last_request: Option<Instant>,
    max_retries: u32,
    timeout_growth: f64,
    retry_statuses: Vec<u16>,
    handlers: HashMap<u16, StatusHandler>,
}

impl RequestClient {
    /// Client pacing at most `max_rps` requests per second.
    pub fn new(max_rps: f64) -> Self {
        let min_delay = Duration::from_secs_f64(1.0 / max_rps.max(0.001));
        Self {
            client: build_client(None, DEFAULT_TIMEOUT),
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            min_delay,
            delay: min_delay,
            last_request: None,
            max_retries: 4,
            timeout_growth: 2.0,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
            handlers: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = build_client(self.proxy.as_deref(), timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_growth(mut self, growth: f64) -> Self {
        self.timeout_growth = growth.max(1.0);
        self
    }

    pub fn with_retry_statuses(mut self, statuses: &[u16]) -> Self {
        self.retry_statuses = statuses.to_vec();
        self
    }

    pub fn with_proxy(mut self, proxy: Option<&str>) -> Self {
        self.switch_proxy(proxy);
        self
    }

    /// Replace the outbound proxy. The underlying client is rebuilt, so
    /// in-flight state is swapped atomically with respect to this instance.
    pub fn switch_proxy(&mut self, proxy: Option<&str>) {
        if self.proxy.as_deref() == proxy {
            return;
        }
        self.proxy = proxy.map(String::from);
        self.client = build_client(proxy, self.timeout);
    }

    /// Register a handler invoked when a response carries `status`.
    ///
    /// The returned delta is merged into one uncounted retry. Used for
    /// auth-token refresh flows (Dimensions JWT on 401).
    pub fn register_status_handler(
        &mut self,
        status: u16,
        handler: impl FnMut(&ApiResponse) -> Result<RequestDelta, FetchError> + Send + 'static,
    ) {
        self.handlers.insert(status, Box::new(handler));
    }

    /// Convenience GET.
    pub fn get(&mut self, url: &str, params: &[(&str, &str)]) -> Result<ApiResponse, FetchError> {
        let mut spec = RequestSpec::get(url);
        for (k, v) in params {
            spec = spec.param(*k, *v);
        }
        self.execute(&spec)
    }

    /// Execute one request with pacing, retry and status-handler hooks.
    pub fn execute(&mut self, spec: &RequestSpec) -> Result<ApiResponse, FetchError> {
        let mut spec = spec.clone();
        let mut attempts = 0u32;
        let mut handled: HashSet<u16> = HashSet::new();

        loop {
            self.pace();
            let result = self.dispatch(&spec);
            self.last_request = Some(Instant::now());

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    attempts += 1;
                    if attempts > self.max_retries {
                        return Err(e);
                    }
                    log::debug!(
                        "request failed ({e}), retry {attempts}/{} in {:?}",
                        self.max_retries,
                        self.delay
                    );
                    self.grow_delay();
                    continue;
                }
            };

            if (200..300).contains(&response.status) {
                self.delay = self.min_delay;
                return Ok(response);
            }

            // Handler statuses get one free, patched retry
            if self.handlers.contains_key(&response.status) && !handled.contains(&response.status) {
                handled.insert(response.status);
                let handler = self.handlers.get_mut(&response.status).unwrap();
                let delta = handler(&response)?;
                delta.apply(&mut spec);
                log::debug!("status handler for {} patched the request", response.status);
                continue;
            }

            if self.retry_statuses.contains(&response.status) {
                attempts += 1;
                if attempts > self.max_retries {
                    return Err(FetchError::RetryExhausted {
                        status: response.status,
                        attempts: self.max_retries,
                    });
                }
                log::debug!(
                    "HTTP {}, retry {attempts}/{} in {:?}",
                    response.status,
                    self.max_retries,
                    self.delay
                );
                self.grow_delay();
                continue;
            }

            return Err(FetchError::from_status(
                response.status,
                truncate(&response.body, 512),
            ));
        }
    }

    /// Sleep until the adaptive inter-request delay has elapsed.
    fn pace(&self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }

    // The grown delay takes effect through pace() on the next attempt.
    fn grow_delay(&mut self) {
        self.delay = self.delay.mul_f64(self.timeout_growth);
    }

    fn dispatch(&self, spec: &RequestSpec) -> Result<ApiResponse, FetchError> {
        SHARED_RUNTIME.handle().block_on(async {
            let mut request = self.client.request(spec.method.clone(), &spec.url);
            if !spec.params.is_empty() {
                request = request.query(&spec.params);
            }
            for (key, value) in &spec.headers {
                request = request.header(key, value);
            }
            request = match &spec.body {
                Some(Body::Text(text)) => request.body(text.clone()),
                Some(Body::Json(json)) => request
                    .header("Content-Type", "application/json")
                    .body(json.to_string()),
                None => request,
            };

            let response = request.send().await.map_err(FetchError::from_reqwest)?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
                })
                .collect();
            let body = response.text().await.map_err(FetchError::from_reqwest)?;

            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn build_client(proxy: Option<&str>, timeout: Duration) -> reqwest::Client {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .pool_max_idle_per_host(4);
    if let Some(proxy_url) = proxy {
        if let Ok(proxy) = reqwest::Proxy::all(proxy_url) {
            builder = builder.proxy(proxy);
        } else {
            log::warn!("ignoring invalid proxy url");
        }
    }
    builder.build().expect("failed to build HTTP client")
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
