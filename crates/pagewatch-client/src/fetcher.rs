use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use pagewatch_core::error::AppError;
use pagewatch_core::models::{ContentMode, FetchedPage, RenderMode, Target};
use pagewatch_core::proxy_pool::ProxyPool;
use pagewatch_core::traits::PageFetcher;
use reqwest::{Client, RequestBuilder};
use url::Url;

use crate::browser::BrowserRenderer;
use crate::extract::extract_page;
use crate::json_path::extract_json;
use crate::user_agent::resolve_user_agent;

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const JSON_ACCEPT: &str = "application/json";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

/// Timeouts and browser location for [`WatchFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Default request timeout, overridable per target.
    pub timeout: Duration,
    /// Upper bound for browser navigation and network-idle waits.
    pub navigation_timeout: Duration,
    pub chrome_bin: Option<PathBuf>,
    /// Block requests to private/reserved addresses.
    pub ssrf_protection: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(30),
            chrome_bin: None,
            ssrf_protection: true,
        }
    }
}

impl FetcherConfig {
    /// Reads `PAGEWATCH_FETCH_TIMEOUT_SECS`, `PAGEWATCH_NAV_TIMEOUT_SECS`, `CHROME_BIN`
    /// and `PAGEWATCH_ALLOW_PRIVATE_URLS`.
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let allow_private = match std::env::var("PAGEWATCH_ALLOW_PRIVATE_URLS") {
            Ok(raw) => parse_flag("PAGEWATCH_ALLOW_PRIVATE_URLS", &raw)?,
            Err(_) => false,
        };
        Ok(Self {
            timeout: env_secs("PAGEWATCH_FETCH_TIMEOUT_SECS")?.unwrap_or(defaults.timeout),
            navigation_timeout: env_secs("PAGEWATCH_NAV_TIMEOUT_SECS")?
                .unwrap_or(defaults.navigation_timeout),
            chrome_bin: std::env::var("CHROME_BIN").ok().map(PathBuf::from),
            ssrf_protection: !allow_private,
        })
    }

    /// Allow private/reserved addresses (CLI use, tests against local servers).
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::ConfigError(format!(
            "{name} must be true or false, got '{raw}'"
        ))),
    }
}

fn env_secs(name: &str) -> Result<Option<Duration>, AppError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| AppError::ConfigError(format!("{name} must be a number of seconds: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Fetcher implementing the static, browser and JSON strategies.
///
/// Proxies come from the target override or the shared [`ProxyPool`]; only
/// pool-sourced proxies get their outcome reported back.
#[derive(Clone)]
pub struct WatchFetcher {
    client: Client,
    config: FetcherConfig,
    proxies: ProxyPool,
    browser: BrowserRenderer,
}

impl WatchFetcher {
    pub fn new(config: FetcherConfig, proxies: ProxyPool) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        let browser = BrowserRenderer::new(config.chrome_bin.clone(), config.navigation_timeout);

        Ok(Self {
            client,
            config,
            proxies,
            browser,
        })
    }

    pub fn proxies(&self) -> &ProxyPool {
        &self.proxies
    }

    pub fn browser(&self) -> &BrowserRenderer {
        &self.browser
    }

    fn timeout_for(&self, target: &Target) -> Duration {
        target
            .fetch_config
            .as_ref()
            .and_then(|c| c.timeout())
            .unwrap_or(self.config.timeout)
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, AppError> {
        let Some(proxy) = proxy else {
            return Ok(self.client.clone());
        };
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| AppError::ConfigError(format!("Invalid proxy URL: {e}")))?;
        Client::builder()
            .timeout(self.config.timeout)
            .proxy(proxy)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))
    }

    fn request(&self, client: &Client, target: &Target, accept: &str) -> RequestBuilder {
        let fetch_config = target.fetch_config.as_ref();
        let user_agent = resolve_user_agent(fetch_config.and_then(|c| c.user_agent.as_deref()));

        let mut request = client
            .get(&target.url)
            .timeout(self.timeout_for(target))
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(reqwest::header::ACCEPT, accept)
            .header(reqwest::header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE);

        if let Some(config) = fetch_config {
            for (name, value) in &config.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(cookies) = &config.cookies {
                request = request.header(reqwest::header::COOKIE, cookies.as_str());
            }
        }
        request
    }

    async fn get(
        &self,
        target: &Target,
        proxy: Option<&str>,
        accept: &str,
    ) -> Result<(u16, String, u64), AppError> {
        let client = self.client_for(proxy)?;
        let timeout_secs = self.timeout_for(target).as_secs();
        let started = Instant::now();

        let response = self
            .request(&client, target, accept)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;
        let response_time_ms = started.elapsed().as_millis() as u64;
        let status = response.status().as_u16();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(timeout_secs)
            } else {
                AppError::HttpError(format!("Failed to read response body: {e}"))
            }
        })?;

        Ok((status, body, response_time_ms))
    }

    async fn fetch_static(&self, target: &Target, proxy: Option<&str>) -> Result<FetchedPage, AppError> {
        let (status_code, body, response_time_ms) = self.get(target, proxy, HTML_ACCEPT).await?;
        let extracted = extract_page(&body, target.selector.as_deref());
        Ok(FetchedPage {
            content: extracted.content,
            title: extracted.title,
            status_code,
            response_time_ms,
        })
    }

    async fn fetch_json(&self, target: &Target, proxy: Option<&str>) -> Result<FetchedPage, AppError> {
        let (status_code, body, response_time_ms) = self.get(target, proxy, JSON_ACCEPT).await?;
        let content = extract_json(&body, target.selector.as_deref())?;
        Ok(FetchedPage {
            content,
            title: String::new(),
            status_code,
            response_time_ms,
        })
    }

    async fn fetch_with(&self, target: &Target, proxy: Option<&str>) -> Result<FetchedPage, AppError> {
        if target.content_mode() == ContentMode::Json {
            return self.fetch_json(target, proxy).await;
        }

        match target.render_mode {
            RenderMode::Static => self.fetch_static(target, proxy).await,
            RenderMode::Browser => match self.browser.render(target, proxy).await {
                Err(AppError::RenderUnavailable(reason)) => {
                    tracing::warn!(
                        target_id = %target.id,
                        %reason,
                        "Browser rendering unavailable, falling back to static fetch"
                    );
                    self.fetch_static(target, proxy).await
                }
                result => result,
            },
        }
    }
}

impl PageFetcher for WatchFetcher {
    async fn fetch(&self, target: &Target) -> Result<FetchedPage, AppError> {
        let (proxy, pooled) = match &target.proxy {
            Some(proxy) => (Some(proxy.clone()), false),
            None => (self.proxies.get_next(), true),
        };

        if self.config.ssrf_protection {
            // A proxy resolves the host itself; a local lookup would not match what it sees.
            validate_url(&target.url, proxy.is_none()).await?;
        }

        let result = self.fetch_with(target, proxy.as_deref()).await;

        if pooled && let Some(proxy) = &proxy {
            match &result {
                Err(e) if is_transport_error(e) => {
                    tracing::debug!(target_id = %target.id, error = %e, "Fetch through pooled proxy failed");
                    self.proxies.report_failure(proxy);
                }
                // The proxy delivered a response, even if the content was unusable.
                _ => self.proxies.report_success(proxy),
            }
        }

        result
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Failures that point at the network path rather than the page.
fn is_transport_error(error: &AppError) -> bool {
    matches!(
        error,
        AppError::NetworkError(_) | AppError::Timeout(_) | AppError::HttpError(_)
    )
}

/// Reject non-HTTP schemes and hosts that resolve to private/reserved addresses.
///
/// With `resolve` off only literal IP hosts are checked.
async fn validate_url(url: &str, resolve: bool) -> Result<(), AppError> {
    let parsed = Url::parse(url).map_err(|e| AppError::HttpError(format!("Invalid URL: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::HttpError(format!(
            "URL scheme '{}' is not allowed (only http/https)",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::HttpError("URL has no host".to_string()))?;
    let blocked = || AppError::HttpError(format!("Blocked private address for host {host}"));

    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        return if is_private_ip(ip) { Err(blocked()) } else { Ok(()) };
    }

    if !resolve {
        return Ok(());
    }

    let port = parsed.port_or_known_default().unwrap_or(80);
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AppError::NetworkError(format!("DNS resolution failed for {host}: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(AppError::NetworkError(format!(
            "DNS resolution returned no addresses for {host}"
        )));
    }
    if addrs.iter().any(|a| is_private_ip(a.ip())) {
        return Err(blocked());
    }
    Ok(())
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || (a == 100 && (b & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xFFC0) == 0xFE80
                || (first & 0xFE00) == 0xFC00
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}
