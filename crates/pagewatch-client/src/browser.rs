//! Headless Chromium rendering for JavaScript-heavy targets.
//!
//! One Chromium process is launched lazily and shared by every clone of
//! [`BrowserRenderer`]. Each render runs in its own incognito browser
//! context, so cookies and the per-context proxy never leak between targets.
//! Without the `browser` feature every render reports
//! [`AppError::RenderUnavailable`] and the fetcher falls back to static mode.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pagewatch_core::error::AppError;
use pagewatch_core::models::{FetchedPage, Target};

/// How long `wait_for_selector` may poll before rendering continues anyway.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
const SELECTOR_WAIT: Duration = Duration::from_secs(10);
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Resolves once no new resource has loaded for 500ms.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
const NETWORK_IDLE_JS: &str = r#"new Promise(resolve => {
  let timer = setTimeout(done, 500);
  function done() { observer.disconnect(); resolve(true); }
  const observer = new PerformanceObserver(() => {
    clearTimeout(timer);
    timer = setTimeout(done, 500);
  });
  observer.observe({ entryTypes: ['resource'] });
})"#;

#[derive(Clone)]
pub struct BrowserRenderer {
    inner: Arc<RendererInner>,
}

#[cfg_attr(not(feature = "browser"), allow(dead_code))]
struct RendererInner {
    chrome_bin: Option<PathBuf>,
    navigation_timeout: Duration,
    #[cfg(feature = "browser")]
    session: tokio::sync::Mutex<Option<session::BrowserSession>>,
}

impl BrowserRenderer {
    /// No process is started until the first render.
    pub fn new(chrome_bin: Option<PathBuf>, navigation_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RendererInner {
                chrome_bin,
                navigation_timeout,
                #[cfg(feature = "browser")]
                session: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Locate a Chrome/Chromium binary.
    ///
    /// An explicitly configured path must exist. Otherwise the snap-internal
    /// binary is preferred over the `/snap/bin` wrapper, which rejects
    /// headless flags, followed by flatpak and common system locations.
    /// `None` leaves the lookup to chromiumoxide.
    #[cfg_attr(not(feature = "browser"), allow(dead_code))]
    fn find_chrome_binary(&self) -> Result<Option<PathBuf>, AppError> {
        if let Some(bin) = &self.inner.chrome_bin {
            if bin.exists() {
                return Ok(Some(bin.clone()));
            }
            return Err(AppError::RenderUnavailable(format!(
                "Chrome binary not found at {}",
                bin.display()
            )));
        }

        const CANDIDATES: &[&str] = &[
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];
        Ok(CANDIDATES.iter().map(PathBuf::from).find(|p| p.exists()))
    }
}

#[cfg(not(feature = "browser"))]
impl BrowserRenderer {
    pub async fn render(&self, _target: &Target, _proxy: Option<&str>) -> Result<FetchedPage, AppError> {
        Err(AppError::RenderUnavailable(
            "built without the `browser` feature".to_string(),
        ))
    }

    pub async fn shutdown(&self) {}
}

#[cfg(feature = "browser")]
mod session {
    use std::sync::Arc;
    use std::time::Instant;

    use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
    use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
    use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
    use chromiumoxide::cdp::browser_protocol::target::{
        CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
    };
    use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::extract::extract_page;
    use crate::user_agent::resolve_user_agent;

    pub(super) struct BrowserSession {
        browser: Arc<Browser>,
        handler: JoinHandle<()>,
    }

    impl BrowserRenderer {
        /// Render a target in a fresh browser context and extract its text.
        pub async fn render(&self, target: &Target, proxy: Option<&str>) -> Result<FetchedPage, AppError> {
            let browser = self.acquire().await?;

            let context_id = browser
                .execute(CreateBrowserContextParams {
                    proxy_server: proxy.map(str::to_string),
                    ..Default::default()
                })
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to create browser context: {e}")))?
                .result
                .browser_context_id;

            let params = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(context_id.clone())
                .build()
                .map_err(AppError::Generic)?;

            let result = match browser.new_page(params).await {
                Ok(page) => {
                    let result = self.render_page(&page, target).await;
                    if let Err(e) = page.close().await {
                        tracing::debug!(error = %e, "Failed to close page");
                    }
                    result
                }
                Err(e) => Err(AppError::HttpError(format!("Failed to open page: {e}"))),
            };

            release_context(&browser, context_id).await;
            result
        }

        /// Close Chromium if it was started.
        pub async fn shutdown(&self) {
            let Some(session) = self.inner.session.lock().await.take() else {
                return;
            };
            if let Err(e) = session.browser.execute(CloseParams::default()).await {
                tracing::debug!(error = %e, "Browser close command failed");
            }
            session.handler.abort();
            tracing::info!("Browser shut down");
        }

        async fn acquire(&self) -> Result<Arc<Browser>, AppError> {
            let mut slot = self.inner.session.lock().await;

            if let Some(session) = slot.as_ref() {
                if !session.handler.is_finished() {
                    return Ok(session.browser.clone());
                }
                tracing::warn!("Browser connection lost, relaunching");
            }

            let session = self.launch().await?;
            let browser = session.browser.clone();
            *slot = Some(session);
            Ok(browser)
        }

        async fn launch(&self) -> Result<BrowserSession, AppError> {
            let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();
            if let Some(bin) = self.find_chrome_binary()? {
                tracing::info!("Using Chrome binary: {}", bin.display());
                builder = builder.chrome_executable(bin);
            }

            let config = builder
                .arg("--headless=new")
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .arg("--disable-extensions")
                .arg("--disable-popup-blocking")
                .arg("--disable-translate")
                .arg("--no-first-run")
                .build()
                .map_err(|e| AppError::RenderUnavailable(format!("Browser config error: {e}")))?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| AppError::RenderUnavailable(format!("Failed to launch browser: {e}")))?;

            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        tracing::warn!(error = %e, "Browser CDP handler error");
                        break;
                    }
                }
            });

            tracing::info!("Browser launched");
            Ok(BrowserSession {
                browser: Arc::new(browser),
                handler,
            })
        }

        async fn render_page(&self, page: &Page, target: &Target) -> Result<FetchedPage, AppError> {
            let nav_timeout = self.inner.navigation_timeout;
            let fetch_config = target.fetch_config.as_ref();

            let user_agent = resolve_user_agent(fetch_config.and_then(|c| c.user_agent.as_deref()));
            page.execute(SetUserAgentOverrideParams::new(user_agent))
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to set user agent: {e}")))?;

            if let Some(config) = fetch_config {
                let mut headers = serde_json::Map::new();
                for (name, value) in &config.headers {
                    headers.insert(name.clone(), value.clone().into());
                }
                if let Some(cookies) = &config.cookies {
                    headers.insert("Cookie".to_string(), cookies.clone().into());
                }
                if !headers.is_empty() {
                    page.execute(SetExtraHttpHeadersParams::new(Headers::new(
                        serde_json::Value::Object(headers),
                    )))
                    .await
                    .map_err(|e| AppError::HttpError(format!("Failed to set headers: {e}")))?;
                }
            }

            let started = Instant::now();
            tokio::time::timeout(nav_timeout, page.goto(target.url.as_str()))
                .await
                .map_err(|_| AppError::Timeout(nav_timeout.as_secs()))?
                .map_err(|e| AppError::HttpError(format!("Failed to navigate to {}: {e}", target.url)))?;
            let response_time_ms = started.elapsed().as_millis() as u64;

            let status_code = page
                .wait_for_navigation_response()
                .await
                .ok()
                .flatten()
                .and_then(|request| request.response.as_ref().map(|r| r.status));
            let status_code = navigation_status(status_code);

            wait_for_network_idle(page, nav_timeout).await;

            if let Some(selector) = target.wait_for_selector.as_deref() {
                wait_for_selector(page, selector).await;
            }

            let html = page
                .content()
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to read page content: {e}")))?;
            let extracted = extract_page(&html, target.selector.as_deref());

            Ok(FetchedPage {
                content: extracted.content,
                title: extracted.title,
                status_code,
                response_time_ms,
            })
        }
    }

    async fn wait_for_network_idle(page: &Page, limit: Duration) {
        let params = match EvaluateParams::builder()
            .expression(NETWORK_IDLE_JS)
            .await_promise(true)
            .return_by_value(true)
            .build()
        {
            Ok(params) => params,
            Err(e) => {
                tracing::debug!(error = %e, "Invalid network idle script");
                return;
            }
        };

        match tokio::time::timeout(limit, page.evaluate(params)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Network idle wait failed"),
            Err(_) => tracing::debug!("Network did not settle before the navigation timeout"),
        }
    }

    async fn wait_for_selector(page: &Page, selector: &str) {
        let deadline = Instant::now() + SELECTOR_WAIT;
        while Instant::now() < deadline {
            if page.find_element(selector).await.is_ok() {
                return;
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
        tracing::warn!(%selector, "Selector did not appear; extracting current DOM");
    }

    async fn release_context(browser: &Browser, context_id: BrowserContextId) {
        if let Err(e) = browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
        {
            tracing::debug!(error = %e, "Failed to dispose browser context");
        }
    }
}

/// Status recorded when no navigation response was captured.
pub const UNKNOWN_STATUS: u16 = 0;

#[cfg_attr(not(feature = "browser"), allow(dead_code))]
fn navigation_status(status: Option<i64>) -> u16 {
    status
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(UNKNOWN_STATUS)
}
