/// Smoke-test for browser rendering.
///
/// Launches a headless Chromium, renders <https://example.com> through the
/// full fetch pipeline and checks the extracted text.
///
/// Run with:
///   cargo run --example browser_smoke --features browser
use pagewatch_client::{FetcherConfig, WatchFetcher};
use pagewatch_core::models::{RenderMode, Target};
use pagewatch_core::proxy_pool::ProxyPool;
use pagewatch_core::traits::PageFetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let fetcher = WatchFetcher::new(FetcherConfig::from_env()?, ProxyPool::default())?;

    let mut target = Target::new("https://example.com", "Example");
    target.render_mode = RenderMode::Browser;
    target.wait_for_selector = Some("h1".into());

    println!("Rendering {} …", target.url);
    let page = fetcher.fetch(&target).await?;
    fetcher.browser().shutdown().await;

    assert_eq!(page.title, "Example Domain", "unexpected title");
    assert!(
        page.content.contains("Example Domain"),
        "Expected heading not found in extracted text"
    );

    println!(
        "OK: status {} in {} ms, {} chars",
        page.status_code,
        page.response_time_ms,
        page.content.len()
    );
    println!("{}", page.content);
    Ok(())
}
