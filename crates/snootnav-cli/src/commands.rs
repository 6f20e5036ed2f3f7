//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use url::Url;

use snootnav::{
    Applied, Fetcher, HtmlPage, HttpFetcher, Interceptor, InterceptorConfig, LinkAction,
    LinkDecision, LoadTarget,
};

/// Result of `snootnav follow`.
#[derive(Debug, Serialize)]
pub struct FollowReport {
    pub href: String,
    pub intercepted: bool,
    pub default_prevented: bool,
    pub container: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

pub async fn follow(
    config: InterceptorConfig,
    page_url: &str,
    href: &str,
    full: bool,
    json: bool,
) -> Result<()> {
    let fetcher: Arc<dyn Fetcher> =
        Arc::new(HttpFetcher::new(&config).context("failed to build HTTP client")?);
    let (mut page, interceptor) = open_page(fetcher, config, page_url).await?;

    let mut event = page
        .click(&anchor_selector(href))
        .with_context(|| format!("no link with href '{href}' on {page_url}"))?;
    let applied = interceptor
        .follow(&mut page, &mut event)
        .await
        .with_context(|| format!("navigation to '{href}' failed"))?;

    let report = FollowReport {
        href: href.to_string(),
        intercepted: applied.is_some(),
        default_prevented: event.default_prevented(),
        container: page.container_html(interceptor.container())?,
        page: full.then(|| page.html()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match applied {
        None => eprintln!("'{href}' is not intercepted; the browser would handle it"),
        Some(Applied::Superseded) => eprintln!("navigation to '{href}' was superseded"),
        Some(Applied::Replaced) => {}
    }
    println!("{}", report.page.as_deref().unwrap_or(&report.container));
    Ok(())
}

/// Result of `snootnav load`.
#[derive(Debug, Serialize)]
pub struct LoadReport {
    pub target: LoadTarget,
    pub source_url: String,
    pub container: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

pub async fn load(
    config: InterceptorConfig,
    page_url: &str,
    instruction: &str,
    full: bool,
    json: bool,
) -> Result<()> {
    let target = LoadTarget::parse(instruction);
    if target.url.is_empty() {
        anyhow::bail!("load instruction is empty");
    }
    let fetcher: Arc<dyn Fetcher> =
        Arc::new(HttpFetcher::new(&config).context("failed to build HTTP client")?);
    let (mut page, interceptor) = open_page(fetcher, config, page_url).await?;

    let nav = interceptor
        .navigate(&page, &target)
        .with_context(|| format!("cannot load '{target}'"))?;
    let fragment = interceptor
        .load(&nav)
        .await
        .with_context(|| format!("loading '{target}' failed"))?;
    let source_url = fragment.source_url.to_string();
    interceptor.apply(&mut page, fragment)?;

    let report = LoadReport {
        target: nav.target,
        source_url,
        container: page.container_html(interceptor.container())?,
        page: full.then(|| page.html()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.page.as_deref().unwrap_or(&report.container));
    }
    Ok(())
}

pub async fn links(config: InterceptorConfig, page_url: &str, json: bool) -> Result<()> {
    let fetcher: Arc<dyn Fetcher> =
        Arc::new(HttpFetcher::new(&config).context("failed to build HTTP client")?);
    let (page, interceptor) = open_page(fetcher, config, page_url).await?;
    let decisions = interceptor.links(&page)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&decisions)?);
    } else {
        for line in render_links(&decisions) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn open_page(
    fetcher: Arc<dyn Fetcher>,
    config: InterceptorConfig,
    page_url: &str,
) -> Result<(HtmlPage, Interceptor)> {
    let url = Url::parse(page_url).with_context(|| format!("invalid page URL '{page_url}'"))?;
    let page = HtmlPage::fetch(fetcher.as_ref(), &url)
        .await
        .with_context(|| format!("failed to load {url}"))?;
    tracing::info!(url = %url, "page loaded");
    let interceptor = Interceptor::attach(&page, fetcher, config)
        .with_context(|| format!("failed to bind container on {url}"))?;
    Ok((page, interceptor))
}

/// CSS selector matching anchors whose href is exactly `href`.
fn anchor_selector(href: &str) -> String {
    let escaped = href.replace('\\', "\\\\").replace('"', "\\\"");
    format!("a[href=\"{escaped}\"]")
}

fn render_links(decisions: &[LinkDecision]) -> Vec<String> {
    decisions
        .iter()
        .map(|d| {
            let action = match d.action {
                LinkAction::Intercept => "intercept",
                LinkAction::Passthrough => "pass",
            };
            let href = d.href.as_deref().unwrap_or("(no href)");
            if d.text.is_empty() {
                format!("{action:<10} {href}")
            } else {
                format!("{action:<10} {href}  {}", d.text)
            }
        })
        .collect()
}
