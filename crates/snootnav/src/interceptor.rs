//! Navigation interceptor: a single delegated click handler that swaps the
//! container region for the same region of the linked page.
//!
//! Handling a click is split in three so the page is only borrowed mutably
//! for the splice:
//!
//! 1. [`Interceptor::on_click`] decides synchronously, prevents the default
//!    action and hands out a [`Navigation`] ticket.
//! 2. [`Interceptor::load`] fetches and extracts the fragment.
//! 3. [`Interceptor::apply`] splices it in, unless a later click has been
//!    intercepted in the meantime.
//!
//! [`Interceptor::navigate`] starts the same pipeline from an explicit
//! [`LoadTarget`] instead of a click.

use crate::config::InterceptorConfig;
use crate::fetch::{extract_fragment, Fetcher};
use crate::page::{ClickEvent, Container, HtmlPage, NodeHandle};
use crate::types::{parse_selector, LoadTarget, NavError, NavResult};
use scraper::Selector;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

/// What the handler did with a click.
#[derive(Debug)]
pub enum ClickOutcome {
    /// Target is not inside a navigable element under the delegate root.
    Ignored,
    /// Navigable, but left to the browser (e.g. `mailto:` or no href).
    Passthrough { href: Option<String> },
    /// Default prevented, fragment load pending.
    Intercepted(Navigation),
}

/// A pending fragment load for one intercepted click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub ticket: u64,
    /// The href as written on the anchor.
    pub href: String,
    /// Absolute URL the request goes to.
    pub url: Url,
    pub target: LoadTarget,
}

/// Extracted content ready to be spliced into the container.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub ticket: u64,
    pub source_url: Url,
    pub html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Replaced,
    /// A later click was intercepted before this fragment arrived.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkAction {
    Intercept,
    Passthrough,
}

/// How a click on one link would be handled.
#[derive(Debug, Clone, Serialize)]
pub struct LinkDecision {
    pub href: Option<String>,
    pub text: String,
    pub action: LinkAction,
}

/// The delegated click handler. Owns the container reference.
pub struct Interceptor {
    container: Container,
    fetcher: Arc<dyn Fetcher>,
    config: InterceptorConfig,
    delegate_root: Selector,
    navigable: Selector,
    issued: AtomicU64,
}

impl Interceptor {
    pub fn new(
        container: Container,
        fetcher: Arc<dyn Fetcher>,
        config: InterceptorConfig,
    ) -> NavResult<Self> {
        let delegate_root = parse_selector(&config.delegate_root)?;
        let navigable = parse_selector(&config.navigable_selector)?;
        Ok(Self {
            container,
            fetcher,
            config,
            delegate_root,
            navigable,
            issued: AtomicU64::new(0),
        })
    }

    /// Bind the configured container on `page` and build an interceptor for it.
    pub fn attach(
        page: &HtmlPage,
        fetcher: Arc<dyn Fetcher>,
        config: InterceptorConfig,
    ) -> NavResult<Self> {
        let container = page.bind_container(&config.container_selector)?;
        Self::new(container, fetcher, config)
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn classify_href(&self, href: Option<&str>) -> LinkAction {
        match href {
            Some(href) if !self.config.is_passthrough(href) => LinkAction::Intercept,
            _ => LinkAction::Passthrough,
        }
    }

    /// Synchronous part of click handling.
    ///
    /// Intercepted clicks always have their default prevented, even if the
    /// href later fails to resolve or load.
    pub fn on_click(&self, page: &HtmlPage, event: &mut ClickEvent) -> NavResult<ClickOutcome> {
        let Some(anchor) =
            page.delegate_target(event.target(), &self.delegate_root, &self.navigable)
        else {
            return Ok(ClickOutcome::Ignored);
        };

        let href = page.attr(&anchor, "href");
        let href = match (self.classify_href(href.as_deref()), href) {
            (LinkAction::Intercept, Some(href)) => href,
            (_, href) => {
                tracing::debug!(href = href.as_deref().unwrap_or(""), "not intercepting link");
                return Ok(ClickOutcome::Passthrough { href });
            }
        };

        event.prevent_default();
        let nav = self.navigate(page, &LoadTarget::new(href, self.container.selector()))?;
        tracing::debug!(ticket = nav.ticket, target = %nav.target, "intercepted click");
        Ok(ClickOutcome::Intercepted(nav))
    }

    /// Start a navigation to an explicit `"<url> <selector>"` target without a
    /// click. The url resolves against the page's URL. A target with no
    /// selector takes the whole body of the response.
    ///
    /// Takes a ticket like an intercepted click does, so it supersedes any
    /// navigation issued before it.
    pub fn navigate(&self, page: &HtmlPage, target: &LoadTarget) -> NavResult<Navigation> {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let url = resolve_href(page.url(), &target.url)?;
        Ok(Navigation {
            ticket,
            href: target.url.clone(),
            target: LoadTarget {
                url: url.to_string(),
                selector: target.selector.clone(),
            },
            url,
        })
    }

    /// Fetch the linked document and extract the container region from it.
    pub async fn load(&self, nav: &Navigation) -> NavResult<Fragment> {
        let doc = self.fetcher.fetch(&nav.url).await.map_err(|e| {
            tracing::warn!(url = %nav.url, error = %e, "fragment fetch failed");
            e
        })?;

        let selector = nav.target.selector.as_deref().unwrap_or("body");
        let html =
            extract_fragment(&doc.body, selector, doc.final_url.as_str()).map_err(|e| {
                tracing::warn!(url = %doc.final_url, error = %e, "fragment extraction failed");
                e
            })?;

        Ok(Fragment {
            ticket: nav.ticket,
            source_url: doc.final_url,
            html,
        })
    }

    /// Splice a loaded fragment into the container if its click is still the
    /// most recent intercepted one.
    pub fn apply(&self, page: &mut HtmlPage, fragment: Fragment) -> NavResult<Applied> {
        let latest = self.issued.load(Ordering::SeqCst);
        if fragment.ticket != latest {
            tracing::debug!(
                ticket = fragment.ticket,
                latest,
                url = %fragment.source_url,
                "dropping superseded navigation"
            );
            return Ok(Applied::Superseded);
        }

        page.replace_children(&self.container, &fragment.html, self.config.strip_scripts)?;
        tracing::info!(url = %fragment.source_url, "navigation applied");
        Ok(Applied::Replaced)
    }

    /// Handle a click end to end. `None` when the click was not intercepted.
    pub async fn follow(
        &self,
        page: &mut HtmlPage,
        event: &mut ClickEvent,
    ) -> NavResult<Option<Applied>> {
        let nav = match self.on_click(page, event)? {
            ClickOutcome::Intercepted(nav) => nav,
            ClickOutcome::Ignored | ClickOutcome::Passthrough { .. } => return Ok(None),
        };
        let fragment = self.load(&nav).await?;
        self.apply(page, fragment).map(Some)
    }

    /// Every navigable element the delegated listener would see, with the
    /// action a click on it would take.
    pub fn links(&self, page: &HtmlPage) -> NavResult<Vec<LinkDecision>> {
        let mut decisions = Vec::new();
        for handle in page.find_all(&self.config.navigable_selector)? {
            if !self.is_delegated(page, &handle) {
                continue;
            }
            let href = page.attr(&handle, "href");
            decisions.push(LinkDecision {
                action: self.classify_href(href.as_deref()),
                text: page.text(&handle).unwrap_or_default(),
                href,
            });
        }
        Ok(decisions)
    }

    fn is_delegated(&self, page: &HtmlPage, handle: &NodeHandle) -> bool {
        page.delegate_target(handle, &self.delegate_root, &self.navigable)
            .as_ref()
            == Some(handle)
    }
}

fn resolve_href(base: Option<&Url>, href: &str) -> NavResult<Url> {
    match base {
        Some(base) => Ok(base.join(href)?),
        None => Url::parse(href).map_err(|e| NavError::InvalidUrl(format!("{href}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchedDocument;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const HOME: &str = r#"<!DOCTYPE html>
<html><head><title>snootforge</title></head>
<body>
  <nav>
    <a id="about" href="/about">about</a>
    <a id="pricing" href="/pricing"><span id="pricing-label">pricing</span></a>
    <a id="broken" href="/missing">missing</a>
    <a id="bare" href="/bare">bare</a>
    <a id="noref">no href</a>
    <a id="mail" href="mailto:test@example.com">mail</a>
  </nav>
  <main><h1>Repositories</h1></main>
</body></html>"#;

    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn with(mut self, path: &str, body: &str) -> Self {
            self.pages
                .insert(format!("https://forge.test{path}"), body.to_string());
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &Url) -> NavResult<FetchedDocument> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.pages.get(url.as_str()) {
                Some(body) => Ok(FetchedDocument {
                    url: url.clone(),
                    final_url: url.clone(),
                    body: body.clone(),
                }),
                None => Err(NavError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    fn forge() -> StubFetcher {
        StubFetcher::default()
            .with(
                "/about",
                "<html><body><main><h1>About</h1></main></body></html>",
            )
            .with(
                "/pricing",
                "<html><body><main><h1>Pricing</h1><p>free</p></main></body></html>",
            )
            .with(
                "/contact",
                "<html><body><main><h1>Contact</h1></main></body></html>",
            )
            .with("/bare", "<html><body><div>no main here</div></body></html>")
            .with(
                "/repos",
                r#"<html><body><main><h1>Repos</h1><a id="next" href="/repos/2">more</a></main></body></html>"#,
            )
            .with(
                "/repos/2",
                r#"<html><body><main><h1>Repos, page 2</h1><a id="next" href="/repos">back</a></main></body></html>"#,
            )
    }

    fn setup(fetcher: Arc<StubFetcher>) -> (HtmlPage, Interceptor) {
        let page = HtmlPage::parse_with_url(HOME, Url::parse("https://forge.test/").unwrap());
        let interceptor =
            Interceptor::attach(&page, fetcher, InterceptorConfig::default()).unwrap();
        (page, interceptor)
    }

    fn container_html(page: &HtmlPage, interceptor: &Interceptor) -> String {
        page.container_html(interceptor.container()).unwrap()
    }

    #[tokio::test]
    async fn test_mailto_is_not_intercepted() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher.clone());
        let mut event = page.click("#mail").unwrap();

        let outcome = interceptor.follow(&mut page, &mut event).await.unwrap();

        assert!(outcome.is_none());
        assert!(!event.default_prevented());
        assert!(fetcher.requests().is_empty());
        assert_eq!(container_html(&page, &interceptor), "<h1>Repositories</h1>");
    }

    #[test]
    fn test_anchor_without_href_passes_through() {
        let fetcher = Arc::new(forge());
        let (page, interceptor) = setup(fetcher.clone());
        let mut event = page.click("#noref").unwrap();

        let outcome = interceptor.on_click(&page, &mut event).unwrap();

        assert!(matches!(outcome, ClickOutcome::Passthrough { href: None }));
        assert!(!event.default_prevented());
    }

    #[tokio::test]
    async fn test_intercepts_and_replaces_container() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher.clone());
        let mut event = page.click("#about").unwrap();

        let outcome = interceptor.follow(&mut page, &mut event).await.unwrap();

        assert_eq!(outcome, Some(Applied::Replaced));
        assert!(event.default_prevented());
        assert_eq!(fetcher.requests(), vec!["https://forge.test/about"]);
        assert_eq!(container_html(&page, &interceptor), "<h1>About</h1>");
        // The page's own URL does not change.
        assert_eq!(page.url().unwrap().as_str(), "https://forge.test/");
    }

    #[tokio::test]
    async fn test_click_on_anchor_descendant() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher);
        let mut event = page.click("#pricing-label").unwrap();

        let outcome = interceptor.follow(&mut page, &mut event).await.unwrap();

        assert_eq!(outcome, Some(Applied::Replaced));
        assert_eq!(
            container_html(&page, &interceptor),
            "<h1>Pricing</h1><p>free</p>"
        );
    }

    #[test]
    fn test_click_outside_anchor_is_ignored() {
        let fetcher = Arc::new(forge());
        let (page, interceptor) = setup(fetcher.clone());
        let mut event = page.click("h1").unwrap();

        let outcome = interceptor.on_click(&page, &mut event).unwrap();

        assert!(matches!(outcome, ClickOutcome::Ignored));
        assert!(!event.default_prevented());
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_still_prevents_default() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher);
        let mut event = page.click("#broken").unwrap();

        let err = interceptor.follow(&mut page, &mut event).await.unwrap_err();

        assert!(matches!(err, NavError::Status { status: 404, .. }));
        assert!(event.default_prevented());
        assert_eq!(container_html(&page, &interceptor), "<h1>Repositories</h1>");
    }

    #[tokio::test]
    async fn test_response_without_container() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher);
        let mut event = page.click("#bare").unwrap();

        let err = interceptor.follow(&mut page, &mut event).await.unwrap_err();

        assert!(matches!(err, NavError::ContainerNotFound { .. }));
        assert!(event.default_prevented());
        assert_eq!(container_html(&page, &interceptor), "<h1>Repositories</h1>");
    }

    #[tokio::test]
    async fn test_dynamically_added_anchor_is_intercepted() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher);
        let nav = page.find("nav").unwrap().unwrap();
        page.append_html(&nav, r#"<a id="contact" href="/contact">Contact</a>"#)
            .unwrap();
        let mut event = page.click("#contact").unwrap();

        let outcome = interceptor.follow(&mut page, &mut event).await.unwrap();

        assert_eq!(outcome, Some(Applied::Replaced));
        assert!(event.default_prevented());
        assert_eq!(container_html(&page, &interceptor), "<h1>Contact</h1>");
    }

    #[tokio::test]
    async fn test_link_inside_swapped_fragment_is_intercepted() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher.clone());
        let container = interceptor.container().handle().clone();
        page.append_html(&container, r#"<a id="repos" href="/repos">repos</a>"#)
            .unwrap();
        let mut first = page.click("#repos").unwrap();
        assert_eq!(
            interceptor.follow(&mut page, &mut first).await.unwrap(),
            Some(Applied::Replaced)
        );

        // The anchor only exists in the content that was just spliced in.
        let mut second = page.click("#next").unwrap();
        let outcome = interceptor.follow(&mut page, &mut second).await.unwrap();

        assert_eq!(outcome, Some(Applied::Replaced));
        assert!(second.default_prevented());
        assert_eq!(
            fetcher.requests(),
            vec!["https://forge.test/repos", "https://forge.test/repos/2"]
        );
        let swapped = container_html(&page, &interceptor);
        assert!(swapped.starts_with("<h1>Repos, page 2</h1><a "));
        assert!(swapped.ends_with(">back</a>"));
        let heading = page.find("h1").unwrap().unwrap();
        assert_eq!(page.text(&heading).as_deref(), Some("Repos, page 2"));
        assert_eq!(page.find_all("#next").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_navigate_with_selector() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher.clone());

        let nav = interceptor
            .navigate(&page, &LoadTarget::parse("/pricing main p"))
            .unwrap();
        assert_eq!(nav.href, "/pricing");
        assert_eq!(nav.target.to_string(), "https://forge.test/pricing main p");
        let fragment = interceptor.load(&nav).await.unwrap();

        assert_eq!(interceptor.apply(&mut page, fragment).unwrap(), Applied::Replaced);
        assert_eq!(container_html(&page, &interceptor), "free");
        assert_eq!(fetcher.requests(), vec!["https://forge.test/pricing"]);
    }

    #[tokio::test]
    async fn test_navigate_without_selector_takes_whole_body() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher);

        let nav = interceptor
            .navigate(&page, &LoadTarget::parse("/about"))
            .unwrap();
        assert_eq!(nav.target.selector, None);
        let fragment = interceptor.load(&nav).await.unwrap();
        interceptor.apply(&mut page, fragment).unwrap();

        assert_eq!(
            container_html(&page, &interceptor),
            "<main><h1>About</h1></main>"
        );
    }

    #[tokio::test]
    async fn test_navigate_supersedes_earlier_click() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher);
        let mut click = page.click("#about").unwrap();
        let ClickOutcome::Intercepted(clicked) = interceptor.on_click(&page, &mut click).unwrap()
        else {
            panic!("click not intercepted");
        };

        let scripted = interceptor
            .navigate(&page, &LoadTarget::parse("/contact main"))
            .unwrap();
        assert!(scripted.ticket > clicked.ticket);

        let stale = interceptor.load(&clicked).await.unwrap();
        assert_eq!(interceptor.apply(&mut page, stale).unwrap(), Applied::Superseded);
        let fresh = interceptor.load(&scripted).await.unwrap();
        assert_eq!(interceptor.apply(&mut page, fresh).unwrap(), Applied::Replaced);
        assert_eq!(container_html(&page, &interceptor), "<h1>Contact</h1>");
    }

    #[tokio::test]
    async fn test_latest_click_wins() {
        let fetcher = Arc::new(forge());
        let (mut page, interceptor) = setup(fetcher);

        let mut first = page.click("#about").unwrap();
        let mut second = page.click("#pricing").unwrap();
        let ClickOutcome::Intercepted(first_nav) = interceptor.on_click(&page, &mut first).unwrap()
        else {
            panic!("first click not intercepted");
        };
        let ClickOutcome::Intercepted(second_nav) =
            interceptor.on_click(&page, &mut second).unwrap()
        else {
            panic!("second click not intercepted");
        };

        // The second fetch resolves before the first.
        let second_fragment = interceptor.load(&second_nav).await.unwrap();
        assert_eq!(
            interceptor.apply(&mut page, second_fragment).unwrap(),
            Applied::Replaced
        );
        let first_fragment = interceptor.load(&first_nav).await.unwrap();
        assert_eq!(
            interceptor.apply(&mut page, first_fragment).unwrap(),
            Applied::Superseded
        );

        assert_eq!(
            container_html(&page, &interceptor),
            "<h1>Pricing</h1><p>free</p>"
        );
    }

    #[test]
    fn test_relative_href_without_page_url() {
        let fetcher = Arc::new(forge());
        let page = HtmlPage::parse(HOME);
        let interceptor =
            Interceptor::attach(&page, fetcher.clone(), InterceptorConfig::default()).unwrap();
        let mut event = page.click("#about").unwrap();

        let err = interceptor.on_click(&page, &mut event).unwrap_err();

        assert!(matches!(err, NavError::InvalidUrl(_)));
        assert!(event.default_prevented());
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetched_scripts_are_dropped() {
        let fetcher = Arc::new(StubFetcher::default().with(
            "/about",
            "<html><body><main><h1>About</h1><script>track()</script></main></body></html>",
        ));
        let (mut page, interceptor) = setup(fetcher);
        let mut event = page.click("#about").unwrap();

        interceptor.follow(&mut page, &mut event).await.unwrap();

        assert_eq!(container_html(&page, &interceptor), "<h1>About</h1>");
    }

    #[test]
    fn test_links_classification() {
        let fetcher = Arc::new(forge());
        let (page, interceptor) = setup(fetcher);

        let links = interceptor.links(&page).unwrap();

        assert_eq!(links.len(), 6);
        let mail = links
            .iter()
            .find(|l| l.href.as_deref() == Some("mailto:test@example.com"))
            .unwrap();
        assert_eq!(mail.action, LinkAction::Passthrough);
        let pricing = links
            .iter()
            .find(|l| l.href.as_deref() == Some("/pricing"))
            .unwrap();
        assert_eq!(pricing.action, LinkAction::Intercept);
        assert_eq!(pricing.text, "pricing");
        assert!(links
            .iter()
            .any(|l| l.href.is_none() && l.action == LinkAction::Passthrough));
    }

    #[test]
    fn test_resolve_href() {
        let base = Url::parse("https://forge.test/alice/repo/tree/main").unwrap();
        assert_eq!(
            resolve_href(Some(&base), "../log/main").unwrap().as_str(),
            "https://forge.test/alice/repo/log/main"
        );
        assert_eq!(
            resolve_href(None, "https://other.test/x").unwrap().as_str(),
            "https://other.test/x"
        );
    }
}
