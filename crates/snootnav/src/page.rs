//! In-memory page model the interceptor reads from and splices into.
//!
//! Wraps a `scraper` document. Nodes are addressed by [`NodeHandle`], a path of
//! child indices from the document root. The page only ever appends nodes or
//! replaces the children of an element, so a handle to an element stays valid
//! as long as that element and its ancestors are not themselves replaced.
//! Replacing children rebuilds the tree from its reachable nodes, so memory
//! does not grow with the number of navigations on a long-lived page.

use crate::fetch::Fetcher;
use crate::types::{parse_selector, NavError, NavResult};
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Location of an element in an [`HtmlPage`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle(Vec<usize>);

/// The region of the page that navigations replace.
///
/// Bound once with [`HtmlPage::bind_container`] and handed to the interceptor,
/// which is the only writer. Deliberately not `Clone`.
#[derive(Debug)]
pub struct Container {
    handle: NodeHandle,
    selector: String,
}

impl Container {
    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}

/// A click delivered to the page. Consumed synchronously by the handler.
#[derive(Debug, Clone)]
pub struct ClickEvent {
    target: NodeHandle,
    default_prevented: bool,
}

impl ClickEvent {
    pub fn new(target: NodeHandle) -> Self {
        Self {
            target,
            default_prevented: false,
        }
    }

    pub fn target(&self) -> &NodeHandle {
        &self.target
    }

    /// Suppress the browser's default action for this click.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// A parsed HTML page, optionally tied to the URL it was loaded from.
pub struct HtmlPage {
    html: Html,
    url: Option<Url>,
}

impl std::fmt::Debug for HtmlPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlPage")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

impl HtmlPage {
    /// Parse a full HTML document with no base URL.
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
            url: None,
        }
    }

    /// Parse a full HTML document loaded from `url`. Relative links resolve
    /// against it.
    pub fn parse_with_url(html: &str, url: Url) -> Self {
        Self {
            html: Html::parse_document(html),
            url: Some(url),
        }
    }

    /// Load the initial page through a fetcher.
    pub async fn fetch(fetcher: &dyn Fetcher, url: &Url) -> NavResult<Self> {
        let doc = fetcher.fetch(url).await?;
        Ok(Self::parse_with_url(&doc.body, doc.final_url))
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Serialize the whole document.
    pub fn html(&self) -> String {
        self.html.html()
    }

    /// First element matching `selector`, in document order.
    pub fn find(&self, selector: &str) -> NavResult<Option<NodeHandle>> {
        let sel = parse_selector(selector)?;
        Ok(self.html.select(&sel).next().map(handle_of))
    }

    /// All elements matching `selector`, in document order.
    pub fn find_all(&self, selector: &str) -> NavResult<Vec<NodeHandle>> {
        let sel = parse_selector(selector)?;
        Ok(self.html.select(&sel).map(handle_of).collect())
    }

    /// Resolve the container region. Fails if the page has no such element.
    pub fn bind_container(&self, selector: &str) -> NavResult<Container> {
        let handle = self
            .find(selector)?
            .ok_or_else(|| NavError::ContainerNotFound {
                selector: selector.to_string(),
                source_url: self.describe_url(),
            })?;
        Ok(Container {
            handle,
            selector: selector.to_string(),
        })
    }

    /// Build a click on the first element matching `selector`.
    pub fn click(&self, selector: &str) -> NavResult<ClickEvent> {
        self.find(selector)?
            .map(ClickEvent::new)
            .ok_or_else(|| NavError::NodeNotFound(selector.to_string()))
    }

    pub fn attr(&self, handle: &NodeHandle, name: &str) -> Option<String> {
        self.element(handle)
            .and_then(|el| el.value().attr(name))
            .map(str::to_string)
    }

    pub fn tag_name(&self, handle: &NodeHandle) -> Option<String> {
        self.element(handle).map(|el| el.value().name().to_string())
    }

    /// Concatenated, trimmed text content.
    pub fn text(&self, handle: &NodeHandle) -> Option<String> {
        self.element(handle)
            .map(|el| el.text().collect::<String>().trim().to_string())
    }

    pub fn inner_html(&self, handle: &NodeHandle) -> NavResult<String> {
        self.element(handle)
            .map(|el| el.inner_html())
            .ok_or_else(|| NavError::NodeNotFound(format!("{handle:?}")))
    }

    pub fn container_html(&self, container: &Container) -> NavResult<String> {
        self.inner_html(&container.handle)
    }

    /// Event delegation: walk from `target` towards the root and return the
    /// innermost element matching `filter` that sits strictly inside the
    /// nearest ancestor matching `root`. `None` when no such element exists or
    /// the target is not inside `root` at all.
    pub fn delegate_target(
        &self,
        target: &NodeHandle,
        root: &Selector,
        filter: &Selector,
    ) -> Option<NodeHandle> {
        let element = self.element(target)?;
        let mut matched = None;
        let mut node = Some(*element);
        while let Some(current) = node {
            if let Some(el) = ElementRef::wrap(current) {
                if root.matches(&el) {
                    return matched.map(handle_of);
                }
                if matched.is_none() && filter.matches(&el) {
                    matched = Some(el);
                }
            }
            node = current.parent();
        }
        None
    }

    /// Append parsed `html` as the last children of `parent`.
    pub fn append_html(&mut self, parent: &NodeHandle, html: &str) -> NavResult<()> {
        let fragment = Html::parse_fragment(html);
        let content = handle_of(fragment.root_element());
        copy_children(&mut self.html, parent, &fragment, &content, false)
    }

    /// Replace every child of the container with parsed `html`.
    ///
    /// The document is rebuilt from its live nodes afterwards, so the replaced
    /// children are freed rather than left detached in the tree's storage
    /// where selector lookups would still see them.
    pub fn replace_children(
        &mut self,
        container: &Container,
        html: &str,
        strip_scripts: bool,
    ) -> NavResult<()> {
        let fragment = Html::parse_fragment(html);
        let target = self
            .element(&container.handle)
            .map(|el| (*el).id())
            .ok_or_else(|| NavError::NodeNotFound(container.selector.clone()))?;

        let old: Vec<_> = self
            .html
            .tree
            .get(target)
            .map(|node| node.children().map(|c| c.id()).collect())
            .unwrap_or_default();
        for id in old {
            if let Some(mut child) = self.html.tree.get_mut(id) {
                child.detach();
            }
        }

        let content = handle_of(fragment.root_element());
        copy_children(
            &mut self.html,
            &container.handle,
            &fragment,
            &content,
            strip_scripts,
        )?;
        self.compact()
    }

    /// Copy the reachable part of the document into a fresh tree. Handles stay
    /// valid because the structure is unchanged.
    fn compact(&mut self) -> NavResult<()> {
        let mut fresh = Html::new_document();
        fresh.quirks_mode = self.html.quirks_mode;
        let root = NodeHandle(Vec::new());
        copy_children(&mut fresh, &root, &self.html, &root, false)?;
        self.html = fresh;
        Ok(())
    }

    fn element(&self, handle: &NodeHandle) -> Option<ElementRef<'_>> {
        let mut node = self.html.tree.root();
        for &index in &handle.0 {
            node = node.children().nth(index)?;
        }
        ElementRef::wrap(node)
    }

    fn describe_url(&self) -> String {
        self.url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "current page".to_string())
    }
}

fn handle_of(element: ElementRef<'_>) -> NodeHandle {
    let mut path = Vec::new();
    let mut node = *element;
    while let Some(parent) = node.parent() {
        path.push(node.prev_siblings().count());
        node = parent;
    }
    path.reverse();
    NodeHandle(path)
}

/// Deep-copy the children of the node at `from` in `source` under the node at
/// `to` in `target`, in order.
fn copy_children(
    target: &mut Html,
    to: &NodeHandle,
    source: &Html,
    from: &NodeHandle,
    strip_scripts: bool,
) -> NavResult<()> {
    let mut from_node = source.tree.root();
    for &index in &from.0 {
        from_node = from_node
            .children()
            .nth(index)
            .ok_or_else(|| NavError::NodeNotFound(format!("{from:?}")))?;
    }
    let mut to_node = target.tree.root();
    for &index in &to.0 {
        to_node = to_node
            .children()
            .nth(index)
            .ok_or_else(|| NavError::NodeNotFound(format!("{to:?}")))?;
    }
    let to_id = to_node.id();

    let mut stack = vec![(from_node, to_id)];
    while let Some((src, dest)) = stack.pop() {
        for child in src.children() {
            if strip_scripts && is_script(child.value()) {
                continue;
            }
            let Some(mut dest_node) = target.tree.get_mut(dest) else {
                break;
            };
            let id = dest_node.append(child.value().clone()).id();
            stack.push((child, id));
        }
    }
    Ok(())
}

fn is_script(node: &Node) -> bool {
    matches!(node, Node::Element(el) if el.name() == "script")
}
