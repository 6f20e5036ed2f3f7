//! snootnav — fragment navigation for snootforge pages.
//!
//! Intercepts anchor clicks delegated from the page body, fetches the linked
//! page and splices its `main` region into the current page instead of doing
//! a full navigation. `mailto:` links are left alone.

pub mod config;
pub mod fetch;
pub mod interceptor;
pub mod page;
pub mod types;

pub use config::InterceptorConfig;
pub use fetch::{extract_fragment, FetchedDocument, Fetcher, HttpFetcher};
pub use interceptor::{
    Applied, ClickOutcome, Fragment, Interceptor, LinkAction, LinkDecision, Navigation,
};
pub use page::{ClickEvent, Container, HtmlPage, NodeHandle};
pub use types::*;
