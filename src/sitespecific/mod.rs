//! Site-specific request and response hooks
//!
//! A hook matches URLs by host and may rewrite the request URL, add request
//! headers, contribute extra URLs from a response, or take over body
//! extraction entirely. Hooks are registered at startup and dispatched to
//! the first match. They see responses through a borrowed
//! [`ResponseView`] and never keep a reference to the body.

mod libsyn;
mod reddit;
mod telegram;
mod tiktok;

pub use libsyn::LibsynHook;
pub use reddit::RedditHook;
pub use telegram::TelegramHook;
pub use tiktok::TiktokHook;

use crate::extractor::ResponseView;
use reqwest::header::HeaderMap;
use url::Url;

/// URLs and directives a hook derives from a response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraActions {
    pub outlinks: Vec<Url>,
    pub assets: Vec<Url>,
    /// Skip the generic body extraction for this response
    pub replace_extraction: bool,
}

pub trait SiteHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, url: &Url) -> bool;

    /// Returns the URL to request instead of `url`, if any
    fn rewrite_url(&self, _url: &Url) -> Option<Url> {
        None
    }

    /// Adds cookies or headers before the request is sent
    fn prepare_request(&self, _url: &Url, _headers: &mut HeaderMap) {}

    fn transform_response(&self, _response: &ResponseView<'_>) -> ExtraActions {
        ExtraActions::default()
    }
}

/// Returns true if `host` is `domain` or one of its subdomains
pub(crate) fn host_is(url: &Url, domain: &str) -> bool {
    url.host_str().map_or(false, |host| {
        host == domain
            || host
                .strip_suffix(domain)
                .map_or(false, |prefix| prefix.ends_with('.'))
    })
}

/// Ordered set of hooks
pub struct HookRegistry {
    hooks: Vec<Box<dyn SiteHook>>,
}

impl Default for HookRegistry {
    /// Registry with every built-in hook
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RedditHook));
        registry.register(Box::new(TiktokHook));
        registry.register(Box::new(TelegramHook));
        registry.register(Box::new(LibsynHook));
        registry
    }
}

impl HookRegistry {
    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn register(&mut self, hook: Box<dyn SiteHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// First hook matching `url`
    pub fn find(&self, url: &Url) -> Option<&dyn SiteHook> {
        self.hooks
            .iter()
            .find(|hook| hook.matches(url))
            .map(|hook| hook.as_ref())
    }

    pub fn rewrite_url(&self, url: &Url) -> Option<Url> {
        self.find(url).and_then(|hook| hook.rewrite_url(url))
    }

    pub fn prepare_request(&self, url: &Url, headers: &mut HeaderMap) {
        if let Some(hook) = self.find(url) {
            hook.prepare_request(url, headers);
        }
    }

    pub fn transform_response(&self, response: &ResponseView<'_>) -> ExtraActions {
        self.find(response.url)
            .map(|hook| hook.transform_response(response))
            .unwrap_or_default()
    }
}
