//! Watch request construction

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Result, WatchError};

/// Default watch timeout
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Options accepted by a watch invocation
///
/// `timeout` is enforced on the client only and never sent to the server.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Resume token to start the watch from
    pub resource_version: Option<String>,
    /// Server-side label filter expression
    pub label_selector: Option<String>,
    /// Server-side field filter expression
    pub field_selector: Option<String>,
    /// Ask the server for BOOKMARK frames
    pub allow_watch_bookmarks: bool,
    /// Client-side timeout; `None` falls back to the watcher default
    pub timeout: Option<Duration>,
    /// External cancel handle
    pub cancel: Option<CancellationToken>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            resource_version: None,
            label_selector: None,
            field_selector: None,
            allow_watch_bookmarks: true,
            timeout: None,
            cancel: None,
        }
    }
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource_version(mut self, rv: impl Into<String>) -> Self {
        self.resource_version = Some(rv.into());
        self
    }

    pub fn label_selector(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    pub fn field_selector(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    pub fn allow_watch_bookmarks(mut self, allow: bool) -> Self {
        self.allow_watch_bookmarks = allow;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach an external cancel handle; cancelling it ends the watch
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build options from string key/value pairs
    ///
    /// Recognized keys: `resourceVersion`, `labelSelector`, `fieldSelector`,
    /// `allowWatchBookmarks`, `timeoutSeconds`. Any other key is rejected
    /// with [`WatchError::UnknownOption`]; nothing is forwarded verbatim.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "resourceVersion" => options.resource_version = Some(value.to_string()),
                "labelSelector" => options.label_selector = Some(value.to_string()),
                "fieldSelector" => options.field_selector = Some(value.to_string()),
                "allowWatchBookmarks" => {
                    options.allow_watch_bookmarks =
                        value.parse().map_err(|_| invalid_option(key, value))?;
                }
                "timeoutSeconds" => {
                    let secs: u64 = value.parse().map_err(|_| invalid_option(key, value))?;
                    options.timeout = Some(Duration::from_secs(secs));
                }
                other => return Err(WatchError::UnknownOption(other.to_string())),
            }
        }
        Ok(options)
    }
}

fn invalid_option(option: &str, value: &str) -> WatchError {
    WatchError::InvalidOption {
        option: option.to_string(),
        value: value.to_string(),
    }
}

/// Fully addressed watch request
#[derive(Debug, Clone)]
pub struct WatchRequest {
    url: Url,
    timeout: Duration,
}

impl WatchRequest {
    /// Address `path` under `base_url` and append the watch query
    ///
    /// Any path prefix on the base URL is kept (`https://host/proxy` +
    /// `/api/v1/pods` gives `https://host/proxy/api/v1/pods`).
    pub fn build(
        base_url: &Url,
        path: &str,
        options: &WatchOptions,
        default_timeout: Duration,
    ) -> Result<Self> {
        let mut url = resolve_path(base_url, path)?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("watch", "true");
            if let Some(rv) = &options.resource_version {
                query.append_pair("resourceVersion", rv);
            }
            if let Some(selector) = &options.label_selector {
                query.append_pair("labelSelector", selector);
            }
            if let Some(selector) = &options.field_selector {
                query.append_pair("fieldSelector", selector);
            }
            query.append_pair(
                "allowWatchBookmarks",
                if options.allow_watch_bookmarks {
                    "true"
                } else {
                    "false"
                },
            );
        }

        Ok(Self {
            url,
            timeout: options.timeout.unwrap_or(default_timeout),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn resolve_path(base_url: &Url, path: &str) -> Result<Url> {
    if base_url.cannot_be_a_base() {
        return Err(WatchError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
    }

    let (path, query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };
    if query.is_some_and(|q| !q.is_empty()) {
        // Query parameters come from options only
        return Err(WatchError::UnknownOption(format!("?{}", query.unwrap_or_default())));
    }

    let mut url = base_url.clone();
    let prefix = base_url.path().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    url.set_path(&format!("{}/{}", prefix, path));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Why a watch was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    Timeout,
}

impl From<CancelReason> for WatchError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => WatchError::Cancelled,
            CancelReason::Timeout => WatchError::Timeout,
        }
    }
}

/// Token owned by one watch
///
/// A child of the caller's token when one is supplied, so tearing down the
/// watch never cancels the caller's token.
pub fn watch_token(parent: Option<&CancellationToken>) -> CancellationToken {
    match parent {
        Some(parent) => parent.child_token(),
        None => CancellationToken::new(),
    }
}

/// Composed cancel signal: an explicit token plus a deadline
#[derive(Debug, Clone)]
pub struct CancelSignal {
    token: CancellationToken,
    /// `None` when the timeout lies beyond what the clock can represent
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// Arm a signal; the deadline starts counting now
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Token owned by this watch
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fire the explicit half of the signal
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Non-blocking check
    pub fn check(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            Some(CancelReason::Cancelled)
        } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(CancelReason::Timeout)
        } else {
            None
        }
    }

    /// Resolve when either half fires
    pub async fn fired(&self) -> CancelReason {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => futures::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => CancelReason::Cancelled,
            _ = expired => CancelReason::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn base() -> Url {
        Url::parse("https://cluster.local:6443").unwrap()
    }

    fn build(path: &str, options: &WatchOptions) -> Result<WatchRequest> {
        WatchRequest::build(&base(), path, options, DEFAULT_WATCH_TIMEOUT)
    }

    fn query(request: &WatchRequest) -> Vec<(String, String)> {
        request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_minimal_request() {
        let request = build("/api/v1/pods", &WatchOptions::new()).unwrap();

        assert_eq!(request.url().path(), "/api/v1/pods");
        assert_eq!(
            request.url().query(),
            Some("watch=true&allowWatchBookmarks=true")
        );
        assert_eq!(request.timeout(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_all_options_appear_once() {
        let options = WatchOptions::new()
            .resource_version("4711")
            .label_selector("app=web,tier in (front, back)")
            .field_selector("status.phase!=Running")
            .allow_watch_bookmarks(false)
            .timeout(Duration::from_secs(5));

        let request = build("api/v1/namespaces/default/pods", &options).unwrap();

        assert_eq!(
            query(&request),
            vec![
                ("watch".to_string(), "true".to_string()),
                ("resourceVersion".to_string(), "4711".to_string()),
                ("labelSelector".to_string(), "app=web,tier in (front, back)".to_string()),
                ("fieldSelector".to_string(), "status.phase!=Running".to_string()),
                ("allowWatchBookmarks".to_string(), "false".to_string()),
            ]
        );
        // Selectors are URL-encoded on the wire
        let raw = request.url().query().unwrap();
        assert!(raw.contains("labelSelector=app%3Dweb%2Ctier+in+%28front%2C+back%29"));
        assert!(raw.contains("fieldSelector=status.phase%21%3DRunning"));
        // Client-side timeout is never sent
        assert!(!raw.contains("timeout"));
        assert_eq!(request.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_options_are_not_mutated() {
        let options = WatchOptions::new().resource_version("1");
        let _ = build("/api/v1/pods", &options).unwrap();
        assert_eq!(options.resource_version.as_deref(), Some("1"));
        assert!(options.timeout.is_none());
    }

    #[test]
    fn test_base_path_prefix_is_kept() {
        let base = Url::parse("https://rancher.example/k8s/clusters/c-1/").unwrap();
        let request =
            WatchRequest::build(&base, "/api/v1/pods", &WatchOptions::new(), DEFAULT_WATCH_TIMEOUT)
                .unwrap();
        assert_eq!(request.url().path(), "/k8s/clusters/c-1/api/v1/pods");
    }

    #[test]
    fn test_query_in_path_is_rejected() {
        let err = build("/api/v1/pods?limit=5", &WatchOptions::new()).unwrap_err();
        assert!(matches!(err, WatchError::UnknownOption(_)));
    }

    #[test]
    fn test_from_pairs() {
        let mut map = HashMap::new();
        map.insert("resourceVersion", "99");
        map.insert("labelSelector", "app=db");
        map.insert("allowWatchBookmarks", "false");
        map.insert("timeoutSeconds", "12");

        let options = WatchOptions::from_pairs(map).unwrap();
        assert_eq!(options.resource_version.as_deref(), Some("99"));
        assert_eq!(options.label_selector.as_deref(), Some("app=db"));
        assert!(!options.allow_watch_bookmarks);
        assert_eq!(options.timeout, Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_from_pairs_rejects_unknown_keys() {
        let err =
            WatchOptions::from_pairs([("resourceVersion", "1"), ("limit", "500")]).unwrap_err();
        assert!(matches!(err, WatchError::UnknownOption(ref k) if k == "limit"));

        let err = WatchOptions::from_pairs([("allowWatchBookmarks", "yes")]).unwrap_err();
        assert!(matches!(err, WatchError::InvalidOption { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_timeout() {
        let signal = CancelSignal::new(watch_token(None), Duration::from_millis(100));
        assert_eq!(signal.check(), None);
        assert_eq!(signal.fired().await, CancelReason::Timeout);
        assert_eq!(signal.check(), Some(CancelReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_parent_cancel() {
        let parent = CancellationToken::new();
        let signal = CancelSignal::new(watch_token(Some(&parent)), Duration::from_secs(60));

        parent.cancel();
        assert_eq!(signal.fired().await, CancelReason::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_with_unrepresentable_timeout() {
        let options =
            WatchOptions::from_pairs([("timeoutSeconds", u64::MAX.to_string())]).unwrap();
        let token = watch_token(None);
        let signal = CancelSignal::new(token.clone(), options.timeout.unwrap());

        assert_eq!(signal.deadline(), None);
        assert_eq!(signal.check(), None);

        // Only the token can end it
        let fired = tokio::time::timeout(Duration::from_secs(3600), signal.fired()).await;
        assert!(fired.is_err());

        token.cancel();
        assert_eq!(signal.fired().await, CancelReason::Cancelled);
    }

    #[tokio::test]
    async fn test_signal_cancel_does_not_touch_parent() {
        let parent = CancellationToken::new();
        let signal = CancelSignal::new(watch_token(Some(&parent)), Duration::from_secs(60));

        signal.cancel();
        assert_eq!(signal.check(), Some(CancelReason::Cancelled));
        assert!(!parent.is_cancelled());
    }
}
