use url::Url;

/// Bucket used for URLs whose host cannot be resolved
pub const DEFAULT_HOST: &str = "default";

/// Extracts the lowercase host from a parsed URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use forum_loader::url::extract_host;
///
/// let url = Url::parse("https://IMG12.Pixhost.to/images/1.jpg").unwrap();
/// assert_eq!(extract_host(&url), Some("img12.pixhost.to".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the host of a URL string, or the shared default bucket
///
/// Never fails: unparseable input and host-less URLs map to [`DEFAULT_HOST`].
pub fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .as_ref()
        .and_then(extract_host)
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}
