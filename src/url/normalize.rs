use url::form_urlencoded;
use url::Url;

/// Normalizes an image URL into a deduplication key
///
/// # Normalization Steps
///
/// 1. Parse the URL (the host is lowercased by the parser)
/// 2. Remove the fragment
/// 3. Remove `utm_*` tracking query parameters
/// 4. Sort remaining query parameters by key, then value
/// 5. Drop an empty query string
///
/// The result is only used for comparison; the original href is what gets stored.
///
/// # Examples
///
/// ```
/// use forum_loader::url::normalize_url;
///
/// let a = normalize_url("https://IMG.example.com/a.jpg?b=2&a=1&utm_source=x").unwrap();
/// let b = normalize_url("https://img.example.com/a.jpg?a=1&b=2#top").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn normalize_url(url_str: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(url_str)?;
    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !key.starts_with("utm_"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            url.set_query(Some(&query));
        }
    }

    Ok(url.into())
}
