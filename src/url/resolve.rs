use crate::{UrlError, UrlResult};
use url::Url;

/// Parses a URL and requires an http or https scheme
pub fn parse_http_url(raw: &str) -> UrlResult<Url> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UrlError::InvalidScheme(other.to_string())),
    }
}

/// Builds the absolute URL of a row link
///
/// An href that already carries a scheme is returned as parsed. A
/// protocol-relative href takes the base's scheme. Anything else is appended
/// to the base with exactly one `/` between them, so a base path such as
/// `/portal` is kept. The base's query and fragment are not carried over.
pub fn join_link(base: &Url, href: &str) -> String {
    let href = href.trim();

    if let Ok(absolute) = Url::parse(href) {
        return absolute.to_string();
    }
    if href.starts_with("//") {
        if let Ok(absolute) = base.join(href) {
            return absolute.to_string();
        }
    }

    let mut prefix = base.clone();
    prefix.set_query(None);
    prefix.set_fragment(None);
    format!(
        "{}/{}",
        prefix.as_str().trim_end_matches('/'),
        href.trim_start_matches('/')
    )
}
