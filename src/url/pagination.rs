use url::Url;

/// Builds the URL of page `page` of a listing
///
/// The page number is appended as a query parameter, so an existing query on
/// `base` is preserved: `https://ex.com/list?sort=asc` becomes
/// `https://ex.com/list?sort=asc&page=3`.
pub fn page_url(base: &Url, param: &str, page: u32) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair(param, &page.to_string());
    url
}

/// Reads the page number carried by `url`'s `param` query parameter
///
/// Returns `None` when the parameter is absent, not a number, or zero.
pub fn page_number(url: &Url, param: &str) -> Option<u32> {
    url.query_pairs()
        .filter(|(key, _)| key == param)
        .find_map(|(_, value)| value.trim().parse::<u32>().ok())
        .filter(|page| *page > 0)
}
