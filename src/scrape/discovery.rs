//! Page count discovery
//!
//! The listing's first view carries pagination links such as
//! `<a href="?page=42">Last</a>`. The largest page number among them is the
//! page count.

use crate::scrape::fetcher::RetryingFetcher;
use crate::scrape::job::Job;
use crate::url::page_number;
use crate::ScrapeError;
use scraper::{Html, Selector};
use url::Url;

/// Finds how many pages a listing has
pub struct PageCountDiscoverer<'a> {
    fetcher: &'a RetryingFetcher,
}

impl<'a> PageCountDiscoverer<'a> {
    pub fn new(fetcher: &'a RetryingFetcher) -> Self {
        Self { fetcher }
    }

    /// Fetches the job's base URL and returns its page count
    ///
    /// # Returns
    ///
    /// * `Ok(u32)` - Highest page number linked from the seed page, 1 if none,
    ///   capped at the job's `max_pages`
    /// * `Err(ScrapeError)` - The seed page could not be fetched or answered
    ///   with a non-success status
    pub async fn discover(&self, job: &Job) -> Result<u32, ScrapeError> {
        let url = job.base_url.as_str();
        let outcome = self.fetcher.fetch(url).await?;

        if !outcome.is_success() {
            return Err(ScrapeError::Discovery {
                url: url.to_string(),
                message: format!("HTTP {}", outcome.status),
            });
        }

        let linked = max_page_number(&outcome.body, &job.base_url, &job.page_param);
        let total = job.clamp_page_count(linked);
        tracing::debug!("Discovered {} pages at {}", total, url);
        Ok(total)
    }
}

/// Returns the largest page number linked from `html`, 1 if none
///
/// # Arguments
///
/// * `html` - The seed page markup
/// * `base_url` - URL the markup was fetched from, for resolving hrefs
/// * `param` - Query parameter that carries the page number
pub fn max_page_number(html: &str, base_url: &Url, param: &str) -> u32 {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return 1;
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| base_url.join(href.trim()).ok())
        .filter_map(|link| page_number(&link, param))
        .max()
        .unwrap_or(1)
}
