//! Job and page task definitions
//!
//! A `Job` is the validated, runtime form of one `[[job]]` config entry. It
//! is shared read-only by every task of a run.

use crate::config::JobConfig;
use crate::url::{page_url, parse_http_url};
use crate::ConfigError;
use std::path::PathBuf;
use url::Url;

/// Immutable description of one scrape
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub base_url: Url,
    pub output: PathBuf,
    pub columns: Vec<String>,
    pub view_column: String,
    pub download_column: String,
    pub view_prefix: String,
    pub download_prefix: String,
    pub link_base: Url,
    pub concurrency: usize,
    pub page_param: String,
    pub max_pages: u32,
    pub strict_markup: bool,
    pub fail_fast: bool,
}

/// One page to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTask {
    /// 1-based page index
    pub page: u32,
    pub url: Url,
}

impl Job {
    /// Builds a job from its configuration entry
    pub fn from_config(config: &JobConfig) -> Result<Self, ConfigError> {
        let base_url = parse_http_url(&config.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("job '{}': base-url: {}", config.name, e))
        })?;
        let link_base = parse_http_url(&config.link_base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("job '{}': link-base-url: {}", config.name, e))
        })?;

        Ok(Self {
            name: config.name.clone(),
            base_url,
            output: PathBuf::from(&config.output),
            columns: config.columns.clone(),
            view_column: config.view_column.clone(),
            download_column: config.download_column.clone(),
            view_prefix: config.view_prefix.clone(),
            download_prefix: config.download_prefix.clone(),
            link_base,
            concurrency: config.concurrency.max(1) as usize,
            page_param: config.page_param.clone(),
            max_pages: config.max_pages.max(1),
            strict_markup: config.strict_markup,
            fail_fast: config.fail_fast,
        })
    }

    /// URL of page `page`
    pub fn page_url(&self, page: u32) -> Url {
        page_url(&self.base_url, &self.page_param, page)
    }

    /// Tasks for every page after `frontier` up to and including `total`
    pub fn page_tasks(&self, frontier: u32, total: u32) -> Vec<PageTask> {
        (frontier.saturating_add(1)..=total)
            .map(|page| PageTask {
                page,
                url: self.page_url(page),
            })
            .collect()
    }

    /// Caps a page count read from the listing at `max_pages`
    pub fn clamp_page_count(&self, discovered: u32) -> u32 {
        if discovered > self.max_pages {
            tracing::warn!(
                "Job '{}': listing links to page {}, capping at max-pages {}",
                self.name,
                discovered,
                self.max_pages
            );
            return self.max_pages;
        }
        discovered
    }
}
