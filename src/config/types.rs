use serde::Deserialize;

/// Main configuration structure for pagesift
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(rename = "job", default)]
    pub jobs: Vec<JobConfig>,
}

/// HTTP client configuration shared by every job
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Identifying User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Optional PEM file with an additional trusted root certificate
    #[serde(rename = "ca-cert", default)]
    pub ca_cert: Option<String>,

    /// Whole-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            ca_cert: None,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Retry backoff configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Linear backoff unit (milliseconds)
    #[serde(rename = "backoff-unit-ms", default = "default_backoff_unit")]
    pub backoff_unit_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_unit_ms: default_backoff_unit(),
        }
    }
}

/// One paginated listing to scrape
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Job name, used in logs and for `--job` selection
    pub name: String,

    /// Listing URL; pages are requested as `base-url?page=N`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the CSV output file
    pub output: String,

    /// Ordered CSV column names
    pub columns: Vec<String>,

    /// Column receiving resolved links that start with `view-prefix`
    #[serde(rename = "view-column")]
    pub view_column: String,

    /// Column receiving resolved links that start with `download-prefix`
    #[serde(rename = "download-column")]
    pub download_column: String,

    #[serde(rename = "view-prefix")]
    pub view_prefix: String,

    #[serde(rename = "download-prefix")]
    pub download_prefix: String,

    /// Base URL used to resolve relative links
    #[serde(rename = "link-base-url")]
    pub link_base_url: String,

    /// Maximum number of pages in flight
    pub concurrency: u32,

    /// Query parameter carrying the page number
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Upper bound on the discovered page count
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Treat any markup parse error as a page failure
    #[serde(rename = "strict-markup", default)]
    pub strict_markup: bool,

    /// Abort the run on the first page failure
    #[serde(rename = "fail-fast", default)]
    pub fail_fast: bool,
}

fn default_user_agent() -> String {
    format!("pagesift/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_backoff_unit() -> u64 {
    1000
}

fn default_max_pages() -> u32 {
    10_000
}

fn default_page_param() -> String {
    "page".to_string()
}
