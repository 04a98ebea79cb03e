use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, error, info, warn};

use super::dedup::CrawlState;
use super::error::{CrawlError, Result};
use super::pagination::{build_page_url, resolve};
use super::types::{CommentAggregates, CrawlConfig};

/// Consecutive listing pages without a new comment that end the crawl.
pub const EXHAUSTION_STREAK: usize = 2;

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7";
const ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Where page markup comes from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Browser-like HTTP client; one cookie jar for the whole crawl.
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static(ACCEPT_ENCODING),
        );
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        );

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()
            .map_err(CrawlError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let http_error = |source| CrawlError::Http {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Fetch {
                url: url.to_string(),
                reason: format!("http {}", status.as_u16()),
            });
        }
        response.text().await.map_err(http_error)
    }
}

/// Why a crawl ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every page up to the computed or configured limit was visited.
    PageLimit,
    /// `EXHAUSTION_STREAK` pages in a row added nothing; `page` is the last one fetched.
    Exhausted { page: usize },
    /// No count or no listing URL; only the profile page was parsed.
    FirstPageOnly,
    FirstPageFailed,
}

/// Drives one sequential crawl of a profile's comment listing.
pub struct Crawler<S> {
    source: S,
    config: CrawlConfig,
    state: CrawlState,
    stop_reason: Option<StopReason>,
}

impl<S: PageSource> Crawler<S> {
    pub fn new(source: S, config: CrawlConfig) -> Self {
        Self {
            source,
            config,
            state: CrawlState::default(),
            stop_reason: None,
        }
    }

    /// State of the current or last crawl. Still populated when a crawl
    /// future was dropped part way through.
    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    /// `None` while a crawl is running or after it was interrupted.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Crawls `profile_url` from scratch. Failures are logged, never
    /// returned: an unreachable first page yields empty aggregates.
    pub async fn crawl(&mut self, profile_url: &str) -> &CommentAggregates {
        self.state = CrawlState::default();
        self.stop_reason = None;

        let reason = self.run(profile_url).await;
        info!(
            ?reason,
            total_comments = self.state.total_comments(),
            total_users = self.state.aggregates().len(),
            "parsing complete"
        );
        self.stop_reason = Some(reason);
        self.state.aggregates()
    }

    async fn run(&mut self, profile_url: &str) -> StopReason {
        info!(url = profile_url, "loading first page");
        let first_page = match self.source.fetch(profile_url).await {
            Ok(markup) => markup,
            Err(err) => {
                error!(error = %err, "page load error");
                return StopReason::FirstPageFailed;
            }
        };

        let resolution = resolve(&first_page, profile_url);
        info!(
            total = resolution.total_count,
            "total comments according to steam"
        );

        if resolution.total_count == 0 {
            info!("no comment count found, parsing the first page only");
            self.admit_first_page(&first_page);
            return StopReason::FirstPageOnly;
        }

        let Some(listing_url) = resolution.listing_url.clone() else {
            warn!("all comments link not found, parsing the first page only");
            self.admit_first_page(&first_page);
            return StopReason::FirstPageOnly;
        };

        self.state.set_base_listing_url(listing_url.clone());
        let total_pages = resolution.total_pages(self.config.max_pages);
        info!(listing_url = %listing_url, total_pages, "crawling comment listing");

        self.admit_first_page(&first_page);
        self.crawl_listing(&listing_url, total_pages).await
    }

    fn admit_first_page(&mut self, markup: &str) {
        let admitted = self.state.admit_page(markup);
        debug!(page = 1, admitted, "parsed first page");
    }

    async fn crawl_listing(&mut self, listing_url: &str, total_pages: usize) -> StopReason {
        let mut empty_streak = 0usize;

        for page in 2..=total_pages {
            let page_url = build_page_url(listing_url, page);
            pause(self.config.page_delay).await;
            debug!(page, total_pages, url = %page_url, "fetching page");

            let markup = match self.source.fetch(&page_url).await {
                Ok(markup) => markup,
                Err(err) => {
                    warn!(page, error = %err, "error loading page, skipping");
                    continue;
                }
            };

            let admitted = self.state.admit_page(&markup);
            debug!(
                page,
                admitted,
                total = self.state.total_comments(),
                "parsed page"
            );

            if admitted == 0 {
                empty_streak += 1;
                if empty_streak >= EXHAUSTION_STREAK {
                    info!(page, empty_streak, "stopping: pages without new comments");
                    return StopReason::Exhausted { page };
                }
            } else {
                empty_streak = 0;
            }

            pause(self.config.settle_delay).await;
        }

        StopReason::PageLimit
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
