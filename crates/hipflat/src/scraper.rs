use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;

use crate::fetcher::{FetchError, PageFetcher, RenderOptions};
use crate::parser::{parse_detail_page, parse_listing_page, parse_total_pages};
use crate::types::{ListingRecord, ListingStatus};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Start page must be at least 1")]
    StartPage,
    #[error("Max pages must be greater than 0")]
    MaxPages,
    #[error("Delay minimum ({min:?}) exceeds maximum ({max:?})")]
    Delay { min: Duration, max: Duration },
}

/// Randomised pause inserted between consecutive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDelay {
    pub min: Duration,
    pub max: Duration,
}

impl RequestDelay {
    pub const NONE: RequestDelay = RequestDelay {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn between_secs(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }

    fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }

    async fn pause(&self) {
        let wait = self.sample();
        if !wait.is_zero() {
            log::info!("Waiting {:.1}s...", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub start_page: u32,
    /// Number of listing pages to visit, starting at `start_page`.
    pub max_pages: u32,
    /// How many of the collected listings get their detail page fetched.
    pub max_details: usize,
    pub render: RenderOptions,
    pub page_delay: RequestDelay,
    pub detail_delay: RequestDelay,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: crate::LISTING_URL.to_string(),
            start_page: 1,
            max_pages: 2,
            max_details: 5,
            render: RenderOptions::default(),
            page_delay: RequestDelay::between_secs(3, 7),
            detail_delay: RequestDelay::between_secs(3, 5),
        }
    }
}

impl ScrapeConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.start_page == 0 {
            return Err(ConfigError::StartPage);
        }
        if self.max_pages == 0 {
            return Err(ConfigError::MaxPages);
        }
        for delay in [self.page_delay, self.detail_delay] {
            if delay.min > delay.max {
                return Err(ConfigError::Delay {
                    min: delay.min,
                    max: delay.max,
                });
            }
        }
        Ok(self)
    }
}

/// Page 1 is the bare index URL; later pages use the `page` query parameter.
pub fn listing_page_url(base_url: &str, page: u32) -> String {
    if page <= 1 {
        base_url.to_string()
    } else {
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!("{}{}page={}", base_url, separator, page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub target: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub records: Vec<ListingRecord>,
    pub pages_fetched: u32,
    pub details_fetched: usize,
    pub failed_pages: Vec<Failure>,
    pub failed_details: Vec<Failure>,
}

impl ScrapeReport {
    pub fn is_degraded(&self) -> bool {
        !self.failed_pages.is_empty() || !self.failed_details.is_empty()
    }

    /// No listing was collected and at least one listing page failed to
    /// fetch, so the empty table says nothing about the site.
    pub fn is_failed(&self) -> bool {
        self.records.is_empty() && !self.failed_pages.is_empty()
    }
}

/// Drives fetcher and parsers over the configured page range, then enriches
/// the first `max_details` rows from their detail pages.
pub struct HipflatScraper<F> {
    fetcher: F,
    config: ScrapeConfig,
}

impl<F: PageFetcher> HipflatScraper<F> {
    pub fn new(fetcher: F, config: ScrapeConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    pub async fn run(&self) -> ScrapeReport {
        log::info!(
            "Scraping up to {} page(s) from page {}, details for {}",
            self.config.max_pages,
            self.config.start_page,
            self.config.max_details
        );

        let mut report = ScrapeReport::default();
        self.collect_listings(&mut report).await;
        self.enrich_details(&mut report).await;

        log::info!(
            "Scrape finished: {} listing(s), {} failed page(s), {} failed detail(s)",
            report.records.len(),
            report.failed_pages.len(),
            report.failed_details.len()
        );
        report
    }

    async fn collect_listings(&self, report: &mut ScrapeReport) {
        let start = self.config.start_page;
        let mut end = start.saturating_add(self.config.max_pages);
        let mut pagination_seen = false;
        let mut seen_urls = HashSet::new();
        let mut page = start;

        while page < end {
            if page > start {
                self.config.page_delay.pause().await;
            }

            let url = listing_page_url(&self.config.base_url, page);
            log::info!("Fetching listing page {} ({})", page, url);
            report.pages_fetched += 1;

            let html = match self.fetcher.fetch(&url, &self.config.render).await {
                Ok(html) => html,
                Err(e) => {
                    log::error!("Failed to fetch listing page {}: {}", page, e);
                    report.failed_pages.push(failure(&url, &e));
                    page += 1;
                    continue;
                }
            };

            if !pagination_seen && let Some(last) = parse_total_pages(&html) {
                pagination_seen = true;
                if last < end.saturating_sub(1) {
                    log::info!("Site reports {} page(s), limiting range", last);
                    end = last.saturating_add(1);
                }
            }

            let records = parse_listing_page(&html);
            if records.is_empty() {
                log::info!("Page {} has no listings, stopping pagination", page);
                break;
            }

            let found = records.len();
            for record in records {
                if seen_urls.insert(record.url.clone()) {
                    report.records.push(record);
                } else {
                    log::debug!("Skipping duplicate listing {}", record.url);
                }
            }
            log::info!(
                "Page {}: {} card(s), {} listing(s) collected so far",
                page,
                found,
                report.records.len()
            );

            page += 1;
        }
    }

    async fn enrich_details(&self, report: &mut ScrapeReport) {
        let limit = self.config.max_details.min(report.records.len());
        if limit == 0 {
            return;
        }
        log::info!("Fetching detail pages for {} listing(s)", limit);

        for idx in 0..limit {
            if idx > 0 {
                self.config.detail_delay.pause().await;
            }

            let url = report.records[idx].url.clone();
            log::info!("Fetching detail page ({}/{}): {}", idx + 1, limit, url);
            report.details_fetched += 1;

            let outcome = match self.fetcher.fetch(&url, &self.config.render).await {
                Ok(html) => parse_detail_page(&html, &report.records[idx]).map_err(|e| {
                    log::warn!("Detail page {} kept base values: {}", url, e);
                    e.to_string()
                }),
                Err(e) => {
                    log::error!("Failed to fetch detail page {}: {}", url, e);
                    Err(e.to_string())
                }
            };

            let record = &mut report.records[idx];
            match outcome {
                Ok(fields) => {
                    record.merge(fields);
                    record.status = ListingStatus::Detailed;
                }
                Err(error) => {
                    record.status = ListingStatus::DetailFailed;
                    report.failed_details.push(Failure { target: url, error });
                }
            }
        }
    }
}

fn failure(target: &str, error: &FetchError) -> Failure {
    Failure {
        target: target.to_string(),
        error: error.to_string(),
    }
}
