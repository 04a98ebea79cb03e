use std::collections::HashSet;

use tracing::{debug, info};

use super::extract::extract_page;
use super::types::{CommentAggregates, CommentRecord};

/// Body Steam shows for comments its spam filter has not reviewed yet.
pub const UNANALYZED_PLACEHOLDER: &str = "Это сообщение ещё не проанализировано нашей системой";

const PROGRESS_EVERY: usize = 50;

/// Everything one crawl accumulates.
#[derive(Debug, Default)]
pub struct CrawlState {
    seen_ids: HashSet<String>,
    total_comments: usize,
    aggregates: CommentAggregates,
    base_listing_url: Option<String>,
}

impl CrawlState {
    /// Counts `record` unless it is blank, a placeholder, or already seen.
    pub fn admit(&mut self, record: CommentRecord) -> bool {
        if record.comment_text.trim().is_empty() {
            return false;
        }
        if record.comment_text.contains(UNANALYZED_PLACEHOLDER) {
            debug!(comment_id = %record.comment_id, "skipping unanalyzed placeholder");
            return false;
        }
        if !self.seen_ids.insert(record.comment_id.clone()) {
            return false;
        }

        self.aggregates.get_or_create(&record.user).push(record);
        self.total_comments += 1;
        if self.total_comments % PROGRESS_EVERY == 0 {
            info!(total = self.total_comments, "comments parsed");
        }
        true
    }

    /// Extracts and admits one page, returning how many records were new.
    pub fn admit_page(&mut self, markup: &str) -> usize {
        let mut admitted = 0usize;
        for record in extract_page(markup) {
            if self.admit(record) {
                admitted += 1;
            }
        }
        admitted
    }

    pub fn total_comments(&self) -> usize {
        self.total_comments
    }

    pub fn aggregates(&self) -> &CommentAggregates {
        &self.aggregates
    }

    pub fn base_listing_url(&self) -> Option<&str> {
        self.base_listing_url.as_deref()
    }

    /// Records the listing URL the first time one is known.
    pub fn set_base_listing_url(&mut self, url: String) {
        if self.base_listing_url.is_none() {
            self.base_listing_url = Some(url);
        }
    }
}
