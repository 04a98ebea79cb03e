use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

pub const DEFAULT_MAX_PAGES: usize = 200;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Parser, Clone)]
#[command(
    name = "steam-comments",
    version,
    about = "Crawl a Steam profile's comment thread and export it as JSON and CSV"
)]
pub struct Cli {
    /// Profile URL; prompted for when omitted.
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Upper bound on listing pages to crawl, 0 for no limit.
    #[arg(long, value_name = "N")]
    pub max_pages: Option<usize>,

    #[arg(long, value_name = "DIR", default_value = "data")]
    pub output_dir: String,

    #[arg(long, value_name = "NAME", default_value = "steam_profile_comments")]
    pub basename: String,

    #[arg(long, value_name = "N", default_value_t = 25)]
    pub top: usize,

    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub delay_ms: u64,

    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub settle_ms: u64,

    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,

    /// Print the first comment of the first three users after the crawl
    /// without asking; interactive runs otherwise ask.
    #[arg(long, default_value_t = false)]
    pub sample: bool,

    #[arg(long, default_value_t = false)]
    pub no_pause: bool,

    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Knobs the orchestrator and the HTTP page source read.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_pages: Option<usize>,
    /// Pause before every request after the first page.
    pub page_delay: Duration,
    /// Pause after a page was fetched and parsed.
    pub settle_delay: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: Some(DEFAULT_MAX_PAGES),
            page_delay: Duration::from_millis(500),
            settle_delay: Duration::from_millis(200),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlConfig {
    pub fn from_cli(cli: &Cli, max_pages: usize) -> Self {
        Self {
            max_pages: (max_pages > 0).then_some(max_pages),
            page_delay: Duration::from_millis(cli.delay_ms),
            settle_delay: Duration::from_millis(cli.settle_ms),
            request_timeout: Duration::from_secs(cli.timeout_secs.max(1)),
            user_agent: cli
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PresenceStatus {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "offline")]
    Offline,
    #[serde(rename = "in-game")]
    InGame,
    #[serde(rename = "unknown")]
    Unknown,
}

impl PresenceStatus {
    pub fn label(self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
            PresenceStatus::InGame => "in-game",
            PresenceStatus::Unknown => "unknown",
        }
    }

    /// Reads presence from an avatar frame's class list. `online` wins over
    /// `offline`, which wins over `in-game`.
    pub fn from_classes(classes: &str) -> Self {
        if classes.contains("online") {
            PresenceStatus::Online
        } else if classes.contains("offline") {
            PresenceStatus::Offline
        } else if classes.contains("in-game") {
            PresenceStatus::InGame
        } else {
            PresenceStatus::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentRecord {
    pub user: String,
    pub author_id: Option<String>,
    pub profile_url: String,
    pub comment_text: String,
    pub timestamp: String,
    pub avatar_url: String,
    pub status: PresenceStatus,
    pub comment_id: String,
    pub extracted_at: String,
}

/// Comments attributed to one display name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserAggregate {
    count: usize,
    comments: Vec<CommentRecord>,
}

impl UserAggregate {
    pub fn push(&mut self, record: CommentRecord) {
        self.comments.push(record);
        self.count = self.comments.len();
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn comments(&self) -> &[CommentRecord] {
        &self.comments
    }
}

/// Display name to aggregate, iterated in first-discovery order.
///
/// Keyed by display name only; two accounts sharing a name share an entry.
#[derive(Debug, Clone, Default)]
pub struct CommentAggregates {
    users: Vec<(String, UserAggregate)>,
    index: HashMap<String, usize>,
}

impl CommentAggregates {
    pub fn get_or_create(&mut self, user: &str) -> &mut UserAggregate {
        let slot = match self.index.get(user) {
            Some(&slot) => slot,
            None => {
                self.users.push((user.to_string(), UserAggregate::default()));
                let slot = self.users.len() - 1;
                self.index.insert(user.to_string(), slot);
                slot
            }
        };
        &mut self.users[slot].1
    }

    #[cfg(test)]
    pub fn get(&self, user: &str) -> Option<&UserAggregate> {
        self.index.get(user).map(|&slot| &self.users[slot].1)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UserAggregate)> {
        self.users.iter().map(|(user, agg)| (user.as_str(), agg))
    }

    pub fn records(&self) -> impl Iterator<Item = &CommentRecord> {
        self.users.iter().flat_map(|(_, agg)| agg.comments.iter())
    }

    /// Users sorted by comment count, highest first; ties keep discovery order.
    pub fn top_users(&self, limit: usize) -> Vec<(&str, &UserAggregate)> {
        let mut ranked = self.iter().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.count().cmp(&a.1.count()));
        ranked.truncate(limit);
        ranked
    }
}

impl Serialize for CommentAggregates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.users.len()))?;
        for (user, aggregate) in &self.users {
            map.serialize_entry(user, aggregate)?;
        }
        map.end()
    }
}
