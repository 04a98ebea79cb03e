//! Total-count and listing-URL discovery on a profile's first page, and
//! paged URL construction for the "all comments" listing.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::extract::{ProfileRef, element_text};

pub const COMMENTS_PER_PAGE: usize = 50;
pub const PAGE_PARAM: &str = "p";

static INIT_THREAD_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"InitializeCommentThread\s*\(\s*[^,]+,\s*[^,]+,\s*(\{[^}]+\})").unwrap()
});
static PARENTHESIZED_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)\)").unwrap());
static PROFILE_DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"g_rgProfileData\s*=\s*(\{[^}]+\})").unwrap());

const ALL_COMMENTS_LINK: &str = "a.commentthread_allcommentslink";

/// What the first page says about the rest of the thread.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    pub total_count: usize,
    pub listing_url: Option<String>,
}

impl Resolution {
    /// Pages needed for `total_count`, capped at `max_pages` when given.
    pub fn total_pages(&self, max_pages: Option<usize>) -> usize {
        let pages = self.total_count.div_ceil(COMMENTS_PER_PAGE);
        match max_pages {
            Some(limit) => pages.min(limit),
            None => pages,
        }
    }
}

/// A parsed first page together with the URL it was requested from.
pub struct FirstPage<'a> {
    doc: Html,
    requested_url: &'a str,
}

impl<'a> FirstPage<'a> {
    pub fn parse(markup: &str, requested_url: &'a str) -> Self {
        Self {
            doc: Html::parse_document(markup),
            requested_url,
        }
    }
}

type Strategy<T> = (&'static str, fn(&FirstPage<'_>) -> Option<T>);

pub const TOTAL_COUNT_STRATEGIES: &[Strategy<usize>] = &[
    ("init_script", total_from_init_script),
    ("all_comments_link", total_from_all_comments_link),
    ("totalcount_element", total_from_totalcount_element),
];

pub const LISTING_URL_STRATEGIES: &[Strategy<String>] = &[
    ("all_comments_link", listing_from_all_comments_link),
    ("profile_data", listing_from_profile_data),
    ("request_url", listing_from_request_url),
];

fn first_success<T>(page: &FirstPage<'_>, strategies: &[Strategy<T>], field: &str) -> Option<T> {
    strategies.iter().find_map(|(name, strategy)| {
        let found = strategy(page);
        if found.is_some() {
            debug!(field, strategy = name, "resolved");
        }
        found
    })
}

pub fn resolve(markup: &str, requested_url: &str) -> Resolution {
    let page = FirstPage::parse(markup, requested_url);
    Resolution {
        total_count: first_success(&page, TOTAL_COUNT_STRATEGIES, "total_count").unwrap_or(0),
        listing_url: first_success(&page, LISTING_URL_STRATEGIES, "listing_url"),
    }
}

fn parse_selector(css: &str) -> Option<Selector> {
    Selector::parse(css)
        .map_err(|err| debug!(selector = css, error = ?err, "invalid selector"))
        .ok()
}

fn json_object(raw: &str, source: &str) -> Option<Value> {
    serde_json::from_str::<Value>(raw)
        .map_err(|err| debug!(source, error = %err, "malformed embedded JSON"))
        .ok()
}

/// Accepts both `123` and `"123"`.
fn json_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn total_from_init_script(page: &FirstPage<'_>) -> Option<usize> {
    let selector = parse_selector("script")?;
    page.doc.select(&selector).find_map(|script| {
        let body = script.text().collect::<String>();
        if !body.contains("InitializeCommentThread") {
            return None;
        }
        let caps = INIT_THREAD_CALL.captures(&body)?;
        let data = json_object(&caps[1], "InitializeCommentThread")?;
        json_number(data.get("total_count")?).map(|n| n as usize)
    })
}

fn total_from_all_comments_link(page: &FirstPage<'_>) -> Option<usize> {
    let selector = parse_selector(ALL_COMMENTS_LINK)?;
    let link = page.doc.select(&selector).next()?;
    let text = element_text(link);
    PARENTHESIZED_COUNT.captures(&text)?[1].parse().ok()
}

fn total_from_totalcount_element(page: &FirstPage<'_>) -> Option<usize> {
    let selector = parse_selector(r#"[id*="totalcount"]"#)?;
    let el = page.doc.select(&selector).next()?;
    let text = element_text(el);
    text.parse()
        .map_err(|err| debug!(text = %text, error = %err, "totalcount element is not a number"))
        .ok()
}

fn listing_from_all_comments_link(page: &FirstPage<'_>) -> Option<String> {
    let selector = parse_selector(ALL_COMMENTS_LINK)?;
    let href = page
        .doc
        .select(&selector)
        .next()?
        .value()
        .attr("href")?
        .trim();
    if href.is_empty() {
        return None;
    }
    absolutize(href, page.requested_url)
}

fn listing_from_profile_data(page: &FirstPage<'_>) -> Option<String> {
    let text = page.doc.root_element().text().collect::<String>();
    let caps = PROFILE_DATA.captures(&text)?;
    let data = json_object(&caps[1], "g_rgProfileData")?;
    let steamid = match data.get("steamid")? {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(ProfileRef::Numeric(steamid).all_comments_url())
}

fn listing_from_request_url(page: &FirstPage<'_>) -> Option<String> {
    ProfileRef::parse(page.requested_url).map(|profile| profile.all_comments_url())
}

/// Root-relative links land on `https://` plus the request's authority; other
/// relative links resolve against the request URL itself.
pub fn absolutize(href: &str, requested_url: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }

    let base = Url::parse(requested_url)
        .map_err(|err| debug!(url = requested_url, error = %err, "unparsable request URL"))
        .ok()?;
    let resolved = if href.starts_with('/') {
        let host = base.host_str()?;
        let origin = match base.port() {
            Some(port) => format!("https://{host}:{port}"),
            None => format!("https://{host}"),
        };
        Url::parse(&origin).ok()?.join(href).ok()?
    } else {
        base.join(href).ok()?
    };
    Some(resolved.to_string())
}

/// URL of listing page `page`.
///
/// Page 1 without an explicit page parameter is the listing URL itself. Other
/// query parameters keep their order and values.
pub fn build_page_url(listing_url: &str, page: usize) -> String {
    let Ok(mut url) = Url::parse(listing_url) else {
        return listing_url.to_string();
    };

    let pairs = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect::<Vec<_>>();
    let has_page_param = pairs.iter().any(|(k, _)| k == PAGE_PARAM);
    if page == 1 && !has_page_param {
        return listing_url.to_string();
    }

    let page_value = page.to_string();
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut page_written = false;
    for (k, v) in &pairs {
        if k == PAGE_PARAM {
            if !page_written {
                serializer.append_pair(PAGE_PARAM, &page_value);
                page_written = true;
            }
        } else {
            serializer.append_pair(k, v);
        }
    }
    if !page_written {
        serializer.append_pair(PAGE_PARAM, &page_value);
    }
    url.set_query(Some(&serializer.finish()));
    url.to_string()
}
