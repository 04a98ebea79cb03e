//! Comment extraction from rendered thread markup.
//!
//! Every field is located through an ordered list of [`Strategy`] values; the
//! first strategy that yields an element wins. A block that cannot produce an
//! author link or a non-empty comment text is dropped here, so callers only
//! ever see complete records.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::types::{CommentRecord, PresenceStatus};

static PROFILE_NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/profiles/(\d+)").unwrap());
static PROFILE_VANITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/id/([^/?#]+)").unwrap());

const COMMENT_ID_PREFIX: &str = "comment_";
const SYNTHESIZED_HASH_MODULUS: u64 = 1_000_000;

/// One way of locating elements below a scope element.
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    /// A CSS selector.
    Css(&'static str),
    /// `tag` elements whose class attribute contains any needle, ignoring case.
    ClassContains {
        tag: &'static str,
        needles: &'static [&'static str],
    },
    /// `tag` elements whose `attr` value contains any needle.
    AttrContains {
        tag: &'static str,
        attr: &'static str,
        needles: &'static [&'static str],
    },
}

impl Strategy {
    pub fn find_all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match *self {
            Strategy::Css(css) => match Selector::parse(css) {
                Ok(selector) => scope.select(&selector).collect(),
                Err(err) => {
                    debug!(selector = css, error = ?err, "invalid selector");
                    Vec::new()
                }
            },
            Strategy::ClassContains { tag, needles } => descendants_named(scope, tag)
                .filter(|el| {
                    el.value().attr("class").is_some_and(|class| {
                        let class = class.to_ascii_lowercase();
                        needles
                            .iter()
                            .any(|needle| class.contains(&needle.to_ascii_lowercase()))
                    })
                })
                .collect(),
            Strategy::AttrContains { tag, attr, needles } => descendants_named(scope, tag)
                .filter(|el| {
                    el.value()
                        .attr(attr)
                        .is_some_and(|value| needles.iter().any(|needle| value.contains(needle)))
                })
                .collect(),
        }
    }

    pub fn find_first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.find_all(scope).into_iter().next()
    }
}

fn descendants_named<'a>(
    scope: ElementRef<'a>,
    tag: &'static str,
) -> impl Iterator<Item = ElementRef<'a>> {
    scope
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name().eq_ignore_ascii_case(tag))
}

/// First element produced by the first strategy that produces one.
pub fn first_match<'a>(scope: ElementRef<'a>, strategies: &[Strategy]) -> Option<ElementRef<'a>> {
    strategies.iter().find_map(|strategy| strategy.find_first(scope))
}

/// All elements of the first strategy that produces any.
pub fn all_matches<'a>(scope: ElementRef<'a>, strategies: &[Strategy]) -> Vec<ElementRef<'a>> {
    strategies
        .iter()
        .map(|strategy| strategy.find_all(scope))
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}

pub const COMMENT_BLOCKS: &[Strategy] = &[
    Strategy::Css("div.commentthread_comment"),
    Strategy::ClassContains {
        tag: "div",
        needles: &["comment"],
    },
];

pub const AUTHOR_LINK: &[Strategy] = &[
    Strategy::Css("a.commentthread_author_link"),
    Strategy::AttrContains {
        tag: "a",
        attr: "href",
        needles: &["/profiles/", "/id/"],
    },
];

pub const COMMENT_TEXT: &[Strategy] = &[
    Strategy::Css("div.commentthread_comment_text"),
    Strategy::ClassContains {
        tag: "div",
        needles: &["text"],
    },
];

pub const TIMESTAMP: &[Strategy] = &[
    Strategy::Css("span.commentthread_comment_timestamp"),
    Strategy::ClassContains {
        tag: "span",
        needles: &["timestamp"],
    },
];

pub const AVATAR_IMAGE: &[Strategy] = &[
    Strategy::AttrContains {
        tag: "img",
        attr: "src",
        needles: &["avatars.fastly.steamstatic.com"],
    },
    Strategy::AttrContains {
        tag: "img",
        attr: "src",
        needles: &["steamstatic.com"],
    },
];

pub const PRESENCE_FRAME: &[Strategy] = &[Strategy::ClassContains {
    tag: "div",
    needles: &["commentthread_comment_avatar", "playerAvatar"],
}];

/// A profile reference found in a URL path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileRef {
    /// `/profiles/<steamid64>`
    Numeric(String),
    /// `/id/<vanity>`
    Vanity(String),
}

impl ProfileRef {
    /// Numeric ids take precedence over vanity handles.
    pub fn parse(url: &str) -> Option<Self> {
        if let Some(caps) = PROFILE_NUMERIC.captures(url) {
            return Some(ProfileRef::Numeric(caps[1].to_string()));
        }
        PROFILE_VANITY
            .captures(url)
            .map(|caps| ProfileRef::Vanity(caps[1].to_string()))
    }

    pub fn id(&self) -> &str {
        match self {
            ProfileRef::Numeric(id) | ProfileRef::Vanity(id) => id,
        }
    }

    pub fn all_comments_url(&self) -> String {
        match self {
            ProfileRef::Numeric(id) => {
                format!("https://steamcommunity.com/profiles/{id}/allcomments")
            }
            ProfileRef::Vanity(id) => format!("https://steamcommunity.com/id/{id}/allcomments"),
        }
    }
}

pub fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn element_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Stable 64-bit digest of `text`: the leading eight bytes of its SHA-256.
pub fn stable_text_hash(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

pub fn synthesize_comment_id(user: &str, timestamp: &str, text: &str) -> String {
    format!(
        "{user}_{timestamp}_{}",
        stable_text_hash(text) % SYNTHESIZED_HASH_MODULUS
    )
}

fn explicit_comment_id(block: ElementRef<'_>) -> Option<String> {
    let raw = block.value().attr("id")?.trim();
    let id = raw.strip_prefix(COMMENT_ID_PREFIX).unwrap_or(raw);
    (!id.is_empty()).then(|| id.to_string())
}

fn timestamp_value(el: ElementRef<'_>) -> String {
    el.value()
        .attr("title")
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| element_text(el))
}

/// Comment blocks of a parsed page.
///
/// Matches nested inside another match are dropped, so a wrapper `div`
/// inside a comment never becomes a second block.
pub fn comment_blocks(doc: &Html) -> Vec<ElementRef<'_>> {
    outermost(all_matches(doc.root_element(), COMMENT_BLOCKS))
}

fn outermost(found: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    let ids = found.iter().map(|el| el.id()).collect::<HashSet<_>>();
    found
        .into_iter()
        .filter(|el| !el.ancestors().any(|node| ids.contains(&node.id())))
        .collect()
}

/// Builds one record from a comment block, or `None` when the block has no
/// author link, no display name or no comment text.
pub fn extract_record(block: ElementRef<'_>) -> Option<CommentRecord> {
    let author_link = first_match(block, AUTHOR_LINK)?;
    let user = element_text(author_link);
    if user.is_empty() {
        return None;
    }

    let comment_text = first_match(block, COMMENT_TEXT)
        .map(element_text)
        .unwrap_or_default();
    if comment_text.trim().is_empty() {
        return None;
    }

    let profile_url = author_link
        .value()
        .attr("href")
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let author_id = ProfileRef::parse(&profile_url).map(|profile| profile.id().to_string());

    let timestamp = first_match(block, TIMESTAMP)
        .map(timestamp_value)
        .unwrap_or_default();

    let avatar_url = first_match(block, AVATAR_IMAGE)
        .and_then(|img| img.value().attr("src"))
        .unwrap_or_default()
        .to_string();

    let status = first_match(block, PRESENCE_FRAME)
        .and_then(|frame| frame.value().attr("class"))
        .map(PresenceStatus::from_classes)
        .unwrap_or(PresenceStatus::Unknown);

    let comment_id = explicit_comment_id(block)
        .unwrap_or_else(|| synthesize_comment_id(&user, &timestamp, &comment_text));

    Some(CommentRecord {
        user,
        author_id,
        profile_url,
        comment_text,
        timestamp,
        avatar_url,
        status,
        comment_id,
        extracted_at: Utc::now().to_rfc3339(),
    })
}

/// Every complete record on a page, in document order.
pub fn extract_page(markup: &str) -> Vec<CommentRecord> {
    let doc = Html::parse_document(markup);
    let blocks = comment_blocks(&doc);
    let records = blocks
        .iter()
        .filter_map(|block| extract_record(*block))
        .collect::<Vec<_>>();
    debug!(
        blocks = blocks.len(),
        records = records.len(),
        "extracted page"
    );
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::fixtures::{Block, page};

    #[test]
    fn extracts_all_fields_from_steam_markup() {
        let markup = page(&[Block::new("4203", "Gabe", "nice profile")]);
        let records = extract_page(&markup);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.user, "Gabe");
        assert_eq!(record.author_id.as_deref(), Some("76561198000000001"));
        assert_eq!(
            record.profile_url,
            "https://steamcommunity.com/profiles/76561198000000001"
        );
        assert_eq!(record.comment_text, "nice profile");
        assert_eq!(record.timestamp, "1 Jan, 2024 @ 10:00am");
        assert_eq!(
            record.avatar_url,
            "https://avatars.fastly.steamstatic.com/abc_medium.jpg"
        );
        assert_eq!(record.status, PresenceStatus::Online);
        assert_eq!(record.comment_id, "4203");
        assert!(!record.extracted_at.is_empty());
    }

    #[test]
    fn vanity_handle_used_when_no_numeric_id() {
        let mut block = Block::new("1", "Robin", "hey");
        block.href = "https://steamcommunity.com/id/robin_hood/";
        let records = extract_page(&page(&[block]));
        assert_eq!(records[0].author_id.as_deref(), Some("robin_hood"));
    }

    #[test]
    fn author_id_absent_for_unrecognized_link() {
        let mut block = Block::new("1", "Robin", "hey");
        block.href = "https://example.com/users/robin";
        let records = extract_page(&page(&[block]));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].author_id, None);
    }

    #[test]
    fn blocks_without_text_or_author_are_dropped() {
        let markup = page(&[
            Block::new("1", "Empty", "   "),
            Block::new("2", "", "no name"),
            Block::new("3", "Kept", "body"),
        ]);
        let records = extract_page(&markup);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].comment_id, "3");

        let no_link = r#"<div class="commentthread_comment" id="comment_9">
            <div class="commentthread_comment_text">orphan</div></div>"#;
        assert!(extract_page(no_link).is_empty());
    }

    #[test]
    fn missing_id_synthesizes_a_stable_one() {
        let mut block = Block::new("", "Ann", "same words");
        block.id = None;
        let first = extract_page(&page(&[block]));
        let mut again = Block::new("", "Ann", "same words");
        again.id = None;
        let second = extract_page(&page(&[again]));

        assert_eq!(first[0].comment_id, second[0].comment_id);
        assert!(first[0].comment_id.starts_with("Ann_1 Jan, 2024 @ 10:00am_"));
        assert_eq!(
            first[0].comment_id,
            synthesize_comment_id("Ann", "1 Jan, 2024 @ 10:00am", "same words")
        );
    }

    #[test]
    fn empty_id_attribute_falls_back_to_synthesis() {
        let markup = r#"<div class="commentthread_comment" id="comment_">
            <a class="commentthread_author_link" href="/id/x">X</a>
            <div class="commentthread_comment_text">hello</div></div>"#;
        let records = extract_page(markup);
        assert_eq!(records[0].comment_id, synthesize_comment_id("X", "", "hello"));
    }

    #[test]
    fn synthesized_hash_is_bounded_and_text_sensitive() {
        let a = stable_text_hash("first") % SYNTHESIZED_HASH_MODULUS;
        let b = stable_text_hash("second") % SYNTHESIZED_HASH_MODULUS;
        assert!(a < SYNTHESIZED_HASH_MODULUS);
        assert_ne!(a, b);
        assert_eq!(stable_text_hash("first"), stable_text_hash("first"));
    }

    #[test]
    fn fallback_selectors_cover_renamed_markup() {
        let markup = r#"<html><body>
          <div class="UserComment" id="comment_77">
            <div class="avatarFrame playerAvatar in-game">
              <img src="https://shared.steamstatic.com/avatar.jpg">
            </div>
            <a href="https://steamcommunity.com/id/fallback_user">Fallback</a>
            <span class="CommentTimestamp">yesterday</span>
            <div class="BodyText">renamed classes</div>
          </div>
        </body></html>"#;
        let records = extract_page(markup);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.comment_id, "77");
        assert_eq!(record.user, "Fallback");
        assert_eq!(record.author_id.as_deref(), Some("fallback_user"));
        assert_eq!(record.comment_text, "renamed classes");
        assert_eq!(record.timestamp, "yesterday");
        assert_eq!(
            record.avatar_url,
            "https://shared.steamstatic.com/avatar.jpg"
        );
        assert_eq!(record.status, PresenceStatus::InGame);
    }

    #[test]
    fn nested_fallback_wrapper_is_not_a_second_comment() {
        let markup = r#"<html><body>
          <div class="UserComment" id="comment_77">
            <div class="CommentBody">
              <a href="/id/u">U</a>
              <div class="BodyText">only once</div>
            </div>
          </div>
          <div class="UserComment">
            <div class="CommentBody">
              <a href="/id/v">V</a>
              <div class="BodyText">no id here</div>
            </div>
          </div>
        </body></html>"#;
        let doc = Html::parse_document(markup);
        assert_eq!(comment_blocks(&doc).len(), 2);

        let records = extract_page(markup);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].comment_id, "77");
        assert_eq!(records[0].comment_text, "only once");
        assert_eq!(
            records[1].comment_id,
            synthesize_comment_id("V", "", "no id here")
        );
    }

    #[test]
    fn text_nodes_are_joined_with_a_single_space() {
        let doc = Html::parse_fragment(
            "<div class=\"commentthread_comment_text\">first line<br>second <b>bold</b>  end</div>",
        );
        let found = first_match(doc.root_element(), COMMENT_TEXT).unwrap();
        assert_eq!(element_text(found), "first line second bold end");
    }

    #[test]
    fn timestamp_uses_visible_text_without_title() {
        let markup = r#"<div class="commentthread_comment" id="comment_5">
            <a class="commentthread_author_link" href="/profiles/1">P</a>
            <span class="commentthread_comment_timestamp">  3 hours ago </span>
            <div class="commentthread_comment_text">t</div></div>"#;
        let records = extract_page(markup);
        assert_eq!(records[0].timestamp, "3 hours ago");
        assert_eq!(records[0].status, PresenceStatus::Unknown);
        assert_eq!(records[0].avatar_url, "");
    }

    #[test]
    fn first_successful_strategy_wins() {
        let doc = Html::parse_fragment(
            r#"<div><span class="stamp" title="a">x</span><span class="commentthread_comment_timestamp">b</span></div>"#,
        );
        let found = first_match(doc.root_element(), TIMESTAMP).unwrap();
        assert_eq!(element_text(found), "b");

        let strategies = [
            Strategy::Css("p.nothing"),
            Strategy::ClassContains {
                tag: "span",
                needles: &["STAMP"],
            },
        ];
        let found = first_match(doc.root_element(), &strategies).unwrap();
        assert_eq!(found.value().attr("title"), Some("a"));
    }

    #[test]
    fn profile_ref_prefers_numeric_segment() {
        assert_eq!(
            ProfileRef::parse("https://steamcommunity.com/profiles/7656/"),
            Some(ProfileRef::Numeric("7656".to_string()))
        );
        assert_eq!(
            ProfileRef::parse("https://steamcommunity.com/id/gaben"),
            Some(ProfileRef::Vanity("gaben".to_string()))
        );
        assert_eq!(ProfileRef::parse("https://steamcommunity.com/market"), None);
        assert_eq!(
            ProfileRef::Vanity("gaben".to_string()).all_comments_url(),
            "https://steamcommunity.com/id/gaben/allcomments"
        );
    }
}
