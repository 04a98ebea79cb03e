//! Markup builders shared by the unit tests.

pub struct Block<'a> {
    pub id: Option<&'a str>,
    pub user: &'a str,
    pub href: &'a str,
    pub text: &'a str,
    pub timestamp: &'a str,
    pub presence: &'a str,
}

impl<'a> Block<'a> {
    pub fn new(id: &'a str, user: &'a str, text: &'a str) -> Self {
        Self {
            id: Some(id),
            user,
            href: "https://steamcommunity.com/profiles/76561198000000001",
            text,
            timestamp: "1 Jan, 2024 @ 10:00am",
            presence: "online",
        }
    }

    pub fn render(&self) -> String {
        let id_attr = self
            .id
            .map(|id| format!(" id=\"comment_{id}\""))
            .unwrap_or_default();
        format!(
            r#"<div class="commentthread_comment responsive_body_text"{id_attr}>
  <div class="commentthread_comment_avatar playerAvatar {presence}">
    <a href="{href}"><img src="https://avatars.fastly.steamstatic.com/abc_medium.jpg"></a>
  </div>
  <div class="commentthread_comment_content">
    <div class="commentthread_comment_author">
      <a class="hoverunderline commentthread_author_link" href="{href}"><bdi>{user}</bdi></a>
      <span class="commentthread_comment_timestamp" title="{timestamp}">{timestamp}</span>
    </div>
    <div class="commentthread_comment_text">{text}</div>
  </div>
</div>"#,
            presence = self.presence,
            href = self.href,
            user = self.user,
            timestamp = self.timestamp,
            text = self.text,
        )
    }
}

pub fn page(blocks: &[Block<'_>]) -> String {
    page_with_extra("", blocks)
}

/// Page with `extra` markup (scripts, links) placed ahead of the thread.
pub fn page_with_extra(extra: &str, blocks: &[Block<'_>]) -> String {
    let body = blocks.iter().map(Block::render).collect::<Vec<_>>().join("\n");
    format!(
        r#"<!DOCTYPE html><html><head><title>Steam Community</title></head><body>
{extra}
<div class="commentthread_comments">{body}</div>
</body></html>"#
    )
}

pub fn init_script(total_count: usize) -> String {
    format!(
        r#"<script type="text/javascript">
InitializeCommentThread( "Profile", "Profile_76561198000000001_0", {{"feature":"-1","feature2":-1,"owner":"76561198000000001","total_count":{total_count},"start":0,"pagesize":6}}, 'https://steamcommunity.com/comment/Profile/', 40 );
</script>"#
    )
}

pub fn all_comments_link(href: &str, total_count: usize) -> String {
    format!(
        r#"<a class="commentthread_allcommentslink" href="{href}">View all {total_count} comments ({total_count})</a>"#
    )
}
