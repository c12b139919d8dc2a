//! Normalizes the API's nested instruction/entry timeline payloads into flat
//! domain records. The same structure is shared by tweet timelines, user
//! timelines, list timelines and the follow graph, with small per-family
//! differences (entries vs moduleItems vs a single replaced entry).
//!
//! Unrecognized shapes are skipped, never crashed on: the payloads are
//! versioned by nobody and change without notice.

use crate::domain::model::{
    BookmarkFolder, Tweet, TweetArticle, TweetMedia, TwitterList, UserProfile,
};
use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// remaining budget for nested quoted-tweet expansion; 0 disables it
    pub quote_depth: u8,
    /// attach the untouched API payload to every record
    pub include_raw: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            quote_depth: 1,
            include_raw: false,
        }
    }
}

/// flatten all instruction blocks into their item contents, in order
fn entry_contents(instructions: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    let blocks = match instructions.as_array() {
        Some(blocks) => blocks,
        None => return out,
    };

    for block in blocks {
        // TimelineAddEntries and friends
        if let Some(entries) = block.get("entries").and_then(|v| v.as_array()) {
            for entry in entries {
                collect_content(entry.get("content"), &mut out);
            }
        }
        // TimelineReplaceEntry carries a single entry
        if let Some(entry) = block.get("entry") {
            collect_content(entry.get("content"), &mut out);
        }
        // TimelineAddToModule appends items to an existing module
        if let Some(items) = block.get("moduleItems").and_then(|v| v.as_array()) {
            for item in items {
                collect_content(item.get("item"), &mut out);
            }
        }
    }

    out
}

fn collect_content<'a>(content: Option<&'a Value>, out: &mut Vec<&'a Value>) {
    let content = match content {
        Some(content) => content,
        None => return,
    };

    // module entries (threads, follow lists) nest their items one level deeper
    if let Some(items) = content.get("items").and_then(|v| v.as_array()) {
        for item in items {
            if let Some(item_content) = item.get("item").and_then(|i| i.get("itemContent")) {
                out.push(item_content);
            }
        }
        return;
    }
    if let Some(item_content) = content.get("itemContent") {
        out.push(item_content);
        return;
    }
    // cursor entries carry their payload directly on the content object
    out.push(content);
}

pub fn parse_tweets_from_instructions(instructions: &Value, opts: &ParseOptions) -> Vec<Tweet> {
    let mut tweets = Vec::new();
    for content in entry_contents(instructions) {
        if let Some(result) = content.get("tweet_results").and_then(|v| v.get("result")) {
            if let Some(tweet) = map_tweet_result(result, opts.quote_depth, opts.include_raw) {
                tweets.push(tweet);
            }
        }
    }
    tweets
}

pub fn parse_users_from_instructions(instructions: &Value) -> Vec<UserProfile> {
    let mut users = Vec::new();
    for content in entry_contents(instructions) {
        if let Some(result) = content.get("user_results").and_then(|v| v.get("result")) {
            if let Some(user) = map_user_result(result) {
                users.push(user);
            }
        }
    }
    users
}

pub fn parse_lists_from_instructions(instructions: &Value) -> Vec<TwitterList> {
    let mut lists = Vec::new();
    for content in entry_contents(instructions) {
        if let Some(list) = content.get("list").and_then(map_list_result) {
            lists.push(list);
        }
    }
    lists
}

/// only the Bottom cursor continues pagination; Top and gap cursors are not
/// page boundaries
pub fn bottom_cursor(instructions: &Value) -> Option<String> {
    for content in entry_contents(instructions) {
        if content.get("cursorType").and_then(|v| v.as_str()) == Some("Bottom") {
            if let Some(value) = content.get("value").and_then(|v| v.as_str()) {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn unwrap_tweet(result: &Value) -> Option<&Value> {
    match result.get("__typename").and_then(|v| v.as_str()) {
        Some("Tweet") | None => Some(result),
        Some("TweetWithVisibilityResults") => result.get("tweet"),
        // tombstones and unknown variants are dropped
        _ => None,
    }
}

fn unwrap_user(result: &Value) -> Option<&Value> {
    match result.get("__typename").and_then(|v| v.as_str()) {
        Some("User") | None => Some(result),
        Some("UserWithVisibilityResults") => result.get("user"),
        _ => None,
    }
}

fn string_field(value: Option<&Value>, field: &str) -> Option<String> {
    value
        .and_then(|v| v.get(field))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn count_field(legacy: &Value, field: &str) -> u64 {
    legacy.get(field).and_then(|v| v.as_u64()).unwrap_or(0)
}

/// (id, screen name, display name) of the tweet author; None drops the tweet
fn author_identity(user_result: &Value) -> Option<(String, String, String)> {
    let user = unwrap_user(user_result)?;
    let id = string_field(Some(user), "rest_id")?;

    let legacy = user.get("legacy");
    let core = user.get("core");
    // the legacy sub-object is authoritative when present
    let username =
        string_field(legacy, "screen_name").or_else(|| string_field(core, "screen_name"))?;
    let name = string_field(legacy, "name")
        .or_else(|| string_field(core, "name"))
        .unwrap_or_else(|| username.clone());

    Some((id, username, name))
}

pub fn map_tweet_result(result: &Value, quote_depth: u8, include_raw: bool) -> Option<Tweet> {
    let result = unwrap_tweet(result)?;
    let legacy = result.get("legacy")?;

    let id = string_field(Some(result), "rest_id").or_else(|| string_field(Some(legacy), "id_str"))?;

    // a tweet whose author cannot be resolved is not emitted
    let (user_id, username, user_name) = result
        .get("core")
        .and_then(|core| core.get("user_results"))
        .and_then(|users| users.get("result"))
        .and_then(author_identity)?;

    let article = extract_article(result);
    let text = match render_article_text(result, article.as_ref()) {
        Some(rendered) => rendered,
        None => string_field(Some(legacy), "full_text").unwrap_or_default(),
    };

    let quote = if quote_depth > 0 {
        result
            .get("quoted_status_result")
            .and_then(|quoted| quoted.get("result"))
            .and_then(|quoted| map_tweet_result(quoted, quote_depth - 1, include_raw))
            .map(Box::new)
    } else {
        // budget exhausted: omit the field entirely, never stub it
        None
    };

    Some(Tweet {
        conversation_id: string_field(Some(legacy), "conversation_id_str").unwrap_or_else(|| id.clone()),
        id,
        user: username,
        user_name,
        user_id: Some(user_id),
        text,
        created_at: string_field(Some(legacy), "created_at").unwrap_or_default(),
        reply_count: count_field(legacy, "reply_count"),
        retweet_count: count_field(legacy, "retweet_count"),
        like_count: count_field(legacy, "favorite_count"),
        in_reply_to_status_id: string_field(Some(legacy), "in_reply_to_status_id_str"),
        quote,
        media: parse_media(legacy),
        article,
        raw: if include_raw { Some(result.clone()) } else { None },
    })
}

pub fn map_user_result(result: &Value) -> Option<UserProfile> {
    let user = unwrap_user(result)?;
    let legacy = user.get("legacy");
    let core = user.get("core");

    let id = string_field(Some(user), "rest_id")?;
    let username =
        string_field(legacy, "screen_name").or_else(|| string_field(core, "screen_name"))?;
    let name = string_field(legacy, "name")
        .or_else(|| string_field(core, "name"))
        .unwrap_or_else(|| username.clone());

    Some(UserProfile {
        id,
        username,
        name,
        description: string_field(legacy, "description"),
        followers_count: legacy.and_then(|l| l.get("followers_count")).and_then(|v| v.as_u64()),
        following_count: legacy.and_then(|l| l.get("friends_count")).and_then(|v| v.as_u64()),
        is_blue_verified: user.get("is_blue_verified").and_then(|v| v.as_bool()),
        profile_image_url: string_field(legacy, "profile_image_url_https"),
        created_at: string_field(legacy, "created_at"),
    })
}

fn map_list_result(list: &Value) -> Option<TwitterList> {
    Some(TwitterList {
        id: string_field(Some(list), "id_str")?,
        name: string_field(Some(list), "name")?,
        description: string_field(Some(list), "description"),
        member_count: list.get("member_count").and_then(|v| v.as_u64()),
    })
}

pub fn parse_bookmark_folders(slice: &Value) -> Vec<BookmarkFolder> {
    let items = match slice.get("items").and_then(|v| v.as_array()) {
        Some(items) => items,
        None => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| {
            Some(BookmarkFolder {
                id: string_field(Some(item), "id")?,
                name: string_field(Some(item), "name")?,
            })
        })
        .collect()
}

pub fn extract_article(result: &Value) -> Option<TweetArticle> {
    let article = result
        .get("article")?
        .get("article_results")?
        .get("result")?;
    let title = string_field(Some(article), "title")?;

    Some(TweetArticle {
        title,
        preview_text: string_field(Some(article), "preview_text"),
    })
}

/// render the block-structured rich text of a long-form article to a flat
/// string, one line per block. The title leads the text as a markdown
/// heading; when the first block already is that heading it is rendered in
/// place rather than emitted twice.
fn render_article_text(result: &Value, article: Option<&TweetArticle>) -> Option<String> {
    let article = article?;
    let blocks = result
        .get("article")?
        .get("article_results")?
        .get("result")?
        .get("content_state")?
        .get("blocks")?
        .as_array()?;

    let leading_title_heading = blocks.first().map_or(false, |block| {
        block_kind(block) == "header-one" && block_text(block) == article.title
    });

    let mut lines: Vec<String> = Vec::new();
    if !leading_title_heading {
        lines.push(format!("# {}", article.title));
    }
    for block in blocks {
        let text = block_text(block);
        let line = match block_kind(block) {
            "header-one" => format!("# {text}"),
            "header-two" => format!("## {text}"),
            "unordered-list-item" => format!("- {text}"),
            _ => text.to_string(),
        };
        lines.push(line);
    }

    Some(lines.join("\n"))
}

fn block_text(block: &Value) -> &str {
    block.get("text").and_then(|v| v.as_str()).unwrap_or("")
}

fn block_kind(block: &Value) -> &str {
    block.get("type").and_then(|v| v.as_str()).unwrap_or("unstyled")
}

/// media extraction from the legacy extended entities; for videos the
/// highest-bitrate mp4 variant wins (the m3u8 variant carries no bitrate)
fn parse_media(legacy: &Value) -> Option<Vec<TweetMedia>> {
    let media_json = legacy
        .get("extended_entities")?
        .get("media")?
        .as_array()?;

    let mut media: Vec<TweetMedia> = Vec::new();
    for item in media_json {
        let kind = match item.get("type").and_then(|v| v.as_str()) {
            Some(kind) => kind.to_string(),
            None => continue,
        };
        let url = match item.get("media_url_https").and_then(|v| v.as_str()) {
            Some(url) => url.to_string(),
            None => continue,
        };

        let mut video_url: Option<String> = None;
        if kind == "video" {
            if let Some(variants) = item
                .get("video_info")
                .and_then(|v| v.get("variants"))
                .and_then(|v| v.as_array())
            {
                let mut highest_bitrate = 0;
                for variant in variants {
                    let bitrate = variant.get("bitrate").and_then(|v| v.as_i64()).unwrap_or(0);
                    if bitrate >= highest_bitrate {
                        if let Some(variant_url) = variant.get("url").and_then(|v| v.as_str()) {
                            highest_bitrate = bitrate;
                            video_url = Some(variant_url.to_string());
                        }
                    }
                }
            }
        } else if kind == "animated_gif" {
            // gifs ship a single variant
            video_url = item
                .get("video_info")
                .and_then(|v| v.get("variants"))
                .and_then(|v| v.get(0))
                .and_then(|v| v.get("url"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }

        media.push(TweetMedia {
            kind,
            url,
            video_url,
        });
    }

    if media.is_empty() {
        None
    } else {
        Some(media)
    }
}
