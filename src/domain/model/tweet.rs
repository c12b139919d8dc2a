use serde::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    /// id number of the tweet (last part of its url)
    pub id: String,
    /// screen name of the account that posted the tweet
    pub user: String,
    /// display name of the account that posted the tweet
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// full body; for long-form articles this is the rendered rich text
    pub text: String,
    pub created_at: String,
    pub reply_count: u64,
    pub retweet_count: u64,
    pub like_count: u64,
    /// id of the root tweet of the conversation this tweet belongs to
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_status_id: Option<String>,
    /// quoted tweet, expanded up to the caller's quote depth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Box<Tweet>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<TweetMedia>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article: Option<TweetArticle>,
    /// untouched API payload, attached only on request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetMedia {
    /// `photo` or `video` or `animated_gif`
    pub kind: String,
    pub url: String,
    /// highest-bitrate mp4 for videos, single variant for gifs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// long-form article metadata carried next to the rendered text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetArticle {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followers_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_blue_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterList {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkFolder {
    pub id: String,
    pub name: String,
}
