//! Every user-facing operation, each a thin composition: build the
//! operation's variables and feature switches, route the request through the
//! recovery-aware GraphQL client, normalize the payload, and (for list-shaped
//! operations) drive the cursor paginator until it terminates.

use crate::domain::interface::IHttpClient;
use crate::domain::model::*;
use crate::error::*;
use crate::infra::Session;
use crate::repository::graphql::{GraphqlClient, RequestOutcome};
use crate::repository::pagination::paginate_cursor;
use crate::repository::query_id::ops;
use crate::repository::timeline::{self, ParseOptions};
use crate::repository::v1_api::V1Api;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// error code the API answers with when it flags a write as automated
const AUTOMATED_REQUEST_CODE: i64 = 226;

/// feature switches the timeline operations require; requests missing them
/// are rejected outright
fn timeline_features() -> Value {
    json!({
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "responsive_web_twitter_blue_verified_badge_is_enabled": true,
        "verified_phone_label_enabled": false,
        "tweetypie_unmention_optimization_enabled": true,
        "responsive_web_uc_gql_enabled": true,
        "vibe_api_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "standardized_nudges_misinfo": true,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
        "interactive_text_enabled": true,
        "responsive_web_text_conversations_enabled": false,
        "responsive_web_enhance_cards_enabled": false,
        "longform_notetweets_consumption_enabled": true,
        "freedom_of_speech_not_reach_fetch_enabled": false,
    })
}

/// how `bookmarks` expands each bookmarked tweet into its conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadExpansion {
    None,
    /// every tweet of the bookmarked author in the conversation
    AuthorOnly,
    /// the author's consecutive run of tweets containing the bookmark
    AuthorChain,
    /// the whole conversation
    FullChain,
}

pub struct TweetRepository {
    graphql: GraphqlClient,
    v1: V1Api,
    /// resolved once per client instance, then reused
    current_user: Mutex<Option<UserProfile>>,
}

fn with_cursor(mut variables: Value, cursor: Option<String>) -> Value {
    if let Some(cursor) = cursor {
        variables["cursor"] = Value::String(cursor);
    }
    variables
}

fn instructions_at<'a>(json: &'a Value, path: &[&str]) -> &'a Value {
    let mut value = json;
    for key in path {
        value = &value[*key];
    }
    // Null when absent; the parsers then simply yield nothing
    value
}

impl TweetRepository {
    pub fn new(session: Session, http: Arc<dyn IHttpClient + Send + Sync>) -> TweetRepository {
        TweetRepository {
            graphql: GraphqlClient::new(session.clone(), http.clone()),
            v1: V1Api::new(session, http),
            current_user: Mutex::new(None),
        }
    }

    async fn paginate_tweets(
        &self,
        operation: &'static str,
        variables: Value,
        path: &'static [&'static str],
        opts: PaginateOptions,
        parse: ParseOptions,
        use_candidates: bool,
    ) -> Result<Paginated<Tweet>> {
        let gql = self.graphql.clone();
        paginate_cursor(
            opts,
            |tweet: &Tweet| tweet.id.clone(),
            move |cursor| {
                let gql = gql.clone();
                let variables = with_cursor(variables.clone(), cursor);
                async move {
                    let features = timeline_features();
                    let json = if use_candidates {
                        gql.fetch_with_candidates(operation, &variables, Some(&features))
                            .await?
                    } else {
                        gql.fetch(operation, &variables, Some(&features)).await?
                    };
                    let instructions = instructions_at(&json, path);
                    Ok(CursorPage {
                        items: timeline::parse_tweets_from_instructions(instructions, &parse),
                        next_cursor: timeline::bottom_cursor(instructions),
                    })
                }
            },
        )
        .await
    }

    async fn paginate_users(
        &self,
        operation: &'static str,
        variables: Value,
        path: &'static [&'static str],
        opts: PaginateOptions,
    ) -> Result<Paginated<UserProfile>> {
        let gql = self.graphql.clone();
        paginate_cursor(
            opts,
            |user: &UserProfile| user.id.clone(),
            move |cursor| {
                let gql = gql.clone();
                let variables = with_cursor(variables.clone(), cursor);
                async move {
                    let features = timeline_features();
                    let json = gql.fetch(operation, &variables, Some(&features)).await?;
                    let instructions = instructions_at(&json, path);
                    Ok(CursorPage {
                        items: timeline::parse_users_from_instructions(instructions),
                        next_cursor: timeline::bottom_cursor(instructions),
                    })
                }
            },
        )
        .await
    }

    /* ------------------------------ read path ------------------------------ */

    /// the conversation timeline around a tweet
    pub async fn get_thread(
        &self,
        tweet_id: &TweetID,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        let variables = json!({
            "focalTweetId": tweet_id.0.as_str(),
            "with_rux_injections": false,
            "includePromotedContent": false,
            "withCommunity": true,
            "withQuickPromoteEligibilityTweetFields": false,
            "withBirdwatchNotes": false,
            "withVoice": false,
            "withV2Timeline": true,
        });
        self.paginate_tweets(
            ops::TWEET_DETAIL,
            variables,
            &["data", "threaded_conversation_with_injections_v2", "instructions"],
            opts,
            parse,
            true,
        )
        .await
    }

    pub async fn get_tweet(&self, tweet_id: &TweetID, parse: ParseOptions) -> Result<Tweet> {
        let thread = self
            .get_thread(tweet_id, PaginateOptions::single_page(), parse)
            .await?;
        thread
            .items
            .into_iter()
            .find(|tweet| tweet.id == tweet_id.0)
            .ok_or_else(|| {
                ServiceError::new(
                    ApiError::NotFound,
                    anyhow::anyhow!("tweet {tweet_id} not found in the conversation payload"),
                )
            })
    }

    /// direct replies to a tweet
    pub async fn get_replies(
        &self,
        tweet_id: &TweetID,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        let mut thread = self.get_thread(tweet_id, opts, parse).await?;
        thread
            .items
            .retain(|tweet| tweet.in_reply_to_status_id.as_deref() == Some(tweet_id.0.as_str()));
        Ok(thread)
    }

    pub async fn search(
        &self,
        query: &str,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        let variables = json!({
            "rawQuery": query,
            "count": 20,
            "querySource": "typed_query",
            "product": "Latest",
        });
        self.paginate_tweets(
            ops::SEARCH_TIMELINE,
            variables,
            &["data", "search_by_raw_query", "search_timeline", "timeline", "instructions"],
            opts,
            parse,
            true,
        )
        .await
    }

    pub async fn get_mentions(
        &self,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        let me = self.current_user().await?;
        self.search(&format!("@{}", me.username), opts, parse).await
    }

    pub async fn get_user(&self, screen_name: &str) -> Result<UserProfile> {
        let variables = json!({
            "screen_name": screen_name,
            "withSafetyModeUserFields": true,
        });
        let features = timeline_features();
        let json = self
            .graphql
            .fetch(ops::USER_BY_SCREEN_NAME, &variables, Some(&features))
            .await?;
        timeline::map_user_result(&json["data"]["user"]["result"]).ok_or_else(|| {
            ServiceError::new(
                ApiError::NotFound,
                anyhow::anyhow!("user @{screen_name} not found or unavailable"),
            )
        })
    }

    fn user_timeline_variables(user_id: &str, count: u64) -> Value {
        json!({
            "userId": user_id,
            "count": count,
            "includePromotedContent": false,
            "withQuickPromoteEligibilityTweetFields": false,
            "withVoice": true,
            "withV2Timeline": true,
        })
    }

    pub async fn get_user_tweets(
        &self,
        screen_name: &str,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        let user = self.get_user(screen_name).await?;
        self.paginate_tweets(
            ops::USER_TWEETS,
            TweetRepository::user_timeline_variables(&user.id, 20),
            &["data", "user", "result", "timeline_v2", "timeline", "instructions"],
            opts,
            parse,
            false,
        )
        .await
    }

    /// likes of the given user, or of the session's own account
    pub async fn get_likes(
        &self,
        screen_name: Option<&str>,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        let user = match screen_name {
            Some(name) => self.get_user(name).await?,
            None => self.current_user().await?,
        };
        self.paginate_tweets(
            ops::LIKES,
            TweetRepository::user_timeline_variables(&user.id, 20),
            &["data", "user", "result", "timeline_v2", "timeline", "instructions"],
            opts,
            parse,
            false,
        )
        .await
    }

    pub async fn get_bookmarks(
        &self,
        folder: Option<&str>,
        expansion: ThreadExpansion,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        let mut page = match folder {
            Some(folder_id) => {
                let variables = json!({
                    "bookmark_collection_id": folder_id,
                    "count": 20,
                });
                self.paginate_tweets(
                    ops::BOOKMARK_FOLDER_TIMELINE,
                    variables,
                    &["data", "bookmark_collection_timeline", "timeline", "instructions"],
                    opts,
                    parse,
                    false,
                )
                .await?
            }
            None => {
                let variables = json!({ "count": 20, "includePromotedContent": false });
                self.paginate_tweets(
                    ops::BOOKMARKS,
                    variables,
                    &["data", "bookmark_timeline_v2", "timeline", "instructions"],
                    opts,
                    parse,
                    false,
                )
                .await?
            }
        };

        if expansion != ThreadExpansion::None {
            page.items = self.expand_bookmark_threads(page.items, expansion, parse).await;
        }
        Ok(page)
    }

    pub async fn get_bookmark_folders(&self) -> Result<Vec<BookmarkFolder>> {
        let json = self
            .graphql
            .fetch(ops::BOOKMARK_FOLDERS_SLICE, &json!({}), None)
            .await?;
        let slice = instructions_at(
            &json,
            &["data", "viewer", "user_results", "result", "bookmark_collections_slice"],
        );
        Ok(timeline::parse_bookmark_folders(slice))
    }

    async fn expand_bookmark_threads(
        &self,
        bookmarks: Vec<Tweet>,
        expansion: ThreadExpansion,
        parse: ParseOptions,
    ) -> Vec<Tweet> {
        let mut expanded: Vec<Tweet> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for bookmark in bookmarks {
            let thread = match self
                .get_thread(
                    &TweetID(bookmark.id.clone()),
                    PaginateOptions::single_page(),
                    parse,
                )
                .await
            {
                Ok(thread) => thread.items,
                Err(e) => {
                    // keep the unexpanded bookmark instead of losing it
                    log::warn!("could not expand bookmark {}: {}", bookmark.id, e.describe());
                    Vec::new()
                }
            };
            for tweet in filter_thread(&bookmark, thread, expansion) {
                if seen.insert(tweet.id.clone()) {
                    expanded.push(tweet);
                }
            }
        }

        expanded
    }

    pub async fn get_lists(&self) -> Result<Vec<TwitterList>> {
        let me = self.current_user().await?;
        let variables = json!({ "userId": me.id, "count": 100 });
        let features = timeline_features();
        let json = self
            .graphql
            .fetch(ops::COMBINED_LISTS, &variables, Some(&features))
            .await?;
        let instructions = instructions_at(
            &json,
            &["data", "user", "result", "timeline", "timeline", "instructions"],
        );
        Ok(timeline::parse_lists_from_instructions(instructions))
    }

    pub async fn get_list_timeline(
        &self,
        list_id: &ListID,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        let variables = json!({ "listId": list_id.0.as_str(), "count": 20 });
        self.paginate_tweets(
            ops::LIST_LATEST_TWEETS_TIMELINE,
            variables,
            &["data", "list", "tweets_timeline", "timeline", "instructions"],
            opts,
            parse,
            false,
        )
        .await
    }

    pub async fn get_following(
        &self,
        screen_name: Option<&str>,
        opts: PaginateOptions,
    ) -> Result<Paginated<UserProfile>> {
        self.follow_graph(ops::FOLLOWING, screen_name, opts).await
    }

    pub async fn get_followers(
        &self,
        screen_name: Option<&str>,
        opts: PaginateOptions,
    ) -> Result<Paginated<UserProfile>> {
        self.follow_graph(ops::FOLLOWERS, screen_name, opts).await
    }

    async fn follow_graph(
        &self,
        operation: &'static str,
        screen_name: Option<&str>,
        opts: PaginateOptions,
    ) -> Result<Paginated<UserProfile>> {
        let user = match screen_name {
            Some(name) => self.get_user(name).await?,
            None => self.current_user().await?,
        };
        let variables = json!({
            "userId": user.id,
            "count": 20,
            "includePromotedContent": false,
        });
        self.paginate_users(
            operation,
            variables,
            &["data", "user", "result", "timeline", "timeline", "instructions"],
            opts,
        )
        .await
    }

    /// the account this session belongs to, resolved once and cached
    pub async fn current_user(&self) -> Result<UserProfile> {
        if let Some(user) = self.current_user.lock().unwrap().clone() {
            return Ok(user);
        }

        let settings = self.v1.account_settings().await?;
        let screen_name = settings
            .get("screen_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ServiceError::new(
                    ApiError::ApiLogic,
                    anyhow::anyhow!("account settings carried no screen name"),
                )
            })?
            .to_string();
        let user = self.get_user(&screen_name).await?;

        *self.current_user.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    /* ----------------------------- write path ----------------------------- */

    pub async fn like(&self, tweet_id: &TweetID) -> Result<()> {
        self.simple_mutation(ops::FAVORITE_TWEET, tweet_id).await
    }

    pub async fn unlike(&self, tweet_id: &TweetID) -> Result<()> {
        self.simple_mutation(ops::UNFAVORITE_TWEET, tweet_id).await
    }

    pub async fn retweet(&self, tweet_id: &TweetID) -> Result<()> {
        self.simple_mutation(ops::CREATE_RETWEET, tweet_id).await
    }

    pub async fn unretweet(&self, tweet_id: &TweetID) -> Result<()> {
        self.simple_mutation(ops::DELETE_RETWEET, tweet_id).await
    }

    pub async fn bookmark(&self, tweet_id: &TweetID) -> Result<()> {
        self.simple_mutation(ops::CREATE_BOOKMARK, tweet_id).await
    }

    pub async fn unbookmark(&self, tweet_id: &TweetID) -> Result<()> {
        self.simple_mutation(ops::DELETE_BOOKMARK, tweet_id).await
    }

    async fn simple_mutation(&self, operation: &'static str, tweet_id: &TweetID) -> Result<()> {
        let variables = json!({ "tweet_id": tweet_id.0.as_str() });
        self.graphql.mutate(operation, &variables).await?;
        Ok(())
    }

    pub async fn upload_media(&self, path: &Path) -> Result<String> {
        self.v1.upload_media(path).await
    }

    /// create a tweet or reply; returns the new tweet's id.
    ///
    /// Recovery order: the GraphQL mutation first; on the automated-request
    /// rejection the legacy form endpoint; when a transport-level success
    /// carries no id, verification against the author's own timeline.
    pub async fn create_tweet(
        &self,
        text: &str,
        reply_to: Option<&TweetID>,
        media_ids: &[String],
    ) -> Result<TweetID> {
        let mut variables = json!({
            "tweet_text": text,
            "dark_request": false,
            "media": { "media_entities": [], "possibly_sensitive": false },
            "semantic_annotation_ids": [],
        });
        if let Some(reply_id) = reply_to {
            variables["reply"] = json!({
                "in_reply_to_tweet_id": reply_id.0.as_str(),
                "exclude_reply_user_ids": [],
            });
        }
        if !media_ids.is_empty() {
            variables["media"]["media_entities"] = media_ids
                .iter()
                .map(|id| json!({ "media_id": id, "tagged_users": [] }))
                .collect();
        }

        match self
            .graphql
            .mutate_classified(ops::CREATE_TWEET, &variables)
            .await?
        {
            RequestOutcome::Payload(json) => match created_tweet_id(&json) {
                Some(id) => Ok(id),
                None => {
                    log::warn!("create response carried no tweet id, verifying via the timeline");
                    self.verify_created(text).await
                }
            },
            RequestOutcome::ApiFailure(failure)
                if failure.has_code(AUTOMATED_REQUEST_CODE) =>
            {
                log::info!("create rejected as automated ({AUTOMATED_REQUEST_CODE}), trying the legacy endpoint");
                let legacy_reply = reply_to.map(|id| id.0.as_str());
                match self.v1.update_status(text, legacy_reply, media_ids).await {
                    Ok(legacy) => match legacy.get("id_str").and_then(|v| v.as_str()) {
                        Some(id) => Ok(TweetID(id.to_string())),
                        None => self.verify_created(text).await,
                    },
                    Err(fallback_err) => Err(ServiceError::new(
                        ApiError::ApiLogic,
                        anyhow::anyhow!(
                            "{}; legacy fallback: {}",
                            failure.message,
                            fallback_err.describe()
                        ),
                    )),
                }
            }
            RequestOutcome::ApiFailure(failure) => Err(failure.into_service_error()),
        }
    }

    /// the write may have landed even though no id came back: wait out the
    /// eventual consistency, then look for the text on the author's own
    /// timeline. Two probes, then the outcome is reported as ambiguous.
    async fn verify_created(&self, text: &str) -> Result<TweetID> {
        let me = self.current_user().await?;
        let wanted = normalize_tweet_text(text);

        for delay in [Duration::from_secs(2), Duration::from_secs(3)] {
            tokio::time::sleep(delay).await;
            let recent = match self.recent_own_tweets(&me).await {
                Ok(tweets) => tweets,
                Err(e) => {
                    log::warn!("verification probe failed: {}", e.describe());
                    continue;
                }
            };
            for tweet in recent {
                if normalize_tweet_text(&tweet.text) == wanted
                    && created_within(&tweet.created_at, 60)
                {
                    return Ok(TweetID(tweet.id));
                }
            }
        }

        Err(ServiceError::new(
            ApiError::VerificationAmbiguous,
            anyhow::anyhow!("the tweet may have been created but could not be verified"),
        ))
    }

    async fn recent_own_tweets(&self, me: &UserProfile) -> Result<Vec<Tweet>> {
        let variables = TweetRepository::user_timeline_variables(&me.id, 10);
        let features = timeline_features();
        let json = self
            .graphql
            .fetch(ops::USER_TWEETS, &variables, Some(&features))
            .await?;
        let instructions = instructions_at(
            &json,
            &["data", "user", "result", "timeline_v2", "timeline", "instructions"],
        );
        Ok(timeline::parse_tweets_from_instructions(
            instructions,
            &ParseOptions {
                quote_depth: 0,
                include_raw: false,
            },
        ))
    }
}

fn created_tweet_id(json: &Value) -> Option<TweetID> {
    let locations = [
        &json["data"]["create_tweet"]["tweet_results"]["result"]["rest_id"],
        &json["data"]["notetweet_create"]["tweet_results"]["result"]["rest_id"],
        &json["data"]["create_tweet"]["tweet_results"]["result"]["legacy"]["id_str"],
    ];
    locations
        .iter()
        .find_map(|v| v.as_str())
        .map(|id| TweetID(id.to_string()))
}

/// comparison form for post-write verification: whitespace collapsed and the
/// auto-appended trailing short link dropped
fn normalize_tweet_text(text: &str) -> String {
    let trimmed = text.trim();
    let without_link = match trimmed.rfind(" https://t.co/") {
        Some(idx) if trimmed[idx..].trim().split_whitespace().count() == 1 => &trimmed[..idx],
        _ => trimmed,
    };
    without_link.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn created_within(created_at: &str, seconds: i64) -> bool {
    match chrono::DateTime::parse_from_str(created_at, "%a %b %d %H:%M:%S %z %Y") {
        Ok(stamp) => {
            let age = chrono::Utc::now() - stamp.with_timezone(&chrono::Utc);
            age.num_seconds().abs() <= seconds
        }
        Err(_) => false,
    }
}

fn filter_thread(bookmark: &Tweet, thread: Vec<Tweet>, expansion: ThreadExpansion) -> Vec<Tweet> {
    match expansion {
        ThreadExpansion::None => vec![bookmark.clone()],
        ThreadExpansion::FullChain => {
            if thread.is_empty() {
                vec![bookmark.clone()]
            } else {
                thread
            }
        }
        ThreadExpansion::AuthorOnly => {
            let kept: Vec<Tweet> = thread
                .into_iter()
                .filter(|tweet| tweet.user == bookmark.user)
                .collect();
            if kept.is_empty() {
                vec![bookmark.clone()]
            } else {
                kept
            }
        }
        ThreadExpansion::AuthorChain => match thread.iter().position(|t| t.id == bookmark.id) {
            None => vec![bookmark.clone()],
            Some(position) => {
                let mut start = position;
                while start > 0 && thread[start - 1].user == bookmark.user {
                    start -= 1;
                }
                let mut end = position;
                while end + 1 < thread.len() && thread[end + 1].user == bookmark.user {
                    end += 1;
                }
                thread[start..=end].to_vec()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::interface::testing::ScriptedHttp;

    fn repo(http: Arc<ScriptedHttp>) -> TweetRepository {
        let session =
            Session::new("token".to_string(), "csrf".to_string(), None).unwrap();
        TweetRepository::new(session, http)
    }

    fn user_body(id: &str, screen_name: &str) -> String {
        json!({ "data": { "user": { "result": {
            "__typename": "User",
            "rest_id": id,
            "legacy": { "screen_name": screen_name, "name": "Display Name" },
        } } } })
        .to_string()
    }

    fn timeline_body(entries: Value) -> String {
        json!({ "data": { "user": { "result": { "timeline_v2": { "timeline": {
            "instructions": [{ "type": "TimelineAddEntries", "entries": entries }],
        } } } } } })
        .to_string()
    }

    fn tweet_entry(id: &str, screen_name: &str, text: &str, created_at: &str) -> Value {
        json!({ "entryId": format!("tweet-{id}"), "content": {
            "entryType": "TimelineTimelineItem",
            "itemContent": { "itemType": "TimelineTweet", "tweet_results": { "result": {
                "__typename": "Tweet",
                "rest_id": id,
                "core": { "user_results": { "result": {
                    "__typename": "User",
                    "rest_id": "u1",
                    "legacy": { "screen_name": screen_name, "name": "Display Name" },
                } } },
                "legacy": {
                    "full_text": text,
                    "created_at": created_at,
                    "conversation_id_str": id,
                },
            } } },
        } })
    }

    fn now_stamp() -> String {
        chrono::Utc::now()
            .format("%a %b %d %H:%M:%S +0000 %Y")
            .to_string()
    }

    #[test]
    fn it_should_normalize_text_for_verification_matching() {
        assert_eq!(
            normalize_tweet_text("hello  world \n"),
            "hello world"
        );
        // the auto-appended trailing short link is ignored
        assert_eq!(
            normalize_tweet_text("hello world https://t.co/AbCd123"),
            "hello world"
        );
        // a short link mid-text is part of the content
        assert_eq!(
            normalize_tweet_text("see https://t.co/AbCd123 for details"),
            "see https://t.co/AbCd123 for details"
        );
    }

    #[test]
    fn it_should_accept_only_recent_timestamps() {
        assert!(created_within(&now_stamp(), 60));
        assert!(!created_within("Wed Oct 10 20:19:24 +0000 2018", 60));
        assert!(!created_within("not a date", 60));
    }

    fn named_tweet(id: &str, user: &str) -> Tweet {
        Tweet {
            id: id.to_string(),
            user: user.to_string(),
            user_name: user.to_string(),
            user_id: None,
            text: String::new(),
            created_at: String::new(),
            reply_count: 0,
            retweet_count: 0,
            like_count: 0,
            conversation_id: id.to_string(),
            in_reply_to_status_id: None,
            quote: None,
            media: None,
            article: None,
            raw: None,
        }
    }

    #[test]
    fn it_should_filter_threads_per_expansion_mode() {
        let thread = vec![
            named_tweet("1", "alice"),
            named_tweet("2", "alice"),
            named_tweet("3", "bob"),
            named_tweet("4", "alice"),
        ];
        let bookmark = named_tweet("2", "alice");

        let full = filter_thread(&bookmark, thread.clone(), ThreadExpansion::FullChain);
        assert_eq!(full.len(), 4);

        let author_only = filter_thread(&bookmark, thread.clone(), ThreadExpansion::AuthorOnly);
        let ids: Vec<&str> = author_only.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "4"]);

        // the consecutive run around the bookmark stops at bob
        let chain = filter_thread(&bookmark, thread, ThreadExpansion::AuthorChain);
        let ids: Vec<&str> = chain.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn it_should_return_the_id_from_a_successful_create() {
        let http = Arc::new(ScriptedHttp::new(vec![(
            "/CreateTweet",
            200,
            r#"{"data":{"create_tweet":{"tweet_results":{"result":{"rest_id":"1234"}}}}}"#,
        )]));
        let id = repo(http).create_tweet("hello", None, &[]).await.unwrap();
        assert_eq!(id.0, "1234");
    }

    #[tokio::test]
    async fn it_should_fall_back_to_the_legacy_write_on_code_226() {
        let http = Arc::new(ScriptedHttp::new(vec![
            (
                "/CreateTweet",
                200,
                r#"{"errors":[{"message":"This request looks automated","code":226}]}"#,
            ),
            ("statuses/update.json", 200, r#"{"id_str":"321"}"#),
        ]));
        let id = repo(http.clone()).create_tweet("hello", None, &[]).await.unwrap();
        assert_eq!(id.0, "321");
        assert_eq!(http.calls_matching("statuses/update.json"), 1);
    }

    #[tokio::test]
    async fn it_should_concatenate_both_errors_when_the_fallback_also_fails() {
        let http = Arc::new(ScriptedHttp::new(vec![
            (
                "/CreateTweet",
                200,
                r#"{"errors":[{"message":"This request looks automated","code":226}]}"#,
            ),
            (
                "statuses/update.json",
                200,
                r#"{"errors":[{"code":187,"message":"Status is a duplicate"}]}"#,
            ),
        ]));
        let err = repo(http).create_tweet("hello", None, &[]).await.unwrap_err();
        let description = err.describe();
        assert!(description.contains("automated"));
        assert!(description.contains("duplicate"));
    }

    #[tokio::test]
    async fn it_should_not_touch_the_legacy_endpoint_for_other_api_errors() {
        let http = Arc::new(ScriptedHttp::new(vec![(
            "/CreateTweet",
            200,
            r#"{"errors":[{"message":"Over capacity","code":130}]}"#,
        )]));
        let err = repo(http.clone()).create_tweet("hello", None, &[]).await.unwrap_err();
        assert!(err.is_error_of(ApiError::ApiLogic));
        assert_eq!(http.calls_matching("statuses/update.json"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_verify_an_idless_create_against_the_own_timeline() {
        let stamp = now_stamp();
        let timeline = timeline_body(json!([tweet_entry(
            "777",
            "me",
            "hello world https://t.co/AbCd123",
            &stamp,
        )]));
        let http = Arc::new(ScriptedHttp::new(vec![
            ("/CreateTweet", 200, r#"{"data":{}}"#),
            ("account/settings.json", 200, r#"{"screen_name":"me"}"#),
            ("/UserByScreenName?", 200, &user_body("u1", "me")),
            ("/UserTweets?", 200, &timeline),
        ]));
        let id = repo(http.clone())
            .create_tweet("hello world", None, &[])
            .await
            .unwrap();
        assert_eq!(id.0, "777");
        assert_eq!(http.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_report_an_unverifiable_create_as_ambiguous() {
        let stale = timeline_body(json!([tweet_entry(
            "1",
            "me",
            "something else entirely",
            "Wed Oct 10 20:19:24 +0000 2018",
        )]));
        let http = Arc::new(ScriptedHttp::new(vec![
            ("/CreateTweet", 200, r#"{"data":{}}"#),
            ("account/settings.json", 200, r#"{"screen_name":"me"}"#),
            ("/UserByScreenName?", 200, &user_body("u1", "me")),
            ("/UserTweets?", 200, &stale),
            ("/UserTweets?", 200, &stale),
        ]));
        let err = repo(http.clone())
            .create_tweet("hello world", None, &[])
            .await
            .unwrap_err();
        assert!(err.is_error_of(ApiError::VerificationAmbiguous));
        // exactly two delayed probes
        assert_eq!(http.calls_matching("/UserTweets?"), 2);
    }

    #[tokio::test]
    async fn it_should_resolve_and_cache_the_current_user() {
        let http = Arc::new(ScriptedHttp::new(vec![
            ("account/settings.json", 200, r#"{"screen_name":"me"}"#),
            ("/UserByScreenName?", 200, &user_body("u1", "me")),
        ]));
        let repo = repo(http.clone());
        let first = repo.current_user().await.unwrap();
        let second = repo.current_user().await.unwrap();
        assert_eq!(first.id, "u1");
        assert_eq!(second.username, "me");
        // both settings and the profile lookup ran exactly once
        assert_eq!(http.remaining(), 0);
        assert_eq!(http.calls_matching("account/settings.json"), 1);
    }

    #[tokio::test]
    async fn it_should_keep_only_direct_replies() {
        let conversation = json!({ "data": { "threaded_conversation_with_injections_v2": {
            "instructions": [{ "type": "TimelineAddEntries", "entries": [
                tweet_entry("1", "alice", "root", "Wed Oct 10 20:19:24 +0000 2018"),
                reply_entry("2", "bob", "direct reply", "1"),
                reply_entry("3", "carol", "nested reply", "2"),
            ] }],
        } } })
        .to_string();
        let http = Arc::new(ScriptedHttp::new(vec![("/TweetDetail?", 200, &conversation)]));

        let replies = repo(http)
            .get_replies(
                &TweetID("1".to_string()),
                PaginateOptions::single_page(),
                ParseOptions::default(),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = replies.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
    }

    fn reply_entry(id: &str, screen_name: &str, text: &str, in_reply_to: &str) -> Value {
        let mut entry = tweet_entry(id, screen_name, text, "Wed Oct 10 20:19:24 +0000 2018");
        entry["content"]["itemContent"]["tweet_results"]["result"]["legacy"]
            ["in_reply_to_status_id_str"] = json!(in_reply_to);
        entry
    }

    #[tokio::test]
    async fn it_should_complete_simple_mutations() {
        let http = Arc::new(ScriptedHttp::new(vec![(
            "/DeleteBookmark",
            200,
            r#"{"data":{"tweet_bookmark_delete":"Done"}}"#,
        )]));
        repo(http).unbookmark(&TweetID("123".to_string())).await.unwrap();
    }
}
