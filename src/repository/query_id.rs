//! The web client addresses every GraphQL operation through an opaque query
//! id that rotates with each deploy of the site. Resolution order: the
//! on-disk cache (filled by [`refresh`]) first, then the baked-in table.
//! A stale cache entry is still served, only flagged not fresh.

use crate::domain::interface::IHttpClient;
use crate::error::*;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub mod ops {
    pub const TWEET_DETAIL: &str = "TweetDetail";
    pub const SEARCH_TIMELINE: &str = "SearchTimeline";
    pub const USER_BY_SCREEN_NAME: &str = "UserByScreenName";
    pub const USER_TWEETS: &str = "UserTweets";
    pub const LIKES: &str = "Likes";
    pub const BOOKMARKS: &str = "Bookmarks";
    pub const BOOKMARK_FOLDERS_SLICE: &str = "BookmarkFoldersSlice";
    pub const BOOKMARK_FOLDER_TIMELINE: &str = "BookmarkFolderTimeline";
    pub const COMBINED_LISTS: &str = "CombinedLists";
    pub const LIST_LATEST_TWEETS_TIMELINE: &str = "ListLatestTweetsTimeline";
    pub const FOLLOWING: &str = "Following";
    pub const FOLLOWERS: &str = "Followers";
    pub const CREATE_TWEET: &str = "CreateTweet";
    pub const FAVORITE_TWEET: &str = "FavoriteTweet";
    pub const UNFAVORITE_TWEET: &str = "UnfavoriteTweet";
    pub const CREATE_RETWEET: &str = "CreateRetweet";
    pub const DELETE_RETWEET: &str = "DeleteRetweet";
    pub const CREATE_BOOKMARK: &str = "CreateBookmark";
    pub const DELETE_BOOKMARK: &str = "DeleteBookmark";
}

// last known-good ids shipped with the binary, from the public web bundle
static BUILTIN: &[(&str, &str)] = &[
    (ops::TWEET_DETAIL, "L1DeQfPt7n3LtTvrBqkJ2g"),
    (ops::SEARCH_TIMELINE, "gkjsKepM6gl_HmFWoWKfgg"),
    (ops::USER_BY_SCREEN_NAME, "G3KGOASz96M-Qu0nwmGXNg"),
    (ops::USER_TWEETS, "HuTx74BxAnezK1gWvYY7zg"),
    (ops::LIKES, "9s8V6sUI8fZLDiN-REkAxA"),
    (ops::BOOKMARKS, "ea4-_p-ZN9xwhQYOyGpf4w"),
    (ops::BOOKMARK_FOLDERS_SLICE, "N4Ykk6g393xyVY5nmRTkLQ"),
    (ops::BOOKMARK_FOLDER_TIMELINE, "JnWrqRE9ay3TNi87PGtOgw"),
    (ops::COMBINED_LISTS, "iy7AGNe9wEON8h59v0DEYg"),
    (ops::LIST_LATEST_TWEETS_TIMELINE, "ZBbXrl37E6za5ml-DIpmgg"),
    (ops::FOLLOWING, "t-BPOrMIduGUJWO_LxcvNQ"),
    (ops::FOLLOWERS, "djdTXDIk2qhd4OStqlUFeQ"),
    (ops::CREATE_TWEET, "a1p9RWpkYKBjWv_I3WzS-A"),
    (ops::FAVORITE_TWEET, "lI07N6Otwv1PhnEgXILM7A"),
    (ops::UNFAVORITE_TWEET, "ZYKSe-w7KEslx3JhSIk5LA"),
    (ops::CREATE_RETWEET, "ojPdsZsimiJrUGLR1sjUtA"),
    (ops::DELETE_RETWEET, "iQtK4dl5hBmXewYZuEOKVw"),
    (ops::CREATE_BOOKMARK, "aoDbu3RHznuiSkQ9aNM67Q"),
    (ops::DELETE_BOOKMARK, "Wlmlj2-xzyS1GN3a6cj-mQ"),
];

// for these two families a single rotated id is the common failure, so a few
// previously observed ids are kept around and tried before a full refresh
static TWEET_DETAIL_FALLBACKS: &[&str] = &[
    "xOhkmRac04YFZmOzU9PJHg",
    "VwKJcAd7zqlBOitPLUrB8A",
    "BbCrSoXIR7z93lLCVFlQ2Q",
];
static SEARCH_FALLBACKS: &[&str] = &[
    "nK1dw4oV3k4w5TdtcAdSww",
    "TQmyZ_haUqANuyBcFBLkUw",
    "UN1i3zUiCWa-6r-Uaho4fw",
];

pub const CACHE_TTL_SECS: i64 = 24 * 60 * 60;

const WEB_BASE: &str = "https://twitter.com/home";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

#[derive(Debug)]
pub enum QueryIdError {
    CachePersist,
    BundleScrape,
}

impl IServiceError for QueryIdError {
    fn error_type(&self) -> String {
        use QueryIdError::*;

        match self {
            CachePersist => "query_id_cache_persist",
            BundleScrape => "query_id_bundle_scrape",
        }
        .to_string()
    }

    fn status_code(&self) -> http::StatusCode {
        http::StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryIdEntry {
    pub query_id: String,
    /// unix seconds of the fetch that produced this entry
    pub fetched_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIdSource {
    Builtin,
    Cache,
}

#[derive(Debug, Clone)]
pub struct ResolvedQueryId {
    pub query_id: String,
    pub source: QueryIdSource,
    /// false once the cache entry has outlived [`CACHE_TTL_SECS`]; it is
    /// still usable, the flag only advises a refresh
    pub fresh: bool,
}

type Cache = IndexMap<String, QueryIdEntry>;

static CACHE: Lazy<Mutex<Cache>> = Lazy::new(|| Mutex::new(load_cache(&cache_path())));

pub fn cache_path() -> PathBuf {
    if let Ok(path) = std::env::var("TORIKAGO_QUERY_ID_CACHE") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    match directories::ProjectDirs::from("com", "torikago", "torikago") {
        Some(dirs) => dirs.config_dir().join("query-ids.json"),
        None => PathBuf::from("query-ids.json"),
    }
}

fn load_cache(path: &Path) -> Cache {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return Cache::new(),
    };
    match serde_json::from_str(&text) {
        Ok(cache) => cache,
        Err(e) => {
            log::warn!(
                "ignoring malformed query id cache at {}: {}",
                path.display(),
                e
            );
            Cache::new()
        }
    }
}

fn persist_cache(path: &Path, cache: &Cache) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ServiceError::new(QueryIdError::CachePersist, e))?;
    }
    let text =
        serde_json::to_string_pretty(cache).map_err(GeneralError::serialization_error)?;
    std::fs::write(path, text).map_err(|e| ServiceError::new(QueryIdError::CachePersist, e))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn builtin(operation: &str) -> Option<&'static str> {
    BUILTIN
        .iter()
        .find(|(op, _)| *op == operation)
        .map(|(_, id)| *id)
}

fn resolve_in(cache: &Cache, operation: &str) -> ResolvedQueryId {
    if let Some(entry) = cache.get(operation) {
        return ResolvedQueryId {
            query_id: entry.query_id.clone(),
            source: QueryIdSource::Cache,
            fresh: now() - entry.fetched_at <= CACHE_TTL_SECS,
        };
    }

    match builtin(operation) {
        Some(id) => ResolvedQueryId {
            query_id: id.to_string(),
            source: QueryIdSource::Builtin,
            fresh: true,
        },
        None => {
            // unknown operation: the name itself will 404 and the recovery
            // ladder takes over from there
            log::warn!("no query id known for operation {operation}");
            ResolvedQueryId {
                query_id: operation.to_string(),
                source: QueryIdSource::Builtin,
                fresh: false,
            }
        }
    }
}

pub fn resolve(operation: &str) -> ResolvedQueryId {
    resolve_in(&CACHE.lock().unwrap(), operation)
}

fn candidates_in(cache: &Cache, operation: &str) -> Vec<String> {
    let mut ids = vec![resolve_in(cache, operation).query_id];
    let mut push = |id: &str| {
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    };

    if let Some(id) = builtin(operation) {
        push(id);
    }
    let family: &[&str] = match operation {
        ops::TWEET_DETAIL => TWEET_DETAIL_FALLBACKS,
        ops::SEARCH_TIMELINE => SEARCH_FALLBACKS,
        _ => &[],
    };
    for id in family {
        push(id);
    }

    ids
}

/// ordered ids to try in sequence before forcing a refresh; the current
/// resolution always comes first
pub fn candidates(operation: &str) -> Vec<String> {
    candidates_in(&CACHE.lock().unwrap(), operation)
}

static BUNDLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"https://abs\.twimg\.com/responsive-web/client-web(?:-legacy)?/(?:main|api)[.\w~-]*\.js",
    )
    .unwrap()
});

static QUERY_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"queryId:\s*"([A-Za-z0-9_-]{16,})"\s*,\s*operationName:\s*"([A-Za-z0-9_]+)""#)
        .unwrap()
});

fn parse_bundle(js: &str) -> Vec<(String, String)> {
    QUERY_ID_RE
        .captures_iter(js)
        .map(|cap| (cap[2].to_string(), cap[1].to_string()))
        .collect()
}

/// re-derive ids for `operations` by scraping the public web bundles.
///
/// best effort: callers are free to ignore the result, prior values stay
/// intact on failure. Last write wins when two processes race a refresh.
pub async fn refresh(
    http: &(dyn IHttpClient + Send + Sync),
    operations: &[String],
    force: bool,
) -> Result<usize> {
    if !force {
        let cache = CACHE.lock().unwrap();
        let all_fresh = operations
            .iter()
            .all(|op| matches!(cache.get(op.as_str()), Some(e) if now() - e.fetched_at <= CACHE_TTL_SECS));
        if all_fresh {
            return Ok(0);
        }
    }

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "user-agent",
        USER_AGENT.parse().map_err(GeneralError::serialization_error)?,
    );
    let page = http.get(WEB_BASE, Some(headers)).await?;
    if !page.is_success() {
        return Err(ServiceError::new(
            QueryIdError::BundleScrape,
            anyhow::anyhow!("bundle index page returned {}", page.status),
        ));
    }

    let mut bundle_urls: Vec<String> = Vec::new();
    for m in BUNDLE_RE.find_iter(&page.body) {
        if !bundle_urls.iter().any(|known| known == m.as_str()) {
            bundle_urls.push(m.as_str().to_string());
        }
    }
    bundle_urls.truncate(6);

    let mut found: HashMap<String, String> = HashMap::new();
    for url in &bundle_urls {
        let bundle = match http.get(url, None).await {
            Ok(resp) if resp.is_success() => resp,
            // a missing bundle is not fatal, the others may still match
            Ok(_) | Err(_) => continue,
        };
        for (op, query_id) in parse_bundle(&bundle.body) {
            found.insert(op, query_id);
        }
    }
    if found.is_empty() {
        return Err(ServiceError::new(
            QueryIdError::BundleScrape,
            anyhow::anyhow!("no query ids found in {} bundles", bundle_urls.len()),
        ));
    }

    let stamp = now();
    let mut updated = 0;
    let snapshot = {
        let mut cache = CACHE.lock().unwrap();
        for op in operations {
            if let Some(query_id) = found.get(op.as_str()) {
                cache.insert(
                    op.clone(),
                    QueryIdEntry {
                        query_id: query_id.clone(),
                        fetched_at: stamp,
                    },
                );
                updated += 1;
            }
        }
        cache.clone()
    };

    if updated > 0 {
        if let Err(e) = persist_cache(&cache_path(), &snapshot) {
            log::warn!("could not persist query id cache: {}", e.describe());
        }
    }
    log::info!(
        "query id refresh updated {updated} of {} operations",
        operations.len()
    );

    Ok(updated)
}

/// every operation this client can issue, for `query-ids refresh`
pub fn known_operations() -> Vec<String> {
    BUILTIN.iter().map(|(op, _)| op.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_resolve_builtins_deterministically() {
        let cache = Cache::new();
        let first = resolve_in(&cache, ops::BOOKMARKS);
        let second = resolve_in(&cache, ops::BOOKMARKS);
        assert_eq!(first.query_id, "ea4-_p-ZN9xwhQYOyGpf4w");
        assert_eq!(second.query_id, first.query_id);
        assert_eq!(first.source, QueryIdSource::Builtin);
        assert!(first.fresh);
        assert!(cache.is_empty());
    }

    #[test]
    fn it_should_flag_expired_cache_entries_as_not_fresh() {
        let mut cache = Cache::new();
        cache.insert(
            ops::TWEET_DETAIL.to_string(),
            QueryIdEntry {
                query_id: "rotated".to_string(),
                fetched_at: now() - CACHE_TTL_SECS - 10,
            },
        );
        let resolved = resolve_in(&cache, ops::TWEET_DETAIL);
        assert_eq!(resolved.query_id, "rotated");
        assert_eq!(resolved.source, QueryIdSource::Cache);
        assert!(!resolved.fresh);

        cache.get_mut(ops::TWEET_DETAIL).unwrap().fetched_at = now();
        assert!(resolve_in(&cache, ops::TWEET_DETAIL).fresh);
    }

    #[test]
    fn it_should_order_candidates_cache_first_without_duplicates() {
        let mut cache = Cache::new();
        cache.insert(
            ops::TWEET_DETAIL.to_string(),
            QueryIdEntry {
                query_id: "xOhkmRac04YFZmOzU9PJHg".to_string(),
                fetched_at: now(),
            },
        );
        let ids = candidates_in(&cache, ops::TWEET_DETAIL);
        assert_eq!(ids[0], "xOhkmRac04YFZmOzU9PJHg");
        // the builtin default and the remaining fallbacks follow, deduplicated
        assert!(ids.contains(&"L1DeQfPt7n3LtTvrBqkJ2g".to_string()));
        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn it_should_not_offer_fallback_families_for_other_operations() {
        let ids = candidates_in(&Cache::new(), ops::CREATE_BOOKMARK);
        assert_eq!(ids, vec!["aoDbu3RHznuiSkQ9aNM67Q".to_string()]);
    }

    #[test]
    fn it_should_round_trip_the_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("query-ids.json");

        let mut cache = Cache::new();
        cache.insert(
            ops::SEARCH_TIMELINE.to_string(),
            QueryIdEntry {
                query_id: "fresh-id".to_string(),
                fetched_at: 1_700_000_000,
            },
        );
        persist_cache(&path, &cache).unwrap();

        // the file keeps the web client's own key spelling
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"queryId\""));
        assert!(text.contains("\"fetchedAt\""));

        let loaded = load_cache(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[ops::SEARCH_TIMELINE].query_id, "fresh-id");
        assert_eq!(loaded[ops::SEARCH_TIMELINE].fetched_at, 1_700_000_000);
    }

    #[test]
    fn it_should_tolerate_a_missing_or_malformed_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_cache(&dir.path().join("absent.json")).is_empty());

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_cache(&path).is_empty());
    }

    #[test]
    fn it_should_extract_query_ids_from_a_bundle() {
        let js = r#"e.exports={queryId:"zwTrX9CtnMvWlBXjsx95RQ",operationName:"adFreeArticleDomains",operationType:"query"},
            t.exports={queryId:"ea4-_p-ZN9xwhQYOyGpf4w",operationName:"Bookmarks",operationType:"query"}"#;
        let parsed = parse_bundle(js);
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed[1],
            (
                "Bookmarks".to_string(),
                "ea4-_p-ZN9xwhQYOyGpf4w".to_string()
            )
        );
    }
}
