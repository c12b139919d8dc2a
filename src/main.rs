// Twitter/X CLI speaking the web client's private GraphQL API, authenticated
// with the browser session cookies (auth_token + ct0).

mod wrapper;
pub use wrapper::*;

mod domain;
mod infra;
mod initializer;
mod repository;

use crate::domain::model::{
    BookmarkFolder, ListID, Paginated, PaginateOptions, Tweet, TweetID, TwitterList, UserProfile,
};
use crate::error::*;
use crate::infra::{AppConfig, ConfigLayer};
use crate::repository::{ParseOptions, ThreadExpansion};
use clap::{Arg, ArgAction, ArgMatches, Command};
use dotenv::dotenv;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let json_output = matches.get_flag("json");
    if let Err(e) = run(matches).await {
        if json_output {
            match serde_json::to_string(&e.to_error_response()) {
                Ok(rendered) => eprintln!("{rendered}"),
                Err(_) => eprintln!("{}", e.describe()),
            }
        } else if e.is_error_of(ApiError::VerificationAmbiguous) {
            // distinct from an outright failure: the write may have landed
            eprintln!("{} {}", "unverified:".yellow(), e.describe());
        } else {
            eprintln!("{} {}", "error:".red(), e.describe());
        }
        let exit_code = if e.is_error_of(ApiError::Validation) { 2 } else { 1 };
        std::process::exit(exit_code);
    }
}

fn tweet_arg() -> Arg {
    Arg::new("tweet")
        .required(true)
        .value_name("ID_OR_URL")
        .help("tweet id or status url")
}

fn paging_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("limit")
            .long("limit")
            .value_name("PAGES")
            .help("stop after this many pages and print the next cursor"),
    )
    .arg(
        Arg::new("cursor")
            .long("cursor")
            .value_name("CURSOR")
            .help("resume from a cursor printed by a previous run"),
    )
}

fn user_arg(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("user")
            .value_name("HANDLE")
            .help("target account; defaults to the session's own account"),
    )
}

fn cli() -> Command {
    Command::new("torikago")
        .about("🐦 Twitter/X CLI that speaks the web client's private GraphQL API with your browser session 🐦")
        .version("0.1.0")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("print JSON instead of text"),
        )
        .arg(
            Arg::new("raw")
                .long("raw")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("attach the untouched API payload to every record"),
        )
        .arg(
            Arg::new("quote-depth")
                .long("quote-depth")
                .global(true)
                .value_name("N")
                .help("levels of quoted-tweet expansion, 0 disables"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .global(true)
                .value_name("MS")
                .help("per-request timeout, 0 disables"),
        )
        .arg(
            Arg::new("page-delay-ms")
                .long("page-delay-ms")
                .global(true)
                .value_name("MS")
                .help("wait between page fetches"),
        )
        .arg(
            Arg::new("auth-token")
                .long("auth-token")
                .global(true)
                .value_name("COOKIE")
                .help("auth_token cookie value"),
        )
        .arg(
            Arg::new("ct0")
                .long("ct0")
                .global(true)
                .value_name("COOKIE")
                .help("ct0 (csrf) cookie value"),
        )
        .subcommand(Command::new("read").about("print a single tweet").arg(tweet_arg()))
        .subcommand(paging_args(
            Command::new("thread")
                .about("print the conversation around a tweet")
                .arg(tweet_arg()),
        ))
        .subcommand(paging_args(
            Command::new("replies")
                .about("print direct replies to a tweet")
                .arg(tweet_arg()),
        ))
        .subcommand(paging_args(
            Command::new("search")
                .about("search latest tweets")
                .arg(Arg::new("query").required(true)),
        ))
        .subcommand(paging_args(
            Command::new("mentions").about("tweets mentioning the session's account"),
        ))
        .subcommand(paging_args(
            Command::new("user-tweets")
                .about("a user's tweets")
                .arg(Arg::new("user").required(true).value_name("HANDLE")),
        ))
        .subcommand(paging_args(
            Command::new("bookmarks")
                .about("your bookmarks")
                .arg(
                    Arg::new("folder")
                        .long("folder")
                        .value_name("ID")
                        .help("read one bookmark folder"),
                )
                .arg(
                    Arg::new("folders")
                        .long("folders")
                        .action(ArgAction::SetTrue)
                        .help("list bookmark folders instead"),
                )
                .arg(
                    Arg::new("full-chain-only")
                        .long("full-chain-only")
                        .action(ArgAction::SetTrue)
                        .conflicts_with_all(["author-chain", "author-only"])
                        .help("expand every bookmark into its whole conversation"),
                )
                .arg(
                    Arg::new("author-chain")
                        .long("author-chain")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("author-only")
                        .help("expand into the author's consecutive thread around the bookmark"),
                )
                .arg(
                    Arg::new("author-only")
                        .long("author-only")
                        .action(ArgAction::SetTrue)
                        .help("expand into every tweet of the bookmarked author in the conversation"),
                ),
        ))
        .subcommand(Command::new("unbookmark").about("remove a bookmark").arg(tweet_arg()))
        .subcommand(paging_args(user_arg(Command::new("likes").about("liked tweets"))))
        .subcommand(Command::new("lists").about("your lists"))
        .subcommand(paging_args(
            Command::new("list-timeline")
                .about("latest tweets of a list")
                .arg(Arg::new("list").required(true).value_name("LIST_ID")),
        ))
        .subcommand(paging_args(user_arg(
            Command::new("following").about("accounts a user follows"),
        )))
        .subcommand(paging_args(user_arg(
            Command::new("followers").about("accounts following a user"),
        )))
        .subcommand(
            Command::new("about")
                .about("profile of an account")
                .arg(Arg::new("user").required(true).value_name("HANDLE")),
        )
        .subcommand(Command::new("whoami").about("profile of the session's account"))
        .subcommand(
            Command::new("tweet")
                .about("post a tweet")
                .arg(Arg::new("text").required(true))
                .arg(
                    Arg::new("media")
                        .long("media")
                        .value_name("FILE")
                        .action(ArgAction::Append)
                        .help("attach an image or video (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("reply")
                .about("reply to a tweet")
                .arg(tweet_arg())
                .arg(Arg::new("text").required(true))
                .arg(
                    Arg::new("media")
                        .long("media")
                        .value_name("FILE")
                        .action(ArgAction::Append)
                        .help("attach an image or video (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("query-ids")
                .about("manage the rotating query id cache")
                .subcommand_required(true)
                .subcommand(
                    Command::new("refresh")
                        .about("re-derive query ids from the public web bundles")
                        .arg(
                            Arg::new("force")
                                .long("force")
                                .action(ArgAction::SetTrue)
                                .help("refresh even when the cache is fresh"),
                        ),
                ),
        )
}

async fn run(matches: ArgMatches) -> Result<()> {
    let quote_depth = match parse_number(&matches, "quote-depth", "--quote-depth")? {
        Some(depth) if depth > u8::MAX as u64 => {
            return Err(validation(format!("--quote-depth is capped at {}", u8::MAX)))
        }
        Some(depth) => Some(depth as u8),
        None => None,
    };
    let flags = ConfigLayer {
        auth_token: matches.get_one::<String>("auth-token").cloned(),
        ct0: matches.get_one::<String>("ct0").cloned(),
        cookie_header: None,
        timeout_ms: parse_number(&matches, "timeout-ms", "--timeout-ms")?,
        quote_depth,
        page_delay_ms: parse_number(&matches, "page-delay-ms", "--page-delay-ms")?,
    };
    let config = AppConfig::load(flags)?;
    let json_output = matches.get_flag("json");
    let parse = ParseOptions {
        quote_depth: config.quote_depth,
        include_raw: matches.get_flag("raw"),
    };

    // the refresh command scrapes public bundles and needs no session
    if let Some(("query-ids", sub)) = matches.subcommand() {
        if let Some(("refresh", refresh_matches)) = sub.subcommand() {
            let http =
                infra::HttpClient::with_timeout(config.timeout_ms.map(Duration::from_millis));
            let updated = repository::query_id::refresh(
                &http,
                &repository::query_id::known_operations(),
                refresh_matches.get_flag("force"),
            )
            .await?;
            println!(
                "updated {updated} query ids ({})",
                repository::query_id::cache_path().display()
            );
        }
        return Ok(());
    }

    let app = initializer::new(initializer::Config {
        auth_token: config.auth_token.clone(),
        ct0: config.ct0.clone(),
        cookie_header: config.cookie_header.clone(),
        timeout_ms: config.timeout_ms,
    })?;
    let tweets = &app.services.tweet;

    match matches.subcommand() {
        Some(("read", sub)) => {
            let id = TweetID(parse_tweet_ref(required(sub, "tweet"))?);
            let tweet = tweets.read(&id, parse).await?;
            print_single_tweet(&tweet, json_output)?;
        }
        Some(("thread", sub)) => {
            let id = TweetID(parse_tweet_ref(required(sub, "tweet"))?);
            let page = tweets.thread(&id, paging(sub, &config)?, parse).await?;
            print_tweet_page(&page, json_output)?;
        }
        Some(("replies", sub)) => {
            let id = TweetID(parse_tweet_ref(required(sub, "tweet"))?);
            let page = tweets.replies(&id, paging(sub, &config)?, parse).await?;
            print_tweet_page(&page, json_output)?;
        }
        Some(("search", sub)) => {
            let page = tweets
                .search(required(sub, "query"), paging(sub, &config)?, parse)
                .await?;
            print_tweet_page(&page, json_output)?;
        }
        Some(("mentions", sub)) => {
            let page = tweets.mentions(paging(sub, &config)?, parse).await?;
            print_tweet_page(&page, json_output)?;
        }
        Some(("user-tweets", sub)) => {
            let handle = parse_handle(required(sub, "user"))?;
            let page = tweets
                .user_tweets(&handle, paging(sub, &config)?, parse)
                .await?;
            print_tweet_page(&page, json_output)?;
        }
        Some(("bookmarks", sub)) => {
            if sub.get_flag("folders") {
                let folders = tweets.bookmark_folders().await?;
                print_folders(&folders, json_output)?;
            } else {
                let page = tweets
                    .bookmarks(
                        sub.get_one::<String>("folder").map(|s| s.as_str()),
                        bookmark_expansion(sub),
                        paging(sub, &config)?,
                        parse,
                    )
                    .await?;
                print_tweet_page(&page, json_output)?;
            }
        }
        Some(("unbookmark", sub)) => {
            let id = TweetID(parse_tweet_ref(required(sub, "tweet"))?);
            tweets.unbookmark(&id).await?;
            println!("{} {id}", "unbookmarked".green());
        }
        Some(("likes", sub)) => {
            let handle = optional_handle(sub)?;
            let page = tweets
                .likes(handle.as_deref(), paging(sub, &config)?, parse)
                .await?;
            print_tweet_page(&page, json_output)?;
        }
        Some(("lists", _)) => {
            let lists = tweets.lists().await?;
            print_lists(&lists, json_output)?;
        }
        Some(("list-timeline", sub)) => {
            let list_id = ListID(required(sub, "list").to_string());
            let page = tweets
                .list_timeline(&list_id, paging(sub, &config)?, parse)
                .await?;
            print_tweet_page(&page, json_output)?;
        }
        Some(("following", sub)) => {
            let handle = optional_handle(sub)?;
            let page = tweets.following(handle.as_deref(), paging(sub, &config)?).await?;
            print_user_page(&page, json_output)?;
        }
        Some(("followers", sub)) => {
            let handle = optional_handle(sub)?;
            let page = tweets.followers(handle.as_deref(), paging(sub, &config)?).await?;
            print_user_page(&page, json_output)?;
        }
        Some(("about", sub)) => {
            let handle = parse_handle(required(sub, "user"))?;
            let profile = tweets.about(&handle).await?;
            print_profile(&profile, json_output)?;
        }
        Some(("whoami", _)) => {
            let profile = tweets.whoami().await?;
            print_profile(&profile, json_output)?;
        }
        Some(("tweet", sub)) => {
            let id = tweets.tweet(required(sub, "text"), &media_paths(sub)).await?;
            println!("{} https://twitter.com/i/status/{id}", "created".green());
        }
        Some(("reply", sub)) => {
            let reply_to = TweetID(parse_tweet_ref(required(sub, "tweet"))?);
            let id = tweets
                .reply(&reply_to, required(sub, "text"), &media_paths(sub))
                .await?;
            println!("{} https://twitter.com/i/status/{id}", "created".green());
        }
        _ => {}
    }

    Ok(())
}

fn validation(message: String) -> ServiceError {
    ServiceError::new(ApiError::Validation, anyhow::anyhow!(message))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    // clap enforces presence of required args
    matches.get_one::<String>(name).map(|s| s.as_str()).unwrap_or_default()
}

fn parse_number(matches: &ArgMatches, name: &str, flag: &str) -> Result<Option<u64>> {
    match matches.get_one::<String>(name) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| validation(format!("{flag} expects a non-negative integer, got {raw:?}"))),
        None => Ok(None),
    }
}

fn parse_handle(raw: &str) -> Result<String> {
    let handle = raw.trim().trim_start_matches('@');
    let valid = !handle.is_empty()
        && handle.len() <= 15
        && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(handle.to_string())
    } else {
        Err(validation(format!("malformed handle: {raw:?}")))
    }
}

fn optional_handle(matches: &ArgMatches) -> Result<Option<String>> {
    match matches.get_one::<String>("user") {
        Some(raw) => parse_handle(raw).map(Some),
        None => Ok(None),
    }
}

/// accepts a bare id or any status url whose last path segment is the id
fn parse_tweet_ref(raw: &str) -> Result<String> {
    let candidate = if raw.contains('/') {
        raw.split('/')
            .filter(|segment| !segment.is_empty())
            .last()
            .and_then(|segment| segment.split('?').next())
            .unwrap_or("")
    } else {
        raw.trim()
    };
    if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit()) {
        Ok(candidate.to_string())
    } else {
        Err(validation(format!("not a tweet id or status url: {raw:?}")))
    }
}

fn bookmark_expansion(matches: &ArgMatches) -> ThreadExpansion {
    // clap already rejects combinations; strongest flag wins regardless
    if matches.get_flag("full-chain-only") {
        ThreadExpansion::FullChain
    } else if matches.get_flag("author-chain") {
        ThreadExpansion::AuthorChain
    } else if matches.get_flag("author-only") {
        ThreadExpansion::AuthorOnly
    } else {
        ThreadExpansion::None
    }
}

fn paging(matches: &ArgMatches, config: &AppConfig) -> Result<PaginateOptions> {
    let max_pages = match parse_number(matches, "limit", "--limit")? {
        Some(0) => return Err(validation("--limit must be at least 1".to_string())),
        Some(pages) => Some(pages as usize),
        None => None,
    };
    Ok(PaginateOptions {
        cursor: matches.get_one::<String>("cursor").cloned(),
        max_pages,
        page_delay: Duration::from_millis(config.page_delay_ms),
    })
}

fn media_paths(matches: &ArgMatches) -> Vec<PathBuf> {
    matches
        .get_many::<String>("media")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default()
}

/* ------------------------------- printing ------------------------------- */

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).map_err(GeneralError::serialization_error)?
    );
    Ok(())
}

fn print_single_tweet(tweet: &Tweet, json_output: bool) -> Result<()> {
    if json_output {
        return print_json(tweet);
    }
    print_tweet(tweet, 0);
    Ok(())
}

fn print_tweet_page(page: &Paginated<Tweet>, json_output: bool) -> Result<()> {
    if json_output {
        return print_json(page);
    }
    for tweet in &page.items {
        print_tweet(tweet, 0);
    }
    if page.items.is_empty() {
        println!("{}", "no tweets".dimmed());
    }
    if let Some(cursor) = &page.next_cursor {
        println!("{} {cursor}", "next cursor:".dimmed());
    }
    if let Some(partial) = &page.partial_error {
        eprintln!("{} {partial}", "partial result:".yellow());
    }
    Ok(())
}

fn print_tweet(tweet: &Tweet, depth: usize) {
    let pad = "  ".repeat(depth);
    println!(
        "{pad}{} {} · {}",
        format!("@{}", tweet.user).cyan().bold(),
        tweet.user_name,
        tweet.created_at.dimmed()
    );
    for line in tweet.text.lines() {
        println!("{pad}{line}");
    }
    if let Some(media) = &tweet.media {
        for item in media {
            let url = item.video_url.as_deref().unwrap_or(&item.url);
            println!("{pad}{} {url}", format!("[{}]", item.kind).magenta());
        }
    }
    println!(
        "{pad}{}",
        format!(
            "{} replies · {} retweets · {} likes · id {}",
            tweet.reply_count, tweet.retweet_count, tweet.like_count, tweet.id
        )
        .dimmed()
    );
    if let Some(quote) = &tweet.quote {
        print_tweet(quote, depth + 1);
    }
    if depth == 0 {
        println!();
    }
}

fn print_user_page(page: &Paginated<UserProfile>, json_output: bool) -> Result<()> {
    if json_output {
        return print_json(page);
    }
    for user in &page.items {
        let verified = if user.is_blue_verified == Some(true) { " ✓" } else { "" };
        println!(
            "{}{} {} · {} followers",
            format!("@{}", user.username).cyan().bold(),
            verified.blue(),
            user.name,
            user.followers_count.unwrap_or(0)
        );
        if let Some(description) = &user.description {
            println!("  {description}");
        }
    }
    if page.items.is_empty() {
        println!("{}", "no accounts".dimmed());
    }
    if let Some(cursor) = &page.next_cursor {
        println!("{} {cursor}", "next cursor:".dimmed());
    }
    if let Some(partial) = &page.partial_error {
        eprintln!("{} {partial}", "partial result:".yellow());
    }
    Ok(())
}

fn print_profile(profile: &UserProfile, json_output: bool) -> Result<()> {
    if json_output {
        return print_json(profile);
    }
    println!(
        "{} {} (id {})",
        format!("@{}", profile.username).cyan().bold(),
        profile.name,
        profile.id
    );
    if let Some(description) = &profile.description {
        println!("{description}");
    }
    println!(
        "{}",
        format!(
            "{} followers · {} following",
            profile.followers_count.unwrap_or(0),
            profile.following_count.unwrap_or(0)
        )
        .dimmed()
    );
    Ok(())
}

fn print_lists(lists: &[TwitterList], json_output: bool) -> Result<()> {
    if json_output {
        return print_json(&lists);
    }
    for list in lists {
        println!(
            "{} {} · {} members",
            list.id.dimmed(),
            list.name.cyan(),
            list.member_count.unwrap_or(0)
        );
    }
    if lists.is_empty() {
        println!("{}", "no lists".dimmed());
    }
    Ok(())
}

fn print_folders(folders: &[BookmarkFolder], json_output: bool) -> Result<()> {
    if json_output {
        return print_json(&folders);
    }
    for folder in folders {
        println!("{} {}", folder.id.dimmed(), folder.name.cyan());
    }
    if folders.is_empty() {
        println!("{}", "no bookmark folders".dimmed());
    }
    Ok(())
}
