use crate::domain::model::*;
use crate::error::*;
use crate::repository::{ParseOptions, ThreadExpansion, TweetRepository};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct TweetService {
    tweet_repo: Arc<TweetRepository>,
}

impl TweetService {
    pub fn new(tweet_repo: Arc<TweetRepository>) -> Self {
        Self { tweet_repo }
    }

    pub async fn read(&self, tweet_id: &TweetID, parse: ParseOptions) -> Result<Tweet> {
        self.tweet_repo.get_tweet(tweet_id, parse).await
    }

    pub async fn thread(
        &self,
        tweet_id: &TweetID,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        self.tweet_repo.get_thread(tweet_id, opts, parse).await
    }

    pub async fn replies(
        &self,
        tweet_id: &TweetID,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        self.tweet_repo.get_replies(tweet_id, opts, parse).await
    }

    pub async fn search(
        &self,
        query: &str,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        self.tweet_repo.search(query, opts, parse).await
    }

    pub async fn mentions(
        &self,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        self.tweet_repo.get_mentions(opts, parse).await
    }

    pub async fn user_tweets(
        &self,
        screen_name: &str,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        self.tweet_repo.get_user_tweets(screen_name, opts, parse).await
    }

    pub async fn bookmarks(
        &self,
        folder: Option<&str>,
        expansion: ThreadExpansion,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        self.tweet_repo.get_bookmarks(folder, expansion, opts, parse).await
    }

    pub async fn bookmark_folders(&self) -> Result<Vec<BookmarkFolder>> {
        self.tweet_repo.get_bookmark_folders().await
    }

    pub async fn unbookmark(&self, tweet_id: &TweetID) -> Result<()> {
        self.tweet_repo.unbookmark(tweet_id).await
    }

    pub async fn likes(
        &self,
        screen_name: Option<&str>,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        self.tweet_repo.get_likes(screen_name, opts, parse).await
    }

    pub async fn lists(&self) -> Result<Vec<TwitterList>> {
        self.tweet_repo.get_lists().await
    }

    pub async fn list_timeline(
        &self,
        list_id: &ListID,
        opts: PaginateOptions,
        parse: ParseOptions,
    ) -> Result<Paginated<Tweet>> {
        self.tweet_repo.get_list_timeline(list_id, opts, parse).await
    }

    pub async fn following(
        &self,
        screen_name: Option<&str>,
        opts: PaginateOptions,
    ) -> Result<Paginated<UserProfile>> {
        self.tweet_repo.get_following(screen_name, opts).await
    }

    pub async fn followers(
        &self,
        screen_name: Option<&str>,
        opts: PaginateOptions,
    ) -> Result<Paginated<UserProfile>> {
        self.tweet_repo.get_followers(screen_name, opts).await
    }

    pub async fn about(&self, screen_name: &str) -> Result<UserProfile> {
        self.tweet_repo.get_user(screen_name).await
    }

    pub async fn whoami(&self) -> Result<UserProfile> {
        self.tweet_repo.current_user().await
    }

    pub async fn like(&self, tweet_id: &TweetID) -> Result<()> {
        self.tweet_repo.like(tweet_id).await
    }

    pub async fn unlike(&self, tweet_id: &TweetID) -> Result<()> {
        self.tweet_repo.unlike(tweet_id).await
    }

    pub async fn retweet(&self, tweet_id: &TweetID) -> Result<()> {
        self.tweet_repo.retweet(tweet_id).await
    }

    pub async fn unretweet(&self, tweet_id: &TweetID) -> Result<()> {
        self.tweet_repo.unretweet(tweet_id).await
    }

    pub async fn bookmark(&self, tweet_id: &TweetID) -> Result<()> {
        self.tweet_repo.bookmark(tweet_id).await
    }

    /// upload any attachments, then create the tweet
    pub async fn tweet(&self, text: &str, media: &[PathBuf]) -> Result<TweetID> {
        let media_ids = self.upload_all(media).await?;
        self.tweet_repo.create_tweet(text, None, &media_ids).await
    }

    pub async fn reply(&self, tweet_id: &TweetID, text: &str, media: &[PathBuf]) -> Result<TweetID> {
        let media_ids = self.upload_all(media).await?;
        self.tweet_repo
            .create_tweet(text, Some(tweet_id), &media_ids)
            .await
    }

    async fn upload_all(&self, media: &[PathBuf]) -> Result<Vec<String>> {
        let mut media_ids = Vec::new();
        for path in media {
            media_ids.push(self.tweet_repo.upload_media(path).await?);
        }
        Ok(media_ids)
    }
}
