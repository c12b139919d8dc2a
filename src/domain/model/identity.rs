use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

#[derive(Clone, Debug, PartialEq, Default, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TweetID(pub String);

// TweetID to String
impl From<TweetID> for String {
    fn from(tweet_id: TweetID) -> Self {
        tweet_id.0
    }
}

// String to TweetID
impl From<String> for TweetID {
    fn from(tweet_id: String) -> Self {
        TweetID(tweet_id)
    }
}

impl fmt::Display for TweetID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Default, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListID(pub String);

impl From<ListID> for String {
    fn from(list_id: ListID) -> Self {
        list_id.0
    }
}

impl From<String> for ListID {
    fn from(list_id: String) -> Self {
        ListID(list_id)
    }
}

impl fmt::Display for ListID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
