pub mod graphql;
pub mod pagination;
pub mod query_id;
mod repository_error;
pub mod timeline;
mod tweet_repo;
pub mod v1_api;

pub use graphql::*;
pub use pagination::*;
pub use repository_error::*;
pub use timeline::*;
pub use tweet_repo::*;
pub use v1_api::*;
