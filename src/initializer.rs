use crate::domain::service;
use crate::error::Result;
use crate::infra;
use crate::repository;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub auth_token: String,
    pub ct0: String,
    pub cookie_header: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Clone)]
pub struct Infras {
    pub http_client: Arc<infra::HttpClient>,
    pub session: infra::Session,
}

pub fn infras(config: &Config) -> Result<Infras> {
    let timeout = config.timeout_ms.map(Duration::from_millis);
    let http_client = Arc::new(infra::HttpClient::with_timeout(timeout));
    let session = infra::Session::new(
        config.auth_token.clone(),
        config.ct0.clone(),
        config.cookie_header.clone(),
    )?;
    Ok(Infras {
        http_client,
        session,
    })
}

#[derive(Clone)]
pub struct Repository {
    pub tweet: Arc<repository::TweetRepository>,
}

pub fn repository(infras: &Infras) -> Repository {
    let tweet = Arc::new(repository::TweetRepository::new(
        infras.session.clone(),
        infras.http_client.clone(),
    ));
    Repository { tweet }
}

#[derive(Clone)]
pub struct Services {
    pub tweet: service::TweetService,
}

#[derive(Clone)]
pub struct AppContext {
    pub infras: Infras,
    pub repository: Repository,
    pub services: Services,
}

pub fn new(config: Config) -> Result<AppContext> {
    let infras = infras(&config)?;
    let repository = repository(&infras);
    let services = Services {
        tweet: service::TweetService::new(repository.tweet.clone()),
    };
    Ok(AppContext {
        infras,
        repository,
        services,
    })
}
