use crate::error::Result;
use async_trait::async_trait;

/// body-decoded response, so call sites never touch the transport type
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: http::StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[async_trait]
pub trait IHttpClient {
    async fn get(
        &self,
        url: &str,
        header: Option<reqwest::header::HeaderMap>,
    ) -> Result<HttpResponse>;

    async fn post(
        &self,
        url: &str,
        header: Option<reqwest::header::HeaderMap>,
        body: Option<String>,
    ) -> Result<HttpResponse>;
}
