use crate::domain::interface::*;
use crate::error::*;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug)]
pub enum HttpClientError {
    HttpError,
    Timeout,
}

impl IServiceError for HttpClientError {
    fn error_type(&self) -> String {
        use HttpClientError::*;

        match self {
            HttpError => "http_error",
            Timeout => "request_timeout",
        }
        .to_string()
    }

    fn status_code(&self) -> http::StatusCode {
        use HttpClientError::*;

        match self {
            HttpError => http::StatusCode::INTERNAL_SERVER_ERROR,
            Timeout => http::StatusCode::REQUEST_TIMEOUT,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> ServiceError {
        ServiceError::new(HttpClientError::HttpError, err)
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpClient {
    pub fn new() -> HttpClient {
        HttpClient::with_timeout(None)
    }

    pub fn with_timeout(timeout: Option<Duration>) -> HttpClient {
        HttpClient {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<HttpResponse> {
        let resp = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, req.send())
                .await
                .map_err(|_| {
                    ServiceError::new(
                        HttpClientError::Timeout,
                        anyhow::anyhow!("no response within {}ms", limit.as_millis()),
                    )
                })??,
            None => req.send().await?,
        };

        let status = resp.status();
        let body = resp.text().await?;

        Ok(HttpResponse { status, body })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        HttpClient::new()
    }
}

#[async_trait]
impl IHttpClient for HttpClient {
    async fn get(
        &self,
        url: &str,
        header: Option<reqwest::header::HeaderMap>,
    ) -> Result<HttpResponse> {
        let mut req = self.client.get(url);
        if let Some(h) = header {
            req = req.headers(h);
        }

        self.send(req).await
    }

    async fn post(
        &self,
        url: &str,
        header: Option<reqwest::header::HeaderMap>,
        body: Option<String>,
    ) -> Result<HttpResponse> {
        let mut req = self.client.post(url).body(body.unwrap_or_default());
        if let Some(h) = header {
            req = req.headers(h);
        }

        self.send(req).await
    }
}
