//! Single-request execution against the GraphQL endpoints, plus the recovery
//! ladder for rotated query ids: a 404 forces a refresh and one retry, a
//! second 404 falls back to the generic (non-operation-addressed) endpoint.
//! An HTTP 2xx can still carry an error list in its body, so every response
//! is classified before it counts as a success.

use crate::domain::interface::{HttpResponse, IHttpClient};
use crate::error::*;
use crate::infra::Session;
use crate::repository::query_id;
use http::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

pub const PRIVATE_API_BASE: &str = "https://twitter.com/i/api/";

/// the error list of a 2xx response body
#[derive(Debug, Clone)]
pub struct ApiErrors {
    pub codes: Vec<i64>,
    pub message: String,
}

impl ApiErrors {
    pub fn from_body(json: &Value) -> Option<ApiErrors> {
        let errors = json.get("errors")?.as_array()?;
        if errors.is_empty() {
            return None;
        }
        let codes = errors
            .iter()
            .filter_map(|e| e.get("code").and_then(|c| c.as_i64()))
            .collect();
        let message = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
            .collect::<Vec<_>>()
            .join("; ");
        Some(ApiErrors {
            codes,
            message: if message.is_empty() {
                "unspecified api error".to_string()
            } else {
                message
            },
        })
    }

    pub fn has_code(&self, code: i64) -> bool {
        self.codes.contains(&code)
    }

    pub fn into_service_error(self) -> ServiceError {
        ServiceError::new(ApiError::ApiLogic, anyhow::anyhow!("{}", self.message))
    }
}

/// what a routed request ultimately produced
pub enum RequestOutcome {
    Payload(Value),
    ApiFailure(ApiErrors),
}

enum ExecOutcome {
    Payload(Value),
    ApiFailure(ApiErrors),
    NotFound,
}

#[derive(Clone)]
pub struct GraphqlClient {
    session: Session,
    http: Arc<dyn IHttpClient + Send + Sync>,
}

impl GraphqlClient {
    pub fn new(session: Session, http: Arc<dyn IHttpClient + Send + Sync>) -> GraphqlClient {
        GraphqlClient { session, http }
    }

    async fn execute_once(
        &self,
        method: &Method,
        operation: &str,
        query_id: &str,
        variables: &Value,
        features: Option<&Value>,
    ) -> Result<ExecOutcome> {
        let headers = self.session.graphql_headers()?;
        log::debug!("{method} {operation} via query id {query_id}");

        let response = if *method == Method::GET {
            let mut params = vec![("variables", variables.to_string())];
            if let Some(features) = features {
                params.push(("features", features.to_string()));
            }
            let url = Url::parse_with_params(
                &format!("{PRIVATE_API_BASE}graphql/{query_id}/{operation}?"),
                &params,
            )
            .map_err(GeneralError::serialization_error)?;
            self.http.get(url.as_str(), Some(headers)).await?
        } else {
            let mut body = json!({ "variables": variables, "queryId": query_id });
            if let Some(features) = features {
                body["features"] = features.clone();
            }
            let url = format!("{PRIVATE_API_BASE}graphql/{query_id}/{operation}");
            self.http.post(&url, Some(headers), Some(body.to_string())).await?
        };

        classify(operation, response)
    }

    /// refresh, retry once, then address the generic endpoint; whatever the
    /// generic endpoint answers is final
    async fn recover_stale(
        &self,
        method: &Method,
        operation: &str,
        variables: &Value,
        features: Option<&Value>,
    ) -> Result<RequestOutcome> {
        log::info!("{operation}: query id rejected (404), forcing a refresh");
        if let Err(e) =
            query_id::refresh(self.http.as_ref(), &[operation.to_string()], true).await
        {
            // a stale-but-usable id remains a valid fallback
            log::warn!("query id refresh failed: {}", e.describe());
        }

        let retry_id = query_id::resolve(operation).query_id;
        match self
            .execute_once(method, operation, &retry_id, variables, features)
            .await?
        {
            ExecOutcome::Payload(v) => return Ok(RequestOutcome::Payload(v)),
            ExecOutcome::ApiFailure(f) => return Ok(RequestOutcome::ApiFailure(f)),
            ExecOutcome::NotFound => {}
        }

        log::info!("{operation}: still 404 after refresh, trying the generic endpoint");
        let mut body = json!({
            "queryId": retry_id,
            "operationName": operation,
            "variables": variables,
        });
        if let Some(features) = features {
            body["features"] = features.clone();
        }
        let headers = self.session.graphql_headers()?;
        let response = self
            .http
            .post(
                &format!("{PRIVATE_API_BASE}graphql"),
                Some(headers),
                Some(body.to_string()),
            )
            .await?;

        match classify(operation, response)? {
            ExecOutcome::Payload(v) => Ok(RequestOutcome::Payload(v)),
            ExecOutcome::ApiFailure(f) => Ok(RequestOutcome::ApiFailure(f)),
            ExecOutcome::NotFound => Err(ServiceError::new(
                ApiError::NotFound,
                anyhow::anyhow!("{operation} is unrouteable even via the generic endpoint"),
            )),
        }
    }

    pub async fn request(
        &self,
        method: Method,
        operation: &str,
        variables: &Value,
        features: Option<&Value>,
    ) -> Result<RequestOutcome> {
        let resolved = query_id::resolve(operation);
        if !resolved.fresh {
            log::debug!("{operation}: cached query id is stale, using it anyway");
        }

        match self
            .execute_once(&method, operation, &resolved.query_id, variables, features)
            .await?
        {
            ExecOutcome::Payload(v) => Ok(RequestOutcome::Payload(v)),
            ExecOutcome::ApiFailure(f) => Ok(RequestOutcome::ApiFailure(f)),
            ExecOutcome::NotFound => {
                self.recover_stale(&method, operation, variables, features).await
            }
        }
    }

    /// GET with api-level failures promoted to errors
    pub async fn fetch(
        &self,
        operation: &str,
        variables: &Value,
        features: Option<&Value>,
    ) -> Result<Value> {
        match self.request(Method::GET, operation, variables, features).await? {
            RequestOutcome::Payload(v) => Ok(v),
            RequestOutcome::ApiFailure(f) => Err(f.into_service_error()),
        }
    }

    /// GET trying every known id for the operation in order before the
    /// refresh ladder; used by the families whose ids rotate most
    pub async fn fetch_with_candidates(
        &self,
        operation: &str,
        variables: &Value,
        features: Option<&Value>,
    ) -> Result<Value> {
        for query_id in query_id::candidates(operation) {
            match self
                .execute_once(&Method::GET, operation, &query_id, variables, features)
                .await?
            {
                ExecOutcome::Payload(v) => return Ok(v),
                ExecOutcome::ApiFailure(f) => return Err(f.into_service_error()),
                ExecOutcome::NotFound => {
                    log::debug!("{operation}: candidate query id {query_id} rejected")
                }
            }
        }

        match self
            .recover_stale(&Method::GET, operation, variables, features)
            .await?
        {
            RequestOutcome::Payload(v) => Ok(v),
            RequestOutcome::ApiFailure(f) => Err(f.into_service_error()),
        }
    }

    pub async fn mutate(&self, operation: &str, variables: &Value) -> Result<Value> {
        match self.request(Method::POST, operation, variables, None).await? {
            RequestOutcome::Payload(v) => Ok(v),
            RequestOutcome::ApiFailure(f) => Err(f.into_service_error()),
        }
    }

    /// POST keeping api-level failures inspectable, for the write fallback
    pub async fn mutate_classified(
        &self,
        operation: &str,
        variables: &Value,
    ) -> Result<RequestOutcome> {
        self.request(Method::POST, operation, variables, None).await
    }
}

fn classify(operation: &str, response: HttpResponse) -> Result<ExecOutcome> {
    if response.status == http::StatusCode::NOT_FOUND {
        return Ok(ExecOutcome::NotFound);
    }
    if !response.is_success() {
        return Err(ServiceError::new(
            ApiError::HttpStatus(response.status.as_u16()),
            anyhow::anyhow!(
                "{operation} returned {}: {}",
                response.status,
                snippet(&response.body)
            ),
        ));
    }

    let json: Value =
        serde_json::from_str(&response.body).map_err(GeneralError::serialization_error)?;
    if let Some(failure) = ApiErrors::from_body(&json) {
        log::debug!("{operation} answered 2xx with api errors: {}", failure.message);
        return Ok(ExecOutcome::ApiFailure(failure));
    }
    Ok(ExecOutcome::Payload(json))
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::interface::testing::ScriptedHttp;
    use crate::repository::query_id::ops;

    fn client(http: Arc<ScriptedHttp>) -> GraphqlClient {
        let session =
            Session::new("token".to_string(), "csrf".to_string(), None).unwrap();
        GraphqlClient::new(session, http)
    }

    #[tokio::test]
    async fn it_should_return_the_payload_on_first_success() {
        let http = Arc::new(ScriptedHttp::new(vec![(
            "/Bookmarks?",
            200,
            r#"{"data":{"bookmark_timeline_v2":{}}}"#,
        )]));
        let json = client(http.clone())
            .fetch(ops::BOOKMARKS, &json!({"count": 20}), None)
            .await
            .unwrap();
        assert!(json["data"]["bookmark_timeline_v2"].is_object());
        assert_eq!(http.remaining(), 0);
    }

    #[tokio::test]
    async fn it_should_refresh_and_retry_once_on_404() {
        // attempt 1 404s, the bundle scrape finds nothing (refresh fails
        // silently), attempt 2 succeeds: exactly 2 operation fetches
        let http = Arc::new(ScriptedHttp::new(vec![
            ("/CreateBookmark", 404, ""),
            ("twitter.com/home", 200, "<html>no bundles here</html>"),
            ("/CreateBookmark", 200, r#"{"data":{"ok":true}}"#),
        ]));
        let json = client(http.clone())
            .mutate(ops::CREATE_BOOKMARK, &json!({"tweet_id": "1"}))
            .await
            .unwrap();
        assert_eq!(json["data"]["ok"], true);
        assert_eq!(http.calls_matching("/CreateBookmark"), 2);
        assert_eq!(http.remaining(), 0);
    }

    #[tokio::test]
    async fn it_should_fall_back_to_the_generic_endpoint_after_two_404s() {
        let http = Arc::new(ScriptedHttp::new(vec![
            ("/DeleteBookmark", 404, ""),
            ("twitter.com/home", 200, "<html></html>"),
            ("/DeleteBookmark", 404, ""),
            ("api/graphql", 200, r#"{"data":{"ok":true}}"#),
        ]));
        let json = client(http.clone())
            .mutate(ops::DELETE_BOOKMARK, &json!({"tweet_id": "1"}))
            .await
            .unwrap();
        assert_eq!(json["data"]["ok"], true);
        // the generic endpoint is addressed without an operation path segment
        let generic = http.body_of_call(3).unwrap();
        assert!(generic.contains("\"operationName\":\"DeleteBookmark\""));
    }

    #[tokio::test]
    async fn it_should_treat_a_2xx_error_list_as_a_failure() {
        let http = Arc::new(ScriptedHttp::new(vec![(
            "/UserTweets",
            200,
            r#"{"errors":[{"message":"Rate limit exceeded","code":88}]}"#,
        )]));
        let err = client(http)
            .fetch(ops::USER_TWEETS, &json!({}), None)
            .await
            .unwrap_err();
        assert!(err.is_error_of(ApiError::ApiLogic));
        assert!(err.describe().contains("Rate limit exceeded"));
    }

    #[tokio::test]
    async fn it_should_keep_api_failures_inspectable_for_the_write_path() {
        let http = Arc::new(ScriptedHttp::new(vec![(
            "/CreateTweet",
            200,
            r#"{"errors":[{"message":"Automated request","code":226}]}"#,
        )]));
        let outcome = client(http)
            .mutate_classified(ops::CREATE_TWEET, &json!({}))
            .await
            .unwrap();
        match outcome {
            RequestOutcome::ApiFailure(failure) => {
                assert!(failure.has_code(226));
                assert!(!failure.has_code(88));
            }
            RequestOutcome::Payload(_) => panic!("expected an api failure"),
        }
    }

    #[tokio::test]
    async fn it_should_surface_other_http_statuses_as_terminal() {
        let http = Arc::new(ScriptedHttp::new(vec![(
            "/UserTweets",
            503,
            "over capacity",
        )]));
        let err = client(http.clone())
            .fetch(ops::USER_TWEETS, &json!({}), None)
            .await
            .unwrap_err();
        assert!(err.is_error_of(ApiError::HttpStatus(503)));
        // no refresh, no retry
        assert_eq!(http.calls_matching("/UserTweets"), 1);
    }

    #[tokio::test]
    async fn it_should_walk_candidate_ids_before_refreshing() {
        let http = Arc::new(ScriptedHttp::new(vec![
            ("/TweetDetail", 404, ""),
            ("/TweetDetail", 200, r#"{"data":{}}"#),
        ]));
        client(http.clone())
            .fetch_with_candidates(ops::TWEET_DETAIL, &json!({"focalTweetId": "1"}), None)
            .await
            .unwrap();
        // the second candidate answered; the bundle scrape never ran
        assert_eq!(http.calls_matching("twitter.com/home"), 0);
        assert_eq!(http.calls_matching("/TweetDetail"), 2);
    }

    #[tokio::test]
    async fn it_should_propagate_scripted_transport_failures() {
        let http = Arc::new(ScriptedHttp::new(vec![("/UserTweets", 0, "")]));
        let err = client(http)
            .fetch(ops::USER_TWEETS, &json!({}), None)
            .await
            .unwrap_err();
        assert!(err.is_error_of(ApiError::Transport));
    }
}
