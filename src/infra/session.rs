use crate::error::*;
use rand::Rng;
use reqwest::header::HeaderMap;

/// public bearer token baked into the web client; same for every session
const AUTHORIZATION: &str = "Bearer AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// browser-session credentials plus the per-process client identity
#[derive(Clone, Debug)]
pub struct Session {
    auth_token: String,
    ct0: String,
    cookie_header: Option<String>,
    client_uuid: String,
    device_id: String,
}

impl Session {
    pub fn new(auth_token: String, ct0: String, cookie_header: Option<String>) -> Result<Session> {
        if auth_token.is_empty() || ct0.is_empty() {
            return Err(GeneralError::invalid_credentials(anyhow::anyhow!(
                "both the auth_token and ct0 cookies are required; set TORIKAGO_AUTH_TOKEN and TORIKAGO_CT0"
            )));
        }

        Ok(Session {
            auth_token,
            ct0,
            cookie_header,
            client_uuid: uuid::Uuid::new_v4().to_string(),
            device_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub fn cookie(&self) -> String {
        match &self.cookie_header {
            Some(header) => header.clone(),
            None => format!("auth_token={}; ct0={}", self.auth_token, self.ct0),
        }
    }

    /// must not repeat between requests
    fn transaction_id() -> String {
        let mut bytes = [0u8; 70];
        rand::thread_rng().fill(&mut bytes[..]);
        base64::encode(&bytes[..])
    }

    pub fn graphql_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        append(&mut headers, "authorization", AUTHORIZATION)?;
        append(&mut headers, "x-csrf-token", &self.ct0)?;
        append(&mut headers, "cookie", &self.cookie())?;
        append(&mut headers, "x-client-uuid", &self.client_uuid)?;
        append(&mut headers, "x-twitter-client-deviceid", &self.device_id)?;
        append(
            &mut headers,
            "x-client-transaction-id",
            &Session::transaction_id(),
        )?;
        append(&mut headers, "x-twitter-active-user", "yes")?;
        append(&mut headers, "x-twitter-auth-type", "OAuth2Session")?;
        append(&mut headers, "x-twitter-client-language", "en")?;
        append(&mut headers, "content-type", "application/json")?;
        append(&mut headers, "user-agent", USER_AGENT)?;
        append(&mut headers, "referer", "https://twitter.com/")?;

        Ok(headers)
    }

    /// same identity headers, but for the legacy form-encoded endpoints
    pub fn form_headers(&self) -> Result<HeaderMap> {
        let mut headers = self.graphql_headers()?;
        append(
            &mut headers,
            "content-type",
            "application/x-www-form-urlencoded",
        )?;

        Ok(headers)
    }
}

fn append(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<()> {
    let value = value.parse().map_err(GeneralError::serialization_error)?;
    // insert, not append: form_headers overrides content-type
    headers.insert(name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("token".to_string(), "csrf".to_string(), None).unwrap()
    }

    #[test]
    fn it_should_reject_missing_credentials() {
        let err = Session::new(String::new(), "csrf".to_string(), None).unwrap_err();
        assert_eq!(err.error_type(), "invalid_credentials");

        let err = Session::new("token".to_string(), String::new(), None).unwrap_err();
        assert_eq!(err.error_type(), "invalid_credentials");
    }

    #[test]
    fn it_should_synthesize_a_cookie_header_when_none_is_given() {
        assert_eq!(session().cookie(), "auth_token=token; ct0=csrf");

        let explicit = Session::new(
            "token".to_string(),
            "csrf".to_string(),
            Some("auth_token=token; ct0=csrf; lang=en".to_string()),
        )
        .unwrap();
        assert_eq!(explicit.cookie(), "auth_token=token; ct0=csrf; lang=en");
    }

    #[test]
    fn it_should_randomize_the_transaction_id_per_request() {
        let a = Session::transaction_id();
        let b = Session::transaction_id();
        assert_ne!(a, b);
        assert!(a.len() > 64);
    }

    #[test]
    fn it_should_build_the_csrf_and_cookie_headers() {
        let headers = session().graphql_headers().unwrap();
        assert_eq!(headers["x-csrf-token"], "csrf");
        assert_eq!(headers["cookie"], "auth_token=token; ct0=csrf");
        assert_eq!(headers["content-type"], "application/json");

        let form = session().form_headers().unwrap();
        assert_eq!(form["content-type"], "application/x-www-form-urlencoded");
    }
}
