use std::io::{Read, Write};
use std::net::TcpListener;

use chrono::Utc;
use serde::Deserialize;
use url::Url;

use crate::error::ApiError;
use crate::traits::Credential;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const REDIRECT_ADDR: &str = "127.0.0.1:19743";
const REDIRECT_URI: &str = "http://127.0.0.1:19743";
const SCOPE: &str = "https://www.googleapis.com/auth/youtube";

/// OAuth client registration for the installed-app flow.
#[derive(Debug, Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
}

impl TokenResponse {
    pub fn into_credential(self) -> Credential {
        let expires_at = self
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64));
        Credential {
            access_token: self.access_token,
            expires_at,
        }
    }
}

/// Run the OAuth2 Authorization Code Grant flow against Google.
///
/// 1. Open the browser to the consent page.
/// 2. Listen on 127.0.0.1:19743 for the redirect with `?code=...`.
/// 3. Exchange the code for an access token.
pub async fn authorize(app: &OAuthApp) -> Result<Credential, ApiError> {
    let auth_url = Url::parse_with_params(
        AUTH_URL,
        &[
            ("client_id", app.client_id.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("response_type", "code"),
            ("scope", SCOPE),
            ("access_type", "online"),
        ],
    )
    .map_err(|e| ApiError::Auth(format!("invalid authorization URL: {e}")))?;

    tracing::info!("Opening Google authorization URL in browser");
    open::that(auth_url.as_str())
        .map_err(|e| ApiError::Auth(format!("failed to open browser: {e}")))?;

    let code = tokio::task::spawn_blocking(listen_for_redirect)
        .await
        .map_err(|e| ApiError::Auth(format!("redirect listener failed: {e}")))??;

    exchange_code(app, &code).await
}

/// Accept one connection on the loopback redirect address and pull the
/// authorization code out of it.
fn listen_for_redirect() -> Result<String, ApiError> {
    let listener = TcpListener::bind(REDIRECT_ADDR)
        .map_err(|e| ApiError::Auth(format!("failed to bind {REDIRECT_ADDR}: {e}")))?;

    tracing::info!("Waiting for OAuth redirect on {REDIRECT_ADDR}...");

    let (mut stream, _) = listener
        .accept()
        .map_err(|e| ApiError::Auth(format!("failed to accept connection: {e}")))?;

    let mut buf = [0u8; 4096];
    let n = stream
        .read(&mut buf)
        .map_err(|e| ApiError::Auth(format!("failed to read from stream: {e}")))?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let result = parse_redirect(&request);

    let page = match &result {
        Ok(_) => "<h2>Authorization successful!</h2><p>You can close this tab.</p>",
        Err(_) => "<h2>Authorization failed.</h2><p>Return to laterclean for details.</p>",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<html><body>{page}</body></html>"
    );
    let _ = stream.write_all(response.as_bytes());

    result
}

/// Extract the `code` parameter from the raw redirect request.
///
/// A redirect carrying `error=...` means the user declined consent.
fn parse_redirect(request: &str) -> Result<String, ApiError> {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| ApiError::Auth("malformed HTTP request from redirect".into()))?;

    let parsed = Url::parse(&format!("http://localhost{path}"))
        .map_err(|e| ApiError::Auth(format!("failed to parse redirect URL: {e}")))?;

    if let Some((_, reason)) = parsed.query_pairs().find(|(k, _)| k == "error") {
        return Err(ApiError::Auth(format!("authorization denied: {reason}")));
    }

    parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
        .ok_or_else(|| ApiError::Auth("no 'code' parameter in redirect".into()))
}

/// Exchange the authorization code for an access token.
async fn exchange_code(app: &OAuthApp, code: &str) -> Result<Credential, ApiError> {
    let http = reqwest::Client::new();
    let resp = http
        .post(TOKEN_URL)
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code", code),
        ])
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Auth(format!(
            "token exchange failed (status {status}): {body}"
        )));
    }

    resp.json::<TokenResponse>()
        .await
        .map(TokenResponse::into_credential)
        .map_err(|e| ApiError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_redirect_code() {
        let req = "GET /?code=4%2F0Adeu5BW&scope=youtube HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n";
        assert_eq!(parse_redirect(req).unwrap(), "4/0Adeu5BW");
    }

    #[test]
    fn test_parse_redirect_denied() {
        let req = "GET /?error=access_denied HTTP/1.1\r\n\r\n";
        let err = parse_redirect(req).unwrap_err();
        assert!(matches!(err, ApiError::Auth(ref m) if m.contains("access_denied")));
    }

    #[test]
    fn test_parse_redirect_malformed() {
        assert!(matches!(parse_redirect(""), Err(ApiError::Auth(_))));
        assert!(matches!(
            parse_redirect("GET /favicon.ico HTTP/1.1\r\n"),
            Err(ApiError::Auth(_))
        ));
    }

    #[test]
    fn test_token_response_expiry() {
        let token = TokenResponse {
            access_token: "ya29.a0".into(),
            expires_in: Some(3599),
            refresh_token: None,
            token_type: Some("Bearer".into()),
        };
        let cred = token.into_credential();
        assert_eq!(cred.access_token, "ya29.a0");
        assert!(!cred.is_expired(Utc::now()));
        assert!(cred.is_expired(Utc::now() + chrono::Duration::hours(2)));
    }
}
