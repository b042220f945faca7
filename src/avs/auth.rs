//! OAuth against the Amazon token endpoint
//!
//! Two grants: `authorization_code` for the one-time bootstrap (the user
//! pastes the code from the consent redirect) and `refresh_token` for the
//! routine refresh when the access token goes stale. The credential
//! client uses library-default timeouts.

use serde::Deserialize;

/// Amazon OAuth token endpoint.
pub const TOKEN_URL: &str = "https://api.amazon.com/auth/o2/token";

/// Redirect URI registered for the device profile.
const REDIRECT_URI: &str = "https://localhost";

/// Device identity baked into the consent URL.
const DEVICE_TYPE_ID: &str = "Camera0081";
const DEVICE_SERIAL: &str = "123456";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned error: {0}")]
    Endpoint(String),

    #[error("token response missing {0}")]
    MissingField(&'static str),
}

/// Wire shape of a token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

/// A successful grant.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present on code exchange; refresh responses may omit it.
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// The login-with-Amazon consent URL the user opens in a browser.
pub fn login_url(client_id: &str) -> String {
    format!(
        "https://www.amazon.com/ap/oa?client_id={}&scope=alexa%3Aall&\
         scope_data=%7B%22alexa%3Aall%22%3A%20%7B%22productID%22%3A%20%22{}%22%2C%20%22\
         productInstanceAttributes%22%3A%20%7B%22deviceSerialNumber%22%3A%20%22{}%22%7D%7D%7D&\
         response_type=code&redirect_uri=https%3A%2F%2Flocalhost",
        client_id, DEVICE_TYPE_ID, DEVICE_SERIAL
    )
}

/// Exchange a consent code for refresh + access tokens (bootstrap).
pub fn exchange_code(
    http: &reqwest::blocking::Client,
    client_id: &str,
    client_secret: &str,
    code: &str,
) -> Result<TokenGrant, AuthError> {
    request_token(
        http,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", REDIRECT_URI),
        ],
    )
}

/// Trade the refresh token for a fresh access token.
pub fn refresh_access_token(
    http: &reqwest::blocking::Client,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenGrant, AuthError> {
    request_token(
        http,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ],
    )
}

fn request_token(
    http: &reqwest::blocking::Client,
    params: &[(&str, &str)],
) -> Result<TokenGrant, AuthError> {
    let resp: TokenResponse = http.post(TOKEN_URL).form(params).send()?.json()?;
    grant_from_response(resp)
}

fn grant_from_response(resp: TokenResponse) -> Result<TokenGrant, AuthError> {
    if let Some(error) = resp.error {
        return Err(AuthError::Endpoint(error));
    }
    let access_token = resp
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingField("access_token"))?;
    let expires_in = resp
        .expires_in
        .ok_or(AuthError::MissingField("expires_in"))?;

    Ok(TokenGrant {
        access_token,
        refresh_token: resp.refresh_token,
        expires_in,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> TokenResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_grant_from_full_response() {
        let resp = parse(
            r#"{"access_token":"Atza|abc","refresh_token":"Atzr|def","expires_in":3600,"token_type":"bearer"}"#,
        );
        let grant = grant_from_response(resp).unwrap();
        assert_eq!(grant.access_token, "Atza|abc");
        assert_eq!(grant.refresh_token.as_deref(), Some("Atzr|def"));
        assert_eq!(grant.expires_in, 3600);
    }

    #[test]
    fn test_grant_without_refresh_token() {
        let resp = parse(r#"{"access_token":"Atza|abc","expires_in":900}"#);
        let grant = grant_from_response(resp).unwrap();
        assert!(grant.refresh_token.is_none());
    }

    #[test]
    fn test_endpoint_error_wins() {
        let resp = parse(r#"{"error":"invalid_grant","error_description":"expired"}"#);
        let err = grant_from_response(resp).unwrap_err();
        assert!(matches!(err, AuthError::Endpoint(ref e) if e == "invalid_grant"));
    }

    #[test]
    fn test_empty_access_token_rejected() {
        let resp = parse(r#"{"access_token":"","expires_in":3600}"#);
        assert!(matches!(
            grant_from_response(resp),
            Err(AuthError::MissingField("access_token"))
        ));
    }

    #[test]
    fn test_missing_expiry_rejected() {
        let resp = parse(r#"{"access_token":"Atza|abc"}"#);
        assert!(matches!(
            grant_from_response(resp),
            Err(AuthError::MissingField("expires_in"))
        ));
    }

    #[test]
    fn test_login_url_carries_identity() {
        let url = login_url("amzn1.application-oa2-client.xyz");
        assert!(url.contains("client_id=amzn1.application-oa2-client.xyz"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains(DEVICE_TYPE_ID));
        assert!(url.contains(DEVICE_SERIAL));
    }
}
