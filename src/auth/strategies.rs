use super::{AuthParameters, AuthToken, Authenticator};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, SystemTime};

/// Always-applicable strategy returning a fixed, pre-acquired token.
pub struct StaticTokenAuthenticator {
    access_token: String,
}

impl StaticTokenAuthenticator {
    pub fn new(access_token: impl Into<String>) -> Self {
        StaticTokenAuthenticator {
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    fn can_authenticate(&self, _: &AuthParameters) -> bool {
        true
    }

    async fn authenticate(&self, _: &AuthParameters) -> Result<AuthToken> {
        Ok(AuthToken {
            access_token: self.access_token.clone(),
            expires_on: SystemTime::now() + Duration::from_secs(60 * 60),
        })
    }
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// OAuth2 client-credentials strategy: a confidential client exchanging
/// its secret for a token at `{authority}/{tenant}/oauth2/v2.0/token`.
///
/// Interactive flows (device code, current user) stay outside the engine;
/// callers plug them in as their own [`Authenticator`] implementations.
pub struct ClientSecretAuthenticator {
    http: reqwest::Client,
}

impl ClientSecretAuthenticator {
    pub fn new() -> Self {
        ClientSecretAuthenticator {
            http: reqwest::Client::new(),
        }
    }

    fn token_endpoint(parameters: &AuthParameters) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            parameters.authority.trim_end_matches('/'),
            parameters.tenant.as_deref().unwrap_or("organizations")
        )
    }
}

impl Default for ClientSecretAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for ClientSecretAuthenticator {
    fn can_authenticate(&self, parameters: &AuthParameters) -> bool {
        !parameters.use_device_code
            && !parameters.use_current_user
            && parameters
                .client_secret
                .as_deref()
                .is_some_and(|s| !s.is_empty())
    }

    async fn authenticate(&self, parameters: &AuthParameters) -> Result<AuthToken> {
        let secret = parameters
            .client_secret
            .as_deref()
            .ok_or_else(|| Error::authentication("Client secret is missing."))?;
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", parameters.client_id.as_str()),
            ("client_secret", secret),
            ("scope", &parameters.scope()),
        ];
        let response = self
            .http
            .post(Self::token_endpoint(parameters))
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::authentication(format!(
                "Token endpoint returned {status}: {body}"
            )));
        }
        let token: TokenEndpointResponse = response.json().await?;
        Ok(AuthToken {
            access_token: token.access_token,
            expires_on: SystemTime::now() + Duration::from_secs(token.expires_in.max(60)),
        })
    }
}
