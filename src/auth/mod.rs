//! Credential acquisition at the engine boundary.
//!
//! The engine never inspects token internals; it asks an authenticator
//! chain for a bearer token and injects it into every send. Strategies
//! form a chain-of-responsibility: an ordered list where the first one
//! that can handle the connection parameters wins, and the chain fails
//! closed with a descriptive error when none matches.

mod strategies;

pub use strategies::{ClientSecretAuthenticator, StaticTokenAuthenticator};

use crate::{Error, Result};
use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

/// Connection parameters handed to the authenticator chain.
#[derive(Debug, Clone, Default)]
pub struct AuthParameters {
    /// Token authority, e.g. `https://login.microsoftonline.com`.
    pub authority: String,
    /// The resource/audience tokens are requested for (the service root).
    pub resource: String,
    pub tenant: Option<String>,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub certificate_thumbprint: Option<String>,
    pub use_device_code: bool,
    pub use_current_user: bool,
}

impl AuthParameters {
    /// Default scope derived from the resource, `{resource}/.default`.
    pub fn scope(&self) -> String {
        format!("{}/.default", self.resource.trim_end_matches('/'))
    }
}

/// A bearer credential with its expiry.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub access_token: String,
    pub expires_on: SystemTime,
}

impl AuthToken {
    pub fn is_expired(&self) -> bool {
        self.expires_on <= SystemTime::now()
    }
}

/// One credential strategy in the chain.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Whether this strategy applies to the given parameters.
    fn can_authenticate(&self, parameters: &AuthParameters) -> bool;

    async fn authenticate(&self, parameters: &AuthParameters) -> Result<AuthToken>;
}

/// Ordered chain of credential strategies.
pub struct AuthenticationService {
    chain: Vec<Box<dyn Authenticator>>,
}

impl AuthenticationService {
    pub fn new(chain: Vec<Box<dyn Authenticator>>) -> Self {
        AuthenticationService { chain }
    }

    /// Walk the chain and authenticate with the first matching strategy.
    pub async fn authenticate(&self, parameters: &AuthParameters) -> Result<AuthToken> {
        let strategy = self
            .chain
            .iter()
            .find(|a| a.can_authenticate(parameters))
            .ok_or_else(|| {
                Error::authentication(
                    "Unable to detect required authentication flow. \
                     Please check the input parameters and try again.",
                )
            })?;
        strategy.authenticate(parameters).await
    }
}

/// Cached token shared read-mostly across concurrent sends.
///
/// Refreshing is serialized behind a connection-level lock so a burst of
/// sends against an expired token triggers a single refresh, not a storm.
pub struct TokenSource {
    service: AuthenticationService,
    parameters: AuthParameters,
    cached: Mutex<Option<AuthToken>>,
}

impl TokenSource {
    pub fn new(service: AuthenticationService, parameters: AuthParameters) -> Self {
        TokenSource {
            service,
            parameters,
            cached: Mutex::new(None),
        }
    }

    /// Seed the cache with a pre-acquired token.
    pub fn with_token(self, token: AuthToken) -> Self {
        TokenSource {
            cached: Mutex::new(Some(token)),
            ..self
        }
    }

    /// The current bearer token, re-authenticating when the cached one is
    /// absent or has expired.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        match cached.as_ref() {
            Some(token) if !token.is_expired() => Ok(token.access_token.clone()),
            _ => {
                let token = self.service.authenticate(&self.parameters).await?;
                let access_token = token.access_token.clone();
                *cached = Some(token);
                Ok(access_token)
            }
        }
    }
}

/// A token source backed by a fixed token, for pre-acquired credentials.
pub fn static_token_source(access_token: impl Into<String>) -> TokenSource {
    let token = AuthToken {
        access_token: access_token.into(),
        expires_on: SystemTime::now() + Duration::from_secs(60 * 60 * 24 * 365),
    };
    TokenSource::new(
        AuthenticationService::new(vec![Box::new(StaticTokenAuthenticator::new(
            token.access_token.clone(),
        ))]),
        AuthParameters::default(),
    )
    .with_token(token)
}
