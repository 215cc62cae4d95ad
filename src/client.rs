//! High-level entry point tying auth, transport, and execution together.

use crate::auth::{
    static_token_source, AuthParameters, AuthenticationService, ClientSecretAuthenticator,
    TokenSource,
};
use crate::config::{DispatcherConfig, ServiceConfig};
use crate::dispatch::Dispatcher;
use crate::execute::{BatchProcessor, OperationProcessor, RetryPolicy};
use crate::model::{Batch, Operation, OperationResponse};
use crate::transport::HttpTransport;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

enum AuthChoice {
    None,
    AccessToken(String),
    Parameters(AuthParameters),
}

/// Configures and constructs a [`ServiceClient`].
pub struct ServiceClientBuilder {
    config: ServiceConfig,
    auth: AuthChoice,
    retry: RetryPolicy,
    fail_on_operation_error: bool,
}

impl ServiceClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        ServiceClientBuilder {
            config: ServiceConfig::new(base_url),
            auth: AuthChoice::None,
            retry: RetryPolicy::default(),
            fail_on_operation_error: false,
        }
    }

    /// Use a pre-acquired bearer token, skipping the authentication chain.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.auth = AuthChoice::AccessToken(token.into());
        self
    }

    /// Authenticate through the strategy chain with these parameters.
    pub fn with_auth_parameters(mut self, parameters: AuthParameters) -> Self {
        self.auth = AuthChoice::Parameters(parameters);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_request_timeout(timeout);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Turn operation failures inside delivered batches into errors
    /// instead of partially-failed responses.
    pub fn with_fail_on_operation_error(mut self, fail: bool) -> Self {
        self.fail_on_operation_error = fail;
        self
    }

    pub fn build(self) -> Result<ServiceClient> {
        let tokens = match self.auth {
            AuthChoice::AccessToken(token) => static_token_source(token),
            AuthChoice::Parameters(parameters) => {
                let service =
                    AuthenticationService::new(vec![Box::new(ClientSecretAuthenticator::new())]);
                TokenSource::new(service, parameters)
            }
            AuthChoice::None => {
                return Err(Error::authentication(
                    "No credentials configured. Provide an access token or auth parameters.",
                ))
            }
        };
        let tokens = Arc::new(tokens);
        let transport = Arc::new(HttpTransport::new(&self.config)?);

        let operations = Arc::new(OperationProcessor::new(
            Arc::clone(&transport),
            Arc::clone(&tokens),
            self.retry.clone(),
        ));
        let batches = Arc::new(
            BatchProcessor::new(Arc::clone(&transport), Arc::clone(&tokens), self.retry)
                .with_fail_on_operation_error(self.fail_on_operation_error),
        );

        Ok(ServiceClient {
            operations,
            batches,
        })
    }
}

/// A connected client for one service endpoint.
///
/// Cheap to clone; all state is shared behind [`Arc`]s.
#[derive(Clone)]
pub struct ServiceClient {
    operations: Arc<OperationProcessor>,
    batches: Arc<BatchProcessor>,
}

impl ServiceClient {
    pub fn builder(base_url: impl Into<String>) -> ServiceClientBuilder {
        ServiceClientBuilder::new(base_url)
    }

    /// Send a single operation outside any batch.
    pub async fn execute(&self, operation: &mut Operation) -> Result<OperationResponse> {
        self.operations.execute(operation).await
    }

    /// Send a whole batch and return it with its response installed.
    pub async fn execute_batch(&self, batch: Batch) -> Result<Batch> {
        self.batches.execute(batch).await
    }

    /// Start a dispatch session over this client.
    pub fn dispatcher(&self, config: DispatcherConfig) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.batches) as Arc<dyn crate::execute::BatchSender>,
            Arc::clone(&self.operations),
            config,
        )
    }
}
