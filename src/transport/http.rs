use crate::config::ServiceConfig;
use crate::model::{Batch, Operation};
use crate::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use url::Url;

#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::validation(format!("Invalid base URL: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert("OData-MaxVersion", HeaderValue::from_static("4.0"));
        headers.insert("OData-Version", HeaderValue::from_static("4.0"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(HttpTransport { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an operation URI against the base; absolute URIs pass
    /// through untouched.
    pub fn resolve(&self, uri: &str) -> Result<Url> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Url::parse(uri)
                .map_err(|e| Error::validation(format!("Invalid operation URI '{uri}': {e}")));
        }
        self.base_url
            .join(uri)
            .map_err(|e| Error::validation(format!("Invalid operation URI '{uri}': {e}")))
    }

    /// POST a batch to `{base}/$batch` with its multipart content type.
    pub async fn send_batch(&self, batch: &Batch, bearer: &str) -> Result<reqwest::Response> {
        let url = self.base_url.join("$batch").map_err(|e| {
            Error::validation(format!("Base URL cannot address the $batch endpoint: {e}"))
        })?;
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .header("Content-Type", batch.content_type())
            .body(batch.to_multipart())
            .send()
            .await?;
        Ok(response)
    }

    /// Send one operation outside of any batch.
    pub async fn send_operation(
        &self,
        operation: &Operation,
        bearer: &str,
    ) -> Result<reqwest::Response> {
        let method = reqwest::Method::from_bytes(operation.method.to_uppercase().as_bytes())
            .map_err(|_| {
                Error::validation(format!("Invalid HTTP method '{}'.", operation.method))
            })?;
        let url = self.resolve(&operation.uri)?;
        let mut request = self.client.request(method, url).bearer_auth(bearer);
        if let Some(value) = &operation.value {
            request = request
                .header("Content-Type", "application/json")
                .body(value.to_wire_string());
        }
        if let Some(headers) = &operation.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }
        Ok(request.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> HttpTransport {
        HttpTransport::new(&ServiceConfig::new(
            "https://org.crm.dynamics.com/api/data/v9.2",
        ))
        .unwrap()
    }

    #[test]
    fn relative_uri_resolves_against_base() {
        let url = transport().resolve("accounts?$top=5").unwrap();
        assert_eq!(
            url.as_str(),
            "https://org.crm.dynamics.com/api/data/v9.2/accounts?$top=5"
        );
    }

    #[test]
    fn absolute_uri_passes_through() {
        let url = transport()
            .resolve("https://other.example.com/api/data/v9.2/contacts")
            .unwrap();
        assert_eq!(url.host_str(), Some("other.example.com"));
    }

    #[test]
    fn invalid_base_url_is_a_validation_error() {
        let err = HttpTransport::new(&ServiceConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
