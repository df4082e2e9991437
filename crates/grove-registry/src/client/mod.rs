//! HTTP index client with connection pooling and optional authentication

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::debug;
use url::Url;

use grove_core::error::GroveError;
use grove_core::{PackageCandidate, PackageName, SourceRef};

use crate::api::PackageMetadata;
use crate::retry::timeout_error;
use crate::source::PackageSource;
use crate::RegistryResult;

/// Authentication configuration for registry access
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Bearer token for authentication
    pub token: Option<String>,
    /// Basic auth username
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
}

/// JSON index reachable over HTTP
#[derive(Debug, Clone)]
pub struct RegistryClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    /// Name used in logs and errors
    name: String,
    /// Origin this client answers for
    origin: SourceRef,
    /// Base index URL, without a trailing slash
    base_url: String,
    request_timeout: Duration,
}

impl RegistryClient {
    /// Client for the default index
    pub fn new(base_url: &str) -> RegistryResult<Self> {
        Self::with_config("default", SourceRef::Registry, base_url, None, Duration::from_secs(30))
    }

    /// Client for a named `[[source]]` index
    pub fn named(name: &str, base_url: &str, auth: Option<AuthConfig>) -> RegistryResult<Self> {
        let origin = SourceRef::Index {
            name: name.to_string(),
        };
        Self::with_config(name, origin, base_url, auth, Duration::from_secs(30))
    }

    /// Create registry client with custom configuration
    pub fn with_config(
        name: &str,
        origin: SourceRef,
        base_url: &str,
        auth: Option<AuthConfig>,
        request_timeout: Duration,
    ) -> RegistryResult<Self> {
        Url::parse(base_url).map_err(|e| GroveError::ConfigValidation {
            field: format!("source.{}.url", name),
            reason: format!("'{}' is not a valid URL: {}", base_url, e),
        })?;

        let mut builder = ClientBuilder::new()
            // Connection pooling configuration
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(request_timeout)
            .gzip(true)
            .user_agent(concat!("grove/", env!("CARGO_PKG_VERSION")));

        if let Some(auth_value) = auth.and_then(authorization_value) {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::AUTHORIZATION,
                auth_value.parse().map_err(|e| GroveError::ConfigValidation {
                    field: format!("source.{}.auth", name),
                    reason: format!("invalid credentials: {}", e),
                })?,
            );
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| GroveError::network(format!("Failed to create HTTP client: {}", e), e))?;

        Ok(Self {
            client,
            name: name.to_string(),
            origin,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn metadata_url(&self, name: &PackageName) -> String {
        format!("{}/{}", self.base_url, name)
    }

    /// Resolve an archive location, which may be relative to the index
    fn archive_url(&self, location: &str) -> RegistryResult<Url> {
        let base = Url::parse(&format!("{}/", self.base_url))
            .map_err(|e| GroveError::source_error(&self.name, e.to_string()))?;
        base.join(location)
            .map_err(|e| GroveError::source_error(&self.name, format!("bad archive url '{}': {}", location, e)))
    }

    async fn get(&self, url: &str) -> RegistryResult<reqwest::Response> {
        debug!(source = %self.name, url, "GET");
        self.client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    timeout_error(&format!("GET {}", url), self.request_timeout)
                } else {
                    GroveError::network(format!("Request to {} failed: {}", url, e), e)
                }
            })
    }
}

fn authorization_value(auth: AuthConfig) -> Option<String> {
    use base64::{engine::general_purpose, Engine as _};

    if let Some(token) = auth.token {
        return Some(format!("Bearer {}", token));
    }
    match (auth.username, auth.password) {
        (Some(username), Some(password)) => Some(format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{}:{}", username, password))
        )),
        _ => None,
    }
}

#[async_trait]
impl PackageSource for RegistryClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, source: &SourceRef) -> bool {
        *source == self.origin
    }

    async fn fetch_metadata(&self, name: &PackageName) -> RegistryResult<PackageMetadata> {
        let url = self.metadata_url(name);
        let response = self.get(&url).await?;

        match response.status() {
            StatusCode::OK => response.json::<PackageMetadata>().await.map_err(|e| {
                GroveError::source_error(&self.name, format!("invalid metadata for {}: {}", name, e))
            }),
            StatusCode::NOT_FOUND => Err(GroveError::PackageNotFound {
                name: name.to_string(),
            }),
            status => Err(GroveError::source_error(
                &self.name,
                format!("index returned status {} for {}", status, name),
            )),
        }
    }

    async fn fetch_archive(&self, candidate: &PackageCandidate) -> RegistryResult<Vec<u8>> {
        let location = candidate.dist.url.as_deref().ok_or_else(|| {
            GroveError::source_error(&self.name, format!("{} has no archive url", candidate))
        })?;
        let url = self.archive_url(location)?;
        let response = self.get(url.as_str()).await?;

        if !response.status().is_success() {
            return Err(GroveError::source_error(
                &self.name,
                format!("archive download for {} returned {}", candidate, response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GroveError::network(format!("Failed to read archive: {}", e), e))?;
        Ok(bytes.to_vec())
    }
}
