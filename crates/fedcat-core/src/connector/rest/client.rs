//! HTTP client for an Iceberg REST catalog.

use super::api;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{CatalogError, CatalogResult};
use crate::name::QualifiedName;
use parking_lot::RwLock;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How the client authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialType {
    #[default]
    None,
    Bearer,
    OAuth2,
}

impl std::str::FromStr for CredentialType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(CredentialType::None),
            "bearer" => Ok(CredentialType::Bearer),
            "oauth2" => Ok(CredentialType::OAuth2),
            other => Err(crate::Error::Config(format!(
                "Unknown REST credential type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestClientConfig {
    pub base_uri: String,
    pub warehouse: Option<String>,
    pub timeout: Duration,
    pub credential_type: CredentialType,
    pub bearer_token: Option<String>,
    pub oauth2_client_id: Option<String>,
    pub oauth2_client_secret: Option<String>,
    pub oauth2_scope: Option<String>,
}

impl RestClientConfig {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into().trim_end_matches('/').to_string(),
            warehouse: None,
            timeout: Duration::from_secs(30),
            credential_type: CredentialType::None,
            bearer_token: None,
            oauth2_client_id: None,
            oauth2_client_secret: None,
            oauth2_scope: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Iceberg REST catalog client.
///
/// Paths are rooted at `/v1/{prefix}` where the prefix comes from the
/// catalog's `/v1/config` overrides.
pub struct RestCatalogClient {
    catalog: String,
    client: Client,
    config: RestClientConfig,
    prefix: RwLock<Option<String>>,
    oauth_token: RwLock<Option<CachedToken>>,
    circuit_breaker: CircuitBreaker,
}

impl RestCatalogClient {
    pub async fn new(catalog: &str, config: RestClientConfig) -> crate::Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let client = Self {
            catalog: catalog.to_string(),
            client: http_client,
            circuit_breaker: CircuitBreaker::new(
                CircuitBreakerConfig::new(format!("iceberg-rest-{}", catalog))
                    .with_failure_threshold(5)
                    .with_reset_timeout(Duration::from_secs(30))
                    .with_success_threshold(2),
            ),
            config,
            prefix: RwLock::new(None),
            oauth_token: RwLock::new(None),
        };

        if client.config.credential_type == CredentialType::OAuth2 {
            client.refresh_oauth_token().await?;
        }
        if let Err(e) = client.load_config().await {
            warn!(catalog = %catalog, uri = %client.config.base_uri, error = %e, "Iceberg REST config not loaded, will retry on first operation");
        }

        info!(catalog = %catalog, uri = %client.config.base_uri, "Iceberg REST client initialized");
        Ok(client)
    }

    /// Fetch `/v1/config` and remember the path prefix.
    pub async fn load_config(&self) -> CatalogResult<api::ConfigResponse> {
        let mut path = "/v1/config".to_string();
        if let Some(warehouse) = &self.config.warehouse {
            path.push_str(&format!("?warehouse={}", urlencoding::encode(warehouse)));
        }
        let catalog = QualifiedName::of_catalog(self.catalog.as_str())?;
        let config: api::ConfigResponse = self
            .send_json(&catalog, Method::GET, &path, None::<&()>)
            .await?;
        let prefix = config
            .overrides
            .get("prefix")
            .or_else(|| config.defaults.get("prefix"))
            .cloned()
            .unwrap_or_default();
        debug!(catalog = %self.catalog, prefix = %prefix, "Loaded Iceberg REST config");
        *self.prefix.write() = Some(prefix);
        Ok(config)
    }

    async fn auth_header(&self) -> CatalogResult<Option<String>> {
        match self.config.credential_type {
            CredentialType::None => Ok(None),
            CredentialType::Bearer => Ok(self
                .config
                .bearer_token
                .as_ref()
                .map(|t| format!("Bearer {}", t))),
            CredentialType::OAuth2 => {
                let needs_refresh = match self.oauth_token.read().as_ref() {
                    Some(cached) => Instant::now() >= cached.expires_at,
                    None => true,
                };
                if needs_refresh {
                    self.refresh_oauth_token().await.map_err(|e| {
                        CatalogError::unavailable(format!("OAuth2 token refresh failed: {}", e))
                    })?;
                }
                Ok(self
                    .oauth_token
                    .read()
                    .as_ref()
                    .map(|t| format!("Bearer {}", t.token)))
            }
        }
    }

    async fn refresh_oauth_token(&self) -> crate::Result<()> {
        let client_id = self
            .config
            .oauth2_client_id
            .as_ref()
            .ok_or_else(|| crate::Error::Config("OAuth2 requires client_id".into()))?;
        let client_secret = self
            .config
            .oauth2_client_secret
            .as_ref()
            .ok_or_else(|| crate::Error::Config("OAuth2 requires client_secret".into()))?;

        let url = format!("{}/v1/oauth/tokens", self.config.base_uri);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", self.config.oauth2_scope.as_deref().unwrap_or("catalog")),
            ])
            .send()
            .await
            .map_err(|e| CatalogError::unavailable_with("OAuth2 token request failed", e))?;

        if !response.status().is_success() {
            return Err(CatalogError::unavailable(format!(
                "OAuth2 token request failed: {}",
                response.status()
            ))
            .into());
        }

        let token: api::OAuthTokenResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::unavailable_with("Malformed OAuth2 token response", e))?;

        // Refresh a minute early.
        let expires_in = token.expires_in.unwrap_or(3600).max(120);
        *self.oauth_token.write() = Some(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs((expires_in - 60) as u64),
        });
        debug!(catalog = %self.catalog, expires_in, "OAuth2 token refreshed");
        Ok(())
    }

    fn prefixed(&self, path: &str) -> String {
        match self.prefix.read().as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("/v1/{}{}", prefix, path),
            _ => format!("/v1{}", path),
        }
    }

    /// Send a request and map any non-success status for `name`.
    async fn execute<B: Serialize + ?Sized>(
        &self,
        name: &QualifiedName,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> CatalogResult<reqwest::Response> {
        if !self.circuit_breaker.is_allowed() {
            warn!(catalog = %self.catalog, "Circuit breaker is open, rejecting request");
            return Err(CatalogError::unavailable(format!(
                "Circuit breaker '{}' is open",
                self.circuit_breaker.name()
            )));
        }

        let url = format!("{}{}", self.config.base_uri, path);
        let mut request = self
            .client
            .request(method, &url)
            .header("Accept", "application/json");
        if let Some(auth) = self.auth_header().await? {
            request = request.header("Authorization", auth);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                self.circuit_breaker.record_failure();
                return Err(CatalogError::unavailable_with(
                    format!("Iceberg REST request to {} failed", path),
                    e,
                ));
            }
        };

        let status = response.status();
        if status.is_server_error() {
            self.circuit_breaker.record_failure();
        } else {
            self.circuit_breaker.record_success();
        }
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(name, status, &body))
    }

    async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        name: &QualifiedName,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> CatalogResult<T> {
        let response = self.execute(name, method, path, body).await?;
        response
            .json()
            .await
            .map_err(|e| CatalogError::unavailable_with("Malformed Iceberg REST response", e))
    }

    async fn send_empty<B: Serialize + ?Sized>(
        &self,
        name: &QualifiedName,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> CatalogResult<()> {
        self.execute(name, method, path, body).await.map(|_| ())
    }

    async fn ensure_config(&self) -> CatalogResult<()> {
        let missing = self.prefix.read().is_none();
        if missing {
            self.load_config().await?;
        }
        Ok(())
    }

    pub async fn list_namespaces(&self, name: &QualifiedName) -> CatalogResult<Vec<String>> {
        self.ensure_config().await?;
        let mut namespaces = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut path = self.prefixed("/namespaces");
            if let Some(token) = &page_token {
                path.push_str(&format!("?pageToken={}", urlencoding::encode(token)));
            }
            let page: api::ListNamespacesResponse =
                self.send_json(name, Method::GET, &path, None::<&()>).await?;
            namespaces.extend(page.namespaces.into_iter().map(|ns| ns.join(".")));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(namespaces)
    }

    pub async fn load_namespace(
        &self,
        name: &QualifiedName,
        namespace: &str,
    ) -> CatalogResult<api::NamespaceResponse> {
        self.ensure_config().await?;
        let path = self.prefixed(&format!("/namespaces/{}", urlencoding::encode(namespace)));
        self.send_json(name, Method::GET, &path, None::<&()>).await
    }

    pub async fn create_namespace(
        &self,
        name: &QualifiedName,
        request: &api::CreateNamespaceRequest,
    ) -> CatalogResult<()> {
        self.ensure_config().await?;
        let path = self.prefixed("/namespaces");
        self.send_empty(name, Method::POST, &path, Some(request)).await
    }

    pub async fn update_namespace_properties(
        &self,
        name: &QualifiedName,
        namespace: &str,
        request: &api::UpdateNamespacePropertiesRequest,
    ) -> CatalogResult<()> {
        self.ensure_config().await?;
        let path = self.prefixed(&format!(
            "/namespaces/{}/properties",
            urlencoding::encode(namespace)
        ));
        self.send_empty(name, Method::POST, &path, Some(request)).await
    }

    pub async fn drop_namespace(&self, name: &QualifiedName, namespace: &str) -> CatalogResult<()> {
        self.ensure_config().await?;
        let path = self.prefixed(&format!("/namespaces/{}", urlencoding::encode(namespace)));
        self.send_empty(name, Method::DELETE, &path, None::<&()>).await
    }

    pub async fn list_tables(&self, name: &QualifiedName, namespace: &str) -> CatalogResult<Vec<String>> {
        self.ensure_config().await?;
        let base = self.prefixed(&format!("/namespaces/{}/tables", urlencoding::encode(namespace)));
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let path = match &page_token {
                Some(token) => format!("{}?pageToken={}", base, urlencoding::encode(token)),
                None => base.clone(),
            };
            let page: api::ListTablesResponse =
                self.send_json(name, Method::GET, &path, None::<&()>).await?;
            tables.extend(page.identifiers.into_iter().map(|id| id.name));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(tables)
    }

    fn table_path(&self, namespace: &str, table: &str) -> String {
        self.prefixed(&format!(
            "/namespaces/{}/tables/{}",
            urlencoding::encode(namespace),
            urlencoding::encode(table)
        ))
    }

    pub async fn load_table(
        &self,
        name: &QualifiedName,
        namespace: &str,
        table: &str,
    ) -> CatalogResult<api::LoadTableResponse> {
        self.ensure_config().await?;
        let path = self.table_path(namespace, table);
        self.send_json(name, Method::GET, &path, None::<&()>).await
    }

    pub async fn create_table(
        &self,
        name: &QualifiedName,
        namespace: &str,
        request: &api::CreateTableRequest,
    ) -> CatalogResult<api::LoadTableResponse> {
        self.ensure_config().await?;
        let path = self.prefixed(&format!("/namespaces/{}/tables", urlencoding::encode(namespace)));
        self.send_json(name, Method::POST, &path, Some(request)).await
    }

    pub async fn commit_table(
        &self,
        name: &QualifiedName,
        namespace: &str,
        table: &str,
        request: &api::CommitTableRequest,
    ) -> CatalogResult<()> {
        self.ensure_config().await?;
        let path = self.table_path(namespace, table);
        self.send_empty(name, Method::POST, &path, Some(request)).await
    }

    pub async fn drop_table(&self, name: &QualifiedName, namespace: &str, table: &str) -> CatalogResult<()> {
        self.ensure_config().await?;
        let path = self.table_path(namespace, table);
        self.send_empty(name, Method::DELETE, &path, None::<&()>).await
    }

    pub async fn rename_table(
        &self,
        name: &QualifiedName,
        request: &api::RenameTableRequest,
    ) -> CatalogResult<()> {
        self.ensure_config().await?;
        let path = self.prefixed("/tables/rename");
        self.send_empty(name, Method::POST, &path, Some(request)).await
    }

    pub fn close(&self) {
        *self.oauth_token.write() = None;
        info!(catalog = %self.catalog, "Iceberg REST client closed");
    }
}

/// Map an error status from the catalog into the canonical kind for `name`.
pub(crate) fn map_status(name: &QualifiedName, status: StatusCode, body: &str) -> CatalogError {
    let message = serde_json::from_str::<api::ErrorResponse>(body)
        .map(|e| format!("{}: {}", e.error.error_type, e.error.message))
        .unwrap_or_else(|_| format!("{}: {}", status, body));
    match status {
        StatusCode::NOT_FOUND => CatalogError::not_found(name),
        StatusCode::CONFLICT => CatalogError::already_exists(name),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => CatalogError::constraint(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CatalogError::unavailable(format!("Authentication failed: {}", message))
        }
        _ => CatalogError::unavailable(message),
    }
}
