// Config client for fetching composed configs from the distribution tier
//
// Three source shapes cover the deployment spectrum: an in-process handle to
// distribution storage, a pinned local file, and an HTTP(S) distribution
// endpoint addressed by capability token.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::distribution::{DistributionError, DistributionStore};
use crate::types::{CapabilityToken, ComposedConfig, GraphRef, SharedConfig};

/// Source for composed configs
#[derive(Clone)]
pub enum ConfigSource {
	/// In-process distribution storage handle
	Store(Arc<dyn DistributionStore>),
	/// Load from a local file (pinned/air-gapped deployments)
	File(PathBuf),
	/// Load from an HTTP(S) distribution endpoint
	Http {
		base: http::Uri,
		auth: Option<AuthConfig>,
	},
}

impl std::fmt::Debug for ConfigSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ConfigSource::Store(_) => f.write_str("Store(..)"),
			ConfigSource::File(path) => f.debug_tuple("File").field(path).finish(),
			ConfigSource::Http { base, .. } => f.debug_tuple("Http").field(base).finish(),
		}
	}
}

/// Authentication for HTTP sources
#[derive(Debug, Clone)]
pub enum AuthConfig {
	/// Bearer token authentication
	Bearer(String),
	/// Basic authentication (username:password)
	Basic { username: String, password: String },
}

impl AuthConfig {
	/// Convert to an HTTP Authorization header value
	pub fn to_header_value(&self) -> String {
		match self {
			AuthConfig::Bearer(token) => format!("Bearer {}", token),
			AuthConfig::Basic { username, password } => {
				let credentials = base64::Engine::encode(
					&base64::engine::general_purpose::STANDARD,
					format!("{}:{}", username, password),
				);
				format!("Basic {}", credentials)
			},
		}
	}
}

/// Errors fetching a config. All of these are retryable from the poller's
/// point of view: the previous config stays active.
#[derive(Debug, Error)]
pub enum FetchError {
	#[error("distribution unavailable: {0}")]
	Unavailable(String),

	#[error("no config published yet for {0}")]
	NotPublished(GraphRef),

	#[error("failed to parse config: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("failed to read config file: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid config source URI: {0}")]
	InvalidSource(String),
}

/// Client for fetching the latest composed config of one (graph, variant).
#[derive(Debug, Clone)]
pub struct ConfigClient {
	source: ConfigSource,
	graph_ref: GraphRef,
	token: CapabilityToken,
}

impl ConfigClient {
	pub fn new(source: ConfigSource, graph_ref: GraphRef, token: CapabilityToken) -> Self {
		Self {
			source,
			graph_ref,
			token,
		}
	}

	/// Create a client from a source URI string (`file://` or `http(s)://`)
	pub fn from_uri(
		uri: &str,
		graph_ref: GraphRef,
		token: CapabilityToken,
		auth: Option<AuthConfig>,
	) -> Result<Self, FetchError> {
		let source = if let Some(path) = uri.strip_prefix("file://") {
			ConfigSource::File(PathBuf::from(path))
		} else if uri.starts_with("http://") || uri.starts_with("https://") {
			let base = uri
				.parse::<http::Uri>()
				.map_err(|e| FetchError::InvalidSource(format!("invalid URL: {}", e)))?;
			ConfigSource::Http { base, auth }
		} else {
			return Err(FetchError::InvalidSource(format!(
				"unsupported URI scheme: {}",
				uri
			)));
		};

		Ok(Self::new(source, graph_ref, token))
	}

	/// The (graph, variant) this client tracks
	pub fn graph_ref(&self) -> &GraphRef {
		&self.graph_ref
	}

	/// Fetch the latest config from the configured source
	pub async fn fetch(&self) -> Result<SharedConfig, FetchError> {
		match &self.source {
			ConfigSource::Store(store) => self.fetch_from_store(store.as_ref()).await,
			ConfigSource::File(path) => self.fetch_from_file(path).await,
			ConfigSource::Http { base, auth } => self.fetch_from_http(base, auth.as_ref()).await,
		}
	}

	async fn fetch_from_store(
		&self,
		store: &dyn DistributionStore,
	) -> Result<SharedConfig, FetchError> {
		store
			.fetch_latest(&self.token, &self.graph_ref)
			.await
			.map_err(|e| match e {
				DistributionError::NotFound { graph_ref } => FetchError::NotPublished(graph_ref),
				DistributionError::Unavailable(message) => FetchError::Unavailable(message),
			})
	}

	async fn fetch_from_file(&self, path: &PathBuf) -> Result<SharedConfig, FetchError> {
		let content = fs_err::tokio::read_to_string(path).await?;
		let config: ComposedConfig = serde_json::from_str(&content)?;
		info!(
			target: "gateway",
			graph_ref = %self.graph_ref,
			version = config.version,
			"loaded config from file: {}",
			path.display()
		);
		Ok(Arc::new(config))
	}

	/// The capability-token-addressed path for this client's variant
	fn http_path(&self, base: &http::Uri) -> String {
		format!(
			"{}/{}/{}/{}/latest",
			base.to_string().trim_end_matches('/'),
			self.token,
			self.graph_ref.graph,
			self.graph_ref.variant
		)
	}

	#[cfg(feature = "http-source")]
	async fn fetch_from_http(
		&self,
		base: &http::Uri,
		auth: Option<&AuthConfig>,
	) -> Result<SharedConfig, FetchError> {
		let url = self.http_path(base);

		let client = reqwest::Client::new();
		let mut request = client.get(&url);
		if let Some(auth_config) = auth {
			request = request.header("Authorization", auth_config.to_header_value());
		}

		let response = request
			.send()
			.await
			.map_err(|e| FetchError::Unavailable(format!("HTTP request failed: {}", e)))?;

		if response.status() == http::StatusCode::NOT_FOUND {
			return Err(FetchError::NotPublished(self.graph_ref.clone()));
		}
		if !response.status().is_success() {
			return Err(FetchError::Unavailable(format!(
				"HTTP request failed with status: {}",
				response.status()
			)));
		}

		let body = response
			.text()
			.await
			.map_err(|e| FetchError::Unavailable(format!("failed to read response body: {}", e)))?;

		let config: ComposedConfig = serde_json::from_str(&body)?;
		info!(
			target: "gateway",
			graph_ref = %self.graph_ref,
			version = config.version,
			"fetched config from distribution endpoint"
		);
		Ok(Arc::new(config))
	}

	/// Stub when the http-source feature is not enabled
	#[cfg(not(feature = "http-source"))]
	async fn fetch_from_http(
		&self,
		base: &http::Uri,
		_auth: Option<&AuthConfig>,
	) -> Result<SharedConfig, FetchError> {
		Err(FetchError::Unavailable(format!(
			"HTTP config fetching requires the 'http-source' feature: {}",
			base
		)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn client(uri: &str) -> Result<ConfigClient, FetchError> {
		ConfigClient::from_uri(
			uri,
			GraphRef::current("g"),
			CapabilityToken::derive("key"),
			None,
		)
	}

	#[test]
	fn test_from_uri_file() {
		let client = client("file:///var/run/config.json").unwrap();
		assert!(matches!(client.source, ConfigSource::File(_)));
	}

	#[test]
	fn test_from_uri_http() {
		let client = client("https://dist.example.com/configs").unwrap();
		assert!(matches!(client.source, ConfigSource::Http { .. }));
	}

	#[test]
	fn test_from_uri_invalid_scheme() {
		assert!(matches!(
			client("ftp://dist.example.com"),
			Err(FetchError::InvalidSource(_))
		));
	}

	#[test]
	fn test_http_path_is_token_addressed() {
		let client = client("https://dist.example.com/configs/").unwrap();
		let path = client.http_path(&"https://dist.example.com/configs/".parse().unwrap());

		let token = CapabilityToken::derive("key");
		assert_eq!(
			path,
			format!("https://dist.example.com/configs/{}/g/current/latest", token)
		);
	}

	#[test]
	fn test_auth_config_header_values() {
		assert_eq!(
			AuthConfig::Bearer("my-token".to_string()).to_header_value(),
			"Bearer my-token"
		);
		// base64("user:pass") = "dXNlcjpwYXNz"
		assert_eq!(
			AuthConfig::Basic {
				username: "user".to_string(),
				password: "pass".to_string(),
			}
			.to_header_value(),
			"Basic dXNlcjpwYXNz"
		);
	}
}
