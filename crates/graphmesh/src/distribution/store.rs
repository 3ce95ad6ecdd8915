// Distribution storage abstraction
//
// A read-optimized, highly-available blob store keyed by capability token.
// It holds the latest published config per (token, graph, variant); because
// blobs persist, readers keep getting the last good copy even while the
// pipeline upstream of it is down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::types::{CapabilityToken, GraphRef, SharedConfig};

/// Errors reading or writing distribution storage
#[derive(Debug, Error)]
pub enum DistributionError {
	#[error("distribution storage unavailable: {0}")]
	Unavailable(String),

	#[error("no config published for {graph_ref} under this token")]
	NotFound { graph_ref: GraphRef },
}

/// Read/write surface of the distribution tier.
///
/// Possession of the capability token gates access; there is no separate
/// auth handshake.
#[async_trait]
pub trait DistributionStore: Send + Sync {
	/// Replace the latest config for the config's (graph, variant) under
	/// the given token. The update is atomic: readers see either the prior
	/// config or the new one, never a torn pointer.
	async fn publish(
		&self,
		token: &CapabilityToken,
		config: SharedConfig,
	) -> Result<(), DistributionError>;

	/// Fetch the latest published config for a (graph, variant).
	async fn fetch_latest(
		&self,
		token: &CapabilityToken,
		graph_ref: &GraphRef,
	) -> Result<SharedConfig, DistributionError>;
}

/// In-memory distribution store, standing in for the HA blob tier.
///
/// Supports outage injection so tests can exercise the gateway's
/// keep-last-good behavior.
#[derive(Debug, Default)]
pub struct MemoryDistribution {
	inner: RwLock<HashMap<(CapabilityToken, GraphRef), SharedConfig>>,
	unavailable: AtomicBool,
}

impl MemoryDistribution {
	pub fn new() -> Self {
		Self::default()
	}

	/// Outage injection: while unavailable, both reads and writes fail.
	pub fn set_available(&self, available: bool) {
		self.unavailable.store(!available, Ordering::SeqCst);
	}

	fn check_available(&self) -> Result<(), DistributionError> {
		if self.unavailable.load(Ordering::SeqCst) {
			Err(DistributionError::Unavailable("injected outage".to_string()))
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl DistributionStore for MemoryDistribution {
	async fn publish(
		&self,
		token: &CapabilityToken,
		config: SharedConfig,
	) -> Result<(), DistributionError> {
		self.check_available()?;

		let key = (token.clone(), config.graph_ref.clone());
		debug!(
			target: "distribution",
			graph_ref = %config.graph_ref,
			version = config.version,
			"published config"
		);
		self.inner.write().insert(key, config);
		Ok(())
	}

	async fn fetch_latest(
		&self,
		token: &CapabilityToken,
		graph_ref: &GraphRef,
	) -> Result<SharedConfig, DistributionError> {
		self.check_available()?;

		self.inner
			.read()
			.get(&(token.clone(), graph_ref.clone()))
			.cloned()
			.ok_or_else(|| DistributionError::NotFound {
				graph_ref: graph_ref.clone(),
			})
	}
}

/// Access credentials per graph, from which capability tokens derive.
///
/// Key management itself is an external concern; this only holds the
/// credential -> token derivation the distribution tier is addressed by.
#[derive(Debug, Default)]
pub struct AccessKeyring {
	inner: RwLock<HashMap<String, String>>,
}

impl AccessKeyring {
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the access credential for a graph
	pub fn set_credential(&self, graph: impl Into<String>, credential: impl Into<String>) {
		self.inner.write().insert(graph.into(), credential.into());
	}

	/// Derive the capability token for a graph, if a credential is set
	pub fn token_for(&self, graph: &str) -> Option<CapabilityToken> {
		self.inner
			.read()
			.get(graph)
			.map(|credential| CapabilityToken::derive(credential))
	}
}
