// Config publisher
//
// Owns the published pointer for every (graph, variant): an arena of
// immutable versions plus the single mutable "latest" reference in
// distribution storage. Publication is serialized per variant, versions are
// assigned at publish time, and the pointer advances only after the
// distribution write succeeds; a failed composition or a failed write leaves
// the prior version serving untouched.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use super::store::{DistributionError, DistributionStore};
use crate::types::{
	CapabilityToken, ComposedConfig, ComposedSchema, GraphRef, ImplementingService, SharedConfig,
};

/// Errors advancing the published pointer
#[derive(Debug, Error)]
pub enum PublishError {
	/// A config composed from a newer registry state was published while
	/// this draft was composing. Last successful composition wins; the
	/// caller should recompose and retry.
	#[error(
		"a config composed from a newer registry state was already published for {graph_ref} \
		 (published epoch {published_epoch}, draft epoch {draft_epoch}); recompose and retry"
	)]
	StaleDraft {
		graph_ref: GraphRef,
		published_epoch: u64,
		draft_epoch: u64,
	},

	#[error("failed to write distribution storage: {0}")]
	Distribution(#[from] DistributionError),
}

#[derive(Debug, Default)]
struct VariantHistory {
	/// Arena of published versions; index + 1 == version number
	versions: Vec<SharedConfig>,
	/// Registry epoch the latest published version was composed from
	epoch: u64,
}

/// Publisher for composed configs.
pub struct Publisher {
	store: Arc<dyn DistributionStore>,
	variants: Mutex<HashMap<GraphRef, Arc<AsyncMutex<VariantHistory>>>>,
}

impl Publisher {
	pub fn new(store: Arc<dyn DistributionStore>) -> Self {
		Self {
			store,
			variants: Mutex::new(HashMap::new()),
		}
	}

	fn history(&self, graph_ref: &GraphRef) -> Arc<AsyncMutex<VariantHistory>> {
		let mut variants = self.variants.lock();
		Arc::clone(
			variants
				.entry(graph_ref.clone())
				.or_insert_with(|| Arc::new(AsyncMutex::new(VariantHistory::default()))),
		)
	}

	/// Publish a successfully composed draft as the variant's next version.
	///
	/// `draft_epoch` is the registry epoch the draft's service set was
	/// snapshotted at; drafts older than the already-published state are
	/// rejected rather than silently rolling the pointer back.
	pub async fn publish(
		&self,
		graph_ref: &GraphRef,
		service_set: IndexMap<String, ImplementingService>,
		schema: ComposedSchema,
		draft_epoch: u64,
		token: &CapabilityToken,
	) -> Result<SharedConfig, PublishError> {
		let history = self.history(graph_ref);
		let mut history = history.lock().await;

		if history.epoch > draft_epoch {
			return Err(PublishError::StaleDraft {
				graph_ref: graph_ref.clone(),
				published_epoch: history.epoch,
				draft_epoch,
			});
		}

		let version = history.versions.len() as u64 + 1;
		let config = Arc::new(ComposedConfig {
			version,
			graph_ref: graph_ref.clone(),
			service_set,
			schema,
		});

		// Pointer advances only after the distribution write lands.
		self.store.publish(token, Arc::clone(&config)).await?;
		history.versions.push(Arc::clone(&config));
		history.epoch = draft_epoch;

		info!(
			target: "distribution",
			graph_ref = %graph_ref,
			version,
			services = config.service_set.len(),
			"advanced published pointer"
		);
		Ok(config)
	}

	/// Latest published version number for a variant, if any
	pub async fn latest_version(&self, graph_ref: &GraphRef) -> Option<u64> {
		let history = self.history(graph_ref);
		let history = history.lock().await;
		history.versions.last().map(|c| c.version)
	}

	/// Audit/rollback lookup: a historical version by number
	pub async fn version(&self, graph_ref: &GraphRef, version: u64) -> Option<SharedConfig> {
		if version == 0 {
			return None;
		}
		let history = self.history(graph_ref);
		let history = history.lock().await;
		history.versions.get(version as usize - 1).cloned()
	}
}
