// Push / delete / check pipeline
//
// The state machine behind every registry mutation:
//
//   Uploading -> Registering -> Composing -> { Publishing | Failed }
//
// Composition always runs against the current full service set at the time
// it runs, not at the time the operation started. A failed composition
// retains the registry mutation and leaves the published pointer untouched,
// so a later push (e.g. another service's fix) can succeed without
// re-uploading.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::error::PushError;
use super::schema_store::SchemaStore;
use super::service_registry::{RegistrySnapshot, ServiceRegistry};
use crate::compose::{ComposeError, Composer, CompositionInput, ServiceFragment};
use crate::distribution::{AccessKeyring, Publisher};
use crate::types::{
	CapabilityToken, GraphRef, ImplementingService, SchemaFragment, SchemaRef, SharedConfig,
	DEFAULT_VARIANT,
};

/// A push operation: register one service's fragment and republish.
#[derive(Debug, Clone)]
pub struct PushRequest {
	pub graph: String,
	/// Defaults to "current" when not set
	pub variant: Option<String>,
	pub service_name: String,
	/// Runtime endpoint used for sub-query dispatch
	pub service_url: String,
	/// Endpoint the fragment was fetched from at upload time; composition
	/// input only
	pub schema_endpoint: Option<String>,
	pub fragment: SchemaFragment,
}

impl PushRequest {
	pub fn graph_ref(&self) -> GraphRef {
		GraphRef::new(
			self.graph.clone(),
			self.variant.clone().unwrap_or_else(|| DEFAULT_VARIANT.to_string()),
		)
	}
}

/// Successful push output
#[derive(Debug, Clone)]
pub struct PushOutcome {
	pub graph_ref: GraphRef,
	pub published_version: u64,
	/// Content address of the uploaded fragment
	pub schema_hash: String,
	pub config: SharedConfig,
}

/// Successful delete output
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
	pub graph_ref: GraphRef,
	pub published_version: u64,
	pub removed: ImplementingService,
}

/// The push pipeline, wiring the schema store, registry, composer, and
/// publisher together.
pub struct PushPipeline {
	schemas: Arc<SchemaStore>,
	registry: Arc<ServiceRegistry>,
	composer: Arc<dyn Composer>,
	publisher: Arc<Publisher>,
	keyring: Arc<AccessKeyring>,
}

impl PushPipeline {
	pub fn new(
		schemas: Arc<SchemaStore>,
		registry: Arc<ServiceRegistry>,
		composer: Arc<dyn Composer>,
		publisher: Arc<Publisher>,
		keyring: Arc<AccessKeyring>,
	) -> Self {
		Self {
			schemas,
			registry,
			composer,
			publisher,
			keyring,
		}
	}

	fn token(&self, graph_ref: &GraphRef) -> Result<CapabilityToken, PushError> {
		self.keyring
			.token_for(&graph_ref.graph)
			.ok_or_else(|| PushError::MissingCredential {
				graph: graph_ref.graph.clone(),
			})
	}

	/// Assemble composition input by loading every registered fragment.
	fn composition_input(
		&self,
		graph_ref: &GraphRef,
		snapshot: &RegistrySnapshot,
	) -> Result<CompositionInput, PushError> {
		let mut services = Vec::with_capacity(snapshot.services.len());
		for service in snapshot.services.values() {
			let fragment = self
				.schemas
				.get(&service.schema_ref.hash)
				.ok_or_else(|| {
					PushError::fragment_missing(&service.name, &service.schema_ref.hash)
				})?;
			services.push(ServiceFragment {
				name: service.name.clone(),
				upload_endpoint: service.schema_ref.upload_endpoint.clone(),
				fragment,
			});
		}
		Ok(CompositionInput {
			graph_ref: graph_ref.clone(),
			services,
		})
	}

	/// Compose the current service set and advance the published pointer.
	async fn compose_and_publish(
		&self,
		graph_ref: &GraphRef,
		snapshot: RegistrySnapshot,
	) -> Result<SharedConfig, PushError> {
		let token = self.token(graph_ref)?;
		let input = self.composition_input(graph_ref, &snapshot)?;

		let output = match self.composer.compose(&input).await {
			Ok(output) => output,
			Err(ComposeError::Invalid(errors)) => {
				warn!(
					target: "registry",
					graph_ref = %graph_ref,
					errors = errors.len(),
					"composition failed; published pointer unchanged"
				);
				return Err(PushError::Composition(errors));
			},
			Err(ComposeError::Unavailable(message)) => {
				return Err(PushError::CompositionUnavailable(message));
			},
		};

		let config = self
			.publisher
			.publish(graph_ref, snapshot.services, output.schema, snapshot.epoch, &token)
			.await?;
		Ok(config)
	}

	/// Run a push through the full pipeline.
	pub async fn push(&self, request: PushRequest) -> Result<PushOutcome, PushError> {
		let graph_ref = request.graph_ref();

		// Uploading: aborts before any registry mutation on failure.
		let schema_hash = self.schemas.put(&request.fragment)?;

		// Registering: one atomic registry write.
		let service = ImplementingService {
			name: request.service_name.clone(),
			url: request.service_url.clone(),
			schema_ref: SchemaRef {
				hash: schema_hash.clone(),
				upload_endpoint: request.schema_endpoint.clone(),
			},
			registered_at: Utc::now(),
		};
		self.registry.upsert(&graph_ref, service)?;

		// Composing: against the full set as of now, then Publishing.
		let snapshot = self.registry.snapshot(&graph_ref)?;
		let config = self.compose_and_publish(&graph_ref, snapshot).await?;

		info!(
			target: "registry",
			graph_ref = %graph_ref,
			service = %request.service_name,
			version = config.version,
			"push published new config version"
		);
		Ok(PushOutcome {
			graph_ref,
			published_version: config.version,
			schema_hash,
			config,
		})
	}

	/// Remove a service and republish. Irreversible at the registry level;
	/// prior composed versions remain in the publisher's history.
	pub async fn delete(
		&self,
		graph_ref: &GraphRef,
		service_name: &str,
	) -> Result<DeleteOutcome, PushError> {
		let (removed, _) = self.registry.remove(graph_ref, service_name)?;

		let snapshot = self.registry.snapshot(graph_ref)?;
		let config = self.compose_and_publish(graph_ref, snapshot).await?;

		info!(
			target: "registry",
			graph_ref = %graph_ref,
			service = service_name,
			version = config.version,
			"delete published new config version"
		);
		Ok(DeleteOutcome {
			graph_ref: graph_ref.clone(),
			published_version: config.version,
			removed,
		})
	}

	/// Validate a candidate fragment against the current service set without
	/// mutating the registry or publishing anything.
	///
	/// A clean check is advisory only: a concurrent push may still land a
	/// conflicting change before the candidate is pushed.
	pub async fn check(
		&self,
		graph_ref: &GraphRef,
		service_name: &str,
		fragment: &SchemaFragment,
	) -> Result<(), PushError> {
		let snapshot = self.registry.snapshot(graph_ref)?;
		let mut input = self.composition_input(graph_ref, &snapshot)?;

		let candidate = ServiceFragment {
			name: service_name.to_string(),
			upload_endpoint: None,
			fragment: fragment.clone(),
		};
		match input.services.iter_mut().find(|s| s.name == service_name) {
			Some(existing) => *existing = candidate,
			None => input.services.push(candidate),
		}

		match self.composer.compose(&input).await {
			Ok(_) => Ok(()),
			Err(ComposeError::Invalid(errors)) => Err(PushError::Composition(errors)),
			Err(ComposeError::Unavailable(message)) => {
				Err(PushError::CompositionUnavailable(message))
			},
		}
	}
}
