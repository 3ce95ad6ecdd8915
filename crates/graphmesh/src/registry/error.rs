// Push pipeline error types

use thiserror::Error;

use crate::compose::CompositionErrors;
use crate::distribution::PublishError;
use crate::types::GraphRef;

/// Errors storing a partial schema. Uploads fail before any registry
/// mutation, so a failed upload leaves no trace.
#[derive(Debug, Error)]
pub enum UploadError {
	#[error("partial schema store unavailable")]
	StoreUnavailable,

	#[error("failed to serialize schema fragment: {0}")]
	Serialize(#[from] serde_json::Error),
}

/// Errors from the service registry itself
#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("service registry unavailable")]
	Unavailable,

	#[error("service '{name}' is not registered under {graph_ref}")]
	ServiceNotFound { graph_ref: GraphRef, name: String },

	#[error("invalid runtime url '{url}': {message}")]
	InvalidUrl { url: String, message: String },
}

/// Errors surfaced synchronously to push / check / delete callers.
#[derive(Debug, Error)]
pub enum PushError {
	/// The partial schema could not be stored; nothing was mutated
	#[error("upload failed: {0}")]
	Upload(#[from] UploadError),

	#[error(transparent)]
	Registry(#[from] RegistryError),

	/// The full service set does not compose. The registry retains this
	/// push's record; the prior published version keeps serving.
	#[error("composition failed: {0}")]
	Composition(CompositionErrors),

	#[error("composition service unavailable: {0}")]
	CompositionUnavailable(String),

	#[error(transparent)]
	Publish(#[from] PublishError),

	/// No access credential is configured for the graph, so there is no
	/// capability token to publish under
	#[error("no access credential configured for graph '{graph}'")]
	MissingCredential { graph: String },

	/// A registered service points at a fragment the schema store no longer
	/// holds; composition cannot assemble its input
	#[error("schema fragment {hash} for service '{service}' is missing from the store")]
	FragmentMissing { service: String, hash: String },
}

impl PushError {
	pub fn fragment_missing(service: impl Into<String>, hash: impl Into<String>) -> Self {
		Self::FragmentMissing {
			service: service.into(),
			hash: hash.into(),
		}
	}
}
