// Composition seam
//
// The schema-composition algorithm is an external collaborator: the pipeline
// only needs a validate-and-merge function from service fragments to a
// composed schema, or a structured list of composition errors. `Composer` is
// that seam; `ReferenceComposer` is a minimal implementation that makes the
// pipeline and its tests executable.

mod reference;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ComposedSchema, GraphRef, SchemaFragment};

pub use reference::ReferenceComposer;

/// Input to one composition run: the full service set of a variant at the
/// moment composition runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionInput {
	/// The universe being composed
	pub graph_ref: GraphRef,

	/// One entry per registered service, in registry order
	pub services: Vec<ServiceFragment>,
}

/// One service's contribution to a composition run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFragment {
	/// Service name
	pub name: String,

	/// Endpoint recorded at upload time (composition input only)
	#[serde(default)]
	pub upload_endpoint: Option<String>,

	/// The uploaded schema fragment
	pub fragment: SchemaFragment,
}

/// Classification of a composition error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionErrorCode {
	/// Composing zero services is not meaningful
	EmptyServiceSet,
	/// Two services both claim ownership of the same type
	DuplicateTypeOwner,
	/// An extension references a type no service owns
	UnknownExtensionTarget,
	/// An extension declares a key that disagrees with the owner's key
	KeyMismatch,
	/// A declared key field does not exist on the composed type
	KeyFieldMissing,
	/// Two services contribute the same field of one type
	FieldConflict,
	/// A `requires` annotation names a field absent from the composed type
	UnknownRequiredField,
	/// A type implements something that is not a known interface
	UnknownInterface,
}

/// A single structured composition error, attributable to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionError {
	/// What went wrong
	pub code: CompositionErrorCode,

	/// Service whose fragment triggered the error, when attributable
	#[serde(default)]
	pub service: Option<String>,

	/// Type involved, when attributable
	#[serde(default)]
	pub type_name: Option<String>,

	/// Human-readable description
	pub message: String,
}

impl CompositionError {
	pub fn new(
		code: CompositionErrorCode,
		service: Option<&str>,
		type_name: Option<&str>,
		message: impl Into<String>,
	) -> Self {
		Self {
			code,
			service: service.map(str::to_string),
			type_name: type_name.map(str::to_string),
			message: message.into(),
		}
	}
}

impl fmt::Display for CompositionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match (&self.service, &self.type_name) {
			(Some(s), Some(t)) => write!(f, "[{s} / {t}] {}", self.message),
			(Some(s), None) => write!(f, "[{s}] {}", self.message),
			(None, Some(t)) => write!(f, "[{t}] {}", self.message),
			(None, None) => f.write_str(&self.message),
		}
	}
}

/// The full error list from a failed composition run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositionErrors(pub Vec<CompositionError>);

impl CompositionErrors {
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn push(&mut self, error: CompositionError) {
		self.0.push(error);
	}

	pub fn iter(&self) -> impl Iterator<Item = &CompositionError> {
		self.0.iter()
	}
}

impl fmt::Display for CompositionErrors {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		use itertools::Itertools;
		write!(f, "{}", self.0.iter().map(|e| e.to_string()).join("; "))
	}
}

/// Errors from invoking composition
#[derive(Debug, Error)]
pub enum ComposeError {
	/// The service set does not compose; the caller receives the full list
	#[error("composition failed: {0}")]
	Invalid(CompositionErrors),

	/// The composition service itself could not be reached
	#[error("composition service unavailable: {0}")]
	Unavailable(String),
}

/// The output of a successful composition run.
///
/// Planning rules are embedded in the composed schema (key / resolved-by /
/// requires annotations); gateways derive their planner structures from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedOutput {
	/// The merged, validated schema
	pub schema: ComposedSchema,
}

/// Pure validate-and-merge function over a variant's full service set.
#[async_trait]
pub trait Composer: Send + Sync {
	/// Compose the given service set, or report why it does not compose.
	async fn compose(&self, input: &CompositionInput) -> Result<ComposedOutput, ComposeError>;
}
