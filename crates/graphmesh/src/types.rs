// Core data model for the federated configuration pipeline
//
// Everything that crosses the wire between the push pipeline, distribution
// storage, and the gateway fleet lives here:
// - Graph refs (graph + variant, fully isolated configuration universes)
// - Implementing service records and content-addressed schema refs
// - Schema fragments (opaque composition input with federation annotations)
// - Composed configs (immutable, monotonically versioned snapshots)
// - Capability tokens gating distribution reads

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default variant name when none is given
pub const DEFAULT_VARIANT: &str = "current";

/// A (graph, variant) pair identifying one isolated configuration universe.
///
/// Variants are never cross-referenced: a push under `canary` cannot affect
/// the published pointer of `current`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRef {
	/// Logical federated API identity
	pub graph: String,

	/// Configuration channel under the graph (e.g. "current", "canary")
	#[serde(default = "default_variant")]
	pub variant: String,
}

fn default_variant() -> String {
	DEFAULT_VARIANT.to_string()
}

impl GraphRef {
	/// Create a graph ref with an explicit variant
	pub fn new(graph: impl Into<String>, variant: impl Into<String>) -> Self {
		Self {
			graph: graph.into(),
			variant: variant.into(),
		}
	}

	/// Create a graph ref on the default "current" variant
	pub fn current(graph: impl Into<String>) -> Self {
		Self::new(graph, DEFAULT_VARIANT)
	}
}

impl fmt::Display for GraphRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.graph, self.variant)
	}
}

/// Content-addressed reference to an uploaded partial schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRef {
	/// SHA-256 of the canonical fragment serialization, hex encoded
	pub hash: String,

	/// Endpoint the fragment was uploaded from. Composition input only;
	/// runtime dispatch always uses the service record's `url`.
	#[serde(default)]
	pub upload_endpoint: Option<String>,
}

/// One backend service registered under a (graph, variant).
///
/// Unique per (graph, variant, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementingService {
	/// Service name, the registry key within a variant
	pub name: String,

	/// Runtime endpoint sub-queries are dispatched to
	pub url: String,

	/// Reference to the service's uploaded schema fragment
	pub schema_ref: SchemaRef,

	/// When this record was last written
	pub registered_at: DateTime<Utc>,
}

/// Opaque structured composition input: one service's schema fragment.
///
/// Annotations mirror the role of `@key` / `@requires` / `@provides`; their
/// semantics belong to the composition algorithm, which this crate treats as
/// an external collaborator behind the `Composer` trait.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFragment {
	/// Type definitions contributed by this service
	#[serde(default)]
	pub types: Vec<TypeDef>,
}

/// Kind of a contributed type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
	/// Concrete object type
	#[default]
	Object,
	/// Interface type, expanded into per-implementer fragments at plan time
	Interface,
}

/// One type definition inside a schema fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDef {
	/// Type name, globally unique across the composed graph
	pub name: String,

	/// Object or interface
	#[serde(default)]
	pub kind: TypeKind,

	/// True when this definition extends a type owned by another service
	#[serde(default)]
	pub extension: bool,

	/// Entity key fields (ownership declaration, `@key` analog)
	#[serde(default)]
	pub keys: Vec<String>,

	/// Interfaces this type implements
	#[serde(default)]
	pub implements: Vec<String>,

	/// Fields contributed by this service
	#[serde(default)]
	pub fields: Vec<FieldDef>,
}

/// One field inside a type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
	/// Field name
	pub name: String,

	/// Field type rendered as an opaque string (e.g. "String!", "[Launch]")
	pub field_type: String,

	/// Fields of the same type that must be fetched before resolving this
	/// one (`@requires` analog)
	#[serde(default)]
	pub requires: Vec<String>,

	/// Fields of the returned type this service can resolve in the same
	/// round trip (`@provides` analog)
	#[serde(default)]
	pub provides: Vec<String>,
}

impl TypeDef {
	/// Create an owned (non-extension) object type with the given key
	pub fn object(name: impl Into<String>, keys: Vec<String>) -> Self {
		Self {
			name: name.into(),
			kind: TypeKind::Object,
			extension: false,
			keys,
			implements: Vec::new(),
			fields: Vec::new(),
		}
	}

	/// Create an interface type
	pub fn interface(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			kind: TypeKind::Interface,
			extension: false,
			keys: Vec::new(),
			implements: Vec::new(),
			fields: Vec::new(),
		}
	}

	/// Create an extension of a type owned by another service
	pub fn extension(name: impl Into<String>, keys: Vec<String>) -> Self {
		Self {
			name: name.into(),
			kind: TypeKind::Object,
			extension: true,
			keys,
			implements: Vec::new(),
			fields: Vec::new(),
		}
	}

	/// Builder method to add a field
	pub fn with_field(mut self, field: FieldDef) -> Self {
		self.fields.push(field);
		self
	}

	/// Builder method to declare an implemented interface
	pub fn with_interface(mut self, name: impl Into<String>) -> Self {
		self.implements.push(name.into());
		self
	}
}

impl FieldDef {
	/// Create a field with no annotations
	pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			field_type: field_type.into(),
			requires: Vec::new(),
			provides: Vec::new(),
		}
	}

	/// Builder method to set required sibling fields
	pub fn with_requires(mut self, requires: Vec<String>) -> Self {
		self.requires = requires;
		self
	}

	/// Builder method to set provided fields
	pub fn with_provides(mut self, provides: Vec<String>) -> Self {
		self.provides = provides;
		self
	}
}

/// The merged schema produced by composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedSchema {
	/// Composed types, insertion-ordered for reproducible output
	#[serde(default)]
	pub types: IndexMap<String, ComposedType>,

	/// Interface name -> implementing type names
	#[serde(default)]
	pub interfaces: IndexMap<String, Vec<String>>,
}

/// One type in the composed schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedType {
	/// Service that owns the type (contributed the non-extension definition)
	pub owner: String,

	/// Entity key fields
	#[serde(default)]
	pub keys: Vec<String>,

	/// Composed fields with their resolving service
	#[serde(default)]
	pub fields: IndexMap<String, ComposedField>,
}

/// One field in a composed type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedField {
	/// Field type string, carried through from the contributing fragment
	pub field_type: String,

	/// Service whose resolver serves this field
	pub resolved_by: String,

	/// Sibling fields that must be available before this one resolves
	#[serde(default)]
	pub requires: Vec<String>,
}

impl ComposedSchema {
	/// Check whether the schema contains a type
	pub fn contains_type(&self, name: &str) -> bool {
		self.types.contains_key(name)
	}
}

/// An immutable, monotonically versioned snapshot of a variant's composed
/// configuration. Created only by a successful composition; never mutated,
/// only superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedConfig {
	/// Monotonic version within the (graph, variant)
	pub version: u64,

	/// The universe this config belongs to
	pub graph_ref: GraphRef,

	/// Snapshot of every implementing service at compose time, keyed by name
	pub service_set: IndexMap<String, ImplementingService>,

	/// The merged schema
	pub schema: ComposedSchema,
}

impl ComposedConfig {
	/// Runtime endpoint for a service in this snapshot
	pub fn endpoint(&self, service: &str) -> Option<&str> {
		self.service_set.get(service).map(|s| s.url.as_str())
	}
}

/// Capability token gating reads from distribution storage.
///
/// Derived as a one-way hash of the caller's access credential; possession
/// of the token, not a separate auth handshake, is what grants read access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityToken(String);

impl CapabilityToken {
	/// Derive a token from an access credential
	pub fn derive(credential: &str) -> Self {
		let digest = Sha256::digest(credential.as_bytes());
		Self(hex::encode(digest))
	}

	/// The token value as sent on the wire
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for CapabilityToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Shared handle to an immutable composed config
pub type SharedConfig = Arc<ComposedConfig>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_graph_ref_display_and_default_variant() {
		let r = GraphRef::current("space-explorer");
		assert_eq!(r.to_string(), "space-explorer@current");

		let parsed: GraphRef = serde_json::from_str(r#"{"graph": "g"}"#).unwrap();
		assert_eq!(parsed.variant, "current");
	}

	#[test]
	fn test_capability_token_is_one_way_and_stable() {
		let a = CapabilityToken::derive("service:space-explorer:key-1");
		let b = CapabilityToken::derive("service:space-explorer:key-1");
		let c = CapabilityToken::derive("service:space-explorer:key-2");

		assert_eq!(a, b);
		assert_ne!(a, c);
		// sha256 hex
		assert_eq!(a.as_str().len(), 64);
		assert_ne!(a.as_str(), "service:space-explorer:key-1");
	}

	#[test]
	fn test_fragment_round_trip_camel_case() {
		let fragment = SchemaFragment {
			types: vec![
				TypeDef::object("Launch", vec!["id".to_string()])
					.with_field(FieldDef::new("id", "ID!"))
					.with_field(FieldDef::new("site", "String")),
			],
		};

		let json = serde_json::to_string(&fragment).unwrap();
		assert!(json.contains("fieldType"));

		let parsed: SchemaFragment = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed, fragment);
	}

	#[test]
	fn test_parse_fragment_with_annotations() {
		let json = r#"{
			"types": [
				{
					"name": "Mission",
					"extension": true,
					"keys": ["id"],
					"fields": [
						{
							"name": "crewCount",
							"fieldType": "Int",
							"requires": ["capacity"]
						}
					]
				}
			]
		}"#;

		let fragment: SchemaFragment = serde_json::from_str(json).unwrap();
		let t = &fragment.types[0];
		assert!(t.extension);
		assert_eq!(t.kind, TypeKind::Object);
		assert_eq!(t.fields[0].requires, vec!["capacity"]);
	}
}
