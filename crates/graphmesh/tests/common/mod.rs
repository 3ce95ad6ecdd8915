// Shared fixtures for integration tests

use std::sync::Arc;

use graphmesh::compose::Composer;
use graphmesh::distribution::{AccessKeyring, DistributionStore, MemoryDistribution, Publisher};
use graphmesh::registry::{PushError, PushOutcome, PushPipeline, PushRequest, SchemaStore, ServiceRegistry};
use graphmesh::types::{CapabilityToken, FieldDef, SchemaFragment, TypeDef};
use graphmesh::ReferenceComposer;

pub const GRAPH: &str = "space-explorer";
pub const CREDENTIAL: &str = "service:space-explorer:key-1";

/// A fully wired pipeline over in-memory stores.
pub struct TestStack {
	pub schemas: Arc<SchemaStore>,
	pub registry: Arc<ServiceRegistry>,
	pub distribution: Arc<MemoryDistribution>,
	pub publisher: Arc<Publisher>,
	pub keyring: Arc<AccessKeyring>,
	pub pipeline: PushPipeline,
}

pub fn stack() -> TestStack {
	let schemas = Arc::new(SchemaStore::new());
	let registry = Arc::new(ServiceRegistry::new());
	let distribution = Arc::new(MemoryDistribution::new());
	let publisher = Arc::new(Publisher::new(
		Arc::clone(&distribution) as Arc<dyn DistributionStore>
	));
	let keyring = Arc::new(AccessKeyring::new());
	keyring.set_credential(GRAPH, CREDENTIAL);

	let pipeline = PushPipeline::new(
		Arc::clone(&schemas),
		Arc::clone(&registry),
		Arc::new(ReferenceComposer::new()) as Arc<dyn Composer>,
		Arc::clone(&publisher),
		Arc::clone(&keyring),
	);

	TestStack {
		schemas,
		registry,
		distribution,
		publisher,
		keyring,
		pipeline,
	}
}

pub fn token() -> CapabilityToken {
	CapabilityToken::derive(CREDENTIAL)
}

pub fn push_request(service: &str, url: &str, fragment: SchemaFragment) -> PushRequest {
	PushRequest {
		graph: GRAPH.to_string(),
		variant: None,
		service_name: service.to_string(),
		service_url: url.to_string(),
		schema_endpoint: Some(format!("{url}/schema")),
		fragment,
	}
}

pub async fn push(
	stack: &TestStack,
	service: &str,
	url: &str,
	fragment: SchemaFragment,
) -> Result<PushOutcome, PushError> {
	stack.pipeline.push(push_request(service, url, fragment)).await
}

/// launches v1: owns Launch with id/site/capacity
pub fn launches_v1() -> SchemaFragment {
	SchemaFragment {
		types: vec![
			TypeDef::object("Launch", vec!["id".to_string()])
				.with_field(FieldDef::new("id", "ID!"))
				.with_field(FieldDef::new("site", "String"))
				.with_field(FieldDef::new("capacity", "Int")),
		],
	}
}

/// launches v2: drops capacity, adds window
pub fn launches_v2() -> SchemaFragment {
	SchemaFragment {
		types: vec![
			TypeDef::object("Launch", vec!["id".to_string()])
				.with_field(FieldDef::new("id", "ID!"))
				.with_field(FieldDef::new("site", "String"))
				.with_field(FieldDef::new("window", "String")),
		],
	}
}

/// crew: extends Launch, crewCount requires capacity
pub fn crew_v1() -> SchemaFragment {
	SchemaFragment {
		types: vec![
			TypeDef::extension("Launch", vec!["id".to_string()]).with_field(
				FieldDef::new("crewCount", "Int").with_requires(vec!["capacity".to_string()]),
			),
		],
	}
}

/// crew v2: no longer requires capacity
pub fn crew_v2() -> SchemaFragment {
	SchemaFragment {
		types: vec![
			TypeDef::extension("Launch", vec!["id".to_string()])
				.with_field(FieldDef::new("crewCount", "Int")),
		],
	}
}
