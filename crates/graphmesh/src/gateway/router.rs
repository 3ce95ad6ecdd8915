// Request router
//
// Admission pins exactly one snapshot for the whole request: the plan is
// made and every sub-query dispatched under that snapshot, regardless of
// swaps happening meanwhile. Execution of individual sub-queries is the
// query engine's concern, reached through the SubgraphExecutor seam.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::planner::{PlanError, PlanFragment, Query, SubQuery};
use super::store::GatewayStore;

/// Error from an implementing service's resolver
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SubgraphError(pub String);

/// Errors handling a routed request
#[derive(Debug, Error)]
pub enum RouterError {
	#[error("gateway has no active configuration yet")]
	NotReady,

	#[error(transparent)]
	Plan(#[from] PlanError),

	#[error("sub-query to service '{service}' failed: {source}")]
	Subgraph {
		service: String,
		#[source]
		source: SubgraphError,
	},
}

/// Executes one sub-query against one implementing service.
///
/// Implementations return a JSON object mapping the requested field names to
/// resolved values.
#[async_trait]
pub trait SubgraphExecutor: Send + Sync {
	async fn execute(&self, sub: &SubQuery) -> Result<Value, SubgraphError>;
}

/// A completed request, stamped with the single config version it ran under.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
	pub request_id: Uuid,
	/// Version of the snapshot every sub-query of this request used
	pub version: u64,
	pub data: Value,
}

/// Routes requests against the gateway's current snapshot.
pub struct Router<E> {
	store: Arc<GatewayStore>,
	executor: E,
}

impl<E: SubgraphExecutor> Router<E> {
	pub fn new(store: Arc<GatewayStore>, executor: E) -> Self {
		Self { store, executor }
	}

	pub fn store(&self) -> &Arc<GatewayStore> {
		&self.store
	}

	/// Plan and execute a request entirely under one snapshot.
	pub async fn handle(&self, query: &Query) -> Result<RoutedResponse, RouterError> {
		// Admission point: everything below runs under this snapshot.
		let guard = self.store.admit().ok_or(RouterError::NotReady)?;
		let request_id = Uuid::new_v4();

		let plan = guard.planner().plan(query)?;
		debug!(
			target: "gateway",
			%request_id,
			version = plan.version,
			fragments = plan.fragments.len(),
			"planned request"
		);

		let data = if let [fragment] = plan.fragments.as_slice() {
			Value::Object(self.execute_fragment(fragment).await?)
		} else {
			let mut by_type = Map::new();
			for fragment in &plan.fragments {
				let object = self.execute_fragment(fragment).await?;
				by_type.insert(fragment.type_name.clone(), Value::Object(object));
			}
			Value::Object(by_type)
		};

		Ok(RoutedResponse {
			request_id,
			version: guard.version(),
			data,
		})
	}

	/// Execute one fragment: the owner step first (its result feeds entity
	/// representations), then every dependent step concurrently.
	async fn execute_fragment(&self, fragment: &PlanFragment) -> Result<Map<String, Value>, RouterError> {
		let mut object = Map::new();

		let Some((root, dependents)) = fragment.steps.split_first() else {
			return Ok(object);
		};

		let root_result = self.execute_step(root).await?;
		merge_into(&mut object, root, root_result)?;

		let results = join_all(dependents.iter().map(|step| async move {
			let value = self.execute_step(step).await?;
			Ok::<_, RouterError>((step, value))
		}))
		.await;

		for result in results {
			let (step, value) = result?;
			merge_into(&mut object, step, value)?;
		}

		Ok(object)
	}

	async fn execute_step(&self, step: &SubQuery) -> Result<Value, RouterError> {
		self.executor
			.execute(step)
			.await
			.map_err(|source| RouterError::Subgraph {
				service: step.service.clone(),
				source,
			})
	}
}

fn merge_into(
	object: &mut Map<String, Value>,
	step: &SubQuery,
	value: Value,
) -> Result<(), RouterError> {
	let Value::Object(fields) = value else {
		return Err(RouterError::Subgraph {
			service: step.service.clone(),
			source: SubgraphError("expected an object response".to_string()),
		});
	};
	for (key, value) in fields {
		object.insert(key, value);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use chrono::Utc;
	use indexmap::IndexMap;
	use serde_json::json;

	use super::*;
	use crate::types::{
		ComposedConfig, ComposedField, ComposedSchema, ComposedType, GraphRef,
		ImplementingService, SchemaRef, SharedConfig,
	};

	/// Resolves every field to "<service>:<field>@<url>"
	struct EchoExecutor;

	#[async_trait]
	impl SubgraphExecutor for EchoExecutor {
		async fn execute(&self, sub: &SubQuery) -> Result<Value, SubgraphError> {
			let mut object = Map::new();
			for field in &sub.fields {
				object.insert(
					field.clone(),
					json!(format!("{}:{}@{}", sub.service, field, sub.url)),
				);
			}
			Ok(Value::Object(object))
		}
	}

	struct FailingExecutor;

	#[async_trait]
	impl SubgraphExecutor for FailingExecutor {
		async fn execute(&self, _sub: &SubQuery) -> Result<Value, SubgraphError> {
			Err(SubgraphError("boom".to_string()))
		}
	}

	fn service(name: &str, url: &str) -> ImplementingService {
		ImplementingService {
			name: name.to_string(),
			url: url.to_string(),
			schema_ref: SchemaRef {
				hash: "h".to_string(),
				upload_endpoint: None,
			},
			registered_at: Utc::now(),
		}
	}

	fn config(version: u64) -> SharedConfig {
		let mut service_set = IndexMap::new();
		service_set.insert(
			"launches".to_string(),
			service("launches", "https://launches.internal"),
		);
		service_set.insert("crew".to_string(), service("crew", "https://crew.internal"));

		let mut fields = IndexMap::new();
		fields.insert(
			"id".to_string(),
			ComposedField {
				field_type: "ID!".to_string(),
				resolved_by: "launches".to_string(),
				requires: vec![],
			},
		);
		fields.insert(
			"site".to_string(),
			ComposedField {
				field_type: "String".to_string(),
				resolved_by: "launches".to_string(),
				requires: vec![],
			},
		);
		fields.insert(
			"crewCount".to_string(),
			ComposedField {
				field_type: "Int".to_string(),
				resolved_by: "crew".to_string(),
				requires: vec![],
			},
		);
		let mut types = IndexMap::new();
		types.insert(
			"Launch".to_string(),
			ComposedType {
				owner: "launches".to_string(),
				keys: vec!["id".to_string()],
				fields,
			},
		);

		Arc::new(ComposedConfig {
			version,
			graph_ref: GraphRef::current("g"),
			service_set,
			schema: ComposedSchema {
				types,
				interfaces: IndexMap::new(),
			},
		})
	}

	#[tokio::test]
	async fn test_not_ready_without_config() {
		let router = Router::new(Arc::new(GatewayStore::new()), EchoExecutor);

		let err = router
			.handle(&Query::new("Launch", ["site"]))
			.await
			.unwrap_err();
		assert_matches!(err, RouterError::NotReady);
	}

	#[tokio::test]
	async fn test_merges_sub_query_results() {
		let store = Arc::new(GatewayStore::new());
		store.swap_in(config(3)).unwrap();
		let router = Router::new(store, EchoExecutor);

		let response = router
			.handle(&Query::new("Launch", ["site", "crewCount"]))
			.await
			.unwrap();

		assert_eq!(response.version, 3);
		assert_eq!(
			response.data["site"],
			json!("launches:site@https://launches.internal")
		);
		assert_eq!(
			response.data["crewCount"],
			json!("crew:crewCount@https://crew.internal")
		);
	}

	#[tokio::test]
	async fn test_subgraph_failure_names_the_service() {
		let store = Arc::new(GatewayStore::new());
		store.swap_in(config(1)).unwrap();
		let router = Router::new(store, FailingExecutor);

		let err = router
			.handle(&Query::new("Launch", ["site"]))
			.await
			.unwrap_err();
		assert_matches!(err, RouterError::Subgraph { service, .. } if service == "launches");
	}
}
