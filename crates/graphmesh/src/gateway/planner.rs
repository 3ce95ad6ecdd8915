// Query planner
//
// PlannerState is the gateway-local derivation of query-planning structures
// from a fetched ComposedConfig: a pure, deterministic, side-effect-free
// transform. Planning decomposes a structured request into per-service
// sub-queries; a request against an interface expands into one fragment per
// implementing type.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ComposedConfig;

/// Errors deriving planner structures from a composed config.
///
/// A config that fails derivation is never swapped in; the gateway keeps
/// serving its previous state.
#[derive(Debug, Error)]
pub enum DeriveError {
	#[error("service '{service}' resolves fields of '{type_name}' but is absent from the service set")]
	MissingEndpoint { service: String, type_name: String },
}

/// Errors planning a single request
#[derive(Debug, Error)]
pub enum PlanError {
	#[error("unknown type '{0}'")]
	UnknownType(String),

	#[error("unknown field '{field}' on type '{type_name}'")]
	UnknownField { type_name: String, field: String },

	#[error("no endpoint for service '{0}'")]
	MissingEndpoint(String),
}

/// A structured request: an entity (object or interface) and the fields to
/// resolve. Parsing request text into this shape is the query executor's
/// concern, not ours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
	pub entity: String,
	pub fields: Vec<String>,
}

impl Query {
	pub fn new<I, S>(entity: impl Into<String>, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			entity: entity.into(),
			fields: fields.into_iter().map(Into::into).collect(),
		}
	}
}

/// How a sub-query obtains its input: either a root lookup on the owning
/// service, or an entity representation assembled from fields the owner
/// already returned. Backend resolvers mid-migration may accept more than
/// one representation shape; the planner always emits the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubQueryInput {
	/// Root lookup resolved by the type's owner
	Root,

	/// Representation passed to a non-owner service
	Representation {
		/// Entity key fields identifying the instance
		key: Vec<String>,
		/// Additional fields the resolver requires as input
		requires: Vec<String>,
	},
}

/// One sub-query dispatched to one implementing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubQuery {
	pub service: String,
	/// Runtime endpoint pinned from the snapshot this plan was made under
	pub url: String,
	pub type_name: String,
	pub fields: Vec<String>,
	pub input: SubQueryInput,
}

/// Plan for one concrete type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFragment {
	pub type_name: String,
	/// Owner step first, then dependent steps in deterministic order
	pub steps: Vec<SubQuery>,
}

/// A complete query plan, stamped with the config version it derives from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
	pub version: u64,
	pub fragments: Vec<PlanFragment>,
}

#[derive(Debug, Clone)]
struct FieldPlan {
	service: String,
	requires: Vec<String>,
}

#[derive(Debug, Clone)]
struct TypePlan {
	owner: String,
	keys: Vec<String>,
	fields: IndexMap<String, FieldPlan>,
}

/// Pre-derived planning structures for one config version.
#[derive(Debug)]
pub struct PlannerState {
	version: u64,
	types: IndexMap<String, TypePlan>,
	interfaces: IndexMap<String, Vec<String>>,
	endpoints: IndexMap<String, String>,
}

impl PlannerState {
	/// Derive planner structures from a composed config.
	pub fn derive(config: &ComposedConfig) -> Result<Self, DeriveError> {
		let endpoints: IndexMap<String, String> = config
			.service_set
			.iter()
			.map(|(name, svc)| (name.clone(), svc.url.clone()))
			.collect();

		let mut types = IndexMap::new();
		for (name, composed) in &config.schema.types {
			if !endpoints.contains_key(&composed.owner) {
				return Err(DeriveError::MissingEndpoint {
					service: composed.owner.clone(),
					type_name: name.clone(),
				});
			}

			let mut fields = IndexMap::new();
			for (field_name, field) in &composed.fields {
				if !endpoints.contains_key(&field.resolved_by) {
					return Err(DeriveError::MissingEndpoint {
						service: field.resolved_by.clone(),
						type_name: name.clone(),
					});
				}
				fields.insert(
					field_name.clone(),
					FieldPlan {
						service: field.resolved_by.clone(),
						requires: field.requires.clone(),
					},
				);
			}

			types.insert(
				name.clone(),
				TypePlan {
					owner: composed.owner.clone(),
					keys: composed.keys.clone(),
					fields,
				},
			);
		}

		Ok(Self {
			version: config.version,
			types,
			interfaces: config.schema.interfaces.clone(),
			endpoints,
		})
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	fn endpoint(&self, service: &str) -> Result<String, PlanError> {
		self.endpoints
			.get(service)
			.cloned()
			.ok_or_else(|| PlanError::MissingEndpoint(service.to_string()))
	}

	/// Decompose a request into per-service sub-queries.
	pub fn plan(&self, query: &Query) -> Result<QueryPlan, PlanError> {
		let fragments = if let Some(members) = self.interfaces.get(&query.entity) {
			// Expand the interface into one fragment per implementing type,
			// each restricted to the fields that type actually has.
			for field in &query.fields {
				let known = members.iter().any(|m| {
					self.types
						.get(m)
						.is_some_and(|t| t.fields.contains_key(field))
				});
				if !known {
					return Err(PlanError::UnknownField {
						type_name: query.entity.clone(),
						field: field.clone(),
					});
				}
			}

			let mut fragments = Vec::new();
			for member in members {
				let plan = self
					.types
					.get(member)
					.ok_or_else(|| PlanError::UnknownType(member.clone()))?;
				let fields: Vec<String> = query
					.fields
					.iter()
					.filter(|f| plan.fields.contains_key(*f))
					.cloned()
					.collect();
				if fields.is_empty() {
					continue;
				}
				fragments.push(self.plan_type(member, &fields)?);
			}
			fragments
		} else {
			vec![self.plan_type(&query.entity, &query.fields)?]
		};

		Ok(QueryPlan {
			version: self.version,
			fragments,
		})
	}

	fn plan_type(&self, type_name: &str, fields: &[String]) -> Result<PlanFragment, PlanError> {
		let plan = self
			.types
			.get(type_name)
			.ok_or_else(|| PlanError::UnknownType(type_name.to_string()))?;

		let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
		for field in fields {
			let field_plan =
				plan.fields
					.get(field)
					.ok_or_else(|| PlanError::UnknownField {
						type_name: type_name.to_string(),
						field: field.clone(),
					})?;
			groups
				.entry(field_plan.service.clone())
				.or_default()
				.push(field.clone());
		}

		// The owner step always runs first: it serves its own fields and the
		// key fields every representation is assembled from.
		let owner_fields = groups.shift_remove(&plan.owner).unwrap_or_default();
		let mut root_fields = plan.keys.clone();
		for field in owner_fields {
			if !root_fields.contains(&field) {
				root_fields.push(field);
			}
		}

		let mut steps = vec![SubQuery {
			service: plan.owner.clone(),
			url: self.endpoint(&plan.owner)?,
			type_name: type_name.to_string(),
			fields: root_fields,
			input: SubQueryInput::Root,
		}];

		for (service, service_fields) in groups {
			let mut requires = Vec::new();
			for field in &service_fields {
				for required in &plan.fields[field].requires {
					if !requires.contains(required) {
						requires.push(required.clone());
					}
				}
			}
			steps.push(SubQuery {
				url: self.endpoint(&service)?,
				service,
				type_name: type_name.to_string(),
				fields: service_fields,
				input: SubQueryInput::Representation {
					key: plan.keys.clone(),
					requires,
				},
			});
		}

		Ok(PlanFragment {
			type_name: type_name.to_string(),
			steps,
		})
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use chrono::Utc;
	use indexmap::IndexMap;

	use super::*;
	use crate::types::{
		ComposedField, ComposedSchema, ComposedType, GraphRef, ImplementingService, SchemaRef,
	};

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

	fn field(field_type: &str, resolved_by: &str, requires: &[&str]) -> ComposedField {
		ComposedField {
			field_type: field_type.to_string(),
			resolved_by: resolved_by.to_string(),
			requires: requires.iter().map(|s| s.to_string()).collect(),
		}
	}

	fn launch_config() -> ComposedConfig {
		let mut service_set = IndexMap::new();
		service_set.insert(
			"launches".to_string(),
			service("launches", "https://launches.internal"),
		);
		service_set.insert("crew".to_string(), service("crew", "https://crew.internal"));

		let mut fields = IndexMap::new();
		fields.insert("id".to_string(), field("ID!", "launches", &[]));
		fields.insert("site".to_string(), field("String", "launches", &[]));
		fields.insert("capacity".to_string(), field("Int", "launches", &[]));
		fields.insert("crewCount".to_string(), field("Int", "crew", &["capacity"]));

		let mut types = IndexMap::new();
		types.insert(
			"Launch".to_string(),
			ComposedType {
				owner: "launches".to_string(),
				keys: vec!["id".to_string()],
				fields,
			},
		);

		ComposedConfig {
			version: 7,
			graph_ref: GraphRef::current("space-explorer"),
			service_set,
			schema: ComposedSchema {
				types,
				interfaces: IndexMap::new(),
			},
		}
	}

	#[test]
	fn test_plan_groups_fields_by_service() {
		let state = PlannerState::derive(&launch_config()).unwrap();

		let plan = state
			.plan(&Query::new("Launch", ["site", "crewCount"]))
			.unwrap();

		assert_eq!(plan.version, 7);
		assert_eq!(plan.fragments.len(), 1);
		let steps = &plan.fragments[0].steps;
		assert_eq!(steps.len(), 2);

		// Owner first, with key fields included
		assert_eq!(steps[0].service, "launches");
		assert_eq!(steps[0].input, SubQueryInput::Root);
		assert_eq!(steps[0].fields, vec!["id", "site"]);
		assert_eq!(steps[0].url, "https://launches.internal");

		assert_eq!(steps[1].service, "crew");
		assert_eq!(steps[1].fields, vec!["crewCount"]);
		assert_eq!(
			steps[1].input,
			SubQueryInput::Representation {
				key: vec!["id".to_string()],
				requires: vec!["capacity".to_string()],
			}
		);
	}

	#[test]
	fn test_plan_owner_only_query_has_single_step() {
		let state = PlannerState::derive(&launch_config()).unwrap();
		let plan = state.plan(&Query::new("Launch", ["site"])).unwrap();

		assert_eq!(plan.fragments[0].steps.len(), 1);
		assert_eq!(plan.fragments[0].steps[0].service, "launches");
	}

	#[test]
	fn test_plan_unknown_type_and_field() {
		let state = PlannerState::derive(&launch_config()).unwrap();

		assert_matches!(
			state.plan(&Query::new("Mission", ["site"])),
			Err(PlanError::UnknownType(_))
		);
		assert_matches!(
			state.plan(&Query::new("Launch", ["nope"])),
			Err(PlanError::UnknownField { .. })
		);
	}

	#[test]
	fn test_derive_rejects_missing_endpoint() {
		let mut config = launch_config();
		config.service_set.shift_remove("crew");

		assert_matches!(
			PlannerState::derive(&config),
			Err(DeriveError::MissingEndpoint { .. })
		);
	}

	#[test]
	fn test_interface_expands_into_fragments() {
		let mut config = launch_config();

		let mut rocket_fields = IndexMap::new();
		rocket_fields.insert("id".to_string(), field("ID!", "launches", &[]));
		rocket_fields.insert("thrust".to_string(), field("Int", "launches", &[]));
		let mut capsule_fields = IndexMap::new();
		capsule_fields.insert("id".to_string(), field("ID!", "crew", &[]));
		capsule_fields.insert("seats".to_string(), field("Int", "crew", &[]));

		config.schema.types.insert(
			"Rocket".to_string(),
			ComposedType {
				owner: "launches".to_string(),
				keys: vec!["id".to_string()],
				fields: rocket_fields,
			},
		);
		config.schema.types.insert(
			"Capsule".to_string(),
			ComposedType {
				owner: "crew".to_string(),
				keys: vec!["id".to_string()],
				fields: capsule_fields,
			},
		);
		config.schema.interfaces.insert(
			"Vehicle".to_string(),
			vec!["Rocket".to_string(), "Capsule".to_string()],
		);

		let state = PlannerState::derive(&config).unwrap();
		let plan = state
			.plan(&Query::new("Vehicle", ["thrust", "seats"]))
			.unwrap();

		assert_eq!(plan.fragments.len(), 2);
		assert_eq!(plan.fragments[0].type_name, "Rocket");
		assert_eq!(plan.fragments[0].steps[0].fields, vec!["id", "thrust"]);
		assert_eq!(plan.fragments[1].type_name, "Capsule");
		assert_eq!(plan.fragments[1].steps[0].fields, vec!["id", "seats"]);
	}

	#[test]
	fn test_interface_field_unknown_on_all_members() {
		let mut config = launch_config();
		config
			.schema
			.interfaces
			.insert("Vehicle".to_string(), vec!["Launch".to_string()]);

		let state = PlannerState::derive(&config).unwrap();
		assert_matches!(
			state.plan(&Query::new("Vehicle", ["warpFactor"])),
			Err(PlanError::UnknownField { .. })
		);
	}
}
