// Reference composer
//
// A deliberately small validate-and-merge implementation. It understands
// just enough of the ownership annotations to build a routable schema and to
// reject the conflicts the pipeline must surface: duplicate ownership,
// dangling extensions, key disagreements, field collisions, and unsatisfied
// `requires`. Real deployments substitute their own `Composer`.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::types::{ComposedField, ComposedSchema, ComposedType, TypeKind};

use super::{
	ComposeError, ComposedOutput, Composer, CompositionError, CompositionErrorCode,
	CompositionErrors, CompositionInput,
};

/// Minimal composer used where a real composition service is not wired in.
#[derive(Debug, Clone, Default)]
pub struct ReferenceComposer;

impl ReferenceComposer {
	pub fn new() -> Self {
		Self
	}

	fn merge(input: &CompositionInput) -> Result<ComposedSchema, CompositionErrors> {
		let mut errors = CompositionErrors::default();

		if input.services.is_empty() {
			errors.push(CompositionError::new(
				CompositionErrorCode::EmptyServiceSet,
				None,
				None,
				format!("service set for {} is empty", input.graph_ref),
			));
			return Err(errors);
		}

		// First pass: claim ownership for every non-extension definition.
		let mut schema = ComposedSchema::default();
		let mut kinds: IndexMap<String, TypeKind> = IndexMap::new();

		for service in &input.services {
			for def in service.fragment.types.iter().filter(|d| !d.extension) {
				if let Some(existing) = schema.types.get(&def.name) {
					errors.push(CompositionError::new(
						CompositionErrorCode::DuplicateTypeOwner,
						Some(&service.name),
						Some(&def.name),
						format!(
							"type is already owned by service '{}'",
							existing.owner
						),
					));
					continue;
				}

				let mut fields = IndexMap::new();
				for field in &def.fields {
					fields.insert(
						field.name.clone(),
						ComposedField {
							field_type: field.field_type.clone(),
							resolved_by: service.name.clone(),
							requires: field.requires.clone(),
						},
					);
				}

				kinds.insert(def.name.clone(), def.kind);
				if def.kind == TypeKind::Interface {
					schema.interfaces.entry(def.name.clone()).or_default();
				}
				schema.types.insert(
					def.name.clone(),
					ComposedType {
						owner: service.name.clone(),
						keys: def.keys.clone(),
						fields,
					},
				);
			}
		}

		// Second pass: apply extensions to owned types.
		for service in &input.services {
			for def in service.fragment.types.iter().filter(|d| d.extension) {
				let Some(owned) = schema.types.get_mut(&def.name) else {
					errors.push(CompositionError::new(
						CompositionErrorCode::UnknownExtensionTarget,
						Some(&service.name),
						Some(&def.name),
						"extension references a type no service owns",
					));
					continue;
				};

				if !def.keys.is_empty() && def.keys != owned.keys {
					errors.push(CompositionError::new(
						CompositionErrorCode::KeyMismatch,
						Some(&service.name),
						Some(&def.name),
						format!(
							"extension declares key {:?} but owner declares {:?}",
							def.keys, owned.keys
						),
					));
					continue;
				}

				for field in &def.fields {
					if owned.fields.contains_key(&field.name) {
						errors.push(CompositionError::new(
							CompositionErrorCode::FieldConflict,
							Some(&service.name),
							Some(&def.name),
							format!(
								"field '{}' is already resolved by service '{}'",
								field.name, owned.fields[&field.name].resolved_by
							),
						));
						continue;
					}
					owned.fields.insert(
						field.name.clone(),
						ComposedField {
							field_type: field.field_type.clone(),
							resolved_by: service.name.clone(),
							requires: field.requires.clone(),
						},
					);
				}
			}
		}

		// Third pass: interface membership.
		for service in &input.services {
			for def in &service.fragment.types {
				for iface in &def.implements {
					match kinds.get(iface) {
						Some(TypeKind::Interface) => {
							let members = schema.interfaces.entry(iface.clone()).or_default();
							if !members.contains(&def.name) {
								members.push(def.name.clone());
							}
						},
						_ => errors.push(CompositionError::new(
							CompositionErrorCode::UnknownInterface,
							Some(&service.name),
							Some(&def.name),
							format!("'{iface}' is not a known interface"),
						)),
					}
				}
			}
		}

		// Final pass: keys and requires must resolve against the merged type.
		for (name, composed) in &schema.types {
			for key in &composed.keys {
				if !composed.fields.contains_key(key) {
					errors.push(CompositionError::new(
						CompositionErrorCode::KeyFieldMissing,
						Some(&composed.owner),
						Some(name),
						format!("key field '{key}' does not exist on the composed type"),
					));
				}
			}
			for (field_name, field) in &composed.fields {
				for required in &field.requires {
					if !composed.fields.contains_key(required) {
						errors.push(CompositionError::new(
							CompositionErrorCode::UnknownRequiredField,
							Some(&field.resolved_by),
							Some(name),
							format!(
								"field '{field_name}' requires '{required}', which is absent"
							),
						));
					}
				}
			}
		}

		if errors.is_empty() {
			Ok(schema)
		} else {
			Err(errors)
		}
	}
}

#[async_trait]
impl Composer for ReferenceComposer {
	async fn compose(&self, input: &CompositionInput) -> Result<ComposedOutput, ComposeError> {
		Self::merge(input)
			.map(|schema| ComposedOutput { schema })
			.map_err(ComposeError::Invalid)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::compose::ServiceFragment;
	use crate::types::{FieldDef, GraphRef, SchemaFragment, TypeDef};

	fn service(name: &str, types: Vec<TypeDef>) -> ServiceFragment {
		ServiceFragment {
			name: name.to_string(),
			upload_endpoint: Some(format!("https://{name}.internal/schema")),
			fragment: SchemaFragment { types },
		}
	}

	fn input(services: Vec<ServiceFragment>) -> CompositionInput {
		CompositionInput {
			graph_ref: GraphRef::current("space-explorer"),
			services,
		}
	}

	#[tokio::test]
	async fn test_compose_union_of_fragments() {
		let launches = service(
			"launches",
			vec![
				TypeDef::object("Launch", vec!["id".to_string()])
					.with_field(FieldDef::new("id", "ID!"))
					.with_field(FieldDef::new("site", "String")),
			],
		);
		let crew = service(
			"crew",
			vec![
				TypeDef::extension("Launch", vec!["id".to_string()])
					.with_field(FieldDef::new("crewCount", "Int")),
			],
		);

		let out = ReferenceComposer::new()
			.compose(&input(vec![launches, crew]))
			.await
			.unwrap();

		let launch = &out.schema.types["Launch"];
		assert_eq!(launch.owner, "launches");
		assert_eq!(launch.fields["site"].resolved_by, "launches");
		assert_eq!(launch.fields["crewCount"].resolved_by, "crew");
	}

	#[tokio::test]
	async fn test_duplicate_owner_rejected() {
		let a = service(
			"a",
			vec![TypeDef::object("Launch", vec![]).with_field(FieldDef::new("id", "ID!"))],
		);
		let b = service(
			"b",
			vec![TypeDef::object("Launch", vec![]).with_field(FieldDef::new("id", "ID!"))],
		);

		let err = ReferenceComposer::new()
			.compose(&input(vec![a, b]))
			.await
			.unwrap_err();

		let ComposeError::Invalid(errors) = err else {
			panic!("expected Invalid");
		};
		assert_eq!(errors.len(), 1);
		assert_eq!(errors.0[0].code, CompositionErrorCode::DuplicateTypeOwner);
		assert_eq!(errors.0[0].service.as_deref(), Some("b"));
	}

	#[tokio::test]
	async fn test_extension_of_unknown_type_rejected() {
		let crew = service(
			"crew",
			vec![
				TypeDef::extension("Launch", vec!["id".to_string()])
					.with_field(FieldDef::new("crewCount", "Int")),
			],
		);

		let err = ReferenceComposer::new()
			.compose(&input(vec![crew]))
			.await
			.unwrap_err();

		let ComposeError::Invalid(errors) = err else {
			panic!("expected Invalid");
		};
		assert_eq!(
			errors.0[0].code,
			CompositionErrorCode::UnknownExtensionTarget
		);
	}

	#[tokio::test]
	async fn test_requires_must_resolve() {
		let launches = service(
			"launches",
			vec![
				TypeDef::object("Launch", vec!["id".to_string()])
					.with_field(FieldDef::new("id", "ID!")),
			],
		);
		let crew = service(
			"crew",
			vec![
				TypeDef::extension("Launch", vec!["id".to_string()]).with_field(
					FieldDef::new("crewCount", "Int")
						.with_requires(vec!["capacity".to_string()]),
				),
			],
		);

		let err = ReferenceComposer::new()
			.compose(&input(vec![launches, crew]))
			.await
			.unwrap_err();

		let ComposeError::Invalid(errors) = err else {
			panic!("expected Invalid");
		};
		assert_eq!(errors.0[0].code, CompositionErrorCode::UnknownRequiredField);
	}

	#[tokio::test]
	async fn test_empty_service_set_rejected() {
		let err = ReferenceComposer::new()
			.compose(&input(vec![]))
			.await
			.unwrap_err();

		let ComposeError::Invalid(errors) = err else {
			panic!("expected Invalid");
		};
		assert_eq!(errors.0[0].code, CompositionErrorCode::EmptyServiceSet);
	}

	#[tokio::test]
	async fn test_interface_membership_collected() {
		let vehicles = service(
			"vehicles",
			vec![
				TypeDef::interface("Vehicle").with_field(FieldDef::new("id", "ID!")),
				TypeDef::object("Rocket", vec!["id".to_string()])
					.with_interface("Vehicle")
					.with_field(FieldDef::new("id", "ID!"))
					.with_field(FieldDef::new("thrust", "Int")),
				TypeDef::object("Capsule", vec!["id".to_string()])
					.with_interface("Vehicle")
					.with_field(FieldDef::new("id", "ID!"))
					.with_field(FieldDef::new("seats", "Int")),
			],
		);

		let out = ReferenceComposer::new()
			.compose(&input(vec![vehicles]))
			.await
			.unwrap();

		assert_eq!(
			out.schema.interfaces["Vehicle"],
			vec!["Rocket".to_string(), "Capsule".to_string()]
		);
	}

	#[tokio::test]
	async fn test_key_mismatch_rejected() {
		let a = service(
			"a",
			vec![
				TypeDef::object("Launch", vec!["id".to_string()])
					.with_field(FieldDef::new("id", "ID!")),
			],
		);
		let b = service(
			"b",
			vec![
				TypeDef::extension("Launch", vec!["uuid".to_string()])
					.with_field(FieldDef::new("crewCount", "Int")),
			],
		);

		let err = ReferenceComposer::new()
			.compose(&input(vec![a, b]))
			.await
			.unwrap_err();

		let ComposeError::Invalid(errors) = err else {
			panic!("expected Invalid");
		};
		assert_eq!(errors.0[0].code, CompositionErrorCode::KeyMismatch);
	}
}
