// Service registry: (graph, variant) -> registered implementing services
//
// Records are independently keyed per service name, so concurrent pushes for
// different services interleave without contention. Every mutation bumps the
// variant's epoch; the publisher uses the epoch for its optimistic
// stale-draft check.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::info;
use url::Url;

use super::error::RegistryError;
use crate::types::{GraphRef, ImplementingService};

#[derive(Debug, Default)]
struct VariantRecords {
	services: IndexMap<String, ImplementingService>,
	epoch: u64,
}

/// A consistent view of one variant's service set, taken at composition time.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
	/// Services in registration order
	pub services: IndexMap<String, ImplementingService>,
	/// Registry epoch the snapshot was taken at
	pub epoch: u64,
}

/// In-memory service registry.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
	inner: RwLock<HashMap<GraphRef, VariantRecords>>,
	unavailable: AtomicBool,
}

impl ServiceRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Outage injection for tests: an unavailable registry halts new pushes
	/// without invalidating anything already published.
	pub fn set_available(&self, available: bool) {
		self.unavailable.store(!available, Ordering::SeqCst);
	}

	fn check_available(&self) -> Result<(), RegistryError> {
		if self.unavailable.load(Ordering::SeqCst) {
			Err(RegistryError::Unavailable)
		} else {
			Ok(())
		}
	}

	/// Insert or replace the record for (graph, variant, name) in a single
	/// atomic registry write. Returns the variant's new epoch.
	pub fn upsert(
		&self,
		graph_ref: &GraphRef,
		service: ImplementingService,
	) -> Result<u64, RegistryError> {
		self.check_available()?;

		Url::parse(&service.url).map_err(|e| RegistryError::InvalidUrl {
			url: service.url.clone(),
			message: e.to_string(),
		})?;

		let mut inner = self.inner.write();
		let records = inner.entry(graph_ref.clone()).or_default();
		records.epoch += 1;
		info!(
			target: "registry",
			graph_ref = %graph_ref,
			service = %service.name,
			epoch = records.epoch,
			"registered implementing service"
		);
		records.services.insert(service.name.clone(), service);
		Ok(records.epoch)
	}

	/// Remove a service record. Irreversible; there is no tombstone.
	/// Returns the removed record and the variant's new epoch.
	pub fn remove(
		&self,
		graph_ref: &GraphRef,
		name: &str,
	) -> Result<(ImplementingService, u64), RegistryError> {
		self.check_available()?;

		let mut inner = self.inner.write();
		let records = inner
			.get_mut(graph_ref)
			.ok_or_else(|| RegistryError::ServiceNotFound {
				graph_ref: graph_ref.clone(),
				name: name.to_string(),
			})?;

		let removed =
			records
				.services
				.shift_remove(name)
				.ok_or_else(|| RegistryError::ServiceNotFound {
					graph_ref: graph_ref.clone(),
					name: name.to_string(),
				})?;
		records.epoch += 1;
		info!(
			target: "registry",
			graph_ref = %graph_ref,
			service = name,
			epoch = records.epoch,
			"removed implementing service"
		);
		Ok((removed, records.epoch))
	}

	/// Take a consistent snapshot of the variant's current full service set.
	pub fn snapshot(&self, graph_ref: &GraphRef) -> Result<RegistrySnapshot, RegistryError> {
		self.check_available()?;

		let inner = self.inner.read();
		Ok(match inner.get(graph_ref) {
			Some(records) => RegistrySnapshot {
				services: records.services.clone(),
				epoch: records.epoch,
			},
			None => RegistrySnapshot {
				services: IndexMap::new(),
				epoch: 0,
			},
		})
	}

	/// List registered services in registration order
	pub fn list(&self, graph_ref: &GraphRef) -> Result<Vec<ImplementingService>, RegistryError> {
		Ok(self.snapshot(graph_ref)?.services.into_values().collect())
	}
}
