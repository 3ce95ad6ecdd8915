// Gateway-local config store with atomic swap and background polling
//
// The poller cycles Fetching -> Recomposing -> Swapping -> Serving on a
// fixed interval. The snapshot (config + derived planner state) is replaced
// through an ArcSwap as a single unit, so request paths always observe a
// fully-formed snapshot; requests admitted before a swap keep their pinned
// snapshot until they drain.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::client::{ConfigClient, FetchError};
use super::planner::{DeriveError, PlannerState};
use crate::types::SharedConfig;

/// Errors surfaced by explicit gateway-store operations. The background
/// poller never propagates these; it logs and retries.
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error(transparent)]
	Fetch(#[from] FetchError),

	#[error("fetched config failed planner derivation: {0}")]
	Derive(#[from] DeriveError),
}

/// One fully-formed unit of gateway state: the active config and the planner
/// structures derived from it, plus the count of requests pinned to it.
#[derive(Debug)]
pub struct GatewaySnapshot {
	config: SharedConfig,
	planner: PlannerState,
	in_flight: AtomicUsize,
}

impl GatewaySnapshot {
	fn derive(config: SharedConfig) -> Result<Self, DeriveError> {
		let planner = PlannerState::derive(&config)?;
		Ok(Self {
			config,
			planner,
			in_flight: AtomicUsize::new(0),
		})
	}

	pub fn config(&self) -> &SharedConfig {
		&self.config
	}

	pub fn planner(&self) -> &PlannerState {
		&self.planner
	}

	pub fn version(&self) -> u64 {
		self.config.version
	}

	/// Requests currently executing under this snapshot
	pub fn in_flight(&self) -> usize {
		self.in_flight.load(Ordering::SeqCst)
	}
}

/// RAII admission guard: pins one snapshot for the lifetime of a request.
///
/// The snapshot (and with it the endpoints it references) stays alive until
/// every guard on it drops, which is what lets in-flight work drain on the
/// old state after a swap.
#[derive(Debug)]
pub struct InFlightGuard {
	snapshot: Arc<GatewaySnapshot>,
}

impl InFlightGuard {
	fn new(snapshot: Arc<GatewaySnapshot>) -> Self {
		snapshot.in_flight.fetch_add(1, Ordering::SeqCst);
		Self { snapshot }
	}
}

impl Deref for InFlightGuard {
	type Target = GatewaySnapshot;

	fn deref(&self) -> &Self::Target {
		&self.snapshot
	}
}

impl Drop for InFlightGuard {
	fn drop(&mut self) {
		self.snapshot.in_flight.fetch_sub(1, Ordering::SeqCst);
	}
}

/// Store for the gateway's active snapshot, with hot-swap support.
#[derive(Debug)]
pub struct GatewayStore {
	/// Current snapshot (atomically swappable)
	current: Arc<ArcSwap<Option<Arc<GatewaySnapshot>>>>,
	/// Client for fetching updates (None for statically loaded gateways)
	client: Option<ConfigClient>,
	/// Fixed polling cadence, set at construction for the process lifetime
	poll_interval: Duration,
}

impl Clone for GatewayStore {
	fn clone(&self) -> Self {
		Self {
			current: Arc::clone(&self.current),
			client: self.client.clone(),
			poll_interval: self.poll_interval,
		}
	}
}

impl Default for GatewayStore {
	fn default() -> Self {
		Self::new()
	}
}

impl GatewayStore {
	/// Create an empty store with no client
	pub fn new() -> Self {
		Self {
			current: Arc::new(ArcSwap::new(Arc::new(None))),
			client: None,
			poll_interval: Duration::from_secs(30),
		}
	}

	/// Attach a config client and polling interval
	pub fn with_client(mut self, client: ConfigClient, poll_interval: Duration) -> Self {
		self.client = Some(client);
		self.poll_interval = poll_interval;
		self
	}

	/// Current snapshot, if any config has been loaded
	pub fn active(&self) -> Option<Arc<GatewaySnapshot>> {
		let guard = self.current.load();
		guard.as_ref().as_ref().map(Arc::clone)
	}

	/// Version of the active snapshot
	pub fn active_version(&self) -> Option<u64> {
		self.active().map(|s| s.version())
	}

	/// Admit a request: pin the current snapshot until the guard drops.
	/// Returns None while no config has been loaded yet.
	pub fn admit(&self) -> Option<InFlightGuard> {
		self.active().map(InFlightGuard::new)
	}

	/// Derive planner state and swap the snapshot in as one atomic unit.
	/// A config that fails derivation is rejected; the previous snapshot
	/// keeps serving.
	pub fn swap_in(&self, config: SharedConfig) -> Result<(), DeriveError> {
		let version = config.version;
		let snapshot = GatewaySnapshot::derive(config)?;
		self.current.store(Arc::new(Some(Arc::new(snapshot))));
		info!(target: "gateway", version, "swapped in config");
		Ok(())
	}

	/// Initial fetch at process start. Unlike the background loop, errors
	/// here surface to the caller so startup wiring can decide what to do.
	pub async fn initial_load(&self) -> Result<(), GatewayError> {
		let Some(client) = &self.client else {
			return Ok(());
		};

		let config = client.fetch().await?;
		self.swap_in(config)?;
		Ok(())
	}

	/// One poll cycle: fetch, skip if the version is unchanged, otherwise
	/// derive and swap.
	async fn poll_once(&self, client: &ConfigClient) -> Result<(), GatewayError> {
		let config = client.fetch().await?;

		if self.active_version() == Some(config.version) {
			debug!(target: "gateway", version = config.version, "config version unchanged, skipping");
			return Ok(());
		}

		self.swap_in(config)?;
		Ok(())
	}

	/// Start the background poll loop. Failures are logged and retried at
	/// the next tick; the previous config keeps serving throughout.
	pub fn spawn_poll_loop(self: Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
		let client = self.client.as_ref()?.clone();
		let interval = self.poll_interval;
		let store = self;

		Some(tokio::spawn(async move {
			info!(
				target: "gateway",
				graph_ref = %client.graph_ref(),
				"starting config poll loop with interval {:?}",
				interval
			);

			let mut consecutive_failures: u32 = 0;
			loop {
				tokio::time::sleep(interval).await;

				match store.poll_once(&client).await {
					Ok(()) => {
						consecutive_failures = 0;
					},
					Err(e) => {
						// Keep the old config on any failure.
						consecutive_failures += 1;
						if consecutive_failures >= 3 {
							error!(
								target: "gateway",
								consecutive_failures,
								"config poll failed: {}",
								e
							);
						} else {
							warn!(target: "gateway", "config poll failed: {}", e);
						}
					},
				}
			}
		}))
	}
}
