// Gateway runtime
//
// The read side of the system, one instance per gateway process:
// - A config client fetching from distribution storage, a file, or HTTP
// - The snapshot store with atomic swap and the background poll loop
// - The planner deriving query-planning structures from the active config
// - The router executing requests pinned to exactly one snapshot

mod client;
mod planner;
mod router;
mod store;

pub use client::{AuthConfig, ConfigClient, ConfigSource, FetchError};
pub use planner::{
	DeriveError, PlanError, PlanFragment, PlannerState, Query, QueryPlan, SubQuery, SubQueryInput,
};
pub use router::{RoutedResponse, Router, RouterError, SubgraphError, SubgraphExecutor};
pub use store::{GatewayError, GatewaySnapshot, GatewayStore, InFlightGuard};
