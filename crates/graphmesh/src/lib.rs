// graphmesh: federated configuration propagation for stateless gateways
//
// Propagates a federated API's composed configuration from independently
// deployed backend services to a fleet of gateways, without downtime and
// without ever routing a request against an inconsistent configuration.
//
// The write side (registry + push pipeline + publisher) and the read side
// (gateway poller + planner + router) are decoupled in time and communicate
// only through immutable, monotonically versioned config snapshots:
//
//   push -> schema store -> registry -> composer -> publisher
//                                                      |
//                                          distribution storage
//                                                      |
//             router/planner <- atomic swap <- gateway poller

pub mod compose;
pub mod config;
pub mod distribution;
pub mod gateway;
pub mod registry;
pub mod types;

pub use compose::{ComposeError, ComposedOutput, Composer, CompositionErrors, ReferenceComposer};
pub use config::GatewayConfig;
pub use distribution::{AccessKeyring, DistributionStore, MemoryDistribution, Publisher};
pub use gateway::{ConfigClient, GatewayStore, PlannerState, Query, Router, SubgraphExecutor};
pub use registry::{PushError, PushOutcome, PushPipeline, PushRequest, SchemaStore, ServiceRegistry};
pub use types::{CapabilityToken, ComposedConfig, GraphRef, ImplementingService, SchemaFragment};
