// Service registry and push pipeline
//
// The write side of the system:
// - Content-addressed storage of uploaded partial schemas
// - The (graph, variant) -> implementing-service registry
// - The push / check / delete state machines that drive recomposition and
//   publication

mod error;
mod pipeline;
mod schema_store;
mod service_registry;

pub use error::{PushError, RegistryError, UploadError};
pub use pipeline::{DeleteOutcome, PushOutcome, PushPipeline, PushRequest};
pub use schema_store::SchemaStore;
pub use service_registry::{RegistrySnapshot, ServiceRegistry};
