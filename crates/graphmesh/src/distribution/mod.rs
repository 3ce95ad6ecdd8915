// Distribution tier
//
// The decoupling point between the push pipeline and the gateway fleet:
// - A blob store keyed by capability token, serving the latest config per
//   (graph, variant) and surviving upstream outages
// - The publisher, which owns the published pointer and the version arena

mod publisher;
mod store;

pub use publisher::{PublishError, Publisher};
pub use store::{AccessKeyring, DistributionError, DistributionStore, MemoryDistribution};
