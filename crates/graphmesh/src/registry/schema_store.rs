// Content-addressed storage for uploaded partial schemas
//
// Fragments are stored under the SHA-256 of their canonical JSON
// serialization. Uploading identical content is a no-op beyond returning the
// existing address, which is what makes the push pipeline's Uploading stage
// idempotent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::UploadError;
use crate::types::SchemaFragment;

#[derive(Debug, Clone)]
struct StoredFragment {
	content: Bytes,
	fragment: SchemaFragment,
}

/// In-memory content-addressed partial schema store.
#[derive(Debug, Default)]
pub struct SchemaStore {
	inner: RwLock<HashMap<String, StoredFragment>>,
	unavailable: AtomicBool,
}

impl SchemaStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Outage injection for tests: an unavailable store fails uploads
	/// before any registry mutation can happen.
	pub fn set_available(&self, available: bool) {
		self.unavailable.store(!available, Ordering::SeqCst);
	}

	/// Store a fragment, returning its content address. Idempotent.
	pub fn put(&self, fragment: &SchemaFragment) -> Result<String, UploadError> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(UploadError::StoreUnavailable);
		}

		let content = serde_json::to_vec(fragment)?;
		let hash = hex::encode(Sha256::digest(&content));

		let mut inner = self.inner.write();
		if inner.contains_key(&hash) {
			debug!(target: "registry", %hash, "schema fragment already stored");
		} else {
			inner.insert(
				hash.clone(),
				StoredFragment {
					content: Bytes::from(content),
					fragment: fragment.clone(),
				},
			);
			debug!(target: "registry", %hash, "stored schema fragment");
		}

		Ok(hash)
	}

	/// Load a fragment by content address
	pub fn get(&self, hash: &str) -> Option<SchemaFragment> {
		self.inner.read().get(hash).map(|s| s.fragment.clone())
	}

	/// Raw stored bytes, as served to external composition services
	pub fn content(&self, hash: &str) -> Option<Bytes> {
		self.inner.read().get(hash).map(|s| s.content.clone())
	}

	pub fn len(&self) -> usize {
		self.inner.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.read().is_empty()
	}
}
