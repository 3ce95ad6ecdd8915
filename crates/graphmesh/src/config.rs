// Gateway process configuration
//
// The (graph, variant) to track, the config source, and the polling cadence
// are supplied at process start and fixed for the process lifetime; there is
// no dynamic variant switching without a restart.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::types::{CapabilityToken, GraphRef, DEFAULT_VARIANT};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid duration: {0}")]
	InvalidDuration(String),
}

/// Startup configuration for one gateway process.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
	/// Graph to serve
	pub graph: String,

	/// Variant to track
	#[serde(default = "default_variant")]
	pub variant: String,

	/// Config source URI (`file://` or `http(s)://`)
	pub source: String,

	/// Polling cadence, e.g. "30s" or "5m"
	#[serde(default = "default_poll_interval")]
	pub poll_interval: String,

	/// Access credential the capability token derives from
	pub credential: String,
}

fn default_variant() -> String {
	DEFAULT_VARIANT.to_string()
}

fn default_poll_interval() -> String {
	"30s".to_string()
}

impl GatewayConfig {
	pub fn graph_ref(&self) -> GraphRef {
		GraphRef::new(self.graph.clone(), self.variant.clone())
	}

	pub fn token(&self) -> CapabilityToken {
		CapabilityToken::derive(&self.credential)
	}

	pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
		parse_duration(&self.poll_interval)
	}
}

/// Parse a duration string like "5m", "30s", "1h"
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
	let s = s.trim();
	if s.is_empty() {
		return Err(ConfigError::InvalidDuration("empty duration string".into()));
	}

	let (num_str, unit) = if s.ends_with("ms") {
		(&s[..s.len() - 2], "ms")
	} else if s.ends_with('s') {
		(&s[..s.len() - 1], "s")
	} else if s.ends_with('m') {
		(&s[..s.len() - 1], "m")
	} else if s.ends_with('h') {
		(&s[..s.len() - 1], "h")
	} else {
		// Assume seconds if no unit
		(s, "s")
	};

	let num: u64 = num_str
		.parse()
		.map_err(|_| ConfigError::InvalidDuration(format!("invalid duration number: {}", num_str)))?;

	let duration = match unit {
		"ms" => Duration::from_millis(num),
		"s" => Duration::from_secs(num),
		"m" => Duration::from_secs(num * 60),
		"h" => Duration::from_secs(num * 60 * 60),
		_ => {
			return Err(ConfigError::InvalidDuration(format!(
				"unknown duration unit: {}",
				unit
			)));
		},
	};

	Ok(duration)
}
