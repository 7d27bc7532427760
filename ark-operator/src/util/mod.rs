pub mod colors;
pub mod error;
pub mod messages;
pub mod patch;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use error::Error;

use std::time::Duration;

/// Default interval for requeuing a managed resource once it is settled.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Interval for the periodic build-check timer (§4.9).
pub const BUILD_CHECK_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Name of the kubernetes field manager used for status patches.
pub const MANAGER_NAME: &str = "ark-operator";

/// Hashes a serializable spec for change detection (stored as the
/// `mort.is/spec-hash` annotation).
pub fn hash_spec<T: serde::Serialize>(spec: &T) -> String {
    use sha2::{Digest, Sha256};
    let bytes = serde_json::to_vec(spec).expect("spec must serialize");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}
