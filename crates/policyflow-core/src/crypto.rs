use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::types::{format_timestamp, Acknowledgement};

/// Compute the acknowledgement signature hash.
///
/// Formula: hex(SHA-256(user_id || policy_version_id || timestamp)), with the
/// timestamp in its canonical storage form.
///
/// Audit artifact binding who acknowledged which version when. Not a
/// credential: anyone holding the three inputs can recompute it.
pub fn signature_hash(user_id: &str, policy_version_id: &str, timestamp: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(policy_version_id.as_bytes());
    hasher.update(format_timestamp(timestamp).as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute the hash of a stored acknowledgement and compare.
pub fn verify_signature_hash(ack: &Acknowledgement) -> bool {
    signature_hash(&ack.user_id, &ack.policy_version_id, &ack.timestamp) == ack.signature_hash
}
