//! MongoDB-ObjectId-shaped identifier generation.
//!
//! Produces 24-character lowercase hex identifiers with a deterministic
//! layout: 4 bytes of truncated epoch seconds, 3 bytes derived from a hash
//! of the host name, 2 bytes of the process id and 3 random bytes. The
//! length is stable so callers may validate id shape.

use std::sync::OnceLock;

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};

static HOST_BYTES: OnceLock<[u8; 3]> = OnceLock::new();

fn host_bytes() -> [u8; 3] {
    *HOST_BYTES.get_or_init(|| {
        let host = sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string());
        let digest = Sha256::digest(host.as_bytes());
        [digest[0], digest[1], digest[2]]
    })
}

/// Generate a new document identifier.
pub fn object_id() -> String {
    let mut bytes = [0u8; 12];

    let timestamp = Utc::now().timestamp() as u32;
    bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());

    bytes[4..7].copy_from_slice(&host_bytes());

    let pid = (std::process::id() & 0xffff) as u16;
    bytes[7..9].copy_from_slice(&pid.to_be_bytes());

    let tail: u32 = rand::thread_rng().gen();
    bytes[9..12].copy_from_slice(&tail.to_be_bytes()[1..4]);

    let mut out = String::with_capacity(24);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
