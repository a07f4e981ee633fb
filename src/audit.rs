//! Snapshot digests and integrity verification
//!
//! Suspension snapshots carry a SHA-256 digest of their payload so a resumed
//! session can detect tampering or corruption. The dialogue loop also uses a
//! digest over the recent turn window as part of its memo key.

use sha2::{Digest, Sha256};
use std::io::Write;

use crate::models::{Case, CaseSnapshot, DialogueTurn, Phase};

/// Compute the integrity digest over a snapshot's payload (case + phase).
/// Streams JSON directly into the hasher, no intermediate String.
pub fn snapshot_digest(case: &Case, phase: Phase) -> String {
    let mut hasher = Sha256::new();

    let payload = (case, phase);
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &payload).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Verify a snapshot's recorded digest against its payload.
pub fn verify_snapshot(snapshot: &CaseSnapshot) -> bool {
    !snapshot.digest.is_empty()
        && snapshot_digest(&snapshot.case, snapshot.phase) == snapshot.digest
}

/// Digest over the most recent dialogue turns (at most `window` of them).
/// Used as a memo-key component so a reassessment is reused only while the
/// recent transcript is unchanged.
pub fn turn_window_digest(turns: &[DialogueTurn], window: usize) -> String {
    let start = turns.len().saturating_sub(window);
    let recent = &turns[start..];

    let mut hasher = Sha256::new();
    if serde_json::to_writer(&mut HashWriter(&mut hasher), recent).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
