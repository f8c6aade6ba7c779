//! Connection identifiers
//!
//! Every accepted connection gets an id before it joins. Ids combine a random
//! prefix with a process-wide sequence number, so two live connections can
//! never share one even though the random part is short.

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::IdError;

/// Random bytes in the id prefix
const ID_RANDOM_BYTES: usize = 4;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier of one client connection
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Generates connection ids of the form `<8 hex chars>-<sequence in base 36>`
#[derive(Debug, Default)]
pub struct IdGenerator {
    next_seq: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next id.
    ///
    /// Fails only when the OS entropy source is unavailable.
    pub fn next_id(&self) -> Result<ConnectionId, IdError> {
        let mut bytes = [0u8; ID_RANDOM_BYTES];
        getrandom::fill(&mut bytes).map_err(|e| IdError(e.to_string()))?;

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(ConnectionId(format!("{}-{}", hex::encode(bytes), base36(seq))))
    }
}

fn base36(mut n: u64) -> String {
    if n == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    // Only ASCII bytes from BASE36 are pushed
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_format() {
        let ids = IdGenerator::new();
        let id = ids.next_id().unwrap();

        let (random, seq) = id.as_str().split_once('-').unwrap();
        assert_eq!(random.len(), ID_RANDOM_BYTES * 2);
        assert!(random.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(seq, "1");
        assert_eq!(ids.next_id().unwrap().as_str().split_once('-').unwrap().1, "2");
    }

    #[test]
    fn test_ids_unique() {
        let ids = IdGenerator::new();
        let seen: HashSet<ConnectionId> = (0..5000).map(|_| ids.next_id().unwrap()).collect();
        assert_eq!(seen.len(), 5000);
    }

    #[test]
    fn test_base36() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(36 * 36 + 1), "101");
    }

    #[test]
    fn test_connection_id_serializes_as_string() {
        let id = ConnectionId::from("abc-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-1\"");
        assert_eq!(id.to_string(), "abc-1");
    }
}
