//! The bearer artifact and the ephemeral request that produces it
//! (spec §3, §6, §9).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which hash algorithm a token request/verification used (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlg {
    Sha256,
    Sha1,
}

/// Tagged-variant denomination selector (spec §9 REDESIGN FLAGS): the
/// source conflated selection by id-as-string and by integer value; this
/// type makes the three ways to pick a denomination explicit and mutually
/// exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenominationSelector {
    ById(u32),
    ByValue { value: u64, currency: String },
    /// The smallest active denomination.
    Default,
}

/// Ephemeral, client-side request. Never persisted by the mint; it exists
/// only for the duration of a single issue round-trip.
///
/// The token's id *is* its random secret (spec §3's "random secret, the
/// token's only content"): a 128-bit v4 UUID already carries the entropy
/// unlinkability requires, so no separate secret buffer is threaded
/// through the pipeline alongside it.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub id: Uuid,
    pub denomination_id: u32,
    pub hash_alg: HashAlg,
}

impl TokenRequest {
    /// Canonical serialization of `{id}`, the only thing the mint ever signs.
    pub fn canonical_data(&self) -> Vec<u8> {
        canonical_token_data(&self.id)
    }
}

/// Canonical JSON-style text `{"id": "<uuid>"}`, the token's `data` field.
pub fn canonical_token_data(id: &Uuid) -> Vec<u8> {
    format!(r#"{{"id":"{id}"}}"#).into_bytes()
}

/// Parses the token id back out of a `data` payload produced by
/// [`canonical_token_data`]. Returns `None` on anything else, which the
/// caller turns into `MintError::BadFormat`.
pub fn parse_token_data(data: &[u8]) -> Option<Uuid> {
    #[derive(Deserialize)]
    struct Payload {
        id: Uuid,
    }
    let payload: Payload = serde_json::from_slice(data).ok()?;
    Some(payload.id)
}

/// The bearer artifact. Carries no amount, currency, batch, or creation
/// time — its value is resolved solely by looking up `key_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub data: Vec<u8>,
    pub signature: Vec<u8>,
    pub key_id: Uuid,
}

impl Token {
    /// Extracts the token id from `data`, or `None` if `data` is malformed.
    pub fn id(&self) -> Option<Uuid> {
        parse_token_data(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_data_round_trips() {
        let id = Uuid::new_v4();
        let data = canonical_token_data(&id);
        assert_eq!(parse_token_data(&data), Some(id));
    }

    #[test]
    fn malformed_data_does_not_parse() {
        assert_eq!(parse_token_data(b"not json"), None);
        assert_eq!(parse_token_data(b"{}"), None);
    }
}
