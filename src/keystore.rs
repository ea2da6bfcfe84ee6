//! Persistent key→denomination mapping and key lifecycle (spec §4.3).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use num_bigint::BigUint;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::bigint;
use crate::config::MintConfig;
use crate::denomination::DenominationRegistry;
use crate::error::MintError;

/// A SigningKey's modulus must be at least this many bits (spec §3).
pub const MIN_MODULUS_BITS: usize = 3072;

/// The public half of an RSA keypair.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    pub n: BigUint,
    pub e: BigUint,
}

impl fmt::Debug for RsaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPublicKey")
            .field("n_bits", &self.n.bits())
            .field("e", &self.e)
            .finish()
    }
}

/// The private half of an RSA keypair. Private material is never exposed
/// outside the key store: only [`crate::blind::sign_blinded`] reads `d`,
/// and only the key store hands out [`SigningKey`]s in the first place.
#[derive(Clone)]
pub struct RsaPrivateKey {
    pub n: BigUint,
    pub e: BigUint,
    pub d: BigUint,
}

impl RsaPrivateKey {
    pub fn public(&self) -> RsaPublicKey {
        RsaPublicKey {
            n: self.n.clone(),
            e: self.e.clone(),
        }
    }
}

impl fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("n_bits", &self.n.bits())
            .field("d", &"<redacted>")
            .finish()
    }
}

/// A denomination-specific signing key and its lifecycle timestamps.
#[derive(Clone)]
pub struct SigningKey {
    pub id: Uuid,
    pub denomination_id: u32,
    pub public: RsaPublicKey,
    pub(crate) private: RsaPrivateKey,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Milliseconds since the Unix epoch.
    pub expires_at: u64,
    pub is_active: bool,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("denomination_id", &self.denomination_id)
            .field("public", &self.public)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("is_active", &self.is_active)
            .finish()
    }
}

impl SigningKey {
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis >= self.expires_at
    }

    /// True once the key has passed 80% of its lifetime (spec §4.3
    /// rotate(): "within the final 20% of its lifetime").
    fn in_final_fifth_of_lifetime(&self, now_millis: u64) -> bool {
        if now_millis >= self.expires_at {
            return true;
        }
        let lifetime = self.expires_at.saturating_sub(self.created_at);
        if lifetime == 0 {
            return true;
        }
        let elapsed = now_millis.saturating_sub(self.created_at);
        elapsed.saturating_mul(5) >= lifetime.saturating_mul(4)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}

/// Persistent mapping from key id to its (public, private, denomination,
/// lifecycle) record, with per-denomination synthesis serialization.
pub trait KeyStore: Send + Sync {
    /// The most recently created, non-expired key for `denomination_id`.
    /// Synthesizes and persists a fresh keypair if none exists.
    fn active_key_for(&self, denomination_id: u32) -> Result<SigningKey, MintError> {
        self.active_key_for_with_deadline(denomination_id, None)
    }

    /// Same as [`active_key_for`](KeyStore::active_key_for), but if a fresh
    /// keypair must be synthesized and `deadline` has already passed,
    /// returns `MintError::DeadlineExceeded` instead of starting keygen.
    /// Synthesis is the one call on this trait slow enough (tens to
    /// hundreds of milliseconds at production modulus sizes) for a
    /// caller-supplied deadline to matter.
    fn active_key_for_with_deadline(
        &self,
        denomination_id: u32,
        deadline: Option<Instant>,
    ) -> Result<SigningKey, MintError>;

    /// Exact lookup by key id, including expired-but-retained keys.
    fn get(&self, key_id: Uuid) -> Result<SigningKey, MintError>;

    /// Examines every active denomination and synthesizes a replacement
    /// key for any whose newest key is absent or near end of life.
    /// Returns the ids of newly synthesized keys.
    fn rotate(&self) -> Result<Vec<Uuid>, MintError>;
}

/// In-process [`KeyStore`] implementation backed by a lock-guarded map.
/// A deployment wanting on-disk durability implements [`KeyStore`] against
/// its own storage engine; this implementation is the one this crate
/// ships and exercises in tests.
pub struct InMemoryKeyStore {
    registry: Arc<DenominationRegistry>,
    config: MintConfig,
    keys: RwLock<HashMap<Uuid, SigningKey>>,
    /// Newest-last per-denomination key id history.
    by_denomination: RwLock<HashMap<u32, Vec<Uuid>>>,
    /// One synthesis lock per denomination, created lazily.
    synth_locks: Mutex<HashMap<u32, Arc<Mutex<()>>>>,
}

impl InMemoryKeyStore {
    pub fn new(registry: Arc<DenominationRegistry>, config: MintConfig) -> Self {
        Self {
            registry,
            config,
            keys: RwLock::new(HashMap::new()),
            by_denomination: RwLock::new(HashMap::new()),
            synth_locks: Mutex::new(HashMap::new()),
        }
    }

    fn synth_lock_for(&self, denomination_id: u32) -> Arc<Mutex<()>> {
        self.synth_locks
            .lock()
            .entry(denomination_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn newest_key_for(&self, denomination_id: u32) -> Option<SigningKey> {
        let by_denom = self.by_denomination.read();
        let ids = by_denom.get(&denomination_id)?;
        let newest_id = *ids.last()?;
        drop(by_denom);
        self.keys.read().get(&newest_id).cloned()
    }

    fn synthesize(&self, denomination_id: u32) -> SigningKey {
        let mut rng = rand::thread_rng();
        let material = bigint::generate_rsa_keypair(self.config.modulus_bits, &mut rng);
        let created_at = now_millis();
        let key = SigningKey {
            id: Uuid::new_v4(),
            denomination_id,
            public: RsaPublicKey {
                n: material.n.clone(),
                e: material.e.clone(),
            },
            private: RsaPrivateKey {
                n: material.n,
                e: material.e,
                d: material.d,
            },
            created_at,
            expires_at: created_at + self.config.rotation_interval.as_millis() as u64,
            is_active: true,
        };

        self.keys.write().insert(key.id, key.clone());
        self.by_denomination
            .write()
            .entry(denomination_id)
            .or_default()
            .push(key.id);

        tracing::info!(
            key_id = %key.id,
            denomination_id,
            expires_at = key.expires_at,
            "synthesized signing key"
        );

        key
    }
}

impl KeyStore for InMemoryKeyStore {
    fn active_key_for_with_deadline(
        &self,
        denomination_id: u32,
        deadline: Option<Instant>,
    ) -> Result<SigningKey, MintError> {
        self.registry.get(denomination_id)?;

        if let Some(key) = self.newest_key_for(denomination_id) {
            if !key.is_expired(now_millis()) {
                return Ok(key);
            }
        }

        let lock = self.synth_lock_for(denomination_id);
        let _guard = lock.lock();

        // Re-check: another caller may have synthesized while we waited.
        if let Some(key) = self.newest_key_for(denomination_id) {
            if !key.is_expired(now_millis()) {
                return Ok(key);
            }
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(MintError::DeadlineExceeded);
            }
        }

        Ok(self.synthesize(denomination_id))
    }

    fn get(&self, key_id: Uuid) -> Result<SigningKey, MintError> {
        self.keys
            .read()
            .get(&key_id)
            .cloned()
            .ok_or(MintError::UnknownKey)
    }

    fn rotate(&self) -> Result<Vec<Uuid>, MintError> {
        let mut rotated = Vec::new();
        for denom in self.registry.list_active() {
            let lock = self.synth_lock_for(denom.id);
            let _guard = lock.lock();

            let needs_new = match self.newest_key_for(denom.id) {
                None => true,
                Some(key) => key.in_final_fifth_of_lifetime(now_millis()),
            };

            if needs_new {
                let key = self.synthesize(denom.id);
                rotated.push(key.id);
            }
        }
        Ok(rotated)
    }
}

/// Default retention window referenced by spec §4.3: one year. Exposed so
/// callers building their own [`KeyStore`] don't have to rediscover the
/// magnitude.
pub fn default_retention_window() -> Duration {
    Duration::from_secs(60 * 60 * 24 * 365)
}
