//! Background key rotation (spec §4.7).
//!
//! A single OS thread that wakes up on a fixed tick and calls
//! [`KeyStore::rotate`]. No async runtime is required anywhere in this
//! crate (spec §5); this is the one place that owns a thread at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::MintConfig;
use crate::keystore::KeyStore;

/// A running rotation scheduler. Dropping this without calling [`stop`]
/// leaves the background thread running; always call `stop` during
/// shutdown.
///
/// [`stop`]: RotationHandle::stop
pub struct RotationHandle {
    stop_flag: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl RotationHandle {
    /// Signals the background thread to exit and waits for it to finish
    /// its current tick.
    pub fn stop(mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RotationHandle {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

/// Spawns a background thread that calls `key_store.rotate()` once per
/// `tick_interval`, starting immediately. Returns a handle that stops the
/// thread on [`RotationHandle::stop`].
pub fn spawn(key_store: Arc<dyn KeyStore>, tick_interval: Duration) -> RotationHandle {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let thread_stop_flag = stop_flag.clone();

    let join_handle = thread::Builder::new()
        .name("key-rotation".to_string())
        .spawn(move || rotation_loop(key_store, tick_interval, thread_stop_flag))
        .expect("failed to spawn key rotation thread");

    RotationHandle {
        stop_flag,
        join_handle: Some(join_handle),
    }
}

/// Spawns with a tick interval of half `config.rotation_interval` (spec
/// §4.7: "Runs a periodic task at half the rotation interval").
pub fn spawn_default(key_store: Arc<dyn KeyStore>, config: &MintConfig) -> RotationHandle {
    spawn(key_store, config.rotation_interval / 2)
}

fn rotation_loop(key_store: Arc<dyn KeyStore>, tick_interval: Duration, stop_flag: Arc<AtomicBool>) {
    while !stop_flag.load(Ordering::SeqCst) {
        match key_store.rotate() {
            Ok(rotated) if !rotated.is_empty() => {
                tracing::info!(rotated = rotated.len(), "rotation tick synthesized keys");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "rotation tick failed");
            }
        }

        // Sleep in short slices so `stop` is honored promptly instead of
        // blocking for the whole tick interval.
        let slice = Duration::from_millis(100).min(tick_interval);
        let mut slept = Duration::ZERO;
        while slept < tick_interval && !stop_flag.load(Ordering::SeqCst) {
            thread::sleep(slice);
            slept += slice;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denomination::DenominationRegistry;
    use crate::keystore::InMemoryKeyStore;
    use std::sync::Arc;

    #[test]
    fn spawn_rotates_at_least_once_then_stops_cleanly() {
        let registry = Arc::new(DenominationRegistry::bootstrap());
        let config = MintConfig {
            rotation_interval: Duration::from_secs(3600),
            retention_window: crate::keystore::default_retention_window(),
            modulus_bits: 512,
        };
        let store: Arc<dyn KeyStore> = Arc::new(InMemoryKeyStore::new(registry, config));

        let handle = spawn(store.clone(), Duration::from_millis(50));
        thread::sleep(Duration::from_millis(200));
        handle.stop();

        // At least one denomination should have been synthesized by now.
        assert!(store.active_key_for(0).is_ok());
    }

    #[test]
    fn spawn_default_ticks_at_half_the_rotation_interval() {
        let registry = Arc::new(DenominationRegistry::bootstrap());
        let config = MintConfig {
            rotation_interval: Duration::from_millis(100),
            retention_window: crate::keystore::default_retention_window(),
            modulus_bits: 512,
        };
        let store: Arc<dyn KeyStore> = Arc::new(InMemoryKeyStore::new(registry, config.clone()));

        let handle = spawn_default(store.clone(), &config);
        thread::sleep(Duration::from_millis(200));
        handle.stop();

        assert!(store.active_key_for(0).is_ok());
    }
}
