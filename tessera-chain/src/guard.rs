use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::engine::ChainEngine;

/// Shared handle to the chain engine. Every operation holds the one lock for
/// its full duration.
#[derive(Clone)]
pub struct StateGuard {
    inner: Arc<Mutex<ChainEngine>>,
}

impl StateGuard {
    pub fn new(engine: ChainEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Wait for exclusive access.
    pub async fn lock(&self) -> MutexGuard<'_, ChainEngine> {
        self.inner.lock().await
    }

    /// Run `f` under the lock. The lock is released when `f` returns.
    pub async fn with<R>(&self, f: impl FnOnce(&mut ChainEngine) -> R) -> R {
        let mut engine = self.inner.lock().await;
        f(&mut engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_crypto::keys::Keypair;
    use tessera_storage::memory::MemoryStore;
    use tessera_types::constants::TOTAL_SUPPLY;

    fn guard() -> (StateGuard, [u8; 20]) {
        let kp = Keypair::from_seed(&[1u8; 32]).unwrap();
        let address = kp.address();
        let engine = ChainEngine::open(
            Box::new(kp),
            Box::new(MemoryStore::new()),
            &[address],
            TOTAL_SUPPLY,
        )
        .unwrap();
        (StateGuard::new(engine), address)
    }

    #[tokio::test]
    async fn test_concurrent_submissions_get_distinct_nonces() {
        let (guard, address) = guard();
        let mut handles = Vec::new();
        for i in 0..8u64 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard
                    .with(|engine| engine.submit_transfer([9u8; 20], 10 + i).map(|_| ()))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let engine = guard.lock().await;
        assert_eq!(engine.pools().transaction_count(), 8);
        assert_eq!(engine.next_nonce(&address), 9);
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let (guard, _) = guard();
        let failed = guard
            .with(|engine| engine.submit_transfer([9u8; 20], u64::MAX))
            .await;
        assert!(failed.is_err());
        // The lock is free again.
        let head = guard.with(|engine| engine.head()).await;
        assert_eq!(head.0, 0);
    }
}
