//! Per-(user, exchange) serialization of recompute cycles.

use crate::domain::{ExchangeCode, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type PairKey = (UserId, ExchangeCode);
type LockMap = HashMap<PairKey, Arc<tokio::sync::Mutex<()>>>;

/// One async mutex per pair. Cycles for different pairs never contend.
///
/// Entries exist only while a cycle holds or waits on the pair.
#[derive(Debug, Default, Clone)]
pub struct PairLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Holds a pair until dropped, then forgets the pair if nobody else is waiting.
#[derive(Debug)]
pub struct PairGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: PairKey,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for PairGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // The map's own reference is the last one when no waiter cloned it.
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other cycle holds the pair, then hold it until the guard drops.
    pub async fn acquire(&self, user: UserId, exchange: ExchangeCode) -> PairGuard {
        let key = (user, exchange);
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key).or_default().clone()
        };
        PairGuard {
            guard: Some(lock.lock_owned().await),
            key,
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of pairs with a cycle running or queued.
    pub fn tracked_pairs(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if a cycle currently holds the pair.
    pub fn is_held(&self, user: UserId, exchange: ExchangeCode) -> bool {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .get(&(user, exchange))
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_same_pair_is_exclusive() {
        let locks = PairLocks::new();
        let user = UserId::new(Uuid::new_v4());

        let guard = locks.acquire(user, ExchangeCode::Upbit).await;
        assert!(locks.is_held(user, ExchangeCode::Upbit));

        let waiting = tokio::spawn({
            let locks = locks.clone();
            async move {
                let _guard = locks.acquire(user, ExchangeCode::Upbit).await;
            }
        });
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        drop(guard);
        waiting.await.unwrap();
        assert!(!locks.is_held(user, ExchangeCode::Upbit));
        assert_eq!(locks.tracked_pairs(), 0);
    }

    #[tokio::test]
    async fn test_released_pairs_are_forgotten() {
        let locks = PairLocks::new();
        for _ in 0..50 {
            let _guard = locks
                .acquire(UserId::new(Uuid::new_v4()), ExchangeCode::Bithumb)
                .await;
            assert_eq!(locks.tracked_pairs(), 1);
        }
        assert_eq!(locks.tracked_pairs(), 0);
    }

    #[tokio::test]
    async fn test_pair_with_waiter_survives_first_release() {
        let locks = PairLocks::new();
        let user = UserId::new(Uuid::new_v4());

        let first = locks.acquire(user, ExchangeCode::Upbit).await;
        let (acquired_tx, acquired_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let waiter = tokio::spawn({
            let locks = locks.clone();
            async move {
                let _guard = locks.acquire(user, ExchangeCode::Upbit).await;
                let _ = acquired_tx.send(());
                let _ = release_rx.await;
            }
        });
        tokio::task::yield_now().await;

        drop(first);
        acquired_rx.await.unwrap();
        assert_eq!(locks.tracked_pairs(), 1);
        assert!(locks.is_held(user, ExchangeCode::Upbit));

        release_tx.send(()).unwrap();
        waiter.await.unwrap();
        assert_eq!(locks.tracked_pairs(), 0);
    }

    #[tokio::test]
    async fn test_different_pairs_do_not_block() {
        let locks = PairLocks::new();
        let user = UserId::new(Uuid::new_v4());
        let _upbit = locks.acquire(user, ExchangeCode::Upbit).await;
        let _binance = locks.acquire(user, ExchangeCode::Binance).await;
        let _other_user = locks.acquire(UserId::new(Uuid::new_v4()), ExchangeCode::Upbit).await;
        assert!(locks.is_held(user, ExchangeCode::Binance));
    }
}
