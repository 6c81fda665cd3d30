//! In-memory account registry.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::{Mutex, RwLock};

use crate::account::{Account, AccountSnapshot};
use crate::error::AccountError;

/// Registry of accounts keyed by uid.
///
/// Accounts are handed out as `Arc<Mutex<_>>` so a running loop keeps
/// its account alive even if the entry is removed mid-run; removal
/// paths stop the loop first.
pub struct AccountStore {
    accounts: RwLock<HashMap<String, Arc<Mutex<Account>>>>,
    max_accounts: usize,
}

impl AccountStore {
    /// Create a registry bounded to `max_accounts` entries.
    pub fn new(max_accounts: usize) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            max_accounts,
        }
    }

    /// Register a new account.
    pub async fn add(
        &self,
        uid: &str,
        credential: SecretString,
        display_name: &str,
    ) -> Result<(), AccountError> {
        let mut accounts = self.accounts.write().await;
        if accounts.len() >= self.max_accounts {
            return Err(AccountError::AccountLimit {
                max: self.max_accounts,
            });
        }
        if accounts.contains_key(uid) {
            return Err(AccountError::AlreadyExists {
                uid: uid.to_string(),
            });
        }
        let account = Account::new(uid, credential, display_name);
        accounts.insert(uid.to_string(), Arc::new(Mutex::new(account)));
        tracing::info!(uid = %uid, "Registered account");
        Ok(())
    }

    /// Look up an account.
    pub async fn get(&self, uid: &str) -> Result<Arc<Mutex<Account>>, AccountError> {
        let accounts = self.accounts.read().await;
        accounts.get(uid).map(Arc::clone).ok_or_else(|| {
            AccountError::NotFound {
                uid: uid.to_string(),
            }
        })
    }

    /// Drop an account from the registry.
    ///
    /// Callers must stop the account's loop first; the returned handle
    /// is the last strong reference the registry held.
    pub async fn remove(&self, uid: &str) -> Result<Arc<Mutex<Account>>, AccountError> {
        let mut accounts = self.accounts.write().await;
        accounts.remove(uid).ok_or_else(|| AccountError::NotFound {
            uid: uid.to_string(),
        })
    }

    /// Reset the daily XP counter. The only field this touches is
    /// `today_xp`.
    pub async fn reset_today(&self, uid: &str) -> Result<(), AccountError> {
        let account = self.get(uid).await?;
        let mut acc = account.lock().await;
        acc.today_xp = 0;
        Ok(())
    }

    /// Snapshot every account's observable state.
    pub async fn snapshots(&self) -> Vec<AccountSnapshot> {
        let accounts = self.accounts.read().await;
        let mut snaps = Vec::with_capacity(accounts.len());
        for account in accounts.values() {
            snaps.push(account.lock().await.snapshot());
        }
        snaps.sort_by(|a, b| a.uid.cmp(&b.uid));
        snaps
    }

    /// Number of registered accounts.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// True when no accounts are registered.
    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("tok")
    }

    #[tokio::test]
    async fn add_get_remove_roundtrip() {
        let store = AccountStore::new(5);
        store.add("u1", secret(), "Alice").await.unwrap();
        assert_eq!(store.len().await, 1);

        let account = store.get("u1").await.unwrap();
        assert_eq!(account.lock().await.display_name, "Alice");

        store.remove("u1").await.unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(
            store.get("u1").await,
            Err(AccountError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_uid_is_rejected() {
        let store = AccountStore::new(5);
        store.add("u1", secret(), "").await.unwrap();
        assert!(matches!(
            store.add("u1", secret(), "").await,
            Err(AccountError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn registry_is_bounded() {
        let store = AccountStore::new(2);
        store.add("u1", secret(), "").await.unwrap();
        store.add("u2", secret(), "").await.unwrap();
        assert!(matches!(
            store.add("u3", secret(), "").await,
            Err(AccountError::AccountLimit { max: 2 })
        ));
        // Removing frees a slot.
        store.remove("u1").await.unwrap();
        store.add("u3", secret(), "").await.unwrap();
    }

    #[tokio::test]
    async fn reset_today_touches_only_today_xp() {
        let store = AccountStore::new(5);
        store.add("u1", secret(), "").await.unwrap();
        {
            let account = store.get("u1").await.unwrap();
            account.lock().await.apply_gain(1500);
        }
        store.reset_today("u1").await.unwrap();

        let account = store.get("u1").await.unwrap();
        let acc = account.lock().await;
        assert_eq!(acc.today_xp, 0);
        assert_eq!(acc.total_xp, 1500);
        assert_eq!(acc.current_level, 2);

        drop(acc);
        assert!(matches!(
            store.reset_today("ghost").await,
            Err(AccountError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn snapshots_are_sorted_by_uid() {
        let store = AccountStore::new(5);
        store.add("b", secret(), "").await.unwrap();
        store.add("a", secret(), "").await.unwrap();
        let snaps = store.snapshots().await;
        let uids: Vec<&str> = snaps.iter().map(|s| s.uid.as_str()).collect();
        assert_eq!(uids, vec!["a", "b"]);
    }
}
