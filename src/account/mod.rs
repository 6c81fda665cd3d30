//! Account entities and the in-memory registry.

mod store;

pub use store::AccountStore;

use secrecy::SecretString;
use serde::Serialize;

use crate::progress::level_from_xp;

/// One automated identity tracked by the supervisor.
///
/// Runtime fields (`online`, `matchmaking`, `running`, XP counters)
/// are mutated by the account's own loop; `Stop`, `ResetToday` and
/// `Remove` are the only external writers.
#[derive(Debug, Clone)]
pub struct Account {
    pub uid: String,
    /// Opaque credential forwarded to the gateway. Never serialized
    /// or logged.
    pub credential: SecretString,
    pub display_name: String,
    pub online: bool,
    pub matchmaking: bool,
    pub running: bool,
    pub current_level: u32,
    pub target_level: Option<u32>,
    pub today_xp: u64,
    pub total_xp: u64,
}

impl Account {
    /// Create a freshly registered account, offline and at level 1.
    pub fn new(uid: impl Into<String>, credential: SecretString, display_name: &str) -> Self {
        let uid = uid.into();
        let display_name = if display_name.is_empty() {
            let tail = &uid[uid.len().saturating_sub(4)..];
            format!("User {}", tail)
        } else {
            display_name.to_string()
        };
        Self {
            uid,
            credential,
            display_name,
            online: false,
            matchmaking: false,
            running: false,
            current_level: 1,
            target_level: None,
            today_xp: 0,
            total_xp: 0,
        }
    }

    /// Credit gained XP and re-derive the level.
    pub fn apply_gain(&mut self, gained_xp: u64) {
        self.today_xp += gained_xp;
        self.total_xp += gained_xp;
        self.current_level = level_from_xp(self.total_xp);
    }

    /// True once the configured target level has been reached.
    pub fn target_reached(&self) -> bool {
        match self.target_level {
            Some(target) => self.current_level >= target,
            None => false,
        }
    }

    /// Observable state of the account, minus the credential.
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            uid: self.uid.clone(),
            display_name: self.display_name.clone(),
            online: self.online,
            matchmaking: self.matchmaking,
            running: self.running,
            current_level: self.current_level,
            target_level: self.target_level,
            today_xp: self.today_xp,
            total_xp: self.total_xp,
        }
    }
}

/// What `List` returns to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub uid: String,
    pub display_name: String,
    pub online: bool,
    pub matchmaking: bool,
    pub running: bool,
    pub current_level: u32,
    pub target_level: Option<u32>,
    pub today_xp: u64,
    pub total_xp: u64,
}
