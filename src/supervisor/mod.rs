//! Per-account task supervision.
//!
//! The supervisor owns at most one running loop per account. A loop
//! repeatedly submits work to the gateway, waits out the cycle period,
//! polls the outcome, credits the gained XP, and re-evaluates whether
//! to continue. Stopping is a hard interrupt: every suspension point
//! races against the run's cancellation token, so a stop lands even
//! while the loop is parked inside a gateway call or a timed wait.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::account::{Account, AccountSnapshot, AccountStore};
use crate::config::SupervisorConfig;
use crate::error::AccountError;
use crate::gateway::GatewayClient;

/// Cancellable handle to one running account loop.
///
/// Removed from the map once its loop exits, so "no entry or entry
/// finished" is the sole witness of idle state.
struct TaskHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// What `start` reports back to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A fresh loop was spawned.
    Started,
    /// A loop was already active; nothing was spawned.
    AlreadyRunning,
}

/// Internal phase of the account loop.
///
/// The `online`/`matchmaking`/`running` booleans on the account mirror
/// this for observability; the loop itself is driven by the enum so
/// impossible flag combinations cannot arise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Queuing,
    Waiting,
    Evaluating,
    Stopped(ExitReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    SubmitFailed,
    TargetReached,
    Stopped,
    Cancelled,
}

/// Supervises one loop per account.
pub struct TaskSupervisor {
    store: Arc<AccountStore>,
    gateway: Arc<dyn GatewayClient>,
    config: SupervisorConfig,
    handles: Mutex<HashMap<String, TaskHandle>>,
}

impl TaskSupervisor {
    /// Create a supervisor over the given registry and gateway.
    pub fn new(
        store: Arc<AccountStore>,
        gateway: Arc<dyn GatewayClient>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Start the account's loop.
    ///
    /// Validates and applies `target_level` first; an invalid value
    /// leaves the prior target untouched. Starting an account whose
    /// loop is still active is a no-op reported as `AlreadyRunning`.
    pub async fn start(
        self: &Arc<Self>,
        uid: &str,
        target_level: Option<i64>,
    ) -> Result<StartOutcome, AccountError> {
        let account = self.store.get(uid).await?;

        if let Some(value) = target_level {
            let target = u32::try_from(value)
                .ok()
                .filter(|t| *t >= 1)
                .ok_or(AccountError::InvalidTargetLevel { value })?;
            account.lock().await.target_level = Some(target);
        }

        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(uid) {
            if !handle.join.is_finished() {
                tracing::debug!(uid = %uid, "Start requested but loop already active");
                return Ok(StartOutcome::AlreadyRunning);
            }
        }

        account.lock().await.running = true;

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let join = tokio::spawn(Arc::clone(self).run_loop(
            uid.to_string(),
            Arc::clone(&account),
            cancel.clone(),
            run_id,
        ));
        handles.insert(
            uid.to_string(),
            TaskHandle {
                run_id,
                cancel,
                join,
            },
        );

        tracing::info!(uid = %uid, run_id = %run_id, "Started account loop");
        Ok(StartOutcome::Started)
    }

    /// Stop the account's loop.
    ///
    /// Clears `running` and cancels the handle if one is still live.
    /// Idempotent: stopping an idle account succeeds without effect.
    pub async fn stop(&self, uid: &str) -> Result<(), AccountError> {
        let account = self.store.get(uid).await?;
        account.lock().await.running = false;

        let handles = self.handles.lock().await;
        if let Some(handle) = handles.get(uid) {
            if !handle.join.is_finished() {
                tracing::info!(uid = %uid, run_id = %handle.run_id, "Stopping account loop");
                handle.cancel.cancel();
            }
        }
        Ok(())
    }

    /// Reset the account's daily XP counter.
    pub async fn reset_today(&self, uid: &str) -> Result<(), AccountError> {
        self.store.reset_today(uid).await
    }

    /// Snapshot every account's observable state.
    pub async fn list(&self) -> Vec<AccountSnapshot> {
        self.store.snapshots().await
    }

    /// Stop the account's loop, release its handle, and drop the
    /// account from the registry.
    pub async fn remove_account(&self, uid: &str) -> Result<(), AccountError> {
        self.stop(uid).await?;
        self.handles.lock().await.remove(uid);
        self.store.remove(uid).await?;
        tracing::info!(uid = %uid, "Removed account");
        Ok(())
    }

    /// True while the account has a live loop.
    pub async fn is_active(&self, uid: &str) -> bool {
        let handles = self.handles.lock().await;
        handles
            .get(uid)
            .map(|handle| !handle.join.is_finished())
            .unwrap_or(false)
    }

    /// The recurring submit -> wait -> poll -> update cycle.
    async fn run_loop(
        self: Arc<Self>,
        uid: String,
        account: Arc<Mutex<Account>>,
        cancel: CancellationToken,
        run_id: Uuid,
    ) {
        let mut phase = Phase::Queuing;
        loop {
            phase = match phase {
                Phase::Queuing => self.enter_queuing(&uid, &account, &cancel).await,
                Phase::Waiting => self.enter_waiting(&cancel).await,
                Phase::Evaluating => self.enter_evaluating(&uid, &account, &cancel).await,
                Phase::Stopped(reason) => {
                    self.finish_run(&uid, &account, run_id, reason).await;
                    return;
                }
            };
        }
    }

    /// Submit work. A failed submission ends the run; it is not retried.
    async fn enter_queuing(
        &self,
        uid: &str,
        account: &Arc<Mutex<Account>>,
        cancel: &CancellationToken,
    ) -> Phase {
        let (credential, target_level): (SecretString, Option<u32>) = {
            let mut acc = account.lock().await;
            if !acc.running {
                return Phase::Stopped(ExitReason::Stopped);
            }
            acc.online = true;
            acc.matchmaking = true;
            (acc.credential.clone(), acc.target_level)
        };

        let submit = self.gateway.start_work(uid, &credential, target_level);
        tokio::select! {
            _ = cancel.cancelled() => Phase::Stopped(ExitReason::Cancelled),
            result = submit => match result {
                Ok(()) => Phase::Waiting,
                Err(e) => {
                    tracing::warn!(uid = %uid, error = %e, "Work submission failed, ending run");
                    let mut acc = account.lock().await;
                    acc.matchmaking = false;
                    acc.running = false;
                    Phase::Stopped(ExitReason::SubmitFailed)
                }
            },
        }
    }

    /// Sit out the cycle period. No shared state is touched here.
    async fn enter_waiting(&self, cancel: &CancellationToken) -> Phase {
        tokio::select! {
            _ = cancel.cancelled() => Phase::Stopped(ExitReason::Cancelled),
            _ = tokio::time::sleep(self.config.cycle_wait) => Phase::Evaluating,
        }
    }

    /// Poll the outcome and credit it. A failed poll contributes zero
    /// XP for the cycle and the run continues.
    async fn enter_evaluating(
        &self,
        uid: &str,
        account: &Arc<Mutex<Account>>,
        cancel: &CancellationToken,
    ) -> Phase {
        let poll = self.gateway.poll_outcome(uid);
        let gained_xp = tokio::select! {
            _ = cancel.cancelled() => return Phase::Stopped(ExitReason::Cancelled),
            result = poll => match result {
                Ok(outcome) => outcome.gained_xp,
                Err(e) => {
                    tracing::warn!(uid = %uid, error = %e, "Poll failed, counting zero XP this cycle");
                    0
                }
            },
        };

        {
            let mut acc = account.lock().await;
            acc.apply_gain(gained_xp);
            acc.matchmaking = false;
            tracing::debug!(
                uid = %uid,
                gained_xp,
                total_xp = acc.total_xp,
                level = acc.current_level,
                "Cycle complete"
            );

            if acc.target_reached() {
                acc.running = false;
                return Phase::Stopped(ExitReason::TargetReached);
            }
            if !acc.running {
                return Phase::Stopped(ExitReason::Stopped);
            }
        }

        // Brief yield before the next cycle.
        tokio::select! {
            _ = cancel.cancelled() => Phase::Stopped(ExitReason::Cancelled),
            _ = tokio::time::sleep(self.config.yield_wait) => Phase::Queuing,
        }
    }

    /// Settle the account's flags and release the handle.
    ///
    /// `matchmaking` is always cleared; `online` is deliberately left
    /// as-is, matching the long-observed behavior that a stopped
    /// account still reads as online.
    async fn finish_run(
        &self,
        uid: &str,
        account: &Arc<Mutex<Account>>,
        run_id: Uuid,
        reason: ExitReason,
    ) {
        {
            let mut acc = account.lock().await;
            acc.matchmaking = false;
            if reason != ExitReason::Cancelled {
                // A cancelled run had `running` cleared by `stop`;
                // every other exit settles it here.
                acc.running = false;
            }
        }

        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(uid) {
            if handle.run_id == run_id {
                handles.remove(uid);
            }
        }
        tracing::info!(uid = %uid, run_id = %run_id, ?reason, "Account loop exited");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::WorkOutcome;

    /// Gateway whose behavior the test scripts up front.
    struct ScriptedGateway {
        fail_submit: AtomicBool,
        fail_poll: AtomicBool,
        gained_xp: u64,
        submits: AtomicUsize,
        polls: AtomicUsize,
    }

    impl ScriptedGateway {
        fn new(gained_xp: u64) -> Self {
            Self {
                fail_submit: AtomicBool::new(false),
                fail_poll: AtomicBool::new(false),
                gained_xp,
                submits: AtomicUsize::new(0),
                polls: AtomicUsize::new(0),
            }
        }

        fn failing_submit(self) -> Self {
            self.fail_submit.store(true, Ordering::SeqCst);
            self
        }

        fn failing_poll(self) -> Self {
            self.fail_poll.store(true, Ordering::SeqCst);
            self
        }

        fn error() -> GatewayError {
            GatewayError::BadStatus {
                status: 503,
                body: "unavailable".to_string(),
            }
        }
    }

    #[async_trait]
    impl GatewayClient for ScriptedGateway {
        async fn start_work(
            &self,
            _uid: &str,
            _credential: &SecretString,
            _target_level: Option<u32>,
        ) -> Result<(), GatewayError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            if self.fail_submit.load(Ordering::SeqCst) {
                return Err(Self::error());
            }
            Ok(())
        }

        async fn poll_outcome(&self, _uid: &str) -> Result<WorkOutcome, GatewayError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail_poll.load(Ordering::SeqCst) {
                return Err(Self::error());
            }
            Ok(WorkOutcome {
                gained_xp: self.gained_xp,
            })
        }
    }

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            cycle_wait: Duration::from_millis(5),
            yield_wait: Duration::from_millis(1),
        }
    }

    async fn setup(
        gateway: ScriptedGateway,
        config: SupervisorConfig,
    ) -> (Arc<TaskSupervisor>, Arc<ScriptedGateway>) {
        let store = Arc::new(AccountStore::new(20));
        store
            .add("u1", SecretString::from("tok"), "Test")
            .await
            .unwrap();
        let gateway = Arc::new(gateway);
        let supervisor = Arc::new(TaskSupervisor::new(
            store,
            Arc::clone(&gateway) as Arc<dyn GatewayClient>,
            config,
        ));
        (supervisor, gateway)
    }

    /// Poll until `cond` holds, or panic after two seconds.
    async fn wait_until<F, Fut>(mut cond: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if cond().await {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached within 2s");
    }

    async fn snapshot(supervisor: &TaskSupervisor, uid: &str) -> AccountSnapshot {
        supervisor
            .list()
            .await
            .into_iter()
            .find(|s| s.uid == uid)
            .expect("account missing")
    }

    #[tokio::test]
    async fn run_until_target_reached() {
        let (supervisor, gateway) = setup(ScriptedGateway::new(1000), fast_config()).await;

        supervisor.start("u1", Some(2)).await.unwrap();
        wait_until(|| async { !snapshot(&supervisor, "u1").await.running }).await;

        let snap = snapshot(&supervisor, "u1").await;
        assert_eq!(snap.total_xp, 1000);
        assert_eq!(snap.today_xp, 1000);
        assert_eq!(snap.current_level, 2);
        assert!(!snap.running);
        assert!(!snap.matchmaking);
        assert!(snap.online);

        // One full cycle: one submission, one poll, then silence.
        wait_until(|| async { !supervisor.is_active("u1").await }).await;
        let submits = gateway.submits.load(Ordering::SeqCst);
        let polls = gateway.polls.load(Ordering::SeqCst);
        assert_eq!(submits, 1);
        assert_eq!(polls, 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(gateway.submits.load(Ordering::SeqCst), submits);
        assert_eq!(gateway.polls.load(Ordering::SeqCst), polls);
    }

    #[tokio::test]
    async fn submission_failure_ends_run() {
        let (supervisor, gateway) =
            setup(ScriptedGateway::new(1000).failing_submit(), fast_config()).await;

        supervisor.start("u1", None).await.unwrap();
        wait_until(|| async { !supervisor.is_active("u1").await }).await;

        let snap = snapshot(&supervisor, "u1").await;
        assert!(!snap.running);
        assert!(!snap.matchmaking);
        assert!(snap.online);
        assert_eq!(snap.total_xp, 0);
        assert_eq!(gateway.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn poll_failure_counts_zero_and_continues() {
        let (supervisor, gateway) =
            setup(ScriptedGateway::new(1000).failing_poll(), fast_config()).await;

        supervisor.start("u1", Some(2)).await.unwrap();
        wait_until(|| async { gateway.polls.load(Ordering::SeqCst) >= 2 }).await;

        let snap = snapshot(&supervisor, "u1").await;
        assert_eq!(snap.total_xp, 0);
        assert_eq!(snap.current_level, 1);
        assert!(snap.running);

        supervisor.stop("u1").await.unwrap();
        wait_until(|| async { !supervisor.is_active("u1").await }).await;
    }

    #[tokio::test]
    async fn start_is_idempotent_while_active() {
        let slow = SupervisorConfig {
            cycle_wait: Duration::from_secs(30),
            yield_wait: Duration::from_millis(1),
        };
        let (supervisor, gateway) = setup(ScriptedGateway::new(100), slow).await;

        assert_eq!(
            supervisor.start("u1", None).await.unwrap(),
            StartOutcome::Started
        );
        assert_eq!(
            supervisor.start("u1", None).await.unwrap(),
            StartOutcome::AlreadyRunning
        );

        wait_until(|| async { gateway.submits.load(Ordering::SeqCst) >= 1 }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        // A second loop would have submitted a second time by now.
        assert_eq!(gateway.submits.load(Ordering::SeqCst), 1);

        supervisor.stop("u1").await.unwrap();
        wait_until(|| async { !supervisor.is_active("u1").await }).await;
    }

    #[tokio::test]
    async fn stop_interrupts_the_cycle_wait() {
        let slow = SupervisorConfig {
            cycle_wait: Duration::from_secs(30),
            yield_wait: Duration::from_millis(1),
        };
        let (supervisor, gateway) = setup(ScriptedGateway::new(100), slow).await;

        supervisor.start("u1", None).await.unwrap();
        wait_until(|| async { gateway.submits.load(Ordering::SeqCst) >= 1 }).await;

        // The loop is now parked in its 30s wait; stop must not have
        // to sit it out.
        supervisor.stop("u1").await.unwrap();
        wait_until(|| async { !supervisor.is_active("u1").await }).await;

        let snap = snapshot(&supervisor, "u1").await;
        assert!(!snap.running);
        assert!(!snap.matchmaking);
        // Pinned quirk: the account still reads as online after a stop.
        assert!(snap.online);
        assert_eq!(gateway.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_checks_existence() {
        let (supervisor, _gateway) = setup(ScriptedGateway::new(100), fast_config()).await;

        // Never-started account: no-op success.
        supervisor.stop("u1").await.unwrap();
        supervisor.stop("u1").await.unwrap();

        assert!(matches!(
            supervisor.stop("ghost").await,
            Err(AccountError::NotFound { .. })
        ));
        assert!(matches!(
            supervisor.start("ghost", None).await,
            Err(AccountError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_target_leaves_prior_target_and_spawns_nothing() {
        let (supervisor, gateway) = setup(ScriptedGateway::new(100), fast_config()).await;

        let account = supervisor.store.get("u1").await.unwrap();
        account.lock().await.target_level = Some(5);

        assert!(matches!(
            supervisor.start("u1", Some(0)).await,
            Err(AccountError::InvalidTargetLevel { value: 0 })
        ));
        assert!(matches!(
            supervisor.start("u1", Some(-3)).await,
            Err(AccountError::InvalidTargetLevel { value: -3 })
        ));

        assert_eq!(account.lock().await.target_level, Some(5));
        assert!(!supervisor.is_active("u1").await);
        assert_eq!(gateway.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restart_after_natural_exit() {
        let (supervisor, gateway) = setup(ScriptedGateway::new(1000), fast_config()).await;

        supervisor.start("u1", Some(2)).await.unwrap();
        wait_until(|| async { !supervisor.is_active("u1").await }).await;

        // Target met; raise it and start again.
        assert_eq!(
            supervisor.start("u1", Some(3)).await.unwrap(),
            StartOutcome::Started
        );
        wait_until(|| async { !supervisor.is_active("u1").await }).await;

        let snap = snapshot(&supervisor, "u1").await;
        assert_eq!(snap.total_xp, 2000);
        assert_eq!(snap.current_level, 3);
        assert!(gateway.submits.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn remove_stops_loop_and_releases_everything() {
        let slow = SupervisorConfig {
            cycle_wait: Duration::from_secs(30),
            yield_wait: Duration::from_millis(1),
        };
        let (supervisor, gateway) = setup(ScriptedGateway::new(100), slow).await;

        supervisor.start("u1", None).await.unwrap();
        wait_until(|| async { gateway.submits.load(Ordering::SeqCst) >= 1 }).await;

        supervisor.remove_account("u1").await.unwrap();
        assert!(supervisor.list().await.is_empty());
        assert!(!supervisor.is_active("u1").await);
        assert!(matches!(
            supervisor.remove_account("u1").await,
            Err(AccountError::NotFound { .. })
        ));
    }
}
