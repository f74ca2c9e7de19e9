//! Crash detection, recovery and rollback of SATP sessions.
//!
//! ## Crash status
//!
//! | Latest log row | Status |
//! |----------------|--------|
//! | missing, or the log fails | `ERROR` |
//! | operation is not `done` | `IN_RECOVERY` |
//! | `done`, older than the session's `maxTimeout` | `IN_ROLLBACK` |
//! | `done`, recent | `IDLE` |
//!
//! ## Concurrency
//!
//! Each tracked session sits behind its own async mutex. Recovery, rollback
//! and the stage handlers all take that lock, so one session never sees a
//! rollback and forward progress at the same time. The health-check scheduler
//! holds a weak reference and stops once the manager is dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use ed25519_dalek::SigningKey;
use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::counterparty::CounterpartyGateway;
use super::error::RecoveryError;
use super::messages::{
    message_hash, public_key_hex, sign_message, verify_message, RecoverMessage, RecoverSuccessMessage,
    RecoverUpdateMessage, RollbackAckMessage, RollbackMessage, RECOVER_MESSAGE_TYPE,
    RECOVER_SUCCESS_MESSAGE_TYPE, RECOVER_UPDATE_MESSAGE_TYPE, ROLLBACK_ACK_MESSAGE_TYPE,
    ROLLBACK_MESSAGE_TYPE,
};
use super::rollback::{RollbackState, RollbackStatus, RollbackStrategyFactory};
use crate::bridge::BridgeManager;
use crate::session::{SatpSession, SessionData, SessionRole, State};
use crate::store::{LocalLog, LogRepository, DONE_OPERATION};
use crate::telemetry::SpanScope;

const CLASS_NAME: &str = "CrashManager";

/// Default period of the health-check scheduler.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Result of inspecting one session's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashStatus {
    /// Nothing to do.
    Idle,
    /// The last step never finished; fetch the missing rows.
    InRecovery,
    /// The session went quiet for too long; compensate.
    InRollback,
    /// The log could not be read.
    Error,
}

impl std::fmt::Display for CrashStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::InRecovery => write!(f, "IN_RECOVERY"),
            Self::InRollback => write!(f, "IN_ROLLBACK"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Running,
    Paused,
    Stopped,
}

/// Construction options for [`CrashManager`].
pub struct CrashManagerOptions<R> {
    /// Recovery log.
    pub log_repository: Arc<R>,
    /// Leaves used for compensating calls.
    pub bridge_manager: Arc<BridgeManager>,
    /// Other gateway.
    pub counterparty: Arc<dyn CounterpartyGateway>,
    /// Key this gateway signs recovery messages with.
    pub signing_key: SigningKey,
    /// Period of the health-check scheduler.
    pub health_check_interval: Duration,
}

impl<R> CrashManagerOptions<R> {
    /// Options with the default health-check interval.
    pub fn new(
        log_repository: Arc<R>,
        bridge_manager: Arc<BridgeManager>,
        counterparty: Arc<dyn CounterpartyGateway>,
        signing_key: SigningKey,
    ) -> Self {
        Self {
            log_repository,
            bridge_manager,
            counterparty,
            signing_key,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
        }
    }
}

/// Tracks sessions, detects crashes, and recovers or rolls back.
pub struct CrashManager<R: LogRepository> {
    sessions: RwLock<BTreeMap<String, Arc<Mutex<SatpSession>>>>,
    log_repository: Arc<R>,
    counterparty: Arc<dyn CounterpartyGateway>,
    signing_key: SigningKey,
    factory: RollbackStrategyFactory,
    health_check_interval: Duration,
    scheduler_state: watch::Sender<SchedulerState>,
    scheduler: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<R: LogRepository + 'static> CrashManager<R> {
    /// Build a manager with no tracked sessions and no scheduler running.
    pub fn new(options: CrashManagerOptions<R>) -> Self {
        let (scheduler_state, _) = watch::channel(SchedulerState::Stopped);
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            log_repository: options.log_repository,
            counterparty: options.counterparty,
            signing_key: options.signing_key,
            factory: RollbackStrategyFactory::new(options.bridge_manager),
            health_check_interval: options.health_check_interval,
            scheduler_state,
            scheduler: parking_lot::Mutex::new(None),
        }
    }

    /// Hex public key of this gateway.
    pub fn public_key(&self) -> String {
        public_key_hex(&self.signing_key)
    }

    /// The recovery log.
    pub fn log_repository(&self) -> &Arc<R> {
        &self.log_repository
    }

    /// Track `session`, replacing any session with the same id.
    pub fn insert_session(&self, session: SatpSession) -> Arc<Mutex<SatpSession>> {
        let id = session.session_id().to_string();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().insert(id, handle.clone());
        handle
    }

    /// Tracked session by id.
    pub fn session(&self, session_id: &str) -> Option<Arc<Mutex<SatpSession>>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Ids of every tracked session.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    fn session_or_err(&self, context: &str, session_id: &str) -> Result<Arc<Mutex<SatpSession>>, RecoveryError> {
        self.session(session_id).ok_or_else(|| RecoveryError::SessionNotFound {
            context: context.to_string(),
            session_id: session_id.to_string(),
        })
    }

    /// Rebuild sessions from the log after a restart, then check each one.
    ///
    /// Returns the number of sessions restored.
    pub async fn recover_sessions(&self) -> Result<usize, RecoveryError> {
        let fn_tag = format!("{CLASS_NAME}#recoverSessions");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let logs = self
                    .log_repository
                    .read_logs_not_proofs()
                    .await
                    .map_err(|e| RecoveryError::repository(&fn_tag, e))?;
                if logs.is_empty() {
                    tracing::debug!("no logs to recover from");
                    return Ok(0);
                }

                // Rows come in log order, so the last row per (session, role) wins.
                // Rows copied from the counterparty during recovery are skipped.
                let own_key = self.public_key();
                let mut latest: BTreeMap<(String, String), SessionData> = BTreeMap::new();
                for log in &logs {
                    let data: SessionData = serde_json::from_str(&log.data)
                        .map_err(|e| RecoveryError::serialization(&fn_tag, e))?;
                    if !is_own_data(&data, &own_key) {
                        continue;
                    }
                    latest.insert((log.session_id.clone(), data.role.to_string()), data);
                }

                let mut restored: BTreeMap<String, SatpSession> = BTreeMap::new();
                for ((session_id, _), data) in latest {
                    match restored.get_mut(&session_id) {
                        Some(session) => session.restore_session_data(data)?,
                        None => {
                            restored.insert(session_id, SatpSession::recreate_session(data)?);
                        }
                    }
                }

                let count = restored.len();
                let handles: Vec<_> = restored
                    .into_values()
                    .map(|session| self.insert_session(session))
                    .collect();
                tracing::info!(sessions = count, "sessions restored from log");

                for handle in handles {
                    let mut session = handle.lock().await;
                    if let Err(err) = self.check_and_resolve_crash(&mut session).await {
                        tracing::warn!(session_id = session.session_id(), error = %err, "crash resolution failed");
                    }
                }
                Ok(count)
            })
            .await
    }

    /// Inspect the latest log row of `data`'s session.
    pub async fn check_crash(&self, data: &SessionData) -> CrashStatus {
        let latest = match self.log_repository.read_latest_log(&data.id).await {
            Ok(Some(log)) => log,
            Ok(None) => {
                tracing::debug!(session_id = %data.id, "no log for session");
                return CrashStatus::Error;
            }
            Err(err) => {
                tracing::warn!(session_id = %data.id, error = %err, "log read failed");
                return CrashStatus::Error;
            }
        };

        if latest.operation != DONE_OPERATION {
            return CrashStatus::InRecovery;
        }
        // A transfer that exchanged every message has nothing left to time out.
        if data.crashed_stage().is_none() {
            tracing::debug!(session_id = %data.id, "every stage complete");
            return CrashStatus::Idle;
        }
        let Some(timestamp) = latest.timestamp_millis() else {
            tracing::warn!(session_id = %data.id, timestamp = %latest.timestamp, "malformed log timestamp");
            return CrashStatus::Error;
        };
        let elapsed = chrono::Utc::now().timestamp_millis().saturating_sub(timestamp);
        if elapsed > i64::try_from(data.max_timeout).unwrap_or(i64::MAX) {
            CrashStatus::InRollback
        } else {
            CrashStatus::Idle
        }
    }

    /// Check every tracked session in turn.
    pub async fn check_and_resolve_crashes(&self) {
        let handles: Vec<_> = self.sessions.read().values().cloned().collect();
        for handle in handles {
            let mut session = handle.lock().await;
            if let Err(err) = self.check_and_resolve_crash(&mut session).await {
                tracing::warn!(session_id = session.session_id(), error = %err, "crash resolution failed");
            }
        }
    }

    /// Detect and resolve a crash for each role of `session`.
    ///
    /// Recovery is retried up to the session's `maxRetries` (at least once);
    /// when every attempt fails the session is rolled back.
    pub async fn check_and_resolve_crash(&self, session: &mut SatpSession) -> Result<(), RecoveryError> {
        let fn_tag = format!("{CLASS_NAME}#checkAndResolveCrash");
        SpanScope::start(fn_tag)
            .run(async {
                let roles: Vec<SessionRole> = session.all_session_data().map(|d| d.role).collect();
                for role in roles {
                    self.resolve_role(session, role).await?;
                }
                Ok::<_, RecoveryError>(())
            })
            .await
    }

    async fn resolve_role(&self, session: &mut SatpSession, role: SessionRole) -> Result<(), RecoveryError> {
        let max_retries = session.session_data(role)?.max_retries.max(1);
        let mut attempts = 0;
        while attempts < max_retries {
            let data = session.session_data(role)?.clone();
            let status = self.check_crash(&data).await;
            tracing::debug!(session_id = %data.id, role = %role, status = %status, attempts, "crash check");
            match status {
                CrashStatus::InRecovery => {
                    self.pause_scheduler();
                    session.session_data_mut(role)?.state = State::Recovering;
                    let recovered = match self.handle_recovery(session, role).await {
                        Ok(recovered) => recovered,
                        Err(err) => {
                            tracing::warn!(session_id = %data.id, error = %err, "recovery attempt failed");
                            false
                        }
                    };
                    self.resume_scheduler();
                    if recovered {
                        session.session_data_mut(role)?.state = State::Recovered;
                        tracing::info!(session_id = %data.id, role = %role, "session recovered");
                        return Ok(());
                    }
                    attempts += 1;
                }
                CrashStatus::InRollback => {
                    self.pause_scheduler();
                    let rolled_back = self.initiate_rollback(session, role, true).await;
                    self.resume_scheduler();
                    tracing::info!(session_id = %data.id, role = %role, rolled_back, "rollback after timeout");
                    return Ok(());
                }
                CrashStatus::Idle | CrashStatus::Error => return Ok(()),
            }
        }

        tracing::warn!(session_id = session.session_id(), role = %role, attempts, "recovery retries exhausted");
        self.pause_scheduler();
        let rolled_back = self.initiate_rollback(session, role, true).await;
        self.resume_scheduler();
        tracing::info!(session_id = session.session_id(), role = %role, rolled_back, "rollback after failed recovery");
        Ok(())
    }

    /// Fetch the rows the counterparty holds beyond ours, apply them, and
    /// acknowledge.
    pub async fn handle_recovery(&self, session: &mut SatpSession, role: SessionRole) -> Result<bool, RecoveryError> {
        let fn_tag = format!("{CLASS_NAME}#handleRecovery");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let data = session.session_data(role)?.clone();
                let latest = self
                    .log_repository
                    .read_latest_log(&data.id)
                    .await
                    .map_err(|e| RecoveryError::repository(&fn_tag, e))?;

                let mut request = RecoverMessage {
                    session_id: data.id.clone(),
                    message_type: RECOVER_MESSAGE_TYPE.to_string(),
                    satp_phase: data.actual_stage().0.to_string(),
                    sequence_number: data.last_sequence_number,
                    is_backup: false,
                    new_identity_public_key: String::new(),
                    last_entry_timestamp: latest.map(|l| l.timestamp).unwrap_or_default(),
                    sender_signature: String::new(),
                };
                sign_message(&mut request, &self.signing_key)?;

                let update = self.counterparty.recover(request).await?;
                verify_message(&update, data.counterparty_pubkey())?;

                let mut entries_changed = Vec::new();
                let mut merged = data.clone();
                for log in &update.recovered_logs {
                    let exists = self
                        .log_repository
                        .read_by_id(&log.key)
                        .await
                        .map_err(|e| RecoveryError::repository(&fn_tag, e))?
                        .is_some();
                    if !exists {
                        self.log_repository
                            .create(log.clone())
                            .await
                            .map_err(|e| RecoveryError::repository(&fn_tag, e))?;
                        entries_changed.push(log.key.clone());
                    }
                    let remote: SessionData = serde_json::from_str(&log.data)
                        .map_err(|e| RecoveryError::serialization(&fn_tag, e))?;
                    merged.hashes.merge_from(&remote.hashes);
                    merged.processed_timestamps.merge_from(&remote.processed_timestamps);
                    merged.signatures.merge_from(&remote.signatures);
                    merged.last_sequence_number = merged.last_sequence_number.max(log.sequence_number);
                }
                session.restore_session_data(merged)?;
                tracing::info!(
                    session_id = %data.id,
                    recovered = update.recovered_logs.len(),
                    added = entries_changed.len(),
                    "recovered logs applied"
                );

                let mut success = RecoverSuccessMessage {
                    session_id: data.id.clone(),
                    message_type: RECOVER_SUCCESS_MESSAGE_TYPE.to_string(),
                    hash_recover_update_message: message_hash(&update),
                    success: true,
                    entries_changed,
                    sender_signature: String::new(),
                };
                sign_message(&mut success, &self.signing_key)?;
                self.counterparty.recover_success(success).await?;
                Ok(true)
            })
            .await
    }

    /// Compensate this gateway's ledger effects for `role` of `session`.
    ///
    /// A non-forced call is a no-op returning `true`. Otherwise the result
    /// is `true` only when the strategy completed, cleanup ran, and the
    /// counterparty acknowledged the rollback. Failures are logged and yield
    /// `false`; the session then needs manual intervention.
    pub async fn initiate_rollback(&self, session: &mut SatpSession, role: SessionRole, force: bool) -> bool {
        if !force {
            tracing::debug!(session_id = session.session_id(), "rollback not forced, skipping");
            return true;
        }
        let fn_tag = format!("{CLASS_NAME}#initiateRollback");
        let result = SpanScope::start(fn_tag)
            .run(async {
                let state = self.rollback_locally(session, role).await?;
                if state.status != RollbackStatus::Completed {
                    tracing::warn!(
                        session_id = session.session_id(),
                        status = %state.status,
                        details = %state.details,
                        "rollback did not complete"
                    );
                    return Ok(false);
                }
                let data = session.session_data(role)?.clone();
                let ack = self.send_rollback_message(&data, &state).await?;
                Ok::<_, RecoveryError>(ack.success)
            })
            .await;
        match result {
            Ok(done) => done,
            Err(err) => {
                tracing::error!(session_id = session.session_id(), error = %err, "rollback failed");
                false
            }
        }
    }

    async fn rollback_locally(&self, session: &mut SatpSession, role: SessionRole) -> Result<RollbackState, RecoveryError> {
        let data = session.session_data(role)?.clone();
        let strategy = self.factory.create(&data);
        let state = strategy.execute(&data).await?;
        if state.status == RollbackStatus::Completed && !strategy.cleanup(session, role, &state).await? {
            return Err(RecoveryError::Rollback {
                context: format!("{CLASS_NAME}#cleanup"),
                reason: format!("cleanup of session {} did nothing", data.id),
            });
        }
        Ok(state)
    }

    async fn send_rollback_message(
        &self,
        data: &SessionData,
        state: &RollbackState,
    ) -> Result<RollbackAckMessage, RecoveryError> {
        let mut message = RollbackMessage {
            session_id: data.id.clone(),
            message_type: ROLLBACK_MESSAGE_TYPE.to_string(),
            success: state.status == RollbackStatus::Completed,
            actions_performed: state.actions_performed(),
            proofs: state.proofs(),
            sender_signature: String::new(),
        };
        sign_message(&mut message, &self.signing_key)?;
        let ack = self.counterparty.rollback(message).await?;
        verify_message(&ack, data.counterparty_pubkey())?;
        Ok(ack)
    }

    /// Answer a counterparty's recover request with the rows it is missing.
    pub async fn handle_recover_request(&self, request: RecoverMessage) -> Result<RecoverUpdateMessage, RecoveryError> {
        let fn_tag = format!("{CLASS_NAME}#handleRecoverMessage");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let handle = self.session_or_err(&fn_tag, &request.session_id)?;
                let session = handle.lock().await;
                self.verify_from_counterparty(&session, &request)?;

                let recovered_logs = self
                    .log_repository
                    .read_logs_more_recent_than(&request.session_id, request.sequence_number)
                    .await
                    .map_err(|e| RecoveryError::repository(&fn_tag, e))?;
                let mut update = RecoverUpdateMessage {
                    session_id: request.session_id.clone(),
                    message_type: RECOVER_UPDATE_MESSAGE_TYPE.to_string(),
                    hash_recover_message: message_hash(&request),
                    recovered_logs,
                    sender_signature: String::new(),
                };
                sign_message(&mut update, &self.signing_key)?;
                Ok(update)
            })
            .await
    }

    /// Accept a counterparty's recover-success acknowledgement.
    pub async fn handle_recover_success(&self, message: RecoverSuccessMessage) -> Result<(), RecoveryError> {
        let fn_tag = format!("{CLASS_NAME}#handleRecoverSuccessMessage");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let handle = self.session_or_err(&fn_tag, &message.session_id)?;
                let session = handle.lock().await;
                self.verify_from_counterparty(&session, &message)?;
                tracing::info!(
                    session_id = %message.session_id,
                    success = message.success,
                    entries_changed = message.entries_changed.len(),
                    "counterparty recovered"
                );
                Ok(())
            })
            .await
    }

    /// Roll back this gateway's side after the counterparty rolled back its own.
    pub async fn handle_rollback_request(&self, message: RollbackMessage) -> Result<RollbackAckMessage, RecoveryError> {
        let fn_tag = format!("{CLASS_NAME}#handleRollbackMessage");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let handle = self.session_or_err(&fn_tag, &message.session_id)?;
                let mut session = handle.lock().await;
                self.verify_from_counterparty(&session, &message)?;

                let roles: Vec<SessionRole> = session.all_session_data().map(|d| d.role).collect();
                let mut success = true;
                for role in roles {
                    if session.session_data(role)?.state == State::Rejected {
                        continue;
                    }
                    match self.rollback_locally(&mut session, role).await {
                        Ok(state) => success &= state.status == RollbackStatus::Completed,
                        Err(err) => {
                            tracing::warn!(session_id = %message.session_id, role = %role, error = %err, "local rollback failed");
                            success = false;
                        }
                    }
                }

                let mut ack = RollbackAckMessage {
                    session_id: message.session_id.clone(),
                    message_type: ROLLBACK_ACK_MESSAGE_TYPE.to_string(),
                    success,
                    sender_signature: String::new(),
                };
                sign_message(&mut ack, &self.signing_key)?;
                Ok(ack)
            })
            .await
    }

    fn verify_from_counterparty<M: super::messages::SignedMessage>(
        &self,
        session: &SatpSession,
        message: &M,
    ) -> Result<(), RecoveryError> {
        let verified = session
            .all_session_data()
            .any(|data| verify_message(message, data.counterparty_pubkey()).is_ok());
        if verified {
            Ok(())
        } else {
            Err(RecoveryError::InvalidSignature {
                context: format!("{CLASS_NAME}#verifySignature"),
                session_id: message.session_id().to_string(),
            })
        }
    }

    /// Append a row to the recovery log.
    pub async fn append_log(&self, log: LocalLog) -> Result<(), RecoveryError> {
        self.log_repository
            .create(log)
            .await
            .map_err(|e| RecoveryError::repository(&format!("{CLASS_NAME}#appendLog"), e))
    }

    /// Start the periodic health check; a running scheduler is left alone.
    pub fn start_scheduler(self: &Arc<Self>) {
        let mut slot = self.scheduler.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        self.scheduler_state.send_replace(SchedulerState::Running);
        let mut state = self.scheduler_state.subscribe();
        let manager: Weak<Self> = Arc::downgrade(self);
        let period = self.health_check_interval;
        tracing::info!(interval_ms = period.as_millis() as u64, "crash detection scheduler started");

        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let current = *state.borrow_and_update();
                match current {
                    SchedulerState::Stopped => break,
                    SchedulerState::Paused => continue,
                    SchedulerState::Running => {}
                }
                let Some(manager) = manager.upgrade() else { break };
                manager.check_and_resolve_crashes().await;
            }
            tracing::debug!("crash detection scheduler exited");
        }));
    }

    /// Skip health checks until resumed.
    pub fn pause_scheduler(&self) {
        self.scheduler_state.send_if_modified(|state| {
            if *state == SchedulerState::Running {
                *state = SchedulerState::Paused;
                true
            } else {
                false
            }
        });
    }

    /// Resume paused health checks.
    pub fn resume_scheduler(&self) {
        self.scheduler_state.send_if_modified(|state| {
            if *state == SchedulerState::Paused {
                *state = SchedulerState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Stop the scheduler task.
    pub fn stop_scheduler(&self) {
        self.scheduler_state.send_replace(SchedulerState::Stopped);
        if let Some(handle) = self.scheduler.lock().take() {
            handle.abort();
        }
        tracing::info!("crash detection scheduler stopped");
    }

    /// Whether the scheduler task is alive and not paused.
    pub fn is_scheduler_running(&self) -> bool {
        *self.scheduler_state.borrow() == SchedulerState::Running
            && self
                .scheduler
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }
}

fn is_own_data(data: &SessionData, own_key: &str) -> bool {
    let recorded = match data.role {
        SessionRole::Client => &data.client_gateway_pubkey,
        SessionRole::Server => &data.server_gateway_pubkey,
        SessionRole::Unspecified => return false,
    };
    recorded.is_empty() || recorded == own_key
}

impl<R: LogRepository> Drop for CrashManager<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.get_mut().take() {
            handle.abort();
        }
    }
}
