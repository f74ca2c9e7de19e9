//! Rollback strategies: compensate the ledger effects of an interrupted transfer.
//!
//! ## Strategy selection
//!
//! The factory reads the session's hash chain from the latest stage down:
//!
//! | Latest stage with hashes | Strategy | Client compensation | Server compensation |
//! |--------------------------|----------|---------------------|---------------------|
//! | 0 | [`Stage0RollbackStrategy`] | none | none |
//! | 1 | [`Stage1RollbackStrategy`] | none | none |
//! | 2 | [`Stage2RollbackStrategy`] | unlock | none |
//! | 3 | [`Stage3RollbackStrategy`] | unlock, or mint + assign after a burn | burn after a mint; fails after an assignment |
//!
//! Rollback is asymmetric: each gateway compensates only its own ledger, with
//! its own leaf, using the asset snapshot of its role.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::RecoveryError;
use crate::bridge::{BridgeManager, StageOperation};
use crate::session::{MessageType, SatpSession, SatpStage, SessionData, SessionRole, State};
use crate::telemetry::SpanScope;
use crate::types::asset::Asset;
use crate::types::network::ClaimFormat;

/// Progress of a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackStatus {
    /// Steps still running.
    InProgress,
    /// Every compensating step succeeded.
    Completed,
    /// A step failed or compensation is impossible; needs manual intervention.
    Failed,
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One executed compensating step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackLogEntry {
    /// Session rolled back.
    pub session_id: String,
    /// Stage being compensated.
    pub stage: String,
    /// Epoch milliseconds.
    pub timestamp: String,
    /// Leaf operation that ran.
    pub action: String,
    /// Outcome of the step.
    pub status: RollbackStatus,
    /// Receipt on success, error message on failure.
    pub details: String,
}

/// Outcome of a strategy run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackState {
    /// Session rolled back.
    pub session_id: String,
    /// Stage being compensated.
    pub current_stage: String,
    /// Steps not yet executed.
    pub steps_remaining: u32,
    /// Executed steps.
    pub rollback_log_entries: Vec<RollbackLogEntry>,
    /// Rough remaining time, in milliseconds.
    pub estimated_time_to_completion: String,
    /// Overall status.
    pub status: RollbackStatus,
    /// Summary or failure reason.
    pub details: String,
}

impl RollbackState {
    fn new(session_id: &str, stage: SatpStage, steps: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            current_stage: stage.to_string(),
            steps_remaining: u32::try_from(steps).unwrap_or(u32::MAX),
            rollback_log_entries: Vec::new(),
            estimated_time_to_completion: "0".to_string(),
            status: RollbackStatus::InProgress,
            details: String::new(),
        }
    }

    /// Actions of the successful steps.
    pub fn actions_performed(&self) -> Vec<String> {
        self.successful_entries().map(|e| e.action.clone()).collect()
    }

    /// Receipts of the successful steps.
    pub fn proofs(&self) -> Vec<String> {
        self.successful_entries().map(|e| e.details.clone()).collect()
    }

    fn successful_entries(&self) -> impl Iterator<Item = &RollbackLogEntry> {
        self.rollback_log_entries
            .iter()
            .filter(|e| e.status == RollbackStatus::Completed)
    }
}

/// A compensating ledger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationStep {
    /// Operation to run.
    pub operation: StageOperation,
    /// Asset the operation applies to.
    pub asset: Asset,
}

/// What a strategy decided for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackPlan {
    /// Run these steps in order.
    Compensate(Vec<CompensationStep>),
    /// The effects cannot be undone by this gateway.
    Impossible(String),
}

/// Compensation logic for sessions interrupted in one stage.
#[async_trait]
pub trait RollbackStrategy: Send + Sync {
    /// Stage this strategy compensates.
    fn stage(&self) -> SatpStage;

    /// Decide the compensating steps for `data`.
    fn plan(&self, data: &SessionData) -> Result<RollbackPlan, RecoveryError>;

    /// Run the plan and record every step.
    async fn execute(&self, data: &SessionData) -> Result<RollbackState, RecoveryError>;

    /// Mark the session rejected once the rollback completed.
    ///
    /// Returns whether anything was cleaned up.
    async fn cleanup(
        &self,
        session: &mut SatpSession,
        role: SessionRole,
        state: &RollbackState,
    ) -> Result<bool, RecoveryError> {
        cleanup(session, role, state)
    }
}

/// Set the data of `role` to `REJECTED` after a completed rollback.
pub fn cleanup(session: &mut SatpSession, role: SessionRole, state: &RollbackState) -> Result<bool, RecoveryError> {
    if state.status != RollbackStatus::Completed {
        return Ok(false);
    }
    let data = session.session_data_mut(role)?;
    data.state = State::Rejected;
    tracing::info!(session_id = %data.id, role = %role, "session rejected after rollback");
    Ok(true)
}

fn own_asset(context: &str, data: &SessionData) -> Result<Asset, RecoveryError> {
    data.own_asset()
        .and_then(|asset| asset.to_asset())
        .ok_or_else(|| RecoveryError::Rollback {
            context: context.to_string(),
            reason: format!("session {} has no {} asset with a network", data.id, data.role),
        })
}

async fn run_plan(
    stage: SatpStage,
    plan: RollbackPlan,
    data: &SessionData,
    bridge_manager: Option<&BridgeManager>,
) -> Result<RollbackState, RecoveryError> {
    let steps = match plan {
        RollbackPlan::Compensate(steps) => steps,
        RollbackPlan::Impossible(reason) => {
            let mut state = RollbackState::new(&data.id, stage, 0);
            state.status = RollbackStatus::Failed;
            state.details = reason;
            tracing::warn!(session_id = %data.id, stage = %stage, details = %state.details, "rollback impossible");
            return Ok(state);
        }
    };

    let mut state = RollbackState::new(&data.id, stage, steps.len());
    for step in steps {
        let bridge_manager = bridge_manager.ok_or_else(|| RecoveryError::Rollback {
            context: format!("Stage{}RollbackStrategy#execute", stage.number()),
            reason: "no bridge manager for compensating calls".to_string(),
        })?;
        let outcome = match bridge_manager.get_execution_layer(&step.asset.network, ClaimFormat::Default) {
            Ok(layer) => layer.execute(step.operation, &step.asset).await,
            Err(err) => Err(err),
        };
        state.steps_remaining = state.steps_remaining.saturating_sub(1);
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        match outcome {
            Ok(receipt) => {
                tracing::info!(session_id = %data.id, action = %step.operation, "compensating step done");
                state.rollback_log_entries.push(RollbackLogEntry {
                    session_id: data.id.clone(),
                    stage: stage.to_string(),
                    timestamp,
                    action: step.operation.to_string(),
                    status: RollbackStatus::Completed,
                    details: receipt.receipt,
                });
            }
            Err(err) => {
                tracing::warn!(session_id = %data.id, action = %step.operation, error = %err, "compensating step failed");
                state.rollback_log_entries.push(RollbackLogEntry {
                    session_id: data.id.clone(),
                    stage: stage.to_string(),
                    timestamp,
                    action: step.operation.to_string(),
                    status: RollbackStatus::Failed,
                    details: err.to_string(),
                });
                state.status = RollbackStatus::Failed;
                state.details = err.to_string();
                return Ok(state);
            }
        }
    }
    state.status = RollbackStatus::Completed;
    Ok(state)
}

/// Stage 0: nothing reached a ledger.
#[derive(Debug, Default)]
pub struct Stage0RollbackStrategy;

/// Stage 1: nothing reached a ledger.
#[derive(Debug, Default)]
pub struct Stage1RollbackStrategy;

#[async_trait]
impl RollbackStrategy for Stage0RollbackStrategy {
    fn stage(&self) -> SatpStage {
        SatpStage::Stage0
    }

    fn plan(&self, _data: &SessionData) -> Result<RollbackPlan, RecoveryError> {
        Ok(RollbackPlan::Compensate(Vec::new()))
    }

    async fn execute(&self, data: &SessionData) -> Result<RollbackState, RecoveryError> {
        SpanScope::start("Stage0RollbackStrategy#execute")
            .run(run_plan(self.stage(), self.plan(data)?, data, None))
            .await
    }
}

#[async_trait]
impl RollbackStrategy for Stage1RollbackStrategy {
    fn stage(&self) -> SatpStage {
        SatpStage::Stage1
    }

    fn plan(&self, _data: &SessionData) -> Result<RollbackPlan, RecoveryError> {
        Ok(RollbackPlan::Compensate(Vec::new()))
    }

    async fn execute(&self, data: &SessionData) -> Result<RollbackState, RecoveryError> {
        SpanScope::start("Stage1RollbackStrategy#execute")
            .run(run_plan(self.stage(), self.plan(data)?, data, None))
            .await
    }
}

/// Stage 2: the client may have locked the sender asset.
pub struct Stage2RollbackStrategy {
    bridge_manager: Arc<BridgeManager>,
}

impl Stage2RollbackStrategy {
    /// Strategy running compensations through `bridge_manager`.
    pub fn new(bridge_manager: Arc<BridgeManager>) -> Self {
        Self { bridge_manager }
    }
}

#[async_trait]
impl RollbackStrategy for Stage2RollbackStrategy {
    fn stage(&self) -> SatpStage {
        SatpStage::Stage2
    }

    fn plan(&self, data: &SessionData) -> Result<RollbackPlan, RecoveryError> {
        match data.role {
            SessionRole::Client => {
                let asset = own_asset("Stage2RollbackStrategy#plan", data)?;
                Ok(RollbackPlan::Compensate(vec![CompensationStep {
                    operation: StageOperation::Unlock,
                    asset,
                }]))
            }
            _ => Ok(RollbackPlan::Compensate(Vec::new())),
        }
    }

    async fn execute(&self, data: &SessionData) -> Result<RollbackState, RecoveryError> {
        SpanScope::start("Stage2RollbackStrategy#execute")
            .run(async {
                let plan = self.plan(data)?;
                run_plan(self.stage(), plan, data, Some(self.bridge_manager.as_ref())).await
            })
            .await
    }
}

/// Stage 3: the client may have locked or burned, the server may have minted
/// or assigned.
pub struct Stage3RollbackStrategy {
    bridge_manager: Arc<BridgeManager>,
}

impl Stage3RollbackStrategy {
    /// Strategy running compensations through `bridge_manager`.
    pub fn new(bridge_manager: Arc<BridgeManager>) -> Self {
        Self { bridge_manager }
    }
}

#[async_trait]
impl RollbackStrategy for Stage3RollbackStrategy {
    fn stage(&self) -> SatpStage {
        SatpStage::Stage3
    }

    fn plan(&self, data: &SessionData) -> Result<RollbackPlan, RecoveryError> {
        let hashes = &data.hashes;
        match data.role {
            SessionRole::Client => {
                let asset = own_asset("Stage3RollbackStrategy#plan", data)?;
                let steps = if hashes.has(MessageType::CommitFinal) {
                    vec![
                        CompensationStep {
                            operation: StageOperation::Mint,
                            asset: asset.clone(),
                        },
                        CompensationStep {
                            operation: StageOperation::Assign,
                            asset,
                        },
                    ]
                } else {
                    vec![CompensationStep {
                        operation: StageOperation::Unlock,
                        asset,
                    }]
                };
                Ok(RollbackPlan::Compensate(steps))
            }
            SessionRole::Server => {
                if hashes.has(MessageType::AckCommitFinal) {
                    return Ok(RollbackPlan::Impossible(format!(
                        "asset of session {} already assigned to the recipient",
                        data.id
                    )));
                }
                if hashes.has(MessageType::CommitReady) {
                    let asset = own_asset("Stage3RollbackStrategy#plan", data)?;
                    return Ok(RollbackPlan::Compensate(vec![CompensationStep {
                        operation: StageOperation::Burn,
                        asset,
                    }]));
                }
                Ok(RollbackPlan::Compensate(Vec::new()))
            }
            SessionRole::Unspecified => Err(RecoveryError::Rollback {
                context: "Stage3RollbackStrategy#plan".to_string(),
                reason: format!("session {} has no role", data.id),
            }),
        }
    }

    async fn execute(&self, data: &SessionData) -> Result<RollbackState, RecoveryError> {
        SpanScope::start("Stage3RollbackStrategy#execute")
            .run(async {
                let plan = self.plan(data)?;
                run_plan(self.stage(), plan, data, Some(self.bridge_manager.as_ref())).await
            })
            .await
    }
}

/// Picks the strategy matching a session's progress.
#[derive(Clone)]
pub struct RollbackStrategyFactory {
    bridge_manager: Arc<BridgeManager>,
}

impl RollbackStrategyFactory {
    /// Factory whose strategies compensate through `bridge_manager`.
    pub fn new(bridge_manager: Arc<BridgeManager>) -> Self {
        Self { bridge_manager }
    }

    /// Strategy for the latest stage present in the hash chain.
    pub fn create(&self, data: &SessionData) -> Box<dyn RollbackStrategy> {
        let hashes = &data.hashes;
        let strategy: Box<dyn RollbackStrategy> = if hashes.stage_started(SatpStage::Stage3) {
            Box::new(Stage3RollbackStrategy::new(self.bridge_manager.clone()))
        } else if hashes.stage_started(SatpStage::Stage2) {
            Box::new(Stage2RollbackStrategy::new(self.bridge_manager.clone()))
        } else if hashes.stage_started(SatpStage::Stage1) {
            Box::new(Stage1RollbackStrategy)
        } else {
            Box::new(Stage0RollbackStrategy)
        };
        tracing::debug!(session_id = %data.id, stage = %strategy.stage(), "rollback strategy selected");
        strategy
    }
}
