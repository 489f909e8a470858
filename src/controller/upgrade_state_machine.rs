//! State machine for ZookeeperCluster rolling upgrades.
//!
//! An upgrade is driven entirely by the StatefulSet controller: changing the
//! image tag produces a new update revision and pods roll one by one. This
//! module watches that rollout through the cluster conditions, detects
//! stalls, and recognises recovery from a failed rollout.
//!
//! Phases are derived from status, never stored:
//!
//! | Phase | Conditions |
//! |-------|------------|
//! | NotUpgrading | Upgrading False |
//! | Triggered | Upgrading True, reason not yet `UpdatingZookeeper` |
//! | InProgress | Upgrading True, reason `UpdatingZookeeper` |
//! | Failed | Error True, reason `UpgradeFailed` |
//!
//! `Completed` is transient: the status it produces reads as NotUpgrading.

use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use k8s_openapi::api::apps::v1::StatefulSet;

use crate::crd::{
    ConditionType, MESSAGE_PROGRESS_DEADLINE, REASON_UPDATING_ZOOKEEPER, REASON_UPGRADE_FAILED,
    ZookeeperClusterStatus,
};

/// How long a rollout may sit at the same updated-replica count.
pub const UPGRADE_PROGRESS_DEADLINE: Duration = Duration::from_secs(10 * 60);

// ============================================================================
// Phases and Events
// ============================================================================

/// Upgrade phase as derived from status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradePhase {
    NotUpgrading,
    Triggered,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradePhase::NotUpgrading => write!(f, "NotUpgrading"),
            UpgradePhase::Triggered => write!(f, "Triggered"),
            UpgradePhase::InProgress => write!(f, "InProgress"),
            UpgradePhase::Completed => write!(f, "Completed"),
            UpgradePhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Events that can trigger upgrade phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeEvent {
    /// No Upgrading condition recorded yet.
    Initialize,

    /// The StatefulSet started rolling to a new image tag.
    RolloutDetected,

    /// The updated-replica count moved.
    ProgressObserved,

    /// Current and update revisions are equal again.
    RevisionsConverged,

    /// Upgrading without a target version; the upgrade is abandoned.
    TargetMissing,

    /// No progress within the deadline.
    StallTimeout,

    /// A failed rollout finished after all.
    RecoveryConfirmed,
}

impl std::fmt::Display for UpgradeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradeEvent::Initialize => write!(f, "Initialize"),
            UpgradeEvent::RolloutDetected => write!(f, "RolloutDetected"),
            UpgradeEvent::ProgressObserved => write!(f, "ProgressObserved"),
            UpgradeEvent::RevisionsConverged => write!(f, "RevisionsConverged"),
            UpgradeEvent::TargetMissing => write!(f, "TargetMissing"),
            UpgradeEvent::StallTimeout => write!(f, "StallTimeout"),
            UpgradeEvent::RecoveryConfirmed => write!(f, "RecoveryConfirmed"),
        }
    }
}

// ============================================================================
// Rollout Observation
// ============================================================================

/// The parts of StatefulSet status the upgrade logic reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutObservation {
    pub replicas: i32,
    pub ready_replicas: i32,
    pub updated_replicas: i32,
    pub current_revision: String,
    pub update_revision: String,
}

impl RolloutObservation {
    pub fn from_statefulset(sts: &StatefulSet) -> Self {
        let status = sts.status.clone().unwrap_or_default();
        Self {
            replicas: status.replicas,
            ready_replicas: status.ready_replicas.unwrap_or_default(),
            updated_replicas: status.updated_replicas.unwrap_or_default(),
            current_revision: status.current_revision.unwrap_or_default(),
            update_revision: status.update_revision.unwrap_or_default(),
        }
    }

    pub fn revisions_converged(&self) -> bool {
        self.current_revision == self.update_revision
    }

    /// All replicas ready on a single revision.
    pub fn settled(&self) -> bool {
        self.replicas == self.ready_replicas && self.revisions_converged()
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Represents a single state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeTransition {
    pub from: UpgradePhase,
    pub to: UpgradePhase,
    pub event: UpgradeEvent,
    pub description: &'static str,
}

/// Table of valid upgrade transitions.
#[derive(Debug, Clone)]
pub struct UpgradeStateMachine {
    transitions: Vec<UpgradeTransition>,
}

impl Default for UpgradeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeStateMachine {
    pub fn new() -> Self {
        use UpgradeEvent::*;
        use UpgradePhase::*;

        let t = |from, to, event, description| UpgradeTransition {
            from,
            to,
            event,
            description,
        };
        let transitions = vec![
            t(NotUpgrading, NotUpgrading, Initialize, "Record Upgrading as False"),
            t(NotUpgrading, Triggered, RolloutDetected, "New image tag is rolling out"),
            t(Triggered, InProgress, ProgressObserved, "First rollout progress recorded"),
            t(InProgress, InProgress, ProgressObserved, "More pods updated"),
            t(Triggered, Completed, RevisionsConverged, "Rollout finished"),
            t(InProgress, Completed, RevisionsConverged, "Rollout finished"),
            t(Triggered, NotUpgrading, TargetMissing, "No target version, upgrade cancelled"),
            t(InProgress, NotUpgrading, TargetMissing, "No target version, upgrade cancelled"),
            t(InProgress, Failed, StallTimeout, "No progress within the deadline"),
            t(Failed, Completed, RecoveryConfirmed, "Failed rollout converged"),
        ];
        Self { transitions }
    }

    /// Find the transition for `event` from `from`.
    pub fn transition(&self, from: UpgradePhase, event: UpgradeEvent) -> Option<&UpgradeTransition> {
        self.transitions
            .iter()
            .find(|t| t.from == from && t.event == event)
    }

    /// Check if a phase transition is valid.
    pub fn can_transition(&self, from: UpgradePhase, to: UpgradePhase) -> bool {
        from == to
            || self
                .transitions
                .iter()
                .any(|t| t.from == from && t.to == to)
    }

    /// Get the list of valid next phases from a given phase.
    pub fn valid_transitions(&self, from: UpgradePhase) -> Vec<UpgradePhase> {
        self.transitions
            .iter()
            .filter(|t| t.from == from)
            .map(|t| t.to)
            .collect()
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Derive the upgrade phase from status.
pub fn current_phase(status: &ZookeeperClusterStatus) -> UpgradePhase {
    let conditions = &status.conditions;
    if conditions.is_upgrade_failed() {
        return UpgradePhase::Failed;
    }
    match conditions.get(ConditionType::Upgrading) {
        Some(c) if c.is_true() && c.reason == REASON_UPDATING_ZOOKEEPER => UpgradePhase::InProgress,
        Some(c) if c.is_true() => UpgradePhase::Triggered,
        _ => UpgradePhase::NotUpgrading,
    }
}

/// True when the rollout has sat at the same updated-replica count for
/// longer than [`UPGRADE_PROGRESS_DEADLINE`].
pub fn is_stalled(status: &ZookeeperClusterStatus, updated_replicas: i32, now: Timestamp) -> bool {
    let Some(last) = status.conditions.last_condition() else {
        return false;
    };
    if last.reason != REASON_UPDATING_ZOOKEEPER || last.message != updated_replicas.to_string() {
        return false;
    }
    let Some(since) = last.last_update_time else {
        return false;
    };
    let deadline = SignedDuration::try_from(UPGRADE_PROGRESS_DEADLINE).unwrap_or(SignedDuration::MAX);
    now.duration_since(since) > deadline
}

/// Determine the next upgrade event, if any.
pub fn determine_upgrade_event(
    status: &ZookeeperClusterStatus,
    desired_tag: &str,
    rollout: &RolloutObservation,
    now: Timestamp,
) -> Option<UpgradeEvent> {
    let phase = current_phase(status);

    if phase == UpgradePhase::Failed {
        return rollout
            .settled()
            .then_some(UpgradeEvent::RecoveryConfirmed);
    }

    if status.conditions.get(ConditionType::Upgrading).is_none() {
        return Some(UpgradeEvent::Initialize);
    }

    match phase {
        UpgradePhase::NotUpgrading | UpgradePhase::Completed => {
            let triggered = status.conditions.is_ready()
                && !rollout.revisions_converged()
                && desired_tag != status.current_version;
            triggered.then_some(UpgradeEvent::RolloutDetected)
        }
        UpgradePhase::Triggered | UpgradePhase::InProgress => {
            if status.target_version.is_empty() {
                Some(UpgradeEvent::TargetMissing)
            } else if rollout.revisions_converged() {
                Some(UpgradeEvent::RevisionsConverged)
            } else if condition_message(status) != rollout.updated_replicas.to_string() {
                Some(UpgradeEvent::ProgressObserved)
            } else if is_stalled(status, rollout.updated_replicas, now) {
                Some(UpgradeEvent::StallTimeout)
            } else {
                None
            }
        }
        UpgradePhase::Failed => None,
    }
}

fn condition_message(status: &ZookeeperClusterStatus) -> String {
    status
        .conditions
        .get(ConditionType::Upgrading)
        .map(|c| c.message.clone())
        .unwrap_or_default()
}

fn clear_upgrade(status: &mut ZookeeperClusterStatus, now: Timestamp) {
    status.conditions.set_upgrading_at(false, "", "", now);
    status.target_version.clear();
}

/// Apply the status effects of `event`.
pub fn apply_upgrade_event(
    status: &mut ZookeeperClusterStatus,
    event: UpgradeEvent,
    desired_tag: &str,
    rollout: &RolloutObservation,
    now: Timestamp,
) {
    match event {
        UpgradeEvent::Initialize => {
            status.conditions.set_upgrading_at(false, "", "", now);
        }
        UpgradeEvent::RolloutDetected => {
            status.target_version = desired_tag.to_string();
            status.conditions.set_pods_ready_at(false, now);
            status.conditions.set_upgrading_at(true, "", "", now);
        }
        UpgradeEvent::ProgressObserved => {
            status.conditions.set_upgrading_at(
                true,
                REASON_UPDATING_ZOOKEEPER,
                &rollout.updated_replicas.to_string(),
                now,
            );
        }
        UpgradeEvent::RevisionsConverged => {
            status.current_version = status.target_version.clone();
            clear_upgrade(status, now);
        }
        UpgradeEvent::TargetMissing => clear_upgrade(status, now),
        UpgradeEvent::StallTimeout => {
            status
                .conditions
                .set_error_at(true, REASON_UPGRADE_FAILED, MESSAGE_PROGRESS_DEADLINE, now);
        }
        UpgradeEvent::RecoveryConfirmed => {
            status.current_version = status.target_version.clone();
            status.conditions.set_error_at(false, "", "", now);
            clear_upgrade(status, now);
        }
    }
}

/// Run the upgrade state machine for one reconcile cycle.
///
/// A detected rollout is followed by its first progress update in the same
/// cycle; every other event ends the cycle. Returns the transitions taken.
pub fn advance_upgrade(
    status: &mut ZookeeperClusterStatus,
    desired_tag: &str,
    rollout: &RolloutObservation,
    now: Timestamp,
) -> Vec<UpgradeTransition> {
    let machine = UpgradeStateMachine::new();
    let mut taken = Vec::new();

    while let Some(event) = determine_upgrade_event(status, desired_tag, rollout, now) {
        let from = current_phase(status);
        let Some(transition) = machine.transition(from, event).cloned() else {
            break;
        };
        apply_upgrade_event(status, event, desired_tag, rollout, now);
        taken.push(transition);
        if event != UpgradeEvent::RolloutDetected {
            break;
        }
    }

    taken
}
