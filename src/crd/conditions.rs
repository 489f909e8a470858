//! Typed status conditions for ZookeeperCluster.
//!
//! At most one condition per type. Setting a type that is already present
//! replaces it in place, so the list keeps the order in which each type
//! first appeared.

use jiff::Timestamp;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reason recorded on the Upgrading condition while pods roll.
pub const REASON_UPDATING_ZOOKEEPER: &str = "UpdatingZookeeper";
/// Reason recorded on the Error condition when a rollout stalls.
pub const REASON_UPGRADE_FAILED: &str = "UpgradeFailed";
/// Message recorded on the Error condition when a rollout stalls.
pub const MESSAGE_PROGRESS_DEADLINE: &str = "progress deadline exceeded";

/// Condition types. `ALL` is the order `init` adds missing ones in.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum ConditionType {
    /// All members are ready.
    #[serde(rename = "Ready")]
    PodsReady,
    /// A rolling upgrade is in progress.
    Upgrading,
    /// The last upgrade failed.
    Error,
}

impl ConditionType {
    pub const ALL: [ConditionType; 3] = [
        ConditionType::PodsReady,
        ConditionType::Upgrading,
        ConditionType::Error,
    ];
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionType::PodsReady => write!(f, "Ready"),
            ConditionType::Upgrading => write!(f, "Upgrading"),
            ConditionType::Error => write!(f, "Error"),
        }
    }
}

/// Condition status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// A single status condition.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// Last time status, reason or message changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_update_time: Option<Timestamp>,
    /// Last time status flipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<Timestamp>,
}

impl Condition {
    pub fn new(type_: ConditionType, status: ConditionStatus, reason: &str, message: &str) -> Self {
        Self {
            type_,
            status,
            reason: reason.to_string(),
            message: message.to_string(),
            last_update_time: None,
            last_transition_time: None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Set of conditions, at most one per type, in first-occurrence order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    fn get_mut(&mut self, type_: ConditionType) -> Option<&mut Condition> {
        self.0.iter_mut().find(|c| c.type_ == type_)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Set a condition at `now`.
    ///
    /// `lastTransitionTime` moves only when the status flips and
    /// `lastUpdateTime` moves when status, reason or message change.
    pub fn set_at(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: Timestamp,
    ) {
        match self.get_mut(type_) {
            Some(existing) => {
                let status_changed = existing.status != status;
                if status_changed {
                    existing.last_transition_time = Some(now);
                }
                if status_changed || existing.reason != reason || existing.message != message {
                    existing.status = status;
                    existing.reason = reason.to_string();
                    existing.message = message.to_string();
                    existing.last_update_time = Some(now);
                }
            }
            None => {
                let mut condition = Condition::new(type_, status, reason, message);
                condition.last_update_time = Some(now);
                condition.last_transition_time = Some(now);
                self.0.push(condition);
            }
        }
    }

    pub fn set(&mut self, type_: ConditionType, status: ConditionStatus, reason: &str, message: &str) {
        self.set_at(type_, status, reason, message, Timestamp::now());
    }

    /// Insert a condition verbatim, replacing any existing one of its type
    /// in place.
    pub fn insert(&mut self, condition: Condition) {
        match self.get_mut(condition.type_) {
            Some(existing) => *existing = condition,
            None => self.0.push(condition),
        }
    }

    /// Add every missing condition type with status False.
    pub fn init_at(&mut self, now: Timestamp) {
        for type_ in ConditionType::ALL {
            if self.get(type_).is_none() {
                self.set_at(type_, ConditionStatus::False, "", "", now);
            }
        }
    }

    pub fn init(&mut self) {
        self.init_at(Timestamp::now());
    }

    fn is_true(&self, type_: ConditionType) -> bool {
        self.get(type_).is_some_and(Condition::is_true)
    }

    pub fn is_ready(&self) -> bool {
        self.is_true(ConditionType::PodsReady)
    }

    pub fn is_upgrading(&self) -> bool {
        self.is_true(ConditionType::Upgrading)
    }

    pub fn is_upgrade_failed(&self) -> bool {
        self.get(ConditionType::Error)
            .is_some_and(|c| c.is_true() && c.reason == REASON_UPGRADE_FAILED)
    }

    /// The condition describing the latest activity: Upgrading while an
    /// upgrade runs, otherwise none.
    pub fn last_condition(&self) -> Option<&Condition> {
        self.get(ConditionType::Upgrading).filter(|c| c.is_true())
    }

    pub fn set_pods_ready_at(&mut self, ready: bool, now: Timestamp) {
        self.set_at(ConditionType::PodsReady, ready.into(), "", "", now);
    }

    pub fn set_upgrading_at(&mut self, upgrading: bool, reason: &str, message: &str, now: Timestamp) {
        self.set_at(ConditionType::Upgrading, upgrading.into(), reason, message, now);
    }

    pub fn set_error_at(&mut self, error: bool, reason: &str, message: &str, now: Timestamp) {
        self.set_at(ConditionType::Error, error.into(), reason, message, now);
    }
}

impl Serialize for Conditions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.0)
    }
}

impl<'de> Deserialize<'de> for Conditions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<Condition>::deserialize(deserializer)?;
        let mut conditions = Conditions::new();
        for condition in list {
            conditions.insert(condition);
        }
        Ok(conditions)
    }
}
