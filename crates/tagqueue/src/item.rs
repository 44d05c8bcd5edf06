use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Action;
use crate::error::{ActionError, InvariantViolation};

/// Stable identity of a queue item for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        ItemId(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Ready,
    Working,
    Editing,
    Completed,
    Failed,
    Cancelled,
    /// Display-only placeholder, never entered by the worker
    Unknown,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 7] = [
        ItemStatus::Ready,
        ItemStatus::Working,
        ItemStatus::Editing,
        ItemStatus::Completed,
        ItemStatus::Failed,
        ItemStatus::Cancelled,
        ItemStatus::Unknown,
    ];

    /// Whether an item may move from `self` to `next`
    pub fn can_transition(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Ready, Working)
                | (Working, Completed)
                | (Working, Failed)
                | (Working, Cancelled)
                | (Ready, Editing)
                | (Completed, Editing)
                | (Cancelled, Ready)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Cancelled
        )
    }

    /// Held by an actor; may not be removed, moved or claimed
    pub fn is_held(self) -> bool {
        matches!(self, ItemStatus::Working | ItemStatus::Editing)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemStatus::Ready => "ready",
            ItemStatus::Working => "working",
            ItemStatus::Editing => "editing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
            ItemStatus::Cancelled => "cancelled",
            ItemStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Why an item failed, kept with the item so it survives a restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Kind of the action that failed, or "open"/"write" for the container steps
    pub step: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(step: impl Into<String>, error: &ActionError) -> Self {
        Self {
            step: step.into(),
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.reason)
    }
}

/// One unit of work: a source file, where it goes, and what to do to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(with = "action_list")]
    pub actions: Vec<Action>,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ItemFailure>,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// New `ready` item writing in place
    pub fn new(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        Self {
            id: ItemId::new(),
            destination: source.clone(),
            source,
            actions: Vec::new(),
            status: ItemStatus::Ready,
            last_error: None,
            added_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    /// Append an action while the pipeline is being built
    pub fn add_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn has_action(&self, kind: &str) -> bool {
        self.actions.iter().any(|a| a.kind() == kind)
    }

    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    /// Move to `next`, enforcing the item state machine
    pub fn transition(&mut self, next: ItemStatus) -> Result<(), InvariantViolation> {
        if !self.status.can_transition(next) {
            return Err(InvariantViolation::IllegalTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        match next {
            ItemStatus::Working => {
                self.started_at = Some(Utc::now());
                self.finished_at = None;
                self.last_error = None;
            }
            ItemStatus::Completed | ItemStatus::Cancelled => {
                self.finished_at = Some(Utc::now());
            }
            ItemStatus::Ready => {
                self.started_at = None;
                self.finished_at = None;
                self.last_error = None;
            }
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    /// `working -> failed`, recording why
    pub fn fail(&mut self, failure: ItemFailure) -> Result<(), InvariantViolation> {
        self.transition(ItemStatus::Failed)?;
        self.finished_at = Some(Utc::now());
        self.last_error = Some(failure);
        Ok(())
    }

    /// Put an item that was held when the process died back in line
    pub(crate) fn recover(&mut self) -> bool {
        if self.status.is_held() {
            self.status = ItemStatus::Ready;
            true
        } else {
            false
        }
    }
}

/// (De)serializes an action list, passing unknown action kinds through verbatim
mod action_list {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::action::{Action, UnknownAction};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Record {
        Known(Action),
        Other(serde_json::Value),
    }

    pub fn serialize<S: Serializer>(actions: &[Action], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(actions.len()))?;
        for action in actions {
            match action {
                Action::Unrecognized(unknown) => seq.serialize_element(&unknown.raw)?,
                known => seq.serialize_element(known)?,
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Action>, D::Error> {
        let records = Vec::<Record>::deserialize(deserializer)?;
        Ok(records
            .into_iter()
            .map(|record| match record {
                Record::Known(action) => action,
                Record::Other(raw) => Action::Unrecognized(UnknownAction::from_value(raw)),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_item_is_ready_and_in_place() {
        let item = QueueItem::new("/media/a.m4v");
        assert_eq!(item.status, ItemStatus::Ready);
        assert_eq!(item.destination, PathBuf::from("/media/a.m4v"));
        assert_eq!(item.file_name(), "a.m4v");
        assert_ne!(item.id, QueueItem::new("/media/a.m4v").id);
    }

    #[test]
    fn test_worker_lifecycle() {
        let mut item = QueueItem::new("a.mkv");
        item.transition(ItemStatus::Working).unwrap();
        assert!(item.started_at.is_some());
        item.transition(ItemStatus::Completed).unwrap();
        assert!(item.finished_at.is_some());

        let err = item.transition(ItemStatus::Ready).unwrap_err();
        assert!(matches!(err, InvariantViolation::IllegalTransition { .. }));
    }

    #[test]
    fn test_fail_records_error() {
        let mut item = QueueItem::new("a.mkv");
        item.transition(ItemStatus::Working).unwrap();
        item.fail(ItemFailure::new(
            "search_metadata",
            &ActionError::NoResults("a".to_string()),
        ))
        .unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(
            item.last_error.as_ref().map(|e| e.to_string()),
            Some("search_metadata: no metadata found for \"a\"".to_string())
        );
    }

    #[test]
    fn test_cancelled_items_can_be_requeued() {
        let mut item = QueueItem::new("a.mkv");
        item.transition(ItemStatus::Working).unwrap();
        item.transition(ItemStatus::Cancelled).unwrap();
        item.transition(ItemStatus::Ready).unwrap();
        assert_eq!(item.started_at, None);
    }

    #[test]
    fn test_recover_resets_held_items() {
        let mut item = QueueItem::new("a.mkv");
        item.status = ItemStatus::Editing;
        assert!(item.recover());
        assert_eq!(item.status, ItemStatus::Ready);
        item.status = ItemStatus::Completed;
        assert!(!item.recover());
    }

    #[test]
    fn test_unknown_action_survives_round_trip() {
        let json = serde_json::json!({
            "id": "5f0c6c2e-8f3e-4d0e-9b7a-2d7c9d1f3a10",
            "source": "/m/a.mkv",
            "destination": "/m/a.m4v",
            "actions": [
                {"kind": "clear_metadata"},
                {"kind": "upscale", "factor": 2},
                {"kind": "optimize"}
            ],
            "status": "ready",
            "added_at": "2024-01-01T00:00:00Z"
        });
        let item: QueueItem = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(item.actions.len(), 3);
        assert_eq!(item.actions[1].kind(), "upscale");
        assert_eq!(item.actions[2], Action::Optimize);

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["actions"], json["actions"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Terminal states only ever leave through removal, except the
        /// explicit requeue of cancelled items.
        #[test]
        fn test_no_transition_out_of_terminal_states(
            from in prop::sample::select(ItemStatus::ALL.to_vec()),
            to in prop::sample::select(ItemStatus::ALL.to_vec()),
        ) {
            let allowed = from.can_transition(to);
            if from == ItemStatus::Completed || from == ItemStatus::Failed {
                prop_assert!(!allowed || (from == ItemStatus::Completed && to == ItemStatus::Editing));
            }
            if from == ItemStatus::Cancelled {
                prop_assert_eq!(allowed, to == ItemStatus::Ready);
            }
            if to == ItemStatus::Working {
                prop_assert_eq!(allowed, from == ItemStatus::Ready);
            }
            prop_assert!(!from.can_transition(ItemStatus::Unknown));
        }
    }
}
