//! The ordered item list and its single background worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::action::ActionServices;
use crate::error::{InvariantViolation, PersistenceError, QueueError};
use crate::events::{Progress, QueueEvent, QueueEvents, RunSummary};
use crate::item::{ItemId, ItemStatus, QueueItem};
use crate::pipeline::{run_pipeline, PipelineOutcome};
use crate::store::QueueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Idle,
    Working,
}

/// One step of a move: the item at `from` was taken out and put back at `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub from: usize,
    pub to: usize,
}

impl Relocation {
    pub fn inverse(self) -> Self {
        Relocation {
            from: self.to,
            to: self.from,
        }
    }
}

/// What a `remove` call actually did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removal {
    /// Removed items with their positions before the call, ascending
    pub removed: Vec<(usize, QueueItem)>,
    /// Positions left alone because their item was working or being edited
    pub skipped: Vec<usize>,
}

impl Removal {
    pub fn positions(&self) -> Vec<usize> {
        self.removed.iter().map(|(position, _)| *position).collect()
    }
}

struct State {
    items: Vec<QueueItem>,
    status: QueueStatus,
    summary: RunSummary,
}

struct Shared {
    state: Mutex<State>,
    store: QueueStore,
    services: ActionServices,
    events: UnboundedSender<QueueEvent>,
    cancel: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the queue. Clones share the same items and worker.
///
/// Every read and mutation goes through one lock, which is also where the
/// worker claims and releases items, so callers always see a single
/// consistent state and the persisted file matches it once a call returns.
#[derive(Clone)]
pub struct Queue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("store", &self.shared.store)
            .field("count", &self.count())
            .field("status", &self.status())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn check_mutable(item: &QueueItem) -> Result<(), InvariantViolation> {
    match item.status {
        ItemStatus::Working => Err(InvariantViolation::ItemWorking(item.id)),
        ItemStatus::Editing => Err(InvariantViolation::ItemEditing(item.id)),
        _ => Ok(()),
    }
}

fn check_position(position: usize, len: usize) -> Result<(), InvariantViolation> {
    if position >= len {
        return Err(InvariantViolation::OutOfRange { position, len });
    }
    Ok(())
}

fn insert_at(list: &mut Vec<QueueItem>, items: Vec<QueueItem>, positions: &[usize]) -> Result<(), InvariantViolation> {
    if items.len() != positions.len() {
        return Err(InvariantViolation::LengthMismatch {
            items: items.len(),
            positions: positions.len(),
        });
    }
    if positions.windows(2).any(|w| w[0] >= w[1]) {
        return Err(InvariantViolation::UnorderedPositions);
    }
    for (offset, (&position, item)) in positions.iter().zip(items.iter()).enumerate() {
        let len = list.len() + offset;
        if position > len {
            return Err(InvariantViolation::OutOfRange { position, len });
        }
        check_mutable(item)?;
        let duplicate = list.iter().chain(&items[..offset]).any(|other| other.id == item.id);
        if duplicate {
            return Err(InvariantViolation::DuplicateItem(item.id));
        }
    }
    for (position, item) in positions.iter().zip(items) {
        list.insert(*position, item);
    }
    Ok(())
}

impl Queue {
    /// Build a queue over `items`. Items still marked working or editing are put back to ready.
    pub fn new(store: QueueStore, mut items: Vec<QueueItem>, services: ActionServices) -> (Queue, QueueEvents) {
        for item in items.iter_mut() {
            item.recover();
        }
        let (events, receiver) = QueueEvents::channel();
        let queue = Queue {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items,
                    status: QueueStatus::Idle,
                    summary: RunSummary::default(),
                }),
                store,
                services,
                events,
                cancel: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        };
        (queue, receiver)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.shared.state)
    }

    /// Apply `change` to the item list and persist it. On any error the list is left as it was.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Vec<QueueItem>) -> Result<T, InvariantViolation>,
    ) -> Result<T, QueueError> {
        let mut state = self.state();
        let before = state.items.clone();
        let value = match change(&mut state.items) {
            Ok(value) => value,
            Err(violation) => {
                state.items = before;
                warn!("Rejected queue change: {}", violation);
                return Err(violation.into());
            }
        };
        if let Err(e) = self.shared.store.save(&state.items) {
            state.items = before;
            error!("{}", e);
            return Err(e.into());
        }
        Ok(value)
    }

    fn emit(&self, event: QueueEvent) {
        // Nobody listening is fine
        let _ = self.shared.events.send(event);
    }

    pub fn store(&self) -> &QueueStore {
        &self.shared.store
    }

    pub fn count(&self) -> usize {
        self.state().items.len()
    }

    pub fn status(&self) -> QueueStatus {
        self.state().status
    }

    pub fn item(&self, position: usize) -> Option<QueueItem> {
        self.state().items.get(position).cloned()
    }

    pub fn items(&self, positions: &[usize]) -> Result<Vec<QueueItem>, InvariantViolation> {
        let state = self.state();
        positions
            .iter()
            .map(|&position| {
                check_position(position, state.items.len())?;
                Ok(state.items[position].clone())
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.state().items.clone()
    }

    pub fn indexes_with(&self, status: ItemStatus) -> Vec<usize> {
        self.state()
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.status == status)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn index_of(&self, id: ItemId) -> Option<usize> {
        self.state().items.iter().position(|item| item.id == id)
    }

    pub fn ready_count(&self) -> usize {
        self.state()
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Ready)
            .count()
    }

    /// Persist the current list
    pub fn save(&self) -> Result<(), PersistenceError> {
        let state = self.state();
        self.shared.store.save(&state.items)
    }

    /// Insert `items` at `positions`, applied in order.
    ///
    /// Positions must be strictly ascending and each one at most the length
    /// of the list at the time it is applied.
    pub fn insert(&self, items: Vec<QueueItem>, positions: &[usize]) -> Result<(), QueueError> {
        self.mutate(|list| insert_at(list, items, positions))?;
        debug!("Inserted {} item(s) at {:?}", positions.len(), positions);
        Ok(())
    }

    /// Insert `items` as a contiguous block at `at`, or at the end. Returns their positions.
    pub fn add(&self, items: Vec<QueueItem>, at: Option<usize>) -> Result<Vec<usize>, QueueError> {
        let positions = self.mutate(|list| {
            let len = list.len();
            let start = at.unwrap_or(len);
            if start > len {
                return Err(InvariantViolation::OutOfRange { position: start, len });
            }
            let end = start
                .checked_add(items.len())
                .ok_or(InvariantViolation::OutOfRange { position: start, len })?;
            let positions: Vec<usize> = (start..end).collect();
            insert_at(list, items, &positions)?;
            Ok(positions)
        })?;
        debug!("Added {} item(s) at {:?}", positions.len(), positions);
        Ok(positions)
    }

    /// Remove the items at `positions`, skipping any that are working or being edited
    pub fn remove(&self, positions: &[usize]) -> Result<Removal, QueueError> {
        let mut positions = positions.to_vec();
        positions.sort_unstable();
        positions.dedup();

        let removal = self.mutate(|list| {
            let len = list.len();
            if let Some(&position) = positions.iter().find(|&&p| p >= len) {
                return Err(InvariantViolation::OutOfRange { position, len });
            }
            let mut removal = Removal::default();
            for &position in positions.iter().rev() {
                if list[position].status.is_held() {
                    removal.skipped.push(position);
                } else {
                    removal.removed.push((position, list.remove(position)));
                }
            }
            removal.removed.reverse();
            removal.skipped.reverse();
            Ok(removal)
        })?;

        if !removal.skipped.is_empty() {
            warn!("Skipped busy item(s) at {:?}", removal.skipped);
        }
        debug!("Removed {} item(s)", removal.removed.len());
        Ok(removal)
    }

    /// Remove every completed item
    pub fn remove_completed(&self) -> Result<Removal, QueueError> {
        let positions = self.indexes_with(ItemStatus::Completed);
        if positions.is_empty() {
            return Ok(Removal::default());
        }
        self.remove(&positions)
    }

    /// Move the given items, in their current relative order, to sit before position `to`.
    ///
    /// Returns the single-item steps taken, which `relocate` can replay or invert.
    pub fn move_items(&self, ids: &[ItemId], to: usize) -> Result<Vec<Relocation>, QueueError> {
        let moves = self.mutate(|list| {
            let len = list.len();
            if to > len {
                return Err(InvariantViolation::OutOfRange { position: to, len });
            }
            let mut sources = Vec::with_capacity(ids.len());
            for id in ids {
                let index = list
                    .iter()
                    .position(|item| item.id == *id)
                    .ok_or(InvariantViolation::UnknownItem(*id))?;
                check_mutable(&list[index])?;
                sources.push(index);
            }
            sources.sort_unstable();
            sources.dedup();
            let moving: Vec<ItemId> = sources.iter().map(|&index| list[index].id).collect();

            let mut current = to;
            let mut moves = Vec::with_capacity(moving.len());
            for id in moving.iter().rev() {
                let from = list
                    .iter()
                    .position(|item| item.id == *id)
                    .ok_or(InvariantViolation::UnknownItem(*id))?;
                let item = list.remove(from);
                if from < current {
                    current -= 1;
                }
                list.insert(current, item);
                moves.push(Relocation { from, to: current });
            }
            Ok(moves)
        })?;
        debug!("Moved {} item(s) to {}", moves.len(), to);
        Ok(moves)
    }

    /// Replay single-item moves in order. Returns the steps applied.
    ///
    /// Undo a `move_items` by relocating its steps reversed and inverted.
    pub fn relocate(&self, moves: &[Relocation]) -> Result<Vec<Relocation>, QueueError> {
        self.mutate(|list| {
            for step in moves {
                check_position(step.from, list.len())?;
                check_position(step.to, list.len())?;
                check_mutable(&list[step.from])?;
                let item = list.remove(step.from);
                list.insert(step.to, item);
            }
            Ok(moves.to_vec())
        })
    }

    /// Put cancelled items back in line
    pub fn requeue(&self, positions: &[usize]) -> Result<(), QueueError> {
        self.mutate(|list| {
            for &position in positions {
                check_position(position, list.len())?;
                list[position].transition(ItemStatus::Ready)?;
            }
            Ok(())
        })
    }

    /// Hand the item at `position` out for interactive editing
    pub fn begin_edit(&self, position: usize) -> Result<QueueItem, QueueError> {
        let item = self.mutate(|list| {
            check_position(position, list.len())?;
            list[position].transition(ItemStatus::Editing)?;
            Ok(list[position].clone())
        })?;
        info!("Editing {}", item.file_name());
        Ok(item)
    }

    /// Finish an edit: the item leaves the queue and goes back to the caller
    pub fn end_edit(&self, id: ItemId) -> Result<(usize, QueueItem), QueueError> {
        self.mutate(|list| {
            let position = list
                .iter()
                .position(|item| item.id == id)
                .ok_or(InvariantViolation::UnknownItem(id))?;
            if list[position].status != ItemStatus::Editing {
                return Err(InvariantViolation::IllegalTransition {
                    id,
                    from: list[position].status,
                    to: ItemStatus::Editing,
                });
            }
            Ok((position, list.remove(position)))
        })
    }

    /// Start processing ready items in the background. Does nothing if already working.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        {
            let mut state = self.state();
            if state.status == QueueStatus::Working {
                return false;
            }
            state.status = QueueStatus::Working;
            state.summary = RunSummary::default();
            self.shared.cancel.store(false, Ordering::SeqCst);
        }

        info!("Queue started");
        let queue = self.clone();
        let handle = tokio::spawn(async move { queue.run().await });
        *lock(&self.shared.worker) = Some(handle);
        true
    }

    /// Ask the worker to stop after its current action. Ignored when idle.
    pub fn stop(&self) {
        let state = self.state();
        if state.status == QueueStatus::Working {
            info!("Stop requested");
            self.shared.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Wait for the current run, if any, to finish
    pub async fn wait_idle(&self) {
        let handle = lock(&self.shared.worker).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Queue worker stopped abnormally: {}", e);
            }
        }
    }

    /// Worker loop. Claiming and recording results save the store, so they
    /// run on the blocking pool along with the backend calls.
    async fn run(self) {
        loop {
            let queue = self.clone();
            let claimed = match tokio::task::spawn_blocking(move || queue.claim_next()).await {
                Ok(Some(claimed)) => claimed,
                Ok(None) => break,
                Err(e) => {
                    error!("Queue worker failed to claim an item: {}", e);
                    self.end_run(&mut self.state());
                    break;
                }
            };

            info!("Processing {}", claimed.source.display());
            let outcome = run_pipeline(
                &claimed,
                &self.shared.services,
                &self.shared.cancel,
                |done, total, label| {
                    let fraction = if total == 0 { 1.0 } else { done as f64 / total as f64 };
                    debug!("{}: {}", claimed.file_name(), label);
                    self.emit(QueueEvent::Progress(Progress {
                        status_text: format!("{}: {}", claimed.file_name(), label),
                        progress: fraction,
                        item_index: self.index_of(claimed.id),
                    }));
                },
            )
            .await;

            let queue = self.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || queue.finish(&claimed, outcome)).await {
                error!("Queue worker failed to record a result: {}", e);
            }
        }
    }

    /// Mark the run over and report its summary
    fn end_run(&self, state: &mut State) {
        state.status = QueueStatus::Idle;
        self.shared.cancel.store(false, Ordering::SeqCst);
        let summary = state.summary;
        info!(
            "Queue finished: {} completed, {} failed",
            summary.completed, summary.failed
        );
        self.emit(QueueEvent::Completed(summary));
    }

    /// Claim the first ready item, or end the run if there is none or a stop was requested
    fn claim_next(&self) -> Option<QueueItem> {
        let mut state = self.state();
        let next = if self.shared.cancel.load(Ordering::SeqCst) {
            None
        } else {
            state
                .items
                .iter()
                .position(|item| item.status == ItemStatus::Ready)
        };

        let Some(index) = next else {
            self.end_run(&mut state);
            return None;
        };

        if let Err(e) = state.items[index].transition(ItemStatus::Working) {
            // Unreachable for a ready item, but never spin on it
            error!("{}", e);
            self.end_run(&mut state);
            return None;
        }
        if let Err(e) = self.shared.store.save(&state.items) {
            error!("{}", e);
        }
        let claimed = state.items[index].clone();
        self.emit(QueueEvent::Progress(Progress {
            status_text: format!("Processing {}", claimed.file_name()),
            progress: 0.0,
            item_index: Some(index),
        }));
        Some(claimed)
    }

    fn finish(&self, claimed: &QueueItem, outcome: PipelineOutcome) {
        let mut state = self.state();
        let Some(index) = state.items.iter().position(|item| item.id == claimed.id) else {
            warn!("Item {} left the queue while it was processed", claimed.id);
            return;
        };

        let item = &mut state.items[index];
        let result = match (outcome.status, outcome.failure) {
            (ItemStatus::Completed, _) => {
                if let Some(destination) = outcome.renamed_to {
                    item.destination = destination;
                }
                item.transition(ItemStatus::Completed)
            }
            (ItemStatus::Failed, Some(failure)) => {
                warn!("{} failed at {}", item.file_name(), failure);
                item.fail(failure)
            }
            _ => item.transition(ItemStatus::Cancelled),
        };
        if let Err(e) = result {
            error!("{}", e);
        }

        let status = item.status;
        let status_text = format!("{} {}", item.file_name(), status);
        info!("{}", status_text);
        match status {
            ItemStatus::Completed => state.summary.completed += 1,
            ItemStatus::Failed => state.summary.failed += 1,
            _ => {}
        }

        if let Err(e) = self.shared.store.save(&state.items) {
            error!("{}", e);
        }
        self.emit(QueueEvent::Progress(Progress {
            status_text,
            progress: 1.0,
            item_index: Some(index),
        }));
    }
}
