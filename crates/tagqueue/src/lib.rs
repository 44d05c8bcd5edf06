pub mod action;
pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod history;
pub mod item;
pub mod media;
pub mod naming;
pub mod pipeline;
pub mod provider;
pub mod queue;
pub mod scan;
pub mod store;

pub use action::{Action, ActionServices};
pub use config::QueueConfig;
pub use error::{ActionError, InvariantViolation, PersistenceError, QueueError};
pub use events::{Progress, QueueEvent, QueueEvents, RunSummary};
pub use factory::ItemFactory;
pub use history::History;
pub use item::{ItemId, ItemStatus, QueueItem};
pub use queue::{Queue, QueueStatus, Relocation, Removal};
pub use store::{LoadOutcome, QueueStore};
