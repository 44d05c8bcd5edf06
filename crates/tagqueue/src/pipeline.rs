//! Runs one item's action list against its media file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::action::{ActionContext, ActionServices};
use crate::error::{ActionError, MediaError};
use crate::item::{ItemFailure, ItemStatus, QueueItem};
use crate::media::{run_blocking, MediaFile};

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// `Completed`, `Failed` or `Cancelled`
    pub status: ItemStatus,
    pub failure: Option<ItemFailure>,
    /// Number of actions that ran to success
    pub actions_run: usize,
    /// Final output path when output naming changed it
    pub renamed_to: Option<PathBuf>,
}

impl PipelineOutcome {
    fn failed(step: &str, error: ActionError, actions_run: usize) -> Self {
        Self {
            status: ItemStatus::Failed,
            failure: Some(ItemFailure::new(step, &error)),
            actions_run,
            renamed_to: None,
        }
    }

    fn cancelled(actions_run: usize) -> Self {
        Self {
            status: ItemStatus::Cancelled,
            failure: None,
            actions_run,
            renamed_to: None,
        }
    }
}

/// Apply an output name chosen by the actions, keeping the destination's extension
pub fn resolve_destination(destination: &Path, output_name: Option<&str>) -> PathBuf {
    match output_name {
        Some(name) => {
            let file_name = match destination.extension() {
                Some(ext) => format!("{}.{}", name, ext.to_string_lossy()),
                None => name.to_string(),
            };
            destination.with_file_name(file_name)
        }
        None => destination.to_path_buf(),
    }
}

async fn write(
    services: &ActionServices,
    file: &MediaFile,
    item: &QueueItem,
    destination: &Path,
) -> Result<(), MediaError> {
    let file = file.clone();
    let source = item.source.clone();
    let destination = destination.to_path_buf();
    run_blocking(&services.media, move |media| media.write(&file, &source, &destination)).await
}

/// Open the item's source, run its actions in order and write the result.
///
/// The representation is written just before the first terminal action, or
/// after the last action when there is none. A stop request is honoured
/// before every step; the first failing step ends the run.
/// `on_step(done, total, label)` is called as each step starts and once at the end.
pub async fn run_pipeline<F>(
    item: &QueueItem,
    services: &ActionServices,
    cancel: &AtomicBool,
    mut on_step: F,
) -> PipelineOutcome
where
    F: FnMut(usize, usize, &str),
{
    let total = item.actions.len() + 1;
    let source = item.source.clone();
    let mut file = match run_blocking(&services.media, move |media| media.open(&source)).await {
        Ok(file) => file,
        Err(e) => return PipelineOutcome::failed("open", e.into(), 0),
    };

    let mut destination = item.destination.clone();
    let mut written = false;
    let mut done = 0;
    let mut actions_run = 0;

    for action in &item.actions {
        if cancel.load(Ordering::SeqCst) {
            debug!("Stop requested, cancelling {} before {}", item.id, action.kind());
            return PipelineOutcome::cancelled(actions_run);
        }

        if action.is_terminal() && !written {
            destination = resolve_destination(&item.destination, file.output_name.as_deref());
            on_step(done, total, "Writing");
            if let Err(e) = write(services, &file, item, &destination).await {
                return PipelineOutcome::failed("write", e.into(), actions_run);
            }
            written = true;
            done += 1;
        }

        on_step(done, total, &action.description());
        let ctx = ActionContext {
            source: &item.source,
            destination: &destination,
            services,
        };
        if let Err(e) = action.apply(&mut file, &ctx).await {
            warn!("Item {}: {} failed: {}", item.id, action.kind(), e);
            return PipelineOutcome::failed(action.kind(), e, actions_run);
        }
        actions_run += 1;
        done += 1;
    }

    if !written {
        if cancel.load(Ordering::SeqCst) {
            return PipelineOutcome::cancelled(actions_run);
        }
        destination = resolve_destination(&item.destination, file.output_name.as_deref());
        on_step(done, total, "Writing");
        if let Err(e) = write(services, &file, item, &destination).await {
            return PipelineOutcome::failed("write", e.into(), actions_run);
        }
    }
    on_step(total, total, "Done");

    PipelineOutcome {
        status: ItemStatus::Completed,
        failure: None,
        actions_run,
        renamed_to: (destination != item.destination).then_some(destination),
    }
}
