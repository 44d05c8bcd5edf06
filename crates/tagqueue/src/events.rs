use tokio::sync::mpsc;

/// Progress of the item currently being processed
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub status_text: String,
    /// 0.0 ..= 1.0 through the current item's pipeline
    pub progress: f64,
    /// Position of the item at the time of the event
    pub item_index: Option<usize>,
}

/// Summary of one start/stop cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Progress(Progress),
    /// Emitted exactly once per run, after the last terminal transition
    Completed(RunSummary),
}

/// Receiving half of the queue's event channel, held by the controller
#[derive(Debug)]
pub struct QueueEvents {
    rx: mpsc::UnboundedReceiver<QueueEvent>,
}

impl QueueEvents {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<QueueEvent>, QueueEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, QueueEvents { rx })
    }

    /// Next event, or `None` once the queue has been dropped
    pub async fn recv(&mut self) -> Option<QueueEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<QueueEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the end of the current run, handing every progress event to `on_progress`
    pub async fn until_completed<F>(&mut self, mut on_progress: F) -> Option<RunSummary>
    where
        F: FnMut(&Progress),
    {
        while let Some(event) = self.rx.recv().await {
            match event {
                QueueEvent::Progress(progress) => on_progress(&progress),
                QueueEvent::Completed(summary) => return Some(summary),
            }
        }
        None
    }
}
