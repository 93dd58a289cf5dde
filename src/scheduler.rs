use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::controller::{FormController, FormResult, read_lock, write_lock};

/// Pending-notification queue shared by a whole form.
///
/// Entries are field names in FIFO order; the same name may appear several
/// times before a flush and every entry is delivered (no de-duplication).
/// The flush-requested flag is advisory: it coalesces flush scheduling on the
/// host side, never enqueueing.
#[derive(Clone)]
pub(crate) struct NotifyScheduler {
    state: Arc<RwLock<SchedulerState>>,
}

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<String>,
    flush_requested: bool,
}

impl NotifyScheduler {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SchedulerState::default())),
        }
    }

    pub(crate) fn enqueue(&self, name: &str) -> FormResult<()> {
        let mut state = write_lock(&self.state, "queueing notification")?;
        state.queue.push_back(name.to_owned());
        Ok(())
    }

    /// Raises the flush-requested flag. Returns `true` only when the flag was
    /// newly set, so a host schedules exactly one deferred flush per cycle.
    pub(crate) fn request_flush(&self) -> FormResult<bool> {
        let mut state = write_lock(&self.state, "requesting flush")?;
        let newly_requested = !state.flush_requested;
        state.flush_requested = true;
        Ok(newly_requested)
    }

    pub(crate) fn pop(&self) -> FormResult<Option<String>> {
        let mut state = write_lock(&self.state, "draining notification queue")?;
        Ok(state.queue.pop_front())
    }

    pub(crate) fn finish_flush(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "finishing flush")?;
        state.flush_requested = false;
        Ok(())
    }

    pub(crate) fn flush_requested(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading flush request")?.flush_requested)
    }
}

impl FormController {
    /// Drains the pending queue to quiescence, invoking each entry's current
    /// notifier in enqueue order. Notifiers run with no internal lock held
    /// and may re-enter any controller operation; entries they queue are
    /// drained within this same pass. An entry whose field has since been
    /// unregistered is skipped. Returns the number of notifications
    /// delivered.
    ///
    /// The host's event-loop integration calls this once per raised flush
    /// request, typically after the current synchronous unit of work; any
    /// batching of the resulting re-renders is the host's concern.
    pub fn flush(&self) -> FormResult<usize> {
        let mut delivered = 0usize;
        loop {
            let Some(name) = self.scheduler.pop()? else {
                break;
            };
            let notifier = {
                let state = read_lock(&self.state, "reading notifier for flush")?;
                state.control.get(&name).cloned()
            };
            if let Some(notifier) = notifier {
                notifier();
                delivered += 1;
            }
        }
        self.scheduler.finish_flush()?;
        trace!(form = self.id.0, delivered, "flush pass complete");
        Ok(delivered)
    }

    /// Whether a flush request is outstanding.
    pub fn needs_flush(&self) -> FormResult<bool> {
        self.scheduler.flush_requested()
    }
}
