use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::PipelineError;

/// Per-run failure latch shared by every stage.
///
/// The first error reported wins; later ones are dropped since they are
/// usually fallout from the teardown the first one triggered.
#[derive(Debug, Default)]
pub struct Shutdown {
    aborted: AtomicBool,
    first: Mutex<Option<PipelineError>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, err: PipelineError) {
        if let Ok(mut slot) = self.first.lock() {
            if slot.is_none() {
                tracing::error!(stage = %err.stage(), error = %err, "aborting pipeline");
                *slot = Some(err);
            }
        }
        self.aborted.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn into_error(self) -> Option<PipelineError> {
        self.first.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
