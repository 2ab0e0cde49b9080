use futures::FutureExt;
use tokio::runtime::Handle;

use super::{Rejected, Task, WorkerPool};

/// Runs submitted work on the submitter until the work first suspends.
///
/// Anything left after that suspension continues on the ambient runtime.
pub struct InlinePool {
    name: String,
}

impl InlinePool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for InlinePool {
    fn default() -> Self {
        Self::new("IMMEDIATE")
    }
}

impl WorkerPool for InlinePool {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_inline(&self) -> bool {
        true
    }

    fn try_submit(&self, mut task: Task) -> Result<(), Rejected> {
        if (&mut task).now_or_never().is_some() {
            return Ok(());
        }
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(task);
            }
            Err(_) => futures::executor::block_on(task),
        }
        Ok(())
    }

    fn stop(&self) {}
}
