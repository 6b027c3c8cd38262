//! Executor capability handed to the preview widget by the host.

use futures_util::future::LocalBoxFuture;
use std::rc::{Rc, Weak};
use tokio::task::LocalSet;

use crate::error::{Error, Result};

/// Schedules UI-thread tasks. `spawn` must only queue the task; it is not
/// polled before `spawn` returns.
pub trait LocalSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) -> Result<()>;
}

/// Queues tasks on a host-owned `LocalSet`. Tasks run while the host drives
/// that set (`run_until` or awaiting it). Spawning fails once the set has
/// been dropped.
#[derive(Debug, Clone)]
pub struct LocalSetSpawner {
    local: Weak<LocalSet>,
}

impl LocalSetSpawner {
    pub fn new(local: &Rc<LocalSet>) -> Self {
        Self {
            local: Rc::downgrade(local),
        }
    }
}

impl LocalSpawner for LocalSetSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) -> Result<()> {
        let local = self.local.upgrade().ok_or_else(|| {
            Error::HostContractViolation("the LocalSet driving previews is gone".to_string())
        })?;
        local.spawn_local(task);
        Ok(())
    }
}
