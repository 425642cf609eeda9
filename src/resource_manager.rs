//! Resource management

use crate::error::MetricsError;

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// [crate::resource_manager::ResourceManager] provides a simple way to bound the number of
/// partition tasks running at once. Resource management is performed using a Tokio Semaphore.
#[derive(Clone, Debug)]
pub struct ResourceManager {
    /// Optional semaphore for tasks.
    tasks: Option<Arc<Semaphore>>,
}

impl ResourceManager {
    /// Returns a new ResourceManager object.
    pub fn new(task_limit: Option<usize>) -> Self {
        Self {
            tasks: task_limit.map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
        }
    }

    /// Acquire a task resource.
    ///
    /// The permit is owned so that it can move into a spawned task.
    pub async fn task(&self) -> Result<Option<OwnedSemaphorePermit>, MetricsError> {
        optional_acquire(&self.tasks).await
    }
}

/// Acquire a permit on an optional Semaphore, if present.
async fn optional_acquire(
    sem: &Option<Arc<Semaphore>>,
) -> Result<Option<OwnedSemaphorePermit>, MetricsError> {
    if let Some(sem) = sem {
        sem.clone()
            .acquire_owned()
            .await
            .map(Some)
            .map_err(|err| err.into())
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::TryAcquireError;

    #[tokio::test]
    async fn no_resource_management() {
        let rm = ResourceManager::new(None);
        assert!(rm.tasks.is_none());
        let _t = rm.task().await.unwrap();
        assert!(_t.is_none());
    }

    #[tokio::test]
    async fn task_limit() {
        let rm = ResourceManager::new(Some(1));
        assert!(rm.tasks.is_some());
        let _t = rm.task().await.unwrap();
        assert!(_t.is_some());
        // Check that there are no more resources (without blocking).
        assert_eq!(
            rm.tasks.as_ref().unwrap().try_acquire().err(),
            Some(TryAcquireError::NoPermits)
        );
        drop(_t);
        assert!(rm.tasks.as_ref().unwrap().try_acquire().is_ok());
    }

    #[tokio::test]
    async fn zero_limit_allows_one_task() {
        let rm = ResourceManager::new(Some(0));
        let _t = rm.task().await.unwrap();
        assert!(_t.is_some());
    }
}
