//! Task registry — the single source of truth for which tasks exist.
//!
//! All access goes through one `RwLock`, so create/destroy/flush and option
//! writes are linearizable. The admin task is inserted at construction and
//! survives every operation for the lifetime of the registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::admin::AdminAuthority;
use super::id::TaskId;
use super::model::Task;
use super::options::OptionSet;
use super::schema::OptionSchema;
use crate::error::{Error, Result};
use crate::scan::lifecycle::remove_working_dir;

/// In-memory task registry.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Task>>,
    admin_id: TaskId,
    schema: Arc<OptionSchema>,
    capture_limit: usize,
}

impl TaskRegistry {
    /// Create a registry holding only the admin task.
    pub fn new(admin: &AdminAuthority, schema: Arc<OptionSchema>, capture_limit: usize) -> Self {
        let admin_id = admin.id().clone();
        let admin_task = Task::new(
            admin_id.clone(),
            OptionSet::from_schema(&schema),
            capture_limit,
        );

        let mut tasks = HashMap::new();
        tasks.insert(admin_id.clone(), admin_task);

        Self {
            tasks: RwLock::new(tasks),
            admin_id,
            schema,
            capture_limit,
        }
    }

    pub fn schema(&self) -> &OptionSchema {
        &self.schema
    }

    /// Register a new task with schema-default options and return its identity.
    pub async fn create(&self) -> TaskId {
        let id = TaskId::generate();
        let task = Task::new(
            id.clone(),
            OptionSet::from_schema(&self.schema),
            self.capture_limit,
        );
        self.tasks.write().await.insert(id.clone(), task);
        debug!(task_id = %id, "Task created");
        id
    }

    /// Remove a non-admin task. The filesystem is left untouched.
    pub async fn destroy(&self, id: &TaskId) -> Result<()> {
        if *id == self.admin_id {
            return Err(Error::UnknownOrProtectedTask);
        }
        match self.tasks.write().await.remove(id) {
            Some(_) => {
                debug!(task_id = %id, "Task destroyed");
                Ok(())
            }
            None => Err(Error::UnknownOrProtectedTask),
        }
    }

    pub async fn contains(&self, id: &TaskId) -> bool {
        self.tasks.read().await.contains_key(id)
    }

    /// Get a clone of a task (capture buffers and scan handle are shared).
    pub async fn get(&self, id: &TaskId) -> Result<Task> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownTask(id.clone()))
    }

    /// Read from a task under the registry lock.
    pub async fn with_task<F, R>(&self, id: &TaskId, f: F) -> Result<R>
    where
        F: FnOnce(&Task) -> R,
    {
        let tasks = self.tasks.read().await;
        let task = tasks.get(id).ok_or_else(|| Error::UnknownTask(id.clone()))?;
        Ok(f(task))
    }

    /// Mutate a task under the registry lock.
    pub async fn update<F, R>(&self, id: &TaskId, f: F) -> Result<R>
    where
        F: FnOnce(&mut Task) -> R,
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| Error::UnknownTask(id.clone()))?;
        Ok(f(task))
    }

    /// Snapshot of every task, oldest first.
    pub async fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    async fn working_dirs(&self) -> Vec<PathBuf> {
        self.tasks
            .read()
            .await
            .values()
            .filter_map(|t| t.working_dir.clone())
            .collect()
    }

    /// Drop every task except the admin task, whose options are kept as they are.
    ///
    /// With `remove_working_dirs`, every task's working directory (the admin's
    /// included) is deleted first; a removal failure aborts before anything is
    /// dropped from the registry. Returns the number of tasks dropped.
    pub async fn reset(&self, remove_working_dirs: bool) -> Result<usize> {
        // Directories are removed without holding the registry lock.
        let mut removed = Vec::new();
        if remove_working_dirs {
            for dir in self.working_dirs().await {
                remove_working_dir(&dir).await?;
                removed.push(dir);
            }
        }

        let mut tasks = self.tasks.write().await;
        let mut admin_task = tasks.remove(&self.admin_id);
        if let Some(admin_task) = admin_task.as_mut() {
            // A directory allocated after the snapshot is still live.
            if admin_task
                .working_dir
                .as_ref()
                .is_some_and(|dir| removed.contains(dir))
            {
                admin_task.working_dir = None;
            }
        }
        let dropped = tasks.len();
        tasks.clear();
        if let Some(admin_task) = admin_task {
            tasks.insert(self.admin_id.clone(), admin_task);
        }

        info!(dropped, remove_working_dirs, "Task registry reset");
        Ok(dropped)
    }
}
