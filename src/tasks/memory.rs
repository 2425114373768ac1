use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::tasks::repo::TaskStore;
use crate::tasks::repo_types::{NewTask, Task, TaskFilter, TaskPatch};

/// In-process `TaskStore` used by router and client tests.
#[derive(Default)]
pub struct MemoryTaskStore {
    // newest first
    tasks: RwLock<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: Task) {
        let mut tasks = self.tasks.write().unwrap();
        tasks.insert(0, task);
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap().len()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list(&self, owner: Uuid, filter: &TaskFilter) -> anyhow::Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == owner && filter.matches(t))
            .cloned()
            .collect())
    }

    async fn find(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<Task>> {
        Ok(self
            .tasks
            .read()
            .unwrap()
            .iter()
            .find(|t| t.id == id && t.user_id == owner)
            .cloned())
    }

    async fn create(&self, owner: Uuid, task: NewTask) -> anyhow::Result<Task> {
        let now = OffsetDateTime::now_utc();
        let task = Task {
            id: Uuid::new_v4(),
            user_id: owner,
            title: task.title,
            description: task.description,
            status: task.status,
            priority: task.priority,
            due_date: task.due_date,
            created_at: now,
            updated_at: now,
        };
        self.insert(task.clone());
        Ok(task)
    }

    async fn update(&self, owner: Uuid, id: Uuid, patch: TaskPatch) -> anyhow::Result<Option<Task>> {
        let mut tasks = self.tasks.write().unwrap();
        let Some(task) = tasks.iter_mut().find(|t| t.id == id && t.user_id == owner) else {
            return Ok(None);
        };
        patch.apply_to(task);
        task.updated_at = OffsetDateTime::now_utc();
        Ok(Some(task.clone()))
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let mut tasks = self.tasks.write().unwrap();
        let before = tasks.len();
        tasks.retain(|t| !(t.id == id && t.user_id == owner));
        Ok(tasks.len() < before)
    }
}
