use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::tasks::repo_types::{NewTask, Task, TaskFilter, TaskPatch};

const TASK_COLUMNS: &str =
    "id, user_id, title, description, status, priority, due_date, created_at, updated_at";

/// Persistence for tasks. Every by-id method matches on `id AND owner` in a
/// single lookup, so a task owned by someone else looks exactly like a
/// missing one.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Owner's tasks matching `filter`, newest first.
    async fn list(&self, owner: Uuid, filter: &TaskFilter) -> anyhow::Result<Vec<Task>>;
    async fn find(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<Task>>;
    async fn create(&self, owner: Uuid, task: NewTask) -> anyhow::Result<Task>;
    async fn update(&self, owner: Uuid, id: Uuid, patch: TaskPatch) -> anyhow::Result<Option<Task>>;
    /// Returns `false` when nothing matched.
    async fn delete(&self, owner: Uuid, id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgTaskStore {
    db: PgPool,
}

impl PgTaskStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Escapes LIKE wildcards so the search text only matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn list(&self, owner: Uuid, filter: &TaskFilter) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE user_id = $1
              AND ($2::task_status IS NULL OR status = $2)
              AND ($3::text IS NULL
                   OR title ILIKE $3 ESCAPE '\'
                   OR description ILIKE $3 ESCAPE '\')
            ORDER BY created_at DESC
            "#
        ))
        .bind(owner)
        .bind(filter.status.status())
        .bind(filter.search.as_deref().map(like_pattern))
        .fetch_all(&self.db)
        .await
        .context("list tasks")?;
        Ok(rows)
    }

    async fn find(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE id = $1 AND user_id = $2
            "#
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await
        .context("find task")?;
        Ok(row)
    }

    async fn create(&self, owner: Uuid, task: NewTask) -> anyhow::Result<Task> {
        let row = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (id, user_id, title, description, status, priority, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(task.title)
        .bind(task.description)
        .bind(task.status)
        .bind(task.priority)
        .bind(task.due_date)
        .fetch_one(&self.db)
        .await
        .context("insert task")?;
        Ok(row)
    }

    async fn update(&self, owner: Uuid, id: Uuid, patch: TaskPatch) -> anyhow::Result<Option<Task>> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE tasks SET updated_at = now()");
        if let Some(title) = patch.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = patch.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(status) = patch.status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(priority) = patch.priority {
            qb.push(", priority = ").push_bind(priority);
        }
        if let Some(due_date) = patch.due_date {
            qb.push(", due_date = ").push_bind(due_date);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND user_id = ")
            .push_bind(owner)
            .push(" RETURNING ")
            .push(TASK_COLUMNS);

        let row = qb
            .build_query_as::<Task>()
            .fetch_optional(&self.db)
            .await
            .context("update task")?;
        Ok(row)
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.db)
            .await
            .context("delete task")?;
        Ok(res.rows_affected() > 0)
    }
}
