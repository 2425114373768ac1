use tokio::sync::watch;
use tracing::warn;
use uuid::Uuid;

use crate::{
    client::{
        api::{ClientError, TaskApiClient, TaskInput},
        debounce::{Debouncer, SEARCH_DEBOUNCE},
        view::{derive_view, SortKey, ViewQuery},
    },
    tasks::repo_types::{StatusFilter, Task, TaskStatus},
};

/// Client-side state for the task list screen.
///
/// The raw list fetched from the server is the only stored copy of the
/// tasks; what gets rendered is always recomputed from it through
/// [`derive_view`]. Every mutation is followed by a full refetch.
///
/// Responses are applied in arrival order with no request tracking, so a
/// slow fetch that lands after a newer one overwrites it.
pub struct TaskListController {
    api: TaskApiClient,
    tasks: Vec<Task>,
    status: StatusFilter,
    sort: SortKey,
    search_input: String,
    search: Debouncer<String>,
    loading: bool,
    error: Option<String>,
}

impl TaskListController {
    pub fn new(api: TaskApiClient) -> Self {
        Self {
            api,
            tasks: Vec::new(),
            status: StatusFilter::All,
            sort: SortKey::default(),
            search_input: String::new(),
            search: Debouncer::new(String::new(), SEARCH_DEBOUNCE),
            loading: false,
            error: None,
        }
    }

    pub fn api(&self) -> &TaskApiClient {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut TaskApiClient {
        &mut self.api
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn query(&self) -> ViewQuery {
        ViewQuery {
            status: self.status,
            search: self.search.current(),
            sort: self.sort,
        }
    }

    /// The list as it should be rendered right now.
    pub fn visible(&self) -> Vec<Task> {
        derive_view(&self.tasks, &self.query())
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        self.status = status;
    }

    pub fn set_sort(&mut self, sort: SortKey) {
        self.sort = sort;
    }

    /// Takes the raw select value; unknown keys leave the order alone.
    pub fn set_sort_key(&mut self, key: &str) {
        self.sort = key.parse().unwrap_or_default();
    }

    /// What the user has typed so far. The view only follows it once the
    /// debounce delay has passed without further input.
    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    pub fn type_search(&mut self, text: impl Into<String>) {
        self.search_input = text.into();
        self.search.schedule(self.search_input.clone());
    }

    pub fn clear_search(&mut self) {
        self.search_input.clear();
        self.search.flush(String::new());
    }

    /// Fires each time the debounced search text settles.
    pub fn search_settled(&self) -> watch::Receiver<String> {
        self.search.subscribe()
    }

    fn record<T>(&mut self, res: Result<T, ClientError>) -> Result<T, ClientError> {
        match &res {
            Ok(_) => self.error = None,
            Err(e) => {
                warn!(error = %e, "task request failed");
                self.error = Some(e.to_string());
            }
        }
        res
    }

    /// Replaces the raw list with the server's copy.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        self.loading = true;
        let res = self.api.list_tasks(StatusFilter::All, None).await;
        self.apply_list(res)
    }

    /// Applies a list response, whenever it arrives. Nothing checks it
    /// against responses already applied.
    pub fn apply_list(&mut self, res: Result<Vec<Task>, ClientError>) -> Result<(), ClientError> {
        self.loading = false;
        self.tasks = self.record(res)?;
        Ok(())
    }

    /// The "Try again" action after a failed load.
    pub async fn retry(&mut self) -> Result<(), ClientError> {
        self.refresh().await
    }

    pub async fn create(&mut self, input: TaskInput) -> Result<Task, ClientError> {
        let res = self.api.create_task(&input).await;
        let task = self.record(res)?;
        self.refresh().await?;
        Ok(task)
    }

    pub async fn update(&mut self, id: Uuid, input: TaskInput) -> Result<Task, ClientError> {
        let res = self.api.update_task(id, &input).await;
        let task = self.record(res)?;
        self.refresh().await?;
        Ok(task)
    }

    pub async fn set_status(&mut self, id: Uuid, status: TaskStatus) -> Result<Task, ClientError> {
        self.update(
            id,
            TaskInput {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&mut self, id: Uuid) -> Result<(), ClientError> {
        let res = self.api.delete_task(id).await;
        self.record(res)?;
        self.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;
    use time::macros::date;

    use super::*;
    use crate::{app::build_app, state::AppState, tasks::repo_types::TaskPriority};

    async fn spawn_server() -> String {
        let app = build_app(AppState::fake());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn signed_in() -> TaskListController {
        let mut api = TaskApiClient::new(spawn_server().await);
        api.sign_up("Ada", "ada@example.com", "analytical-engine")
            .await
            .unwrap();
        TaskListController::new(api)
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.title.as_str()).collect()
    }

    fn input(title: &str, status: TaskStatus, priority: TaskPriority) -> TaskInput {
        TaskInput {
            status: Some(status),
            priority: Some(priority),
            ..TaskInput::titled(title)
        }
    }

    #[tokio::test]
    async fn mutations_refetch_and_view_rederives() {
        let mut c = signed_in().await;
        c.create(input("Write tests", TaskStatus::Todo, TaskPriority::Medium))
            .await
            .unwrap();
        c.create(input("Complete project", TaskStatus::InProgress, TaskPriority::High))
            .await
            .unwrap();
        c.create(input("Water plants", TaskStatus::Done, TaskPriority::Low))
            .await
            .unwrap();

        assert_eq!(c.tasks().len(), 3);
        assert_eq!(
            titles(&c.visible()),
            vec!["Water plants", "Complete project", "Write tests"]
        );

        c.set_sort_key("priority-asc");
        assert_eq!(
            titles(&c.visible()),
            vec!["Water plants", "Write tests", "Complete project"]
        );

        c.set_status_filter(StatusFilter::Only(TaskStatus::Todo));
        assert_eq!(titles(&c.visible()), vec!["Write tests"]);
        // raw list is untouched by filtering
        assert_eq!(c.tasks().len(), 3);
    }

    #[tokio::test]
    async fn search_applies_after_debounce() {
        let mut c = signed_in().await;
        c.create(TaskInput::titled("Complete project")).await.unwrap();
        c.create(TaskInput::titled("Write tests")).await.unwrap();

        let mut settled = c.search_settled();
        c.type_search("proj");
        c.type_search("PROJECT");
        assert_eq!(c.search_input(), "PROJECT");
        assert_eq!(c.visible().len(), 2);

        tokio::time::timeout(Duration::from_secs(2), settled.changed())
            .await
            .expect("search settles")
            .unwrap();
        assert_eq!(titles(&c.visible()), vec!["Complete project"]);

        c.clear_search();
        assert_eq!(c.visible().len(), 2);
    }

    #[tokio::test]
    async fn update_and_delete_flow() {
        let mut c = signed_in().await;
        let task = c
            .create(TaskInput {
                description: Some(Some("close the books".into())),
                due_date: Some(Some(date!(2025 - 12 - 31))),
                ..TaskInput::titled("Year end")
            })
            .await
            .unwrap();
        assert_eq!(task.due_date, Some(date!(2025 - 12 - 31)));

        let done = c.set_status(task.id, TaskStatus::Done).await.unwrap();
        assert_eq!(done.status, TaskStatus::Done);
        assert_eq!(done.title, "Year end");
        assert_eq!(c.tasks()[0].status, TaskStatus::Done);
        let fetched = c.api().get_task(task.id).await.unwrap();
        assert_eq!(fetched, c.tasks()[0]);

        let cleared = c
            .update(
                task.id,
                TaskInput {
                    description: Some(None),
                    due_date: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.description, None);
        assert_eq!(cleared.due_date, None);
        assert_eq!(cleared.status, TaskStatus::Done);

        c.delete(task.id).await.unwrap();
        assert!(c.tasks().is_empty());

        let err = c.delete(task.id).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(c.error().is_some());
    }

    #[tokio::test]
    async fn validation_errors_surface_details() {
        let mut c = signed_in().await;
        let err = c.create(TaskInput::titled("   ")).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(c.error(), Some("Title is required (400 Bad Request)"));
        assert!(c.tasks().is_empty());
    }

    // Known race: list responses are applied in arrival order, so an older
    // fetch that lands last replaces the newer list.
    #[tokio::test]
    async fn late_list_response_overwrites_newer_one() {
        let mut c = signed_in().await;
        c.create(TaskInput::titled("First")).await.unwrap();

        let api = c.api().clone();
        let in_flight =
            tokio::spawn(async move { api.list_tasks(StatusFilter::All, None).await });
        let stale = in_flight.await.unwrap();

        c.create(TaskInput::titled("Second")).await.unwrap();
        assert_eq!(titles(c.tasks()), vec!["Second", "First"]);

        c.apply_list(stale).unwrap();
        assert_eq!(titles(c.tasks()), vec!["First"]);
        assert!(!c.is_loading());
    }

    #[tokio::test]
    async fn forged_token_is_rejected() {
        let api = TaskApiClient::new(spawn_server().await).with_token("not-a-jwt");
        assert!(api.is_signed_in());
        let err = api.list_tasks(StatusFilter::All, None).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn retry_clears_error_once_signed_in() {
        let base = spawn_server().await;
        let mut c = TaskListController::new(TaskApiClient::new(base));
        assert!(!c.api().is_signed_in());

        let err = c.refresh().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(c.error().unwrap().contains("Unauthorized"));
        assert!(!c.is_loading());

        c.api_mut()
            .sign_up("Grace", "grace@example.com", "cobol-forever")
            .await
            .unwrap();
        c.retry().await.unwrap();
        assert_eq!(c.error(), None);
        assert_eq!(c.api().session().await.unwrap().name, "Grace");
    }
}
