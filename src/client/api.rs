use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize, Serializer};
use time::Date;
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::dto::{AuthResponse, PublicUser, SessionResponse, SignInRequest, SignUpRequest},
    error::ErrorBody,
    tasks::{
        dto::{MessageResponse, TaskListResponse, TaskResponse},
        repo_types::{due_date_format, StatusFilter, Task, TaskPriority, TaskStatus},
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{} ({status})", .body.message())]
    Api { status: StatusCode, body: ErrorBody },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport(e) => e.status(),
            Self::Api { status, .. } => Some(*status),
        }
    }
}

/// Create/update payload. Unset fields are left out of the JSON, which the
/// server reads as "unchanged" on update. `Some(None)` on the nullable
/// fields sends an explicit `null`, clearing the stored value.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_due_date"
    )]
    pub due_date: Option<Option<Date>>,
}

fn serialize_due_date<S: Serializer>(value: &Option<Option<Date>>, s: S) -> Result<S::Ok, S::Error> {
    due_date_format::option::serialize(&value.flatten(), s)
}

impl TaskInput {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// Typed client for the task and auth endpoints.
#[derive(Clone)]
pub struct TaskApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl TaskApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn is_signed_in(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}/api{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ClientError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res.json::<T>().await?);
        }
        let body = res.json::<ErrorBody>().await.unwrap_or_else(|_| ErrorBody {
            error: status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_owned(),
            details: None,
        });
        debug!(%status, error = %body.error, "api error");
        Err(ClientError::Api { status, body })
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        Self::decode(req.send().await?).await
    }

    pub async fn sign_up(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ClientError> {
        let body = SignUpRequest {
            name: Some(name.to_owned()),
            email: email.to_owned(),
            password: password.to_owned(),
            image: None,
        };
        let auth: AuthResponse = self
            .send(self.request(Method::POST, "/auth/sign-up").json(&body))
            .await?;
        self.token = Some(auth.access_token);
        Ok(auth.user)
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<PublicUser, ClientError> {
        let body = SignInRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let auth: AuthResponse = self
            .send(self.request(Method::POST, "/auth/sign-in").json(&body))
            .await?;
        self.token = Some(auth.access_token);
        Ok(auth.user)
    }

    pub async fn sign_out(&mut self) -> Result<(), ClientError> {
        let _: MessageResponse = self.send(self.request(Method::POST, "/auth/sign-out")).await?;
        self.token = None;
        Ok(())
    }

    pub async fn session(&self) -> Result<PublicUser, ClientError> {
        let res: SessionResponse = self.send(self.request(Method::GET, "/auth/session")).await?;
        Ok(res.user)
    }

    pub async fn list_tasks(
        &self,
        status: StatusFilter,
        search: Option<&str>,
    ) -> Result<Vec<Task>, ClientError> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let StatusFilter::Only(s) = status {
            query.push(("status", s.as_str()));
        }
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            query.push(("search", search));
        }
        let res: TaskListResponse = self
            .send(self.request(Method::GET, "/tasks").query(&query))
            .await?;
        Ok(res.tasks)
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Task, ClientError> {
        let res: TaskResponse = self
            .send(self.request(Method::GET, &format!("/tasks/{id}")))
            .await?;
        Ok(res.task)
    }

    pub async fn create_task(&self, input: &TaskInput) -> Result<Task, ClientError> {
        let res: TaskResponse = self
            .send(self.request(Method::POST, "/tasks").json(input))
            .await?;
        Ok(res.task)
    }

    pub async fn update_task(&self, id: Uuid, input: &TaskInput) -> Result<Task, ClientError> {
        let res: TaskResponse = self
            .send(self.request(Method::PUT, &format!("/tasks/{id}")).json(input))
            .await?;
        Ok(res.task)
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), ClientError> {
        let _: MessageResponse = self
            .send(self.request(Method::DELETE, &format!("/tasks/{id}")))
            .await?;
        Ok(())
    }
}
