use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::error::{ClientError, ClientResult};
use crate::idempotency::{IDEMPOTENCY_HEADER, IdempotencyKey};
use crate::model::{
    Comment, NewComment, NewProject, NewTask, Project, ProjectId, Task, TaskId, User,
};
use crate::paging::{ListSource, PageRequest};
use crate::session::Session;
use crate::transport::{HttpRequest, HttpResponse};

const PROJECTS_PATH: &str = "api/v1/projects/";
const CURRENT_USER_PATH: &str = "api/v1/users/me";

fn project_path(id: ProjectId) -> String {
    format!("api/v1/projects/{id}")
}

fn project_tasks_path(id: ProjectId) -> String {
    format!("api/v1/projects/{id}/tasks")
}

fn task_path(id: TaskId) -> String {
    format!("api/v1/tasks/{id}")
}

fn task_comments_path(id: TaskId) -> String {
    format!("api/v1/tasks/{id}/comments")
}

/// Typed operations against the task-tracking service.
///
/// Reads treat a 404 as an empty page; writes always surface failures.
/// Nothing is retried here.
#[derive(Clone)]
pub struct Gateway {
    session: Arc<Session>,
}

impl Gateway {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[instrument(skip(self))]
    pub async fn list_projects(&self, page: PageRequest) -> ClientResult<Vec<Project>> {
        let request = paged(HttpRequest::get(PROJECTS_PATH), page);
        read_list(self.session.send(request).await?, "projects")
    }

    #[instrument(skip(self, draft, key), fields(name = %draft.name))]
    pub async fn create_project(
        &self,
        draft: &NewProject,
        key: Option<&IdempotencyKey>,
    ) -> ClientResult<Project> {
        let request = with_key(HttpRequest::post(PROJECTS_PATH, encode(draft)?), key);
        let project: Project = decode(self.session.send(request).await?)?;
        info!(project_id = %project.id, "created project");
        Ok(project)
    }

    #[instrument(skip(self))]
    pub async fn delete_project(&self, id: ProjectId) -> ClientResult<()> {
        expect_success(self.session.send(HttpRequest::delete(project_path(id))).await?)?;
        info!(project_id = %id, "deleted project");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_tasks(
        &self,
        project: ProjectId,
        page: PageRequest,
    ) -> ClientResult<Vec<Task>> {
        let request = paged(HttpRequest::get(project_tasks_path(project)), page);
        read_list(self.session.send(request).await?, "tasks")
    }

    #[instrument(skip(self, draft, key), fields(title = %draft.title))]
    pub async fn create_task(
        &self,
        project: ProjectId,
        draft: &NewTask,
        key: Option<&IdempotencyKey>,
    ) -> ClientResult<Task> {
        let request = with_key(
            HttpRequest::post(project_tasks_path(project), encode(draft)?),
            key,
        );
        let task: Task = decode(self.session.send(request).await?)?;
        info!(task_id = %task.id, "created task");
        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, id: TaskId) -> ClientResult<()> {
        expect_success(self.session.send(HttpRequest::delete(task_path(id))).await?)?;
        info!(task_id = %id, "deleted task");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_comments(
        &self,
        task: TaskId,
        page: PageRequest,
    ) -> ClientResult<Vec<Comment>> {
        let request = paged(HttpRequest::get(task_comments_path(task)), page);
        read_list(self.session.send(request).await?, "comments")
    }

    #[instrument(skip(self, draft, key))]
    pub async fn create_comment(
        &self,
        task: TaskId,
        draft: &NewComment,
        key: Option<&IdempotencyKey>,
    ) -> ClientResult<Comment> {
        let request = with_key(
            HttpRequest::post(task_comments_path(task), encode(draft)?),
            key,
        );
        let comment: Comment = decode(self.session.send(request).await?)?;
        info!(comment_id = %comment.id, "added comment");
        Ok(comment)
    }

    #[instrument(skip(self))]
    pub async fn current_user(&self) -> ClientResult<User> {
        decode(self.session.send(HttpRequest::get(CURRENT_USER_PATH)).await?)
    }

    pub fn projects(&self) -> ProjectList<'_> {
        ProjectList { gateway: self }
    }

    pub fn tasks_of(&self, project: ProjectId) -> ProjectTasks<'_> {
        ProjectTasks {
            gateway: self,
            project,
        }
    }
}

pub struct ProjectList<'a> {
    gateway: &'a Gateway,
}

#[async_trait]
impl ListSource<Project> for ProjectList<'_> {
    async fn list(&self, page: PageRequest) -> ClientResult<Vec<Project>> {
        self.gateway.list_projects(page).await
    }
}

pub struct ProjectTasks<'a> {
    gateway: &'a Gateway,
    project: ProjectId,
}

#[async_trait]
impl ListSource<Task> for ProjectTasks<'_> {
    async fn list(&self, page: PageRequest) -> ClientResult<Vec<Task>> {
        self.gateway.list_tasks(self.project, page).await
    }
}

fn paged(request: HttpRequest, page: PageRequest) -> HttpRequest {
    request
        .with_query("limit", page.limit())
        .with_query("offset", page.offset())
}

fn with_key(request: HttpRequest, key: Option<&IdempotencyKey>) -> HttpRequest {
    match key {
        Some(key) => request.with_header(IDEMPOTENCY_HEADER, key.as_str()),
        None => request,
    }
}

fn encode<T: Serialize>(payload: &T) -> ClientResult<serde_json::Value> {
    serde_json::to_value(payload)
        .map_err(|err| ClientError::Validation(format!("cannot encode request body: {err}")))
}

fn failure(response: &HttpResponse) -> ClientError {
    ClientError::from_status(response.status, &response.body, response.retry_after_secs)
}

fn decode<T: DeserializeOwned>(response: HttpResponse) -> ClientResult<T> {
    if !response.is_success() {
        return Err(failure(&response));
    }
    serde_json::from_str(&response.body).map_err(|err| {
        ClientError::Unknown(format!(
            "HTTP {} with unreadable body: {err}",
            response.status
        ))
    })
}

fn expect_success(response: HttpResponse) -> ClientResult<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(failure(&response))
    }
}

fn read_list<T: DeserializeOwned>(response: HttpResponse, what: &str) -> ClientResult<Vec<T>> {
    match decode(response) {
        Err(ClientError::NotFound(message)) => {
            debug!(list = what, message = %message, "list not found; showing empty page");
            Ok(vec![])
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Gateway;
    use crate::error::ClientError;
    use crate::idempotency::IdempotencyKeyPolicy;
    use crate::model::{NewComment, NewProject, ProjectId, TaskId};
    use crate::paging::PageRequest;
    use crate::session::Session;
    use crate::testing::FakeTransport;
    use crate::transport::{HttpResponse, Method};

    fn gateway() -> (Arc<FakeTransport>, Gateway) {
        let transport = Arc::new(FakeTransport::new());
        let gateway = Gateway::new(Arc::new(Session::new(transport.clone())));
        (transport, gateway)
    }

    #[tokio::test]
    async fn lists_with_typed_paging_parameters() {
        let (transport, gateway) = gateway();
        transport.respond(
            200,
            r#"[{"id":1,"name":"Alpha","description":null,"owner_id":3}]"#,
        );

        let page = PageRequest::new(10, 20).expect("page");
        let projects = gateway.list_projects(page).await.expect("list");
        assert_eq!(projects.len(), 1);

        let requests = transport.requests();
        let request = &requests[0];
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "api/v1/projects/");
        assert_eq!(request.query_value("limit"), Some("10"));
        assert_eq!(request.query_value("offset"), Some("20"));
    }

    #[tokio::test]
    async fn missing_parent_reads_as_empty_list() {
        let (transport, gateway) = gateway();
        transport.respond(404, r#"{"detail":"Project not found"}"#);

        let tasks = gateway
            .list_tasks(ProjectId(9), PageRequest::first(10).expect("page"))
            .await
            .expect("404 degrades");
        assert!(tasks.is_empty());
        assert_eq!(transport.requests()[0].path, "api/v1/projects/9/tasks");
    }

    #[tokio::test]
    async fn other_list_failures_propagate() {
        let (transport, gateway) = gateway();
        transport.respond(401, r#"{"detail":"Not authenticated"}"#);
        transport.fail_transport("connection refused");

        let page = PageRequest::first(10).expect("page");
        assert_eq!(
            gateway.list_comments(TaskId(1), page).await,
            Err(ClientError::Unauthorized("Not authenticated".to_string()))
        );
        assert!(matches!(
            gateway.list_comments(TaskId(1), page).await,
            Err(ClientError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn unreadable_success_body_is_unknown() {
        let (transport, gateway) = gateway();
        transport.respond(200, "<html>proxy login</html>");

        let err = gateway
            .list_projects(PageRequest::first(10).expect("page"))
            .await
            .expect_err("garbage body");
        assert!(matches!(err, ClientError::Unknown(_)));
    }

    #[tokio::test]
    async fn create_sends_key_header_once() {
        let (transport, gateway) = gateway();
        transport.respond(201, r#"{"id":4,"name":"Alpha","owner_id":1}"#);

        let draft = NewProject::new("Alpha", None).expect("draft");
        let key = IdempotencyKeyPolicy::default().for_project(&draft);
        let project = gateway
            .create_project(&draft, Some(&key))
            .await
            .expect("create");
        assert_eq!(project.id, ProjectId(4));

        let requests = transport.requests();
        let request = &requests[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(
            request
                .headers
                .iter()
                .filter(|(name, _)| name == "Idempotency-Key")
                .count(),
            1
        );
        assert_eq!(request.header("Idempotency-Key"), Some(key.as_str()));
        assert_eq!(request.body, Some(serde_json::json!({"name": "Alpha"})));
    }

    #[tokio::test]
    async fn create_without_key_sends_no_header() {
        let (transport, gateway) = gateway();
        transport.respond(
            201,
            r#"{"id":2,"body":"hi","created_at":"2024-05-01T10:00:00","author_id":1,"task_id":5}"#,
        );

        let draft = NewComment::new("hi").expect("draft");
        gateway
            .create_comment(TaskId(5), &draft, None)
            .await
            .expect("create");
        assert_eq!(transport.requests()[0].header("Idempotency-Key"), None);
        assert_eq!(transport.requests()[0].path, "api/v1/tasks/5/comments");
    }

    #[tokio::test]
    async fn write_failures_are_never_swallowed() {
        let (transport, gateway) = gateway();
        transport.respond(404, r#"{"detail":"Project not found"}"#);
        transport.push(HttpResponse {
            status: 429,
            body: r#"{"detail":"Too Many Requests"}"#.to_string(),
            retry_after_secs: Some(30),
        });

        assert_eq!(
            gateway.delete_project(ProjectId(3)).await,
            Err(ClientError::NotFound("Project not found".to_string()))
        );
        assert_eq!(
            gateway.delete_task(TaskId(3)).await,
            Err(ClientError::RateLimited {
                retry_after_secs: Some(30)
            })
        );
        assert_eq!(transport.requests()[1].path, "api/v1/tasks/3");
    }

    #[tokio::test]
    async fn delete_accepts_empty_no_content() {
        let (transport, gateway) = gateway();
        transport.respond(204, "");
        gateway.delete_task(TaskId(8)).await.expect("deleted");
        assert_eq!(transport.requests()[0].method, Method::Delete);
    }

    #[tokio::test]
    async fn reads_current_user() {
        let (transport, gateway) = gateway();
        transport.respond(200, r#"{"id":1,"email":"me@example.com","name":null}"#);
        let user = gateway.current_user().await.expect("me");
        assert_eq!(user.email, "me@example.com");
        assert_eq!(transport.requests()[0].path, "api/v1/users/me");
    }
}
