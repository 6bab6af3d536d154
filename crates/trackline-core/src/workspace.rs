use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::cascade::{CascadeEffect, SelectionCascade, SelectionState};
use crate::config::{Config, DEFAULT_BASE_URL};
use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::idempotency::{ActionKind, IdempotencyKeyPolicy};
use crate::model::{
    Comment, NewComment, NewProject, NewTask, Project, ProjectId, Task, TaskId, User,
};
use crate::paging::{Completion, LoadStatus, PageRequest, PageView, PagedCollection, ReloadTicket};
use crate::session::{Credentials, Session};
use crate::transport::{ReqwestTransport, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceOptions {
    pub project_page_size: u32,
    pub task_page_size: u32,
    pub comment_limit: u32,
    pub idempotency_secret: Option<String>,
}

impl Default for WorkspaceOptions {
    fn default() -> Self {
        Self {
            project_page_size: 10,
            task_page_size: 10,
            comment_limit: 10,
            idempotency_secret: None,
        }
    }
}

impl WorkspaceOptions {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            project_page_size: cfg
                .get_u32("projects.page_size")?
                .unwrap_or(defaults.project_page_size),
            task_page_size: cfg
                .get_u32("tasks.page_size")?
                .unwrap_or(defaults.task_page_size),
            comment_limit: cfg
                .get_u32("comments.limit")?
                .unwrap_or(defaults.comment_limit),
            idempotency_secret: cfg.get("idempotency.secret"),
        })
    }
}

/// The two lists that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Projects,
    Tasks,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Projects => "projects",
            Self::Tasks => "tasks",
        })
    }
}

impl FromStr for ListKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "projects" | "project" => Ok(Self::Projects),
            "tasks" | "task" => Ok(Self::Tasks),
            other => Err(ClientError::Validation(format!(
                "expected projects or tasks, got: {other}"
            ))),
        }
    }
}

/// Comments shown for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentList {
    pub task_id: TaskId,
    pub comments: Vec<Comment>,
}

/// Everything the presentation layer may read.
#[derive(Debug, Clone)]
pub struct WorkspaceView<'a> {
    pub projects: PageView<'a, Project>,
    pub tasks: PageView<'a, Task>,
    pub selection: SelectionState,
    pub comments: Option<&'a CommentList>,
    pub comments_status: &'a LoadStatus,
    pub is_authenticated: bool,
}

impl WorkspaceView<'_> {
    pub fn selected_project(&self) -> Option<&Project> {
        let id = self.selection.selected_project_id?;
        self.projects.items.iter().find(|project| project.id == id)
    }

    pub fn selected_task(&self) -> Option<&Task> {
        let id = self.selection.selected_task_id?;
        self.tasks.items.iter().find(|task| task.id == id)
    }
}

/// Client state for one signed-in user: the project, task and comment
/// lists, the current selection, and the intents that change them.
///
/// Intents return the failure they hit; the workspace stays usable after
/// any of them.
pub struct Workspace {
    session: Arc<Session>,
    gateway: Gateway,
    keys: IdempotencyKeyPolicy,
    cascade: SelectionCascade,
    projects: PagedCollection<Project>,
    tasks: PagedCollection<Task>,
    comments: Option<CommentList>,
    comments_status: LoadStatus,
    comment_limit: u32,
}

impl Workspace {
    pub fn new(transport: Arc<dyn Transport>, options: WorkspaceOptions) -> ClientResult<Self> {
        if options.comment_limit == 0 {
            return Err(ClientError::validation("comment limit must be at least 1"));
        }
        let session = Arc::new(Session::new(transport));
        Ok(Self {
            gateway: Gateway::new(session.clone()),
            session,
            keys: IdempotencyKeyPolicy::new(options.idempotency_secret.as_deref()),
            cascade: SelectionCascade::new(),
            projects: PagedCollection::new(options.project_page_size)?,
            tasks: PagedCollection::new(options.task_page_size)?,
            comments: None,
            comments_status: LoadStatus::Idle,
            comment_limit: options.comment_limit,
        })
    }

    /// Builds a workspace talking HTTP to the service named in `cfg`.
    #[instrument(skip(cfg))]
    pub fn connect(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = cfg
            .get("api.base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout = Duration::from_secs(cfg.get_u64("api.timeout_secs")?.unwrap_or(30));
        let transport = ReqwestTransport::new(&base_url, timeout)?;
        let options = WorkspaceOptions::from_config(cfg)?;
        info!(base_url = %transport.base_url(), "workspace connected");
        Self::new(Arc::new(transport), options).context("invalid workspace options")
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn selection(&self) -> SelectionState {
        self.cascade.state()
    }

    pub fn view(&self) -> WorkspaceView<'_> {
        WorkspaceView {
            projects: self.projects.view(),
            tasks: self.tasks.view(),
            selection: self.cascade.state(),
            comments: self.comments.as_ref(),
            comments_status: &self.comments_status,
            is_authenticated: self.session.is_authenticated(),
        }
    }

    #[instrument(skip_all)]
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<()> {
        self.authenticate(Credentials::login(email, password)).await
    }

    #[instrument(skip_all)]
    pub async fn register(
        &mut self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> ClientResult<()> {
        self.authenticate(Credentials::register(
            email,
            password,
            name.map(str::to_string),
        ))
        .await
    }

    /// Signing in succeeds once the credential is stored. A failed first
    /// project load only shows up as the project list's status.
    async fn authenticate(&mut self, credentials: Credentials) -> ClientResult<()> {
        self.session.authenticate(credentials).await?;
        let effects = self.cascade.reset();
        self.apply(effects).await?;
        if let Err(err) = self.refresh(ListKind::Projects).await {
            warn!(error = %err, "signed in but the project list did not load");
        }
        Ok(())
    }

    pub fn sign_out(&mut self) {
        self.session.sign_out();
        self.cascade.reset();
        self.projects.clear();
        self.tasks.clear();
        self.clear_comments();
    }

    pub async fn whoami(&self) -> ClientResult<User> {
        self.gateway.current_user().await
    }

    #[instrument(skip(self))]
    pub async fn select_project(&mut self, project: Option<ProjectId>) -> ClientResult<()> {
        let effects = self.cascade.select_project(project);
        if !effects.is_empty() {
            info!(project_id = ?project.map(|id| id.0), "project selected");
        }
        self.apply(effects).await
    }

    #[instrument(skip(self))]
    pub async fn select_task(&mut self, task: Option<TaskId>) -> ClientResult<()> {
        if let Some(id) = task
            && self.cascade.selected_project().is_some()
            && !self.tasks.items().iter().any(|candidate| candidate.id == id)
        {
            return Err(ClientError::Validation(format!(
                "task {id} is not on the current task page"
            )));
        }
        let effects = self.cascade.select_task(task)?;
        if !effects.is_empty() {
            info!(task_id = ?task.map(|id| id.0), "task selected");
        }
        self.apply(effects).await
    }

    #[instrument(skip(self, description))]
    pub async fn create_project(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> ClientResult<Project> {
        let draft = NewProject::new(name, description)?;
        let key = self.keys.for_project(&draft);
        let project = self.gateway.create_project(&draft, Some(&key)).await?;
        self.refresh(ListKind::Projects).await?;
        Ok(project)
    }

    #[instrument(skip(self))]
    pub async fn delete_project(&mut self, project: ProjectId) -> ClientResult<()> {
        self.gateway.delete_project(project).await?;
        let effects = self.cascade.project_deleted(project);
        self.apply(effects).await?;
        self.refresh(ListKind::Projects).await
    }

    #[instrument(skip(self, description))]
    pub async fn create_task(
        &mut self,
        title: &str,
        description: Option<&str>,
    ) -> ClientResult<Task> {
        let project = self
            .cascade
            .selected_project()
            .ok_or_else(|| ClientError::validation("select a project before creating a task"))?;
        let draft = NewTask::new(title, description)?;
        let key = self.keys.for_task(project, &draft);
        let task = self.gateway.create_task(project, &draft, Some(&key)).await?;
        self.refresh(ListKind::Tasks).await?;
        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&mut self, task: TaskId) -> ClientResult<()> {
        self.gateway.delete_task(task).await?;
        let effects = self.cascade.task_deleted(task);
        self.apply(effects).await?;
        self.refresh(ListKind::Tasks).await
    }

    #[instrument(skip_all)]
    pub async fn add_comment(&mut self, body: &str) -> ClientResult<Comment> {
        let task = self
            .cascade
            .selected_task()
            .ok_or_else(|| ClientError::validation("select a task before commenting"))?;
        let draft = NewComment::new(body)?;
        let key = self.keys.fresh(ActionKind::CreateComment);
        let comment = self.gateway.create_comment(task, &draft, Some(&key)).await?;
        self.load_comments(task).await?;
        Ok(comment)
    }

    pub async fn set_page_size(&mut self, list: ListKind, page_size: u32) -> ClientResult<()> {
        match list {
            ListKind::Projects => {
                let ticket = self.projects.set_page_size(page_size)?;
                self.run_projects(ticket).await
            }
            ListKind::Tasks => {
                let ticket = self.tasks.set_page_size(page_size)?;
                self.run_tasks(ticket).await
            }
        }
    }

    pub async fn next_page(&mut self, list: ListKind) -> ClientResult<()> {
        match list {
            ListKind::Projects => {
                let ticket = self.projects.next_page();
                self.run_projects(ticket).await
            }
            ListKind::Tasks => {
                let ticket = self.tasks.next_page();
                self.run_tasks(ticket).await
            }
        }
    }

    pub async fn prev_page(&mut self, list: ListKind) -> ClientResult<()> {
        match list {
            ListKind::Projects => match self.projects.prev_page() {
                Some(ticket) => self.run_projects(ticket).await,
                None => Ok(()),
            },
            ListKind::Tasks => match self.tasks.prev_page() {
                Some(ticket) => self.run_tasks(ticket).await,
                None => Ok(()),
            },
        }
    }

    pub async fn refresh(&mut self, list: ListKind) -> ClientResult<()> {
        match list {
            ListKind::Projects => {
                let ticket = self.projects.begin_reload();
                self.run_projects(ticket).await
            }
            ListKind::Tasks => {
                let ticket = self.tasks.begin_reload();
                self.run_tasks(ticket).await
            }
        }
    }

    /// Reloads the comments of the selected task, if any.
    pub async fn refresh_comments(&mut self) -> ClientResult<()> {
        match self.cascade.comments_for() {
            Some(task) => self.load_comments(task).await,
            None => Ok(()),
        }
    }

    /// Lands a comment page for `task`, dropping it when `task` is no
    /// longer the selected one.
    pub fn apply_comments(
        &mut self,
        task: TaskId,
        result: ClientResult<Vec<Comment>>,
    ) -> Completion {
        if self.cascade.comments_for() != Some(task) {
            debug!(task_id = %task, "discarding comments for deselected task");
            return Completion::Superseded;
        }
        match result {
            Ok(comments) => {
                debug!(task_id = %task, count = comments.len(), "comments loaded");
                self.comments = Some(CommentList {
                    task_id: task,
                    comments,
                });
                self.comments_status = LoadStatus::Loaded;
            }
            Err(err) => {
                debug!(task_id = %task, error = %err, "comment reload failed");
                self.comments_status = LoadStatus::Failed(err);
            }
        }
        Completion::Applied
    }

    async fn load_comments(&mut self, task: TaskId) -> ClientResult<()> {
        let page = PageRequest::first(self.comment_limit)?;
        if self.comments.as_ref().is_some_and(|list| list.task_id != task) {
            self.comments = None;
        }
        self.comments_status = LoadStatus::Loading;
        let result = self.gateway.list_comments(task, page).await;
        let failure = result.as_ref().err().cloned();
        match (self.apply_comments(task, result), failure) {
            (Completion::Applied, Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    fn clear_comments(&mut self) {
        self.comments = None;
        self.comments_status = LoadStatus::Idle;
    }

    async fn run_projects(&mut self, ticket: ReloadTicket) -> ClientResult<()> {
        self.projects.run(ticket, &self.gateway.projects()).await?;
        Ok(())
    }

    /// Without a selected project the page state still moves, but nothing
    /// is fetched and the list stays empty.
    async fn run_tasks(&mut self, ticket: ReloadTicket) -> ClientResult<()> {
        match self.cascade.selected_project() {
            Some(project) => {
                self.tasks.run(ticket, &self.gateway.tasks_of(project)).await?;
            }
            None => {
                debug!("no project selected; task page updated locally");
                self.tasks.complete(ticket, Ok(vec![]));
            }
        }
        Ok(())
    }

    async fn apply(&mut self, effects: Vec<CascadeEffect>) -> ClientResult<()> {
        for effect in effects {
            debug!(?effect, "applying cascade effect");
            match effect {
                CascadeEffect::ClearComments => self.clear_comments(),
                CascadeEffect::ResetTaskPaging | CascadeEffect::ClearTasks => self.tasks.clear(),
                CascadeEffect::ReloadTasks(project) => {
                    let ticket = self.tasks.begin_reload();
                    self.tasks.run(ticket, &self.gateway.tasks_of(project)).await?;
                }
                CascadeEffect::LoadComments(task) => self.load_comments(task).await?,
            }
        }
        Ok(())
    }
}
