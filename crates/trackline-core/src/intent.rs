use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::model::{Comment, Project, ProjectId, Task, TaskId, User};
use crate::workspace::{ListKind, Workspace};

pub const HELP: &str = "\
login <email> <password>          sign in
register <email> <password> [name] create an account and sign in
logout                            forget the credential
whoami                            show the signed-in user
projects | tasks | comments       refresh a list
project <id> | project none       select a project
task <id> | task none             select a task on the current page
new project <name> [| description]
new task <title> [| description]
comment <body>                    comment on the selected task
rm project <id> | rm task <id>
next <projects|tasks>             page forward
prev <projects|tasks>             page back
size <projects|tasks> <n>         change the page size
help | quit";

/// A password typed at the shell; never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// One line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Login {
        email: String,
        password: Secret,
    },
    Register {
        email: String,
        password: Secret,
        name: Option<String>,
    },
    Logout,
    Whoami,
    Help,
    Quit,
    Refresh(ListKind),
    RefreshComments,
    SelectProject(Option<ProjectId>),
    SelectTask(Option<TaskId>),
    NewProject {
        name: String,
        description: Option<String>,
    },
    NewTask {
        title: String,
        description: Option<String>,
    },
    Comment(String),
    DeleteProject(ProjectId),
    DeleteTask(TaskId),
    NextPage(ListKind),
    PrevPage(ListKind),
    PageSize(ListKind, u32),
}

/// What a successfully executed intent produced beyond updated state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Updated,
    CreatedProject(Project),
    CreatedTask(Task),
    AddedComment(Comment),
    Deleted(String),
    User(User),
    SignedOut,
    Help,
    Quit,
}

impl FromStr for Intent {
    type Err = ClientError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (command, rest) = split_word(line);
        match command.to_ascii_lowercase().as_str() {
            "login" => {
                let (email, password) = split_word(rest);
                if email.is_empty() || password.is_empty() {
                    return Err(usage("login <email> <password>"));
                }
                Ok(Self::Login {
                    email: email.to_string(),
                    password: Secret::new(password),
                })
            }
            "register" => {
                let (email, rest) = split_word(rest);
                let (password, name) = split_word(rest);
                if email.is_empty() || password.is_empty() {
                    return Err(usage("register <email> <password> [name]"));
                }
                Ok(Self::Register {
                    email: email.to_string(),
                    password: Secret::new(password),
                    name: non_empty(name),
                })
            }
            "logout" => no_args(rest, Self::Logout),
            "whoami" => no_args(rest, Self::Whoami),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => no_args(rest, Self::Quit),
            "projects" => no_args(rest, Self::Refresh(ListKind::Projects)),
            "tasks" => no_args(rest, Self::Refresh(ListKind::Tasks)),
            "comments" => no_args(rest, Self::RefreshComments),
            "project" => Ok(Self::SelectProject(optional_id(rest, "project <id>|none")?)),
            "task" => Ok(Self::SelectTask(optional_id(rest, "task <id>|none")?)),
            "new" => {
                let (kind, rest) = split_word(rest);
                let (head, description) = match rest.split_once('|') {
                    Some((head, tail)) => (head.trim(), non_empty(tail)),
                    None => (rest, None),
                };
                match kind.to_ascii_lowercase().as_str() {
                    "project" => Ok(Self::NewProject {
                        name: head.to_string(),
                        description,
                    }),
                    "task" => Ok(Self::NewTask {
                        title: head.to_string(),
                        description,
                    }),
                    _ => Err(usage("new project|task <name> [| description]")),
                }
            }
            "comment" => Ok(Self::Comment(rest.to_string())),
            "rm" | "delete" => {
                let (kind, id) = split_word(rest);
                match kind.to_ascii_lowercase().as_str() {
                    "project" => Ok(Self::DeleteProject(id.parse()?)),
                    "task" => Ok(Self::DeleteTask(id.parse()?)),
                    _ => Err(usage("rm project|task <id>")),
                }
            }
            "next" => Ok(Self::NextPage(rest.parse()?)),
            "prev" => Ok(Self::PrevPage(rest.parse()?)),
            "size" => {
                let (list, size) = split_word(rest);
                let size = size
                    .parse::<u32>()
                    .map_err(|_| usage("size <projects|tasks> <n>"))?;
                Ok(Self::PageSize(list.parse()?, size))
            }
            "" => Err(ClientError::validation("empty command")),
            other => Err(ClientError::Validation(format!(
                "unknown command {other:?}; try help"
            ))),
        }
    }
}

impl Intent {
    /// Short name for logs; never includes arguments.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Register { .. } => "register",
            Self::Logout => "logout",
            Self::Whoami => "whoami",
            Self::Help => "help",
            Self::Quit => "quit",
            Self::Refresh(_) | Self::RefreshComments => "refresh",
            Self::SelectProject(_) => "select_project",
            Self::SelectTask(_) => "select_task",
            Self::NewProject { .. } => "create_project",
            Self::NewTask { .. } => "create_task",
            Self::Comment(_) => "add_comment",
            Self::DeleteProject(_) => "delete_project",
            Self::DeleteTask(_) => "delete_task",
            Self::NextPage(_) => "next_page",
            Self::PrevPage(_) => "prev_page",
            Self::PageSize(..) => "set_page_size",
        }
    }

    pub async fn execute(self, workspace: &mut Workspace) -> ClientResult<Outcome> {
        debug!(intent = self.name(), "executing intent");
        match self {
            Self::Login { email, password } => {
                workspace.login(&email, password.expose()).await?;
                Ok(Outcome::Updated)
            }
            Self::Register {
                email,
                password,
                name,
            } => {
                workspace
                    .register(&email, password.expose(), name.as_deref())
                    .await?;
                Ok(Outcome::Updated)
            }
            Self::Logout => {
                workspace.sign_out();
                Ok(Outcome::SignedOut)
            }
            Self::Whoami => Ok(Outcome::User(workspace.whoami().await?)),
            Self::Help => Ok(Outcome::Help),
            Self::Quit => Ok(Outcome::Quit),
            Self::Refresh(list) => {
                workspace.refresh(list).await?;
                Ok(Outcome::Updated)
            }
            Self::RefreshComments => {
                workspace.refresh_comments().await?;
                Ok(Outcome::Updated)
            }
            Self::SelectProject(project) => {
                workspace.select_project(project).await?;
                Ok(Outcome::Updated)
            }
            Self::SelectTask(task) => {
                workspace.select_task(task).await?;
                Ok(Outcome::Updated)
            }
            Self::NewProject { name, description } => Ok(Outcome::CreatedProject(
                workspace
                    .create_project(&name, description.as_deref())
                    .await?,
            )),
            Self::NewTask { title, description } => Ok(Outcome::CreatedTask(
                workspace.create_task(&title, description.as_deref()).await?,
            )),
            Self::Comment(body) => Ok(Outcome::AddedComment(workspace.add_comment(&body).await?)),
            Self::DeleteProject(project) => {
                workspace.delete_project(project).await?;
                Ok(Outcome::Deleted(format!("project {project}")))
            }
            Self::DeleteTask(task) => {
                workspace.delete_task(task).await?;
                Ok(Outcome::Deleted(format!("task {task}")))
            }
            Self::NextPage(list) => {
                workspace.next_page(list).await?;
                Ok(Outcome::Updated)
            }
            Self::PrevPage(list) => {
                workspace.prev_page(list).await?;
                Ok(Outcome::Updated)
            }
            Self::PageSize(list, size) => {
                workspace.set_page_size(list, size).await?;
                Ok(Outcome::Updated)
            }
        }
    }
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (text, ""),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn no_args(rest: &str, intent: Intent) -> ClientResult<Intent> {
    if rest.is_empty() {
        Ok(intent)
    } else {
        Err(ClientError::Validation(format!(
            "{} takes no arguments",
            intent.name()
        )))
    }
}

fn optional_id<T>(rest: &str, form: &str) -> ClientResult<Option<T>>
where
    T: FromStr<Err = ClientError>,
{
    match rest {
        "" => Err(usage(form)),
        "none" | "-" => Ok(None),
        id => id.parse().map(Some),
    }
}

fn usage(form: &str) -> ClientError {
    ClientError::Validation(format!("usage: {form}"))
}

#[cfg(test)]
mod tests {
    use super::{Intent, Secret};
    use crate::error::ClientError;
    use crate::model::{ProjectId, TaskId};
    use crate::workspace::ListKind;

    fn parse(line: &str) -> Intent {
        line.parse().expect("valid intent")
    }

    #[test]
    fn parses_selection_and_deletion() {
        assert_eq!(
            parse("project 5"),
            Intent::SelectProject(Some(ProjectId(5)))
        );
        assert_eq!(parse("project none"), Intent::SelectProject(None));
        assert_eq!(parse("  task   12 "), Intent::SelectTask(Some(TaskId(12))));
        assert_eq!(parse("rm task 3"), Intent::DeleteTask(TaskId(3)));
        assert_eq!(parse("rm project 4"), Intent::DeleteProject(ProjectId(4)));
    }

    #[test]
    fn parses_creation_with_optional_description() {
        assert_eq!(
            parse("new project Home renovation | kitchen first"),
            Intent::NewProject {
                name: "Home renovation".to_string(),
                description: Some("kitchen first".to_string()),
            }
        );
        assert_eq!(
            parse("new task Paint walls"),
            Intent::NewTask {
                title: "Paint walls".to_string(),
                description: None,
            }
        );
        assert_eq!(
            parse("new task Paint |  "),
            Intent::NewTask {
                title: "Paint".to_string(),
                description: None,
            }
        );
        assert_eq!(
            parse("comment looks good to me"),
            Intent::Comment("looks good to me".to_string())
        );
    }

    #[test]
    fn parses_paging() {
        assert_eq!(parse("next tasks"), Intent::NextPage(ListKind::Tasks));
        assert_eq!(parse("prev projects"), Intent::PrevPage(ListKind::Projects));
        assert_eq!(parse("size tasks 5"), Intent::PageSize(ListKind::Tasks, 5));
        assert_eq!(parse("projects"), Intent::Refresh(ListKind::Projects));
        assert_eq!(parse("comments"), Intent::RefreshComments);
    }

    #[test]
    fn parses_auth_without_leaking_password() {
        let intent = parse("register me@example.com hunter2 Ada Lovelace");
        assert_eq!(
            intent,
            Intent::Register {
                email: "me@example.com".to_string(),
                password: Secret::new("hunter2"),
                name: Some("Ada Lovelace".to_string()),
            }
        );
        assert!(!format!("{intent:?}").contains("hunter2"));
        assert_eq!(
            parse("login me@example.com pw"),
            Intent::Login {
                email: "me@example.com".to_string(),
                password: Secret::new("pw"),
            }
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in [
            "",
            "frobnicate",
            "project",
            "project 0",
            "task abc",
            "size tasks -1",
            "size comments 5",
            "next",
            "login me@example.com",
            "rm comment 1",
            "quit now",
        ] {
            assert!(
                matches!(line.parse::<Intent>(), Err(ClientError::Validation(_))),
                "{line:?} should be rejected"
            );
        }
    }
}
