use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::error::ClientError;
use crate::intent::{HELP, Outcome};
use crate::model::{Comment, Project, Task};
use crate::paging::{LoadStatus, PageView};
use crate::workspace::WorkspaceView;

const MAX_CELL_WIDTH: usize = 48;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);
        Ok(Self::with_color(color && io::stdout().is_terminal()))
    }

    pub fn with_color(color: bool) -> Self {
        Self { color }
    }

    #[tracing::instrument(skip_all)]
    pub fn render_view<W: Write>(
        &self,
        out: &mut W,
        view: &WorkspaceView<'_>,
    ) -> anyhow::Result<()> {
        if !view.is_authenticated {
            writeln!(out, "{}", self.paint("not signed in; use login or register", "33"))?;
        }

        self.section_header(out, "Projects", &view.projects)?;
        let selected_project = view.selection.selected_project_id;
        let rows = view
            .projects
            .items
            .iter()
            .map(|project| self.project_row(project, Some(project.id) == selected_project))
            .collect();
        self.write_page(out, vec!["", "ID", "Name", "Description"], rows, &view.projects)?;

        let Some(project_id) = selected_project else {
            return Ok(());
        };
        let title = match view.selected_project() {
            Some(project) => format!("Tasks in {}", project.name),
            None => format!("Tasks in project {project_id}"),
        };
        writeln!(out)?;
        self.section_header(out, &title, &view.tasks)?;
        let selected_task = view.selection.selected_task_id;
        let rows = view
            .tasks
            .items
            .iter()
            .map(|task| self.task_row(task, Some(task.id) == selected_task))
            .collect();
        self.write_page(
            out,
            vec!["", "ID", "Status", "Pri", "Title", "Due"],
            rows,
            &view.tasks,
        )?;

        let Some(task_id) = selected_task else {
            return Ok(());
        };
        writeln!(out)?;
        writeln!(out, "{}", self.paint(&format!("Comments on task {task_id}"), "1"))?;
        if let Some(message) = status_line(view.comments_status) {
            writeln!(out, "{message}")?;
        }
        let comments = view
            .comments
            .filter(|list| list.task_id == task_id)
            .map(|list| list.comments.as_slice())
            .unwrap_or_default();
        if comments.is_empty() {
            writeln!(out, "(no comments)")?;
        } else {
            let rows = comments.iter().map(|comment| self.comment_row(comment)).collect();
            write_table(out, vec!["ID", "When", "Author", "Comment"], rows)?;
        }
        Ok(())
    }

    pub fn render_outcome<W: Write>(&self, out: &mut W, outcome: &Outcome) -> anyhow::Result<()> {
        match outcome {
            Outcome::Updated | Outcome::Quit => {}
            Outcome::CreatedProject(project) => {
                writeln!(out, "created project {} ({})", project.id, project.name)?;
            }
            Outcome::CreatedTask(task) => {
                writeln!(out, "created task {} ({})", task.id, task.title)?;
            }
            Outcome::AddedComment(comment) => {
                writeln!(out, "added comment {}", comment.id)?;
            }
            Outcome::Deleted(what) => writeln!(out, "deleted {what}")?,
            Outcome::User(user) => match &user.name {
                Some(name) => writeln!(out, "{} <{}> (id {})", name, user.email, user.id)?,
                None => writeln!(out, "{} (id {})", user.email, user.id)?,
            },
            Outcome::SignedOut => writeln!(out, "signed out")?,
            Outcome::Help => writeln!(out, "{HELP}")?,
        }
        Ok(())
    }

    pub fn render_error<W: Write>(&self, out: &mut W, err: &ClientError) -> anyhow::Result<()> {
        let hint = match err {
            ClientError::Unauthorized(_) => " (try login)",
            ClientError::RateLimited { .. } | ClientError::Transport(_) => " (retry later)",
            _ => "",
        };
        writeln!(out, "{}{hint}", self.paint(&format!("error: {err}"), "31"))?;
        Ok(())
    }

    fn section_header<W: Write, T>(
        &self,
        out: &mut W,
        title: &str,
        page: &PageView<'_, T>,
    ) -> anyhow::Result<()> {
        writeln!(
            out,
            "{}  page {} (size {})",
            self.paint(title, "1"),
            page.page_index + 1,
            page.page_size
        )?;
        if let Some(message) = status_line(page.status) {
            writeln!(out, "{}", self.paint(&message, "31"))?;
        }
        Ok(())
    }

    fn write_page<W: Write, T>(
        &self,
        out: &mut W,
        headers: Vec<&str>,
        rows: Vec<Vec<String>>,
        page: &PageView<'_, T>,
    ) -> anyhow::Result<()> {
        if rows.is_empty() {
            writeln!(out, "(empty)")?;
            return Ok(());
        }
        write_table(&mut *out, headers, rows)?;
        if !page.has_more {
            writeln!(out, "(no more items)")?;
        }
        Ok(())
    }

    fn project_row(&self, project: &Project, selected: bool) -> Vec<String> {
        vec![
            marker(selected),
            self.paint(&project.id.to_string(), "33"),
            truncate(&project.name),
            truncate(project.description.as_deref().unwrap_or_default()),
        ]
    }

    fn task_row(&self, task: &Task, selected: bool) -> Vec<String> {
        let due = task.due_date.map(local_date).unwrap_or_default();
        let due = match task.due_date {
            Some(date) if date < Utc::now() => self.paint(&due, "31"),
            _ => due,
        };
        vec![
            marker(selected),
            self.paint(&task.id.to_string(), "33"),
            task.status.to_string(),
            task.priority.to_string(),
            truncate(&task.title),
            due,
        ]
    }

    fn comment_row(&self, comment: &Comment) -> Vec<String> {
        vec![
            self.paint(&comment.id.to_string(), "33"),
            comment
                .created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            comment.author_id.to_string(),
            truncate(&comment.body),
        ]
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn status_line(status: &LoadStatus) -> Option<String> {
    match status {
        LoadStatus::Idle | LoadStatus::Loaded => None,
        LoadStatus::Loading => Some("loading...".to_string()),
        LoadStatus::Failed(err) => Some(format!("last reload failed: {err}")),
    }
}

fn marker(selected: bool) -> String {
    let mark = if selected { "*" } else { "" };
    mark.to_string()
}

fn local_date(date: DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

fn truncate(text: &str) -> String {
    let text = text.replace(['\n', '\r'], " ");
    if UnicodeWidthStr::width(text.as_str()) <= MAX_CELL_WIDTH {
        return text;
    }
    let mut out = String::new();
    let mut width = 0;
    for ch in text.chars() {
        let ch_width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width + 1 > MAX_CELL_WIDTH {
            break;
        }
        width += ch_width;
        out.push(ch);
    }
    out.push('…');
    out
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<&str>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(*header));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        write!(writer, "{:width$} ", header, width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
