use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::model::{ProjectId, TaskId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub selected_project_id: Option<ProjectId>,
    pub selected_task_id: Option<TaskId>,
}

/// Work the owner of the collections must carry out, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeEffect {
    ClearComments,
    /// Rewind the task list to its first page, keeping the page size.
    ResetTaskPaging,
    ReloadTasks(ProjectId),
    ClearTasks,
    LoadComments(TaskId),
}

/// Keeps the project > task > comments chain consistent.
///
/// Every transition updates the selection immediately and returns the
/// effects on dependent lists. A task is never selected without a project.
#[derive(Debug, Default)]
pub struct SelectionCascade {
    state: SelectionState,
}

impl SelectionCascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn selected_project(&self) -> Option<ProjectId> {
        self.state.selected_project_id
    }

    pub fn selected_task(&self) -> Option<TaskId> {
        self.state.selected_task_id
    }

    pub fn select_project(&mut self, project: Option<ProjectId>) -> Vec<CascadeEffect> {
        if project == self.state.selected_project_id {
            return vec![];
        }
        self.state.selected_project_id = project;
        self.state.selected_task_id = None;

        match project {
            Some(id) => {
                debug!(project_id = %id, "project selection changed");
                vec![
                    CascadeEffect::ClearComments,
                    CascadeEffect::ResetTaskPaging,
                    CascadeEffect::ReloadTasks(id),
                ]
            }
            None => {
                debug!("project selection cleared");
                vec![CascadeEffect::ClearComments, CascadeEffect::ClearTasks]
            }
        }
    }

    pub fn select_task(&mut self, task: Option<TaskId>) -> ClientResult<Vec<CascadeEffect>> {
        if task.is_some() && self.state.selected_project_id.is_none() {
            return Err(ClientError::validation("select a project before selecting a task"));
        }
        if task == self.state.selected_task_id {
            return Ok(vec![]);
        }
        self.state.selected_task_id = task;

        Ok(match task {
            Some(id) => vec![CascadeEffect::ClearComments, CascadeEffect::LoadComments(id)],
            None => vec![CascadeEffect::ClearComments],
        })
    }

    pub fn project_deleted(&mut self, project: ProjectId) -> Vec<CascadeEffect> {
        if self.state.selected_project_id == Some(project) {
            self.select_project(None)
        } else {
            vec![]
        }
    }

    pub fn task_deleted(&mut self, task: TaskId) -> Vec<CascadeEffect> {
        if self.state.selected_task_id != Some(task) {
            return vec![];
        }
        self.state.selected_task_id = None;
        vec![CascadeEffect::ClearComments]
    }

    /// The task whose comments should currently be shown.
    pub fn comments_for(&self) -> Option<TaskId> {
        self.state.selected_task_id
    }

    /// Forgets everything, as on sign-out.
    pub fn reset(&mut self) -> Vec<CascadeEffect> {
        self.select_project(None)
    }
}

#[cfg(test)]
mod tests {
    use super::{CascadeEffect, SelectionCascade};
    use crate::error::ClientError;
    use crate::model::{ProjectId, TaskId};

    #[test]
    fn new_project_clears_dependents_before_reloading_tasks() {
        let mut cascade = SelectionCascade::new();
        cascade.select_project(Some(ProjectId(1)));
        cascade.select_task(Some(TaskId(7))).expect("task");

        let effects = cascade.select_project(Some(ProjectId(2)));
        assert_eq!(
            effects,
            vec![
                CascadeEffect::ClearComments,
                CascadeEffect::ResetTaskPaging,
                CascadeEffect::ReloadTasks(ProjectId(2)),
            ]
        );
        assert_eq!(cascade.selected_task(), None);
        assert_eq!(cascade.selected_project(), Some(ProjectId(2)));
    }

    #[test]
    fn reselecting_same_project_does_nothing() {
        let mut cascade = SelectionCascade::new();
        assert_eq!(cascade.select_project(Some(ProjectId(5))).len(), 3);
        cascade.select_task(Some(TaskId(1))).expect("task");

        assert!(cascade.select_project(Some(ProjectId(5))).is_empty());
        assert_eq!(cascade.selected_task(), Some(TaskId(1)));
    }

    #[test]
    fn clearing_project_never_reloads() {
        let mut cascade = SelectionCascade::new();
        cascade.select_project(Some(ProjectId(3)));
        let effects = cascade.select_project(None);
        assert_eq!(
            effects,
            vec![CascadeEffect::ClearComments, CascadeEffect::ClearTasks]
        );
        assert!(
            !effects
                .iter()
                .any(|effect| matches!(effect, CascadeEffect::ReloadTasks(_)))
        );
    }

    #[test]
    fn task_requires_project() {
        let mut cascade = SelectionCascade::new();
        assert!(matches!(
            cascade.select_task(Some(TaskId(1))),
            Err(ClientError::Validation(_))
        ));
        assert_eq!(cascade.selected_task(), None);
        assert_eq!(cascade.select_task(None).expect("clear"), vec![]);
    }

    #[test]
    fn task_selection_loads_and_clears_comments() {
        let mut cascade = SelectionCascade::new();
        cascade.select_project(Some(ProjectId(1)));
        assert_eq!(
            cascade.select_task(Some(TaskId(4))).expect("select"),
            vec![
                CascadeEffect::ClearComments,
                CascadeEffect::LoadComments(TaskId(4))
            ]
        );
        assert_eq!(cascade.comments_for(), Some(TaskId(4)));
        assert_eq!(
            cascade.select_task(None).expect("clear"),
            vec![CascadeEffect::ClearComments]
        );
        assert_eq!(cascade.comments_for(), None);
    }

    #[test]
    fn deletions_only_cascade_for_the_selection() {
        let mut cascade = SelectionCascade::new();
        cascade.select_project(Some(ProjectId(1)));
        cascade.select_task(Some(TaskId(2))).expect("task");

        assert!(cascade.task_deleted(TaskId(99)).is_empty());
        assert_eq!(
            cascade.task_deleted(TaskId(2)),
            vec![CascadeEffect::ClearComments]
        );
        assert!(cascade.project_deleted(ProjectId(42)).is_empty());
        assert_eq!(
            cascade.project_deleted(ProjectId(1)),
            vec![CascadeEffect::ClearComments, CascadeEffect::ClearTasks]
        );
        assert_eq!(cascade.state(), Default::default());
    }
}
