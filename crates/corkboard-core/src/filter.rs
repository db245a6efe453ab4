use std::collections::{
  BTreeMap,
  BTreeSet
};

use anyhow::Context;
use tracing::trace;

use crate::model::{
  Id,
  NO_PROJECT_ID,
  Project,
  Task
};

/// Which project's tasks a board view
/// shows.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum ProjectSelection {
  #[default]
  All,
  NoProject,
  Project(Id)
}

impl ProjectSelection {
  /// Wire form: `None` is no selection,
  /// the reserved sentinel is "no project".
  pub fn from_wire(
    value: Option<Id>
  ) -> Self {
    match value {
      | None => Self::All,
      | Some(NO_PROJECT_ID) => {
        Self::NoProject
      }
      | Some(id) => Self::Project(id)
    }
  }

  pub fn to_wire(self) -> Option<Id> {
    match self {
      | Self::All => None,
      | Self::NoProject => {
        Some(NO_PROJECT_ID)
      }
      | Self::Project(id) => Some(id)
    }
  }

  /// Parses `all`, `none`, or a project
  /// identifier.
  pub fn parse(
    raw: &str
  ) -> anyhow::Result<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" | "" => Ok(Self::All),
      | "none" => Ok(Self::NoProject),
      | other => {
        let id: Id =
          other.parse().with_context(
            || {
              format!(
                "invalid project \
                 selection: {raw}"
              )
            }
          )?;
        Ok(Self::from_wire(Some(id)))
      }
    }
  }

  pub fn matches(
    self,
    task: &Task
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::NoProject => {
        task.project.is_none()
      }
      | Self::Project(id) => {
        task.project == Some(id)
      }
    }
  }
}

/// The active project and label selection
/// of a board view.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct BoardFilter {
  project: ProjectSelection,
  labels:  BTreeSet<Id>
}

impl BoardFilter {
  pub fn new(
    project: ProjectSelection,
    labels: BTreeSet<Id>
  ) -> Self {
    Self {
      project,
      labels
    }
  }

  pub fn project(
    &self
  ) -> ProjectSelection {
    self.project
  }

  pub fn labels(&self) -> &BTreeSet<Id> {
    &self.labels
  }

  pub fn is_active(&self) -> bool {
    self.project != ProjectSelection::All
      || !self.labels.is_empty()
  }

  pub fn select_project(
    &mut self,
    selection: ProjectSelection
  ) {
    trace!(?selection, "project selection changed");
    self.project = selection;
  }

  pub fn set_label_filter(
    &mut self,
    labels: BTreeSet<Id>
  ) {
    trace!(?labels, "label filter changed");
    self.labels = labels;
  }

  pub fn matches_task(
    &self,
    task: &Task,
    projects: &BTreeMap<Id, Project>
  ) -> bool {
    task_matches(
      task,
      self.project,
      &self.labels,
      projects
    )
  }

  pub fn matches_project(
    &self,
    project: &Project
  ) -> bool {
    project_matches(project, &self.labels)
  }
}

/// Project selection AND label selection.
/// A task carries its project's labels for
/// matching; an unresolved project has
/// none.
pub fn filter_tasks<'a, I>(
  tasks: I,
  selected_project: ProjectSelection,
  active_labels: &BTreeSet<Id>,
  projects: &BTreeMap<Id, Project>
) -> Vec<&'a Task>
where
  I: IntoIterator<Item = &'a Task>
{
  tasks
    .into_iter()
    .filter(|task| {
      task_matches(
        task,
        selected_project,
        active_labels,
        projects
      )
    })
    .collect()
}

pub fn filter_projects<'a, I>(
  projects: I,
  active_labels: &BTreeSet<Id>
) -> Vec<&'a Project>
where
  I: IntoIterator<Item = &'a Project>
{
  projects
    .into_iter()
    .filter(|project| {
      project_matches(
        project,
        active_labels
      )
    })
    .collect()
}

fn task_matches(
  task: &Task,
  selected_project: ProjectSelection,
  active_labels: &BTreeSet<Id>,
  projects: &BTreeMap<Id, Project>
) -> bool {
  if !selected_project.matches(task) {
    return false;
  }

  if active_labels.is_empty() {
    return true;
  }

  if !task.labels.is_disjoint(active_labels)
  {
    return true;
  }

  task
    .project
    .and_then(|id| projects.get(&id))
    .is_some_and(|project| {
      !project
        .labels
        .is_disjoint(active_labels)
    })
}

fn project_matches(
  project: &Project,
  active_labels: &BTreeSet<Id>
) -> bool {
  active_labels.is_empty()
    || !project
      .labels
      .is_disjoint(active_labels)
}
