use std::collections::BTreeSet;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use corkboard_shared::{NewProjectDto, NewTaskDto, ProjectPatchDto, TaskPatchDto};
use tracing::debug;

use crate::datetime::{format_wire_date, parse_wire_date};
use crate::model::{Id, Priority, Project, Task, project_ref};

/// Partial update of a task. `None` leaves a field untouched; for
/// nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub labels: Option<BTreeSet<Id>>,
    pub assignees: Option<BTreeSet<Id>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub project: Option<Option<Id>>,
    pub parent_task: Option<Option<Id>>,
    pub closed: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn from_dto(dto: TaskPatchDto) -> anyhow::Result<Self> {
        if let Some(title) = dto.title.as_deref() {
            ensure_title(title)?;
        }
        Ok(Self {
            title: dto.title,
            description: dto.description,
            priority: dto.priority.map(Priority::from),
            labels: dto.labels.map(|ids| ids.into_iter().collect()),
            assignees: dto.assignees.map(|ids| ids.into_iter().collect()),
            due_date: parse_optional_date_field(dto.due_date)?,
            project: dto.project.map(project_ref),
            parent_task: dto.parent_task,
            closed: dto.closed,
        })
    }

    pub fn to_dto(&self) -> TaskPatchDto {
        TaskPatchDto {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority.map(Into::into),
            labels: self.labels.as_ref().map(|ids| ids.iter().copied().collect()),
            assignees: self
                .assignees
                .as_ref()
                .map(|ids| ids.iter().copied().collect()),
            due_date: self.due_date.map(|due| due.map(format_wire_date)),
            project: self.project,
            parent_task: self.parent_task,
            closed: self.closed,
        }
    }

    /// Applies the present fields and returns whether anything changed.
    pub fn apply(&self, task: &mut Task) -> bool {
        let before = task.clone();

        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(labels) = &self.labels {
            task.labels = labels.clone();
        }
        if let Some(assignees) = &self.assignees {
            task.assignees = assignees.clone();
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(project) = self.project {
            task.project = project;
        }
        if let Some(parent_task) = self.parent_task {
            task.parent_task = parent_task;
        }
        if let Some(closed) = self.closed {
            task.closed = closed;
        }

        let changed = *task != before;
        debug!(id = task.id, changed, "task patch applied");
        changed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub labels: Option<BTreeSet<Id>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub closed: Option<bool>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn from_dto(dto: ProjectPatchDto) -> anyhow::Result<Self> {
        if let Some(title) = dto.title.as_deref() {
            ensure_title(title)?;
        }
        Ok(Self {
            title: dto.title,
            description: dto.description,
            priority: dto.priority.map(Priority::from),
            labels: dto.labels.map(|ids| ids.into_iter().collect()),
            due_date: parse_optional_date_field(dto.due_date)?,
            closed: dto.closed,
        })
    }

    pub fn to_dto(&self) -> ProjectPatchDto {
        ProjectPatchDto {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority.map(Into::into),
            labels: self.labels.as_ref().map(|ids| ids.iter().copied().collect()),
            due_date: self.due_date.map(|due| due.map(format_wire_date)),
            closed: self.closed,
        }
    }

    pub fn apply(&self, project: &mut Project) -> bool {
        let before = project.clone();

        if let Some(title) = &self.title {
            project.title = title.clone();
        }
        if let Some(description) = &self.description {
            project.description = description.clone();
        }
        if let Some(priority) = self.priority {
            project.priority = priority;
        }
        if let Some(labels) = &self.labels {
            project.labels = labels.clone();
        }
        if let Some(due_date) = self.due_date {
            project.due_date = due_date;
        }
        if let Some(closed) = self.closed {
            project.closed = closed;
        }

        let changed = *project != before;
        debug!(id = project.id, changed, "project patch applied");
        changed
    }
}

/// Fields of a task the user is about to create; the service assigns
/// the identifier and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub column: Id,
    pub priority: Priority,
    pub labels: BTreeSet<Id>,
    pub assignees: BTreeSet<Id>,
    pub due_date: Option<NaiveDate>,
    pub project: Option<Id>,
    pub parent_task: Option<Id>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, column: Id) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            column,
            priority: Priority::default(),
            labels: BTreeSet::new(),
            assignees: BTreeSet::new(),
            due_date: None,
            project: None,
            parent_task: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure_title(&self.title)
    }

    pub fn from_dto(dto: NewTaskDto) -> anyhow::Result<Self> {
        let new = Self {
            title: dto.title,
            description: dto.description,
            column: dto.column,
            priority: dto.priority.into(),
            labels: dto.labels.into_iter().collect(),
            assignees: dto.assignees.into_iter().collect(),
            due_date: dto
                .due_date
                .as_deref()
                .map(parse_wire_date)
                .transpose()
                .context("bad due_date")?,
            project: project_ref(dto.project),
            parent_task: dto.parent_task,
        };
        new.validate()?;
        Ok(new)
    }

    pub fn to_dto(&self) -> NewTaskDto {
        NewTaskDto {
            title: self.title.clone(),
            description: self.description.clone(),
            column: self.column,
            priority: self.priority.into(),
            labels: self.labels.iter().copied().collect(),
            assignees: self.assignees.iter().copied().collect(),
            due_date: self.due_date.map(format_wire_date),
            project: self.project,
            parent_task: self.parent_task,
        }
    }

    pub fn into_task(self, id: Id) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            priority: self.priority,
            due_date: self.due_date,
            column: self.column,
            project: self.project,
            parent_task: self.parent_task,
            labels: self.labels,
            assignees: self.assignees,
            closed: false,
            created: None,
            modified: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub labels: BTreeSet<Id>,
    pub due_date: Option<NaiveDate>,
}

impl NewProject {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            labels: BTreeSet::new(),
            due_date: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure_title(&self.title)
    }

    pub fn from_dto(dto: NewProjectDto) -> anyhow::Result<Self> {
        let new = Self {
            title: dto.title,
            description: dto.description,
            priority: dto.priority.into(),
            labels: dto.labels.into_iter().collect(),
            due_date: dto
                .due_date
                .as_deref()
                .map(parse_wire_date)
                .transpose()
                .context("bad due_date")?,
        };
        new.validate()?;
        Ok(new)
    }

    pub fn to_dto(&self) -> NewProjectDto {
        NewProjectDto {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority.into(),
            labels: self.labels.iter().copied().collect(),
            due_date: self.due_date.map(format_wire_date),
        }
    }

    pub fn into_project(self, id: Id) -> Project {
        Project {
            id,
            title: self.title,
            description: self.description,
            priority: self.priority,
            due_date: self.due_date,
            labels: self.labels,
            closed: false,
            created: None,
            modified: None,
        }
    }
}

fn ensure_title(title: &str) -> anyhow::Result<()> {
    if title.trim().is_empty() {
        bail!("title cannot be empty");
    }
    Ok(())
}

fn parse_optional_date_field(
    field: Option<Option<String>>,
) -> anyhow::Result<Option<Option<NaiveDate>>> {
    match field {
        None => Ok(None),
        Some(None) => Ok(Some(None)),
        Some(Some(raw)) => Ok(Some(Some(
            parse_wire_date(&raw).context("bad due_date")?,
        ))),
    }
}
