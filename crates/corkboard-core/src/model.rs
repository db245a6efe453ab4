use std::collections::BTreeSet;
use std::fmt;

use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate, Utc};
use corkboard_shared::{
    BoardDto, ColumnDto, LabelDto, MemberDto, PlacedTaskDto, PriorityDto, ProjectDto, TaskDto,
};

use crate::datetime::{format_timestamp, format_wire_date, parse_timestamp, parse_wire_date};

pub use corkboard_shared::{Id, NO_PROJECT_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn sort_value(self) -> i32 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Self::Low),
            "m" | "med" | "medium" => Ok(Self::Medium),
            "h" | "high" => Ok(Self::High),
            other => bail!("invalid priority '{other}': must be low, medium, or high"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Low => "L",
            Self::Medium => "M",
            Self::High => "H",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PriorityDto> for Priority {
    fn from(value: PriorityDto) -> Self {
        match value {
            PriorityDto::Low => Self::Low,
            PriorityDto::Medium => Self::Medium,
            PriorityDto::High => Self::High,
        }
    }
}

impl From<Priority> for PriorityDto {
    fn from(value: Priority) -> Self {
        match value {
            Priority::Low => Self::Low,
            Priority::Medium => Self::Medium,
            Priority::High => Self::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub column: Id,
    pub project: Option<Id>,
    pub parent_task: Option<Id>,
    pub labels: BTreeSet<Id>,
    pub assignees: BTreeSet<Id>,
    pub closed: bool,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Reads a wire project reference, where the sentinel id stands for no
/// project.
pub fn project_ref(project: Option<Id>) -> Option<Id> {
    project.filter(|id| *id != NO_PROJECT_ID)
}

impl Task {
    pub fn new(id: Id, title: impl Into<String>, column: Id) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            due_date: None,
            column,
            project: None,
            parent_task: None,
            labels: BTreeSet::new(),
            assignees: BTreeSet::new(),
            closed: false,
            created: None,
            modified: None,
        }
    }

    pub fn from_dto(dto: TaskDto, column: Id) -> anyhow::Result<Self> {
        let id = dto.id;
        Ok(Self {
            id,
            title: dto.title,
            description: dto.description,
            priority: dto.priority.into(),
            due_date: dto
                .due_date
                .as_deref()
                .map(parse_wire_date)
                .transpose()
                .with_context(|| format!("task {id}: bad due_date"))?,
            column,
            project: project_ref(dto.project),
            parent_task: dto.parent_task,
            labels: dto.labels.into_iter().collect(),
            assignees: dto.assignees.into_iter().collect(),
            closed: dto.closed,
            created: parse_optional_timestamp(dto.created.as_deref())
                .with_context(|| format!("task {id}: bad created timestamp"))?,
            modified: parse_optional_timestamp(dto.modified.as_deref())
                .with_context(|| format!("task {id}: bad modified timestamp"))?,
        })
    }

    pub fn from_placed(dto: PlacedTaskDto) -> anyhow::Result<Self> {
        Self::from_dto(dto.task, dto.column)
    }

    pub fn to_dto(&self) -> TaskDto {
        TaskDto {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority.into(),
            labels: self.labels.iter().copied().collect(),
            assignees: self.assignees.iter().copied().collect(),
            due_date: self.due_date.map(format_wire_date),
            project: self.project,
            parent_task: self.parent_task,
            closed: self.closed,
            created: self.created.map(format_timestamp),
            modified: self.modified.map(format_timestamp),
        }
    }

    pub fn to_placed_dto(&self) -> PlacedTaskDto {
        PlacedTaskDto {
            task: self.to_dto(),
            column: self.column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub labels: BTreeSet<Id>,
    pub closed: bool,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(id: Id, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            due_date: None,
            labels: BTreeSet::new(),
            closed: false,
            created: None,
            modified: None,
        }
    }

    pub fn from_dto(dto: ProjectDto) -> anyhow::Result<Self> {
        let id = dto.id;
        Ok(Self {
            id,
            title: dto.title,
            description: dto.description,
            priority: dto.priority.into(),
            due_date: dto
                .due_date
                .as_deref()
                .map(parse_wire_date)
                .transpose()
                .with_context(|| format!("project {id}: bad due_date"))?,
            labels: dto.labels.into_iter().collect(),
            closed: dto.closed,
            created: parse_optional_timestamp(dto.created.as_deref())
                .with_context(|| format!("project {id}: bad created timestamp"))?,
            modified: parse_optional_timestamp(dto.modified.as_deref())
                .with_context(|| format!("project {id}: bad modified timestamp"))?,
        })
    }

    pub fn to_dto(&self) -> ProjectDto {
        ProjectDto {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority.into(),
            labels: self.labels.iter().copied().collect(),
            due_date: self.due_date.map(format_wire_date),
            closed: self.closed,
            created: self.created.map(format_timestamp),
            modified: self.modified.map(format_timestamp),
        }
    }
}

/// A board lane. `task_ids` is the authoritative display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub id: Id,
    pub title: String,
    pub task_ids: Vec<Id>,
}

impl Column {
    pub fn new(id: Id, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            task_ids: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: Id,
    pub name: String,
    pub color: String,
}

impl From<LabelDto> for Label {
    fn from(dto: LabelDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            color: dto.color,
        }
    }
}

impl From<&Label> for LabelDto {
    fn from(label: &Label) -> Self {
        Self {
            id: label.id,
            name: label.name.clone(),
            color: label.color.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: Id,
    pub username: String,
}

impl From<MemberDto> for Member {
    fn from(dto: MemberDto) -> Self {
        Self {
            id: dto.id,
            username: dto.username,
        }
    }
}

impl From<&Member> for MemberDto {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id,
            username: member.username.clone(),
        }
    }
}

/// Validated form of a board snapshot. Columns keep their embedded
/// tasks so placement survives until the store flattens it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub id: Id,
    pub name: String,
    pub columns: Vec<(Column, Vec<Task>)>,
    pub projects: Vec<Project>,
    pub labels: Vec<Label>,
    pub members: Vec<Member>,
}

impl BoardSnapshot {
    #[tracing::instrument(skip(dto), fields(board = dto.id))]
    pub fn from_dto(dto: BoardDto) -> anyhow::Result<Self> {
        let columns = dto
            .columns
            .into_iter()
            .map(|col: ColumnDto| {
                let tasks = col
                    .tasks
                    .into_iter()
                    .map(|task| Task::from_dto(task, col.id))
                    .collect::<anyhow::Result<Vec<_>>>()
                    .with_context(|| format!("column {} ({})", col.id, col.title))?;
                Ok((Column::new(col.id, col.title), tasks))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let projects = dto
            .projects
            .into_iter()
            .map(Project::from_dto)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            id: dto.id,
            name: dto.name,
            columns,
            projects,
            labels: dto.labels.into_iter().map(Label::from).collect(),
            members: dto.members.into_iter().map(Member::from).collect(),
        })
    }
}

fn parse_optional_timestamp(raw: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    raw.map(parse_timestamp).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_dto(id: Id) -> TaskDto {
        TaskDto {
            id,
            title: format!("task {id}"),
            description: String::new(),
            priority: PriorityDto::High,
            labels: vec![3, 1],
            assignees: vec![],
            due_date: Some("2026-03-01".to_string()),
            project: Some(2),
            parent_task: None,
            closed: false,
            created: Some("2026-02-01T09:30:00Z".to_string()),
            modified: None,
        }
    }

    #[test]
    fn task_dto_converts_both_ways() {
        let task = Task::from_dto(task_dto(5), 9).unwrap();
        assert_eq!(task.column, 9);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.labels, BTreeSet::from([1, 3]));
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 3, 1));

        let back = task.to_dto();
        assert_eq!(back.labels, vec![1, 3]);
        assert_eq!(back.due_date.as_deref(), Some("2026-03-01"));
        assert_eq!(task.to_placed_dto().column, 9);
    }

    #[test]
    fn malformed_due_date_is_rejected_with_task_context() {
        let mut dto = task_dto(5);
        dto.due_date = Some("03/01/2026".to_string());
        let err = Task::from_dto(dto, 1).unwrap_err();
        assert!(format!("{err:#}").contains("task 5"));
    }

    #[test]
    fn priority_parses_codes_and_words() {
        assert_eq!(Priority::parse("H").unwrap(), Priority::High);
        assert_eq!(Priority::parse("med").unwrap(), Priority::Medium);
        assert_eq!(Priority::parse(" low ").unwrap(), Priority::Low);
        assert!(Priority::parse("urgent").is_err());
    }

    #[test]
    fn snapshot_keeps_tasks_under_their_column() {
        let dto = BoardDto {
            id: 1,
            name: "main".to_string(),
            columns: vec![
                ColumnDto {
                    id: 10,
                    title: "todo".to_string(),
                    tasks: vec![task_dto(1), task_dto(2)],
                },
                ColumnDto {
                    id: 11,
                    title: "done".to_string(),
                    tasks: vec![task_dto(3)],
                },
            ],
            projects: vec![],
            labels: vec![],
            members: vec![],
        };

        let snapshot = BoardSnapshot::from_dto(dto).unwrap();
        assert_eq!(snapshot.columns.len(), 2);
        assert_eq!(snapshot.columns[1].1[0].column, 11);
    }
}
