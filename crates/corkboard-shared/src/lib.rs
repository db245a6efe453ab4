use std::collections::BTreeMap;

use serde::{
  Deserialize,
  Serialize
};

pub type Id = u64;

/// Project selection value meaning "tasks without a
/// project". Server identifiers start at 1.
pub const NO_PROJECT_ID: Id = 0;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub enum PriorityDto {
  #[serde(rename = "L")]
  Low,
  #[serde(rename = "M")]
  #[default]
  Medium,
  #[serde(rename = "H")]
  High
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct LabelDto {
  pub id:    Id,
  pub name:  String,
  #[serde(default)]
  pub color: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct MemberDto {
  pub id:       Id,
  pub username: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct TaskDto {
  pub id:          Id,
  #[serde(default)]
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub priority:    PriorityDto,
  #[serde(default)]
  pub labels:      Vec<Id>,
  #[serde(default)]
  pub assignees:   Vec<Id>,
  #[serde(default)]
  pub due_date:    Option<String>,
  #[serde(default)]
  pub project:     Option<Id>,
  #[serde(default)]
  pub parent_task: Option<Id>,
  #[serde(default)]
  pub closed:      bool,
  #[serde(default)]
  pub created:     Option<String>,
  #[serde(default)]
  pub modified:    Option<String>
}

/// Task payload returned by create and patch calls; carries
/// the owning column because the board snapshot embeds tasks
/// inside their column instead.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct PlacedTaskDto {
  #[serde(flatten)]
  pub task:   TaskDto,
  pub column: Id
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct ProjectDto {
  pub id:          Id,
  #[serde(default)]
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub priority:    PriorityDto,
  #[serde(default)]
  pub labels:      Vec<Id>,
  #[serde(default)]
  pub due_date:    Option<String>,
  #[serde(default)]
  pub closed:      bool,
  #[serde(default)]
  pub created:     Option<String>,
  #[serde(default)]
  pub modified:    Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct ColumnDto {
  pub id:    Id,
  pub title: String,
  #[serde(default)]
  pub tasks: Vec<TaskDto>
}

/// Full board snapshot as served by the board endpoint.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct BoardDto {
  pub id:       Id,
  #[serde(default)]
  pub name:     String,
  #[serde(default)]
  pub columns:  Vec<ColumnDto>,
  #[serde(default)]
  pub projects: Vec<ProjectDto>,
  #[serde(default)]
  pub labels:   Vec<LabelDto>,
  #[serde(default)]
  pub members:  Vec<MemberDto>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct NewTaskDto {
  pub title:       String,
  #[serde(default)]
  pub description: String,
  pub column:      Id,
  #[serde(default)]
  pub priority:    PriorityDto,
  #[serde(default)]
  pub labels:      Vec<Id>,
  #[serde(default)]
  pub assignees:   Vec<Id>,
  #[serde(default)]
  pub due_date:    Option<String>,
  #[serde(default)]
  pub project:     Option<Id>,
  #[serde(default)]
  pub parent_task: Option<Id>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct NewProjectDto {
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub priority:    PriorityDto,
  #[serde(default)]
  pub labels:      Vec<Id>,
  #[serde(default)]
  pub due_date:    Option<String>
}

/// Partial task update. Absent fields are left alone; for
/// nullable fields an explicit `null` clears the value.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
pub struct TaskPatchDto {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub title:       Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub priority:    Option<PriorityDto>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub labels:      Option<Vec<Id>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub assignees:   Option<Vec<Id>>,
  #[serde(
    default,
    deserialize_with = "tristate::deserialize",
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date: Option<Option<String>>,
  #[serde(
    default,
    deserialize_with = "tristate::deserialize",
    skip_serializing_if = "Option::is_none"
  )]
  pub project: Option<Option<Id>>,
  #[serde(
    default,
    deserialize_with = "tristate::deserialize",
    skip_serializing_if = "Option::is_none"
  )]
  pub parent_task: Option<Option<Id>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub closed:      Option<bool>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
pub struct ProjectPatchDto {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub title:       Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub priority:    Option<PriorityDto>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub labels:      Option<Vec<Id>>,
  #[serde(
    default,
    deserialize_with = "tristate::deserialize",
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date: Option<Option<String>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub closed:      Option<bool>
}

/// Confirmation request for a task reorder.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct SortTasksRequest {
  pub board: Id,
  pub tasks: BTreeMap<Id, Vec<Id>>,
  pub order: Vec<Id>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct SortProjectsRequest {
  pub board: Id,
  pub order: Vec<Id>
}

/// Keeps `null` distinct from an absent field: absent
/// stays `None` through `#[serde(default)]`, `null` becomes
/// `Some(None)`.
pub mod tristate {
  use serde::{
    Deserialize,
    Deserializer
  };

  pub fn deserialize<'de, D, T>(
    deserializer: D
  ) -> Result<Option<Option<T>>, D::Error>
  where
    D: Deserializer<'de>,
    T: Deserialize<'de>
  {
    Option::<T>::deserialize(
      deserializer
    )
    .map(Some)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn task_patch_distinguishes_null_from_absent()
   {
    let patch: TaskPatchDto =
      serde_json::from_str(
        r#"{"due_date": null, "title": "x"}"#
      )
      .unwrap();
    assert_eq!(
      patch.due_date,
      Some(None)
    );
    assert_eq!(patch.project, None);
    assert_eq!(
      patch.title.as_deref(),
      Some("x")
    );

    let set: TaskPatchDto =
      serde_json::from_str(
        r#"{"project": 4}"#
      )
      .unwrap();
    assert_eq!(
      set.project,
      Some(Some(4))
    );
  }

  #[test]
  fn task_patch_serializes_only_present_fields()
   {
    let patch = TaskPatchDto {
      parent_task: Some(None),
      ..TaskPatchDto::default()
    };
    let json =
      serde_json::to_value(&patch)
        .unwrap();
    assert_eq!(
      json,
      serde_json::json!({ "parent_task": null })
    );
  }

  #[test]
  fn priority_uses_single_letter_codes()
  {
    let json = serde_json::to_string(
      &PriorityDto::High
    )
    .unwrap();
    assert_eq!(json, "\"H\"");

    let parsed: PriorityDto =
      serde_json::from_str("\"L\"")
        .unwrap();
    assert_eq!(
      parsed,
      PriorityDto::Low
    );
  }

  #[test]
  fn created_task_flattens_column_next_to_fields()
   {
    let placed: PlacedTaskDto =
      serde_json::from_str(
        r#"{"id": 9, "title": "t", "priority": "H", "column": 2}"#
      )
      .unwrap();
    assert_eq!(placed.column, 2);
    assert_eq!(placed.task.id, 9);
    assert_eq!(
      placed.task.priority,
      PriorityDto::High
    );
    assert!(placed.task.labels.is_empty());
  }

  #[test]
  fn sort_request_keys_columns_by_id()
  {
    let mut tasks = BTreeMap::new();
    tasks.insert(3, vec![7, 8]);
    let req = SortTasksRequest {
      board: 1,
      tasks,
      order: vec![7, 8]
    };
    let json =
      serde_json::to_value(&req)
        .unwrap();
    assert_eq!(
      json["tasks"]["3"],
      serde_json::json!([7, 8])
    );
  }
}
