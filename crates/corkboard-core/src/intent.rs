use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::board::Board;
use crate::filter::ProjectSelection;
use crate::model::{BoardSnapshot, Id, Project, Task};

/// Inbound requests from the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    LoadBoard(BoardSnapshot),
    UpsertTask(Task),
    UpsertProject(Project),
    RemoveTask(Id),
    RemoveProject(Id),
    InsertColumn { id: Id, title: String },
    RemoveColumn(Id),
    Reorder(BTreeMap<Id, Vec<Id>>),
    ReorderProjects(Vec<Id>),
    SelectProject(ProjectSelection),
    SetLabelFilter(BTreeSet<Id>),
    RemoveLabel(Id),
    RemoveMember(Id),
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadBoard(_) => "load-board",
            Self::UpsertTask(_) => "upsert-task",
            Self::UpsertProject(_) => "upsert-project",
            Self::RemoveTask(_) => "remove-task",
            Self::RemoveProject(_) => "remove-project",
            Self::InsertColumn { .. } => "insert-column",
            Self::RemoveColumn(_) => "remove-column",
            Self::Reorder(_) => "reorder",
            Self::ReorderProjects(_) => "reorder-projects",
            Self::SelectProject(_) => "select-project",
            Self::SetLabelFilter(_) => "set-label-filter",
            Self::RemoveLabel(_) => "remove-label",
            Self::RemoveMember(_) => "remove-member",
        }
    }

    /// True for intents the coordinator confirms with the service before
    /// they are final.
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::Reorder(_) | Self::ReorderProjects(_))
    }
}

impl Board {
    /// Applies an intent to local state only. Reorders are taken as already
    /// confirmed and set verbatim, unless they would leave a task of a
    /// listed column unplaced.
    pub fn apply(&mut self, intent: Intent) {
        debug!(intent = intent.name(), "applying intent");
        match intent {
            Intent::LoadBoard(snapshot) => self.load(snapshot),
            Intent::UpsertTask(task) => self.upsert_task(task),
            Intent::UpsertProject(project) => self.upsert_project(project),
            Intent::RemoveTask(id) => {
                self.remove_task(id);
            }
            Intent::RemoveProject(id) => {
                self.remove_project(id);
            }
            Intent::InsertColumn { id, title } => {
                if !self.insert_column(id, title) {
                    debug!(column = id, "column already present");
                }
            }
            Intent::RemoveColumn(id) => {
                self.remove_column(id);
            }
            Intent::Reorder(orders) => {
                let dropped = self.store().unlisted_tasks(&orders);
                if dropped.is_empty() {
                    self.set_column_orders(&orders);
                } else {
                    warn!(?dropped, "reorder leaves tasks without a column; ignored");
                }
            }
            Intent::ReorderProjects(order) => self.set_project_order(&order),
            Intent::SelectProject(selection) => self.select_project(selection),
            Intent::SetLabelFilter(labels) => self.set_label_filter(labels),
            Intent::RemoveLabel(id) => {
                self.remove_label(id);
            }
            Intent::RemoveMember(id) => {
                self.remove_member(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    fn snapshot() -> BoardSnapshot {
        BoardSnapshot {
            id: 1,
            name: "main".to_string(),
            columns: vec![(
                Column::new(10, "todo"),
                vec![Task::new(1, "a", 10), Task::new(2, "b", 10)],
            )],
            projects: vec![],
            labels: vec![],
            members: vec![],
        }
    }

    #[test]
    fn intents_apply_in_sequence() {
        let mut board = Board::new();
        board.apply(Intent::LoadBoard(snapshot()));
        board.apply(Intent::InsertColumn {
            id: 11,
            title: "done".to_string(),
        });
        board.apply(Intent::Reorder(BTreeMap::from([
            (10, vec![2]),
            (11, vec![1]),
        ])));

        assert_eq!(board.store().column(10).unwrap().task_ids, vec![2]);
        assert_eq!(board.store().task(1).unwrap().column, 11);
        assert_eq!(board.index().column_of(1), Some(11));

        board.apply(Intent::RemoveTask(1));
        assert!(board.store().column(11).unwrap().task_ids.is_empty());
    }

    #[test]
    fn reorder_dropping_a_task_is_ignored() {
        let mut board = Board::from_snapshot(snapshot());
        let revision = board.revision();

        board.apply(Intent::Reorder(BTreeMap::from([(10, vec![2])])));

        assert_eq!(board.revision(), revision);
        assert_eq!(board.store().column(10).unwrap().task_ids, vec![1, 2]);
        assert_eq!(board.index().column_of(1), Some(10));
    }

    #[test]
    fn view_intents_change_only_the_selection() {
        let mut board = Board::from_snapshot(snapshot());
        let revision = board.revision();

        board.apply(Intent::SelectProject(ProjectSelection::NoProject));
        board.apply(Intent::SetLabelFilter(BTreeSet::from([4])));

        assert_eq!(board.revision(), revision);
        assert_eq!(board.filter().project(), ProjectSelection::NoProject);
        assert!(board.filter().is_active());
    }

    #[test]
    fn only_reorders_need_confirmation() {
        assert!(Intent::Reorder(BTreeMap::new()).needs_confirmation());
        assert!(Intent::ReorderProjects(vec![]).needs_confirmation());
        assert!(!Intent::RemoveTask(1).needs_confirmation());
        assert_eq!(Intent::RemoveMember(1).name(), "remove-member");
    }
}
