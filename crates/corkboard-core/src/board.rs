use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, bail};
use chrono::NaiveDate;
use tracing::debug;

use crate::filter::{BoardFilter, ProjectSelection};
use crate::index::TaskIndex;
use crate::model::{BoardSnapshot, Column, Id, Label, Member, Project, Task};
use crate::sort::{sort_by_due_and_priority, sort_ids_by_due_and_priority};
use crate::store::EntityStore;

/// One column as rendered: `total` counts every task in the column,
/// `tasks` only the ones passing the active filter.
#[derive(Debug, Clone)]
pub struct ColumnView<'a> {
    pub column: &'a Column,
    pub total: usize,
    pub tasks: Vec<&'a Task>,
}

/// Entity store, derived index and view selection kept in step. Every
/// mutation rebuilds the index before returning, so reads never see a
/// stale index.
#[derive(Debug, Clone, Default)]
pub struct Board {
    store: EntityStore,
    index: TaskIndex,
    filter: BoardFilter,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: BoardSnapshot) -> Self {
        let mut board = Self::new();
        board.load(snapshot);
        board
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn index(&self) -> &TaskIndex {
        &self.index
    }

    pub fn filter(&self) -> &BoardFilter {
        &self.filter
    }

    pub fn revision(&self) -> u64 {
        self.store.revision()
    }

    pub fn load(&mut self, snapshot: BoardSnapshot) {
        self.store.load_board(snapshot);
        self.rebuild_index();
    }

    pub fn upsert_task(&mut self, task: Task) {
        self.store.upsert_task(task);
        self.rebuild_index();
    }

    pub fn remove_task(&mut self, id: Id) -> Option<Task> {
        let removed = self.store.remove_task(id);
        self.rebuild_index();
        removed
    }

    pub fn upsert_project(&mut self, project: Project) {
        self.store.upsert_project(project);
    }

    pub fn remove_project(&mut self, id: Id) -> Option<Project> {
        let removed = self.store.remove_project(id);
        if self.filter.project() == ProjectSelection::Project(id) {
            debug!(project = id, "selected project removed; clearing selection");
            self.filter.select_project(ProjectSelection::All);
        }
        removed
    }

    pub fn insert_column(&mut self, id: Id, title: impl Into<String>) -> bool {
        self.store.insert_column(id, title)
    }

    pub fn remove_column(&mut self, id: Id) -> Option<Column> {
        let removed = self.store.remove_column(id);
        self.rebuild_index();
        removed
    }

    pub fn set_column_orders(&mut self, orders: &BTreeMap<Id, Vec<Id>>) {
        self.store.set_column_orders(orders);
        self.rebuild_index();
    }

    pub fn set_project_order(&mut self, order: &[Id]) {
        self.store.set_project_order(order);
    }

    pub fn upsert_label(&mut self, label: Label) {
        self.store.upsert_label(label);
    }

    pub fn remove_label(&mut self, id: Id) -> Option<Label> {
        let removed = self.store.remove_label(id);
        if self.filter.labels().contains(&id) {
            let mut labels = self.filter.labels().clone();
            labels.remove(&id);
            self.filter.set_label_filter(labels);
        }
        removed
    }

    pub fn upsert_member(&mut self, member: Member) {
        self.store.upsert_member(member);
    }

    pub fn remove_member(&mut self, id: Id) -> Option<Member> {
        self.store.remove_member(id)
    }

    pub fn select_project(&mut self, selection: ProjectSelection) {
        self.filter.select_project(selection);
    }

    pub fn set_label_filter(&mut self, labels: BTreeSet<Id>) {
        self.filter.set_label_filter(labels);
    }

    /// The task's project, or `None` when unset or no longer on the board.
    pub fn project_of(&self, task: &Task) -> Option<&Project> {
        task.project.and_then(|id| self.store.project(id))
    }

    pub fn parent_of(&self, task: &Task) -> Option<&Task> {
        task.parent_task.and_then(|id| self.store.task(id))
    }

    pub fn children_of(&self, parent: Id) -> Vec<&Task> {
        self.index
            .children_of(parent)
            .iter()
            .filter_map(|id| self.store.task(*id))
            .collect()
    }

    /// Labels that still exist, in id order.
    pub fn labels_of<'a>(&'a self, labels: &BTreeSet<Id>) -> Vec<&'a Label> {
        labels.iter().filter_map(|id| self.store.label(*id)).collect()
    }

    pub fn assignees_of(&self, task: &Task) -> Vec<&Member> {
        task.assignees
            .iter()
            .filter_map(|id| self.store.member(*id))
            .collect()
    }

    /// True if making `parent` the parent of `task` would close a loop.
    pub fn would_create_cycle(&self, task: Id, parent: Id) -> bool {
        let mut cursor = Some(parent);
        let mut hops = 0usize;
        while let Some(current) = cursor {
            if current == task {
                return true;
            }
            hops += 1;
            if hops > self.store.tasks().len() {
                return true;
            }
            cursor = self.store.task(current).and_then(|t| t.parent_task);
        }
        false
    }

    /// Columns in board order, each filtered by the active selection and
    /// kept in its stored order.
    pub fn visible_columns(&self) -> Vec<ColumnView<'_>> {
        let projects = self.store.projects();
        self.store
            .columns()
            .map(|column| {
                let tasks = column
                    .task_ids
                    .iter()
                    .filter_map(|id| self.store.task(*id))
                    .filter(|task| self.filter.matches_task(task, projects))
                    .collect();
                ColumnView {
                    column,
                    total: column.task_ids.len(),
                    tasks,
                }
            })
            .collect()
    }

    /// Projects passing the label filter, sorted by due date and priority
    /// on top of the stored project order.
    pub fn visible_projects(&self, today: NaiveDate) -> Vec<&Project> {
        let mut projects: Vec<&Project> = self
            .store
            .project_order()
            .iter()
            .filter_map(|id| self.store.project(*id))
            .filter(|project| self.filter.matches_project(project))
            .collect();
        sort_by_due_and_priority(&mut projects, today);
        projects
    }

    /// Order of `ids` after sorting by due date and priority.
    pub fn sorted_task_ids(&self, ids: &[Id], today: NaiveDate) -> Vec<Id> {
        sort_ids_by_due_and_priority(ids, |id| self.store.task(id), today)
    }

    pub fn sorted_project_ids(&self, ids: &[Id], today: NaiveDate) -> Vec<Id> {
        sort_ids_by_due_and_priority(ids, |id| self.store.project(id), today)
    }

    /// Column orders resulting from dropping `task` into `column` at
    /// `position` (end of the column when `None` or past the end). Only
    /// the source and target columns appear in the result.
    pub fn plan_task_move(
        &self,
        task: Id,
        column: Id,
        position: Option<usize>,
    ) -> anyhow::Result<BTreeMap<Id, Vec<Id>>> {
        if self.store.task(task).is_none() {
            bail!("task {task} not found");
        }
        let target = self
            .store
            .column(column)
            .ok_or_else(|| anyhow!("column {column} not found"))?;

        let mut orders = BTreeMap::new();
        if let Some(source) = self.index.column_of(task)
            && source != column
            && let Some(source_column) = self.store.column(source)
        {
            let remaining = source_column
                .task_ids
                .iter()
                .copied()
                .filter(|id| *id != task)
                .collect();
            orders.insert(source, remaining);
        }

        let mut ids: Vec<Id> = target
            .task_ids
            .iter()
            .copied()
            .filter(|id| *id != task)
            .collect();
        let at = position.unwrap_or(ids.len()).min(ids.len());
        ids.insert(at, task);
        orders.insert(column, ids);

        Ok(orders)
    }

    /// Project order after moving `project` to `position`.
    pub fn plan_project_move(&self, project: Id, position: usize) -> anyhow::Result<Vec<Id>> {
        if self.store.project(project).is_none() {
            bail!("project {project} not found");
        }
        let mut order: Vec<Id> = self
            .store
            .project_order()
            .iter()
            .copied()
            .filter(|id| *id != project)
            .collect();
        let at = position.min(order.len());
        order.insert(at, project);
        Ok(order)
    }

    fn rebuild_index(&mut self) {
        self.index = TaskIndex::build(&self.store);
        self.store.mark_index_fresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Board {
        let mut child = Task::new(3, "child", 10);
        child.parent_task = Some(1);
        let mut tagged = Task::new(2, "tagged", 10);
        tagged.project = Some(7);

        let mut project = Project::new(7, "launch");
        project.labels.insert(50);

        Board::from_snapshot(BoardSnapshot {
            id: 1,
            name: "main".to_string(),
            columns: vec![
                (Column::new(10, "todo"), vec![Task::new(1, "parent", 10), tagged, child]),
                (Column::new(11, "done"), vec![]),
            ],
            projects: vec![project, Project::new(8, "other")],
            labels: vec![Label {
                id: 50,
                name: "ops".to_string(),
                color: String::new(),
            }],
            members: vec![],
        })
    }

    #[test]
    fn index_is_fresh_after_every_mutation() {
        let mut board = board();
        assert!(!board.store().index_stale());
        assert_eq!(board.index().children_of(1), &[3]);

        board.remove_task(3);
        assert!(!board.store().index_stale());
        assert!(board.index().by_parent().is_empty());
    }

    #[test]
    fn reupsert_after_removal_has_no_stale_parent_entry() {
        let mut board = board();
        let mut child = board.store().task(3).unwrap().clone();
        board.remove_task(3);

        child.parent_task = None;
        board.upsert_task(child);
        assert!(board.index().children_of(1).is_empty());
        assert_eq!(board.index().column_of(3), Some(10));
    }

    #[test]
    fn index_never_names_removed_tasks() {
        let mut board = board();
        let mut grandchild = Task::new(4, "grandchild", 11);
        grandchild.parent_task = Some(3);
        board.upsert_task(grandchild);
        board.remove_task(1);

        assert!(board.index().children_of(1).is_empty());
        for (parent, children) in board.index().by_parent() {
            assert!(board.store().task(*parent).is_some());
            assert!(!children.is_empty());
            for child in children {
                assert!(board.store().task(*child).is_some());
            }
            let has_child = board
                .store()
                .tasks()
                .values()
                .any(|t| t.parent_task == Some(*parent));
            assert!(has_child);
        }
    }

    #[test]
    fn visible_columns_apply_filter_but_keep_totals() {
        let mut board = board();
        board.set_label_filter(BTreeSet::from([50]));

        let views = board.visible_columns();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].total, 3);
        let ids: Vec<Id> = views[0].tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn dangling_project_reads_as_none() {
        let mut board = board();
        board.select_project(ProjectSelection::Project(7));
        board.remove_project(7);

        let task = board.store().task(2).unwrap();
        assert!(board.project_of(task).is_none());
        assert_eq!(board.filter().project(), ProjectSelection::All);
    }

    #[test]
    fn removing_filtered_label_drops_it_from_selection() {
        let mut board = board();
        board.set_label_filter(BTreeSet::from([50, 51]));
        board.remove_label(50);
        assert_eq!(board.filter().labels(), &BTreeSet::from([51]));
    }

    #[test]
    fn cycle_detection_walks_parent_chain() {
        let board = board();
        assert!(board.would_create_cycle(1, 3));
        assert!(board.would_create_cycle(1, 1));
        assert!(!board.would_create_cycle(3, 2));
    }

    #[test]
    fn plan_move_touches_source_and_target_only() {
        let board = board();
        let plan = board.plan_task_move(2, 11, None).unwrap();
        assert_eq!(plan.get(&10), Some(&vec![1, 3]));
        assert_eq!(plan.get(&11), Some(&vec![2]));

        let within = board.plan_task_move(3, 10, Some(0)).unwrap();
        assert_eq!(within.len(), 1);
        assert_eq!(within.get(&10), Some(&vec![3, 1, 2]));

        assert!(board.plan_task_move(99, 10, None).is_err());
        assert!(board.plan_task_move(1, 99, None).is_err());
    }

    #[test]
    fn plan_project_move_clamps_position() {
        let board = board();
        assert_eq!(board.plan_project_move(7, 10).unwrap(), vec![8, 7]);
        assert!(board.plan_project_move(70, 0).is_err());
    }
}
