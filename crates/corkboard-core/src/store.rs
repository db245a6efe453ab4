use std::collections::{BTreeMap, BTreeSet};

use corkboard_shared::{BoardDto, ColumnDto};
use tracing::{debug, info, warn};

use crate::model::{BoardSnapshot, Column, Id, Label, Member, Project, Task};

/// Normalized board entities. Owns every entity attribute and the
/// authoritative per-column task order; derived indices live elsewhere.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    board_id: Option<Id>,
    board_name: String,
    tasks: BTreeMap<Id, Task>,
    projects: BTreeMap<Id, Project>,
    project_order: Vec<Id>,
    columns: BTreeMap<Id, Column>,
    column_order: Vec<Id>,
    labels: BTreeMap<Id, Label>,
    members: BTreeMap<Id, Member>,
    revision: u64,
    index_stale: bool,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every map from `snapshot`. Derived indices are stale
    /// afterwards until the owner rebuilds them.
    #[tracing::instrument(skip(self, snapshot), fields(board = snapshot.id))]
    pub fn load_board(&mut self, snapshot: BoardSnapshot) {
        let mut tasks = BTreeMap::new();
        let mut columns = BTreeMap::new();
        let mut column_order = Vec::with_capacity(snapshot.columns.len());

        for (mut column, column_tasks) in snapshot.columns {
            if columns.contains_key(&column.id) {
                warn!(column = column.id, "duplicate column in snapshot; skipping");
                continue;
            }
            column.task_ids.clear();
            for mut task in column_tasks {
                if tasks.contains_key(&task.id) {
                    warn!(
                        task = task.id,
                        column = column.id,
                        "task already placed in an earlier column; dropping duplicate"
                    );
                    continue;
                }
                task.column = column.id;
                column.task_ids.push(task.id);
                tasks.insert(task.id, task);
            }
            column_order.push(column.id);
            columns.insert(column.id, column);
        }

        let mut projects = BTreeMap::new();
        let mut project_order = Vec::with_capacity(snapshot.projects.len());
        for project in snapshot.projects {
            if projects.contains_key(&project.id) {
                continue;
            }
            project_order.push(project.id);
            projects.insert(project.id, project);
        }

        self.board_id = Some(snapshot.id);
        self.board_name = snapshot.name;
        self.tasks = tasks;
        self.projects = projects;
        self.project_order = project_order;
        self.columns = columns;
        self.column_order = column_order;
        self.labels = snapshot.labels.into_iter().map(|l| (l.id, l)).collect();
        self.members = snapshot.members.into_iter().map(|m| (m.id, m)).collect();
        self.index_stale = true;
        self.bump();

        info!(
            tasks = self.tasks.len(),
            projects = self.projects.len(),
            columns = self.columns.len(),
            "loaded board"
        );
    }

    pub fn board_id(&self) -> Option<Id> {
        self.board_id
    }

    pub fn board_name(&self) -> &str {
        &self.board_name
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn index_stale(&self) -> bool {
        self.index_stale
    }

    pub(crate) fn mark_index_fresh(&mut self) {
        self.index_stale = false;
    }

    pub fn task(&self, id: Id) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn tasks(&self) -> &BTreeMap<Id, Task> {
        &self.tasks
    }

    pub fn project(&self, id: Id) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn projects(&self) -> &BTreeMap<Id, Project> {
        &self.projects
    }

    pub fn project_order(&self) -> &[Id] {
        &self.project_order
    }

    pub fn column(&self, id: Id) -> Option<&Column> {
        self.columns.get(&id)
    }

    /// Columns in board order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.column_order
            .iter()
            .filter_map(|id| self.columns.get(id))
    }

    pub fn column_order(&self) -> &[Id] {
        &self.column_order
    }

    pub fn label(&self, id: Id) -> Option<&Label> {
        self.labels.get(&id)
    }

    pub fn labels(&self) -> &BTreeMap<Id, Label> {
        &self.labels
    }

    pub fn member(&self, id: Id) -> Option<&Member> {
        self.members.get(&id)
    }

    pub fn members(&self) -> &BTreeMap<Id, Member> {
        &self.members
    }

    /// Copy of every column's task order, keyed by column.
    pub fn column_orders(&self) -> BTreeMap<Id, Vec<Id>> {
        self.columns
            .iter()
            .map(|(id, column)| (*id, column.task_ids.clone()))
            .collect()
    }

    /// Tasks currently in a column named by `orders` that no sequence in
    /// `orders` lists. Applying such orders would leave them unplaced.
    pub fn unlisted_tasks(&self, orders: &BTreeMap<Id, Vec<Id>>) -> Vec<Id> {
        let listed: BTreeSet<Id> = orders.values().flatten().copied().collect();
        orders
            .keys()
            .filter_map(|column| self.columns.get(column))
            .flat_map(|column| column.task_ids.iter().copied())
            .filter(|id| !listed.contains(id))
            .collect()
    }

    /// Inserts or overwrites a task. A task new to the board, or one whose
    /// `column` differs from its current placement, is appended to the end
    /// of its column.
    #[tracing::instrument(skip(self, task), fields(id = task.id, column = task.column))]
    pub fn upsert_task(&mut self, task: Task) {
        let id = task.id;
        let target = task.column;
        let placed_in = self.column_containing(id);

        if placed_in != Some(target) {
            if let Some(previous) = placed_in
                && let Some(column) = self.columns.get_mut(&previous)
            {
                column.task_ids.retain(|t| *t != id);
            }
            self.column_entry(target).task_ids.push(id);
            debug!(from = ?placed_in, to = target, "task placed");
        }

        self.tasks.insert(id, task);
        self.index_stale = true;
        self.bump();
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_task(&mut self, id: Id) -> Option<Task> {
        let removed = self.tasks.remove(&id)?;
        for column in self.columns.values_mut() {
            column.task_ids.retain(|t| *t != id);
        }
        self.index_stale = true;
        self.bump();
        Some(removed)
    }

    #[tracing::instrument(skip(self, project), fields(id = project.id))]
    pub fn upsert_project(&mut self, project: Project) {
        if !self.project_order.contains(&project.id) {
            self.project_order.push(project.id);
        }
        self.projects.insert(project.id, project);
        self.bump();
    }

    /// Tasks that referenced the project keep the dangling id.
    #[tracing::instrument(skip(self))]
    pub fn remove_project(&mut self, id: Id) -> Option<Project> {
        let removed = self.projects.remove(&id)?;
        self.project_order.retain(|p| *p != id);
        self.bump();
        Some(removed)
    }

    /// Replaces the project order. Known projects missing from `order`
    /// keep their relative order after the listed ones; unknown ids are
    /// dropped.
    #[tracing::instrument(skip(self, order))]
    pub fn set_project_order(&mut self, order: &[Id]) {
        let mut seen = BTreeSet::new();
        let mut next: Vec<Id> = order
            .iter()
            .copied()
            .filter(|id| self.projects.contains_key(id) && seen.insert(*id))
            .collect();
        next.extend(
            self.project_order
                .iter()
                .copied()
                .filter(|id| !seen.contains(id)),
        );
        self.project_order = next;
        self.bump();
    }

    /// Returns false if the column already exists.
    #[tracing::instrument(skip(self, title))]
    pub fn insert_column(&mut self, id: Id, title: impl Into<String>) -> bool {
        if self.columns.contains_key(&id) {
            return false;
        }
        self.columns.insert(id, Column::new(id, title));
        self.column_order.push(id);
        self.bump();
        true
    }

    /// Drops the column and its order. Tasks still listed in it are
    /// expected to have been moved or deleted by the caller.
    #[tracing::instrument(skip(self))]
    pub fn remove_column(&mut self, id: Id) -> Option<Column> {
        let removed = self.columns.remove(&id)?;
        self.column_order.retain(|c| *c != id);
        if !removed.task_ids.is_empty() {
            warn!(
                column = id,
                orphaned = removed.task_ids.len(),
                "removed column still listed tasks"
            );
        }
        self.index_stale = true;
        self.bump();
        Some(removed)
    }

    /// Replaces the order of every column in `orders`. A task listed here
    /// is removed from any column not in `orders` and its `column`
    /// attribute follows the new placement.
    #[tracing::instrument(skip(self, orders), fields(columns = orders.len()))]
    pub fn set_column_orders(&mut self, orders: &BTreeMap<Id, Vec<Id>>) {
        let listed: BTreeSet<Id> = orders.values().flatten().copied().collect();

        for (column_id, column) in self.columns.iter_mut() {
            if !orders.contains_key(column_id) {
                column.task_ids.retain(|t| !listed.contains(t));
            }
        }

        for (column_id, task_ids) in orders {
            self.column_entry(*column_id).task_ids = task_ids.clone();
            for task_id in task_ids {
                if let Some(task) = self.tasks.get_mut(task_id) {
                    task.column = *column_id;
                }
            }
        }

        self.index_stale = true;
        self.bump();
    }

    pub fn upsert_label(&mut self, label: Label) {
        self.labels.insert(label.id, label);
        self.bump();
    }

    /// Removes the label and strips it from every task and project.
    #[tracing::instrument(skip(self))]
    pub fn remove_label(&mut self, id: Id) -> Option<Label> {
        let removed = self.labels.remove(&id);
        let mut stripped = 0usize;
        for task in self.tasks.values_mut() {
            stripped += usize::from(task.labels.remove(&id));
        }
        for project in self.projects.values_mut() {
            stripped += usize::from(project.labels.remove(&id));
        }
        debug!(stripped, "label references removed");
        self.bump();
        removed
    }

    pub fn upsert_member(&mut self, member: Member) {
        self.members.insert(member.id, member);
        self.bump();
    }

    /// Removes the member and unassigns them from every task.
    #[tracing::instrument(skip(self))]
    pub fn remove_member(&mut self, id: Id) -> Option<Member> {
        let removed = self.members.remove(&id);
        for task in self.tasks.values_mut() {
            task.assignees.remove(&id);
        }
        self.bump();
        removed
    }

    /// Rebuilds the nested wire snapshot, columns and projects in board
    /// order.
    pub fn to_board_dto(&self) -> BoardDto {
        BoardDto {
            id: self.board_id.unwrap_or_default(),
            name: self.board_name.clone(),
            columns: self
                .columns()
                .map(|column| ColumnDto {
                    id: column.id,
                    title: column.title.clone(),
                    tasks: column
                        .task_ids
                        .iter()
                        .filter_map(|id| self.tasks.get(id))
                        .map(Task::to_dto)
                        .collect(),
                })
                .collect(),
            projects: self
                .project_order
                .iter()
                .filter_map(|id| self.projects.get(id))
                .map(Project::to_dto)
                .collect(),
            labels: self.labels.values().map(Into::into).collect(),
            members: self.members.values().map(Into::into).collect(),
        }
    }

    fn column_containing(&self, task: Id) -> Option<Id> {
        self.columns
            .values()
            .find(|column| column.task_ids.contains(&task))
            .map(|column| column.id)
    }

    fn column_entry(&mut self, id: Id) -> &mut Column {
        if !self.columns.contains_key(&id) {
            warn!(column = id, "task references unknown column; creating it");
            self.column_order.push(id);
        }
        self.columns
            .entry(id)
            .or_insert_with(|| Column::new(id, String::new()))
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> BoardSnapshot {
        let mut todo = vec![Task::new(1, "a", 10), Task::new(2, "b", 10)];
        todo[1].labels.insert(5);
        todo[1].assignees.insert(8);
        let mut project = Project::new(3, "launch");
        project.labels.insert(5);

        BoardSnapshot {
            id: 1,
            name: "main".to_string(),
            columns: vec![
                (Column::new(10, "todo"), todo),
                (Column::new(11, "done"), vec![Task::new(4, "d", 11)]),
            ],
            projects: vec![project],
            labels: vec![Label {
                id: 5,
                name: "bug".to_string(),
                color: "#ff0000".to_string(),
            }],
            members: vec![Member {
                id: 8,
                username: "sam".to_string(),
            }],
        }
    }

    fn placements(store: &EntityStore) -> BTreeMap<Id, usize> {
        let mut counts = BTreeMap::new();
        for column in store.columns() {
            for id in &column.task_ids {
                *counts.entry(*id).or_insert(0) += 1;
            }
        }
        counts
    }

    #[test]
    fn load_places_every_task_in_exactly_one_column() {
        let mut snap = snapshot();
        // Same task listed again in "done".
        snap.columns[1].1.push(Task::new(1, "a", 11));

        let mut store = EntityStore::new();
        store.load_board(snap);

        let counts = placements(&store);
        assert_eq!(counts.len(), store.tasks().len());
        assert!(counts.values().all(|n| *n == 1));
        assert_eq!(store.task(1).unwrap().column, 10);
        assert!(store.index_stale());
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());

        let mut task = store.task(2).unwrap().clone();
        task.title = "renamed".to_string();
        store.upsert_task(task.clone());
        let once = (store.tasks().clone(), store.column_orders());
        store.upsert_task(task);
        assert_eq!((store.tasks().clone(), store.column_orders()), once);
    }

    #[test]
    fn upsert_with_new_column_moves_the_task() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());

        let mut task = store.task(1).unwrap().clone();
        task.column = 11;
        store.upsert_task(task);

        assert_eq!(store.column(10).unwrap().task_ids, vec![2]);
        assert_eq!(store.column(11).unwrap().task_ids, vec![4, 1]);
    }

    #[test]
    fn remove_task_prunes_column_order() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());

        assert!(store.remove_task(1).is_some());
        assert!(store.remove_task(1).is_none());
        assert_eq!(store.column(10).unwrap().task_ids, vec![2]);
    }

    #[test]
    fn removing_project_leaves_task_reference_dangling() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());
        let mut task = store.task(1).unwrap().clone();
        task.project = Some(3);
        store.upsert_task(task);

        store.remove_project(3);
        assert_eq!(store.task(1).unwrap().project, Some(3));
        assert!(store.project(3).is_none());
        assert!(store.project_order().is_empty());
    }

    #[test]
    fn column_orders_move_tasks_between_columns() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());

        store.set_column_orders(&BTreeMap::from([(11, vec![2, 4])]));
        assert_eq!(store.column(10).unwrap().task_ids, vec![1]);
        assert_eq!(store.column(11).unwrap().task_ids, vec![2, 4]);
        assert_eq!(store.task(2).unwrap().column, 11);
    }

    #[test]
    fn unlisted_tasks_of_listed_columns_are_reported() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());

        let partial = BTreeMap::from([(10, vec![2])]);
        assert_eq!(store.unlisted_tasks(&partial), vec![1]);

        let moved = BTreeMap::from([(10, vec![2]), (11, vec![1, 4])]);
        assert!(store.unlisted_tasks(&moved).is_empty());

        // Column 11 is not listed, so its task is not at risk.
        let untouched = BTreeMap::from([(10, vec![1, 2])]);
        assert!(store.unlisted_tasks(&untouched).is_empty());
    }

    #[test]
    fn label_and_member_removal_cascade() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());

        store.remove_label(5);
        assert!(store.task(2).unwrap().labels.is_empty());
        assert!(store.project(3).unwrap().labels.is_empty());

        store.remove_member(8);
        assert!(store.task(2).unwrap().assignees.is_empty());
        assert!(store.member(8).is_none());
    }

    #[test]
    fn columns_are_added_and_removed() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());

        assert!(store.insert_column(12, "later"));
        assert!(!store.insert_column(12, "again"));
        assert_eq!(store.column_order(), &[10, 11, 12]);

        assert!(store.remove_column(12).is_some());
        assert_eq!(store.column_order(), &[10, 11]);
    }

    #[test]
    fn project_order_keeps_unlisted_projects() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());
        store.upsert_project(Project::new(4, "second"));
        store.upsert_project(Project::new(5, "third"));

        store.set_project_order(&[5, 99, 3]);
        assert_eq!(store.project_order(), &[5, 3, 4]);
    }

    #[test]
    fn every_mutation_bumps_revision() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());
        let before = store.revision();
        store.insert_column(20, "x");
        store.remove_label(5);
        assert_eq!(store.revision(), before + 2);
    }

    #[test]
    fn board_dto_nests_tasks_in_column_order() {
        let mut store = EntityStore::new();
        store.load_board(snapshot());
        store.set_column_orders(&BTreeMap::from([(10, vec![2, 1])]));

        let dto = store.to_board_dto();
        let todo: Vec<Id> = dto.columns[0].tasks.iter().map(|t| t.id).collect();
        assert_eq!(todo, vec![2, 1]);
        assert_eq!(dto.projects.len(), 1);
    }
}
