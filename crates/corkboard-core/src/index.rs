use std::collections::BTreeMap;

use tracing::trace;

use crate::model::{Column, Id, Task};
use crate::store::EntityStore;

/// Groups child task ids under their parent. Lists follow the iteration
/// order of `tasks`; tasks without children get no entry, and a parent
/// missing from `tasks` counts as no parent.
pub fn build_parent_index(tasks: &BTreeMap<Id, Task>) -> BTreeMap<Id, Vec<Id>> {
    let mut by_parent: BTreeMap<Id, Vec<Id>> = BTreeMap::new();

    for task in tasks.values() {
        if let Some(parent) = task.parent_task
            && tasks.contains_key(&parent)
        {
            by_parent.entry(parent).or_default().push(task.id);
        }
    }

    by_parent
}

/// Maps every placed task id to the column that lists it. The first
/// listing wins if a task is listed twice.
pub fn build_column_index<'a, I>(columns: I) -> BTreeMap<Id, Id>
where
    I: IntoIterator<Item = &'a Column>,
{
    let mut column_of = BTreeMap::new();
    for column in columns {
        for task_id in &column.task_ids {
            column_of.entry(*task_id).or_insert(column.id);
        }
    }
    column_of
}

/// Indices derived from the entity store. Always rebuilt in full.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex {
    by_parent: BTreeMap<Id, Vec<Id>>,
    column_of: BTreeMap<Id, Id>,
}

impl TaskIndex {
    pub fn build(store: &EntityStore) -> Self {
        let index = Self {
            by_parent: build_parent_index(store.tasks()),
            column_of: build_column_index(store.columns()),
        };
        trace!(
            parents = index.by_parent.len(),
            placed = index.column_of.len(),
            "rebuilt task index"
        );
        index
    }

    pub fn by_parent(&self) -> &BTreeMap<Id, Vec<Id>> {
        &self.by_parent
    }

    pub fn children_of(&self, parent: Id) -> &[Id] {
        self.by_parent
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn column_of(&self, task: Id) -> Option<Id> {
        self.column_of.get(&task).copied()
    }
}
