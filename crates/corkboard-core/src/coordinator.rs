use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use corkboard_shared::{SortProjectsRequest, SortTasksRequest};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::BoardApi;
use crate::board::Board;
use crate::datetime::BoardClock;
use crate::intent::Intent;
use crate::model::{BoardSnapshot, Id, Project, Task};
use crate::notify::{Notice, Notifier};
use crate::patch::{NewProject, NewTask, ProjectPatch, TaskPatch};

pub type SharedBoard = Arc<Mutex<Board>>;

/// Drives board mutations that need the service's agreement. Reorders are
/// applied locally first and rolled back if the service rejects them;
/// creates, patches and deletes only touch local state after success.
///
/// The board lock is only ever held for synchronous sections, never while
/// a request is in flight.
pub struct Coordinator<A, N> {
    board: SharedBoard,
    api: A,
    notifier: N,
    clock: BoardClock,
}

impl<A: BoardApi, N: Notifier> Coordinator<A, N> {
    pub fn new(api: A, notifier: N, clock: BoardClock) -> Self {
        Self::with_board(Arc::new(Mutex::new(Board::new())), api, notifier, clock)
    }

    pub fn with_board(board: SharedBoard, api: A, notifier: N, clock: BoardClock) -> Self {
        Self {
            board,
            api,
            notifier,
            clock,
        }
    }

    pub fn board(&self) -> &SharedBoard {
        &self.board
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn clock(&self) -> &BoardClock {
        &self.clock
    }

    pub async fn load_board(&self, board_id: Id) -> anyhow::Result<()> {
        let request = Uuid::new_v4();
        debug!(%request, board = board_id, "fetching board");

        let snapshot = match self
            .api
            .fetch_board(board_id)
            .await
            .and_then(BoardSnapshot::from_dto)
        {
            Ok(snapshot) => snapshot,
            Err(err) => return Err(self.reject(err, format!("failed to load board {board_id}"))),
        };

        self.board.lock().load(snapshot);
        info!(%request, board = board_id, "board loaded");
        Ok(())
    }

    /// Reloads the board that is currently loaded.
    pub async fn refresh(&self) -> anyhow::Result<()> {
        let board_id = self.loaded_board_id()?;
        self.load_board(board_id).await
    }

    /// Optimistically applies new task orders for the given columns, each
    /// re-sorted by due date and priority, then asks the service to
    /// confirm. A rejection restores every column's previous order and
    /// raises a single error notice.
    pub async fn reorder_tasks(&self, orders: BTreeMap<Id, Vec<Id>>) -> anyhow::Result<()> {
        let request = Uuid::new_v4();
        let today = self.clock.today();

        let (previous, published, payload) = {
            let mut board = self.board.lock();
            let board_id = loaded_board_id(&board)?;
            validate_task_orders(&board, &orders)?;

            let previous = board.store().column_orders();
            let sorted: BTreeMap<Id, Vec<Id>> = orders
                .iter()
                .map(|(column, ids)| (*column, board.sorted_task_ids(ids, today)))
                .collect();
            board.set_column_orders(&sorted);

            let order = flatten_orders(&sorted);
            let payload = SortTasksRequest {
                board: board_id,
                tasks: sorted,
                order,
            };
            (previous, board.revision(), payload)
        };

        debug!(%request, columns = payload.tasks.len(), "task order published");
        match self.api.sort_tasks(payload).await {
            Ok(()) => {
                info!(%request, "task order confirmed");
                Ok(())
            }
            Err(err) => {
                {
                    let mut board = self.board.lock();
                    if board.revision() != published {
                        warn!(
                            %request,
                            published,
                            current = board.revision(),
                            "rolling back over newer board changes"
                        );
                    }
                    board.set_column_orders(&previous);
                }
                warn!(%request, error = %format!("{err:#}"), "task order rejected; rolled back");
                Err(self.reject(err, "task reorder rejected"))
            }
        }
    }

    /// Drops `task` into `column` at `position` and reorders both affected
    /// columns.
    pub async fn move_task(
        &self,
        task: Id,
        column: Id,
        position: Option<usize>,
    ) -> anyhow::Result<()> {
        let orders = self.board.lock().plan_task_move(task, column, position)?;
        self.reorder_tasks(orders).await
    }

    /// Optimistically replaces the project order and asks the service to
    /// confirm, rolling back on rejection.
    pub async fn reorder_projects(&self, order: Vec<Id>) -> anyhow::Result<()> {
        let request = Uuid::new_v4();

        let (previous, published, payload) = {
            let mut board = self.board.lock();
            let board_id = loaded_board_id(&board)?;
            if let Some(unknown) = order.iter().find(|id| board.store().project(**id).is_none()) {
                bail!("project {unknown} not found");
            }

            let previous = board.store().project_order().to_vec();
            board.set_project_order(&order);
            let payload = SortProjectsRequest {
                board: board_id,
                order: board.store().project_order().to_vec(),
            };
            (previous, board.revision(), payload)
        };

        debug!(%request, projects = payload.order.len(), "project order published");
        match self.api.sort_projects(payload).await {
            Ok(()) => {
                info!(%request, "project order confirmed");
                Ok(())
            }
            Err(err) => {
                {
                    let mut board = self.board.lock();
                    if board.revision() != published {
                        warn!(
                            %request,
                            published,
                            current = board.revision(),
                            "rolling back over newer board changes"
                        );
                    }
                    board.set_project_order(&previous);
                }
                warn!(%request, error = %format!("{err:#}"), "project order rejected; rolled back");
                Err(self.reject(err, "project reorder rejected"))
            }
        }
    }

    pub async fn move_project(&self, project: Id, position: usize) -> anyhow::Result<()> {
        let order = self.board.lock().plan_project_move(project, position)?;
        self.reorder_projects(order).await
    }

    /// Creates a task through the service, then places it and re-sorts its
    /// column.
    pub async fn create_task(&self, new: NewTask) -> anyhow::Result<Id> {
        if let Err(err) = new.validate() {
            return Err(self.reject(err, "invalid task"));
        }
        let request = Uuid::new_v4();
        let today = self.clock.today();
        debug!(%request, column = new.column, "creating task");

        let task = match self
            .api
            .create_task(new.to_dto())
            .await
            .and_then(Task::from_placed)
        {
            Ok(task) => task,
            Err(err) => return Err(self.reject(err, "failed to create task")),
        };

        let id = task.id;
        {
            let mut board = self.board.lock();
            let column = task.column;
            board.upsert_task(task);
            let ids = board
                .store()
                .column(column)
                .map(|c| c.task_ids.clone())
                .unwrap_or_default();
            let sorted = board.sorted_task_ids(&ids, today);
            board.set_column_orders(&BTreeMap::from([(column, sorted)]));
        }

        info!(%request, task = id, "task created");
        self.notifier.notify(Notice::success("Task created"));
        Ok(id)
    }

    pub async fn patch_task(&self, id: Id, patch: TaskPatch) -> anyhow::Result<()> {
        let request = Uuid::new_v4();
        let (column, cyclic_parent) = {
            let board = self.board.lock();
            let task = board
                .store()
                .task(id)
                .ok_or_else(|| anyhow!("task {id} not found"))?;
            let cyclic_parent = patch
                .parent_task
                .flatten()
                .filter(|parent| board.would_create_cycle(id, *parent));
            (task.column, cyclic_parent)
        };
        if let Some(parent) = cyclic_parent {
            let err = anyhow!("task {parent} cannot become the parent of task {id}");
            return Err(self.reject(err, "invalid task update"));
        }
        if patch.is_empty() {
            debug!(task = id, "empty patch; nothing to send");
            return Ok(());
        }
        debug!(%request, task = id, "patching task");

        let result = self.api.patch_task(id, patch.to_dto()).await;
        let updated = {
            let board = self.board.lock();
            let column = board.store().task(id).map_or(column, |t| t.column);
            result.and_then(|dto| Task::from_dto(dto, column))
        };
        let task = match updated {
            Ok(task) => task,
            Err(err) => return Err(self.reject(err, format!("failed to update task {id}"))),
        };

        self.board.lock().upsert_task(task);
        info!(%request, task = id, "task updated");
        Ok(())
    }

    pub async fn delete_task(&self, id: Id) -> anyhow::Result<()> {
        let request = Uuid::new_v4();
        debug!(%request, task = id, "deleting task");
        if let Err(err) = self.api.delete_task(id).await {
            return Err(self.reject(err, format!("failed to delete task {id}")));
        }

        if self.board.lock().remove_task(id).is_none() {
            debug!(task = id, "deleted task was not on the local board");
        }
        info!(%request, task = id, "task deleted");
        self.notifier.notify(Notice::info("Task deleted"));
        Ok(())
    }

    pub async fn create_project(&self, new: NewProject) -> anyhow::Result<Id> {
        if let Err(err) = new.validate() {
            return Err(self.reject(err, "invalid project"));
        }
        let request = Uuid::new_v4();
        debug!(%request, "creating project");

        let project = match self
            .api
            .create_project(new.to_dto())
            .await
            .and_then(Project::from_dto)
        {
            Ok(project) => project,
            Err(err) => return Err(self.reject(err, "failed to create project")),
        };

        let id = project.id;
        self.board.lock().upsert_project(project);
        info!(%request, project = id, "project created");
        self.notifier.notify(Notice::success("Project created"));
        Ok(id)
    }

    pub async fn patch_project(&self, id: Id, patch: ProjectPatch) -> anyhow::Result<()> {
        if self.board.lock().store().project(id).is_none() {
            bail!("project {id} not found");
        }
        if patch.is_empty() {
            debug!(project = id, "empty patch; nothing to send");
            return Ok(());
        }
        let request = Uuid::new_v4();
        debug!(%request, project = id, "patching project");

        let project = match self
            .api
            .patch_project(id, patch.to_dto())
            .await
            .and_then(Project::from_dto)
        {
            Ok(project) => project,
            Err(err) => return Err(self.reject(err, format!("failed to update project {id}"))),
        };

        self.board.lock().upsert_project(project);
        info!(%request, project = id, "project updated");
        Ok(())
    }

    pub async fn delete_project(&self, id: Id) -> anyhow::Result<()> {
        let request = Uuid::new_v4();
        debug!(%request, project = id, "deleting project");
        if let Err(err) = self.api.delete_project(id).await {
            return Err(self.reject(err, format!("failed to delete project {id}")));
        }

        self.board.lock().remove_project(id);
        info!(%request, project = id, "project deleted");
        self.notifier.notify(Notice::info("Project deleted"));
        Ok(())
    }

    /// Routes an intent: reorders go through confirmation, everything else
    /// is applied to local state directly.
    pub async fn dispatch(&self, intent: Intent) -> anyhow::Result<()> {
        match intent {
            Intent::Reorder(orders) => self.reorder_tasks(orders).await,
            Intent::ReorderProjects(order) => self.reorder_projects(order).await,
            other => {
                self.board.lock().apply(other);
                Ok(())
            }
        }
    }

    fn loaded_board_id(&self) -> anyhow::Result<Id> {
        loaded_board_id(&self.board.lock())
    }

    /// Raises the single error notice for a failed mutation and hands the
    /// error back with context.
    fn reject(&self, err: anyhow::Error, context: impl Into<String>) -> anyhow::Error {
        self.notifier.notify(Notice::error(format!("{err:#}")));
        err.context(context.into())
    }
}

fn loaded_board_id(board: &Board) -> anyhow::Result<Id> {
    board
        .store()
        .board_id()
        .ok_or_else(|| anyhow!("no board loaded"))
}

fn validate_task_orders(board: &Board, orders: &BTreeMap<Id, Vec<Id>>) -> anyhow::Result<()> {
    let mut seen = BTreeSet::new();
    for (column, ids) in orders {
        if board.store().column(*column).is_none() {
            bail!("column {column} not found");
        }
        for id in ids {
            if board.store().task(*id).is_none() {
                bail!("task {id} not found");
            }
            if !seen.insert(*id) {
                bail!("task {id} listed more than once");
            }
        }
    }
    if let Some(dropped) = board.store().unlisted_tasks(orders).first() {
        bail!("task {dropped} would be left without a column");
    }
    Ok(())
}

/// Concatenates the given column sequences by ascending column id.
pub fn flatten_orders(orders: &BTreeMap<Id, Vec<Id>>) -> Vec<Id> {
    orders.values().flatten().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_concatenates_by_column_id() {
        let orders = BTreeMap::from([(30, vec![9]), (10, vec![1, 2]), (20, vec![8])]);
        assert_eq!(flatten_orders(&orders), vec![1, 2, 8, 9]);
    }

    #[test]
    fn validation_rejects_unknown_and_repeated_ids() {
        let board = Board::from_snapshot(BoardSnapshot {
            id: 1,
            name: "main".to_string(),
            columns: vec![(
                crate::model::Column::new(10, "todo"),
                vec![Task::new(1, "a", 10), Task::new(2, "b", 10)],
            )],
            projects: vec![],
            labels: vec![],
            members: vec![],
        });

        assert!(validate_task_orders(&board, &BTreeMap::from([(10, vec![2, 1])])).is_ok());
        assert!(validate_task_orders(&board, &BTreeMap::from([(99, vec![1])])).is_err());
        assert!(validate_task_orders(&board, &BTreeMap::from([(10, vec![1, 7])])).is_err());
        assert!(validate_task_orders(&board, &BTreeMap::from([(10, vec![1, 1])])).is_err());
        assert!(validate_task_orders(&board, &BTreeMap::from([(10, vec![2])])).is_err());
    }
}
