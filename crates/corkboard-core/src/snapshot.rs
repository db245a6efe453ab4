use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use chrono::Utc;
use corkboard_shared::{
    BoardDto, ColumnDto, NewProjectDto, NewTaskDto, PlacedTaskDto, ProjectDto, ProjectPatchDto,
    SortProjectsRequest, SortTasksRequest, TaskDto, TaskPatchDto,
};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::api::BoardApi;
use crate::model::{BoardSnapshot, Id, Label};
use crate::patch::{NewProject, NewTask, ProjectPatch, TaskPatch};
use crate::store::EntityStore;

pub const DEFAULT_BOARD_ID: Id = 1;

/// Board service backed by a single JSON snapshot file. Each request
/// loads the file, applies the change and writes it back atomically.
#[derive(Debug)]
pub struct SnapshotApi {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SnapshotApi {
    /// Opens `path`, seeding a board with three empty columns if the file
    /// does not exist yet.
    #[tracing::instrument(skip(path))]
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        if !path.exists() {
            save_board_file_atomic(path, &default_board())?;
            info!(file = %path.display(), "created board file");
        }

        info!(file = %path.display(), "opened board file");
        Ok(Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<BoardDto> {
        let _guard = self.lock.lock();
        load_board_file(&self.path)
    }

    pub fn add_label(&self, name: &str, color: &str) -> anyhow::Result<Label> {
        if name.trim().is_empty() {
            bail!("label name cannot be empty");
        }
        self.with_store(|store| {
            let label = Label {
                id: next_id(store.labels().keys()),
                name: name.trim().to_string(),
                color: color.to_string(),
            };
            store.upsert_label(label.clone());
            Ok(label)
        })
    }

    /// Deletes the label and strips it from every task and project.
    pub fn remove_label(&self, id: Id) -> anyhow::Result<Label> {
        self.with_store(|store| {
            store
                .remove_label(id)
                .ok_or_else(|| anyhow!("label {id} not found"))
        })
    }

    fn with_store<T>(
        &self,
        apply: impl FnOnce(&mut EntityStore) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let _guard = self.lock.lock();
        let dto = load_board_file(&self.path)?;
        let snapshot = BoardSnapshot::from_dto(dto)
            .with_context(|| format!("invalid board in {}", self.path.display()))?;

        let mut store = EntityStore::new();
        store.load_board(snapshot);
        let out = apply(&mut store)?;

        save_board_file_atomic(&self.path, &store.to_board_dto())?;
        Ok(out)
    }
}

impl BoardApi for SnapshotApi {
    async fn fetch_board(&self, board: Id) -> anyhow::Result<BoardDto> {
        let dto = self.load()?;
        if dto.id != board {
            bail!("board {board} not found");
        }
        Ok(dto)
    }

    async fn sort_tasks(&self, request: SortTasksRequest) -> anyhow::Result<()> {
        self.with_store(|store| {
            ensure_board(store, request.board)?;
            for (column, ids) in &request.tasks {
                if store.column(*column).is_none() {
                    bail!("column {column} not found");
                }
                if let Some(missing) = ids.iter().find(|id| store.task(**id).is_none()) {
                    bail!("task {missing} not found");
                }
            }
            if let Some(dropped) = store.unlisted_tasks(&request.tasks).first() {
                bail!("task {dropped} would be left without a column");
            }
            store.set_column_orders(&request.tasks);
            debug!(tasks = request.order.len(), "stored task order");
            Ok(())
        })
    }

    async fn sort_projects(&self, request: SortProjectsRequest) -> anyhow::Result<()> {
        self.with_store(|store| {
            ensure_board(store, request.board)?;
            store.set_project_order(&request.order);
            Ok(())
        })
    }

    async fn create_task(&self, task: NewTaskDto) -> anyhow::Result<PlacedTaskDto> {
        let new = NewTask::from_dto(task)?;
        self.with_store(|store| {
            if store.column(new.column).is_none() {
                bail!("column {} not found", new.column);
            }
            let now = Utc::now();
            let mut task = new.into_task(next_id(store.tasks().keys()));
            task.created = Some(now);
            task.modified = Some(now);
            let placed = task.to_placed_dto();
            store.upsert_task(task);
            Ok(placed)
        })
    }

    async fn patch_task(&self, id: Id, patch: TaskPatchDto) -> anyhow::Result<TaskDto> {
        let patch = TaskPatch::from_dto(patch)?;
        self.with_store(|store| {
            let mut task = store
                .task(id)
                .cloned()
                .ok_or_else(|| anyhow!("task {id} not found"))?;
            if patch.apply(&mut task) {
                task.modified = Some(Utc::now());
            }
            let dto = task.to_dto();
            store.upsert_task(task);
            Ok(dto)
        })
    }

    /// Subtasks of the deleted task lose their parent.
    async fn delete_task(&self, id: Id) -> anyhow::Result<()> {
        self.with_store(|store| {
            store
                .remove_task(id)
                .ok_or_else(|| anyhow!("task {id} not found"))?;
            clear_parent(store, id);
            Ok(())
        })
    }

    async fn create_project(&self, project: NewProjectDto) -> anyhow::Result<ProjectDto> {
        let new = NewProject::from_dto(project)?;
        self.with_store(|store| {
            let now = Utc::now();
            let mut project = new.into_project(next_id(store.projects().keys()));
            project.created = Some(now);
            project.modified = Some(now);
            let dto = project.to_dto();
            store.upsert_project(project);
            Ok(dto)
        })
    }

    async fn patch_project(&self, id: Id, patch: ProjectPatchDto) -> anyhow::Result<ProjectDto> {
        let patch = ProjectPatch::from_dto(patch)?;
        self.with_store(|store| {
            let mut project = store
                .project(id)
                .cloned()
                .ok_or_else(|| anyhow!("project {id} not found"))?;
            if patch.apply(&mut project) {
                project.modified = Some(Utc::now());
            }
            let dto = project.to_dto();
            store.upsert_project(project);
            Ok(dto)
        })
    }

    /// Deletes the project together with its tasks.
    async fn delete_project(&self, id: Id) -> anyhow::Result<()> {
        self.with_store(|store| {
            store
                .remove_project(id)
                .ok_or_else(|| anyhow!("project {id} not found"))?;
            let owned: Vec<Id> = store
                .tasks()
                .values()
                .filter(|task| task.project == Some(id))
                .map(|task| task.id)
                .collect();
            for task in &owned {
                store.remove_task(*task);
                clear_parent(store, *task);
            }
            debug!(project = id, tasks = owned.len(), "deleted project tasks");
            Ok(())
        })
    }
}

fn ensure_board(store: &EntityStore, board: Id) -> anyhow::Result<()> {
    if store.board_id() != Some(board) {
        bail!("board {board} not found");
    }
    Ok(())
}

fn clear_parent(store: &mut EntityStore, parent: Id) {
    let children: Vec<_> = store
        .tasks()
        .values()
        .filter(|task| task.parent_task == Some(parent))
        .cloned()
        .collect();
    for mut child in children {
        child.parent_task = None;
        store.upsert_task(child);
    }
}

fn next_id<'a>(ids: impl Iterator<Item = &'a Id>) -> Id {
    ids.max().copied().unwrap_or(0) + 1
}

fn default_board() -> BoardDto {
    let column = |id: Id, title: &str| ColumnDto {
        id,
        title: title.to_string(),
        tasks: Vec::new(),
    };
    BoardDto {
        id: DEFAULT_BOARD_ID,
        name: "Board".to_string(),
        columns: vec![column(1, "Todo"), column(2, "Doing"), column(3, "Done")],
        projects: Vec::new(),
        labels: Vec::new(),
        members: Vec::new(),
    }
}

#[tracing::instrument(skip(path))]
pub fn load_board_file(path: &Path) -> anyhow::Result<BoardDto> {
    debug!(file = %path.display(), "loading board file");
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", path.display()))
}

#[tracing::instrument(skip(path, board))]
pub fn save_board_file_atomic(path: &Path, board: &BoardDto) -> anyhow::Result<()> {
    debug!(file = %path.display(), board = board.id, "saving board file atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, board)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_seeds_default_board() {
        let dir = tempfile::tempdir().unwrap();
        let api = SnapshotApi::open(&dir.path().join("nested/board.json")).unwrap();

        let board = api.load().unwrap();
        assert_eq!(board.id, DEFAULT_BOARD_ID);
        let titles: Vec<_> = board.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Todo", "Doing", "Done"]);
    }

    #[test]
    fn open_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        let mut board = default_board();
        board.name = "kept".to_string();
        save_board_file_atomic(&path, &board).unwrap();

        let api = SnapshotApi::open(&path).unwrap();
        assert_eq!(api.load().unwrap().name, "kept");
    }

    #[test]
    fn labels_cascade_on_removal() {
        let dir = tempfile::tempdir().unwrap();
        let api = SnapshotApi::open(&dir.path().join("board.json")).unwrap();
        let label = api.add_label("ops", "#ff0000").unwrap();
        assert_eq!(label.id, 1);
        assert!(api.add_label("  ", "").is_err());

        api.remove_label(label.id).unwrap();
        assert!(api.load().unwrap().labels.is_empty());
        assert!(api.remove_label(label.id).is_err());
    }

    #[test]
    fn next_id_is_one_past_max() {
        assert_eq!(next_id([].iter()), 1);
        assert_eq!(next_id([3, 9, 4].iter()), 10);
    }

    #[test]
    fn corrupt_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        fs::write(&path, "{not json").unwrap();

        let err = load_board_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("board.json"));
    }
}
