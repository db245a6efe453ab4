use std::future::Future;

use corkboard_shared::{
    BoardDto, NewProjectDto, NewTaskDto, PlacedTaskDto, ProjectDto, ProjectPatchDto,
    SortProjectsRequest, SortTasksRequest, TaskDto, TaskPatchDto,
};

use crate::model::Id;

/// Request/response boundary to the board service. Each call either
/// succeeds with the service's view of the entity or fails; transport is
/// the implementor's concern.
pub trait BoardApi {
    fn fetch_board(&self, board: Id) -> impl Future<Output = anyhow::Result<BoardDto>> + Send;

    fn sort_tasks(
        &self,
        request: SortTasksRequest,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn sort_projects(
        &self,
        request: SortProjectsRequest,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn create_task(
        &self,
        task: NewTaskDto,
    ) -> impl Future<Output = anyhow::Result<PlacedTaskDto>> + Send;

    fn patch_task(
        &self,
        id: Id,
        patch: TaskPatchDto,
    ) -> impl Future<Output = anyhow::Result<TaskDto>> + Send;

    fn delete_task(&self, id: Id) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn create_project(
        &self,
        project: NewProjectDto,
    ) -> impl Future<Output = anyhow::Result<ProjectDto>> + Send;

    fn patch_project(
        &self,
        id: Id,
        patch: ProjectPatchDto,
    ) -> impl Future<Output = anyhow::Result<ProjectDto>> + Send;

    fn delete_project(&self, id: Id) -> impl Future<Output = anyhow::Result<()>> + Send;
}
