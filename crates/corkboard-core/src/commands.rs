use std::collections::BTreeSet;

use anyhow::{Context, anyhow, bail};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::cli::{
    AddProjectArgs, AddTaskArgs, Command, EditProjectArgs, EditTaskArgs, LabelCommand,
    ProjectCommand, parse_nullable_id,
};
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::datetime::parse_due_expr;
use crate::filter::ProjectSelection;
use crate::intent::Intent;
use crate::model::{Id, Priority, project_ref};
use crate::notify::Notifier;
use crate::patch::{NewProject, NewTask, ProjectPatch, TaskPatch};
use crate::render::Renderer;
use crate::snapshot::SnapshotApi;

#[tracing::instrument(skip_all, fields(command = command.name()))]
pub async fn dispatch<N: Notifier>(
    coordinator: &Coordinator<SnapshotApi, N>,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let today = coordinator.clock().today();
    debug!(%today, "dispatching command");

    match command {
        Command::Board { project, labels } => {
            let selection = match project.as_deref() {
                Some(raw) => ProjectSelection::parse(raw)?,
                None => ProjectSelection::All,
            };
            coordinator.dispatch(Intent::SelectProject(selection)).await?;
            coordinator
                .dispatch(Intent::SetLabelFilter(labels.into_iter().collect()))
                .await?;

            let board = coordinator.board().lock();
            renderer.print_board(&board, today)
        }
        Command::Projects { labels } => {
            coordinator
                .dispatch(Intent::SetLabelFilter(labels.into_iter().collect()))
                .await?;

            let board = coordinator.board().lock();
            renderer.print_projects(&board, today)
        }
        Command::Show { id } => show_task(coordinator, renderer, id),
        Command::Subtasks { id } => {
            let board = coordinator.board().lock();
            if board.store().task(id).is_none() {
                bail!("task {id} not found");
            }
            let mut children = board.children_of(id);
            crate::sort::sort_by_due_and_priority(&mut children, today);
            renderer.print_tasks(&board, &children, today)
        }
        Command::Add(args) => {
            let new = new_task_from_args(coordinator, args, today)?;
            let id = coordinator.create_task(new).await?;
            show_task(coordinator, renderer, id)
        }
        Command::Edit(args) => {
            let id = args.id;
            let patch = task_patch_from_args(args, today)?;
            if patch.is_empty() {
                bail!("nothing to change for task {id}");
            }
            coordinator.patch_task(id, patch).await?;
            show_task(coordinator, renderer, id)
        }
        Command::Rm { id } => coordinator.delete_task(id).await,
        Command::Move {
            id,
            column,
            position,
        } => {
            coordinator.move_task(id, column, position).await?;
            info!(task = id, column, "task moved");
            println!("Moved task {id}.");
            Ok(())
        }
        Command::Project { action } => project_command(coordinator, renderer, action, today).await,
        Command::Labels => {
            let board = coordinator.board().lock();
            renderer.print_labels(&board)
        }
        Command::Label { action } => label_command(coordinator, action).await,
        Command::Config => renderer.print_config(cfg),
    }
}

async fn project_command<N: Notifier>(
    coordinator: &Coordinator<SnapshotApi, N>,
    renderer: &Renderer,
    action: ProjectCommand,
    today: NaiveDate,
) -> anyhow::Result<()> {
    match action {
        ProjectCommand::Add(args) => {
            let new = new_project_from_args(args, today)?;
            let id = coordinator.create_project(new).await?;
            println!("Created project {id}.");
            Ok(())
        }
        ProjectCommand::Edit(args) => {
            let id = args.id;
            let patch = project_patch_from_args(args, today)?;
            if patch.is_empty() {
                bail!("nothing to change for project {id}");
            }
            coordinator.patch_project(id, patch).await?;
            let board = coordinator.board().lock();
            renderer.print_projects(&board, today)
        }
        ProjectCommand::Rm { id } => coordinator.delete_project(id).await,
        ProjectCommand::Move { id, position } => {
            coordinator.move_project(id, position).await?;
            println!("Moved project {id}.");
            Ok(())
        }
    }
}

async fn label_command<N: Notifier>(
    coordinator: &Coordinator<SnapshotApi, N>,
    action: LabelCommand,
) -> anyhow::Result<()> {
    match action {
        LabelCommand::Add { name, color } => {
            let label = coordinator.api().add_label(&name, &color)?;
            println!("Created label {} ({}).", label.id, label.name);
            coordinator.board().lock().upsert_label(label);
            Ok(())
        }
        LabelCommand::Rm { id } => {
            let label = coordinator.api().remove_label(id)?;
            coordinator.dispatch(Intent::RemoveLabel(id)).await?;
            println!("Deleted label {} ({}).", label.id, label.name);
            Ok(())
        }
    }
}

fn show_task<N: Notifier>(
    coordinator: &Coordinator<SnapshotApi, N>,
    renderer: &Renderer,
    id: Id,
) -> anyhow::Result<()> {
    let board = coordinator.board().lock();
    let task = board
        .store()
        .task(id)
        .ok_or_else(|| anyhow!("task {id} not found"))?;
    renderer.print_task_info(&board, task)
}

fn new_task_from_args<N: Notifier>(
    coordinator: &Coordinator<SnapshotApi, N>,
    args: AddTaskArgs,
    today: NaiveDate,
) -> anyhow::Result<NewTask> {
    let column = match args.column {
        Some(column) => column,
        None => coordinator
            .board()
            .lock()
            .store()
            .column_order()
            .first()
            .copied()
            .ok_or_else(|| anyhow!("board has no columns"))?,
    };

    let mut new = NewTask::new(args.title.join(" "), column);
    if let Some(description) = args.description {
        new.description = description;
    }
    if let Some(priority) = args.priority.as_deref() {
        new.priority = Priority::parse(priority)?;
    }
    new.due_date = args
        .due
        .as_deref()
        .map(|expr| parse_due_expr(expr, today))
        .transpose()?;
    new.project = project_ref(args.project);
    new.parent_task = args.parent;
    new.labels = args.labels.into_iter().collect();
    new.assignees = args.assignees.into_iter().collect();
    Ok(new)
}

fn task_patch_from_args(args: EditTaskArgs, today: NaiveDate) -> anyhow::Result<TaskPatch> {
    Ok(TaskPatch {
        title: args.title,
        description: args.description,
        priority: args.priority.as_deref().map(Priority::parse).transpose()?,
        labels: args.labels.map(BTreeSet::from_iter),
        assignees: args.assignees.map(BTreeSet::from_iter),
        due_date: args
            .due
            .as_deref()
            .map(|raw| parse_nullable_due(raw, today))
            .transpose()?,
        project: args
            .project
            .as_deref()
            .map(parse_nullable_id)
            .transpose()
            .context("--project")?
            .map(project_ref),
        parent_task: args
            .parent
            .as_deref()
            .map(parse_nullable_id)
            .transpose()
            .context("--parent")?,
        closed: closed_flag(args.close, args.reopen),
    })
}

fn new_project_from_args(args: AddProjectArgs, today: NaiveDate) -> anyhow::Result<NewProject> {
    let mut new = NewProject::new(args.title.join(" "));
    if let Some(description) = args.description {
        new.description = description;
    }
    if let Some(priority) = args.priority.as_deref() {
        new.priority = Priority::parse(priority)?;
    }
    new.due_date = args
        .due
        .as_deref()
        .map(|expr| parse_due_expr(expr, today))
        .transpose()?;
    new.labels = args.labels.into_iter().collect();
    Ok(new)
}

fn project_patch_from_args(
    args: EditProjectArgs,
    today: NaiveDate,
) -> anyhow::Result<ProjectPatch> {
    Ok(ProjectPatch {
        title: args.title,
        description: args.description,
        priority: args.priority.as_deref().map(Priority::parse).transpose()?,
        labels: args.labels.map(BTreeSet::from_iter),
        due_date: args
            .due
            .as_deref()
            .map(|raw| parse_nullable_due(raw, today))
            .transpose()?,
        closed: closed_flag(args.close, args.reopen),
    })
}

fn parse_nullable_due(raw: &str, today: NaiveDate) -> anyhow::Result<Option<NaiveDate>> {
    if raw.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_due_expr(raw, today).map(Some)
}

fn closed_flag(close: bool, reopen: bool) -> Option<bool> {
    match (close, reopen) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
