use std::collections::BTreeSet;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::board::Board;
use crate::config::Config;
use crate::datetime::{days_until, format_timestamp, format_wire_date};
use crate::model::{Id, Priority, Task};
use crate::sort::DUE_DATE_IGNORE_DAYS;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let setting = cfg.get("color").unwrap_or("on");
        let color = match setting.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, board))]
    pub fn print_board(&self, board: &Board, today: NaiveDate) -> anyhow::Result<()> {
        self.write_board(io::stdout().lock(), board, today)
    }

    pub fn write_board<W: Write>(
        &self,
        mut out: W,
        board: &Board,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let views = board.visible_columns();
        if views.is_empty() {
            writeln!(out, "No columns.")?;
            return Ok(());
        }

        for (idx, view) in views.iter().enumerate() {
            if idx > 0 {
                writeln!(out)?;
            }
            let count = if view.tasks.len() == view.total {
                view.total.to_string()
            } else {
                format!("{}/{}", view.tasks.len(), view.total)
            };
            writeln!(
                out,
                "{} ({count})",
                self.paint(&view.column.title, "1")
            )?;
            if !view.tasks.is_empty() {
                self.write_task_table(&mut out, board, &view.tasks, today)?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, board, tasks))]
    pub fn print_tasks(&self, board: &Board, tasks: &[&Task], today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }
        self.write_task_table(&mut out, board, tasks, today)
    }

    #[tracing::instrument(skip(self, board))]
    pub fn print_projects(&self, board: &Board, today: NaiveDate) -> anyhow::Result<()> {
        self.write_projects(io::stdout().lock(), board, today)
    }

    pub fn write_projects<W: Write>(
        &self,
        mut out: W,
        board: &Board,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let projects = board.visible_projects(today);
        if projects.is_empty() {
            writeln!(out, "No projects.")?;
            return Ok(());
        }

        let headers = ["ID", "Pri", "Due", "Title", "Labels"];
        let rows = projects
            .iter()
            .map(|project| {
                vec![
                    self.paint(&project.id.to_string(), "33"),
                    self.priority_cell(project.priority),
                    self.due_cell(project.due_date, today),
                    closed_title(&project.title, project.closed),
                    label_names(board, &project.labels),
                ]
            })
            .collect();
        write_table(&mut out, &headers, rows)
    }

    #[tracing::instrument(skip(self, board, task), fields(id = task.id))]
    pub fn print_task_info(&self, board: &Board, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let column = board
            .store()
            .column(task.column)
            .map(|c| c.title.as_str())
            .unwrap_or("-");
        let project = board
            .project_of(task)
            .map(|p| format!("{} ({})", p.title, p.id))
            .unwrap_or_default();
        let parent = board
            .parent_of(task)
            .map(|p| format!("{} ({})", p.title, p.id))
            .unwrap_or_default();
        let assignees = board
            .assignees_of(task)
            .iter()
            .map(|m| m.username.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(out, "column      {column}")?;
        writeln!(out, "priority    {}", task.priority)?;
        writeln!(out, "closed      {}", if task.closed { "yes" } else { "no" })?;
        if let Some(due) = task.due_date {
            writeln!(out, "due         {}", format_wire_date(due))?;
        }
        writeln!(out, "project     {project}")?;
        writeln!(out, "parent      {parent}")?;
        writeln!(out, "subtasks    {}", board.index().children_of(task.id).len())?;
        writeln!(out, "labels      {}", label_names(board, &task.labels))?;
        writeln!(out, "assignees   {assignees}")?;
        if let Some(created) = task.created {
            writeln!(out, "created     {}", format_timestamp(created))?;
        }
        if let Some(modified) = task.modified {
            writeln!(out, "modified    {}", format_timestamp(modified))?;
        }
        if !task.description.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", task.description)?;
        }

        Ok(())
    }

    pub fn print_labels(&self, board: &Board) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let labels = board.store().labels();
        if labels.is_empty() {
            writeln!(out, "No labels.")?;
            return Ok(());
        }

        let rows = labels
            .values()
            .map(|label| {
                vec![
                    self.paint(&label.id.to_string(), "33"),
                    label.name.clone(),
                    label.color.clone(),
                ]
            })
            .collect();
        write_table(&mut out, &["ID", "Name", "Color"], rows)
    }

    pub fn print_config(&self, cfg: &Config) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for file in &cfg.loaded_files {
            writeln!(out, "# {}", file.display())?;
        }
        for (key, value) in cfg.entries() {
            writeln!(out, "{key}={value}")?;
        }
        Ok(())
    }

    fn write_task_table<W: Write>(
        &self,
        out: &mut W,
        board: &Board,
        tasks: &[&Task],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = ["ID", "Pri", "Due", "Title", "Project", "Labels"];
        let rows = tasks
            .iter()
            .map(|task| {
                let mut title = closed_title(&task.title, task.closed);
                let children = board.index().children_of(task.id).len();
                if children > 0 {
                    title.push_str(&format!(" [{children}]"));
                }
                if task.parent_task.is_some() {
                    title = format!("- {title}");
                }
                vec![
                    self.paint(&task.id.to_string(), "33"),
                    self.priority_cell(task.priority),
                    self.due_cell(task.due_date, today),
                    title,
                    board
                        .project_of(task)
                        .map(|p| p.title.clone())
                        .unwrap_or_default(),
                    label_names(board, &task.labels),
                ]
            })
            .collect();
        write_table(out, &headers, rows)
    }

    fn priority_cell(&self, priority: Priority) -> String {
        match priority {
            Priority::High => self.paint(priority.code(), "35"),
            _ => priority.code().to_string(),
        }
    }

    fn due_cell(&self, due: Option<NaiveDate>, today: NaiveDate) -> String {
        let Some(due) = due else {
            return String::new();
        };
        let text = format_wire_date(due);
        let days = days_until(due, today);
        if days < 0 {
            self.paint(&text, "31")
        } else if days < DUE_DATE_IGNORE_DAYS {
            self.paint(&text, "33")
        } else {
            text
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn closed_title(title: &str, closed: bool) -> String {
    if closed {
        format!("{title} (closed)")
    } else {
        title.to_string()
    }
}

fn label_names(board: &Board, labels: &BTreeSet<Id>) -> String {
    board
        .labels_of(labels)
        .iter()
        .map(|label| label.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(strip_ansi(cell).width());
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(header, &width)| format!("{header:width$}"))
        .collect();
    writeln!(writer, "{}", header_line.join(" ").trim_end())?;

    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    writeln!(writer, "{}", rule.join(" "))?;

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let padding = width.saturating_sub(strip_ansi(cell).width());
                format!("{cell}{}", " ".repeat(padding))
            })
            .collect();
        writeln!(writer, "{}", cells.join(" ").trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }
        if ch == '\x1b' {
            escaped = true;
            continue;
        }
        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoardSnapshot, Column, Label, Project};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn board() -> Board {
        let mut urgent = Task::new(1, "urgent", 10);
        urgent.due_date = NaiveDate::from_ymd_opt(2024, 2, 28);
        urgent.priority = Priority::High;
        urgent.labels.insert(5);
        let mut sub = Task::new(2, "sub", 10);
        sub.parent_task = Some(1);
        sub.project = Some(7);

        Board::from_snapshot(BoardSnapshot {
            id: 1,
            name: "main".to_string(),
            columns: vec![
                (Column::new(10, "Todo"), vec![urgent, sub]),
                (Column::new(11, "Done"), vec![]),
            ],
            projects: vec![Project::new(7, "launch")],
            labels: vec![Label {
                id: 5,
                name: "ops".to_string(),
                color: String::new(),
            }],
            members: vec![],
        })
    }

    fn render(board: &Board) -> String {
        let mut out = Vec::new();
        Renderer::plain().write_board(&mut out, board, today()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn board_lists_columns_and_tasks() {
        let text = render(&board());
        assert!(text.contains("Todo (2)"));
        assert!(text.contains("Done (0)"));
        assert!(text.contains("urgent [1]"));
        assert!(text.contains("- sub"));
        assert!(text.contains("launch"));
        assert!(text.contains("ops"));
        assert!(text.contains("2024-02-28"));
    }

    #[test]
    fn filtered_column_shows_visible_count() {
        let mut board = board();
        board.set_label_filter(BTreeSet::from([5]));
        let text = render(&board);
        assert!(text.contains("Todo (1/2)"));
        assert!(!text.contains("- sub"));
    }

    #[test]
    fn table_aligns_wide_characters() {
        let mut out = Vec::new();
        write_table(
            &mut out,
            &["ID", "Title"],
            vec![
                vec!["1".to_string(), "日本".to_string()],
                vec!["22".to_string(), "x".to_string()],
            ],
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID Title");
        assert_eq!(lines[2], "1  日本");
        assert_eq!(lines[3], "22 x");
    }

    #[test]
    fn ansi_codes_do_not_count_toward_width() {
        assert_eq!(strip_ansi("\x1b[31m2024-01-01\x1b[0m"), "2024-01-01");
        let renderer = Renderer { color: true };
        let cell = renderer.due_cell(NaiveDate::from_ymd_opt(2024, 2, 1), today());
        assert!(cell.starts_with("\x1b[31m"));
        assert_eq!(renderer.due_cell(None, today()), "");
    }
}
