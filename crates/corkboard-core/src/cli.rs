use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{anyhow, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::model::Id;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cork",
    version,
    about = "Corkboard: a kanban board in the terminal",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file", global = true)]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show every column with its tasks
    Board {
        /// Project id, or `none` for tasks without a project
        #[arg(long)]
        project: Option<String>,
        /// Only tasks carrying one of these labels (directly or via project)
        #[arg(long = "label")]
        labels: Vec<Id>,
    },
    /// List projects, most urgent first
    Projects {
        #[arg(long = "label")]
        labels: Vec<Id>,
    },
    /// Show one task in detail
    Show { id: Id },
    /// List the subtasks of a task
    Subtasks { id: Id },
    /// Create a task
    Add(AddTaskArgs),
    /// Change fields of a task
    Edit(EditTaskArgs),
    /// Delete a task
    Rm { id: Id },
    /// Move a task to a column
    Move {
        id: Id,
        column: Id,
        /// Drop position inside the column, 0 for the top
        #[arg(long)]
        position: Option<usize>,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectCommand,
    },
    /// List labels
    Labels,
    /// Manage labels
    Label {
        #[command(subcommand)]
        action: LabelCommand,
    },
    /// Print effective configuration
    Config,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Board { .. } => "board",
            Self::Projects { .. } => "projects",
            Self::Show { .. } => "show",
            Self::Subtasks { .. } => "subtasks",
            Self::Add(_) => "add",
            Self::Edit(_) => "edit",
            Self::Rm { .. } => "rm",
            Self::Move { .. } => "move",
            Self::Project { .. } => "project",
            Self::Labels => "labels",
            Self::Label { .. } => "label",
            Self::Config => "config",
        }
    }

    /// The command to run when none is given, from `default.command`.
    pub fn from_default(name: &str) -> anyhow::Result<Self> {
        match name.trim() {
            "board" => Ok(Self::Board {
                project: None,
                labels: Vec::new(),
            }),
            "projects" => Ok(Self::Projects { labels: Vec::new() }),
            "labels" => Ok(Self::Labels),
            "config" => Ok(Self::Config),
            other => bail!("default.command must be board, projects, labels or config, got: {other}"),
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AddTaskArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,
    /// Target column; the first column when omitted
    #[arg(long)]
    pub column: Option<Id>,
    #[arg(long)]
    pub description: Option<String>,
    /// low|medium|high (or L|M|H)
    #[arg(long)]
    pub priority: Option<String>,
    /// today, tomorrow, +3d, -1w, friday or YYYY-MM-DD
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long)]
    pub project: Option<Id>,
    #[arg(long)]
    pub parent: Option<Id>,
    #[arg(long = "label")]
    pub labels: Vec<Id>,
    #[arg(long = "assignee")]
    pub assignees: Vec<Id>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct EditTaskArgs {
    pub id: Id,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    /// Due date expression, or `none` to clear
    #[arg(long)]
    pub due: Option<String>,
    /// Project id, or `none` to clear
    #[arg(long)]
    pub project: Option<String>,
    /// Parent task id, or `none` to clear
    #[arg(long)]
    pub parent: Option<String>,
    /// Replaces the label set
    #[arg(long = "label")]
    pub labels: Option<Vec<Id>>,
    /// Replaces the assignee set
    #[arg(long = "assignee")]
    pub assignees: Option<Vec<Id>>,
    #[arg(long, conflicts_with = "reopen")]
    pub close: bool,
    #[arg(long)]
    pub reopen: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ProjectCommand {
    Add(AddProjectArgs),
    Edit(EditProjectArgs),
    Rm { id: Id },
    /// Move a project to a position in the project order
    Move { id: Id, position: usize },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AddProjectArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long = "label")]
    pub labels: Vec<Id>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct EditProjectArgs {
    pub id: Id,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long = "label")]
    pub labels: Option<Vec<Id>>,
    #[arg(long, conflicts_with = "reopen")]
    pub close: bool,
    #[arg(long)]
    pub reopen: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum LabelCommand {
    Add {
        name: String,
        #[arg(long, default_value = "")]
        color: String,
    },
    /// Delete a label and strip it from tasks and projects
    Rm { id: Id },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = match (quiet, verbose) {
        (q, _) if q >= 2 => "error",
        (1, _) => "warn",
        (_, v) if v >= 3 => "trace",
        (_, 2) => "debug",
        (_, 1) => "info",
        _ => "warn",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> PreprocessedArgs {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let parsed = arg.to_str().and_then(parse_positional_override);
        match parsed {
            Some((key, value)) => {
                debug!(key = %key, value = %value, "captured positional rc override");
                overrides.push((key, value));
            }
            None => cleaned.push(arg),
        }
    }

    PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    }
}

fn parse_positional_override(arg: &str) -> Option<(String, String)> {
    let rest = arg.strip_prefix("rc.")?;
    let (key, value) = rest.split_once('=').or_else(|| rest.split_once(':'))?;
    Some((format!("rc.{key}"), value.to_string()))
}

/// Parses `none` or an id for fields that can be cleared.
pub fn parse_nullable_id(raw: &str) -> anyhow::Result<Option<Id>> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") || trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| anyhow!("expected an id or 'none', got: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["cork", "rc.color=off", "board", "rc.board.id:2"]));
        assert_eq!(pre.cleaned_args, args(&["cork", "board"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.board.id".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn bare_rc_word_is_left_alone() {
        let pre = preprocess_args(&args(&["cork", "add", "rc.notes"]));
        assert_eq!(pre.cleaned_args.len(), 3);
        assert!(pre.rc_overrides.is_empty());
    }

    #[test]
    fn subcommands_parse() {
        let cli = GlobalCli::parse_from(["cork", "-vv", "move", "4", "2", "--position", "0"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command,
            Some(Command::Move {
                id: 4,
                column: 2,
                position: Some(0),
            })
        );

        let cli = GlobalCli::parse_from(["cork", "board", "--project", "none", "--label", "3"]);
        assert_eq!(
            cli.command,
            Some(Command::Board {
                project: Some("none".to_string()),
                labels: vec![3],
            })
        );
    }

    #[test]
    fn add_joins_title_words() {
        let cli = GlobalCli::parse_from(["cork", "add", "write", "docs", "--due", "+2d"]);
        let Some(Command::Add(add)) = cli.command else {
            panic!("expected add");
        };
        assert_eq!(add.title.join(" "), "write docs");
        assert_eq!(add.due.as_deref(), Some("+2d"));
    }

    #[test]
    fn rc_flag_parses_key_value() {
        let cli = GlobalCli::parse_from(["cork", "--rc", "color=off", "labels"]);
        assert_eq!(cli.rc_overrides[0].key, "color");
        assert_eq!(cli.rc_overrides[0].value, "off");
        assert!("nokey".parse::<KeyVal>().is_err());
    }

    #[test]
    fn default_command_is_resolved() {
        assert_eq!(Command::from_default("labels").unwrap(), Command::Labels);
        assert!(Command::from_default("rm").is_err());
    }

    #[test]
    fn nullable_ids() {
        assert_eq!(parse_nullable_id("none").unwrap(), None);
        assert_eq!(parse_nullable_id(" 7 ").unwrap(), Some(7));
        assert!(parse_nullable_id("seven").is_err());
    }
}
