use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::resolve_board_timezone;
use crate::model::Id;
use crate::snapshot::DEFAULT_BOARD_ID;

pub const RC_ENV_VAR: &str =
  "CORKBOARDRC";
const RC_FILE_NAME: &str =
  ".corkboardrc";
const DEFAULT_DATA_DIR: &str =
  "~/.corkboard";

const DEFAULTS: &[(&str, &str)] = &[
  ("data.location", DEFAULT_DATA_DIR),
  ("board.file", "board.json"),
  ("color", "on"),
  ("default.command", "board")
];

/// Settings from the rc file chain plus
/// command-line overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Setting(&'a str, &'a str)
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: Vec::new()
    }
  }
}

impl Config {
  /// Defaults, then the first rc file
  /// found: `rc_override`, then
  /// `$CORKBOARDRC`, then
  /// `~/.corkboardrc`.
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::default();

    match resolve_rc_path(rc_override)? {
      | Some(path) => {
        info!(rc = %path.display(), "loading rc file");
        cfg.load_file(&path)?;
      }
      | None => {
        debug!(
          "no rc file found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Applies `key=value` overrides; a
  /// leading `rc.` on the key is ignored.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .map(str::to_string)
        .unwrap_or(key);
      debug!(key = %key, value = %value, "config override");
      self.map.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<&str> {
    self.map.get(key).map(String::as_str)
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self.get(key).map(parse_bool)
  }

  /// Every setting, sorted by key.
  pub fn entries(
    &self
  ) -> Vec<(&str, &str)> {
    let mut entries: Vec<_> = self
      .map
      .iter()
      .map(|(k, v)| {
        (k.as_str(), v.as_str())
      })
      .collect();
    entries.sort_unstable();
    entries
  }

  pub fn board_id(
    &self
  ) -> anyhow::Result<Id> {
    match self.get("board.id") {
      | None => Ok(DEFAULT_BOARD_ID),
      | Some(raw) => {
        raw.trim().parse().with_context(
          || {
            format!(
              "invalid board.id: \
               {raw}"
            )
          }
        )
      }
    }
  }

  pub fn board_timezone(&self) -> Tz {
    resolve_board_timezone(
      self.get("board.timezone")
    )
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    self.loaded_files.push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line_no = idx + 1;
      match parse_line(raw_line) {
        | Some(RcLine::Blank) => {}
        | Some(RcLine::Include(rest)) => {
          let include =
            resolve_include_path(
              &base_dir, rest
            )?;
          if include.exists() {
            debug!(
              file = %path.display(),
              include = %include.display(),
              line = line_no,
              "following include"
            );
            self.load_file(&include)?;
          } else {
            warn!(include = %include.display(), "include file does not exist; skipping");
          }
        }
        | Some(RcLine::Setting(
          key,
          value
        )) => {
          trace!(key, value, "rc setting");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
        | None => {
          return Err(anyhow!(
            "invalid config line {}:{}: \
             {}",
            path.display(),
            line_no,
            raw_line
          ));
        }
      }
    }

    Ok(())
  }
}

fn parse_line(
  raw: &str
) -> Option<RcLine<'_>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();

  if line.is_empty() {
    return Some(RcLine::Blank);
  }
  if let Some(rest) =
    line.strip_prefix("include ")
  {
    return Some(RcLine::Include(
      rest.trim()
    ));
  }

  let (key, value) =
    line.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  Some(RcLine::Setting(key, value.trim()))
}

/// The data directory, created if
/// missing. `override_dir` wins over
/// `data.location`.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => expand_tilde(Path::new(
      cfg
        .get("data.location")
        .unwrap_or(DEFAULT_DATA_DIR)
    ))
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

/// Path of the board snapshot file;
/// relative `board.file` values live in
/// the data directory.
pub fn board_file(
  cfg: &Config,
  data_dir: &Path
) -> PathBuf {
  let file = expand_tilde(Path::new(
    cfg
      .get("board.file")
      .unwrap_or("board.json")
  ));
  if file.is_absolute() {
    file
  } else {
    data_dir.join(file)
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(from_env) =
    std::env::var(RC_ENV_VAR)
  {
    if from_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      from_env
    )));
  }

  let home =
    dirs::home_dir().ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate = home.join(RC_FILE_NAME);
  Ok(candidate.exists().then_some(candidate))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

pub fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

pub fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write(
    dir: &Path,
    name: &str,
    body: &str
  ) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
  }

  #[test]
  fn defaults_without_rc_file() {
    let cfg = Config::default();
    assert_eq!(
      cfg.get("default.command"),
      Some("board")
    );
    assert_eq!(
      cfg.get("board.file"),
      Some("board.json")
    );
    assert_eq!(cfg.get_bool("color"), Some(true));
    assert_eq!(
      cfg.board_id().unwrap(),
      DEFAULT_BOARD_ID
    );
  }

  #[test]
  fn rc_file_with_include_and_comments() {
    let dir = tempfile::tempdir().unwrap();
    write(
      dir.path(),
      "colors.rc",
      "color = off # plain output\n"
    );
    let rc = write(
      dir.path(),
      "main.rc",
      "# corkboard\n\nboard.id=4\ninclude colors.rc\ninclude missing.rc\n"
    );

    let cfg = Config::load(Some(rc.as_path())).unwrap();
    assert_eq!(cfg.board_id().unwrap(), 4);
    assert_eq!(cfg.get_bool("color"), Some(false));
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn malformed_line_names_file_and_line() {
    let dir = tempfile::tempdir().unwrap();
    let rc = write(
      dir.path(),
      "bad.rc",
      "color=on\njust words\n"
    );

    let err = Config::load(Some(rc.as_path()))
      .unwrap_err()
      .to_string();
    assert!(err.contains("bad.rc:2"));
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.board.id".to_string(),
        "9".to_string()
      ),
      (
        "color".to_string(),
        "no".to_string()
      )
    ]);
    assert_eq!(cfg.board_id().unwrap(), 9);
    assert_eq!(cfg.get_bool("color"), Some(false));
    assert!(cfg.get("rc.board.id").is_none());
  }

  #[test]
  fn bad_board_id_is_an_error() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "board.id".to_string(),
      "main".to_string()
    )]);
    assert!(cfg.board_id().is_err());
  }

  #[test]
  fn board_file_resolves_against_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    assert_eq!(
      board_file(&cfg, dir.path()),
      dir.path().join("board.json")
    );

    let absolute = dir.path().join("elsewhere.json");
    cfg.apply_overrides([(
      "board.file".to_string(),
      absolute.display().to_string()
    )]);
    assert_eq!(board_file(&cfg, dir.path()), absolute);
  }

  #[test]
  fn data_dir_override_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("data");
    let resolved = resolve_data_dir(
      &Config::default(),
      Some(target.as_path())
    )
    .unwrap();
    assert_eq!(resolved, target);
    assert!(target.is_dir());
  }

  #[test]
  fn entries_are_sorted() {
    let cfg = Config::default();
    let keys: Vec<&str> = cfg
      .entries()
      .into_iter()
      .map(|(k, _)| k)
      .collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);
  }
}
