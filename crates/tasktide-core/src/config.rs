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
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::error::Error;

pub const RC_ENV_VAR: &str =
  "TASKTIDERC";
const RC_FILE_NAME: &str =
  ".tasktiderc";
const DEFAULT_DATA_DIR: &str =
  "~/.tasktide";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum BackendKind {
  Local,
  Remote
}

impl BackendKind {
  pub fn as_key(self) -> &'static str {
    match self {
      | Self::Local => "local",
      | Self::Remote => "remote"
    }
  }

  pub fn from_key(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "local" => Some(Self::Local),
      | "remote" => Some(Self::Remote),
      | _ => None
    }
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("backend", "local"),
      ("data.location", DEFAULT_DATA_DIR),
      (
        "remote.table",
        crate::gateway::remote::DEFAULT_TABLE
      ),
      ("remote.page_size", "100"),
      ("color", "on")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

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
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn set(
    &mut self,
    key: &str,
    value: impl Into<String>
  ) {
    self
      .map
      .insert(key.to_string(), value.into());
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn backend_kind(
    &self
  ) -> anyhow::Result<BackendKind> {
    let raw = self
      .get("backend")
      .unwrap_or_else(|| {
        "local".to_string()
      });
    BackendKind::from_key(&raw)
      .ok_or_else(|| {
        anyhow!(Error::Config(format!(
          "unknown backend '{raw}' \
           (expected local or remote)"
        )))
      })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = match raw_line
        .split_once('#')
      {
        | Some((before, _)) => before,
        | None => raw_line
      }
      .trim();

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(Error::Config(format!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )))
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Directory holding the local task
/// document, created if missing.
#[tracing::instrument(skip(cfg))]
pub fn resolve_data_dir(
  cfg: &Config
) -> anyhow::Result<PathBuf> {
  let raw = cfg
    .get("data.location")
    .unwrap_or_else(|| {
      DEFAULT_DATA_DIR.to_string()
    });
  let dir = expand_tilde(Path::new(&raw));

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

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      Error::Config(
        "include path cannot be empty"
          .to_string()
      )
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

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
