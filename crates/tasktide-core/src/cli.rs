use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::calendar::CalendarView;
use crate::controller::StatusFilter;
use crate::task::Priority;

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
    name = "tasktide",
    version,
    about = "Tasks with due dates, priorities, and a calendar",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Override one configuration key, e.g. `--rc backend=remote`.
    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the local task document.
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List tasks ordered by due date.
    List {
        #[arg(long, default_value = "all", value_parser = parse_status_filter)]
        status: StatusFilter,
    },
    /// Show one task as the backend currently has it.
    Show { id: String },
    Add {
        title: String,
        #[arg(long, short = 'd', default_value = "")]
        description: String,
        #[arg(long, short = 'p', default_value = "medium", value_parser = parse_priority)]
        priority: Priority,
        /// Defaults to tomorrow.
        #[arg(long)]
        due: Option<String>,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, short = 'd')]
        description: Option<String>,
        #[arg(long, short = 'p', value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Flip a task between pending and completed.
    Toggle { id: String },
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    Calendar {
        #[arg(long, default_value = "month", value_parser = parse_calendar_view)]
        view: CalendarView,
        #[arg(long)]
        date: Option<String>,
    },
    /// Move a task to another due date.
    Reschedule { id: String, date: String },
    Stats,
}

impl Default for Command {
    fn default() -> Self {
        Self::List {
            status: StatusFilter::All,
        }
    }
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    Priority::from_key(raw).ok_or_else(|| format!("unknown priority '{raw}' (low, medium, high)"))
}

fn parse_status_filter(raw: &str) -> Result<StatusFilter, String> {
    StatusFilter::from_key(raw)
        .ok_or_else(|| format!("unknown status '{raw}' (all, pending, completed)"))
}

fn parse_calendar_view(raw: &str) -> Result<CalendarView, String> {
    CalendarView::from_key(raw).ok_or_else(|| format!("unknown view '{raw}' (month, week, day)"))
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "off"
    } else if quiet == 1 {
        "error"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
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

/// Pulls positional `rc.key=value` and `rc.key:value` arguments out before
/// clap sees them.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> PreprocessedArgs {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((format!("rc.{k}"), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    }
}
