use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarEvent, CalendarView, EventStyle};
use crate::config::Config;
use crate::controller::TaskRow;
use crate::datetime::to_local_datetime;
use crate::stats::TaskStats;
use crate::task::{Status, Task};

const RED: &str = "31";
const YELLOW: &str = "33";
const DIM: &str = "2";
const BOLD: &str = "1";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, rows))]
    pub fn print_task_table(&self, rows: &[TaskRow]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if rows.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = ["ID", "Due", "Priority", "Status", "Title"]
            .map(str::to_string)
            .to_vec();
        let table: Vec<Vec<String>> = rows.iter().map(|row| self.task_cells(row)).collect();

        write_table(&mut out, headers, table)?;
        Ok(())
    }

    fn task_cells(&self, row: &TaskRow) -> Vec<String> {
        let task = &row.task;
        let mut due = task.formatted_due_date();
        if row.overdue {
            due = self.paint(&format!("{due} (overdue)"), RED);
        }
        let mut status = status_label(task.status).to_string();
        if row.busy {
            status.push_str(" ...");
        }

        let cells = vec![
            self.paint(task.id.as_str(), YELLOW),
            due,
            task.priority.label().to_string(),
            status,
            task.title.clone(),
        ];
        if task.is_completed() {
            cells.into_iter().map(|cell| self.paint(&cell, DIM)).collect()
        } else {
            cells
        }
    }

    #[tracing::instrument(skip(self, task, now))]
    pub fn print_task_detail(&self, task: &Task, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", self.paint(&task.title, BOLD))?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        let due = task.formatted_due_date();
        if task.is_overdue(now) {
            writeln!(out, "due         {}", self.paint(&format!("{due} (overdue)"), RED))?;
        } else {
            writeln!(out, "due         {due}")?;
        }
        writeln!(out, "priority    {}", task.priority.label())?;
        writeln!(out, "status      {}", status_label(task.status))?;
        writeln!(out, "created     {}", to_local_datetime(task.created_at).format("%Y-%m-%d %H:%M"))?;
        writeln!(out, "modified    {}", to_local_datetime(task.updated_at).format("%Y-%m-%d %H:%M"))?;

        Ok(())
    }

    /// Events grouped by day, in the order the days appear on screen.
    #[tracing::instrument(skip(self, events))]
    pub fn print_calendar(
        &self,
        view: CalendarView,
        range: (NaiveDate, NaiveDate),
        events: &[CalendarEvent],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let (first, last) = range;
        writeln!(
            out,
            "{} view: {} to {}",
            view.label(),
            first.format("%a %b %-d, %Y"),
            last.format("%a %b %-d, %Y")
        )?;

        let mut by_day: BTreeMap<NaiveDate, Vec<&CalendarEvent>> = BTreeMap::new();
        for event in events {
            by_day.entry(event.date()).or_default().push(event);
        }

        if by_day.is_empty() {
            writeln!(out, "  no tasks due")?;
            return Ok(());
        }

        for (day, day_events) in by_day {
            writeln!(out)?;
            writeln!(out, "{}", self.paint(&day.format("%a %b %-d").to_string(), BOLD))?;
            for event in day_events {
                let when = if event.all_day {
                    "all day".to_string()
                } else {
                    format!("{}-{}", event.start.format("%H:%M"), event.end.format("%H:%M"))
                };
                let line = format!("  {when:<11} {} [{}]", event.title, event.id);
                writeln!(out, "{}", self.paint(&line, style_code(event.style)))?;
            }
        }

        Ok(())
    }

    pub fn print_stats(&self, stats: &TaskStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "completed  {}", stats.completed)?;
        writeln!(out, "pending    {}", stats.pending)?;
        let overdue = stats.overdue.to_string();
        if stats.overdue > 0 {
            writeln!(out, "overdue    {}", self.paint(&overdue, RED))?;
        } else {
            writeln!(out, "overdue    {overdue}")?;
        }
        Ok(())
    }

    pub fn notice(&self, message: &str) -> anyhow::Result<()> {
        writeln!(io::stdout().lock(), "{message}")?;
        Ok(())
    }

    pub fn warning(&self, message: &str) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        if self.color && io::stderr().is_terminal() {
            writeln!(err, "\x1b[{YELLOW}m{message}\x1b[0m")?;
        } else {
            writeln!(err, "{message}")?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Pending => "Pending",
        Status::Completed => "Completed",
    }
}

fn style_code(style: EventStyle) -> &'static str {
    match style {
        EventStyle::Completed => DIM,
        EventStyle::High => RED,
        EventStyle::Medium => YELLOW,
        EventStyle::Low => "36",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ", width = *width)?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
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
