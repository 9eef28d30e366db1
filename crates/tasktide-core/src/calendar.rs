//! Calendar projection of the filtered task list.
//!
//! Events are derived from the controller's current filter on every call; the
//! calendar keeps only its own navigation and selection state. Moving an event
//! goes through the store, and the event only moves once the store refreshes.

use std::sync::Arc;

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, TimeDelta};
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::controller::TaskListController;
use crate::datetime::{at_event_start, format_due_date};
use crate::error::{Error, Result};
use crate::store::Mutation;
use crate::task::{Priority, Status, Task, TaskId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CalendarView {
  #[default]
  Month,
  Week,
  Day
}

impl CalendarView {
  pub fn all() -> [Self; 3] {
    [Self::Month, Self::Week, Self::Day]
  }

  pub fn as_key(self) -> &'static str {
    match self {
      | Self::Month => "month",
      | Self::Week => "week",
      | Self::Day => "day"
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | Self::Month => "Month",
      | Self::Week => "Week",
      | Self::Day => "Day"
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
      | "month" | "m" => Some(Self::Month),
      | "week" | "w" => Some(Self::Week),
      | "day" | "d" => Some(Self::Day),
      | _ => None
    }
  }
}

/// Completed wins over priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStyle {
  Completed,
  High,
  Medium,
  Low
}

impl EventStyle {
  pub fn for_task(task: &Task) -> Self {
    if task.status == Status::Completed {
      return Self::Completed;
    }
    match task.priority {
      | Priority::High => Self::High,
      | Priority::Medium => Self::Medium,
      | Priority::Low => Self::Low
    }
  }

  pub fn as_class(self) -> &'static str {
    match self {
      | Self::Completed => "event-completed",
      | Self::High => "event-high",
      | Self::Medium => "event-medium",
      | Self::Low => "event-low"
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
  pub id:      TaskId,
  pub title:   String,
  pub start:   NaiveDateTime,
  pub end:     NaiveDateTime,
  pub all_day: bool,
  pub style:   EventStyle
}

impl CalendarEvent {
  pub fn from_task(
    task: &Task,
    view: CalendarView
  ) -> Self {
    let start = at_event_start(task.due_date);
    Self {
      id: task.id.clone(),
      title: task.title.clone(),
      start,
      end: start + TimeDelta::hours(1),
      all_day: view == CalendarView::Month,
      style: EventStyle::for_task(task)
    }
  }

  pub fn date(&self) -> NaiveDate {
    self.start.date()
  }
}

/// Read-only popup contents for a selected event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDetail {
  pub id:          TaskId,
  pub title:       String,
  pub description: String,
  pub due:         String,
  pub priority:    Priority,
  pub status:      Status
}

impl EventDetail {
  pub fn from_task(task: &Task) -> Self {
    Self {
      id:          task.id.clone(),
      title:       task.title.clone(),
      description: task.description.clone(),
      due:         format_due_date(
        task.due_date
      ),
      priority:    task.priority,
      status:      task.status
    }
  }
}

#[derive(Debug)]
struct CalendarState {
  view:     CalendarView,
  date:     NaiveDate,
  selected: Option<TaskId>
}

#[derive(Debug)]
pub struct CalendarProjection {
  controller: Arc<TaskListController>,
  state:      Mutex<CalendarState>
}

impl CalendarProjection {
  pub fn new(
    controller: Arc<TaskListController>,
    date: NaiveDate
  ) -> Self {
    Self {
      controller,
      state: Mutex::new(CalendarState {
        view: CalendarView::default(),
        date,
        selected: None
      })
    }
  }

  pub fn view(&self) -> CalendarView {
    self.state.lock().view
  }

  pub fn date(&self) -> NaiveDate {
    self.state.lock().date
  }

  /// Keeps the selected date.
  pub fn set_view(
    &self,
    view: CalendarView
  ) {
    debug!(
      view = view.as_key(),
      "calendar view changed"
    );
    self.state.lock().view = view;
  }

  pub fn set_date(
    &self,
    date: NaiveDate
  ) {
    self.state.lock().date = date;
  }

  pub fn next(&self) -> NaiveDate {
    self.step(true)
  }

  pub fn previous(&self) -> NaiveDate {
    self.step(false)
  }

  pub fn today(
    &self,
    today: NaiveDate
  ) -> NaiveDate {
    self.set_date(today);
    today
  }

  fn step(
    &self,
    forward: bool
  ) -> NaiveDate {
    let mut state = self.state.lock();
    let date = state.date;
    let moved = match (state.view, forward)
    {
      | (CalendarView::Month, true) => {
        date
          .checked_add_months(Months::new(1))
      }
      | (CalendarView::Month, false) => {
        date
          .checked_sub_months(Months::new(1))
      }
      | (CalendarView::Week, true) => {
        date.checked_add_days(Days::new(7))
      }
      | (CalendarView::Week, false) => {
        date.checked_sub_days(Days::new(7))
      }
      | (CalendarView::Day, true) => {
        date.succ_opt()
      }
      | (CalendarView::Day, false) => {
        date.pred_opt()
      }
    };
    state.date = moved.unwrap_or(date);
    state.date
  }

  /// Inclusive first and last day on
  /// screen. Weeks start on Sunday; the
  /// month grid spans whole weeks.
  pub fn visible_range(
    &self
  ) -> (NaiveDate, NaiveDate) {
    let state = self.state.lock();
    visible_range(state.view, state.date)
  }

  pub fn events(
    &self
  ) -> Vec<CalendarEvent> {
    let view = self.view();
    self
      .controller
      .filtered_tasks()
      .iter()
      .map(|task| {
        CalendarEvent::from_task(task, view)
      })
      .collect()
  }

  pub fn events_in_view(
    &self
  ) -> Vec<CalendarEvent> {
    let (first, last) =
      self.visible_range();
    self
      .events()
      .into_iter()
      .filter(|event| {
        (first..=last)
          .contains(&event.date())
      })
      .collect()
  }

  pub fn select_event(
    &self,
    id: &TaskId
  ) -> Result<EventDetail> {
    let task = self
      .controller
      .store()
      .find(id)
      .ok_or_else(|| {
        Error::TaskNotFound(id.clone())
      })?;
    self.state.lock().selected =
      Some(id.clone());
    Ok(EventDetail::from_task(&task))
  }

  /// `None` once the selected task is no
  /// longer in the collection.
  pub fn selected_detail(
    &self
  ) -> Option<EventDetail> {
    let id =
      self.state.lock().selected.clone()?;
    self
      .controller
      .store()
      .find(&id)
      .map(|task| {
        EventDetail::from_task(&task)
      })
  }

  pub fn close_detail(&self) {
    self.state.lock().selected = None;
  }

  /// Hands the selected task to the list
  /// controller's edit form and dismisses
  /// the popup.
  pub fn edit_selected(&self) -> Result<()> {
    let id = self
      .state
      .lock()
      .selected
      .clone()
      .ok_or(Error::NoSelection)?;
    self.controller.open_edit(&id)?;
    self.close_detail();
    Ok(())
  }

  /// Only the date part of `to` is kept.
  #[instrument(skip(self), fields(id = %id))]
  pub async fn reschedule(
    &self,
    id: &TaskId,
    to: NaiveDateTime
  ) -> Result<Mutation<Task>> {
    let due_date = to.date();
    info!(%due_date, "rescheduling task");
    self
      .controller
      .store()
      .set_due_date(id, due_date)
      .await
  }
}

pub fn visible_range(
  view: CalendarView,
  date: NaiveDate
) -> (NaiveDate, NaiveDate) {
  match view {
    | CalendarView::Day => (date, date),
    | CalendarView::Week => {
      let start = week_start(date);
      (start, start + TimeDelta::days(6))
    }
    | CalendarView::Month => {
      let first = date.with_day(1).unwrap_or(date);
      let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date);
      (
        week_start(first),
        week_start(last) + TimeDelta::days(6)
      )
    }
  }
}

fn week_start(
  date: NaiveDate
) -> NaiveDate {
  let back = i64::from(
    date.weekday().num_days_from_sunday()
  );
  date - TimeDelta::days(back)
}
