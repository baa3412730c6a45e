//! Changes and tasks: the lazily simulated asynchronous operations.
//!
//! A change advances by exactly one step each time it is polled. Nothing runs
//! on a timer, so the Nth poll of a change always observes the Nth step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Snap;

/// Message stored on a task cancelled through the `abort` action.
pub const CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    Do,
    Doing,
    Done,
    Error,
}

/// Store mutation performed when a task finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEffect {
    /// No store mutation.
    None,
    /// Append the staged snap to the installed list.
    Install(Box<Snap>),
    /// Delete the named snap. Keyed by name since the snap object is gone
    /// once the task completes.
    Remove(String),
    /// Move an installed snap to a new revision.
    Refresh {
        snap: String,
        revision: String,
        version: String,
    },
    /// Touches the named snap without mutating it.
    Mention(String),
}

impl TaskEffect {
    /// Name of the snap this effect concerns, if any.
    pub fn snap_name(&self) -> Option<&str> {
        match self {
            TaskEffect::None => None,
            TaskEffect::Install(snap) => Some(&snap.name),
            TaskEffect::Remove(name) | TaskEffect::Mention(name) => Some(name),
            TaskEffect::Refresh { snap, .. } => Some(snap),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: u64,
    pub kind: String,
    pub summary: String,
    pub status: TaskStatus,
    pub done: u32,
    pub total: u32,
    /// Pre-set error: the task fails as soon as it becomes current.
    pub error: Option<String>,
    pub effect: TaskEffect,
    pub spawn_time: DateTime<Utc>,
    pub ready_time: Option<DateTime<Utc>>,
}

/// Blueprint for a task, turned into a [`Task`] when its change is spawned.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub kind: String,
    pub summary: String,
    pub total: Option<u32>,
    pub error: Option<String>,
    pub effect: TaskEffect,
}

impl TaskSpec {
    pub fn new(kind: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            summary: summary.into(),
            total: None,
            error: None,
            effect: TaskEffect::None,
        }
    }

    pub fn effect(mut self, effect: TaskEffect) -> Self {
        self.effect = effect;
        self
    }

    /// Number of polls the task needs. Defaults to the store's setting.
    pub fn total(mut self, total: u32) -> Self {
        self.total = Some(total);
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub id: u64,
    pub kind: String,
    pub summary: String,
    pub spawn_time: DateTime<Utc>,
    pub ready_time: Option<DateTime<Utc>>,
    pub tasks: Vec<Task>,
    pub data: Option<Value>,
}

impl Change {
    /// Ready once every task is done, or once a task has failed.
    pub fn is_ready(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Done) || self.failed_task().is_some()
    }

    pub fn failed_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Error)
    }

    /// Aggregate status derived from the tasks.
    pub fn status(&self) -> TaskStatus {
        if self.failed_task().is_some() {
            TaskStatus::Error
        } else if self.tasks.iter().all(|t| t.status == TaskStatus::Done) {
            TaskStatus::Done
        } else if self.tasks.iter().all(|t| t.status == TaskStatus::Do) {
            TaskStatus::Do
        } else {
            TaskStatus::Doing
        }
    }

    pub fn err(&self) -> Option<String> {
        self.failed_task().map(|t| {
            let message = t.error.as_deref().unwrap_or("unknown error");
            format!("cannot perform the following tasks:\n- {} ({message})", t.summary)
        })
    }

    /// True if any task names `snap` as install payload, remove target or
    /// other reference.
    pub fn relates_to(&self, snap: &str) -> bool {
        self.tasks.iter().any(|t| t.effect.snap_name() == Some(snap))
    }

    fn current_index(&self) -> Option<usize> {
        if self.failed_task().is_some() {
            return None;
        }
        self.tasks.iter().position(|t| t.status != TaskStatus::Done)
    }

    /// Advances the change by one step. Returns the completion effect of a
    /// task that finished during this step, for the caller to apply.
    pub fn step(&mut self, now: DateTime<Utc>) -> Option<TaskEffect> {
        let index = self.current_index()?;
        let task = &mut self.tasks[index];
        let mut finished = None;

        if task.error.is_some() {
            task.status = TaskStatus::Error;
            task.ready_time = Some(now);
        } else {
            if task.done < task.total {
                task.status = TaskStatus::Doing;
                task.done += 1;
            }
            if task.done >= task.total {
                task.status = TaskStatus::Done;
                task.ready_time = Some(now);
                finished = Some(task.effect.clone());
            }
        }

        if self.is_ready() && self.ready_time.is_none() {
            self.ready_time = Some(now);
        }
        finished
    }

    /// Fails the current task with [`CANCELLED`]. Returns false when nothing
    /// is pending.
    pub fn abort(&mut self, now: DateTime<Utc>) -> bool {
        let Some(index) = self.current_index() else {
            return false;
        };
        let task = &mut self.tasks[index];
        task.status = TaskStatus::Error;
        task.error = Some(CANCELLED.to_string());
        task.ready_time = Some(now);
        self.ready_time = Some(now);
        true
    }
}

/// Readiness filter for change listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeFilter {
    All,
    #[default]
    InProgress,
    Ready,
}

impl ChangeFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "in-progress" => Some(Self::InProgress),
            "ready" => Some(Self::Ready),
            _ => None,
        }
    }

    pub fn matches(&self, change: &Change) -> bool {
        match self {
            ChangeFilter::All => true,
            ChangeFilter::InProgress => !change.is_ready(),
            ChangeFilter::Ready => change.is_ready(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64, total: u32, error: Option<&str>) -> Task {
        Task {
            id,
            kind: "download".into(),
            summary: format!("task {id}"),
            status: TaskStatus::Do,
            done: 0,
            total,
            error: error.map(str::to_string),
            effect: TaskEffect::Mention("foo".into()),
            spawn_time: Utc::now(),
            ready_time: None,
        }
    }

    fn change(tasks: Vec<Task>) -> Change {
        Change {
            id: 1,
            kind: "test".into(),
            summary: "test".into(),
            spawn_time: Utc::now(),
            ready_time: None,
            tasks,
            data: None,
        }
    }

    #[test]
    fn tasks_progress_in_order() {
        let mut c = change(vec![task(1, 2, None), task(2, 1, None)]);
        assert_eq!(c.status(), TaskStatus::Do);

        assert!(c.step(Utc::now()).is_none());
        assert_eq!(c.tasks[0].status, TaskStatus::Doing);
        assert_eq!(c.tasks[1].status, TaskStatus::Do);

        assert!(c.step(Utc::now()).is_some());
        assert_eq!(c.tasks[0].status, TaskStatus::Done);
        assert_eq!(c.tasks[1].status, TaskStatus::Do);
        assert!(!c.is_ready());
        assert_eq!(c.status(), TaskStatus::Doing);

        assert!(c.step(Utc::now()).is_some());
        assert!(c.is_ready());
        assert_eq!(c.status(), TaskStatus::Done);
        assert!(c.ready_time.is_some());

        let before = c.clone();
        assert!(c.step(Utc::now()).is_none());
        assert_eq!(c, before);
    }

    #[test]
    fn preset_error_fails_when_current() {
        let mut c = change(vec![task(1, 1, None), task(2, 3, Some("boom"))]);
        c.step(Utc::now());
        assert!(!c.is_ready());
        c.step(Utc::now());
        assert!(c.is_ready());
        assert_eq!(c.status(), TaskStatus::Error);
        assert_eq!(c.tasks[1].done, 0);
        assert!(c.err().unwrap().contains("boom"));
    }

    #[test]
    fn abort_cancels_current_task() {
        let mut c = change(vec![task(1, 2, None)]);
        c.step(Utc::now());
        assert!(c.abort(Utc::now()));
        assert_eq!(c.tasks[0].status, TaskStatus::Error);
        assert_eq!(c.tasks[0].error.as_deref(), Some(CANCELLED));
        assert!(!c.abort(Utc::now()));
    }

    #[test]
    fn empty_change_is_ready() {
        let c = change(vec![]);
        assert!(c.is_ready());
        assert_eq!(c.status(), TaskStatus::Done);
    }

    #[test]
    fn filter_parse() {
        assert_eq!(ChangeFilter::parse("ready"), Some(ChangeFilter::Ready));
        assert_eq!(ChangeFilter::parse("bogus"), None);
        assert_eq!(ChangeFilter::default(), ChangeFilter::InProgress);
    }
}
