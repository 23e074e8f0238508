use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::core::{Entity, EntityId, EntityMeta, Result, StoreError};

pub const MAX_TAGS: usize = 16;
pub const MAX_TAG_LEN: usize = 32;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Done,
    Dropped,
}

/// A to-do item. Tasks form a hierarchy through `parent`; deleting a parent
/// cascades to every descendant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub parent: Option<EntityId>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            title: title.into(),
            notes: String::new(),
            status: TaskStatus::Open,
            completed_at: None,
            priority: 0,
            sort_order: 0,
            due: None,
            parent: None,
            tags: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_sort_order(mut self, sort_order: i64) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Mark the task done, stamping `completed_at`.
    pub fn complete(&mut self) {
        self.status = TaskStatus::Done;
        self.completed_at = Some(Utc::now());
    }

    /// Reopen a previously completed or dropped task.
    pub fn reopen(&mut self) {
        self.status = TaskStatus::Open;
        self.completed_at = None;
    }
}

impl Entity for Task {
    fn kind() -> &'static str {
        "task"
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        for tag in &mut self.tags {
            *tag = tag.trim().to_string();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.title.is_empty() {
            return Err(StoreError::Validation("task title must not be blank".into()));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(StoreError::Validation(format!(
                "at most {} tags allowed, got {}",
                MAX_TAGS,
                self.tags.len()
            )));
        }
        for tag in &self.tags {
            if tag.is_empty() || tag.len() > MAX_TAG_LEN {
                return Err(StoreError::Validation(format!(
                    "tag '{}' must be 1..={} characters",
                    tag, MAX_TAG_LEN
                )));
            }
            if !TAG_RE.is_match(tag) {
                return Err(StoreError::Validation(format!(
                    "tag '{}' may only contain letters, digits, '_' and '-'",
                    tag
                )));
            }
        }
        if self.completed_at.is_some() && self.status != TaskStatus::Done {
            return Err(StoreError::Validation(
                "completed_at may only be set on a task whose status is done".into(),
            ));
        }
        Ok(())
    }

    fn parent_id(&self) -> Option<EntityId> {
        self.parent
    }

    fn display_cmp(&self, other: &Self) -> Ordering {
        self.sort_order
            .cmp(&other.sort_order)
            .then_with(|| other.meta.updated_at.cmp(&self.meta.updated_at))
            .then_with(|| self.meta.id.cmp(&other.meta.id))
    }
}
