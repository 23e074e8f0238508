use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::core::{Entity, EntityMeta, Result, StoreError, week_bucket};

pub const MAX_DAY_HOURS: f64 = 24.0;

/// One row of the weekly timesheet: hours per day for a
/// (week-ending date, project code, activity code) combination. The
/// combination is unique among non-deleted entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekEntry {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub week_ending: NaiveDate,
    pub project_code: String,
    pub activity_code: String,
    /// Monday through Sunday.
    #[serde(default)]
    pub hours: [f64; 7],
    #[serde(default)]
    pub notes: String,
}

impl WeekEntry {
    pub fn new(
        week_ending: NaiveDate,
        project_code: impl Into<String>,
        activity_code: impl Into<String>,
    ) -> Self {
        Self {
            meta: EntityMeta::new(),
            week_ending,
            project_code: project_code.into(),
            activity_code: activity_code.into(),
            hours: [0.0; 7],
            notes: String::new(),
        }
    }

    pub fn with_hours(mut self, hours: [f64; 7]) -> Self {
        self.hours = hours;
        self
    }

    pub fn total_hours(&self) -> f64 {
        self.hours.iter().sum()
    }
}

impl Entity for WeekEntry {
    fn kind() -> &'static str {
        "week_entry"
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn normalize(&mut self) {
        self.project_code = self.project_code.trim().to_string();
        self.activity_code = self.activity_code.trim().to_string();
    }

    fn validate(&self) -> Result<()> {
        if self.project_code.is_empty() {
            return Err(StoreError::Validation("project code must not be blank".into()));
        }
        if self.activity_code.is_empty() {
            return Err(StoreError::Validation("activity code must not be blank".into()));
        }
        for (day, &hours) in self.hours.iter().enumerate() {
            if !hours.is_finite() || !(0.0..=MAX_DAY_HOURS).contains(&hours) {
                return Err(StoreError::Validation(format!(
                    "hours for day {} must be between 0 and {}, got {}",
                    day, MAX_DAY_HOURS, hours
                )));
            }
        }
        Ok(())
    }

    fn bucket_key(&self) -> Option<String> {
        Some(week_bucket(self.week_ending))
    }

    fn combo_key(&self) -> Option<String> {
        Some(format!(
            "{}/{}/{}",
            self.week_ending,
            self.project_code.to_lowercase(),
            self.activity_code.to_lowercase()
        ))
    }

    fn display_cmp(&self, other: &Self) -> Ordering {
        self.week_ending
            .cmp(&other.week_ending)
            .then_with(|| {
                self.project_code
                    .to_lowercase()
                    .cmp(&other.project_code.to_lowercase())
            })
            .then_with(|| {
                self.activity_code
                    .to_lowercase()
                    .cmp(&other.activity_code.to_lowercase())
            })
            .then_with(|| self.meta.id.cmp(&other.meta.id))
    }
}
