use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::core::{Entity, EntityMeta, Result, StoreError};

/// A project record. `nickname` and `external_code` are optional
/// case-insensitive unique keys; blank values are normalized away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub external_code: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub archived: bool,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            name: name.into(),
            nickname: None,
            external_code: None,
            notes: String::new(),
            archived: false,
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn with_external_code(mut self, code: impl Into<String>) -> Self {
        self.external_code = Some(code.into());
        self
    }
}

fn normalize_key(value: &mut Option<String>) {
    if let Some(v) = value {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            *value = None;
        } else if trimmed.len() != v.len() {
            *value = Some(trimmed.to_string());
        }
    }
}

impl Entity for Project {
    fn kind() -> &'static str {
        "project"
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        normalize_key(&mut self.nickname);
        normalize_key(&mut self.external_code);
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(StoreError::Validation("project name must not be blank".into()));
        }
        Ok(())
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        let mut keys = Vec::new();
        if let Some(nickname) = &self.nickname {
            keys.push(("nickname", nickname.clone()));
        }
        if let Some(code) = &self.external_code {
            keys.push(("code", code.clone()));
        }
        keys
    }

    fn display_cmp(&self, other: &Self) -> Ordering {
        self.name
            .to_lowercase()
            .cmp(&other.name.to_lowercase())
            .then_with(|| other.meta.updated_at.cmp(&self.meta.updated_at))
            .then_with(|| self.meta.id.cmp(&other.meta.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_keys_are_normalized_to_none() {
        let mut project = Project::new("Billing").with_nickname("   ");
        project.normalize();
        assert_eq!(project.nickname, None);
        assert!(project.unique_keys().is_empty());
    }

    #[test]
    fn test_keys_are_trimmed() {
        let mut project = Project::new("Billing")
            .with_nickname("  ACME ")
            .with_external_code("X-100");
        project.normalize();
        assert_eq!(project.nickname.as_deref(), Some("ACME"));
        assert_eq!(
            project.unique_keys(),
            vec![("nickname", "ACME".to_string()), ("code", "X-100".to_string())]
        );
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut project = Project::new("  ");
        project.normalize();
        assert!(project.validate().is_err());
    }

    #[test]
    fn test_display_order_is_case_insensitive_by_name() {
        let a = Project::new("alpha");
        let b = Project::new("Beta");
        assert_eq!(a.display_cmp(&b), Ordering::Less);
    }
}
