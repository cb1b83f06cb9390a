//! Checklist model

use serde::{Deserialize, Serialize};

/// Standalone checklist for a target age
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Target age in years
    pub for_age: i32,
    pub slug: String,
}

/// Input for creating a checklist
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateChecklistInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub for_age: i32,
    #[serde(default)]
    pub slug: String,
}

/// Input for updating a checklist, absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateChecklistInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub for_age: Option<i32>,
    pub slug: Option<String>,
}

impl UpdateChecklistInput {
    pub fn apply_to(self, checklist: &mut Checklist) {
        if let Some(title) = self.title {
            checklist.title = title;
        }
        if let Some(description) = self.description {
            checklist.description = description;
        }
        if let Some(for_age) = self.for_age {
            checklist.for_age = for_age;
        }
        if let Some(slug) = self.slug {
            checklist.slug = slug;
        }
    }
}
