use chrono::{DateTime, Utc};
use common::CategoryId;
use serde::{Deserialize, Serialize};

use crate::value_objects::Availability;

/// A catalog category.
///
/// Products point at their category by id; there is no product collection on
/// the category. Deactivating a category leaves its products untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// URL-friendly unique name, e.g. "mens-clothing".
    pub slug: String,
    pub description: Option<String>,
    pub availability: Availability,
    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Creates an active category.
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: CategoryId::new(),
            name: name.into(),
            slug: slug.into(),
            description: None,
            availability: Availability::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.availability.is_active()
    }
}
