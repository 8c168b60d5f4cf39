//! Catalogue Entities
//!
//! Request-scoped copies of the rows owned by the store. The same types are
//! used for the write body (ids and timestamps absent) and for read responses
//! (everything populated).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalogued book and its weighted categories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Store-assigned identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub title: String,

    pub author: String,

    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Associations, ordered by category name on reads
    #[serde(default)]
    pub categories: Vec<BookCategory>,
}

impl Book {
    /// Create a book with no associations
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            author: author.into(),
            content: content.into(),
            created_at: None,
            updated_at: None,
            categories: Vec::new(),
        }
    }

    /// Attach a category by name with the given weight
    #[must_use]
    pub fn with_category(mut self, name: impl Into<String>, weight: f64) -> Self {
        self.categories.push(BookCategory::new(name, weight));
        self
    }

    /// Distinct category names, sorted
    ///
    /// Concurrent writers upsert category rows in this order.
    pub fn distinct_category_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .categories
            .iter()
            .map(|c| c.category.name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Weighted link between a book and a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookCategory {
    /// Identifier of the linked category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub category: Category,

    pub weight: f64,
}

impl BookCategory {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            id: None,
            category: Category::named(name),
            weight,
        }
    }
}

/// A globally shared category, unique by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Category {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            created_at: None,
        }
    }
}
