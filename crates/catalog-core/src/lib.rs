//! Core domain model for the catalog importer: products, import rows and job states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trim surrounding whitespace and lowercase. Applying it twice is a no-op.
pub fn normalize_sku(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Persisted product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload. The SKU is normalized on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub active: bool,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, sku: &str, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            sku: normalize_sku(sku),
            description,
            active: true,
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl ProductPatch {
    pub fn normalized_sku(&self) -> Option<String> {
        self.sku.as_deref().map(normalize_sku)
    }

    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(sku) = self.normalized_sku() {
            product.sku = sku;
        }
        if let Some(description) = &self.description {
            product.description = Some(description.clone());
        }
        if let Some(active) = self.active {
            product.active = active;
        }
    }
}

/// Filter + page request for product listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    pub page: u32,
    pub per_page: u32,
    pub search: Option<String>,
    pub active: Option<bool>,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            search: None,
            active: None,
        }
    }
}

impl ProductQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.per_page)
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl ProductPage {
    pub fn new(products: Vec<Product>, total: u64, query: &ProductQuery) -> Self {
        let per_page = u64::from(query.per_page.max(1));
        Self {
            products,
            total,
            page: query.page.max(1),
            per_page: query.per_page,
            total_pages: total.div_ceil(per_page),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStats {
    pub total_products: u64,
    pub active_products: u64,
    pub inactive_products: u64,
}

/// One parsed CSV row, SKU already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub name: String,
    pub sku: String,
    pub description: String,
}

impl ImportRow {
    pub fn new(name: impl Into<String>, sku: &str, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sku: normalize_sku(sku),
            description: description.into(),
        }
    }

    pub fn into_new_product(self) -> NewProduct {
        NewProduct {
            name: self.name,
            sku: self.sku,
            description: Some(self.description),
            active: true,
        }
    }
}

/// Final counts of a successful import.
///
/// `imported + duplicates_in_file + already_present == parsed` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub parsed: usize,
    pub unique: usize,
    pub imported: usize,
    pub duplicates_in_file: usize,
    pub already_present: usize,
}

impl ImportSummary {
    pub fn skipped(&self) -> usize {
        self.duplicates_in_file + self.already_present
    }
}

/// Observable state of one import job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued {
        status: String,
    },
    Running {
        progress: u8,
        status: String,
        processed: usize,
        total: usize,
        imported: usize,
    },
    Succeeded {
        summary: ImportSummary,
    },
    Failed {
        error: String,
    },
    Cancelled {
        imported: usize,
        processed: usize,
        total: usize,
    },
}

impl JobState {
    pub fn queued() -> Self {
        JobState::Queued {
            status: "Queued".to_string(),
        }
    }

    pub fn starting() -> Self {
        Self::running(0, "Starting...")
    }

    pub fn running(progress: u8, status: impl Into<String>) -> Self {
        JobState::Running {
            progress: progress.min(100),
            status: status.into(),
            processed: 0,
            total: 0,
            imported: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded { .. } | JobState::Failed { .. } | JobState::Cancelled { .. }
        )
    }

    pub fn progress(&self) -> u8 {
        match self {
            JobState::Running { progress, .. } => *progress,
            JobState::Succeeded { .. } => 100,
            JobState::Queued { .. } | JobState::Failed { .. } | JobState::Cancelled { .. } => 0,
        }
    }

    pub fn status_text(&self) -> String {
        match self {
            JobState::Queued { status } | JobState::Running { status, .. } => status.clone(),
            JobState::Succeeded { summary } => {
                format!("Completed! {} products imported", summary.imported)
            }
            JobState::Failed { error } => format!("Error: {error}"),
            JobState::Cancelled { .. } => "Cancelled by user".to_string(),
        }
    }

    pub fn imported(&self) -> usize {
        match self {
            JobState::Running { imported, .. } | JobState::Cancelled { imported, .. } => *imported,
            JobState::Succeeded { summary } => summary.imported,
            JobState::Queued { .. } | JobState::Failed { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEventKind {
    #[serde(rename = "product.created")]
    Created,
    #[serde(rename = "product.updated")]
    Updated,
    #[serde(rename = "product.deleted")]
    Deleted,
}

impl ProductEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductEventKind::Created => "product.created",
            ProductEventKind::Updated => "product.updated",
            ProductEventKind::Deleted => "product.deleted",
        }
    }
}

/// Lifecycle notification payload delivered to webhook endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEvent {
    pub event: ProductEventKind,
    pub timestamp: DateTime<Utc>,
    pub product: Product,
}

impl ProductEvent {
    pub fn new(event: ProductEventKind, product: Product) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
            product,
        }
    }
}
