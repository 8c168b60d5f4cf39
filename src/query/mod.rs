//! Read Query Translation
//!
//! Turns untrusted query-string parameters into a [`QuerySpec`], then into
//! parameterized SQL fragments.
//!
//! # Pipeline
//! 1. [`QuerySpec::from_pairs`] never fails: malformed input degrades to
//!    defaults, unrecognised keys are ignored.
//! 2. [`compile::compile`] consults the [`allowlist`] for every identifier
//!    and binds every value.
//!
//! # Parameters
//! - `sort` (default `id`), `order` (`asc`|`desc`, default `asc`)
//! - `pageSize` (positive, default 10), `pageNumber` (zero-based, default 0)
//! - `<field>[gt|lt|gte|lte|eq|has]=<value>` filters, combined with AND

pub mod allowlist;
pub mod compile;
pub mod statement;

pub use compile::{compile, CompiledQuery};
pub use statement::{SqlValue, Statement};

/// Page size used when `pageSize` is missing, unparsable or not positive
pub const DEFAULT_PAGE_SIZE: u32 = 10;

const SORT_KEY: &str = "sort";
const ORDER_KEY: &str = "order";
const PAGE_SIZE_KEY: &str = "pageSize";
const PAGE_NUMBER_KEY: &str = "pageNumber";

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parse `asc`/`desc` case-insensitively; anything else is `Asc`
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Requested ordering
///
/// `field` is kept as requested; it is checked against the allow-list when
/// the ORDER BY fragment is compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: allowlist::DEFAULT_SORT_FIELD.to_string(),
            order: SortOrder::Asc,
        }
    }
}

/// Comparison operators selectable through a bracketed key suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    /// Substring match
    Has,
}

impl FilterOperator {
    /// Parse the text between the brackets of `field[op]`
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            "eq" => Some(Self::Eq),
            "has" => Some(Self::Has),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Eq => "=",
            Self::Has => "LIKE",
        }
    }
}

/// A single comparison requested by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    /// For `Has`, already wrapped in `%` with LIKE metacharacters escaped
    pub value: String,
}

/// Validated, defaulted read request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub sort: Sort,
    pub page_size: u32,
    /// Zero-based page index
    pub page_number: u32,
    pub filters: Vec<Filter>,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            sort: Sort::default(),
            page_size: DEFAULT_PAGE_SIZE,
            page_number: 0,
            filters: Vec::new(),
        }
    }
}

impl QuerySpec {
    /// Build a spec from raw query-string pairs, in request order
    ///
    /// Control keys use their first occurrence. Each recognised filter key
    /// yields one filter, so repeated filter keys are all applied.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut sort: Option<String> = None;
        let mut order: Option<String> = None;
        let mut page_size: Option<String> = None;
        let mut page_number: Option<String> = None;
        let mut filters = Vec::new();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                SORT_KEY => first(&mut sort, value),
                ORDER_KEY => first(&mut order, value),
                PAGE_SIZE_KEY => first(&mut page_size, value),
                PAGE_NUMBER_KEY => first(&mut page_number, value),
                _ => {
                    if let Some(filter) = parse_filter(key, value) {
                        filters.push(filter);
                    }
                }
            }
        }

        let sort = Sort {
            field: sort
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| allowlist::DEFAULT_SORT_FIELD.to_string()),
            order: order.as_deref().map(SortOrder::parse).unwrap_or_default(),
        };

        let spec = Self {
            sort,
            page_size: parse_page_size(page_size.as_deref()),
            page_number: parse_page_number(page_number.as_deref()),
            filters,
        };

        tracing::debug!(
            sort = %spec.sort.field,
            order = spec.sort.order.as_sql(),
            page_size = spec.page_size,
            page_number = spec.page_number,
            filters = spec.filters.len(),
            "parsed read parameters"
        );

        spec
    }

    /// Rows skipped before the requested page
    ///
    /// Saturates at `i64::MAX` rather than wrapping for absurd page values.
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page_number).saturating_mul(i64::from(self.page_size))
    }
}

fn first(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

fn parse_page_size(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.parse::<u32>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

// Missing, unparsable and negative page numbers all mean the first page.
fn parse_page_number(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.parse::<i64>().ok())
        .map_or(0, |n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
}

fn parse_filter(key: &str, value: &str) -> Option<Filter> {
    let (field, suffix) = key.strip_suffix(']')?.rsplit_once('[')?;
    let operator = FilterOperator::from_suffix(suffix)?;

    let value = match operator {
        FilterOperator::Has => format!("%{}%", escape_like(value)),
        _ => value.to_string(),
    };

    Some(Filter {
        field: field.to_string(),
        operator,
        value,
    })
}

/// Escape LIKE metacharacters so `[has]` is a literal substring match
///
/// Pairs with `ESCAPE '\'` in the compiled predicate.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
