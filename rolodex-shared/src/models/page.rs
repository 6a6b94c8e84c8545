/// Pagination and search primitives shared by list queries
///
/// List endpoints accept `q`, `page` and `per_page`. [`PageRequest`]
/// normalizes them and [`Page`] is the response envelope. The query helpers
/// build `LIKE` predicates that are pushed into both the page query and the
/// count query so totals always match what a caller can see.

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

/// Default page size
pub const DEFAULT_PER_PAGE: i64 = 20;

/// Largest accepted page size
pub const MAX_PER_PAGE: i64 = 100;

/// Search and pagination parameters from a query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    /// Case-insensitive substring filter
    pub q: Option<String>,

    /// 1-based page number
    pub page: Option<i64>,

    /// Items per page, clamped to `1..=MAX_PER_PAGE`
    pub per_page: Option<i64>,
}

impl PageRequest {
    pub fn new(q: Option<&str>, page: i64, per_page: i64) -> Self {
        Self {
            q: q.map(str::to_string),
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }

    /// `LIKE` pattern for the search term, if a non-blank one was given
    pub fn search_pattern(&self) -> Option<String> {
        search_pattern(self.q.as_deref())
    }

    /// Appends `LIMIT ? OFFSET ?`
    pub fn push_limit(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder
            .push(" LIMIT ")
            .push_bind(self.per_page())
            .push(" OFFSET ")
            .push_bind(self.offset());
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: &PageRequest, total: i64) -> Self {
        Self {
            items,
            page: request.page(),
            per_page: request.per_page(),
            total,
        }
    }
}

/// `LIKE` pattern for an optional search term; blank terms yield `None`
pub fn search_pattern(q: Option<&str>) -> Option<String> {
    q.map(str::trim).filter(|q| !q.is_empty()).map(like_pattern)
}

/// Wraps a search term in `%` after escaping `LIKE` metacharacters
///
/// The pattern must be used with `ESCAPE '\'`.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Tracks whether a `WHERE` keyword has been emitted yet
#[derive(Debug, Default)]
pub struct Where {
    started: bool,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes ` WHERE ` for the first condition and ` AND ` afterwards
    pub fn and<'b, 'a>(&mut self, builder: &'b mut QueryBuilder<'a, Sqlite>) -> &'b mut QueryBuilder<'a, Sqlite> {
        if self.started {
            builder.push(" AND ")
        } else {
            self.started = true;
            builder.push(" WHERE ")
        }
    }
}

/// Pushes `(col1 LIKE ? OR col2 LIKE ? ...)` for one pattern
pub fn push_search(builder: &mut QueryBuilder<'_, Sqlite>, columns: &[&str], pattern: &str) {
    builder.push("(");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        builder
            .push(*column)
            .push(" LIKE ")
            .push_bind(pattern.to_string())
            .push(" ESCAPE '\\'");
    }
    builder.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = PageRequest::default();
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), DEFAULT_PER_PAGE);
        assert_eq!(request.offset(), 0);
        assert!(request.search_pattern().is_none());
    }

    #[test]
    fn test_clamping() {
        let request = PageRequest::new(None, 0, 1000);
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), MAX_PER_PAGE);

        let request = PageRequest::new(None, 3, -5);
        assert_eq!(request.per_page(), 1);
        assert_eq!(request.offset(), 2);
    }

    #[test]
    fn test_blank_query_is_ignored() {
        assert!(PageRequest::new(Some("   "), 1, 20).search_pattern().is_none());
        assert_eq!(
            PageRequest::new(Some(" acme "), 1, 20).search_pattern().as_deref(),
            Some("%acme%")
        );
    }

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_where_builder() {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM t");
        let mut clause = Where::new();
        clause.and(&mut builder).push("a = 1");
        clause.and(&mut builder).push("b = 2");
        assert_eq!(builder.sql(), "SELECT * FROM t WHERE a = 1 AND b = 2");
    }

    #[test]
    fn test_push_search() {
        let mut builder = QueryBuilder::<Sqlite>::new("");
        push_search(&mut builder, &["name", "email"], "%x%");
        assert_eq!(
            builder.sql(),
            "(name LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\')"
        );
    }
}
