//! Query layer for list endpoints.
//!
//! A list request is described by a [`TaskQuery`] built through an ordered
//! pipeline of pure steps (filter, search, order, paginate). The finished
//! descriptor is rendered once into a [`SqlPlan`] and executed once by the
//! storage layer. [`Page`] is the paginated response envelope shared by every
//! list endpoint.

use crate::types::TaskStatus;
use serde::Serialize;

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// A 1-based page request. Page `0` is valid but out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u64,
    pub size: u64,
}

impl PageRequest {
    pub fn new(number: u64, size: u64) -> Self {
        Self {
            number,
            size: size.max(1),
        }
    }

    /// Parse the `page` query parameter. Absent or non-numeric values mean
    /// the first page.
    pub fn from_param(raw: Option<&str>, size: u64) -> Self {
        let number = raw.and_then(|s| s.trim().parse::<u64>().ok()).unwrap_or(1);
        Self::new(number, size)
    }

    /// `(limit, offset)` for this page. An out-of-range page number yields a
    /// zero limit so the query returns nothing.
    pub fn limit_offset(&self) -> (i64, i64) {
        if self.number == 0 {
            return (0, 0);
        }
        let offset = (self.number - 1).saturating_mul(self.size).min(i64::MAX as u64);
        (self.size.min(i64::MAX as u64) as i64, offset as i64)
    }

    /// Last page number for `count` results (at least 1).
    pub fn last_page(&self, count: u64) -> u64 {
        count.div_ceil(self.size).max(1)
    }
}

/// Sortable task fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    CreatedAt,
    Status,
}

impl OrderField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "created_at" => Some(OrderField::CreatedAt),
            "status" => Some(OrderField::Status),
            _ => None,
        }
    }

    fn sql(&self) -> String {
        match self {
            OrderField::CreatedAt => "t.created_at".to_string(),
            OrderField::Status => {
                let arms: Vec<String> = TaskStatus::ALL
                    .iter()
                    .map(|s| format!("WHEN '{}' THEN {}", s.as_str(), s.rank()))
                    .collect();
                format!("CASE t.status {} END", arms.join(" "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: OrderField,
    pub descending: bool,
}

/// Descriptor for a task list query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    /// Exact match on the stored status value.
    pub status: Option<String>,
    /// Case-insensitive substring searched in title and description.
    pub search: Option<String>,
    pub ordering: Vec<OrderTerm>,
    pub page: Option<PageRequest>,
}

/// Rendered SQL for a [`TaskQuery`]. Every parameter binds as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPlan {
    pub select: String,
    pub count: String,
    pub params: Vec<String>,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full pipeline from request parameters, in order:
    /// filter, search, order, paginate.
    pub fn from_params(params: &ListParams, page: PageRequest) -> Self {
        Self::new()
            .filter_status(params.get("status"))
            .search(params.get("search"))
            .order_by(params.get("ordering"))
            .paginate(page)
    }

    /// Restrict to tasks whose status equals `status`. Empty means no filter.
    pub fn filter_status(mut self, status: Option<&str>) -> Self {
        self.status = status
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        self
    }

    /// Restrict to tasks whose title or description contains `term`.
    pub fn search(mut self, term: Option<&str>) -> Self {
        self.search = term
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        self
    }

    /// Apply an `ordering` parameter: comma-separated field names, each
    /// optionally prefixed with `-` for descending. Unknown names are ignored.
    pub fn order_by(mut self, ordering: Option<&str>) -> Self {
        self.ordering = ordering
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter_map(|term| {
                let (name, descending) = match term.strip_prefix('-') {
                    Some(rest) => (rest, true),
                    None => (term, false),
                };
                OrderField::parse(name).map(|field| OrderTerm { field, descending })
            })
            .collect();
        self
    }

    pub fn paginate(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }

    /// Render the descriptor into a select statement and a count statement.
    pub fn to_sql(&self) -> SqlPlan {
        let mut where_sql = String::new();
        let mut params = Vec::new();

        if let Some(ref status) = self.status {
            params.push(status.clone());
            where_sql.push_str(&format!(" AND t.status = ?{}", params.len()));
        }

        if let Some(ref term) = self.search {
            params.push(term.clone());
            let idx = params.len();
            where_sql.push_str(&format!(
                " AND (icontains(t.title, ?{idx}) OR icontains(t.description, ?{idx}))"
            ));
        }

        let mut order_terms: Vec<String> = self
            .ordering
            .iter()
            .map(|term| {
                format!(
                    "{} {}",
                    term.field.sql(),
                    if term.descending { "DESC" } else { "ASC" }
                )
            })
            .collect();
        // Ties fall back to creation order.
        order_terms.push("t.created_at ASC".to_string());
        order_terms.push("t.id ASC".to_string());

        let mut select = format!(
            "SELECT t.id, t.title, t.description, t.status, t.created_at, t.updated_at
             FROM tasks t WHERE 1=1{} ORDER BY {}",
            where_sql,
            order_terms.join(", ")
        );

        if let Some(page) = self.page {
            let (limit, offset) = page.limit_offset();
            select.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }

        let count = format!("SELECT COUNT(*) FROM tasks t WHERE 1=1{}", where_sql);

        SqlPlan {
            select,
            count,
            params,
        }
    }
}

/// Decoded query-string pairs of a list request, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pairs: Vec<(String, String)>,
}

impl ListParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Page requested by the `page` parameter.
    pub fn page(&self, size: u64) -> PageRequest {
        PageRequest::from_param(self.get("page"), size)
    }

    /// Last value given for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Build a link to `page` on `path`, keeping every other parameter.
    /// Page 1 is linked without a `page` parameter.
    pub fn page_link(&self, path: &str, page: u64) -> String {
        let mut parts: Vec<String> = self
            .pairs
            .iter()
            .filter(|(k, _)| k != "page")
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        if page > 1 {
            parts.push(format!("page={}", page));
        }
        if parts.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, parts.join("&"))
        }
    }
}

/// Paginated list envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wrap one page of results, linking neighbours on `path`.
    pub fn new(
        results: Vec<T>,
        count: u64,
        page: PageRequest,
        params: &ListParams,
        path: &str,
    ) -> Self {
        let last = page.last_page(count);
        let next = (page.number >= 1 && page.number < last)
            .then(|| params.page_link(path, page.number + 1));
        let previous =
            (page.number > 1).then(|| params.page_link(path, (page.number - 1).min(last)));

        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        ListParams::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn repeated_parameters_use_the_last_value() {
        let p = params(&[("status", "new"), ("flag", ""), ("status", "completed")]);
        assert_eq!(p.get("status"), Some("completed"));
        assert_eq!(p.get("flag"), Some(""));
        assert_eq!(p.get("missing"), None);
    }

    #[test]
    fn pipeline_applies_every_step() {
        let p = params(&[
            ("status", "new"),
            ("search", " report "),
            ("ordering", "-status,bogus,created_at"),
            ("page", "3"),
        ]);
        let query = TaskQuery::from_params(&p, p.page(10));
        assert_eq!(query.status.as_deref(), Some("new"));
        assert_eq!(query.search.as_deref(), Some("report"));
        assert_eq!(
            query.ordering,
            vec![
                OrderTerm {
                    field: OrderField::Status,
                    descending: true
                },
                OrderTerm {
                    field: OrderField::CreatedAt,
                    descending: false
                },
            ]
        );
        assert_eq!(query.page, Some(PageRequest::new(3, 10)));
    }

    #[test]
    fn empty_parameters_mean_no_filter() {
        let query = TaskQuery::new()
            .filter_status(Some(""))
            .search(Some("   "))
            .order_by(Some("title"));
        assert_eq!(query, TaskQuery::new());
    }

    #[test]
    fn sql_binds_filter_and_search_in_order() {
        let plan = TaskQuery::new()
            .filter_status(Some("completed"))
            .search(Some("x"))
            .to_sql();
        assert_eq!(plan.params, vec!["completed".to_string(), "x".to_string()]);
        assert!(plan.select.contains("t.status = ?1"));
        assert!(plan.select.contains("icontains(t.title, ?2)"));
        assert!(plan.count.contains("icontains(t.description, ?2)"));
        assert!(!plan.count.contains("ORDER BY"));
    }

    #[test]
    fn status_ordering_follows_workflow() {
        let plan = TaskQuery::new().order_by(Some("status")).to_sql();
        assert!(plan.select.contains(
            "CASE t.status WHEN 'new' THEN 0 WHEN 'in_progress' THEN 1 \
             WHEN 'completed' THEN 2 WHEN 'cancelled' THEN 3 END ASC"
        ));
    }

    #[test]
    fn page_zero_is_out_of_range() {
        assert_eq!(PageRequest::new(0, 10).limit_offset(), (0, 0));
        assert_eq!(PageRequest::new(3, 10).limit_offset(), (10, 20));
        assert_eq!(PageRequest::from_param(Some("abc"), 10).number, 1);
        let (_, offset) = PageRequest::new(u64::MAX, 10).limit_offset();
        assert_eq!(offset, i64::MAX);
    }

    #[test]
    fn links_preserve_other_parameters() {
        let p = params(&[("status", "in_progress"), ("search", "a b"), ("page", "2")]);
        let page = Page::new(vec![1, 2], 25, PageRequest::new(2, 10), &p, "/tasks/");
        assert_eq!(
            page.next.as_deref(),
            Some("/tasks/?status=in_progress&search=a%20b&page=3")
        );
        assert_eq!(
            page.previous.as_deref(),
            Some("/tasks/?status=in_progress&search=a%20b")
        );
    }

    #[test]
    fn last_page_has_no_next() {
        let p = params(&[]);
        let page: Page<u8> = Page::new(vec![], 20, PageRequest::new(2, 10), &p, "/tasks/");
        assert!(page.next.is_none());
        assert_eq!(page.previous.as_deref(), Some("/tasks/"));

        let beyond: Page<u8> = Page::new(vec![], 20, PageRequest::new(9, 10), &p, "/tasks/");
        assert!(beyond.next.is_none());
        assert_eq!(beyond.previous.as_deref(), Some("/tasks/?page=2"));
    }

    #[test]
    fn single_page_has_no_links() {
        let page: Page<u8> = Page::new(vec![], 0, PageRequest::new(1, 10), &params(&[]), "/x/");
        assert!(page.next.is_none());
        assert!(page.previous.is_none());
    }
}
