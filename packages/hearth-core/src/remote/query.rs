//! # Structured Queries
//!
//! A small, backend-neutral query description: filters, ordering and a row
//! range. Backends translate it to their own dialect; [`Query::apply`]
//! evaluates it over JSON rows directly.
//!
//! ```text
//! Query::table("books")
//!     .eq("family_id", "f1")                          family_id = 'f1'
//!     .any(vec![                                      AND (
//!         vec![Filter::contains("title", "cake")],        title ILIKE '%cake%'
//!         vec![Filter::contains("description", "cake")],  OR description ILIKE ...
//!     ])                                              )
//!     .order_desc("id")                               ORDER BY id DESC
//!     .range(20, 20)                                  OFFSET 20 LIMIT 20
//! ```

use std::cmp::Ordering;

use serde_json::Value;

/// A row predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals value
    Eq {
        /// Column name
        column: String,
        /// Expected value
        value: Value,
    },
    /// Column is one of the values
    In {
        /// Column name
        column: String,
        /// Accepted values
        values: Vec<Value>,
    },
    /// Column contains the needle, ignoring case
    Contains {
        /// Column name
        column: String,
        /// Substring to look for
        needle: String,
    },
    /// Any of the groups matches; a group matches when all its filters do
    Any(Vec<Vec<Filter>>),
}

impl Filter {
    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// `column IN (values)`
    pub fn in_list<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `column ILIKE '%needle%'`
    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::Contains {
            column: column.into(),
            needle: needle.into(),
        }
    }

    /// Evaluate against a JSON row
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq { column, value } => row.get(column) == Some(value),
            Filter::In { column, values } => row
                .get(column)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Filter::Contains { column, needle } => match row.get(column) {
                Some(Value::String(s)) => s.to_lowercase().contains(&needle.to_lowercase()),
                _ => false,
            },
            Filter::Any(groups) => groups
                .iter()
                .any(|group| group.iter().all(|f| f.matches(row))),
        }
    }
}

/// Sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column name
    pub column: String,
    /// Ascending when true
    pub ascending: bool,
}

/// Row window: skip `offset`, return at most `limit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// Rows to skip
    pub offset: usize,
    /// Maximum rows to return
    pub limit: usize,
}

/// A read (or the row selection of a write) against one table
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Table name
    pub table: String,
    /// Conjunction of filters
    pub filters: Vec<Filter>,
    /// Sort keys, most significant first
    pub order: Vec<Order>,
    /// Optional row window
    pub range: Option<Range>,
}

impl Query {
    /// Start a query on `table`
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: Vec::new(),
            range: None,
        }
    }

    /// Add any filter
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add `column = value`
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    /// Add `column IN (values)`
    pub fn in_list<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Filter::in_list(column, values))
    }

    /// Add a case-insensitive substring match
    pub fn contains(self, column: &str, needle: &str) -> Self {
        self.filter(Filter::contains(column, needle))
    }

    /// Add an or-group of conjunctions
    pub fn any(self, groups: Vec<Vec<Filter>>) -> Self {
        self.filter(Filter::Any(groups))
    }

    /// Match `needle` in any of `columns`, ignoring case
    pub fn search(self, columns: &[&str], needle: &str) -> Self {
        let groups = columns
            .iter()
            .map(|c| vec![Filter::contains(*c, needle)])
            .collect();
        self.any(groups)
    }

    /// Sort ascending by `column`
    pub fn order_asc(mut self, column: &str) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending: true,
        });
        self
    }

    /// Sort descending by `column`
    pub fn order_desc(mut self, column: &str) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending: false,
        });
        self
    }

    /// Skip `offset` rows and return at most `limit`
    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.range = Some(Range { offset, limit });
        self
    }

    /// Limit the result to the first `limit` rows
    pub fn limit(self, limit: usize) -> Self {
        self.range(0, limit)
    }

    /// Whether a row satisfies every filter
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Evaluate the query over a set of rows
    pub fn apply<'a>(&self, rows: impl IntoIterator<Item = &'a Value>) -> Vec<Value> {
        let mut selected: Vec<Value> = rows
            .into_iter()
            .filter(|row| self.matches(row))
            .cloned()
            .collect();

        if !self.order.is_empty() {
            selected.sort_by(|a, b| {
                for key in &self.order {
                    let ord = compare_values(a.get(&key.column), b.get(&key.column));
                    let ord = if key.ascending { ord } else { ord.reverse() };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        match self.range {
            Some(Range { offset, limit }) => selected.into_iter().skip(offset).take(limit).collect(),
            None => selected,
        }
    }
}

/// Total order over optional JSON scalars: missing/null first, then
/// booleans, numbers, strings. Other values compare equal.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
