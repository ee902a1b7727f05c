//! Generic filter compiler for the generic tables
//!
//! Query-string keys use `field__op` suffixes (`age__gte=30`,
//! `name__ilike=al%`); a bare key means equality. Filters compile to
//! parameterized SQL over the jsonb `data` column, with base columns
//! (`id`, `created_at`, `updated_at`) addressed directly.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Closed operator set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    Between,
    ArrayContains,
    ArrayContained,
    ArrayOverlaps,
}

impl FromStr for FilterOperator {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "eq" => Ok(FilterOperator::Eq),
            "ne" => Ok(FilterOperator::Ne),
            "gt" => Ok(FilterOperator::Gt),
            "gte" => Ok(FilterOperator::Gte),
            "lt" => Ok(FilterOperator::Lt),
            "lte" => Ok(FilterOperator::Lte),
            "like" => Ok(FilterOperator::Like),
            "ilike" => Ok(FilterOperator::Ilike),
            "startswith" => Ok(FilterOperator::StartsWith),
            "endswith" => Ok(FilterOperator::EndsWith),
            "isnull" => Ok(FilterOperator::IsNull),
            "isnotnull" => Ok(FilterOperator::IsNotNull),
            "in" => Ok(FilterOperator::In),
            "notin" => Ok(FilterOperator::NotIn),
            "between" => Ok(FilterOperator::Between),
            "arraycontains" => Ok(FilterOperator::ArrayContains),
            "arraycontained" => Ok(FilterOperator::ArrayContained),
            "arrayoverlaps" => Ok(FilterOperator::ArrayOverlaps),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Ne => "ne",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::Ilike => "ilike",
            FilterOperator::StartsWith => "startswith",
            FilterOperator::EndsWith => "endswith",
            FilterOperator::IsNull => "isnull",
            FilterOperator::IsNotNull => "isnotnull",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "notin",
            FilterOperator::Between => "between",
            FilterOperator::ArrayContains => "arraycontains",
            FilterOperator::ArrayContained => "arraycontained",
            FilterOperator::ArrayOverlaps => "arrayoverlaps",
        };
        write!(f, "{}", name)
    }
}

/// One parsed filter
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl Filter {
    /// Parse a `key=value` query parameter into a filter
    pub fn parse(key: &str, value: &str) -> Result<Self> {
        let (field, operator) = match key.rsplit_once("__") {
            Some((field, suffix)) => match FilterOperator::from_str(suffix) {
                Ok(op) => (field.to_string(), op),
                Err(()) => {
                    return Err(Error::validation(
                        key,
                        "unknown_operator",
                        format!("Unknown filter operator: {}", suffix),
                    ))
                }
            },
            None => (key.to_string(), FilterOperator::Eq),
        };

        if !is_valid_field(&field) {
            return Err(Error::validation(
                key,
                "invalid_field",
                format!("Invalid field name: {}", field),
            ));
        }

        Ok(Self {
            field,
            operator,
            value: value.to_string(),
        })
    }
}

/// A bind value paired with a placeholder in the generated SQL
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Number(f64),
    TextArray(Vec<String>),
    Json(serde_json::Value),
}

/// Compiles filters into a WHERE fragment plus ordered bind values
#[derive(Debug, Default)]
pub struct QueryBuilder {
    clauses: Vec<String>,
    binds: Vec<BindValue>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and add every non-reserved query parameter
    pub fn add_query_params<'a, I>(&mut self, params: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in params {
            if RESERVED_PARAMS.contains(&key) {
                continue;
            }
            let filter = Filter::parse(key, value)?;
            self.add_filter(&filter)?;
        }
        Ok(())
    }

    /// Compile one filter into SQL + binds
    pub fn add_filter(&mut self, filter: &Filter) -> Result<()> {
        let column = field_expr(&filter.field);

        match filter.operator {
            FilterOperator::Eq => self.push_compare(&column, "=", &filter.value),
            FilterOperator::Ne => self.push_compare(&column, "<>", &filter.value),
            FilterOperator::Gt => self.push_compare(&column, ">", &filter.value),
            FilterOperator::Gte => self.push_compare(&column, ">=", &filter.value),
            FilterOperator::Lt => self.push_compare(&column, "<", &filter.value),
            FilterOperator::Lte => self.push_compare(&column, "<=", &filter.value),
            FilterOperator::Like => self.push_text(&column, "LIKE", filter.value.clone()),
            FilterOperator::Ilike => self.push_text(&column, "ILIKE", filter.value.clone()),
            FilterOperator::StartsWith => {
                self.push_text(&column, "LIKE", format!("{}%", escape_like(&filter.value)))
            }
            FilterOperator::EndsWith => {
                self.push_text(&column, "LIKE", format!("%{}", escape_like(&filter.value)))
            }
            FilterOperator::IsNull => {
                self.clauses.push(format!("{} IS NULL", column));
            }
            FilterOperator::IsNotNull => {
                self.clauses.push(format!("{} IS NOT NULL", column));
            }
            FilterOperator::In => {
                let values = split_list(&filter.value);
                let placeholder = self.bind(BindValue::TextArray(values));
                self.clauses.push(format!("{} = ANY({})", column, placeholder));
            }
            FilterOperator::NotIn => {
                let values = split_list(&filter.value);
                let placeholder = self.bind(BindValue::TextArray(values));
                self.clauses.push(format!("{} <> ALL({})", column, placeholder));
            }
            FilterOperator::Between => {
                let bounds = split_list(&filter.value);
                if bounds.len() != 2 {
                    return Err(Error::validation(
                        &filter.field,
                        "invalid_between",
                        "between expects exactly two comma-separated values",
                    ));
                }
                if let (Ok(low), Ok(high)) =
                    (bounds[0].parse::<f64>(), bounds[1].parse::<f64>())
                {
                    let low_ph = self.bind(BindValue::Number(low));
                    let high_ph = self.bind(BindValue::Number(high));
                    self.clauses.push(format!(
                        "({})::numeric BETWEEN {} AND {}",
                        column, low_ph, high_ph
                    ));
                } else {
                    let low_ph = self.bind(BindValue::Text(bounds[0].clone()));
                    let high_ph = self.bind(BindValue::Text(bounds[1].clone()));
                    self.clauses.push(format!(
                        "{} BETWEEN {} AND {}",
                        column, low_ph, high_ph
                    ));
                }
            }
            FilterOperator::ArrayContains => {
                let placeholder =
                    self.bind(BindValue::Json(json_array(&filter.value)));
                self.clauses.push(format!(
                    "{} @> {}::jsonb",
                    json_field_expr(&filter.field),
                    placeholder
                ));
            }
            FilterOperator::ArrayContained => {
                let placeholder =
                    self.bind(BindValue::Json(json_array(&filter.value)));
                self.clauses.push(format!(
                    "{} <@ {}::jsonb",
                    json_field_expr(&filter.field),
                    placeholder
                ));
            }
            FilterOperator::ArrayOverlaps => {
                let values = split_list(&filter.value);
                let placeholder = self.bind(BindValue::TextArray(values));
                self.clauses.push(format!(
                    "EXISTS (SELECT 1 FROM jsonb_array_elements_text({}) elem WHERE elem = ANY({}))",
                    json_field_expr(&filter.field),
                    placeholder
                ));
            }
        }

        Ok(())
    }

    /// WHERE fragment joined with AND, or empty when no filters were added
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" AND {}", self.clauses.join(" AND "))
        }
    }

    pub fn binds(&self) -> &[BindValue] {
        &self.binds
    }

    pub fn into_binds(self) -> Vec<BindValue> {
        self.binds
    }

    /// Next placeholder index (1-based, for callers appending their own binds)
    pub fn next_placeholder(&self) -> usize {
        self.binds.len() + 1
    }

    fn bind(&mut self, value: BindValue) -> String {
        self.binds.push(value);
        format!("${}", self.binds.len())
    }

    fn push_compare(&mut self, column: &str, op: &str, value: &str) {
        // Numeric operands compare numerically, everything else as text
        if let Ok(number) = value.parse::<f64>() {
            let placeholder = self.bind(BindValue::Number(number));
            self.clauses
                .push(format!("({})::numeric {} {}", column, op, placeholder));
        } else {
            let placeholder = self.bind(BindValue::Text(value.to_string()));
            self.clauses
                .push(format!("{} {} {}", column, op, placeholder));
        }
    }

    fn push_text(&mut self, column: &str, op: &str, value: String) {
        let placeholder = self.bind(BindValue::Text(value));
        self.clauses
            .push(format!("{} {} {}", column, op, placeholder));
    }
}

/// Params consumed by the route layer, never treated as filters
pub const RESERVED_PARAMS: &[&str] = &["page", "per_page", "sort", "order", "search", "hard"];

const BASE_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

fn is_valid_field(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Text-valued SQL expression for a field
fn field_expr(field: &str) -> String {
    if BASE_COLUMNS.contains(&field) {
        format!("{}::text", field)
    } else {
        format!("data->>'{}'", field)
    }
}

/// Jsonb-valued SQL expression for a field (array operators)
fn json_field_expr(field: &str) -> String {
    format!("data->'{}'", field)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn json_array(value: &str) -> serde_json::Value {
    serde_json::Value::Array(
        split_list(value)
            .into_iter()
            .map(|v| match v.parse::<f64>() {
                Ok(n) => serde_json::json!(n),
                Err(_) => serde_json::Value::String(v),
            })
            .collect(),
    )
}

fn escape_like(value: &str) -> String {
    value.replace('%', "\\%").replace('_', "\\_")
}
