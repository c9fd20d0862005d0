//! Query criteria over read-model documents: text, equality and date-range
//! filters, sorting with a deterministic tie-break, and offset pagination.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::read_model::ReadModelDocument;

/// Page size used when a store is not configured otherwise.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

/// Inclusive date bounds on one field. Either end may be open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub field: String,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criteria {
    /// Target id for single-item lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Case-insensitive substring of the searchable text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Field equality. An array-valued field matches if it contains the
    /// value; an array filter value matches any of its elements.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_ranges: Vec<DateRange>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn date_range(
        mut self,
        field: impl Into<String>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_ranges.push(DateRange {
            field: field.into(),
            from,
            to,
        });
        self
    }

    /// Returns true if the document passes every filter.
    pub fn matches(&self, doc: &ReadModelDocument) -> bool {
        if let Some(ref id) = self.id
            && &doc.id != id
        {
            return false;
        }

        if let Some(ref text) = self.text
            && !doc.searchable_text.contains(&text.to_lowercase())
        {
            return false;
        }

        let equal = self
            .filters
            .iter()
            .all(|(field, wanted)| field_matches(doc.field(field).as_ref(), wanted));
        if !equal {
            return false;
        }

        self.date_ranges.iter().all(|range| {
            let Some(at) = doc.field(&range.field).as_ref().and_then(as_datetime) else {
                return false;
            };
            range.from.is_none_or(|from| at >= from) && range.to.is_none_or(|to| at <= to)
        })
    }
}

fn field_matches(actual: Option<&Value>, wanted: &Value) -> bool {
    match wanted {
        Value::Array(options) => options.iter().any(|w| field_matches(actual, w)),
        wanted => match actual {
            Some(Value::Array(items)) => items.contains(wanted),
            Some(value) => value == wanted,
            None => wanted.is_null(),
        },
    }
}

fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str().and_then(parse_rfc3339)
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: usize,
    /// `None` or 0 means the store's maximum page size.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Pagination {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// The effective limit under `max_page_size`.
    pub fn clamped_limit(&self, max_page_size: usize) -> usize {
        match self.limit {
            None | Some(0) => max_page_size,
            Some(limit) => limit.min(max_page_size),
        }
    }
}

/// Filters, sort and pagination for a list query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default)]
    pub criteria: Criteria,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub sort: Option<Sort>,
}

impl QuerySpec {
    pub fn new(criteria: Criteria) -> Self {
        Self {
            criteria,
            ..Default::default()
        }
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.pagination = Pagination::new(offset, limit);
        self
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total_count: self.total_count,
            offset: self.offset,
            limit: self.limit,
            has_more: self.has_more,
        })
    }
}

/// Runs `spec` over `docs`.
///
/// Ordering is by the sort field (missing and null first when ascending)
/// and then by ascending id, so equal keys page deterministically.
pub fn execute<'a>(
    docs: impl IntoIterator<Item = &'a ReadModelDocument>,
    spec: &QuerySpec,
    max_page_size: usize,
) -> Page<ReadModelDocument> {
    let matched: Vec<&ReadModelDocument> = docs
        .into_iter()
        .filter(|doc| spec.criteria.matches(doc))
        .collect();

    let mut keyed: Vec<(SortKey, &ReadModelDocument)> = match spec.sort {
        Some(ref sort) => {
            let values: Vec<Option<Value>> =
                matched.iter().map(|doc| doc.field(&sort.field)).collect();
            let as_dates = values
                .iter()
                .flatten()
                .filter_map(Value::as_str)
                .all(|s| parse_rfc3339(s).is_some());
            values
                .into_iter()
                .map(|value| SortKey::new(value, as_dates))
                .zip(matched)
                .collect()
        }
        None => matched.into_iter().map(|doc| (SortKey::Missing, doc)).collect(),
    };

    let direction = spec.sort.as_ref().map(|sort| sort.direction);
    keyed.sort_by(|(ka, a), (kb, b)| {
        let ordering = ka.compare(kb);
        let primary = match direction {
            Some(SortDirection::Desc) => ordering.reverse(),
            _ => ordering,
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
    let matched: Vec<&ReadModelDocument> = keyed.into_iter().map(|(_, doc)| doc).collect();

    let total_count = matched.len();
    let offset = spec.pagination.offset;
    let limit = spec.pagination.clamped_limit(max_page_size);
    let items: Vec<ReadModelDocument> = matched
        .into_iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect();
    let has_more = offset + items.len() < total_count;

    Page {
        items,
        total_count,
        offset,
        limit,
        has_more,
    }
}

/// Total order over one field's values.
///
/// Types rank missing/null, bool, number, date, text, other. Strings sort
/// as dates only when every string value of the field parses as RFC 3339;
/// otherwise all of them sort lexically.
enum SortKey {
    Missing,
    Bool(bool),
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
    Other(String),
}

impl SortKey {
    fn new(value: Option<Value>, as_dates: bool) -> Self {
        match value {
            None | Some(Value::Null) => SortKey::Missing,
            Some(Value::Bool(b)) => SortKey::Bool(b),
            Some(Value::Number(n)) => SortKey::Number(n.as_f64().unwrap_or(f64::NAN)),
            Some(Value::String(s)) => match parse_rfc3339(&s) {
                Some(at) if as_dates => SortKey::Date(at),
                _ => SortKey::Text(s),
            },
            Some(other) => SortKey::Other(other.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Missing => 0,
            SortKey::Bool(_) => 1,
            SortKey::Number(_) => 2,
            SortKey::Date(_) => 3,
            SortKey::Text(_) => 4,
            SortKey::Other(_) => 5,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Bool(x), SortKey::Bool(y)) => x.cmp(y),
            (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(y),
            (SortKey::Date(x), SortKey::Date(y)) => x.cmp(y),
            (SortKey::Text(x), SortKey::Text(y)) | (SortKey::Other(x), SortKey::Other(y)) => {
                x.cmp(y)
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}
