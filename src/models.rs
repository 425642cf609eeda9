//! Data types and associated functions and methods

use serde::Serialize;
use strum_macros::Display;

/// Sign of a denominator term
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Sign {
    /// Term is added to the denominator
    #[serde(rename = "+")]
    Plus,
    /// Term is subtracted from the denominator
    #[serde(rename = "-")]
    Minus,
}

impl Sign {
    /// Returns the sign as a multiplicative factor.
    pub fn factor(self) -> f64 {
        match self {
            Self::Plus => 1.0,
            Self::Minus => -1.0,
        }
    }
}

/// One signed field of a metric denominator
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DenominatorTerm {
    /// Name of the field
    pub field: &'static str,
    /// Sign applied to the field sum
    pub sign: Sign,
}

impl DenominatorTerm {
    /// Return a term that adds `field`.
    pub const fn plus(field: &'static str) -> Self {
        Self {
            field,
            sign: Sign::Plus,
        }
    }

    /// Return a term that subtracts `field`.
    pub const fn minus(field: &'static str) -> Self {
        Self {
            field,
            sign: Sign::Minus,
        }
    }
}

/// A named ratio formula: `numerator / (signed sum of terms) * multiplier`
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MetricDefinition {
    /// Metric identifier, unique within a registry
    pub id: &'static str,
    /// Field summed into the numerator
    pub numerator_field: &'static str,
    /// Signed fields summed into the denominator
    pub denominator_terms: &'static [DenominatorTerm],
    /// Scale applied to the ratio
    pub multiplier: f64,
}

impl MetricDefinition {
    /// Returns the names of all fields the metric reads, numerator first, without duplicates.
    pub fn required_fields(&self) -> Vec<&'static str> {
        let mut fields = vec![self.numerator_field];
        for term in self.denominator_terms {
            if !fields.contains(&term.field) {
                fields.push(term.field);
            }
        }
        fields
    }
}

/// A single field value of a row
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    /// No value
    Absent,
    /// A numeric value, possibly NaN
    Number(f64),
    /// Text as read from the input; numeric fields are parsed when summed
    Text(String),
}

/// Textual markers read as [Cell::Absent].
const MISSING_MARKERS: [&str; 5] = ["NA", "NaN", "nan", "null", "NULL"];

impl Cell {
    /// Parse a cell from delimited text.
    ///
    /// Empty strings and the usual missing data markers are absent. Any other value keeps its
    /// trimmed text, so that group keys such as `0123` and `123` stay distinct.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || MISSING_MARKERS.contains(&text) {
            Self::Absent
        } else {
            Self::Text(text.to_string())
        }
    }
}

/// Parse a number, accepting a decimal comma when the text contains no dot.
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(number) = text.parse::<f64>() {
        return Some(number);
    }
    if text.contains(',') && !text.contains('.') {
        return text.replace(',', ".").parse::<f64>().ok();
    }
    None
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Absent, Self::Number)
    }
}

/// A row of cells aligned with the columns of its partition
pub type Row = Vec<Cell>;

/// A disjoint subset of the input rows, processed as one unit
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    /// Partition identifier, used in failure reports
    pub id: String,
    /// Column names (the partition schema)
    pub columns: Vec<String>,
    /// Rows of the partition
    pub rows: Vec<Row>,
}

impl Partition {
    /// Return an empty Partition with the given schema.
    pub fn new<S: Into<String>>(id: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            id: id.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: vec![],
        }
    }

    /// Append a row, builder style.
    pub fn with_row<C: Into<Cell>>(mut self, cells: impl IntoIterator<Item = C>) -> Self {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the position of a column in the schema.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Returns whether every named field is part of the schema.
    pub fn has_columns(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.column_index(name).is_some())
    }
}

/// Value used to bucket rows
///
/// Known keys sort before [GroupKey::Unknown].
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum GroupKey {
    /// The group field held a value
    Known(String),
    /// The group field was absent
    Unknown,
}

impl GroupKey {
    /// Returns the key of a row whose group field holds `cell`.
    pub fn from_cell(cell: &Cell) -> Self {
        match cell {
            Cell::Absent => Self::Unknown,
            Cell::Number(number) if number.is_nan() => Self::Unknown,
            Cell::Number(number) => Self::Known(number.to_string()),
            Cell::Text(text) => Self::Known(text.clone()),
        }
    }
}

impl From<&str> for GroupKey {
    fn from(value: &str) -> Self {
        Self::Known(value.to_string())
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(key) => f.write_str(key),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Why a metric has no value
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum NaReason {
    /// No row supplied the metric's fields
    NoData,
    /// The denominator summed to zero
    ZeroDenominator,
    /// A sum or the ratio was not a finite number
    NotANumber,
}

/// Outcome of evaluating a metric for one group
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RatioResult {
    /// Ratio rounded to two decimal places
    Value(f64),
    /// Not available
    NotAvailable(NaReason),
}

impl RatioResult {
    /// Returns the value, if available.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(value) => Some(*value),
            Self::NotAvailable(_) => None,
        }
    }
}

impl std::fmt::Display for RatioResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Adding zero turns -0.0 into 0.0.
            Self::Value(value) => write!(f, "{:.2}", value + 0.0),
            Self::NotAvailable(_) => f.write_str("NA"),
        }
    }
}

/// One output row: a group and a result per metric, in registry order
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRow {
    pub group: GroupKey,
    pub values: Vec<RatioResult>,
}

/// Final output of a run
#[derive(Clone, Debug, PartialEq)]
pub struct ResultTable {
    /// Name of the grouping field, used as the first column header
    pub group_field: String,
    /// Metric ids in registry order
    pub metric_ids: Vec<&'static str>,
    /// One row per group, sorted by group key
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Returns the result for a group and metric, if both exist.
    pub fn get(&self, group: &GroupKey, metric_id: &str) -> Option<RatioResult> {
        let column = self.metric_ids.iter().position(|id| *id == metric_id)?;
        self.rows
            .iter()
            .find(|row| row.group == *group)
            .and_then(|row| row.values.get(column).copied())
    }
}
