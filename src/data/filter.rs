use std::collections::BTreeSet;

use arrow::array::{Array, AsArray, BooleanArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::error::ArrowError;

// ---------------------------------------------------------------------------
// Row predicate: which values of one column are selected
// ---------------------------------------------------------------------------

/// How a cell is compared against the keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMatch {
    /// Trimmed, case-insensitive text (neighborhood names).
    #[default]
    Label,
    /// Digits only, see [`document_digits`] (owner CPF/CNPJ).
    Digits,
}

/// Reduce a document number to its digits.
///
/// `"017.564.611-34"` and `"01756461134"` agree. A trailing `.0`, left behind
/// when the export typed the column as float, is dropped first. Leading zeros
/// are part of the number and are kept.
pub fn document_digits(raw: &str) -> String {
    let raw = raw.trim();
    let raw = raw.strip_suffix(".0").unwrap_or(raw);
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Row-level predicate pushed down to the reader: keep a row when the value
/// of `column` is one of `keys`.
///
/// An empty key set selects nothing. Null cells never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFilter {
    pub column: String,
    pub keys: BTreeSet<String>,
    pub match_by: KeyMatch,
}

impl KeyFilter {
    pub fn new(column: impl Into<String>, keys: BTreeSet<String>) -> Self {
        Self {
            column: column.into(),
            keys,
            match_by: KeyMatch::Label,
        }
    }

    /// Select the rows whose `column` holds the document `digits`.
    pub fn document(column: impl Into<String>, digits: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            keys: BTreeSet::from([digits.into()]),
            match_by: KeyMatch::Digits,
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self.match_by {
            KeyMatch::Label => self.matches_label(value),
            KeyMatch::Digits => {
                let digits = document_digits(value);
                !digits.is_empty() && self.keys.contains(&digits)
            }
        }
    }

    /// Compare a raw cell the way keys were normalized (trimmed, upper-case).
    fn matches_label(&self, value: &str) -> bool {
        let value = value.trim();
        if self.keys.contains(value) {
            return true;
        }
        // avoid allocating for the common already-upper-case case
        value.chars().any(char::is_lowercase) && self.keys.contains(&value.to_uppercase())
    }

    /// Evaluate the predicate over a whole column.
    ///
    /// Non-string columns are cast to UTF-8 first, so a numeric neighborhood
    /// code still matches its textual key.
    pub fn mask(&self, column: &dyn Array) -> Result<BooleanArray, ArrowError> {
        let utf8;
        let strings = match column.data_type() {
            DataType::Utf8 => column.as_string::<i32>(),
            _ => {
                utf8 = cast(column, &DataType::Utf8)?;
                utf8.as_string::<i32>()
            }
        };
        Ok(strings
            .iter()
            .map(|cell| Some(cell.is_some_and(|v| self.matches(v))))
            .collect())
    }
}
