use indexmap::IndexMap;

use crate::value::Value;

/// A normalized row: column name → typed value, in schema order.
pub type Record = IndexMap<String, Value>;

/// A flat JSON object as produced by a source fetcher, before normalization.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Build a [`Record`] from `column => value` pairs.
///
/// ```
/// use newsflow_core::{record, Value};
///
/// let r = record! { "id" => "t5-a1", "score" => 3i64 };
/// assert_eq!(r["score"], Value::Int64(3));
/// ```
#[macro_export]
macro_rules! record {
    ($($col:expr => $val:expr),* $(,)?) => {{
        let mut r = $crate::Record::new();
        $( r.insert(($col).to_string(), $crate::Value::from($val)); )*
        r
    }};
}

/// Project the values of `columns` out of `record`, in column order.
///
/// Returns the first missing column name on failure.
pub fn project<'a>(record: &'a Record, columns: &'a [String]) -> Result<Vec<&'a Value>, &'a str> {
    columns
        .iter()
        .map(|c| record.get(c).ok_or(c.as_str()))
        .collect()
}
