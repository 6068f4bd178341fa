//! Keep the most recent version of every key in a batch.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use newsflow_core::{project, Record, SchemaError, Value};

/// A column tuple ordered lexicographically with [`Value::sort_cmp`].
struct Tuple(Vec<Value>);

impl Tuple {
    fn of(record: &Record, columns: &[String]) -> Result<Self, SchemaError> {
        project(record, columns)
            .map(|values| Tuple(values.into_iter().cloned().collect()))
            .map_err(|missing| SchemaError::MissingColumn(missing.to_string()))
    }
}

impl Ord for Tuple {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(&other.0) {
            match a.sort_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl PartialOrd for Tuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Tuple {}

/// Reduce `batch` to one record per `keys` tuple.
///
/// The batch is stably sorted by `tie_breaks` ascending (nulls last) and the
/// last record seen for each key wins. With no tie-break columns the last
/// record in input order wins. When two records share both key and
/// tie-break values, the one later in the input wins.
///
/// Output follows the first appearance of each key in the sorted sequence.
pub fn dedupe(
    batch: Vec<Record>,
    keys: &[String],
    tie_breaks: &[String],
) -> Result<Vec<Record>, SchemaError> {
    let mut rows = Vec::with_capacity(batch.len());
    for record in batch {
        let key = Tuple::of(&record, keys)?;
        let tie = Tuple::of(&record, tie_breaks)?;
        rows.push((key, tie, record));
    }

    if !tie_breaks.is_empty() {
        rows.sort_by(|a, b| a.1.cmp(&b.1));
    }

    let mut slot_of: BTreeMap<Tuple, usize> = BTreeMap::new();
    let mut kept: Vec<Record> = Vec::new();
    for (key, _, record) in rows {
        match slot_of.entry(key) {
            Entry::Occupied(slot) => kept[*slot.get()] = record,
            Entry::Vacant(slot) => {
                slot.insert(kept.len());
                kept.push(record);
            }
        }
    }
    Ok(kept)
}
