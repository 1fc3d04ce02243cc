//! Derived views over fetched records, computed by full scan.

use super::traits::Record;
use crate::error::{CacheError, Result};

/// Filter value meaning "don't filter on this field".
pub const ALL: &str = "all";

fn field_matches<T: Record>(record: &T, field: &str, value: &str) -> bool {
  value == ALL || record.field(field).as_deref() == Some(value)
}

/// First record with the given id.
pub fn by_id<T: Record>(records: &[T], id: &str) -> Result<T> {
  records
    .iter()
    .find(|r| r.record_id().as_deref() == Some(id))
    .cloned()
    .ok_or_else(|| CacheError::not_found(T::collection(), id))
}

/// Records whose `field` equals `value`; `ALL` keeps everything.
pub fn by_field<T: Record>(records: Vec<T>, field: &str, value: &str) -> Vec<T> {
  if value == ALL {
    return records;
  }
  records
    .into_iter()
    .filter(|r| field_matches(r, field, value))
    .collect()
}

/// Two equality filters applied in sequence; either may be `ALL`.
pub fn by_two_fields<T: Record>(
  records: Vec<T>,
  (first_field, first_value): (&str, &str),
  (second_field, second_value): (&str, &str),
) -> Vec<T> {
  let records = by_field(records, first_field, first_value);
  by_field(records, second_field, second_value)
}

/// Distinct values of `field` in order of first appearance.
pub fn distinct_values_of<T: Record>(records: &[T], field: &str) -> Vec<String> {
  let mut seen = std::collections::HashSet::new();
  records
    .iter()
    .filter_map(|r| r.field(field))
    .filter(|v| seen.insert(v.clone()))
    .collect()
}
