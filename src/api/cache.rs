//! Caching implementations for the API's record types.

use chrono::{DateTime, Utc};

use crate::cache::Record;

use super::types::{Restaurant, Review};

impl Record for Restaurant {
  fn record_id(&self) -> Option<String> {
    Some(self.id.to_string())
  }

  fn collection() -> &'static str {
    "restaurants"
  }
}

impl Record for Review {
  fn record_id(&self) -> Option<String> {
    self.id.map(|id| id.to_string())
  }

  fn collection() -> &'static str {
    "reviews"
  }

  fn parent_index() -> Option<&'static str> {
    Some("restaurant_id")
  }

  fn stamp(&mut self, at: DateTime<Utc>) {
    self.created_at = Some(at);
    self.updated_at = Some(at);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::review;

  #[test]
  fn test_review_index_field_matches_parent_index() {
    let review = review(1, 7, "Steve");
    let index = Review::parent_index().unwrap();
    assert_eq!(review.field(index).as_deref(), Some("7"));
  }

  #[test]
  fn test_stamp_sets_both_timestamps() {
    let mut review = review(1, 7, "Steve");
    let now = Utc::now();
    review.stamp(now);
    assert_eq!(review.created_at, Some(now));
    assert_eq!(review.updated_at, Some(now));
  }
}
