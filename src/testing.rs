//! Test fixtures: record builders and an in-process fake of the remote API.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::api::types::{Restaurant, Review};
use crate::api::{RemoteClient, RemoteError};
use crate::cache::Record;

pub fn restaurant(id: u64, name: &str, neighborhood: &str, cuisine: &str) -> Restaurant {
  Restaurant {
    id,
    name: name.to_string(),
    neighborhood: neighborhood.to_string(),
    cuisine_type: cuisine.to_string(),
    address: format!("{} Main St", id),
    photograph: Some(format!("{}.jpg", id)),
    latlng: None,
    operating_hours: Default::default(),
    extra: Map::new(),
  }
}

pub fn review(id: u64, restaurant_id: u64, name: &str) -> Review {
  Review {
    id: Some(id),
    ..Review::draft(restaurant_id, name, 4, "Solid")
  }
}

/// Remote API double keeping collections as JSON, like the real server.
pub struct FakeRemote {
  collections: Mutex<HashMap<&'static str, Vec<Value>>>,
  offline: AtomicBool,
  fetches: AtomicUsize,
  creates: AtomicUsize,
  next_id: AtomicU64,
  rejected: Mutex<Vec<(&'static str, String)>>,
}

impl FakeRemote {
  pub fn new() -> Self {
    Self {
      collections: Mutex::new(HashMap::new()),
      offline: AtomicBool::new(false),
      fetches: AtomicUsize::new(0),
      creates: AtomicUsize::new(0),
      next_id: AtomicU64::new(100),
      rejected: Mutex::new(Vec::new()),
    }
  }

  pub fn with<T: Record>(self, records: Vec<T>) -> Self {
    let values = records
      .iter()
      .map(|r| serde_json::to_value(r).unwrap())
      .collect();
    self
      .collections
      .lock()
      .unwrap()
      .insert(T::collection(), values);
    self
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Answer 422 to creates whose `field` equals `value`.
  pub fn reject(&self, field: &'static str, value: &str) {
    self
      .rejected
      .lock()
      .unwrap()
      .push((field, value.to_string()));
  }

  pub fn fetch_count(&self) -> usize {
    self.fetches.load(Ordering::SeqCst)
  }

  pub fn create_count(&self) -> usize {
    self.creates.load(Ordering::SeqCst)
  }

  /// Records the server currently holds for a collection.
  pub fn stored<T: Record>(&self) -> Vec<T> {
    self
      .collections
      .lock()
      .unwrap()
      .get(T::collection())
      .map(|values| {
        values
          .iter()
          .map(|v| serde_json::from_value(v.clone()).unwrap())
          .collect()
      })
      .unwrap_or_default()
  }

  fn check_online(&self) -> Result<(), RemoteError> {
    if self.offline.load(Ordering::SeqCst) {
      Err(RemoteError::Status {
        status: 503,
        body: "offline".to_string(),
      })
    } else {
      Ok(())
    }
  }
}

#[async_trait]
impl RemoteClient for FakeRemote {
  async fn fetch_collection<T: Record>(&self) -> Result<Vec<T>, RemoteError> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    self.check_online()?;
    Ok(self.stored())
  }

  async fn fetch_by_parent<T: Record>(&self, parent_id: &str) -> Result<Vec<T>, RemoteError> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    self.check_online()?;
    let index = T::parent_index().unwrap();
    Ok(
      self
        .stored::<T>()
        .into_iter()
        .filter(|r| r.field(index).as_deref() == Some(parent_id))
        .collect(),
    )
  }

  async fn create<T: Record>(&self, record: &T) -> Result<T, RemoteError> {
    self.creates.fetch_add(1, Ordering::SeqCst);
    self.check_online()?;

    let rejected = self
      .rejected
      .lock()
      .unwrap()
      .iter()
      .any(|(field, value)| record.field(field).as_deref() == Some(value.as_str()));
    if rejected {
      return Err(RemoteError::Status {
        status: 422,
        body: "rejected".to_string(),
      });
    }

    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
    let mut value = serde_json::to_value(record).unwrap();
    value
      .as_object_mut()
      .unwrap()
      .insert("id".to_string(), Value::from(id));

    self
      .collections
      .lock()
      .unwrap()
      .entry(T::collection())
      .or_default()
      .push(value.clone());

    Ok(serde_json::from_value(value).unwrap())
  }
}
