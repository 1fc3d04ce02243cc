//! HTTP implementation of the remote API contract.

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::cache::Record;
use crate::config::ApiConfig;

use super::{RemoteClient, RemoteError};

/// REST client for the reviews API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpClient {
  client: Client,
  base_url: Url,
}

impl HttpClient {
  pub fn new(config: &ApiConfig) -> Result<Self, RemoteError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    Ok(Self {
      client,
      base_url: normalize_base(&config.url)?,
    })
  }

  fn collection_url(&self, collection: &str) -> Result<Url, RemoteError> {
    Ok(self.base_url.join(collection)?)
  }

  fn parent_url(&self, collection: &str, index: &str, parent_id: &str) -> Result<Url, RemoteError> {
    let mut url = self.collection_url(collection)?;
    url.query_pairs_mut().append_pair(index, parent_id);
    Ok(url)
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RemoteError> {
    debug!(%url, "GET");
    let response = self
      .client
      .get(url)
      .header(header::ACCEPT, "application/json")
      .send()
      .await
      .map_err(RemoteError::from_transport)?;

    Self::read_json(response).await
  }

  /// Map non-2xx statuses to errors and decode the body.
  async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let status = response.status();
    let body = response.text().await.map_err(RemoteError::from_transport)?;

    if !status.is_success() {
      return Err(RemoteError::from_status(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
  }
}

/// Make sure the base URL ends in `/` so joining keeps its path.
fn normalize_base(raw: &str) -> Result<Url, RemoteError> {
  let mut url = Url::parse(raw)?;
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  Ok(url)
}

#[async_trait]
impl RemoteClient for HttpClient {
  async fn fetch_collection<T: Record>(&self) -> Result<Vec<T>, RemoteError> {
    let url = self.collection_url(T::collection())?;
    self.get_json(url).await
  }

  async fn fetch_by_parent<T: Record>(&self, parent_id: &str) -> Result<Vec<T>, RemoteError> {
    let index = T::parent_index().ok_or(RemoteError::NoParentEndpoint(T::collection()))?;
    let url = self.parent_url(T::collection(), index, parent_id)?;
    self.get_json(url).await
  }

  async fn create<T: Record>(&self, record: &T) -> Result<T, RemoteError> {
    let url = self.collection_url(T::collection())?;
    debug!(%url, "POST");
    let response = self
      .client
      .post(url)
      .header(header::ACCEPT, "application/json")
      .json(record)
      .send()
      .await
      .map_err(RemoteError::from_transport)?;

    Self::read_json(response).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{Restaurant, Review};

  fn http_client(url: &str) -> HttpClient {
    HttpClient::new(&ApiConfig {
      url: url.to_string(),
      timeout_secs: 1,
    })
    .unwrap()
  }

  #[test]
  fn test_collection_url_keeps_base_path() {
    let client = http_client("http://localhost:1337/api");
    assert_eq!(
      client.collection_url("restaurants").unwrap().as_str(),
      "http://localhost:1337/api/restaurants"
    );

    let client = http_client("http://localhost:1337");
    assert_eq!(
      client.collection_url("reviews").unwrap().as_str(),
      "http://localhost:1337/reviews"
    );
  }

  #[test]
  fn test_parent_url_encodes_query() {
    let client = http_client("http://localhost:1337/");
    let url = client.parent_url("reviews", "restaurant_id", "4 2").unwrap();
    assert_eq!(url.as_str(), "http://localhost:1337/reviews?restaurant_id=4+2");
  }

  #[test]
  fn test_invalid_base_url() {
    let err = HttpClient::new(&ApiConfig {
      url: "not a url".to_string(),
      timeout_secs: 1,
    })
    .err()
    .unwrap();
    assert!(matches!(err, RemoteError::InvalidUrl(_)));
  }

  #[tokio::test]
  async fn test_parent_fetch_without_index_is_rejected_locally() {
    let client = http_client("http://127.0.0.1:9/");
    let result = client.fetch_by_parent::<Restaurant>("1").await;
    assert!(matches!(
      result,
      Err(RemoteError::NoParentEndpoint("restaurants"))
    ));
  }

  #[tokio::test]
  async fn test_unreachable_server_is_remote_error() {
    // Nothing listens on the discard port
    let client = http_client("http://127.0.0.1:9/");
    let result = client.fetch_by_parent::<Review>("1").await;
    assert!(matches!(
      result,
      Err(RemoteError::Network(_)) | Err(RemoteError::Timeout)
    ));
  }
}
