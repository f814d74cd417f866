//! HTTP remote fetcher.
//!
//! This module maps fetcher calls onto a JSON REST API. The actual HTTP
//! client is abstracted via a trait so callers can bring their own library
//! and attach authentication there.

use crate::error::{RemoteError, RemoteResult};
use crate::fetcher::{Mutation, RemoteFetcher};
use crate::request::{FetchRequest, Method, MutationRequest};
use cachesync_model::{Entity, KindSpec};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

/// Field carrying nested items in [`Entity`] bodies.
const ITEMS_FIELD: &str = "items";

/// An HTTP request ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: Url,
    /// JSON body, for creates and updates.
    pub body: Option<Vec<u8>>,
}

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport, including
/// authentication headers. An `Err` means no response was received.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// HTTP-based remote fetcher.
///
/// Collection responses are JSON objects keyed by the kind name
/// (`{"dashboards": [...]}`); nested items arrive under the configured
/// nested field and are moved to `items`.
pub struct HttpFetcher<C: HttpClient> {
    /// Base URL of the API (e.g., "https://play.example.org/api/").
    base_url: Url,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpFetcher<C> {
    /// Creates a new HTTP fetcher.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL that can carry
    /// a path.
    pub fn new(base_url: &str, client: C) -> RemoteResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| RemoteError::malformed(format!("invalid base URL {base_url}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::malformed(format!(
                "base URL {base_url} cannot carry a path"
            )));
        }
        Ok(Self {
            base_url,
            client,
            last_error: RwLock::new(None),
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the message of the last failed call.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Builds the URL of a fetch request.
    pub fn fetch_url(&self, request: &FetchRequest) -> RemoteResult<Url> {
        let mut url = self.url_for(request.path_segments())?;
        url.query_pairs_mut().extend_pairs(request.query_pairs());
        Ok(url)
    }

    fn url_for(&self, segments: &[String]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::malformed("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn execute(&self, request: HttpRequest) -> RemoteResult<Vec<u8>> {
        let method = request.method;
        let url = request.url.to_string();
        debug!(%method, %url, "sending request");

        let result = match self.client.send(request) {
            Ok(response) if response.is_success() => Ok(response.body),
            Ok(response) => Err(RemoteError::api(
                response.status,
                String::from_utf8_lossy(&response.body).into_owned(),
            )),
            Err(message) => Err(RemoteError::network(message)),
        };

        match &result {
            Ok(_) => *self.last_error.write() = None,
            Err(err) => {
                warn!(%method, %url, error = %err, "request failed");
                *self.last_error.write() = Some(err.to_string());
            }
        }
        result
    }

    fn get(&self, request: &FetchRequest) -> RemoteResult<Value> {
        let body = self.execute(HttpRequest {
            method: Method::Get,
            url: self.fetch_url(request)?,
            body: None,
        })?;
        serde_json::from_slice(&body).map_err(|err| RemoteError::malformed(err.to_string()))
    }
}

impl<C: HttpClient> RemoteFetcher for HttpFetcher<C> {
    fn fetch_collection(
        &self,
        spec: &KindSpec,
        ids: &[String],
        expand: bool,
    ) -> RemoteResult<Vec<Entity>> {
        let value = self.get(&FetchRequest::collection(spec, ids, expand))?;
        let items = match value {
            Value::Object(mut object) => match object.remove(spec.kind().as_str()) {
                Some(Value::Array(items)) => items,
                Some(_) | None => {
                    return Err(RemoteError::malformed(format!(
                        "response has no {} array",
                        spec.kind()
                    )))
                }
            },
            Value::Array(items) => items,
            _ => return Err(RemoteError::malformed("collection response is not an object")),
        };
        items.into_iter().map(|item| decode_entity(spec, item)).collect()
    }

    fn fetch_item(&self, spec: &KindSpec, id: &str) -> RemoteResult<Entity> {
        let value = self.get(&FetchRequest::item(spec, id))?;
        decode_entity(spec, value)
    }

    fn mutate(&self, spec: &KindSpec, mutation: &Mutation) -> RemoteResult<()> {
        let target = MutationRequest::for_mutation(spec, mutation);
        let body = match mutation {
            Mutation::Create(entity) | Mutation::Update(entity) => {
                Some(encode_entity(spec, entity)?)
            }
            Mutation::Delete { .. } | Mutation::DeleteNested { .. } => None,
        };
        self.execute(HttpRequest {
            method: target.method,
            url: self.url_for(&target.path)?,
            body,
        })?;
        Ok(())
    }
}

/// Decodes a remote body, moving nested items from the wire field to `items`.
fn decode_entity(spec: &KindSpec, value: Value) -> RemoteResult<Entity> {
    let mut object = into_object(value)?;
    if let Some(nested) = spec.nested() {
        if nested.field != ITEMS_FIELD {
            if let Some(items) = object.remove(&nested.field) {
                object.insert(ITEMS_FIELD.to_string(), items);
            }
        }
    }
    serde_json::from_value(Value::Object(object))
        .map_err(|err| RemoteError::malformed(format!("{}: {err}", spec.kind())))
}

/// Encodes a body for the wire, the reverse of [`decode_entity`].
fn encode_entity(spec: &KindSpec, entity: &Entity) -> RemoteResult<Vec<u8>> {
    let value = serde_json::to_value(entity).map_err(|err| RemoteError::malformed(err.to_string()))?;
    let mut object = into_object(value)?;
    if let Some(nested) = spec.nested() {
        if nested.field != ITEMS_FIELD {
            if let Some(items) = object.remove(ITEMS_FIELD) {
                object.insert(nested.field.clone(), items);
            }
        }
    }
    serde_json::to_vec(&object).map_err(|err| RemoteError::malformed(err.to_string()))
}

fn into_object(value: Value) -> RemoteResult<Map<String, Value>> {
    match value {
        Value::Object(object) => Ok(object),
        other => Err(RemoteError::malformed(format!(
            "expected an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct TestClient {
        response: Mutex<Option<Result<HttpResponse, String>>>,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn respond(&self, status: u16, body: &str) {
            *self.response.lock().unwrap() = Some(Ok(HttpResponse::new(status, body)));
        }

        fn fail(&self, message: &str) {
            *self.response.lock().unwrap() = Some(Err(message.to_string()));
        }

        fn last_sent(&self) -> HttpRequest {
            self.sent.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl HttpClient for &TestClient {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
            self.sent.lock().unwrap().push(request);
            self.response
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err("No response set".into()))
        }
    }

    fn dashboards() -> KindSpec {
        KindSpec::owning("dashboards", "dashboardItems", "dashboardItems")
    }

    #[test]
    fn rejects_relative_base_url() {
        let client = TestClient::new();
        assert!(HttpFetcher::new("api/", &client).is_err());
    }

    #[test]
    fn collection_url_carries_projection_and_filters() {
        let client = TestClient::new();
        client.respond(200, r#"{"dashboards": []}"#);
        let fetcher = HttpFetcher::new("https://play.example.org/api/", &client).unwrap();

        fetcher
            .fetch_collection(&dashboards(), &["d1".to_string()], false)
            .unwrap();

        let url = client.last_sent().url;
        assert_eq!(url.path(), "/api/dashboards");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("paging".into(), "false".into()));
        assert!(pairs[1].1.starts_with("id,created,lastUpdated,name,displayName,dashboardItems["));
        assert_eq!(pairs[2], ("filter".into(), "id:eq:d1".into()));
    }

    #[test]
    fn nested_field_is_decoded_into_items() {
        let client = TestClient::new();
        client.respond(
            200,
            r#"{"dashboards": [{
                "id": "d1", "name": "Main", "lastUpdated": "2015-01-20T10:44:04.312+0000",
                "dashboardItems": [{"id": "i1", "lastUpdated": "2015-01-20T10:44:04.312+0000"}]
            }]}"#,
        );
        let fetcher = HttpFetcher::new("https://play.example.org/api/", &client).unwrap();

        let entities = fetcher.fetch_collection(&dashboards(), &[], true).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].nested().len(), 1);
        assert_eq!(entities[0].nested()[0].id, "i1");
        assert!(!entities[0].fields.contains_key("dashboardItems"));
    }

    #[test]
    fn update_sends_wire_field_name() {
        let client = TestClient::new();
        client.respond(200, "");
        let fetcher = HttpFetcher::new("https://play.example.org/api", &client).unwrap();

        let entity = Entity::new("d1", "Main").with_items(vec![Entity::new("i1", "Chart")]);
        fetcher
            .mutate(&dashboards(), &Mutation::Update(entity))
            .unwrap();

        let sent = client.last_sent();
        assert_eq!(sent.method, Method::Put);
        assert_eq!(sent.url.path(), "/api/dashboards/d1");
        let body: Value = serde_json::from_slice(&sent.body.unwrap()).unwrap();
        assert!(body.get("dashboardItems").is_some());
        assert!(body.get("items").is_none());
    }

    #[test]
    fn error_status_maps_to_api_error() {
        let client = TestClient::new();
        client.respond(409, "conflict");
        let fetcher = HttpFetcher::new("https://play.example.org/api/", &client).unwrap();

        let err = fetcher
            .mutate(&dashboards(), &Mutation::Delete { id: "d1".into() })
            .unwrap_err();
        assert_eq!(err, RemoteError::api(409, "conflict"));
        assert!(fetcher.last_error().is_some());
    }

    #[test]
    fn client_failure_maps_to_network_error() {
        let client = TestClient::new();
        client.fail("connection refused");
        let fetcher = HttpFetcher::new("https://play.example.org/api/", &client).unwrap();

        let err = fetcher.fetch_item(&dashboards(), "d1").unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));
    }

    #[test]
    fn malformed_body_is_reported() {
        let client = TestClient::new();
        client.respond(200, r#"{"charts": []}"#);
        let fetcher = HttpFetcher::new("https://play.example.org/api/", &client).unwrap();

        let err = fetcher.fetch_collection(&dashboards(), &[], false).unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }
}
