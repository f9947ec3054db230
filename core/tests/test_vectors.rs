//! Verify error normalization and URL composition against the JSON vectors
//! stored in `test-vectors/`.
//!
//! Query strings are compared as parsed pair lists, not raw strings, so
//! parameter order in the fixture does not produce false negatives.

use notaku_core::{build_url, ClientError, ErrorKind, HttpResponse, QueryParams};
use serde_json::Value;

fn load(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

fn sorted_pairs(query: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    pairs
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn error_vectors() {
    for case in load(include_str!("../../test-vectors/errors.json")) {
        let name = case["name"].as_str().unwrap();
        let response = &case["response"];
        let expected = &case["expected"];

        let status = response["status"].as_u64().unwrap() as u16;
        let err = ClientError::from_response(
            status,
            response["status_text"].as_str().unwrap(),
            response["body"].as_str().unwrap().as_bytes(),
        );

        assert_eq!(err.kind(), ErrorKind::Http, "{name}: kind");
        assert_eq!(
            err.status().map(u64::from),
            expected["status"].as_u64(),
            "{name}: status"
        );
        assert_eq!(err.message(), expected["message"].as_str().unwrap(), "{name}: message");
        assert_eq!(err.code(), expected["code"].as_str(), "{name}: code");
        assert_eq!(err.details(), expected.get("details"), "{name}: details");
    }
}

#[test]
fn error_vectors_through_parse_response() {
    let client = notaku_core::ApiClient::new(
        notaku_core::ClientConfig::with_base_url("http://localhost:8000"),
        std::sync::Arc::new(NoNetwork),
        notaku_core::TokenStore::in_memory(),
    );
    for case in load(include_str!("../../test-vectors/errors.json")) {
        let name = case["name"].as_str().unwrap();
        let response = &case["response"];
        let mut http = HttpResponse::new(
            response["status"].as_u64().unwrap() as u16,
            response["body"].as_str().unwrap().to_string(),
        );
        http.status_text = response["status_text"].as_str().unwrap().to_string();

        let err = client.parse_response(http).unwrap_err();
        assert_eq!(
            err.message(),
            case["expected"]["message"].as_str().unwrap(),
            "{name}: message"
        );
    }
}

struct NoNetwork;

#[async_trait::async_trait]
impl notaku_core::Transport for NoNetwork {
    fn capabilities(&self) -> notaku_core::TransportCapabilities {
        notaku_core::TransportCapabilities::BUFFERED_ONLY
    }

    async fn send(
        &self,
        _request: notaku_core::HttpRequest,
    ) -> Result<HttpResponse, notaku_core::TransportError> {
        Err(notaku_core::TransportError::Connect("no network in vector tests".into()))
    }
}

// ---------------------------------------------------------------------------
// URLs
// ---------------------------------------------------------------------------

#[test]
fn url_vectors() {
    for case in load(include_str!("../../test-vectors/urls.json")) {
        let name = case["name"].as_str().unwrap();
        let params = match &case["params"] {
            Value::Null => None,
            value => Some(QueryParams::from_serialize(value).unwrap()),
        };
        let url = build_url(
            case["base"].as_str().unwrap(),
            case["path"].as_str().unwrap(),
            params.as_ref(),
        );

        if let Some(expected) = case["expected"].as_str() {
            assert_eq!(url, expected, "{name}: url");
            continue;
        }

        let expected_pairs: Vec<(String, String)> =
            serde_json::from_value(case["expected_query"].clone()).unwrap();
        let (_, query) = url
            .split_once('?')
            .unwrap_or_else(|| panic!("{name}: expected a query string in {url}"));
        let mut expected_sorted = expected_pairs;
        expected_sorted.sort();
        assert_eq!(sorted_pairs(query), expected_sorted, "{name}: query");
    }
}

#[test]
fn url_vectors_are_order_independent() {
    for case in load(include_str!("../../test-vectors/urls.json")) {
        let Value::Object(map) = &case["params"] else {
            continue;
        };
        let forward = map.iter().fold(QueryParams::new(), |acc, (k, v)| {
            acc.with(k.as_str(), query_value(v))
        });
        let reverse = map.iter().rev().fold(QueryParams::new(), |acc, (k, v)| {
            acc.with(k.as_str(), query_value(v))
        });

        let base = case["base"].as_str().unwrap();
        let path = case["path"].as_str().unwrap();
        let a = build_url(base, path, Some(&forward));
        let b = build_url(base, path, Some(&reverse));
        let query = |url: &str| sorted_pairs(url.split_once('?').map_or("", |(_, q)| q));
        assert_eq!(query(&a), query(&b), "{}", case["name"]);
    }
}

fn query_value(value: &Value) -> notaku_core::QueryValue {
    match value {
        Value::Null => notaku_core::QueryValue::Null,
        Value::String(s) => s.as_str().into(),
        Value::Array(items) => notaku_core::QueryValue::List(
            items
                .iter()
                .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                .collect(),
        ),
        other => notaku_core::QueryValue::Scalar(other.to_string()),
    }
}
