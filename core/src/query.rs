//! URL builder: base + path + query parameters.
//!
//! Null values are dropped and sequence values become one `key=value` entry
//! per element, in order. Encoding follows `application/x-www-form-urlencoded`
//! rules (spaces become `+`).

use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;

use crate::error::ClientError;

/// A single query parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// Omitted from the built URL.
    Null,
    Scalar(String),
    /// Expanded into repeated keys.
    List(Vec<String>),
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Scalar(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Scalar(value)
    }
}

impl From<&String> for QueryValue {
    fn from(value: &String) -> Self {
        QueryValue::Scalar(value.clone())
    }
}

macro_rules! scalar_from {
    ($($t:ty),*) => {
        $(impl From<$t> for QueryValue {
            fn from(value: $t) -> Self {
                QueryValue::Scalar(value.to_string())
            }
        })*
    };
}

scalar_from!(bool, i32, i64, u8, u16, u32, u64, usize, f64);

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(QueryValue::Null, Into::into)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        QueryValue::List(values)
    }
}

impl From<&[&str]> for QueryValue {
    fn from(values: &[&str]) -> Self {
        QueryValue::List(values.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[String]> for QueryValue {
    fn from(values: &[String]) -> Self {
        QueryValue::List(values.to_vec())
    }
}

/// Ordered query parameter map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, QueryValue)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Flatten a serializable filter struct into parameters.
    ///
    /// The value must serialize to a JSON object. Nested objects are sent as
    /// their JSON text; `null` elements inside arrays are skipped.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(value).map_err(ClientError::encode)?;
        let Value::Object(map) = value else {
            return Err(ClientError::encode("query parameters must be an object"));
        };
        let entries = map
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::Null => QueryValue::Null,
                    Value::Array(items) => {
                        QueryValue::List(items.iter().filter_map(scalar_text).collect())
                    }
                    other => scalar_text(&other).map_or(QueryValue::Null, QueryValue::Scalar),
                };
                (key, value)
            })
            .collect();
        Ok(Self { entries })
    }

    /// True when no entry would be emitted.
    pub fn is_empty(&self) -> bool {
        self.pairs().next().is_none()
    }

    /// The `(key, value)` pairs that end up in the URL.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(key, value)| {
            let values: Vec<&str> = match value {
                QueryValue::Null => Vec::new(),
                QueryValue::Scalar(v) => vec![v.as_str()],
                QueryValue::List(vs) => vs.iter().map(String::as_str).collect(),
            };
            values.into_iter().map(move |v| (key.as_str(), v))
        })
    }

    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.pairs() {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Compose `base`, `path` and `params` into a request URL.
///
/// An absolute `path` (with an http(s) scheme) replaces the base.
pub fn build_url(base: &str, path: &str, params: Option<&QueryParams>) -> String {
    let mut url = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.is_empty() {
        base.trim_end_matches('/').to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), path)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    };

    if let Some(params) = params.filter(|p| !p.is_empty()) {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&params.to_query_string());
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn query_set(url: &str) -> BTreeSet<(String, String)> {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
        form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn no_params_means_no_question_mark() {
        assert_eq!(
            build_url("http://api.test/", "/health", None),
            "http://api.test/health"
        );
        assert_eq!(
            build_url("http://api.test", "health", Some(&QueryParams::new())),
            "http://api.test/health"
        );
    }

    #[test]
    fn null_values_are_dropped() {
        let params = QueryParams::new()
            .with("page", 2)
            .with("search", None::<String>)
            .with("tag", QueryValue::Null);
        assert_eq!(
            build_url("http://api.test", "/api/v1/notes", Some(&params)),
            "http://api.test/api/v1/notes?page=2"
        );
    }

    #[test]
    fn lists_expand_into_repeated_keys_in_order() {
        let params = QueryParams::new().with("tags", &["work", "home", "work"][..]);
        assert_eq!(
            build_url("http://api.test", "/n", Some(&params)),
            "http://api.test/n?tags=work&tags=home&tags=work"
        );
    }

    #[test]
    fn all_null_params_leave_url_bare() {
        let params = QueryParams::new().with("a", None::<u32>);
        assert!(params.is_empty());
        assert_eq!(build_url("http://api.test", "/n", Some(&params)), "http://api.test/n");
    }

    #[test]
    fn values_are_form_encoded() {
        let params = QueryParams::new().with("search", "rent & bills");
        assert_eq!(
            build_url("http://api.test", "/n", Some(&params)),
            "http://api.test/n?search=rent+%26+bills"
        );
    }

    #[test]
    fn insertion_order_does_not_change_pair_set() {
        let a = QueryParams::new()
            .with("page", 1)
            .with("tags", vec!["x".to_string(), "y".to_string()])
            .with("q", "milk");
        let b = QueryParams::new()
            .with("q", "milk")
            .with("tags", vec!["x".to_string(), "y".to_string()])
            .with("page", 1);
        let url_a = build_url("http://api.test", "/n", Some(&a));
        let url_b = build_url("http://api.test", "/n", Some(&b));
        assert_eq!(query_set(&url_a), query_set(&url_b));
        assert_eq!(query_set(&url_a).len(), 4);
    }

    #[test]
    fn existing_query_is_extended() {
        let params = QueryParams::new().with("b", 2);
        assert_eq!(
            build_url("http://api.test", "/n?a=1", Some(&params)),
            "http://api.test/n?a=1&b=2"
        );
    }

    #[test]
    fn absolute_path_replaces_base() {
        assert_eq!(
            build_url("http://api.test", "https://ocr.test/process", None),
            "https://ocr.test/process"
        );
    }

    #[test]
    fn from_serialize_flattens_struct() {
        #[derive(Serialize)]
        struct Filter {
            page: u32,
            search: Option<String>,
            tags: Vec<String>,
            archived: bool,
        }
        let params = QueryParams::from_serialize(&Filter {
            page: 3,
            search: None,
            tags: vec!["a".into(), "b".into()],
            archived: false,
        })
        .unwrap();
        let pairs: BTreeSet<(&str, &str)> = params.pairs().collect();
        let expected: BTreeSet<(&str, &str)> =
            [("page", "3"), ("tags", "a"), ("tags", "b"), ("archived", "false")]
                .into_iter()
                .collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn from_serialize_rejects_non_objects() {
        assert!(QueryParams::from_serialize(&vec![1, 2]).is_err());
    }
}
