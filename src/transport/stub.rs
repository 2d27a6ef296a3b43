//! In-process transport for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{HttpReply, Transport};
use crate::models::SearchResult;

type Responder = dyn Fn(&str, &HashMap<String, Vec<String>>) -> HttpReply + Send + Sync;

/// Answers every request from a closure and records the requested URLs
pub struct StubTransport {
    responder: Box<Responder>,
    urls: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl StubTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &HashMap<String, Vec<String>>) -> HttpReply + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            urls: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    /// Reply with the same JSON document to every request
    pub fn json(body: Value) -> Self {
        let body = body.to_string();
        Self::new(move |_, _| HttpReply::ok(body.clone()))
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    pub fn last_params(&self) -> HashMap<String, Vec<String>> {
        self.urls.lock().last().map(|u| query_params(u)).unwrap_or_default()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Decode the query string of a URL into `key -> [values]`.
/// `key!=value` segments are recorded under `key!`.
pub fn query_params(url: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
    for segment in query.split('&').filter(|s| !s.is_empty()) {
        let (key, value) = match segment.split_once("!=") {
            Some((k, v)) => (format!("{}!", k), v),
            None => match segment.split_once('=') {
                Some((k, v)) => (k.to_string(), v),
                None => (segment.to_string(), ""),
            },
        };
        let key = urlencoding::decode(&key)
            .map(|k| k.into_owned())
            .unwrap_or_else(|_| key.clone());
        let value = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        params.entry(key).or_default().push(value);
    }
    params
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> SearchResult<HttpReply> {
        self.urls.lock().push(url.to_string());
        let params = query_params(url);
        Ok((self.responder)(url, &params))
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params() {
        let params = query_params("http://x/search?model=A&model=B&experiment!=historical&query=sea%20ice");
        assert_eq!(params["model"], vec!["A", "B"]);
        assert_eq!(params["experiment!"], vec!["historical"]);
        assert_eq!(params["query"], vec!["sea ice"]);
    }
}
