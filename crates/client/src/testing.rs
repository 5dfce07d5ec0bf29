//! Test doubles shared by the pipeline, lifecycle and service tests.

use crate::fetch::Upstream;
use crate::http::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use spellcache_core::{CacheEntry, CacheStore, Error, RequestKey};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub const API: &str = "https://demo.supabase.co/rest/v1";
pub const ORIGIN: &str = "http://localhost:5173";

/// Upstream answering every request with a JSON body naming the URL and call number.
pub struct ScriptedUpstream {
    online: AtomicBool,
    calls: Mutex<Vec<(Method, String)>>,
    statuses: Mutex<HashMap<String, StatusCode>>,
    too_large: Mutex<HashSet<String>>,
    answer_not_modified: AtomicBool,
    gate: watch::Sender<bool>,
}

impl ScriptedUpstream {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            online: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            too_large: Mutex::new(HashSet::new()),
            answer_not_modified: AtomicBool::new(false),
            gate,
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Park every fetch until [`ScriptedUpstream::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn respond_status(&self, url: &str, status: StatusCode) {
        self.statuses.lock().unwrap().insert(url.to_string(), status);
    }

    /// Fail fetches of `url` with `FETCH_TOO_LARGE` while staying online.
    pub fn reject_too_large(&self, url: &str) {
        self.too_large.lock().unwrap().insert(url.to_string());
    }

    /// Answer 304 with an empty body to any request carrying a validator.
    pub fn honor_validators(&self) {
        self.answer_not_modified.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(_, u)| u == url).count()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((request.method.clone(), request.url.clone()));
            calls.len()
        };

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::NetworkUnavailable("scripted outage".into()));
        }
        if self.too_large.lock().unwrap().contains(&request.url) {
            return Err(Error::FetchTooLarge("scripted oversize body".into()));
        }
        let conditional = request.headers.contains_key(header::IF_NONE_MATCH)
            || request.headers.contains_key(header::IF_MODIFIED_SINCE);
        if conditional && self.answer_not_modified.load(Ordering::SeqCst) {
            return Ok(HttpResponse::new(StatusCode::NOT_MODIFIED, HeaderMap::new(), Vec::new()));
        }

        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(&request.url)
            .copied()
            .unwrap_or(StatusCode::OK);

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = serde_json::json!({"url": request.url, "call": call});
        Ok(HttpResponse::new(status, headers, serde_json::to_vec(&body).unwrap()))
    }
}

/// Store whose every operation fails.
pub struct BrokenStore;

fn broken() -> Error {
    Error::CorruptEntry("store unavailable".into())
}

#[async_trait]
impl CacheStore for BrokenStore {
    async fn open(&self, _namespace: &str) -> Result<(), Error> {
        Err(broken())
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        Err(broken())
    }

    async fn remove(&self, _namespace: &str) -> Result<bool, Error> {
        Err(broken())
    }

    async fn lookup(&self, _namespace: &str, _key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        Err(broken())
    }

    async fn put(&self, _namespace: &str, _entry: &CacheEntry) -> Result<(), Error> {
        Err(broken())
    }

    async fn delete(&self, _namespace: &str, _key: &RequestKey) -> Result<bool, Error> {
        Err(broken())
    }

    async fn keys(&self, _namespace: &str) -> Result<Vec<RequestKey>, Error> {
        Err(broken())
    }
}

/// Body of a response produced by [`ScriptedUpstream`] or the offline responder.
pub fn body_json(response: &HttpResponse) -> serde_json::Value {
    serde_json::from_slice(&response.body).unwrap()
}
