// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scripted transport for unit tests.
//
// Replies are queued per endpoint path (URL without base and query). The
// last queued reply for an endpoint repeats forever; endpoints without a
// script answer 404.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use moonpost_core::error::{MoonpostError, Result};

use crate::http::{HttpRequest, HttpResponse, HttpTransport, ProgressFn};

#[derive(Debug, Clone)]
enum Scripted {
    Reply(u16, String),
    Fail(String),
}

#[derive(Default)]
pub struct ScriptedTransport {
    base: Mutex<Option<String>>,
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, endpoint: &str, item: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(item);
    }

    pub fn reply(&self, endpoint: &str, status: u16, body: &str) {
        self.push(endpoint, Scripted::Reply(status, body.to_string()));
    }

    pub fn reply_json(&self, endpoint: &str, body: serde_json::Value) {
        self.reply(endpoint, 200, &body.to_string());
    }

    pub fn fail(&self, endpoint: &str, message: &str) {
        self.push(endpoint, Scripted::Fail(message.to_string()));
    }

    /// Every request sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose endpoint path equals `endpoint`.
    pub fn requests_to(&self, endpoint: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| self.endpoint_of(&r.url) == endpoint)
            .collect()
    }

    fn endpoint_of(&self, url: &str) -> String {
        let without_query = url.split('?').next().unwrap_or(url);
        let base = self.base.lock().unwrap().clone();
        match base {
            Some(base) => without_query
                .strip_prefix(&base)
                .unwrap_or(without_query)
                .to_string(),
            None => without_query.to_string(),
        }
    }

    fn next_for(&self, endpoint: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(endpoint)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        request: HttpRequest,
        progress: Option<ProgressFn>,
    ) -> Result<HttpResponse> {
        {
            // Base URL is everything up to the third slash of the first request.
            let mut base = self.base.lock().unwrap();
            if base.is_none() {
                let end = request
                    .url
                    .match_indices('/')
                    .nth(2)
                    .map_or(request.url.len(), |(i, _)| i + 1);
                *base = Some(request.url[..end].to_string());
            }
        }

        let endpoint = self.endpoint_of(&request.url);
        let operation = request.operation;
        let total = request.body.len() as u64;
        self.requests.lock().unwrap().push(request);

        match self.next_for(&endpoint) {
            Some(Scripted::Reply(status, body)) => {
                if let Some(progress) = progress {
                    progress(total / 2, total);
                    progress(total, total);
                }
                Ok(HttpResponse {
                    status,
                    body: body.into_bytes(),
                })
            }
            Some(Scripted::Fail(message)) => Err(MoonpostError::transport(operation, message)),
            None => Ok(HttpResponse {
                status: 404,
                body: b"Not Found".to_vec(),
            }),
        }
    }
}
