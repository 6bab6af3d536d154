//! In-memory [`Transport`] for exercising the client without a server.
//!
//! Responses are served from a FIFO script first, then from fixed routes,
//! and finally fall back to a 404. Every request is recorded.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ClientError, ClientResult};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};

#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<ClientResult<HttpResponse>>>,
    routes: Mutex<Vec<(Method, String, HttpResponse)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: HttpResponse) {
        self.script.lock().push_back(Ok(response));
    }

    pub fn respond(&self, status: u16, body: &str) {
        self.push(HttpResponse::new(status, body));
    }

    pub fn fail_transport(&self, message: &str) {
        self.script
            .lock()
            .push_back(Err(ClientError::Transport(message.to_string())));
    }

    /// Answers every unscripted `method path` request with `status`/`body`.
    pub fn route(&self, method: Method, path: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .push((method, path.to_string(), HttpResponse::new(status, body)));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        let routed = self
            .routes
            .lock()
            .iter()
            .find(|(method, path, _)| *method == request.method && *path == request.path)
            .map(|(_, _, response)| response.clone());
        self.requests.lock().push(request);

        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }
        Ok(routed.unwrap_or_else(|| HttpResponse::new(404, r#"{"detail":"Not Found"}"#)))
    }
}
