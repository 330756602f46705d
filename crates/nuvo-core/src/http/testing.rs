//! In-memory transport for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

#[derive(Debug, Clone)]
enum MockReply {
    Respond(HttpResponse),
    Fail,
}

/// Serves canned replies per URL.
///
/// Replies queued for a URL are served in order; the last one repeats. A
/// reply carrying an ETag answers 304 when the request presents that ETag.
/// Unknown URLs answer 404.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
    route_delays: Mutex<HashMap<String, Duration>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Hold replies for `url` back by `delay`, on top of any global delay.
    pub(crate) fn delay_route(&self, url: &str, delay: Duration) {
        self.route_delays
            .lock()
            .unwrap()
            .insert(url.to_string(), delay);
    }

    fn push(&self, url: &str, reply: MockReply) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn json(&self, url: &str, body: impl Into<String>) {
        self.push(
            url,
            MockReply::Respond(HttpResponse::new(StatusCode::OK, body.into())),
        );
    }

    pub(crate) fn json_with_etag(&self, url: &str, body: impl Into<String>, etag: &str) {
        self.push(
            url,
            MockReply::Respond(HttpResponse::new(StatusCode::OK, body.into()).with_etag(etag)),
        );
    }

    pub(crate) fn status(&self, url: &str, status: StatusCode) {
        self.push(url, MockReply::Respond(HttpResponse::new(status, Vec::new())));
    }

    pub(crate) fn fail(&self, url: &str) {
        self.push(url, MockReply::Fail);
    }

    pub(crate) fn requests_for(&self, url: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.as_str() == url)
            .cloned()
            .collect()
    }

    pub(crate) fn hits(&self, url: &str) -> usize {
        self.requests_for(url).len()
    }

    fn next_reply(&self, url: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut key = request.url.clone();
        key.set_fragment(None);

        let route_delay = self.route_delays.lock().unwrap().get(key.as_str()).copied();
        if let Some(delay) = route_delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(key.as_str()) {
            None => Ok(HttpResponse::new(StatusCode::NOT_FOUND, Vec::new())),
            Some(MockReply::Fail) => Err(TransportError::Connect("connection refused".to_string())),
            Some(MockReply::Respond(response)) => {
                let unchanged = response.etag.is_some() && response.etag == request.if_none_match;
                if unchanged {
                    Ok(HttpResponse::new(StatusCode::NOT_MODIFIED, Vec::new()))
                } else {
                    Ok(response)
                }
            }
        }
    }
}
