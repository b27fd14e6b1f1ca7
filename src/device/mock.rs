//! Scripted [`DeviceApi`] for deterministic tests.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{DeviceApi, DeviceError, Target};

/// Record of a mock request.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub path: String,
    pub method: Method,
}

#[derive(Debug, Default)]
struct MockState {
    /// Queued replies per path; the last one repeats once the queue is drained.
    replies: HashMap<String, VecDeque<Result<Value, DeviceError>>>,
    requests: Vec<RequestRecord>,
}

/// Mock device that answers from per-path scripts.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for `path`.
    pub fn reply(self, path: &str, reply: Result<Value, DeviceError>) -> Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Number of requests made to `path`.
    pub fn calls(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl DeviceApi for MockDevice {
    async fn request(
        &self,
        _target: &Target,
        path: &str,
        method: Method,
        timeout: Duration,
    ) -> Result<Value, DeviceError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(RequestRecord {
            path: path.to_string(),
            method,
        });

        match state.replies.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Err(DeviceError::Timeout(timeout))),
            Some(queue) => queue.front().cloned().unwrap_or(Err(DeviceError::Timeout(timeout))),
            None => Err(DeviceError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_replays_script_and_counts_calls() {
        let device = MockDevice::new()
            .reply("/a", Ok(json!(1)))
            .reply("/a", Ok(json!(2)));
        let target = Target::new("h", "k");
        let t = Duration::from_secs(1);

        assert_eq!(device.request(&target, "/a", Method::GET, t).await, Ok(json!(1)));
        assert_eq!(device.request(&target, "/a", Method::GET, t).await, Ok(json!(2)));
        // Last reply repeats.
        assert_eq!(device.request(&target, "/a", Method::GET, t).await, Ok(json!(2)));
        assert_eq!(device.request(&target, "/b", Method::PUT, t).await, Err(DeviceError::Timeout(t)));

        assert_eq!(device.calls("/a"), 3);
        assert_eq!(device.calls("/b"), 1);
        assert_eq!(device.requests()[3].method, Method::PUT);
    }
}
