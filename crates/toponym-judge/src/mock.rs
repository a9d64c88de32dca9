//! Mock judge backend for deterministic testing.
//!
//! Maps user-prompt substrings to canned responses, records every call, and
//! can inject a fixed number of transient failures to exercise the retry
//! path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use toponym_core::{Error, Result};

use crate::backend::JudgeBackend;

#[derive(Debug, Clone)]
pub struct MockCall {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Default)]
struct MockState {
    /// Substring of the user prompt → canned response.
    responses: HashMap<String, String>,
    default_response: Option<String>,
    /// Remaining calls that fail with a transient error before succeeding.
    fail_remaining: u32,
    calls: Vec<MockCall>,
}

/// Deterministic in-memory judge backend.
#[derive(Clone, Default)]
pub struct MockJudgeBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockJudgeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `response` whenever the user prompt contains `needle`.
    pub fn with_response(self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.state
            .lock()
            .expect("mock state poisoned")
            .responses
            .insert(needle.into(), response.into());
        self
    }

    /// Fallback response when no mapping matches.
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        self.state.lock().expect("mock state poisoned").default_response = Some(response.into());
        self
    }

    /// Fail the next `n` calls with a transient error.
    pub fn fail_times(self, n: u32) -> Self {
        self.state.lock().expect("mock state poisoned").fail_remaining = n;
        self
    }

    /// All calls observed so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().expect("mock state poisoned").calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().expect("mock state poisoned").calls.len()
    }
}

#[async_trait]
impl JudgeBackend for MockJudgeBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.calls.push(MockCall {
            system: system.to_string(),
            user: user.to_string(),
        });

        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(Error::Request("injected transient failure".into()));
        }

        let matched = state
            .responses
            .iter()
            .find(|(needle, _)| user.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .or_else(|| state.default_response.clone());

        matched.ok_or_else(|| Error::Internal("mock backend has no response for input".into()))
    }
}
