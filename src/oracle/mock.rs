//! Mock mask oracle for testing and demos
//!
//! Returns scripted candidates without any model. Clones share their call
//! history, so a test can hand one clone to the segmenter and inspect the other.

use super::{MaskOracle, Prompt};
use crate::{
    error::{CropError, Result},
    types::{Candidate, SourceImage},
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted oracle reply
#[derive(Debug, Clone)]
pub enum MockResponse {
    Candidates(Vec<Candidate>),
    Fail(String),
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockResponse>,
    calls: Vec<String>,
}

/// Scripted oracle with call recording
#[derive(Debug, Clone)]
pub struct MockMaskOracle {
    default_response: Vec<Candidate>,
    ready: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockMaskOracle {
    /// Oracle answering every call with `candidates`
    #[must_use]
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            default_response: candidates,
            ready: true,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Oracle that reports it was never loaded
    #[must_use]
    pub fn unavailable() -> Self {
        let mut oracle = Self::new(Vec::new());
        oracle.ready = false;
        oracle
    }

    /// Queue replies consumed one per call before falling back to the default
    #[must_use]
    pub fn with_script<I: IntoIterator<Item = MockResponse>>(self, responses: I) -> Self {
        self.state
            .lock()
            .expect("mock oracle state poisoned")
            .script
            .extend(responses);
        self
    }

    /// Number of `segment` calls served so far, across clones
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().expect("mock oracle state poisoned").calls.len()
    }

    /// Prompts of all calls so far, in call order
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("mock oracle state poisoned")
            .calls
            .clone()
    }
}

impl MaskOracle for MockMaskOracle {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn segment(
        &mut self,
        _source: &SourceImage,
        prompt: &Prompt,
        threshold: f32,
    ) -> Result<Vec<Candidate>> {
        if !self.ready {
            return Err(CropError::oracle_unavailable("mock oracle not loaded"));
        }

        let response = {
            let mut state = self.state.lock().expect("mock oracle state poisoned");
            state.calls.push(prompt.to_string());
            state.script.pop_front()
        };

        match response.unwrap_or_else(|| MockResponse::Candidates(self.default_response.clone())) {
            MockResponse::Candidates(candidates) => Ok(candidates
                .into_iter()
                .filter(|candidate| candidate.score > threshold)
                .collect()),
            MockResponse::Fail(reason) => Err(CropError::oracle_call_failed(reason)),
        }
    }
}
