//! Callback form of an image request
//!
//! For callers that prefer being notified over awaiting a future. The success
//! callback is required; the failure callback is optional and a failure with
//! no handler is only logged.

use std::fmt;

use tracing::debug;

use crate::app::image::Image;
use crate::errors::RequestError;

type SuccessCallback = Box<dyn FnOnce(Image) + Send + 'static>;
type FailureCallback = Box<dyn FnOnce(RequestError) + Send + 'static>;

/// Completion handlers for one request
pub struct Callbacks {
    on_success: SuccessCallback,
    on_failure: Option<FailureCallback>,
}

impl Callbacks {
    /// Handlers with only a success callback
    pub fn new<F>(on_success: F) -> Self
    where
        F: FnOnce(Image) + Send + 'static,
    {
        Self {
            on_success: Box::new(on_success),
            on_failure: None,
        }
    }

    /// Add a failure callback
    pub fn on_failure<F>(mut self, on_failure: F) -> Self
    where
        F: FnOnce(RequestError) + Send + 'static,
    {
        self.on_failure = Some(Box::new(on_failure));
        self
    }

    /// Check if a failure callback is installed
    pub fn handles_failure(&self) -> bool {
        self.on_failure.is_some()
    }

    /// Invoke the matching callback
    pub fn deliver(self, outcome: Result<Image, RequestError>) {
        match outcome {
            Ok(image) => (self.on_success)(image),
            Err(error) => match self.on_failure {
                Some(on_failure) => on_failure(error),
                None => debug!("Request failed with no failure callback: {}", error),
            },
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("handles_failure", &self.handles_failure())
            .finish()
    }
}
