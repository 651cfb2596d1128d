use snafu::{Snafu, ensure};

use crate::message::StreamId;

/// Where user-authored text comes from.
pub trait InputSurface {
    fn value(&self) -> &str;
    fn clear(&mut self);
}

/// Plain text buffer used when there is no richer input widget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    value: String,
}

impl TextInput {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }
}

impl InputSurface for TextInput {
    fn value(&self) -> &str {
        &self.value
    }

    fn clear(&mut self) {
        self.value.clear();
    }
}

/// Why a submission was turned away. Rejections never change session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SubmitRejected {
    #[snafu(display("submission is empty"))]
    EmptyInput { stage: &'static str },
    #[snafu(display("a request is already in flight ({active:?})"))]
    RequestInFlight {
        stage: &'static str,
        active: StreamId,
    },
}

/// Checks a submission against the single-request gate.
pub fn validate_submission(text: &str, active: Option<StreamId>) -> Result<(), SubmitRejected> {
    ensure!(
        !text.trim().is_empty(),
        EmptyInputSnafu {
            stage: "validate-submission"
        }
    );

    if let Some(active) = active {
        return RequestInFlightSnafu {
            stage: "validate-submission",
            active,
        }
        .fail();
    }

    Ok(())
}
