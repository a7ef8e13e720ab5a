//! Blocking "ask the operator for a value" interface used by manual calibration.

use std::collections::VecDeque;

use crate::error::{Result, TomoError};

/// A single numeric question put to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorRequest {
    pub prompt: String,
    /// Inclusive lower bound of an acceptable answer.
    pub min: i64,
    /// Inclusive upper bound of an acceptable answer.
    pub max: i64,
}

impl OperatorRequest {
    pub fn new(prompt: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            prompt: prompt.into(),
            min,
            max,
        }
    }

    /// Check an answer against the request bounds.
    pub fn validate(&self, answer: i64) -> Result<i64> {
        if answer < self.min || answer > self.max {
            return Err(TomoError::bounds(
                format!("answer {}", answer),
                format!("range {}..={}", self.min, self.max),
            ));
        }
        Ok(answer)
    }
}

/// Source of operator answers. Calls block until an answer is available.
pub trait Operator {
    fn ask(&mut self, request: &OperatorRequest) -> Result<i64>;
}

/// Operator that replays a fixed list of answers, for batch runs and tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOperator {
    answers: VecDeque<i64>,
}

impl ScriptedOperator {
    pub fn new(answers: impl IntoIterator<Item = i64>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
        }
    }
}

impl Operator for ScriptedOperator {
    fn ask(&mut self, request: &OperatorRequest) -> Result<i64> {
        self.answers
            .pop_front()
            .ok_or_else(|| TomoError::input(format!("no scripted answer for '{}'", request.prompt)))
    }
}
