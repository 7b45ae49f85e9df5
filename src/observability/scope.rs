//! ObservationScope for BEGIN / COMPLETE / FAILED events
//!
//! ```ignore
//! let scope = ObservationScope::with_fields("BITMAP_BUILD", &[("index", "orders")]);
//! // ... do work ...
//! scope.complete_with_fields(&[("tuples", "1000")]);
//! ```
//!
//! A scope dropped without an outcome logs `{name}_INCOMPLETE`.

use std::time::Instant;

use super::logger::Logger;
use crate::errors::BitmapError;

pub struct ObservationScope<'a> {
    name: &'a str,
    fields: Vec<(&'a str, String)>,
    started: Instant,
    finished: bool,
}

impl<'a> ObservationScope<'a> {
    /// Logs `{name}_BEGIN` immediately.
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);
        Self {
            name,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started: Instant::now(),
            finished: false,
        }
    }

    fn fields_with<'s>(&'s self, extra: &[(&'s str, &str)]) -> Vec<(&'s str, String)> {
        let mut all: Vec<(&str, String)> = self
            .fields
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        all.push(("elapsed_ms", self.started.elapsed().as_millis().to_string()));
        all.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));
        all
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Logs `{name}_COMPLETE` with the scope's fields plus `extra`.
    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.finished = true;
        let fields = self.fields_with(extra);
        let refs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        Logger::info(&format!("{}_COMPLETE", self.name), &refs);
    }

    /// Logs `{name}_FAILED` at ERROR, or FATAL for fatal errors.
    pub fn fail(self, error: &BitmapError) {
        self.fail_with(error.code(), &error.to_string(), error.is_fatal());
    }

    /// Failure reported by a caller outside the engine's error type.
    pub fn fail_with(mut self, code: &str, reason: &str, fatal: bool) {
        self.finished = true;
        let fields = self.fields_with(&[("code", code)]);
        let mut refs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        refs.push(("reason", reason));
        let event = format!("{}_FAILED", self.name);
        if fatal {
            Logger::fatal(&event, &refs);
        } else {
            Logger::error(&event, &refs);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}
