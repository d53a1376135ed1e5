//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use credvault::{MetricMethod, MetricsHook, RecordId};
use uuid::Uuid;

/// One captured telemetry event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricEvent {
    pub method: &'static str,
    pub id: RecordId,
    pub fields: Option<String>,
}

/// Telemetry sink that records every event for later assertions.
#[derive(Default)]
pub struct RecordingHook {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("events lock").clear();
    }
}

impl MetricsHook for RecordingHook {
    fn record_metric(&self, method: MetricMethod, id: &RecordId, fields: Option<&str>) {
        self.events.lock().expect("events lock").push(MetricEvent {
            method: method.as_str(),
            id: *id,
            fields: fields.map(str::to_string),
        });
    }
}

pub fn temp_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("credvault-test-{}", Uuid::new_v4()));
    path
}
