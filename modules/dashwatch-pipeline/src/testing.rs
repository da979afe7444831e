// Test doubles for the pipeline's three trait boundaries:
// - RecordingChat (ChatBackend): scripted webhook outcomes, records payloads
// - StaticVision (VisionCorrector): fixed key → value map, counts calls
// - StaticSource (PageSource): scripted captures, counts re-authentications
//
// Plus builders for records used across unit and integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use chat_webhook::WebhookError;
use dashwatch_common::{CommentRecord, ComplaintRecord, DashwatchError};

use crate::capture::{Capture, Screenshot};
use crate::correction::VisionCorrector;
use crate::notify::ChatBackend;
use crate::session::PageSource;

// ---------------------------------------------------------------------------
// RecordingChat
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ChatLog {
    script: VecDeque<Result<(), WebhookError>>,
    delivered: Vec<Value>,
    attempts: usize,
}

/// Webhook that answers from a script, then succeeds forever. Clones share
/// the same log, so a clone can be boxed into an `AlertSink` and inspected after.
#[derive(Clone, Default)]
pub struct RecordingChat {
    log: Arc<Mutex<ChatLog>>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self) -> Self {
        self.log.lock().unwrap().script.push_back(Ok(()));
        self
    }

    pub fn then_fail(self, err: WebhookError) -> Self {
        self.log.lock().unwrap().script.push_back(Err(err));
        self
    }

    /// Payloads that were accepted, in order.
    pub fn payloads(&self) -> Vec<Value> {
        self.log.lock().unwrap().delivered.clone()
    }

    /// Every post, accepted or not.
    pub fn attempts(&self) -> usize {
        self.log.lock().unwrap().attempts
    }
}

#[async_trait]
impl ChatBackend for RecordingChat {
    async fn post(&self, payload: &Value) -> Result<(), WebhookError> {
        let mut log = self.log.lock().unwrap();
        log.attempts += 1;
        let outcome = log.script.pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            log.delivered.push(payload.clone());
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// StaticVision
// ---------------------------------------------------------------------------

/// Vision corrector with canned answers.
#[derive(Default)]
pub struct StaticVision {
    values: HashMap<String, String>,
    fail: bool,
    calls: AtomicUsize,
}

impl StaticVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionCorrector for StaticVision {
    async fn correct(
        &self,
        _screenshot: &Screenshot,
        _requested: &[String],
    ) -> Result<HashMap<String, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("vision unavailable");
        }
        Ok(self.values.clone())
    }
}

// ---------------------------------------------------------------------------
// StaticSource
// ---------------------------------------------------------------------------

/// Page source that hands out captures in order; the last one repeats.
#[derive(Default)]
pub struct StaticSource {
    captures: Mutex<VecDeque<Capture>>,
    reauths: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, capture: Capture) -> Self {
        self.captures.lock().unwrap().push_back(capture);
        self
    }

    /// Shorthand for a source returning one text page.
    pub fn text(text: &str) -> Self {
        Self::new().then(Capture::from_text(text))
    }

    pub fn reauth_count(&self) -> usize {
        self.reauths.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for StaticSource {
    async fn capture(&self) -> Result<Capture, DashwatchError> {
        let mut captures = self.captures.lock().unwrap();
        match captures.len() {
            0 => Err(DashwatchError::Capture("no capture scripted".into())),
            1 => Ok(captures[0].clone()),
            _ => Ok(captures.pop_front().unwrap_or_default()),
        }
    }

    async fn reauthenticate(&self) -> Result<(), DashwatchError> {
        self.reauths.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

pub fn comment(store: &str, timestamp: &str, score: u8, text: &str) -> CommentRecord {
    CommentRecord {
        store: store.to_string(),
        timestamp: timestamp.to_string(),
        score,
        comment: text.to_string(),
    }
}

pub fn complaint(case_number: &str, store: &str) -> ComplaintRecord {
    ComplaintRecord {
        case_number: case_number.to_string(),
        date: "01 Mar 2025".to_string(),
        store: store.to_string(),
        category: "Product".to_string(),
        reason: "Quality".to_string(),
        description: "Item was damaged".to_string(),
        response: "[No response recorded]".to_string(),
        ..ComplaintRecord::default()
    }
}

/// Comments-page text with `n` distinct comments, in the dashboard's line layout.
pub fn comments_page(n: usize) -> String {
    let mut text = String::from("NPS Comments\nStore\nScore\n");
    for i in 0..n {
        text.push_str(&format!(
            "2025-03-01\n{} Store {i}\nComment number {i}\n{}\n",
            100 + i,
            i % 11
        ));
    }
    text
}

/// Complaints-table text with one row per case number.
pub fn complaints_page(cases: &[&str]) -> String {
    let mut text = String::from("opened_date\nstore\ncase_number\n");
    for (i, case) in cases.iter().enumerate() {
        text.push_str(&format!(
            "{n}.\n3 Mar 2025, 14:05:{s:02}\n1234 Leeds\n{case}\nCustomer Service\nComplaint\nProduct\nQuality\nDamaged\nBox was crushed\nRespond\nSorry about that\n",
            n = i + 1,
            s = i % 60
        ));
    }
    text.push_str("1 - 10 / 42\n");
    text
}
