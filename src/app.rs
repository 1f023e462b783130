use crate::speedtest::{
    error::RunError, resolver::NominalSize, Metric, RunStatus, SpeedTestResult, TestUpdate,
};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::time::Duration;

const MAX_SAMPLES: usize = 200;

pub struct App {
    pub status: RunStatus,
    pub result: SpeedTestResult,
    pub size: NominalSize,
    pub should_quit: bool,

    /// Set between a cancel request and the run settling back to idle.
    cancel_requested: bool,
    pub cancelled: bool,
    pub error: Option<RunError>,

    // Speed samples for charts
    pub download_samples: Vec<f64>,
    pub upload_samples: Vec<f64>,
    pub ping_samples: Vec<f64>,
}

impl App {
    pub fn new(size: NominalSize) -> Self {
        Self {
            status: RunStatus::Idle,
            result: SpeedTestResult::default(),
            size,
            should_quit: false,
            cancel_requested: false,
            cancelled: false,
            error: None,
            download_samples: Vec::new(),
            upload_samples: Vec::new(),
            ping_samples: Vec::new(),
        }
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Enter if !self.status.is_measuring() => Some(AppAction::StartTest),
            KeyCode::Esc if self.status.is_measuring() => Some(AppAction::CancelTest),
            KeyCode::Right | KeyCode::Char('l') if !self.status.is_measuring() => {
                self.size = self.size.next();
                None
            }
            KeyCode::Left | KeyCode::Char('h') if !self.status.is_measuring() => {
                self.size = self.size.prev();
                None
            }
            _ => None,
        }
    }

    pub fn reset_for_new_test(&mut self) {
        self.result = SpeedTestResult::default();
        self.error = None;
        self.cancel_requested = false;
        self.cancelled = false;
        self.download_samples.clear();
        self.upload_samples.clear();
        self.ping_samples.clear();
    }

    pub fn mark_cancel_requested(&mut self) {
        self.cancel_requested = true;
    }

    pub fn handle_update(&mut self, update: TestUpdate) {
        match update {
            TestUpdate::Status(status) => {
                if status == RunStatus::Idle && self.cancel_requested {
                    self.cancel_requested = false;
                    self.cancelled = true;
                }
                self.status = status;
            }
            TestUpdate::Sample(metric, value) => {
                self.result.record(metric, value);
                let samples = match metric {
                    Metric::Download => &mut self.download_samples,
                    Metric::Upload => &mut self.upload_samples,
                    Metric::Ping => &mut self.ping_samples,
                };
                samples.push(value);
                // Keep last MAX_SAMPLES samples
                if samples.len() > MAX_SAMPLES {
                    samples.remove(0);
                }
            }
            TestUpdate::Jitter(ms) => self.result.jitter_ms = ms,
            TestUpdate::Failed(err) => self.error = Some(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    StartTest,
    CancelTest,
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}
