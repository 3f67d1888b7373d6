use std::{
    io::Read,
    sync::{Arc, RwLock},
};

use crate::{error::BackdropResult, fx::FilterKind, timeline::TimelineWindow};

/// Caller-owned filter settings. Read by the frame loop at the point of use.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub kind: FilterKind,
    /// Master toggle.
    pub enabled: bool,
    pub timeline: TimelineWindow,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::default(),
            enabled: true,
            timeline: TimelineWindow::default(),
        }
    }
}

impl FilterConfig {
    pub fn from_json_reader(r: impl Read) -> BackdropResult<Self> {
        Ok(serde_json::from_reader(r)?)
    }

    pub fn from_json_str(s: &str) -> BackdropResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Master flag as seen by the gate. A `None` filter never needs a mask.
    pub fn master_enabled(&self) -> bool {
        self.enabled && self.kind.is_active()
    }

    /// Whether the filter applies at `position` under this configuration.
    pub fn active_at(&self, position: f64) -> bool {
        crate::timeline::should_filter(
            self.master_enabled(),
            self.timeline.enabled,
            position,
            &self.timeline,
        )
    }
}

/// Shared current-value source for [`FilterConfig`].
///
/// Clones share the same value; writers may live on any thread.
#[derive(Clone, Debug, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<FilterConfig>>,
}

impl ConfigHandle {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> FilterConfig {
        match self.inner.read() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, config: FilterConfig) {
        self.update(|c| *c = config);
    }

    pub fn update(&self, f: impl FnOnce(&mut FilterConfig)) {
        let mut g = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *g);
    }
}
