//! Sliding time windows over a single numeric series.
//!
//! Values are kept while they are within `span` milliseconds of the newest
//! timestamp seen. Late values are accepted as long as they still fall
//! inside the window.

use std::collections::VecDeque;

/// Bounded-by-time buffer of `(timestamp, value)` points.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Window length in milliseconds
    span_ms: i64,
    /// Points in arrival order
    points: VecDeque<(i64, f64)>,
    /// Newest timestamp seen
    latest: Option<i64>,
}

impl SlidingWindow {
    pub fn new(span_ms: u64) -> Self {
        Self {
            span_ms: i64::try_from(span_ms).unwrap_or(i64::MAX),
            points: VecDeque::new(),
            latest: None,
        }
    }

    /// Whether a timestamp is inside the window ending at the newest point.
    pub fn contains(&self, timestamp: i64) -> bool {
        match self.latest {
            Some(latest) => timestamp > latest.saturating_sub(self.span_ms),
            None => true,
        }
    }

    /// Add a point and evict everything that fell out of the window.
    pub fn push(&mut self, timestamp: i64, value: f64) {
        self.latest = Some(self.latest.map_or(timestamp, |l| l.max(timestamp)));
        if self.contains(timestamp) {
            self.points.push_back((timestamp, value));
        }
        self.evict();
    }

    fn evict(&mut self) {
        let Some(latest) = self.latest else { return };
        let cutoff = latest.saturating_sub(self.span_ms);
        self.points.retain(|(ts, _)| *ts > cutoff);
    }

    /// Values currently in the window, in arrival order.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, v)| *v).collect()
    }

    /// Newest timestamp seen, if any.
    pub fn latest(&self) -> Option<i64> {
        self.latest
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.latest = None;
    }
}
