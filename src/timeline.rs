/// Playback range, in seconds, during which the filter may be active.
///
/// `start <= end` is not enforced; an inverted window simply never matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TimelineWindow {
    pub start: f64,
    pub end: f64,
    pub enabled: bool,
}

impl TimelineWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            enabled: true,
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position <= self.end
    }
}

/// Decides whether the filter is applied at `position`.
pub fn should_filter(
    master_enabled: bool,
    window_enabled: bool,
    position: f64,
    window: &TimelineWindow,
) -> bool {
    if !master_enabled {
        return false;
    }
    if !window_enabled {
        return true;
    }
    window.contains(position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_off_never_filters() {
        let w = TimelineWindow::new(0.0, 100.0);
        for p in [-1.0, 0.0, 5.0, 100.0, f64::NAN] {
            assert!(!should_filter(false, true, p, &w));
            assert!(!should_filter(false, false, p, &w));
        }
    }

    #[test]
    fn window_off_always_filters() {
        let w = TimelineWindow::new(2.0, 4.0);
        for p in [-1.0, 0.0, 3.0, 5.0, 1e9] {
            assert!(should_filter(true, false, p, &w));
        }
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let w = TimelineWindow::new(2.0, 4.0);
        assert!(!should_filter(true, true, 1.999, &w));
        assert!(should_filter(true, true, 2.0, &w));
        assert!(should_filter(true, true, 3.0, &w));
        assert!(should_filter(true, true, 4.0, &w));
        assert!(!should_filter(true, true, 4.001, &w));
    }

    #[test]
    fn inverted_window_never_matches() {
        let w = TimelineWindow::new(5.0, 1.0);
        for p in [0.0, 1.0, 3.0, 5.0, 6.0] {
            assert!(!should_filter(true, true, p, &w));
        }
    }

    #[test]
    fn degenerate_window_matches_single_instant() {
        let w = TimelineWindow::new(3.0, 3.0);
        assert!(should_filter(true, true, 3.0, &w));
        assert!(!should_filter(true, true, 3.0001, &w));
    }

    #[test]
    fn deserializes_with_defaults() {
        let w: TimelineWindow = serde_json::from_str(r#"{ "start": 1.5 }"#).unwrap();
        assert_eq!(w.start, 1.5);
        assert_eq!(w.end, 0.0);
        assert!(!w.enabled);
    }
}
