use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use activation::{Action, active_at, in_state, next_action, sort_slides};
pub use slide::{Slide, SlideState, SortKey};

/// Message announced in place of a slide name while nothing is active.
pub const EMPTY_SENTINEL: &str = "__empty__";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("slide name must not be empty")]
    EmptyName,
    #[error("slide name {0:?} contains a control character")]
    ControlCharacter(String),
    #[error("slide name {0:?} must be a bare file name")]
    PathSeparator(String),
    #[error("slide name {0:?} is reserved")]
    ReservedName(String),
    #[error("duration must be a positive number of seconds, got {0}")]
    Duration(i64),
    #[error("window start {start} must be before end {end}")]
    EmptyWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("unknown slide state {0:?} (expected all, active, past or future)")]
    UnknownState(String),
    #[error("unknown sort key {0:?} (expected name, start, end, duration, rank or span)")]
    UnknownSortKey(String),
}

mod slide {
    use super::*;

    /// One scheduled slide. `name` doubles as the asset file name.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Slide {
        pub name: String,
        pub start: DateTime<Utc>,
        pub end: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub span: Option<i64>,
        /// Seconds the slide stays on screen once announced.
        pub duration: u32,
        pub rank: i64,
    }

    impl Slide {
        /// Builds a validated record from raw admin input.
        pub fn new(
            name: impl Into<String>,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            duration_secs: i64,
            rank: i64,
        ) -> Result<Self, ValidationError> {
            let duration = u32::try_from(duration_secs)
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ValidationError::Duration(duration_secs))?;
            let slide = Self {
                name: name.into(),
                start,
                end,
                span: None,
                duration,
                rank,
            };
            slide.validate()?;
            Ok(slide)
        }

        pub fn with_span(mut self, span: Option<i64>) -> Self {
            self.span = span;
            self
        }

        pub fn validate(&self) -> Result<(), ValidationError> {
            validate_name(&self.name)?;
            if self.duration == 0 {
                return Err(ValidationError::Duration(0));
            }
            if self.start >= self.end {
                return Err(ValidationError::EmptyWindow {
                    start: self.start,
                    end: self.end,
                });
            }
            Ok(())
        }

        pub fn hold(&self) -> Duration {
            Duration::from_secs(u64::from(self.duration))
        }

        /// `start <= now < end`. Empty windows and zero holds never qualify.
        pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
            self.duration > 0 && self.start <= now && now < self.end
        }

        /// Classifies by window. A zero-hold record inside its window belongs to
        /// no state and only shows up under [`SlideState::All`].
        pub fn state_at(&self, now: DateTime<Utc>) -> Option<SlideState> {
            if self.end <= now {
                Some(SlideState::Past)
            } else if now < self.start {
                Some(SlideState::Future)
            } else if self.is_active_at(now) {
                Some(SlideState::Active)
            } else {
                None
            }
        }
    }

    fn validate_name(name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if name.chars().any(char::is_control) {
            return Err(ValidationError::ControlCharacter(name.to_string()));
        }
        if name.contains(['/', '\\']) {
            return Err(ValidationError::PathSeparator(name.to_string()));
        }
        if name == EMPTY_SENTINEL {
            return Err(ValidationError::ReservedName(name.to_string()));
        }
        Ok(())
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum SlideState {
        All,
        Active,
        Past,
        Future,
    }

    impl SlideState {
        const ALL: &'static [Self] = &[Self::All, Self::Active, Self::Past, Self::Future];

        pub fn as_str(&self) -> &'static str {
            match self {
                Self::All => "all",
                Self::Active => "active",
                Self::Past => "past",
                Self::Future => "future",
            }
        }

        pub fn matches(&self, slide: &Slide, now: DateTime<Utc>) -> bool {
            match self {
                Self::All => true,
                state => slide.state_at(now) == Some(*state),
            }
        }
    }

    impl fmt::Display for SlideState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for SlideState {
        type Err = ValidationError;

        fn from_str(raw: &str) -> Result<Self, Self::Err> {
            let raw = raw.trim();
            Self::ALL
                .iter()
                .copied()
                .find(|state| raw.eq_ignore_ascii_case(state.as_str()))
                .ok_or_else(|| ValidationError::UnknownState(raw.to_string()))
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum SortKey {
        Name,
        Start,
        End,
        Duration,
        Rank,
        Span,
    }

    impl SortKey {
        const ALL: &'static [Self] = &[
            Self::Name,
            Self::Start,
            Self::End,
            Self::Duration,
            Self::Rank,
            Self::Span,
        ];

        pub fn as_str(&self) -> &'static str {
            match self {
                Self::Name => "name",
                Self::Start => "start",
                Self::End => "end",
                Self::Duration => "duration",
                Self::Rank => "rank",
                Self::Span => "span",
            }
        }

        /// Ascending by this key, then by name.
        pub fn compare(&self, a: &Slide, b: &Slide) -> Ordering {
            let primary = match self {
                Self::Name => Ordering::Equal,
                Self::Start => a.start.cmp(&b.start),
                Self::End => a.end.cmp(&b.end),
                Self::Duration => a.duration.cmp(&b.duration),
                Self::Rank => a.rank.cmp(&b.rank),
                Self::Span => a.span.cmp(&b.span),
            };
            primary.then_with(|| a.name.cmp(&b.name))
        }
    }

    impl fmt::Display for SortKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for SortKey {
        type Err = ValidationError;

        fn from_str(raw: &str) -> Result<Self, Self::Err> {
            let raw = raw.trim();
            Self::ALL
                .iter()
                .copied()
                .find(|key| raw.eq_ignore_ascii_case(key.as_str()))
                .ok_or_else(|| ValidationError::UnknownSortKey(raw.to_string()))
        }
    }
}

mod activation {
    use super::*;

    /// What the publisher should do for one cycle.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Action {
        Idle,
        Rotate(Vec<Slide>),
    }

    fn rotation_order(a: &Slide, b: &Slide) -> Ordering {
        SortKey::Rank.compare(a, b)
    }

    /// Slides active at `now`, by rank then name.
    pub fn active_at(now: DateTime<Utc>, slides: &[Slide]) -> Vec<Slide> {
        let mut active: Vec<Slide> = slides
            .iter()
            .filter(|slide| slide.is_active_at(now))
            .cloned()
            .collect();
        active.sort_by(rotation_order);
        active
    }

    pub fn next_action(now: DateTime<Utc>, slides: &[Slide]) -> Action {
        let active = active_at(now, slides);
        if active.is_empty() {
            Action::Idle
        } else {
            Action::Rotate(active)
        }
    }

    pub fn sort_slides(slides: &mut [Slide], key: SortKey) {
        slides.sort_by(|a, b| key.compare(a, b));
    }

    /// Filters `slides` to `state` at `now`.
    ///
    /// With no explicit key, active slides come back in rotation order and
    /// every other state in name order.
    pub fn in_state(
        slides: &[Slide],
        state: SlideState,
        now: DateTime<Utc>,
        sort: Option<SortKey>,
    ) -> Vec<Slide> {
        let mut selected: Vec<Slide> = slides
            .iter()
            .filter(|slide| state.matches(slide, now))
            .cloned()
            .collect();
        let key = sort.unwrap_or(match state {
            SlideState::Active => SortKey::Rank,
            _ => SortKey::Name,
        });
        sort_slides(&mut selected, key);
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    fn slide(name: &str, start: i64, end: i64, rank: i64) -> Slide {
        Slide::new(name, at(start), at(end), 10, rank).expect("valid slide")
    }

    #[test]
    fn window_is_half_open() {
        let s = slide("a.jpg", 0, 60, 1);
        assert!(s.is_active_at(at(0)));
        assert!(s.is_active_at(at(59)));
        assert!(!s.is_active_at(at(60)));
        assert!(!s.is_active_at(at(-1)));
        assert_eq!(s.state_at(at(0)), Some(SlideState::Active));
        assert_eq!(s.state_at(at(60)), Some(SlideState::Past));
        assert_eq!(s.state_at(at(-1)), Some(SlideState::Future));
    }

    #[test]
    fn inverted_window_is_never_active() {
        let mut s = slide("a.jpg", 0, 60, 1);
        s.start = at(60);
        s.end = at(0);
        for t in [-10, 0, 30, 60, 90] {
            assert!(!s.is_active_at(at(t)));
        }
        assert!(matches!(
            s.validate(),
            Err(ValidationError::EmptyWindow { .. })
        ));
    }

    #[test]
    fn zero_duration_record_is_skipped() {
        let mut s = slide("a.jpg", 0, 60, 1);
        s.duration = 0;
        assert!(!s.is_active_at(at(10)));
        assert_eq!(next_action(at(10), &[s.clone()]), Action::Idle);
    }

    #[test]
    fn zero_duration_record_is_classified_by_window() {
        let mut s = slide("a.jpg", 0, 60, 1);
        s.duration = 0;
        assert_eq!(s.state_at(at(-1)), Some(SlideState::Future));
        assert_eq!(s.state_at(at(30)), None);
        assert_eq!(s.state_at(at(60)), Some(SlideState::Past));
        for state in [SlideState::Active, SlideState::Past, SlideState::Future] {
            assert!(!state.matches(&s, at(30)), "{state} claimed a started record");
        }
        assert!(SlideState::All.matches(&s, at(30)));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            Slide::new("a.jpg", at(0), at(10), 0, 1),
            Err(ValidationError::Duration(0))
        );
        assert_eq!(
            Slide::new("a.jpg", at(0), at(10), -4, 1),
            Err(ValidationError::Duration(-4))
        );
        assert_eq!(
            Slide::new("  ", at(0), at(10), 5, 1),
            Err(ValidationError::EmptyName)
        );
        assert!(matches!(
            Slide::new("a\nb.jpg", at(0), at(10), 5, 1),
            Err(ValidationError::ControlCharacter(_))
        ));
        assert!(matches!(
            Slide::new("../a.jpg", at(0), at(10), 5, 1),
            Err(ValidationError::PathSeparator(_))
        ));
        assert!(matches!(
            Slide::new(EMPTY_SENTINEL, at(0), at(10), 5, 1),
            Err(ValidationError::ReservedName(_))
        ));
        assert!(matches!(
            Slide::new("a.jpg", at(10), at(10), 5, 1),
            Err(ValidationError::EmptyWindow { .. })
        ));
    }

    #[test]
    fn active_slides_sort_by_rank_then_name() {
        let slides = vec![
            slide("c.jpg", 0, 100, 2),
            slide("b.jpg", 0, 100, 1),
            slide("a.jpg", 0, 100, 2),
            slide("expired.jpg", -100, -1, 0),
        ];
        let names: Vec<String> = active_at(at(5), &slides)
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["b.jpg", "a.jpg", "c.jpg"]);
    }

    #[test]
    fn next_action_reflects_the_moment_it_is_asked() {
        let slides = vec![slide("a.jpg", 0, 10, 1)];
        assert_eq!(next_action(at(-1), &slides), Action::Idle);
        assert!(matches!(next_action(at(0), &slides), Action::Rotate(ref v) if v.len() == 1));
        assert_eq!(next_action(at(10), &slides), Action::Idle);
    }

    #[test]
    fn in_state_partitions_past_active_future() {
        let now = at(0);
        let slides = vec![
            slide("past", -2, -1, 1),
            slide("current", -1, 3600, 1),
            slide("future", 3600, 7200, 1),
        ];
        let names = |state| -> Vec<String> {
            in_state(&slides, state, now, None)
                .into_iter()
                .map(|s| s.name)
                .collect()
        };
        assert_eq!(names(SlideState::Active), vec!["current"]);
        assert_eq!(names(SlideState::Past), vec!["past"]);
        assert_eq!(names(SlideState::Future), vec!["future"]);
        assert_eq!(names(SlideState::All), vec!["current", "future", "past"]);
    }

    #[test]
    fn explicit_sort_key_wins() {
        let now = at(0);
        let mut late = slide("a.jpg", 50, 100, 1);
        late.span = Some(5);
        let early = slide("b.jpg", -50, 100, 9);
        let slides = vec![late, early];
        let by_start: Vec<String> = in_state(&slides, SlideState::All, now, Some(SortKey::Start))
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(by_start, vec!["b.jpg", "a.jpg"]);
        let by_span: Vec<String> = in_state(&slides, SlideState::All, now, Some(SortKey::Span))
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(by_span, vec!["b.jpg", "a.jpg"]);
    }

    #[test]
    fn parses_states_and_sort_keys() {
        assert_eq!("Active".parse::<SlideState>(), Ok(SlideState::Active));
        assert_eq!(" future ".parse::<SlideState>(), Ok(SlideState::Future));
        assert!(matches!(
            "soon".parse::<SlideState>(),
            Err(ValidationError::UnknownState(_))
        ));
        assert_eq!("start".parse::<SortKey>(), Ok(SortKey::Start));
        assert!(matches!(
            "colour".parse::<SortKey>(),
            Err(ValidationError::UnknownSortKey(_))
        ));
    }

    #[test]
    fn serializes_without_absent_span() {
        let s = slide("a.jpg", 0, 60, 1);
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("span").is_none());
        let back: Slide = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
        assert_eq!(s.hold(), Duration::from_secs(10));
        assert_eq!(s.end - s.start, ChronoDuration::seconds(60));
    }
}
