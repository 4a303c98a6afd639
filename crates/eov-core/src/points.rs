use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coords::Crs;
use crate::error::{Result, SamplingError};

/// Reviewer confidence, stored as 1 (high) to 3 (low).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Confidence {
    High = 1,
    Medium = 2,
    Low = 3,
}

impl From<Confidence> for u8 {
    fn from(c: Confidence) -> u8 {
        c as u8
    }
}

impl TryFrom<u8> for Confidence {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            1 => Ok(Confidence::High),
            2 => Ok(Confidence::Medium),
            3 => Ok(Confidence::Low),
            other => Err(format!("confidence must be 1, 2 or 3, got {other}")),
        }
    }
}

/// Fields filled in by the reviewer. Empty when the sampler creates a point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Class name assigned by the operator.
    pub operator: Option<String>,
    pub burnt: bool,
    pub confidence: Option<Confidence>,
    pub verified: bool,
    pub date: Option<DateTime<Utc>>,
    /// Time spent on the point, rounded to 1e-4 s.
    pub seconds_taken: Option<f64>,
}

/// One reviewer decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    pub operator: String,
    pub burnt: bool,
    pub confidence: Confidence,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationPoint {
    /// Position in the set, stable for the lifetime of the worklist.
    pub id: usize,
    pub x: f64,
    pub y: f64,
    /// Source class label from the stratifying raster, if any.
    pub class: Option<u32>,
    #[serde(flatten)]
    pub annotation: Annotation,
}

/// Ordered worklist of validation points in a single CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationPointSet {
    pub crs: Crs,
    pub points: Vec<ValidationPoint>,
}

impl ValidationPointSet {
    pub fn new(crs: Crs, points: Vec<ValidationPoint>) -> Self {
        Self { crs, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationPoint> {
        self.points.iter()
    }

    pub fn get(&self, id: usize) -> Option<&ValidationPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    /// Number of points drawn from each source class.
    pub fn class_counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for class in self.points.iter().filter_map(|p| p.class) {
            *counts.entry(class).or_insert(0) += 1;
        }
        counts
    }

    /// Reset every point to the starting state of a fresh review: the default
    /// class, not burnt, high confidence, unverified, no timing.
    pub fn initialize_annotations(&mut self, default_class: &str) {
        for p in &mut self.points {
            p.annotation = Annotation {
                operator: Some(default_class.to_string()),
                confidence: Some(Confidence::High),
                ..Annotation::default()
            };
        }
    }

    /// Index of the first point still awaiting verification.
    pub fn resume_index(&self) -> Option<usize> {
        self.points.iter().position(|p| !p.annotation.verified)
    }

    /// A cursor positioned so that `next()` lands on the resume point.
    pub fn review_cursor(&self) -> ReviewCursor {
        let mut cursor = ReviewCursor::new(self.len());
        if let Some(i) = self.resume_index() {
            cursor.position = i as isize - 1;
        }
        cursor
    }

    /// Apply a judgment, timing it from `started`.
    pub fn record_judgment(&mut self, id: usize, judgment: Judgment, started: Instant) -> Result<()> {
        self.record_judgment_at(id, judgment, Utc::now(), started.elapsed())
    }

    /// Apply a judgment with an explicit timestamp and elapsed time.
    pub fn record_judgment_at(
        &mut self,
        id: usize,
        judgment: Judgment,
        date: DateTime<Utc>,
        elapsed: Duration,
    ) -> Result<()> {
        let point = self
            .points
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(SamplingError::UnknownPoint(id))?;
        point.annotation = Annotation {
            operator: Some(judgment.operator),
            burnt: judgment.burnt,
            confidence: Some(judgment.confidence),
            verified: judgment.verified,
            date: Some(date),
            seconds_taken: Some((elapsed.as_secs_f64() * 1e4).round() / 1e4),
        };
        Ok(())
    }
}

/// Forward/backward navigation over a worklist, wrapping at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewCursor {
    len: usize,
    /// -1 before the first move.
    position: isize,
}

impl ReviewCursor {
    pub fn new(len: usize) -> Self {
        Self { len, position: -1 }
    }

    pub fn current(&self) -> Option<usize> {
        (self.position >= 0 && (self.position as usize) < self.len).then_some(self.position as usize)
    }

    pub fn next(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        self.position += 1;
        if self.position as usize >= self.len {
            self.position = 0;
        }
        self.current()
    }

    pub fn prev(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        self.position -= 1;
        if self.position < 0 {
            self.position = self.len as isize - 1;
        }
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_set(n: usize) -> ValidationPointSet {
        let points = (0..n)
            .map(|i| ValidationPoint {
                id: i,
                x: i as f64,
                y: -(i as f64),
                class: Some((i % 2) as u32),
                annotation: Annotation::default(),
            })
            .collect();
        ValidationPointSet::new(Crs::wgs84(), points)
    }

    fn judgment(verified: bool) -> Judgment {
        Judgment {
            operator: "cropland".into(),
            burnt: true,
            confidence: Confidence::Medium,
            verified,
        }
    }

    #[test]
    fn fresh_points_have_no_annotation() {
        let set = sample_set(3);
        assert!(set.iter().all(|p| p.annotation == Annotation::default()));
        assert_eq!(set.class_counts().get(&0), Some(&2));
    }

    #[test]
    fn initialize_sets_review_defaults() {
        let mut set = sample_set(2);
        set.initialize_annotations("other");
        let a = &set.points[1].annotation;
        assert_eq!(a.operator.as_deref(), Some("other"));
        assert_eq!(a.confidence, Some(Confidence::High));
        assert!(!a.burnt && !a.verified);
        assert!(a.date.is_none() && a.seconds_taken.is_none());
    }

    #[test]
    fn record_judgment_fills_fields() {
        let mut set = sample_set(3);
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        set.record_judgment_at(1, judgment(true), date, Duration::from_micros(3_141_592)).unwrap();
        let a = &set.get(1).unwrap().annotation;
        assert_eq!(a.operator.as_deref(), Some("cropland"));
        assert!(a.burnt && a.verified);
        assert_eq!(a.confidence, Some(Confidence::Medium));
        assert_eq!(a.date, Some(date));
        assert_eq!(a.seconds_taken, Some(3.1416));
    }

    #[test]
    fn record_judgment_unknown_id() {
        let mut set = sample_set(2);
        let err = set.record_judgment(9, judgment(true), Instant::now()).unwrap_err();
        assert!(matches!(err, SamplingError::UnknownPoint(9)));
    }

    #[test]
    fn resume_skips_verified_points() {
        let mut set = sample_set(4);
        assert_eq!(set.resume_index(), Some(0));
        set.record_judgment(0, judgment(true), Instant::now()).unwrap();
        set.record_judgment(1, judgment(true), Instant::now()).unwrap();
        assert_eq!(set.resume_index(), Some(2));
        let mut cursor = set.review_cursor();
        assert_eq!(cursor.next(), Some(2));
    }

    #[test]
    fn all_verified_has_no_resume_point() {
        let mut set = sample_set(2);
        for id in 0..2 {
            set.record_judgment(id, judgment(true), Instant::now()).unwrap();
        }
        assert_eq!(set.resume_index(), None);
        assert_eq!(set.review_cursor().next(), Some(0));
    }

    #[test]
    fn cursor_wraps_both_ways() {
        let mut c = ReviewCursor::new(3);
        assert_eq!(c.current(), None);
        assert_eq!(c.next(), Some(0));
        assert_eq!(c.next(), Some(1));
        assert_eq!(c.next(), Some(2));
        assert_eq!(c.next(), Some(0));
        assert_eq!(c.prev(), Some(2));

        let mut c = ReviewCursor::new(3);
        assert_eq!(c.prev(), Some(2));
    }

    #[test]
    fn empty_cursor_goes_nowhere() {
        let mut c = ReviewCursor::new(0);
        assert_eq!(c.next(), None);
        assert_eq!(c.prev(), None);
    }

    #[test]
    fn json_uses_numeric_confidence() {
        let mut set = sample_set(1);
        set.initialize_annotations("other");
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["points"][0]["confidence"], 1);
        assert_eq!(json["points"][0]["operator"], "other");
        let back: ValidationPointSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }
}
