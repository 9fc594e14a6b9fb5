use std::collections::BTreeSet;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical class identifier. Upstream data carries class ids as bare
/// integers or strings depending on origin; parse once at the boundary and
/// compare only these.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClassId(pub i64);

impl FromStr for ClassId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ClassId)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Canonical student identifier, same boundary rule as [`ClassId`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StudentId(pub i64);

impl FromStr for StudentId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(StudentId)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: StudentId,
    pub full_name: String,
    pub class_id: ClassId,
}

/// One row per student per attendance-taking event. A student "has a
/// recorded status" for an event iff a row exists.
#[derive(Debug, Clone)]
pub struct AttendanceEntry {
    pub class_id: ClassId,
    pub student_id: StudentId,
    pub subject: String,
    pub taken_on: NaiveDate,
    pub status: String,
}

impl AttendanceEntry {
    pub fn is_present(&self) -> bool {
        self.status == "Present"
    }
}

/// One row per student per exam. Ingestion guarantees `total > 0`.
#[derive(Debug, Clone)]
pub struct ExamResult {
    pub class_id: ClassId,
    pub student_id: StudentId,
    pub subject: String,
    pub exam_title: String,
    pub score: f64,
    pub total: f64,
}

impl ExamResult {
    pub fn percent(&self) -> f64 {
        self.score / self.total * 100.0
    }
}

/// One student's derived regression input: attendance percentage against
/// exam average percentage, plus the subjects they scored under 50% in.
/// Only students with at least one exam result get a point.
#[derive(Debug, Clone)]
pub struct MetricPoint {
    pub student_id: StudentId,
    pub student_name: String,
    pub attendance_percent: f64,
    pub exam_average_percent: f64,
    pub weak_subjects: BTreeSet<String>,
}

/// Fitted trend line. `r_squared` lives apart from this because it is
/// computed only on request and can be undefined when the fit itself is not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, attendance_percent: f64) -> f64 {
        self.slope * attendance_percent + self.intercept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceStatus {
    Overperforming,
    Underperforming,
    OnTrack,
}

impl fmt::Display for PerformanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PerformanceStatus::Overperforming => "OVERPERFORMING",
            PerformanceStatus::Underperforming => "UNDERPERFORMING",
            PerformanceStatus::OnTrack => "ON TRACK",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct StudentReport {
    pub student_id: StudentId,
    pub student_name: String,
    pub attendance_percent: f64,
    pub exam_average_percent: f64,
    pub predicted_score: f64,
    pub residual: f64,
    pub status: PerformanceStatus,
    pub weak_subjects: BTreeSet<String>,
}

/// Scatter point stored alongside a saved fit so a renderer can re-plot the
/// class without re-deriving metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SavedModel {
    pub class_id: ClassId,
    pub generated_on: NaiveDate,
    pub fit: LinearFit,
    pub r_squared: Option<f64>,
    pub points: Vec<PlotPoint>,
}
