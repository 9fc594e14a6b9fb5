use thiserror::Error;

use crate::models::{LinearFit, MetricPoint, PerformanceStatus, StudentReport};

/// Residual band, in percentage points, inside which a student counts as on
/// track. Strictly outside the band flips the classification.
pub const RESIDUAL_THRESHOLD: f64 = 5.0;

/// Below this, a variance-style denominator is treated as zero. Identical
/// but non-representable inputs (repeated thirds) leave rounding residue, so
/// an exact comparison would miss them.
const DEGENERATE_EPSILON: f64 = 1e-9;

/// Expected, recoverable conditions arising from sparse class data. Callers
/// surface these as a message and skip rendering; neither is a defect.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("need at least 2 students with exam results to fit a trend, got {0}")]
    InsufficientData(usize),
    #[error("cannot fit a trend: {0}")]
    DegenerateFit(&'static str),
}

/// Ordinary least squares over the class's metric points.
///
/// All-identical attendance values make the slope undefined; that is
/// reported as [`EngineError::DegenerateFit`] rather than letting a
/// non-finite slope leak into classification.
pub fn fit_linear_regression(points: &[MetricPoint]) -> Result<LinearFit, EngineError> {
    if points.len() < 2 {
        return Err(EngineError::InsufficientData(points.len()));
    }

    let n = points.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for point in points {
        let x = point.attendance_percent;
        let y = point.exam_average_percent;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < DEGENERATE_EPSILON {
        return Err(EngineError::DegenerateFit(
            "attendance has no variance across students",
        ));
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Ok(LinearFit { slope, intercept })
}

/// Coefficient of determination for a fit over the same points. Uses the
/// raw line, not the clamped display value: it measures the fit itself.
pub fn r_squared(points: &[MetricPoint], fit: &LinearFit) -> Result<f64, EngineError> {
    if points.len() < 2 {
        return Err(EngineError::InsufficientData(points.len()));
    }

    let n = points.len() as f64;
    let mean_y = points
        .iter()
        .map(|p| p.exam_average_percent)
        .sum::<f64>()
        / n;
    let ss_tot: f64 = points
        .iter()
        .map(|p| (p.exam_average_percent - mean_y).powi(2))
        .sum();
    if ss_tot.abs() < DEGENERATE_EPSILON {
        return Err(EngineError::DegenerateFit(
            "exam averages have no variance across students",
        ));
    }

    let ss_res: f64 = points
        .iter()
        .map(|p| (p.exam_average_percent - fit.predict(p.attendance_percent)).powi(2))
        .sum();
    Ok(1.0 - ss_res / ss_tot)
}

/// Classifies every point against the fitted trend. Predictions are clamped
/// into [0, 100], and the residual uses the clamped value so the status and
/// the displayed prediction always agree.
pub fn classify_students(points: &[MetricPoint], fit: &LinearFit) -> Vec<StudentReport> {
    points
        .iter()
        .map(|point| {
            let predicted_score = fit.predict(point.attendance_percent).clamp(0.0, 100.0);
            let residual = point.exam_average_percent - predicted_score;
            let status = if residual > RESIDUAL_THRESHOLD {
                PerformanceStatus::Overperforming
            } else if residual < -RESIDUAL_THRESHOLD {
                PerformanceStatus::Underperforming
            } else {
                PerformanceStatus::OnTrack
            };

            StudentReport {
                student_id: point.student_id,
                student_name: point.student_name.clone(),
                attendance_percent: point.attendance_percent,
                exam_average_percent: point.exam_average_percent,
                predicted_score,
                residual,
                status,
                weak_subjects: point.weak_subjects.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentId;
    use std::collections::BTreeSet;

    const TOLERANCE: f64 = 1e-9;

    fn point(id: i64, attendance: f64, exam_avg: f64) -> MetricPoint {
        MetricPoint {
            student_id: StudentId(id),
            student_name: format!("Student {id}"),
            attendance_percent: attendance,
            exam_average_percent: exam_avg,
            weak_subjects: BTreeSet::new(),
        }
    }

    #[test]
    fn fits_exact_positive_trend() {
        // These lie exactly on y = 0.8x + 10.
        let points = vec![point(1, 100.0, 90.0), point(2, 50.0, 50.0), point(3, 0.0, 10.0)];

        let fit = fit_linear_regression(&points).unwrap();
        assert!((fit.slope - 0.8).abs() < TOLERANCE);
        assert!((fit.intercept - 10.0).abs() < TOLERANCE);

        let r2 = r_squared(&points, &fit).unwrap();
        assert!((r2 - 1.0).abs() < TOLERANCE);

        let reports = classify_students(&points, &fit);
        assert!(reports.iter().all(|r| r.residual.abs() < TOLERANCE));
        assert!(reports
            .iter()
            .all(|r| r.status == PerformanceStatus::OnTrack));
    }

    #[test]
    fn fits_exact_negative_trend() {
        // These lie exactly on y = -0.6x + 80.
        let points = vec![point(1, 100.0, 20.0), point(2, 50.0, 50.0), point(3, 0.0, 80.0)];

        let fit = fit_linear_regression(&points).unwrap();
        assert!((fit.slope + 0.6).abs() < TOLERANCE);
        assert!((fit.intercept - 80.0).abs() < TOLERANCE);
    }

    #[test]
    fn matches_closed_form_on_scattered_points() {
        let points = vec![
            point(1, 90.0, 85.0),
            point(2, 70.0, 60.0),
            point(3, 55.0, 62.0),
            point(4, 30.0, 40.0),
        ];

        // Closed-form OLS computed by hand for this fixture.
        let n = 4.0;
        let (sum_x, sum_y, sum_xy, sum_xx) = points.iter().fold(
            (0.0, 0.0, 0.0, 0.0),
            |(sx, sy, sxy, sxx), p| {
                let (x, y) = (p.attendance_percent, p.exam_average_percent);
                (sx + x, sy + y, sxy + x * y, sxx + x * x)
            },
        );
        let expected_slope = (n * sum_xy - sum_x * sum_y) / (n * sum_xx - sum_x * sum_x);
        let expected_intercept = (sum_y - expected_slope * sum_x) / n;

        let fit = fit_linear_regression(&points).unwrap();
        assert!((fit.slope - expected_slope).abs() < TOLERANCE);
        assert!((fit.intercept - expected_intercept).abs() < TOLERANCE);
    }

    #[test]
    fn fewer_than_two_points_is_insufficient() {
        assert_eq!(
            fit_linear_regression(&[]),
            Err(EngineError::InsufficientData(0))
        );
        assert_eq!(
            fit_linear_regression(&[point(1, 80.0, 70.0)]),
            Err(EngineError::InsufficientData(1))
        );
    }

    #[test]
    fn identical_attendance_is_degenerate() {
        let points = vec![point(1, 75.0, 40.0), point(2, 75.0, 90.0), point(3, 75.0, 65.0)];
        assert!(matches!(
            fit_linear_regression(&points),
            Err(EngineError::DegenerateFit(_))
        ));
    }

    #[test]
    fn identical_exam_averages_fit_flat_but_have_no_r_squared() {
        let points = vec![point(1, 20.0, 60.0), point(2, 50.0, 60.0), point(3, 90.0, 60.0)];

        let fit = fit_linear_regression(&points).unwrap();
        assert!(fit.slope.abs() < TOLERANCE);
        assert!((fit.intercept - 60.0).abs() < TOLERANCE);

        assert!(matches!(
            r_squared(&points, &fit),
            Err(EngineError::DegenerateFit(_))
        ));
    }

    #[test]
    fn predictions_clamp_into_percentage_range() {
        let fit = LinearFit {
            slope: 2.0,
            intercept: 50.0,
        };
        let points = vec![point(1, 100.0, 95.0)]; // raw prediction 250

        let reports = classify_students(&points, &fit);
        assert_eq!(reports[0].predicted_score, 100.0);
        assert!((reports[0].residual + 5.0).abs() < TOLERANCE);
        assert_eq!(reports[0].status, PerformanceStatus::OnTrack);

        let low = LinearFit {
            slope: 2.0,
            intercept: -150.0,
        };
        let reports = classify_students(&points, &low);
        assert_eq!(reports[0].predicted_score, 0.0);
    }

    #[test]
    fn status_thresholds_are_strict() {
        let flat = LinearFit {
            slope: 0.0,
            intercept: 50.0,
        };

        let on_boundary = classify_students(&[point(1, 60.0, 55.0)], &flat);
        assert_eq!(on_boundary[0].status, PerformanceStatus::OnTrack);

        let just_over = classify_students(&[point(1, 60.0, 55.0001)], &flat);
        assert_eq!(just_over[0].status, PerformanceStatus::Overperforming);

        let on_lower_boundary = classify_students(&[point(1, 60.0, 45.0)], &flat);
        assert_eq!(on_lower_boundary[0].status, PerformanceStatus::OnTrack);

        let just_under = classify_students(&[point(1, 60.0, 44.9999)], &flat);
        assert_eq!(just_under[0].status, PerformanceStatus::Underperforming);
    }

    #[test]
    fn far_off_trend_student_is_flagged() {
        let fit = LinearFit {
            slope: -0.6,
            intercept: 80.0,
        };
        // Predicted at 50% attendance is 50; actual 58 sits 8 above.
        let reports = classify_students(&[point(1, 50.0, 58.0)], &fit);
        assert_eq!(reports[0].status, PerformanceStatus::Overperforming);
    }
}
