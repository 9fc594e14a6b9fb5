use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{ClassId, LinearFit, PerformanceStatus, StudentReport};

pub fn summarize_statuses(reports: &[StudentReport]) -> Vec<(PerformanceStatus, usize)> {
    [
        PerformanceStatus::Overperforming,
        PerformanceStatus::OnTrack,
        PerformanceStatus::Underperforming,
    ]
    .into_iter()
    .map(|status| {
        let count = reports.iter().filter(|r| r.status == status).count();
        (status, count)
    })
    .collect()
}

pub fn build_report(
    class_id: ClassId,
    generated_on: NaiveDate,
    fit: &LinearFit,
    r_squared: Option<f64>,
    reports: &[StudentReport],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance vs Exam Performance Report");
    let _ = writeln!(
        output,
        "Generated for class {} on {}",
        class_id, generated_on
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Fitted Trend");
    let _ = writeln!(
        output,
        "- predicted exam average = {:.4} x attendance + {:.4}",
        fit.slope, fit.intercept
    );
    match r_squared {
        Some(value) => {
            let _ = writeln!(output, "- r-squared: {value:.4}");
        }
        None => {
            let _ = writeln!(output, "- r-squared: not computed");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");
    for (status, count) in summarize_statuses(reports) {
        let _ = writeln!(output, "- {status}: {count} students");
    }

    let mut by_residual = reports.to_vec();
    by_residual.sort_by(|a, b| {
        a.residual
            .partial_cmp(&b.residual)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Outlook");
    for report in by_residual.iter() {
        let _ = writeln!(
            output,
            "- {}: attendance {:.1}%, exam avg {:.1}%, predicted {:.1}% [{}]",
            report.student_name,
            report.attendance_percent,
            report.exam_average_percent,
            report.predicted_score,
            report.status
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weak Subjects");
    let mut any_weak = false;
    for report in by_residual.iter() {
        if report.weak_subjects.is_empty() {
            continue;
        }
        any_weak = true;
        let subjects: Vec<&str> = report.weak_subjects.iter().map(String::as_str).collect();
        let _ = writeln!(output, "- {}: {}", report.student_name, subjects.join(", "));
    }
    if !any_weak {
        let _ = writeln!(output, "No student scored below 50% in any subject.");
    }

    output
}
