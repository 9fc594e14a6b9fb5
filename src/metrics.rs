use std::collections::BTreeSet;

use crate::models::{AttendanceEntry, ExamResult, MetricPoint, Student};

/// A subject counts as weak when the per-exam percentage is strictly below
/// this.
pub const WEAK_SUBJECT_THRESHOLD: f64 = 50.0;

/// Reduces one class's raw records into one regression input point per
/// student. Students with zero exam results have no observed outcome and are
/// left out entirely rather than zero-filled, so they cannot drag the fitted
/// line toward the origin.
pub fn build_metric_points(
    students: &[Student],
    attendance: &[AttendanceEntry],
    exams: &[ExamResult],
) -> Vec<MetricPoint> {
    students
        .iter()
        .filter_map(|student| {
            let (present, recorded) = attendance
                .iter()
                .filter(|entry| entry.student_id == student.id)
                .fold((0usize, 0usize), |(present, recorded), entry| {
                    (present + usize::from(entry.is_present()), recorded + 1)
                });
            let attendance_percent = if recorded == 0 {
                0.0
            } else {
                present as f64 / recorded as f64 * 100.0
            };

            let mut percent_sum = 0.0;
            let mut exam_count = 0usize;
            let mut weak_subjects = BTreeSet::new();

            for result in exams.iter().filter(|r| r.student_id == student.id) {
                let percent = result.percent();
                percent_sum += percent;
                exam_count += 1;
                if percent < WEAK_SUBJECT_THRESHOLD {
                    weak_subjects.insert(result.subject.clone());
                }
            }

            if exam_count == 0 {
                return None;
            }

            Some(MetricPoint {
                student_id: student.id,
                student_name: student.full_name.clone(),
                attendance_percent,
                exam_average_percent: percent_sum / exam_count as f64,
                weak_subjects,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassId, StudentId};
    use chrono::NaiveDate;

    const CLASS: ClassId = ClassId(101);

    fn student(id: i64, name: &str) -> Student {
        Student {
            id: StudentId(id),
            full_name: name.to_string(),
            class_id: CLASS,
        }
    }

    fn entry(student_id: i64, status: &str) -> AttendanceEntry {
        AttendanceEntry {
            class_id: CLASS,
            student_id: StudentId(student_id),
            subject: "Maths".to_string(),
            taken_on: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            status: status.to_string(),
        }
    }

    fn exam(student_id: i64, subject: &str, score: f64, total: f64) -> ExamResult {
        ExamResult {
            class_id: CLASS,
            student_id: StudentId(student_id),
            subject: subject.to_string(),
            exam_title: format!("{subject} Unit Test"),
            score,
            total,
        }
    }

    #[test]
    fn attendance_percent_counts_present_over_recorded() {
        let students = vec![student(1, "Aarav Shah")];
        let attendance = vec![
            entry(1, "Present"),
            entry(1, "Present"),
            entry(1, "Present"),
            entry(1, "Absent"),
        ];
        let exams = vec![exam(1, "Maths", 40.0, 50.0)];

        let points = build_metric_points(&students, &attendance, &exams);
        assert_eq!(points.len(), 1);
        assert!((points[0].attendance_percent - 75.0).abs() < 1e-9);
    }

    #[test]
    fn attendance_percent_is_zero_without_records() {
        let students = vec![student(1, "Aarav Shah")];
        let exams = vec![exam(1, "Maths", 40.0, 50.0)];

        let points = build_metric_points(&students, &[], &exams);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].attendance_percent, 0.0);
    }

    #[test]
    fn exam_average_is_mean_of_per_exam_percentages() {
        let students = vec![student(1, "Aarav Shah")];
        let exams = vec![
            exam(1, "Maths", 40.0, 50.0),   // 80%
            exam(1, "Science", 30.0, 50.0), // 60%
        ];

        let points = build_metric_points(&students, &[], &exams);
        assert!((points[0].exam_average_percent - 70.0).abs() < 1e-9);
    }

    #[test]
    fn student_without_exam_results_is_excluded() {
        let students = vec![student(1, "Aarav Shah"), student(2, "Sana Kapoor")];
        let attendance = vec![entry(2, "Present"), entry(2, "Present")];
        let exams = vec![exam(1, "Maths", 40.0, 50.0)];

        let points = build_metric_points(&students, &attendance, &exams);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].student_id, StudentId(1));
    }

    #[test]
    fn weak_subject_threshold_is_strictly_below_fifty() {
        let students = vec![student(1, "Aarav Shah")];
        let exams = vec![
            exam(1, "Maths", 25.0, 50.0),        // exactly 50%: not weak
            exam(1, "Science", 4999.0, 10000.0), // 49.99%: weak
        ];

        let points = build_metric_points(&students, &[], &exams);
        let weak = &points[0].weak_subjects;
        assert!(!weak.contains("Maths"));
        assert!(weak.contains("Science"));
    }

    #[test]
    fn weak_subjects_deduplicate_across_exams() {
        let students = vec![student(1, "Aarav Shah")];
        let exams = vec![
            exam(1, "Science", 10.0, 50.0),
            exam(1, "Science", 20.0, 50.0),
        ];

        let points = build_metric_points(&students, &[], &exams);
        assert_eq!(points[0].weak_subjects.len(), 1);
    }
}
