use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AttendanceEntry, ClassId, ExamResult, LinearFit, PlotPoint, SavedModel, Student, StudentId,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let class_id = ClassId(101);
    let students = vec![
        (StudentId(1), "Aarav Shah"),
        (StudentId(2), "Diya Menon"),
        (StudentId(3), "Rohan Iyer"),
        (StudentId(4), "Sana Kapoor"),
    ];

    for (id, full_name) in &students {
        upsert_student(pool, *id, full_name, class_id).await?;
    }

    let day = |d: u32| NaiveDate::from_ymd_opt(2026, 2, d).context("invalid seed date");

    let attendance: Vec<(&str, i64, &str, NaiveDate, &str)> = vec![
        ("seed-att-001", 1, "Maths", day(2)?, "Present"),
        ("seed-att-002", 1, "Science", day(3)?, "Present"),
        ("seed-att-003", 1, "Maths", day(4)?, "Present"),
        ("seed-att-004", 2, "Maths", day(2)?, "Present"),
        ("seed-att-005", 2, "Science", day(3)?, "Absent"),
        ("seed-att-006", 2, "Maths", day(4)?, "Present"),
        ("seed-att-007", 3, "Maths", day(2)?, "Absent"),
        ("seed-att-008", 3, "Science", day(3)?, "Present"),
        ("seed-att-009", 3, "Maths", day(4)?, "Absent"),
        // Sana has attendance but no exam results yet; report generation
        // must leave her out of the fit.
        ("seed-att-010", 4, "Maths", day(2)?, "Present"),
        ("seed-att-011", 4, "Science", day(3)?, "Absent"),
        ("seed-att-012", 4, "Maths", day(4)?, "Absent"),
    ];

    for (source_key, student_id, subject, taken_on, status) in attendance {
        sqlx::query(
            r#"
            INSERT INTO studydock_insight.attendance_entries
            (id, class_id, student_id, subject, taken_on, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(class_id.0)
        .bind(student_id)
        .bind(subject)
        .bind(taken_on)
        .bind(status)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let exams: Vec<(&str, i64, &str, &str, f64, f64)> = vec![
        ("seed-exam-001", 1, "Maths", "Unit Test 1", 46.0, 50.0),
        ("seed-exam-002", 1, "Science", "Unit Test 1", 42.0, 50.0),
        ("seed-exam-003", 2, "Maths", "Unit Test 1", 34.0, 50.0),
        ("seed-exam-004", 2, "Science", "Unit Test 1", 39.0, 50.0),
        ("seed-exam-005", 3, "Maths", "Unit Test 1", 28.0, 50.0),
        ("seed-exam-006", 3, "Science", "Unit Test 1", 18.0, 50.0),
    ];

    for (source_key, student_id, subject, exam_title, score, total) in exams {
        sqlx::query(
            r#"
            INSERT INTO studydock_insight.exam_results
            (id, class_id, student_id, subject, exam_title, score, total, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(class_id.0)
        .bind(student_id)
        .bind(subject)
        .bind(exam_title)
        .bind(score)
        .bind(total)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn upsert_student(
    pool: &PgPool,
    id: StudentId,
    full_name: &str,
    class_id: ClassId,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO studydock_insight.students (id, full_name, class_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE
        SET full_name = EXCLUDED.full_name, class_id = EXCLUDED.class_id
        "#,
    )
    .bind(id.0)
    .bind(full_name)
    .bind(class_id.0)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_roster(pool: &PgPool, class_id: ClassId) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query(
        "SELECT id, full_name, class_id FROM studydock_insight.students \
         WHERE class_id = $1 ORDER BY id",
    )
    .bind(class_id.0)
    .fetch_all(pool)
    .await?;

    let mut students = Vec::new();
    for row in rows {
        students.push(Student {
            id: StudentId(row.get("id")),
            full_name: row.get("full_name"),
            class_id: ClassId(row.get("class_id")),
        });
    }

    Ok(students)
}

pub async fn fetch_attendance(
    pool: &PgPool,
    class_id: ClassId,
) -> anyhow::Result<Vec<AttendanceEntry>> {
    let rows = sqlx::query(
        "SELECT class_id, student_id, subject, taken_on, status \
         FROM studydock_insight.attendance_entries WHERE class_id = $1",
    )
    .bind(class_id.0)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(AttendanceEntry {
            class_id: ClassId(row.get("class_id")),
            student_id: StudentId(row.get("student_id")),
            subject: row.get("subject"),
            taken_on: row.get("taken_on"),
            status: row.get("status"),
        });
    }

    Ok(entries)
}

pub async fn fetch_exam_results(
    pool: &PgPool,
    class_id: ClassId,
) -> anyhow::Result<Vec<ExamResult>> {
    let rows = sqlx::query(
        "SELECT class_id, student_id, subject, exam_title, score, total \
         FROM studydock_insight.exam_results WHERE class_id = $1",
    )
    .bind(class_id.0)
    .fetch_all(pool)
    .await?;

    let mut results = Vec::new();
    for row in rows {
        results.push(ExamResult {
            class_id: ClassId(row.get("class_id")),
            student_id: StudentId(row.get("student_id")),
            subject: row.get("subject"),
            exam_title: row.get("exam_title"),
            score: row.get("score"),
            total: row.get("total"),
        });
    }

    Ok(results)
}

pub async fn import_attendance_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        class_id: ClassId,
        student_id: StudentId,
        full_name: String,
        subject: String,
        taken_on: NaiveDate,
        status: String,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        upsert_student(pool, row.student_id, &row.full_name, row.class_id).await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO studydock_insight.attendance_entries
            (id, class_id, student_id, subject, taken_on, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.class_id.0)
        .bind(row.student_id.0)
        .bind(&row.subject)
        .bind(row.taken_on)
        .bind(&row.status)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn import_exam_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        class_id: ClassId,
        student_id: StudentId,
        full_name: String,
        subject: String,
        exam_title: String,
        score: f64,
        total: f64,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        if row.total <= 0.0 {
            anyhow::bail!(
                "exam result for student {} ({}) has a non-positive total",
                row.student_id,
                row.exam_title
            );
        }
        if row.score < 0.0 {
            anyhow::bail!(
                "exam result for student {} ({}) has a negative score",
                row.student_id,
                row.exam_title
            );
        }

        upsert_student(pool, row.student_id, &row.full_name, row.class_id).await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO studydock_insight.exam_results
            (id, class_id, student_id, subject, exam_title, score, total, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.class_id.0)
        .bind(row.student_id.0)
        .bind(&row.subject)
        .bind(&row.exam_title)
        .bind(row.score)
        .bind(row.total)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn save_model(pool: &PgPool, model: &SavedModel) -> anyhow::Result<()> {
    let points_json =
        serde_json::to_string(&model.points).context("failed to serialize plot points")?;

    sqlx::query(
        r#"
        INSERT INTO studydock_insight.trend_models
        (class_id, generated_on, slope, intercept, r_squared, points_json)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (class_id) DO UPDATE
        SET generated_on = EXCLUDED.generated_on,
            slope = EXCLUDED.slope,
            intercept = EXCLUDED.intercept,
            r_squared = EXCLUDED.r_squared,
            points_json = EXCLUDED.points_json
        "#,
    )
    .bind(model.class_id.0)
    .bind(model.generated_on)
    .bind(model.fit.slope)
    .bind(model.fit.intercept)
    .bind(model.r_squared)
    .bind(points_json)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_model(pool: &PgPool, class_id: ClassId) -> anyhow::Result<Option<SavedModel>> {
    let row = sqlx::query(
        "SELECT class_id, generated_on, slope, intercept, r_squared, points_json \
         FROM studydock_insight.trend_models WHERE class_id = $1",
    )
    .bind(class_id.0)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let points: Vec<PlotPoint> = serde_json::from_str(row.get("points_json"))
        .context("stored plot points are not valid JSON")?;

    Ok(Some(SavedModel {
        class_id: ClassId(row.get("class_id")),
        generated_on: row.get("generated_on"),
        fit: LinearFit {
            slope: row.get("slope"),
            intercept: row.get("intercept"),
        },
        r_squared: row.get("r_squared"),
        points,
    }))
}
