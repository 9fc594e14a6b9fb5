use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod db;
mod metrics;
mod models;
mod regression;
mod report;

use models::{ClassId, MetricPoint, PlotPoint, SavedModel};

#[derive(Parser)]
#[command(name = "studydock-insight")]
#[command(about = "Attendance vs exam performance insight reports for StudyDock classes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import attendance or exam records from a CSV file
    #[command(group(
        ArgGroup::new("source")
            .args(["attendance", "exams"])
            .required(true)
            .multiple(false)
    ))]
    Import {
        #[arg(long)]
        attendance: Option<PathBuf>,
        #[arg(long)]
        exams: Option<PathBuf>,
    },
    /// Generate a markdown report for one class
    Report {
        #[arg(long)]
        class: ClassId,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Also compute the coefficient of determination
        #[arg(long)]
        r_squared: bool,
        /// Persist the fitted model for this class (upsert, last write wins)
        #[arg(long)]
        save: bool,
    },
    /// List the students furthest from the class trend
    Outliers {
        #[arg(long)]
        class: ClassId,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the persisted model for one class
    ShowModel {
        #[arg(long)]
        class: ClassId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { attendance, exams } => {
            if let Some(csv) = attendance {
                let inserted = db::import_attendance_csv(&pool, &csv).await?;
                println!(
                    "Inserted {inserted} attendance entries from {}.",
                    csv.display()
                );
            } else if let Some(csv) = exams {
                let inserted = db::import_exam_csv(&pool, &csv).await?;
                println!("Inserted {inserted} exam results from {}.", csv.display());
            }
        }
        Commands::Report {
            class,
            out,
            r_squared,
            save,
        } => {
            let points = load_metric_points(&pool, class).await?;
            let fit = match regression::fit_linear_regression(&points) {
                Ok(fit) => fit,
                Err(err) => {
                    println!("Cannot build report for class {class}: {err}");
                    return Ok(());
                }
            };
            let r_squared = if r_squared {
                match regression::r_squared(&points, &fit) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        println!("Cannot build report for class {class}: {err}");
                        return Ok(());
                    }
                }
            } else {
                None
            };

            let generated_on = Utc::now().date_naive();
            let reports = regression::classify_students(&points, &fit);
            let rendered = report::build_report(class, generated_on, &fit, r_squared, &reports);
            std::fs::write(&out, rendered)?;
            println!("Report written to {}.", out.display());

            if save {
                let model = SavedModel {
                    class_id: class,
                    generated_on,
                    fit,
                    r_squared,
                    points: plot_points(&points),
                };
                db::save_model(&pool, &model).await?;
                println!("Model saved for class {class}.");
            }
        }
        Commands::Outliers { class, limit } => {
            let points = load_metric_points(&pool, class).await?;
            let fit = match regression::fit_linear_regression(&points) {
                Ok(fit) => fit,
                Err(err) => {
                    println!("Cannot score class {class}: {err}");
                    return Ok(());
                }
            };

            let mut reports = regression::classify_students(&points, &fit);
            reports.sort_by(|a, b| {
                b.residual
                    .abs()
                    .partial_cmp(&a.residual.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            println!("Students furthest from the class trend:");
            for report in reports.iter().take(limit) {
                let direction = if report.residual >= 0.0 { "above" } else { "below" };
                println!(
                    "- {}: {:.1} points {} trend (attendance {:.1}%, exam avg {:.1}%) [{}]",
                    report.student_name,
                    report.residual.abs(),
                    direction,
                    report.attendance_percent,
                    report.exam_average_percent,
                    report.status
                );
            }
        }
        Commands::ShowModel { class } => match db::load_model(&pool, class).await? {
            Some(model) => {
                println!(
                    "Model for class {} (generated {}): predicted = {:.4} x attendance + {:.4}",
                    model.class_id, model.generated_on, model.fit.slope, model.fit.intercept
                );
                match model.r_squared {
                    Some(value) => println!("r-squared: {value:.4}"),
                    None => println!("r-squared: not computed"),
                }
                println!("{} stored points.", model.points.len());
            }
            None => println!("No saved model for class {class}."),
        },
    }

    Ok(())
}

async fn load_metric_points(pool: &PgPool, class: ClassId) -> anyhow::Result<Vec<MetricPoint>> {
    let students = db::fetch_roster(pool, class).await?;
    let attendance = db::fetch_attendance(pool, class).await?;
    let exams = db::fetch_exam_results(pool, class).await?;
    Ok(metrics::build_metric_points(&students, &attendance, &exams))
}

fn plot_points(points: &[MetricPoint]) -> Vec<PlotPoint> {
    points
        .iter()
        .map(|p| PlotPoint {
            x: p.attendance_percent,
            y: p.exam_average_percent,
            name: p.student_name.clone(),
        })
        .collect()
}
