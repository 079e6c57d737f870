use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dates::parse_date_or_null;
use crate::documents::is_known_type;
use crate::models::{Application, ApplicationStatus, Intake};

pub type DocumentIndex = HashMap<Uuid, BTreeSet<String>>;

const UTC_TEXT: &str = r#"'YYYY-MM-DD"T"HH24:MI:SS"Z"'"#;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

struct SeedApplication {
    source_key: &'static str,
    email: &'static str,
    program: &'static str,
    university: &'static str,
    status: ApplicationStatus,
    intake: &'static str,
    updated_days_ago: i64,
    submitted: bool,
    documents: &'static [&'static str],
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let now = Utc::now();
    let intakes = [
        ("Leeds Sep 2027", Some(now + Duration::days(5)), Some(9), Some(2027)),
        ("Delft Sep 2027", Some(now + Duration::days(45)), Some(9), Some(2027)),
        ("Toronto Jan 2027", Some(now - Duration::days(3)), Some(1), Some(2027)),
        ("Melbourne 2027", None, None, Some(2027)),
        ("London Sep 2027", Some(now + Duration::days(200)), Some(9), Some(2027)),
    ];

    for (label, deadline, month, year) in intakes {
        upsert_intake(pool, label, deadline, month, year).await?;
    }

    let applications = [
        SeedApplication {
            source_key: "seed-001",
            email: "mina.okafor@example.com",
            program: "MSc Data Science",
            university: "University of Leeds",
            status: ApplicationStatus::Draft,
            intake: "Leeds Sep 2027",
            updated_days_ago: 1,
            submitted: false,
            documents: &["passport", "transcript", "english_test"],
        },
        SeedApplication {
            source_key: "seed-002",
            email: "mina.okafor@example.com",
            program: "MSc Robotics",
            university: "TU Delft",
            status: ApplicationStatus::Submitted,
            intake: "Delft Sep 2027",
            updated_days_ago: 14,
            submitted: true,
            documents: &["passport", "transcript", "sop", "cv", "english_test"],
        },
        SeedApplication {
            source_key: "seed-003",
            email: "arjun.mehta@example.com",
            program: "MEng Civil Engineering",
            university: "University of Toronto",
            status: ApplicationStatus::Screening,
            intake: "Toronto Jan 2027",
            updated_days_ago: 4,
            submitted: true,
            documents: &["passport", "transcript", "sop"],
        },
        SeedApplication {
            source_key: "seed-004",
            email: "arjun.mehta@example.com",
            program: "Master of Public Health",
            university: "University of Melbourne",
            status: ApplicationStatus::ConditionalOffer,
            intake: "Melbourne 2027",
            updated_days_ago: 20,
            submitted: true,
            documents: &["passport", "transcript", "sop", "cv", "english_test"],
        },
        SeedApplication {
            source_key: "seed-005",
            email: "lucia.ferreira@example.com",
            program: "BA International Relations",
            university: "King's College London",
            status: ApplicationStatus::Enrolled,
            intake: "London Sep 2027",
            updated_days_ago: 90,
            submitted: true,
            documents: &["passport", "transcript", "sop", "cv", "english_test"],
        },
    ];

    let count = applications.len();
    for entry in applications {
        let intake_id: Uuid = sqlx::query("SELECT id FROM study_abroad.intakes WHERE label = $1")
            .bind(entry.intake)
            .fetch_one(pool)
            .await?
            .get("id");

        let application_id = upsert_application(
            pool,
            NewApplication {
                source_key: entry.source_key.to_string(),
                student_email: entry.email.to_string(),
                program_name: Some(entry.program.to_string()),
                university_name: Some(entry.university.to_string()),
                status: entry.status,
                intake_id: Some(intake_id),
                created_at: Some(now - Duration::days(entry.updated_days_ago + 30)),
                updated_at: Some(now - Duration::days(entry.updated_days_ago)),
                submitted_at: entry
                    .submitted
                    .then(|| now - Duration::days(entry.updated_days_ago)),
            },
        )
        .await?;

        for document_type in entry.documents {
            insert_document(pool, application_id, document_type).await?;
        }
    }

    info!(applications = count, "seed data upserted");
    Ok(())
}

async fn upsert_intake(
    pool: &PgPool,
    label: &str,
    deadline: Option<DateTime<Utc>>,
    start_month: Option<i32>,
    start_year: Option<i32>,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO study_abroad.intakes (id, label, app_deadline, start_month, start_year)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (label) DO UPDATE
        SET app_deadline = EXCLUDED.app_deadline,
            start_month = EXCLUDED.start_month,
            start_year = EXCLUDED.start_year
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(label)
    .bind(deadline)
    .bind(start_month)
    .bind(start_year)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

struct NewApplication {
    source_key: String,
    student_email: String,
    program_name: Option<String>,
    university_name: Option<String>,
    status: ApplicationStatus,
    intake_id: Option<Uuid>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
}

async fn upsert_application(pool: &PgPool, row: NewApplication) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO study_abroad.applications
        (id, student_email, program_name, university_name, status, intake_id,
         created_at, updated_at, submitted_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, now()), $8, $9, $10)
        ON CONFLICT (source_key) DO UPDATE
        SET student_email = EXCLUDED.student_email,
            program_name = EXCLUDED.program_name,
            university_name = EXCLUDED.university_name,
            status = EXCLUDED.status,
            intake_id = EXCLUDED.intake_id,
            updated_at = EXCLUDED.updated_at,
            submitted_at = EXCLUDED.submitted_at
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&row.student_email)
    .bind(&row.program_name)
    .bind(&row.university_name)
    .bind(row.status.as_str())
    .bind(row.intake_id)
    .bind(row.created_at)
    .bind(row.updated_at)
    .bind(row.submitted_at)
    .bind(&row.source_key)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn insert_document(
    pool: &PgPool,
    application_id: Uuid,
    document_type: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO study_abroad.application_documents (id, application_id, document_type)
        VALUES ($1, $2, $3)
        ON CONFLICT (application_id, document_type) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(application_id)
    .bind(document_type)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Student filters compare emails case-insensitively, matching `lower()` in Postgres.
pub fn matches_student(student_email: &str, student: &str) -> bool {
    student_email.trim().to_lowercase() == student.trim().to_lowercase()
}

fn applications_query(scoped: bool) -> String {
    let mut query = format!(
        "SELECT a.id, a.student_email, a.program_name, a.university_name, a.status, a.intake_id, \
         to_char(a.created_at AT TIME ZONE 'UTC', {UTC_TEXT}) AS created_at, \
         to_char(a.updated_at AT TIME ZONE 'UTC', {UTC_TEXT}) AS updated_at, \
         to_char(a.submitted_at AT TIME ZONE 'UTC', {UTC_TEXT}) AS submitted_at, \
         to_char(i.app_deadline AT TIME ZONE 'UTC', {UTC_TEXT}) AS app_deadline, \
         i.start_month, i.start_year \
         FROM study_abroad.applications a \
         LEFT JOIN study_abroad.intakes i ON i.id = a.intake_id"
    );

    if scoped {
        query.push_str(" WHERE lower(a.student_email) = lower(trim($1))");
    }
    query.push_str(" ORDER BY a.created_at, a.id");
    query
}

pub async fn fetch_applications(
    pool: &PgPool,
    student_email: Option<&str>,
) -> anyhow::Result<Vec<Application>> {
    let query = applications_query(student_email.is_some());
    let mut rows = sqlx::query(&query);
    if let Some(email) = student_email {
        rows = rows.bind(email);
    }

    let records = rows.fetch_all(pool).await?;
    let mut applications = Vec::with_capacity(records.len());

    for row in records {
        let id: Uuid = row.get("id");
        let raw_status: String = row.get("status");
        let status = match raw_status.parse::<ApplicationStatus>() {
            Ok(status) => status,
            Err(err) => {
                warn!(application_id = %id, error = %err, "skipping application");
                continue;
            }
        };

        let intake = row
            .get::<Option<Uuid>, _>("intake_id")
            .map(|_| Intake {
                app_deadline: row.get("app_deadline"),
                start_month: row
                    .get::<Option<i32>, _>("start_month")
                    .and_then(|month| u32::try_from(month).ok()),
                start_year: row.get("start_year"),
            });

        applications.push(Application {
            id,
            student_email: row.get("student_email"),
            program_name: row.get("program_name"),
            university_name: row.get("university_name"),
            status,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            submitted_at: row.get("submitted_at"),
            intake,
        });
    }

    Ok(applications)
}

pub async fn fetch_documents(
    pool: &PgPool,
    application_ids: &[Uuid],
) -> anyhow::Result<DocumentIndex> {
    let mut index = DocumentIndex::new();
    if application_ids.is_empty() {
        return Ok(index);
    }

    let records = sqlx::query(
        "SELECT application_id, document_type \
         FROM study_abroad.application_documents \
         WHERE application_id = ANY($1)",
    )
    .bind(application_ids.to_vec())
    .fetch_all(pool)
    .await?;

    for row in records {
        index
            .entry(row.get("application_id"))
            .or_default()
            .insert(row.get("document_type"));
    }

    Ok(index)
}

/// One application per line. `documents` lists document types separated by `;`.
#[derive(Debug, Deserialize)]
struct CsvRow {
    source_key: Option<String>,
    student_email: String,
    program_name: Option<String>,
    university_name: Option<String>,
    status: String,
    created_at: Option<String>,
    updated_at: Option<String>,
    submitted_at: Option<String>,
    intake: Option<String>,
    app_deadline: Option<String>,
    intake_month: Option<u32>,
    intake_year: Option<i32>,
    documents: Option<String>,
}

impl CsvRow {
    fn key(&self, line: usize) -> String {
        self.source_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("{}-{}", self.student_email, line))
    }

    fn has_intake(&self) -> bool {
        self.intake.is_some()
            || self.app_deadline.is_some()
            || self.intake_month.is_some()
            || self.intake_year.is_some()
    }

    fn document_types(&self) -> BTreeSet<String> {
        self.documents
            .as_deref()
            .unwrap_or("")
            .split(';')
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .collect()
    }
}

fn read_csv(csv_path: &Path) -> anyhow::Result<Vec<CsvRow>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV record {}", index + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Reads applications straight from a CSV export. Ids are derived from the source key so
/// they, and the fingerprints built from them, stay stable across runs.
pub fn load_csv(csv_path: &Path) -> anyhow::Result<(Vec<Application>, DocumentIndex)> {
    let mut applications = Vec::new();
    let mut documents = DocumentIndex::new();

    for (index, row) in read_csv(csv_path)?.into_iter().enumerate() {
        let line = index + 1;
        let status = match row.status.parse::<ApplicationStatus>() {
            Ok(status) => status,
            Err(err) => {
                warn!(line, error = %err, "skipping CSV record");
                continue;
            }
        };

        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, row.key(line).as_bytes());
        let intake = row.has_intake().then(|| Intake {
            app_deadline: row.app_deadline.clone(),
            start_month: row.intake_month,
            start_year: row.intake_year,
        });
        documents.insert(id, row.document_types());

        applications.push(Application {
            id,
            student_email: row.student_email,
            program_name: row.program_name,
            university_name: row.university_name,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            submitted_at: row.submitted_at,
            intake,
        });
    }

    Ok((applications, documents))
}

fn timestamp_column(line: usize, column: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
    let parsed = parse_date_or_null(value);
    if parsed.is_none() && value.is_some_and(|raw| !raw.trim().is_empty()) {
        warn!(line, column, "unparsable timestamp stored as NULL");
    }
    parsed
}

pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let mut imported = 0usize;
    let mut documents_added = 0usize;

    for (index, row) in read_csv(csv_path)?.into_iter().enumerate() {
        let line = index + 1;
        let status = match row.status.parse::<ApplicationStatus>() {
            Ok(status) => status,
            Err(err) => {
                warn!(line, error = %err, "skipping CSV record");
                continue;
            }
        };

        let intake_id = if row.has_intake() {
            let label = row.intake.clone().unwrap_or_else(|| {
                format!(
                    "{} {}",
                    row.university_name.as_deref().unwrap_or("Unknown university"),
                    row.key(line)
                )
            });
            let deadline = timestamp_column(line, "app_deadline", row.app_deadline.as_deref());
            let month = row.intake_month.and_then(|month| i32::try_from(month).ok());
            Some(upsert_intake(pool, &label, deadline, month, row.intake_year).await?)
        } else {
            None
        };

        let document_types = row.document_types();
        let application_id = upsert_application(
            pool,
            NewApplication {
                source_key: row.key(line),
                created_at: timestamp_column(line, "created_at", row.created_at.as_deref()),
                updated_at: timestamp_column(line, "updated_at", row.updated_at.as_deref()),
                submitted_at: timestamp_column(line, "submitted_at", row.submitted_at.as_deref()),
                student_email: row.student_email,
                program_name: row.program_name,
                university_name: row.university_name,
                status,
                intake_id,
            },
        )
        .await?;

        for document_type in &document_types {
            if !is_known_type(document_type) {
                warn!(line, document_type = %document_type, "document type is not in the required catalogue");
            }
            if insert_document(pool, application_id, document_type).await? {
                documents_added += 1;
            }
        }

        imported += 1;
    }

    info!(imported, documents_added, path = %csv_path.display(), "csv import finished");
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(name: &str, body: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("nudges-{name}-{}.csv", Uuid::new_v4()));
        std::fs::write(&path, body).expect("write scratch csv");
        path
    }

    const HEADER: &str = "source_key,student_email,program_name,university_name,status,created_at,updated_at,submitted_at,intake,app_deadline,intake_month,intake_year,documents\n";

    #[test]
    fn load_csv_builds_applications_and_document_index() {
        let body = format!(
            "{HEADER}\
             app-1,mina.okafor@example.com,MSc Data Science,University of Leeds,draft,2026-09-01,2026-10-15,,Leeds Sep 2027,2026-10-24T23:59:00Z,9,2027,passport; Transcript\n\
             app-2,arjun.mehta@example.com,MEng Civil Engineering,University of Toronto,screening,2026-08-01,2026-10-01,2026-09-01,,,,,\n"
        );
        let path = write_csv("load", &body);

        let (applications, documents) = load_csv(&path).expect("csv loads");
        std::fs::remove_file(&path).ok();

        assert_eq!(applications.len(), 2);
        let first = &applications[0];
        assert_eq!(first.status, ApplicationStatus::Draft);
        assert_eq!(first.submitted_at, None);
        let intake = first.intake.as_ref().expect("intake present");
        assert_eq!(intake.app_deadline.as_deref(), Some("2026-10-24T23:59:00Z"));
        assert_eq!(intake.start_month, Some(9));
        assert_eq!(
            documents.get(&first.id),
            Some(&BTreeSet::from(["passport".to_string(), "transcript".to_string()]))
        );

        let second = &applications[1];
        assert!(second.intake.is_none());
        assert_eq!(documents.get(&second.id), Some(&BTreeSet::new()));
    }

    #[test]
    fn student_filter_ignores_case_in_both_sources() {
        assert!(matches_student("Mina.Okafor@Example.com", "mina.okafor@example.com"));
        assert!(matches_student("mina.okafor@example.com", " MINA.OKAFOR@EXAMPLE.COM "));
        assert!(!matches_student("mina.okafor@example.com", "arjun.mehta@example.com"));

        let scoped = applications_query(true);
        assert!(scoped.contains("WHERE lower(a.student_email) = lower(trim($1))"));
        assert!(!applications_query(false).contains("WHERE"));
    }

    #[test]
    fn load_csv_ids_are_stable_and_unknown_statuses_skipped() {
        let body = format!(
            "{HEADER}\
             app-1,mina.okafor@example.com,MSc Data Science,University of Leeds,draft,,,,,,,,\n\
             app-2,mina.okafor@example.com,MSc Robotics,TU Delft,archived,,,,,,,,\n"
        );
        let path = write_csv("stable", &body);

        let (first, _) = load_csv(&path).expect("csv loads");
        let (second, _) = load_csv(&path).expect("csv loads again");
        std::fs::remove_file(&path).ok();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(
            first[0].id,
            Uuid::new_v5(&Uuid::NAMESPACE_OID, "app-1".as_bytes())
        );
    }
}
