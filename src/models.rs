use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage of an application as recorded by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    Screening,
    ConditionalOffer,
    UnconditionalOffer,
    Visa,
    Enrolled,
    Withdrawn,
    Deferred,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Screening => "screening",
            ApplicationStatus::ConditionalOffer => "conditional_offer",
            ApplicationStatus::UnconditionalOffer => "unconditional_offer",
            ApplicationStatus::Visa => "visa",
            ApplicationStatus::Enrolled => "enrolled",
            ApplicationStatus::Withdrawn => "withdrawn",
            ApplicationStatus::Deferred => "deferred",
        }
    }

    /// Statuses where nobody is expected to move the application forward.
    pub fn is_terminal(&self) -> bool {
        match self {
            ApplicationStatus::Withdrawn
            | ApplicationStatus::Deferred
            | ApplicationStatus::Enrolled => true,
            ApplicationStatus::Draft
            | ApplicationStatus::Submitted
            | ApplicationStatus::Screening
            | ApplicationStatus::ConditionalOffer
            | ApplicationStatus::UnconditionalOffer
            | ApplicationStatus::Visa => false,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown application status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ApplicationStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(ApplicationStatus::Draft),
            "submitted" => Ok(ApplicationStatus::Submitted),
            "screening" => Ok(ApplicationStatus::Screening),
            "conditional_offer" => Ok(ApplicationStatus::ConditionalOffer),
            "unconditional_offer" => Ok(ApplicationStatus::UnconditionalOffer),
            "visa" => Ok(ApplicationStatus::Visa),
            "enrolled" => Ok(ApplicationStatus::Enrolled),
            "withdrawn" => Ok(ApplicationStatus::Withdrawn),
            "deferred" => Ok(ApplicationStatus::Deferred),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

/// Intake window an application targets. Timestamps stay as the backend sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intake {
    pub app_deadline: Option<String>,
    pub start_month: Option<u32>,
    pub start_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub student_email: String,
    pub program_name: Option<String>,
    pub university_name: Option<String>,
    pub status: ApplicationStatus,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub submitted_at: Option<String>,
    pub intake: Option<Intake>,
}

impl Application {
    pub fn label(&self) -> String {
        let program = non_blank(self.program_name.as_deref());
        let university = non_blank(self.university_name.as_deref());

        match (program, university) {
            (Some(program), Some(university)) => format!("{program} at {university}"),
            (Some(name), None) | (None, Some(name)) => name.to_string(),
            (None, None) => "Untitled application".to_string(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Catalogue entry for a document every application must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredDocument {
    pub doc_type: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingDocument {
    pub doc_type: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeCategory {
    Deadline,
    Documents,
    Submission,
    Stalled,
}

impl NudgeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NudgeCategory::Deadline => "deadline",
            NudgeCategory::Documents => "documents",
            NudgeCategory::Submission => "submission",
            NudgeCategory::Stalled => "stalled",
        }
    }
}

impl fmt::Display for NudgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Lower rank means more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::High => 0,
            Severity::Medium => 1,
            Severity::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory reminder derived from an application. Recomputed on every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Nudge {
    pub id: String,
    pub fingerprint: String,
    pub application_id: Uuid,
    pub category: NudgeCategory,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub action_label: Option<String>,
    pub action_href: Option<String>,
    pub due_date_label: Option<String>,
    pub days_remaining: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application(program: Option<&str>, university: Option<&str>) -> Application {
        Application {
            id: Uuid::new_v4(),
            student_email: "mina.okafor@example.com".to_string(),
            program_name: program.map(str::to_string),
            university_name: university.map(str::to_string),
            status: ApplicationStatus::Draft,
            created_at: None,
            updated_at: None,
            submitted_at: None,
            intake: None,
        }
    }

    #[test]
    fn label_combines_program_and_university() {
        let app = application(Some("MSc Data Science"), Some("University of Leeds"));
        assert_eq!(app.label(), "MSc Data Science at University of Leeds");
    }

    #[test]
    fn label_falls_back_when_names_missing() {
        assert_eq!(application(None, Some("TU Delft")).label(), "TU Delft");
        assert_eq!(application(Some("  "), None).label(), "Untitled application");
    }

    #[test]
    fn status_parses_snake_case_and_rejects_unknown() {
        assert_eq!(
            "conditional_offer".parse::<ApplicationStatus>(),
            Ok(ApplicationStatus::ConditionalOffer)
        );
        assert_eq!(" Enrolled ".parse::<ApplicationStatus>(), Ok(ApplicationStatus::Enrolled));
        assert_eq!(
            "archived".parse::<ApplicationStatus>(),
            Err(UnknownStatus("archived".to_string()))
        );
    }

    #[test]
    fn terminal_statuses_are_withdrawn_deferred_enrolled() {
        assert!(ApplicationStatus::Withdrawn.is_terminal());
        assert!(ApplicationStatus::Deferred.is_terminal());
        assert!(ApplicationStatus::Enrolled.is_terminal());
        assert!(!ApplicationStatus::Visa.is_terminal());
        assert!(!ApplicationStatus::Draft.is_terminal());
    }

    #[test]
    fn severity_rank_orders_high_first() {
        assert!(Severity::High.rank() < Severity::Medium.rank());
        assert!(Severity::Medium.rank() < Severity::Low.rank());
    }
}
