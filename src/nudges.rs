use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::NudgeConfig;
use crate::dates::{
    date_label, days_between, elapsed_label, month_name, parse_date_or_null, relative_label,
};
use crate::documents::{missing_documents, REQUIRED_DOCUMENTS};
use crate::models::{
    Application, ApplicationStatus, MissingDocument, Nudge, NudgeCategory, Severity,
};

/// Deadline facts shared by every rule for one application.
struct DeadlineContext {
    due_date_label: Option<String>,
    days_remaining: Option<i64>,
    relative: Option<String>,
    passed: bool,
}

impl DeadlineContext {
    fn resolve(application: &Application, now: DateTime<Utc>) -> Self {
        let deadline = application
            .intake
            .as_ref()
            .and_then(|intake| parse_date_or_null(intake.app_deadline.as_deref()));

        match deadline {
            // A deadline behind `now` is always negative, even when it passed within the day.
            Some(deadline) if deadline < now => Self {
                due_date_label: Some(date_label(deadline)),
                days_remaining: Some(days_between(now, deadline).min(-1)),
                relative: Some(elapsed_label(deadline, now)),
                passed: true,
            },
            Some(deadline) => Self {
                due_date_label: Some(date_label(deadline)),
                days_remaining: Some(days_between(now, deadline)),
                relative: Some(relative_label(deadline, now)),
                passed: false,
            },
            None => Self {
                due_date_label: None,
                days_remaining: None,
                relative: None,
                passed: false,
            },
        }
    }

    fn is_urgent(&self, config: &NudgeConfig) -> bool {
        self.days_remaining
            .map(|days| days <= config.urgent_within_days)
            .unwrap_or(false)
    }
}

struct NudgeDraft {
    category: NudgeCategory,
    severity: Severity,
    title: String,
    description: String,
    action_label: Option<String>,
    action_href: Option<String>,
}

fn build(application: &Application, context: &DeadlineContext, draft: NudgeDraft) -> Nudge {
    let id = format!("{}-{}", draft.category, application.id);
    let fingerprint = format!(
        "{}|{}|{}|{}",
        id,
        draft.severity,
        context.due_date_label.as_deref().unwrap_or(""),
        draft.description
    );

    Nudge {
        id,
        fingerprint,
        application_id: application.id,
        category: draft.category,
        severity: draft.severity,
        title: draft.title,
        description: draft.description,
        action_label: draft.action_label,
        action_href: draft.action_href,
        due_date_label: context.due_date_label.clone(),
        days_remaining: context.days_remaining,
    }
}

fn application_href(application: &Application, tab: Option<&str>) -> String {
    match tab {
        Some(tab) => format!("/student/applications/{}?tab={}", application.id, tab),
        None => format!("/student/applications/{}", application.id),
    }
}

/// Emits every nudge one application currently warrants.
pub fn synthesize(
    application: &Application,
    missing: &[MissingDocument],
    now: DateTime<Utc>,
    config: &NudgeConfig,
) -> Vec<Nudge> {
    let context = DeadlineContext::resolve(application, now);
    let label = application.label();
    let mut nudges = Vec::new();

    if let Some(draft) = deadline_rule(application, &label, &context, config) {
        nudges.push(build(application, &context, draft));
    }

    if !missing.is_empty() {
        let severity = if context.is_urgent(config) {
            Severity::High
        } else {
            Severity::Medium
        };
        let names: Vec<&str> = missing.iter().map(|doc| doc.label.as_str()).collect();
        nudges.push(build(
            application,
            &context,
            NudgeDraft {
                category: NudgeCategory::Documents,
                severity,
                title: format!("Upload missing documents for {label}"),
                description: format!(
                    "{} document(s) still needed: {}.",
                    missing.len(),
                    names.join(", ")
                ),
                action_label: Some("Upload documents".to_string()),
                action_href: Some(application_href(application, Some("documents"))),
            },
        ));
    }

    let submitted = parse_date_or_null(application.submitted_at.as_deref()).is_some();
    if application.status == ApplicationStatus::Draft && !submitted {
        let severity = if context.is_urgent(config) {
            Severity::High
        } else {
            Severity::Medium
        };
        let description = match &context.relative {
            Some(relative) if context.passed => {
                format!("Still a draft and the deadline passed {relative}.")
            }
            Some(relative) => format!("Still a draft and the deadline is {relative}."),
            None => "Still a draft. Submit once your documents are ready.".to_string(),
        };
        nudges.push(build(
            application,
            &context,
            NudgeDraft {
                category: NudgeCategory::Submission,
                severity,
                title: format!("Submit {label}"),
                description,
                action_label: Some("Review and submit".to_string()),
                action_href: Some(application_href(application, None)),
            },
        ));
    }

    if let Some(draft) = stalled_rule(application, &label, now, config) {
        nudges.push(build(application, &context, draft));
    }

    nudges
}

fn deadline_rule(
    application: &Application,
    label: &str,
    context: &DeadlineContext,
    config: &NudgeConfig,
) -> Option<NudgeDraft> {
    if let (Some(days), Some(due)) = (context.days_remaining, &context.due_date_label) {
        if days > config.deadline_window_days {
            return None;
        }

        let severity = if days <= config.urgent_within_days {
            Severity::High
        } else if days <= config.soon_within_days {
            Severity::Medium
        } else {
            Severity::Low
        };
        let relative = context.relative.as_deref().unwrap_or("");
        let (title, description) = if context.passed {
            (
                format!("Deadline passed for {label}"),
                format!("The application deadline ({due}) passed {relative}. Contact the university about late submission."),
            )
        } else {
            (
                format!("Deadline approaching for {label}"),
                format!("Applications close on {due}, {relative}."),
            )
        };

        return Some(NudgeDraft {
            category: NudgeCategory::Deadline,
            severity,
            title,
            description,
            action_label: Some("Open application".to_string()),
            action_href: Some(application_href(application, None)),
        });
    }

    let intake = application.intake.as_ref()?;
    let period = match (intake.start_month.and_then(month_name), intake.start_year) {
        (Some(month), Some(year)) => format!("{month} {year}"),
        (Some(month), None) => month.to_string(),
        (None, Some(year)) => year.to_string(),
        (None, None) => return None,
    };

    Some(NudgeDraft {
        category: NudgeCategory::Deadline,
        severity: Severity::Low,
        title: format!("Confirm the deadline for {label}"),
        description: format!(
            "No application deadline is recorded for the {period} intake. Confirm it with your advisor."
        ),
        action_label: Some("Ask your advisor".to_string()),
        action_href: Some(application_href(application, Some("messages"))),
    })
}

fn stalled_rule(
    application: &Application,
    label: &str,
    now: DateTime<Utc>,
    config: &NudgeConfig,
) -> Option<NudgeDraft> {
    if application.status.is_terminal() {
        return None;
    }

    let last_activity = parse_date_or_null(application.updated_at.as_deref())
        .or_else(|| parse_date_or_null(application.created_at.as_deref()))?;
    let idle_days = (now - last_activity).num_days();
    if idle_days < config.stalled_after_days {
        return None;
    }

    Some(NudgeDraft {
        category: NudgeCategory::Stalled,
        severity: Severity::Low,
        title: format!("No recent activity on {label}"),
        description: format!(
            "Nothing has changed in {idle_days} days while the application is {}.",
            status_phrase(application.status)
        ),
        action_label: Some("Check status".to_string()),
        action_href: Some(application_href(application, Some("timeline"))),
    })
}

fn status_phrase(status: ApplicationStatus) -> &'static str {
    match status {
        ApplicationStatus::Draft => "in draft",
        ApplicationStatus::Submitted => "submitted",
        ApplicationStatus::Screening => "in screening",
        ApplicationStatus::ConditionalOffer => "holding a conditional offer",
        ApplicationStatus::UnconditionalOffer => "holding an unconditional offer",
        ApplicationStatus::Visa => "at the visa stage",
        ApplicationStatus::Enrolled => "enrolled",
        ApplicationStatus::Withdrawn => "withdrawn",
        ApplicationStatus::Deferred => "deferred",
    }
}

/// Keeps the most severe nudge per id and orders the survivors for display.
pub fn dedupe_and_rank(nudges: Vec<Nudge>) -> Vec<Nudge> {
    let mut by_id: BTreeMap<String, Nudge> = BTreeMap::new();

    for nudge in nudges {
        match by_id.get(&nudge.id) {
            Some(existing) if !outranks(&nudge, existing) => {}
            _ => {
                by_id.insert(nudge.id.clone(), nudge);
            }
        }
    }

    let mut ranked: Vec<Nudge> = by_id.into_values().collect();
    ranked.sort_by(display_order);
    ranked
}

fn outranks(candidate: &Nudge, existing: &Nudge) -> bool {
    match candidate.severity.rank().cmp(&existing.severity.rank()) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => candidate.fingerprint < existing.fingerprint,
    }
}

fn display_order(a: &Nudge, b: &Nudge) -> Ordering {
    a.severity
        .rank()
        .cmp(&b.severity.rank())
        .then_with(|| compare_days(a.days_remaining, b.days_remaining))
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.application_id.cmp(&b.application_id))
        .then_with(|| a.id.cmp(&b.id))
}

fn compare_days(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Runs every rule across the application list and returns the ranked result.
pub fn generate(
    applications: &[Application],
    documents: &HashMap<Uuid, BTreeSet<String>>,
    now: DateTime<Utc>,
    config: &NudgeConfig,
) -> Vec<Nudge> {
    let empty = BTreeSet::new();
    let mut all = Vec::new();

    for application in applications {
        let on_file = documents.get(&application.id).unwrap_or(&empty);
        let missing = missing_documents(on_file, REQUIRED_DOCUMENTS);
        let nudges = synthesize(application, &missing, now, config);
        debug!(
            application_id = %application.id,
            status = %application.status,
            missing = missing.len(),
            emitted = nudges.len(),
            "synthesized nudges"
        );
        all.extend(nudges);
    }

    dedupe_and_rank(all)
}
