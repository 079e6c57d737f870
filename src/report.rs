use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{Nudge, NudgeCategory, Severity};

#[derive(Debug, Clone, PartialEq)]
pub struct CategorySummary {
    pub category: NudgeCategory,
    pub count: usize,
    pub high: usize,
}

pub fn summarize_by_category(nudges: &[Nudge]) -> Vec<CategorySummary> {
    let mut map: std::collections::BTreeMap<NudgeCategory, (usize, usize)> =
        std::collections::BTreeMap::new();

    for nudge in nudges {
        let entry = map.entry(nudge.category).or_insert((0, 0));
        entry.0 += 1;
        if nudge.severity == Severity::High {
            entry.1 += 1;
        }
    }

    let mut summaries: Vec<CategorySummary> = map
        .into_iter()
        .map(|(category, (count, high))| CategorySummary {
            category,
            count,
            high,
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then(a.category.cmp(&b.category)));
    summaries
}

pub fn format_line(nudge: &Nudge) -> String {
    let due = match (&nudge.due_date_label, nudge.days_remaining) {
        (Some(label), Some(days)) => format!(" (due {label}, {days} days)"),
        _ => String::new(),
    };
    format!(
        "[{}] {}{}: {}",
        nudge.severity, nudge.title, due, nudge.description
    )
}

pub fn build_report(
    scope: Option<&str>,
    now: DateTime<Utc>,
    nudges: &[Nudge],
    dismissed: usize,
) -> String {
    let summaries = summarize_by_category(nudges);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all students");

    let _ = writeln!(output, "# Application Nudge Report");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        scope_label,
        now.format("%Y-%m-%d %H:%M UTC")
    );
    if dismissed > 0 {
        let _ = writeln!(output, "{dismissed} dismissed nudge(s) hidden.");
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    if summaries.is_empty() {
        let _ = writeln!(output, "Nothing needs attention right now.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} nudge(s), {} high",
                summary.category, summary.count, summary.high
            );
        }
    }

    for (severity, heading) in [
        (Severity::High, "## Act Now"),
        (Severity::Medium, "## Coming Up"),
        (Severity::Low, "## Keep An Eye On"),
    ] {
        let section: Vec<&Nudge> = nudges
            .iter()
            .filter(|nudge| nudge.severity == severity)
            .collect();
        if section.is_empty() {
            continue;
        }

        let _ = writeln!(output);
        let _ = writeln!(output, "{heading}");
        for nudge in section {
            let _ = writeln!(output, "- {}", format_line(nudge));
            if let (Some(label), Some(href)) = (&nudge.action_label, &nudge.action_href) {
                let _ = writeln!(output, "  - [{label}]({href})");
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_nudge(category: NudgeCategory, severity: Severity, days: Option<i64>) -> Nudge {
        let id = format!("{category}-{}", Uuid::nil());
        Nudge {
            fingerprint: format!("{id}|{severity}"),
            id,
            application_id: Uuid::nil(),
            category,
            severity,
            title: format!("{category} for MSc Data Science at University of Leeds"),
            description: "Applications close soon.".to_string(),
            action_label: Some("Open application".to_string()),
            action_href: Some("/student/applications/x".to_string()),
            due_date_label: days.map(|_| "2026-10-24".to_string()),
            days_remaining: days,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T09:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn summary_counts_by_category() {
        let nudges = vec![
            sample_nudge(NudgeCategory::Documents, Severity::High, Some(5)),
            sample_nudge(NudgeCategory::Documents, Severity::Medium, None),
            sample_nudge(NudgeCategory::Stalled, Severity::Low, None),
        ];

        let summaries = summarize_by_category(&nudges);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].category, NudgeCategory::Documents);
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].high, 1);
    }

    #[test]
    fn report_groups_by_severity() {
        let nudges = vec![
            sample_nudge(NudgeCategory::Deadline, Severity::High, Some(5)),
            sample_nudge(NudgeCategory::Stalled, Severity::Low, None),
        ];

        let report = build_report(Some("mina.okafor@example.com"), now(), &nudges, 2);
        assert!(report.contains("Generated for mina.okafor@example.com at 2026-10-19 09:00 UTC"));
        assert!(report.contains("2 dismissed nudge(s) hidden."));
        assert!(report.contains("## Act Now"));
        assert!(report.contains("(due 2026-10-24, 5 days)"));
        assert!(report.contains("## Keep An Eye On"));
        assert!(!report.contains("## Coming Up"));
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(None, now(), &[], 0);
        assert!(report.contains("all students"));
        assert!(report.contains("Nothing needs attention right now."));
    }
}
