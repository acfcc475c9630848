use rosterlink_core::domain::document::DocumentKind;
use rosterlink_core::escalation::EscalationAlert;

const MAX_LISTED_PARTICIPANTS: usize = 5;

/// Escape the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub fn deep_link(app_base_url: &str, alert: &EscalationAlert) -> String {
    format!("{}/documents/{}", app_base_url.trim_end_matches('/'), alert.document_id)
}

fn participant_summary(participants: &[String]) -> String {
    if participants.is_empty() {
        return "none".to_string();
    }

    let listed: Vec<String> = participants
        .iter()
        .take(MAX_LISTED_PARTICIPANTS)
        .map(|participant| escape_markdown(participant))
        .collect();
    let hidden = participants.len().saturating_sub(MAX_LISTED_PARTICIPANTS);
    if hidden == 0 {
        listed.join(", ")
    } else {
        format!("{} (+{hidden} more)", listed.join(", "))
    }
}

/// Multi-line alert body sent with `parse_mode = Markdown`.
pub fn render_alert(alert: &EscalationAlert, app_base_url: Option<&str>) -> String {
    let kind = match alert.kind {
        DocumentKind::Transcript => "Meeting transcript",
        DocumentKind::FormResponse => "Form response",
    };

    let mut lines = vec![
        "*Document needs a client*".to_string(),
        // Legacy Markdown ignores escapes inside an entity, so user text stays unstyled.
        format!("{kind}: {}", escape_markdown(&alert.title)),
        format!("Date: {}", alert.timestamp.format("%Y-%m-%d %H:%M UTC")),
        format!("Document: `{}`", alert.document_id),
        format!("Participants: {}", participant_summary(&alert.participants)),
        format!("Status: {}", alert.status.as_str()),
    ];

    if let Some(reason) = alert.last_reason.as_deref().filter(|reason| !reason.is_empty()) {
        lines.push(format!("Last attempt: {}", escape_markdown(reason)));
    }
    if let Some(base) = app_base_url.filter(|base| !base.trim().is_empty()) {
        lines.push(format!("[Resolve manually]({})", deep_link(base, alert)));
    }
    if let Some(preview) = alert.preview.as_deref() {
        lines.push(String::new());
        lines.push(escape_markdown(preview));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use rosterlink_core::domain::client::OwnerId;
    use rosterlink_core::domain::document::{DocumentKind, LinkableDocument};
    use rosterlink_core::escalation::EscalationAlert;

    use super::{deep_link, escape_markdown, render_alert};

    fn alert(participants: &[&str], content: Option<&str>) -> EscalationAlert {
        let at = Utc.with_ymd_and_hms(2026, 5, 11, 9, 5, 0).single().expect("valid date");
        let mut document = LinkableDocument::new(
            "doc_42",
            OwnerId("owner-1".to_string()),
            DocumentKind::Transcript,
            "Q2 *kickoff*",
            at,
        )
        .with_participants(participants.iter().copied());
        if let Some(content) = content {
            document = document.with_content(content);
        }
        EscalationAlert::from_document(&document)
    }

    #[test]
    fn markdown_control_characters_are_escaped() {
        assert_eq!(escape_markdown("a_b*c`d[e]"), "a\\_b\\*c\\`d\\[e]");
    }

    #[test]
    fn alert_lists_document_facts_and_deep_link() {
        let text = render_alert(
            &alert(&["pat@gmail.com"], Some("Talked about renewals.")),
            Some("https://app.example.com/"),
        );

        assert!(text.starts_with("*Document needs a client*"));
        assert!(text.contains("Meeting transcript: Q2 \\*kickoff\\*\n"));
        assert!(text.contains("Date: 2026-05-11 09:05 UTC"));
        assert!(text.contains("Participants: pat@gmail.com"));
        assert!(text.contains("[Resolve manually](https://app.example.com/documents/doc_42)"));
        assert!(text.ends_with("\n\nTalked about renewals."));
    }

    #[test]
    fn user_text_is_escaped_outside_any_entity() {
        let text = render_alert(&alert(&[], Some("see snake_case *notes*")), None);
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines.contains(&"Meeting transcript: Q2 \\*kickoff\\*"));
        assert_eq!(lines.last().copied(), Some("see snake\\_case \\*notes\\*"));
        for line in &lines[1..] {
            assert!(!line.starts_with('*') && !line.starts_with('_'), "{line}");
        }
    }

    #[test]
    fn long_participant_lists_are_summarised_and_link_is_optional() {
        let many = ["a@x.io", "b@x.io", "c@x.io", "d@x.io", "e@x.io", "f@x.io", "g@x.io"];
        let text = render_alert(&alert(&many, None), None);
        assert!(text.contains("e@x.io (+2 more)"));
        assert!(!text.contains("Resolve manually"));
        assert!(!text.contains("f@x.io"));
    }

    #[test]
    fn deep_link_joins_base_and_document_id() {
        assert_eq!(
            deep_link("https://app.example.com", &alert(&[], None)),
            "https://app.example.com/documents/doc_42"
        );
    }
}
