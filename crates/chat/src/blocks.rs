//! Builds the chat-provider "blocks" payload for a notification (§4.F step
//! 2), in the shape `notify/src/channels/slack.rs`'s `format_payload`
//! assembles attachments/fields/footer.

use prhub_core::job::NotificationJobData;
use serde_json::{json, Value};

fn risk_emoji(score: u8) -> &'static str {
    if score >= 70 {
        "🔴"
    } else if score >= 40 {
        "🟡"
    } else {
        "🟢"
    }
}

fn risk_flags_csv(flags: &[String]) -> String {
    if flags.is_empty() {
        "none".to_string()
    } else {
        flags.join(", ")
    }
}

/// Fallback plain-text summary, used by clients that can't render blocks.
#[must_use]
pub fn fallback_text(data: &NotificationJobData) -> String {
    format!("PR #{}: {}", data.number, data.title)
}

/// Builds the full JSON payload for the chat provider's incoming webhook.
#[must_use]
pub fn build_payload(data: &NotificationJobData) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": format!("PR #{} · {}", data.number, data.title) }
        }),
        json!({
            "type": "context",
            "elements": [
                { "type": "mrkdwn", "text": format!("*{}* opened by *{}*", data.repo_full_name, data.author) }
            ]
        }),
        json!({ "type": "divider" }),
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "*Risk Score:* {} {}/100\n*Risk Flags:* {}",
                    risk_emoji(data.risk_score),
                    data.risk_score,
                    risk_flags_csv(&data.main_risk_flags)
                )
            }
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": data.tldr }
        }),
        json!({
            "type": "context",
            "elements": [
                { "type": "mrkdwn", "text": format!("Labels: {}", risk_flags_csv(&data.system_labels)) }
            ]
        }),
    ];

    let mut action_elements = vec![json!({
        "type": "button",
        "text": { "type": "plain_text", "text": "View on GitHub" },
        "url": data.html_url,
    })];
    if let Some(dashboard_url) = &data.dashboard_url {
        action_elements.push(json!({
            "type": "button",
            "text": { "type": "plain_text", "text": "Open in Dashboard" },
            "url": dashboard_url,
        }));
    }
    blocks.push(json!({ "type": "actions", "elements": action_elements }));

    json!({
        "text": fallback_text(data),
        "blocks": blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> NotificationJobData {
        NotificationJobData {
            pull_request_id: "1".to_string(),
            repo_full_name: "acme/widgets".to_string(),
            number: 7,
            title: "Fix header parsing".to_string(),
            author: "alice".to_string(),
            tldr: "Parser fix.".to_string(),
            risk_score: 75,
            main_risk_flags: vec!["secrets-suspected".to_string()],
            system_labels: vec!["backend".to_string(), "security".to_string()],
            html_url: "https://github.com/acme/widgets/pull/7".to_string(),
            dashboard_url: Some("https://dash.example/prs/1".to_string()),
        }
    }

    #[test]
    fn fallback_text_includes_number_and_title() {
        assert_eq!(fallback_text(&data()), "PR #7: Fix header parsing");
    }

    #[test]
    fn high_risk_uses_red_emoji() {
        assert_eq!(risk_emoji(75), "🔴");
    }

    #[test]
    fn medium_risk_uses_yellow_emoji() {
        assert_eq!(risk_emoji(45), "🟡");
    }

    #[test]
    fn low_risk_uses_green_emoji() {
        assert_eq!(risk_emoji(10), "🟢");
    }

    #[test]
    fn boundary_scores_match_spec_thresholds() {
        assert_eq!(risk_emoji(70), "🔴");
        assert_eq!(risk_emoji(40), "🟡");
        assert_eq!(risk_emoji(39), "🟢");
    }

    #[test]
    fn payload_includes_both_action_buttons_when_dashboard_set() {
        let payload = build_payload(&data());
        let actions = payload["blocks"].as_array().unwrap().last().unwrap();
        assert_eq!(actions["elements"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn payload_omits_dashboard_button_when_absent() {
        let mut d = data();
        d.dashboard_url = None;
        let payload = build_payload(&d);
        let actions = payload["blocks"].as_array().unwrap().last().unwrap();
        assert_eq!(actions["elements"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn empty_risk_flags_render_as_none() {
        assert_eq!(risk_flags_csv(&[]), "none");
    }

    #[test]
    fn top_level_text_fallback_is_present() {
        let payload = build_payload(&data());
        assert_eq!(payload["text"], "PR #7: Fix header parsing");
    }
}
