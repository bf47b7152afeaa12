use uuid::Uuid;

use super::EmailMessage;
use crate::models::submission::{NewSubmission, SubmissionKind};

/// Internal notification to the sales inbox for a new submission.
pub fn submission_notification(sales_to: &str, submission: &NewSubmission, id: Uuid) -> EmailMessage {
    let mut text = format!(
        "New {} ({id})\n\nName: {}\nEmail: {}\n",
        submission.kind.label().to_lowercase(),
        submission.full_name(),
        submission.email,
    );
    if let Some(company) = &submission.company {
        text.push_str(&format!("Company: {company}\n"));
    }
    if let Some(phone) = &submission.phone {
        text.push_str(&format!("Phone: {phone}\n"));
    }
    if let Some(obj) = submission.form_data.as_object() {
        for (key, value) in obj {
            let value = value
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| value.to_string());
            text.push_str(&format!("{key}: {value}\n"));
        }
    }
    if let Some(message) = &submission.message {
        text.push_str(&format!("\nMessage:\n{message}\n"));
    }

    EmailMessage {
        to: sales_to.to_string(),
        to_name: None,
        reply_to: Some(submission.email.clone()),
        subject: format!("{}: {}", submission.kind.label(), submission.full_name()),
        text,
        html: None,
    }
}

/// Confirmation back to the person who filled in the form.
pub fn submission_confirmation(submission: &NewSubmission) -> EmailMessage {
    let what = match submission.kind {
        SubmissionKind::Demo => "your demo request",
        SubmissionKind::ChatHandoff => "your request to talk with our team",
        SubmissionKind::RoiReport => "your ROI report request",
        SubmissionKind::Contact => "your message",
    };
    EmailMessage {
        to: submission.email.clone(),
        to_name: Some(submission.full_name()),
        reply_to: None,
        subject: "Thanks for reaching out".to_string(),
        text: format!(
            "Hi {},\n\nThanks for {what}. A member of our team will get back to you within one business day.\n",
            submission.first_name
        ),
        html: None,
    }
}

pub fn verification_code(to: &str, code: &str, ttl_minutes: i64) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        to_name: None,
        reply_to: None,
        subject: format!("Your ROI report code: {code}"),
        text: format!(
            "Your verification code is {code}.\n\nEnter it on the calculator page to unlock your full ROI report. The code expires in {ttl_minutes} minutes and can be used once.\n"
        ),
        html: None,
    }
}

pub struct HandoffNotice<'a> {
    pub conversation_id: Uuid,
    pub name: &'a str,
    pub email: &'a str,
    pub company: Option<&'a str>,
    pub message: Option<&'a str>,
    pub transcript: &'a [(String, String)],
}

/// Alerts the sales inbox that a chat visitor asked for a person.
pub fn handoff_notification(sales_to: &str, notice: &HandoffNotice<'_>) -> EmailMessage {
    let mut text = format!(
        "A chat visitor asked to talk with the team.\n\nConversation: {}\nName: {}\nEmail: {}\n",
        notice.conversation_id, notice.name, notice.email
    );
    if let Some(company) = notice.company {
        text.push_str(&format!("Company: {company}\n"));
    }
    if let Some(message) = notice.message {
        text.push_str(&format!("\nMessage:\n{message}\n"));
    }
    if !notice.transcript.is_empty() {
        text.push_str("\nRecent transcript:\n");
        for (role, content) in notice.transcript {
            text.push_str(&format!("[{role}] {content}\n"));
        }
    }

    EmailMessage {
        to: sales_to.to_string(),
        to_name: None,
        reply_to: Some(notice.email.to_string()),
        subject: format!("Chat handoff requested: {}", notice.name),
        text,
        html: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn demo() -> NewSubmission {
        NewSubmission {
            kind: SubmissionKind::Demo,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@analytical.test".to_string(),
            company: Some("Analytical Engines".to_string()),
            phone: None,
            message: Some("We send 4k invoices a month".to_string()),
            form_data: json!({"company_size": "51-200"}),
        }
    }

    #[test]
    fn test_notification_includes_form_data_and_reply_to() {
        let msg = submission_notification("sales@site.test", &demo(), Uuid::nil());
        assert_eq!(msg.to, "sales@site.test");
        assert_eq!(msg.reply_to.as_deref(), Some("ada@analytical.test"));
        assert!(msg.subject.starts_with("Demo request"));
        assert!(msg.text.contains("company_size: 51-200"));
        assert!(msg.text.contains("Company: Analytical Engines"));
    }

    #[test]
    fn test_confirmation_greets_first_name() {
        let msg = submission_confirmation(&demo());
        assert!(msg.text.starts_with("Hi Ada,"));
        assert!(msg.text.contains("demo request"));
    }

    #[test]
    fn test_verification_code_mentions_expiry() {
        let msg = verification_code("a@b.test", "123456", 10);
        assert!(msg.subject.contains("123456"));
        assert!(msg.text.contains("10 minutes"));
    }
}
