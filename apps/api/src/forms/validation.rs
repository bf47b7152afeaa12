use std::sync::OnceLock;

use regex::Regex;

use crate::errors::AppError;

pub const NAME_MAX: usize = 100;
pub const COMPANY_MAX: usize = 200;
pub const MESSAGE_MAX: usize = 5000;
pub const EMAIL_MAX: usize = 254;

const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "live.com",
    "aol.com",
    "icloud.com",
    "me.com",
    "proton.me",
    "protonmail.com",
    "gmx.com",
    "mail.com",
    "yandex.com",
];

#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Collects every field error of a form so they can be reported together.
#[derive(Debug, Default)]
pub struct FormValidator {
    errors: Vec<FieldError>,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-']+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("email regex is valid")
    })
}

/// Trims and drops blank optional input.
pub fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= EMAIL_MAX && email_regex().is_match(email)
}

pub fn is_free_mail(email: &str) -> bool {
    email
        .rsplit_once('@')
        .map(|(_, domain)| FREE_MAIL_DOMAINS.contains(&domain.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Digits, spaces and `+()-.` only, with 7 to 20 digits.
pub fn is_valid_phone(phone: &str) -> bool {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '(' | ')' | '-' | '.'));
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    allowed && (7..=20).contains(&digits)
}

impl FormValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Required text field. Returns the trimmed value (empty when missing).
    pub fn required(&mut self, field: &'static str, value: Option<&str>, max: usize) -> String {
        match clean(value) {
            None => {
                self.push(field, format!("{field} is required"));
                String::new()
            }
            Some(v) => {
                if v.chars().count() > max {
                    self.push(field, format!("{field} must be at most {max} characters"));
                }
                v
            }
        }
    }

    pub fn optional(&mut self, field: &'static str, value: Option<&str>, max: usize) -> Option<String> {
        let v = clean(value)?;
        if v.chars().count() > max {
            self.push(field, format!("{field} must be at most {max} characters"));
        }
        Some(v)
    }

    /// Required email, lowercased.
    pub fn email(&mut self, field: &'static str, value: Option<&str>) -> String {
        let Some(v) = clean(value) else {
            self.push(field, format!("{field} is required"));
            return String::new();
        };
        let v = v.to_ascii_lowercase();
        if !is_valid_email(&v) {
            self.push(field, format!("{field} must be a valid email address"));
        }
        v
    }

    /// Required email that must not belong to a free-mail provider.
    pub fn business_email(&mut self, field: &'static str, value: Option<&str>) -> String {
        let before = self.errors.len();
        let v = self.email(field, value);
        if self.errors.len() == before && is_free_mail(&v) {
            self.push(field, "Please use your work email address");
        }
        v
    }

    pub fn phone(&mut self, field: &'static str, value: Option<&str>) -> Option<String> {
        let v = clean(value)?;
        if !is_valid_phone(&v) {
            self.push(field, format!("{field} must be a valid phone number"));
        }
        Some(v)
    }

    pub fn check(&mut self, ok: bool, field: &'static str, message: &str) {
        if !ok {
            self.push(field, message);
        }
    }

    #[cfg(test)]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let message = self
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(AppError::Validation(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_syntax() {
        assert!(is_valid_email("jane.doe+ar@acme-corp.co.uk"));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("jane at acme.com"));
        assert!(!is_valid_email("@acme.com"));
    }

    #[test]
    fn test_free_mail_detection() {
        assert!(is_free_mail("someone@Gmail.com"));
        assert!(!is_free_mail("cfo@acme.com"));
    }

    #[test]
    fn test_phone_rules() {
        assert!(is_valid_phone("+1 (415) 555-0100"));
        assert!(!is_valid_phone("555-01"));
        assert!(!is_valid_phone("call me maybe"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut v = FormValidator::new();
        v.required("first_name", Some("   "), NAME_MAX);
        v.email("email", Some("not-an-email"));
        v.phone("phone", Some("12"));
        assert_eq!(v.errors().len(), 3);
        let err = v.finish().unwrap_err();
        match err {
            AppError::Validation(msg) => {
                assert!(msg.contains("first_name is required"));
                assert!(msg.contains("valid email"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_values_are_trimmed_and_lowercased() {
        let mut v = FormValidator::new();
        assert_eq!(v.required("first_name", Some("  Ada "), NAME_MAX), "Ada");
        assert_eq!(v.email("email", Some(" Ada@Acme.COM ")), "ada@acme.com");
        assert_eq!(v.optional("company", Some(""), COMPANY_MAX), None);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_length_limit() {
        let mut v = FormValidator::new();
        v.required("first_name", Some(&"x".repeat(NAME_MAX + 1)), NAME_MAX);
        assert_eq!(v.errors().len(), 1);
    }

    #[test]
    fn test_business_email_rejects_free_mail_once() {
        let mut v = FormValidator::new();
        v.business_email("email", Some("someone@yahoo.com"));
        assert_eq!(v.errors().len(), 1);
        assert_eq!(v.errors()[0].message, "Please use your work email address");
    }
}
