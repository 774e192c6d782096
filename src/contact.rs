//! Phone normalisation and the human-readable part of event descriptions.

use crate::model::Platform;

/// Keep the 10 national digits of a Russian number. An 11-digit number with a
/// leading 7 or 8 loses that prefix; anything else is rejected.
pub fn normalize_phone(input: &str) -> Option<String> {
    let mut digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 11 && (digits.starts_with('7') || digits.starts_with('8')) {
        digits.remove(0);
    }
    (digits.len() == 10).then_some(digits)
}

/// `+7 XXX XXX XX XX`. Input that does not normalise is returned unchanged.
pub fn format_phone_plus7(input: &str) -> String {
    match normalize_phone(input) {
        Some(d) => format!("+7 {} {} {} {}", &d[..3], &d[3..6], &d[6..8], &d[8..10]),
        None => input.to_string(),
    }
}

/// Who booked, written above the machine-readable tags.
pub struct ContactCard<'a> {
    pub name: &'a str,
    pub phone: Option<&'a str>,
    pub email: Option<&'a str>,
    pub platform: Platform,
    pub user_id: i64,
    pub num_clients: u32,
    pub need_photographer: bool,
    pub notes: Option<&'a str>,
}

impl ContactCard<'_> {
    pub fn render(&self) -> String {
        let mut lines = vec![format!("Booked by: {}", self.name)];
        if let Some(phone) = self.phone {
            lines.push(format!("Phone: {}", format_phone_plus7(phone)));
        }
        if let Some(email) = self.email {
            lines.push(format!("Email: {email}"));
        }
        lines.push(format!("{} ID: {}", self.platform, self.user_id));
        lines.push(format!("Guests: {}", self.num_clients));
        if self.need_photographer {
            lines.push("Photographer requested".into());
        }
        if let Some(notes) = self.notes.filter(|n| !n.trim().is_empty()) {
            lines.push(format!("Notes: {}", notes.trim()));
        }
        lines.join("\n")
    }
}
