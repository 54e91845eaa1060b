//! User entity, API representations and request validation

use std::collections::BTreeMap;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserError;

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 64;
const MIN_AGE_YEARS: u32 = 18;
const BIRTH_DATE_FORMAT: &str = "%Y-%m-%d";

/// Stored user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub lastname: String,
    pub birth_date: NaiveDate,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public snapshot of a user; also the payload of every user event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub uuid: Uuid,
    pub email: String,
    pub name: String,
    pub lastname: String,
    pub birth_date: NaiveDate,
    pub phone: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            uuid: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            lastname: user.lastname.clone(),
            birth_date: user.birth_date,
            phone: user.phone.clone(),
        }
    }
}

/// One page of users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPage {
    pub data: Vec<UserResponse>,
}

/// Create/update request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserRequest {
    pub email: String,
    pub name: String,
    pub lastname: String,
    pub birth_date: String,
    pub phone: String,
}

/// Validated and normalized user fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub lastname: String,
    pub birth_date: NaiveDate,
    pub phone: String,
}

impl UserRequest {
    /// Normalize and check every field against `today`.
    ///
    /// All failing fields are reported together.
    pub fn validate_at(&self, today: NaiveDate) -> Result<NewUser, UserError> {
        let mut errors = BTreeMap::new();

        let email = self.email.trim().to_lowercase();
        if email.is_empty() {
            errors.insert("email", "email is required".to_string());
        } else if !is_email(&email) {
            errors.insert("email", "invalid email format".to_string());
        }

        let name = self.name.trim().to_string();
        if let Some(message) = check_human_name("name", &name) {
            errors.insert("name", message);
        }

        let lastname = self.lastname.trim().to_string();
        if let Some(message) = check_human_name("lastname", &lastname) {
            errors.insert("lastname", message);
        }

        let birth_date = match parse_birth_date(self.birth_date.trim(), today) {
            Ok(date) => Some(date),
            Err(message) => {
                errors.insert("birth_date", message);
                None
            }
        };

        let phone = self.phone.trim().to_string();
        if phone.is_empty() {
            errors.insert("phone", "phone is required".to_string());
        } else if !is_e164(&phone) {
            errors.insert(
                "phone",
                "must be in E.164 format (e.g., +33788888888)".to_string(),
            );
        }

        match birth_date {
            Some(birth_date) if errors.is_empty() => Ok(NewUser {
                email,
                name,
                lastname,
                birth_date,
                phone,
            }),
            _ => Err(UserError::validation(errors)),
        }
    }

    pub fn validate(&self) -> Result<NewUser, UserError> {
        self.validate_at(Utc::now().date_naive())
    }
}

fn is_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
}

fn check_human_name(field: &str, value: &str) -> Option<String> {
    let chars = value.chars().count();
    if chars == 0 {
        Some(format!("{field} is required"))
    } else if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&chars) {
        Some(format!(
            "{field} length must be {NAME_MIN_CHARS}-{NAME_MAX_CHARS} characters"
        ))
    } else if !value
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '\'')
    {
        Some("allowed characters: letters, space, '-', '''".to_string())
    } else {
        None
    }
}

fn parse_birth_date(value: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    if value.is_empty() {
        return Err("birth_date is required".to_string());
    }
    let date = NaiveDate::parse_from_str(value, BIRTH_DATE_FORMAT)
        .map_err(|_| "must be YYYY-MM-DD".to_string())?;

    let adult_cutoff = today
        .checked_sub_months(Months::new(MIN_AGE_YEARS * 12))
        .unwrap_or(NaiveDate::MIN);
    if date > adult_cutoff {
        return Err(format!("user must be {MIN_AGE_YEARS}+ years old"));
    }
    Ok(date)
}

/// `+` followed by 8 to 15 digits, no leading zero
fn is_e164(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}
