//! Input validation for candidate user records.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Full access
    Admin,
    /// Can modify content
    Editor,
    /// Read-only access
    Viewer,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Self; 3] = [Self::Admin, Self::Editor, Self::Viewer];

    /// Returns the canonical name stored in the role column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Editor => "Editor",
            Self::Viewer => "Viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|role| role.as_str() == s).ok_or_else(|| {
            Error::BadInput(format!("\"role\" must be one of [{}]", role_list()))
        })
    }
}

fn role_list() -> String {
    Role::ALL.map(Role::as_str).join(", ")
}

/// A candidate record as received from a caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Display name
    pub name: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Role name
    pub role: Option<String>,
}

impl NewUser {
    /// Creates a fully populated candidate.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: impl Into<String>) -> Self {
        Self { name: Some(name.into()), email: Some(email.into()), role: Some(role.into()) }
    }
}

/// A record that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidUser {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// Role
    pub role: Role,
}

/// Validates candidate records before any crypto or storage work.
pub trait Validator: Send + Sync {
    /// Checks `candidate` and returns the validated record.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadInput` with a human-readable reason.
    fn validate(&self, candidate: &NewUser) -> Result<ValidUser, Error>;
}

/// Default schema: required non-blank name, a syntactically valid email and
/// one of the known roles.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserSchema;

impl Validator for UserSchema {
    fn validate(&self, candidate: &NewUser) -> Result<ValidUser, Error> {
        let name = required("name", candidate.name.as_deref())?;
        let email = required("email", candidate.email.as_deref())?;
        if !is_valid_email(email) {
            return Err(Error::BadInput("\"email\" must be a valid email".to_string()));
        }
        let role = required("role", candidate.role.as_deref())?.parse()?;

        Ok(ValidUser { name: name.to_string(), email: email.to_string(), role })
    }
}

fn required<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, Error> {
    match value {
        None => Err(Error::BadInput(format!("\"{field}\" is required"))),
        Some(v) if v.trim().is_empty() => {
            Err(Error::BadInput(format!("\"{field}\" is not allowed to be empty")))
        }
        Some(v) => Ok(v),
    }
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(result: Result<ValidUser, Error>) -> String {
        match result {
            Err(Error::BadInput(msg)) => msg,
            other => panic!("expected BadInput, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_user() {
        let user = UserSchema.validate(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap();
        assert_eq!(user.name, "Ann");
        assert_eq!(user.email, "ann@x.com");
        assert_eq!(user.role, Role::Editor);
    }

    #[test]
    fn test_missing_fields() {
        let mut candidate = NewUser::new("Ann", "ann@x.com", "Editor");
        candidate.name = None;
        assert_eq!(reason(UserSchema.validate(&candidate)), "\"name\" is required");

        let mut candidate = NewUser::new("Ann", "ann@x.com", "Editor");
        candidate.email = None;
        assert_eq!(reason(UserSchema.validate(&candidate)), "\"email\" is required");

        let mut candidate = NewUser::new("Ann", "ann@x.com", "Editor");
        candidate.role = None;
        assert_eq!(reason(UserSchema.validate(&candidate)), "\"role\" is required");
    }

    #[test]
    fn test_blank_name() {
        for name in ["", "  ", "\t\n"] {
            let result = UserSchema.validate(&NewUser::new(name, "ann@x.com", "Editor"));
            assert_eq!(reason(result), "\"name\" is not allowed to be empty");
        }
    }

    #[test]
    fn test_invalid_emails() {
        for email in [
            "ann",
            "ann@",
            "@x.com",
            "ann@x",
            "ann@@x.com",
            "ann@x..com",
            "ann @x.com",
            "ann@-x.com",
            "ann@x.com.",
        ] {
            let result = UserSchema.validate(&NewUser::new("Ann", email, "Editor"));
            assert_eq!(reason(result), "\"email\" must be a valid email", "email: {email}");
        }
    }

    #[test]
    fn test_valid_emails() {
        for email in ["ann@x.com", "ann.lee+tag@mail.example.org", "a@b-c.io"] {
            assert!(UserSchema.validate(&NewUser::new("Ann", email, "Viewer")).is_ok(), "{email}");
        }
    }

    #[test]
    fn test_unknown_role() {
        let result = UserSchema.validate(&NewUser::new("Ann", "ann@x.com", "Owner"));
        assert_eq!(reason(result), "\"role\" must be one of [Admin, Editor, Viewer]");
    }

    #[test]
    fn test_role_is_case_sensitive() {
        assert!("editor".parse::<Role>().is_err());
        assert_eq!("Editor".parse::<Role>().unwrap(), Role::Editor);
    }

    #[test]
    fn test_role_display_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }
}
