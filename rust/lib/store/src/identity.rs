//! Caller identity as seen by the site store.
//!
//! The store never parses tokens. Whatever sits in front of it (the HTTP
//! middleware, a test) resolves the request into a `Caller` first.

use std::fmt;

/// Who is performing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// No verified identity.
    Anonymous,
    /// Verified identity with its claims.
    Authenticated {
        subject: String,
        email: Option<String>,
    },
}

impl Caller {
    pub fn authenticated(subject: impl Into<String>, email: Option<String>) -> Self {
        Caller::Authenticated {
            subject: subject.into(),
            email,
        }
    }

    /// Authenticated caller whose subject is its email.
    pub fn with_email(email: &str) -> Self {
        Self::authenticated(email, Some(email.to_string()))
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Caller::Authenticated { .. })
    }

    /// The email claim, if the caller is authenticated and the claim is non-empty.
    pub fn email(&self) -> Option<&str> {
        match self {
            Caller::Authenticated {
                email: Some(email), ..
            } if !email.is_empty() => Some(email.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::Anonymous => write!(f, "anonymous caller"),
            Caller::Authenticated { subject, email } => match email.as_deref() {
                Some(e) if !e.is_empty() => write!(f, "caller '{}' <{}>", subject, e),
                _ => write!(f, "caller '{}' (no email claim)", subject),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_requires_authentication_and_content() {
        assert_eq!(Caller::Anonymous.email(), None);
        assert_eq!(Caller::authenticated("u1", None).email(), None);
        assert_eq!(Caller::authenticated("u1", Some(String::new())).email(), None);
        assert_eq!(Caller::with_email("a@x.org").email(), Some("a@x.org"));
    }

    #[test]
    fn display_names_the_caller() {
        assert_eq!(Caller::Anonymous.to_string(), "anonymous caller");
        assert_eq!(
            Caller::authenticated("u1", Some("a@x.org".into())).to_string(),
            "caller 'u1' <a@x.org>"
        );
        assert!(Caller::authenticated("u1", None).to_string().contains("no email"));
    }
}
