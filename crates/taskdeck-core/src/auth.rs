use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::datastore::DataStore;
use crate::validate::FieldError;

pub const PASSWORD_MIN: usize = 7;
pub const AGE_MIN: u32 = 7;

fn email_regex() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
    })
}

pub fn validate_registration(
    email: &str,
    password: &str,
    age: u32,
    phone: &str,
) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if email.trim().is_empty() {
        errors.push(FieldError {
            field: "email",
            message: "cannot be empty".to_string(),
        });
    } else if !email_regex().is_match(email.trim()) {
        errors.push(FieldError {
            field: "email",
            message: "is not a valid address".to_string(),
        });
    }

    if password.trim().chars().count() < PASSWORD_MIN {
        errors.push(FieldError {
            field: "password",
            message: format!("must be at least {PASSWORD_MIN} characters"),
        });
    }

    if phone.trim().is_empty() {
        errors.push(FieldError {
            field: "phone",
            message: "cannot be empty".to_string(),
        });
    }

    if age < AGE_MIN {
        errors.push(FieldError {
            field: "age",
            message: format!("must be at least {AGE_MIN}"),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Decodes the claims segment of a JWT without verifying the signature;
/// the client only reads back its own identity. Any decode failure is
/// `None`, never an error.
pub fn decode_jwt_claims(token: &str) -> Option<Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// User identifier claim, trying the aliases different backends use.
pub fn claim_user_id(claims: &Value) -> Option<String> {
    for key in ["id", "userId", "_id", "sub"] {
        match claims.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

pub fn claim_email(claims: &Value) -> Option<String> {
    claims
        .get("email")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Identity of the logged-in user, or `None` when the token is missing
/// or unreadable. Callers treat `None` as "scoping disabled", never as
/// an error (fail-open).
#[tracing::instrument(skip(store))]
pub fn current_user_id(store: &DataStore) -> Option<String> {
    let token = match store.load_token() {
        Ok(Some(token)) => token,
        Ok(None) => {
            debug!("no stored token; user scope disabled");
            return None;
        }
        Err(err) => {
            debug!(error = %err, "failed reading token; user scope disabled");
            return None;
        }
    };

    let Some(claims) = decode_jwt_claims(&token) else {
        debug!("token claims undecodable; user scope disabled");
        return None;
    };

    claim_user_id(&claims)
}
