//! User model.

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Entity, Validate, is_valid_email, require_non_empty, require_non_empty_opt};
use crate::error::AppError;
use crate::query::{QueryError, QuerySchema, QuerySchemaConfig};
use crate::store::{CollectionSchema, Document};

/// Stored field holding the Argon2 hash; never returned.
pub const PASSWORD_HASH: &str = "passwordHash";

const MIN_PASSWORD_LEN: usize = 8;
const MAX_LIMIT: u32 = 100;

/// Access role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    #[default]
    User,
}

/// User record as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn active_by_default() -> bool {
    true
}

/// Input for creating a user.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Input for updating a user. Absent fields are left untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

fn check_email(email: &str) -> Result<(), AppError> {
    if !is_valid_email(email.trim()) {
        return Err(AppError::validation("Invalid email address"));
    }
    Ok(())
}

fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

impl Validate for CreateUser {
    fn validate(&self) -> Result<(), AppError> {
        require_non_empty("name", &self.name)?;
        check_email(&self.email)?;
        check_password(&self.password)
    }
}

impl Validate for UpdateUser {
    fn validate(&self) -> Result<(), AppError> {
        require_non_empty_opt("name", self.name.as_deref())?;
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        if let Some(password) = &self.password {
            check_password(password)?;
        }
        Ok(())
    }
}

impl Entity for User {
    const COLLECTION: &'static str = "users";
    const LABEL: &'static str = "User";
    const HIDDEN_FIELDS: &'static [&'static str] = &[PASSWORD_HASH];

    type Create = CreateUser;
    type Update = UpdateUser;

    fn query_schema(max_limit: u32) -> Result<QuerySchema, QueryError> {
        QuerySchema::new(
            ["id", "email", "name", "role", "isActive", "createdAt"],
            QuerySchemaConfig::default()
                .max_limit(MAX_LIMIT.min(max_limit))
                .searchable(&["name", "email"])
                .dates(&["createdAt"])
                .booleans(&["isActive"]),
        )
    }

    fn collection_schema() -> CollectionSchema {
        CollectionSchema::new(&["name", "email", PASSWORD_HASH], &["email"])
    }

    fn create_document(input: CreateUser) -> Result<Document, AppError> {
        let mut doc = Document::new();
        doc.insert("name".into(), Value::String(input.name.trim().to_string()));
        doc.insert("email".into(), Value::String(normalize_email(&input.email)));
        doc.insert(
            "role".into(),
            serde_json::to_value(input.role.unwrap_or_default()).map_err(anyhow::Error::from)?,
        );
        doc.insert(
            "isActive".into(),
            Value::Bool(input.is_active.unwrap_or(true)),
        );
        doc.insert(
            PASSWORD_HASH.into(),
            Value::String(hash_password(&input.password)?),
        );
        Ok(doc)
    }

    fn update_document(input: UpdateUser) -> Result<Document, AppError> {
        let mut doc = super::to_document(&input)?;
        if let Some(email) = &input.email {
            doc.insert("email".into(), Value::String(normalize_email(email)));
        }
        if let Some(name) = &input.name {
            doc.insert("name".into(), Value::String(name.trim().to_string()));
        }
        if let Some(password) = &input.password {
            doc.insert(
                PASSWORD_HASH.into(),
                Value::String(hash_password(password)?),
            );
        }
        Ok(doc)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
