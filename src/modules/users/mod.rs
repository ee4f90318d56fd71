use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use taskdb_kernel::settings::SeedSettings;
use taskdb_kernel::{CollectionModule, FieldRule, IndexSpec, Validator};

/// Anchored: one or more characters, `@`, a domain, a dot, a suffix.
pub const EMAIL_PATTERN: &str = r"^.+@.+\..+$";

/// User accounts, unique by email and by username.
pub struct UsersModule;

impl UsersModule {
    pub const fn new() -> Self {
        Self
    }
}

impl CollectionModule for UsersModule {
    fn name(&self) -> &'static str {
        "users"
    }

    fn validator(&self) -> Option<Validator> {
        Some(
            Validator::object()
                .required_field(
                    "username",
                    FieldRule::string().describe("must be a string and is required"),
                )
                .required_field(
                    "email",
                    FieldRule::string()
                        .pattern(EMAIL_PATTERN)
                        .describe("must be a valid email address and is required"),
                )
                .required_field(
                    "password",
                    FieldRule::string().describe("must be a string and is required"),
                )
                .field("first_name", FieldRule::string().describe("must be a string"))
                .field("last_name", FieldRule::string().describe("must be a string")),
        )
    }

    fn indexes(&self) -> Vec<IndexSpec> {
        vec![
            IndexSpec::ascending("email").unique(),
            IndexSpec::ascending("username").unique(),
        ]
    }

    fn seed(&self, settings: &SeedSettings) -> anyhow::Result<Vec<serde_json::Value>> {
        if !settings.enabled {
            return Ok(vec![]);
        }

        let password = settings
            .admin_password
            .as_deref()
            .filter(|password| !password.is_empty())
            .ok_or_else(|| anyhow!("seed.admin_password must be set when seeding is enabled"))?;

        let hash = hash_password(password).context("failed to hash admin password")?;
        let now = json!({ "$date": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true) });

        tracing::info!(
            module = self.name(),
            username = %settings.admin_username,
            "prepared admin seed document"
        );

        Ok(vec![json!({
            "username": settings.admin_username,
            "email": settings.admin_email,
            "password": hash,
            "first_name": settings.admin_first_name,
            "last_name": settings.admin_last_name,
            "created_at": now,
            "updated_at": now,
        })])
    }
}

/// Argon2id PHC string with a random salt.
fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("argon2: {}", err))
}

/// Create a new instance of the users module
pub fn create_module() -> std::sync::Arc<dyn CollectionModule> {
    std::sync::Arc::new(UsersModule::new())
}
