//! Authentication and user profiles
//!
//! Handles signup, login, session management and the user profile directory.
//! All account data is stored in a SQLite database.

use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// User record stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub about: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Public profile info (no sensitive data)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub about: Option<String>,
    pub created_at: DateTime<Utc>,
}

type ProfileRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn profile_from_row((id, email, username, avatar_url, about, created_at): ProfileRow) -> UserProfile {
    UserProfile {
        id,
        email,
        username,
        avatar_url,
        about,
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
    }
}

/// Session token for authenticated requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Fall back to the email local part when no display name was given
pub fn short_name(email: &str) -> &str {
    email.split('@').next().filter(|s| !s.is_empty()).unwrap_or("User")
}

/// Auth manager handles all authentication
pub struct AuthManager {
    db_path: PathBuf,
    /// In-memory session cache
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthManager {
    /// Create new auth manager
    pub async fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let manager = Self {
            db_path: db_path.into(),
            sessions: RwLock::new(HashMap::new()),
        };

        manager.init_db().await?;

        info!("[Auth] Initialized at {:?}", manager.db_path);

        Ok(manager)
    }

    /// Initialize SQLite database
    async fn init_db(&self) -> Result<()> {
        let pool = self.get_pool().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                username TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                avatar_url TEXT,
                about TEXT,
                created_at TEXT NOT NULL,
                last_login TEXT,
                is_active INTEGER DEFAULT 1
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        pool.close().await;
        Ok(())
    }

    /// Get database connection
    async fn get_pool(&self) -> Result<sqlx::SqlitePool> {
        use sqlx::sqlite::SqlitePoolOptions;

        let db_url = format!("sqlite:{}?mode=rwc", self.db_path.display());
        Ok(SqlitePoolOptions::new().connect(&db_url).await?)
    }

    /// Register a new user. An empty display name falls back to the email
    /// local part.
    pub async fn signup(&self, email: String, username: String, password: String) -> Result<User> {
        let pool = self.get_pool().await?;

        // Check if email already exists
        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&pool)
            .await?;

        if existing.is_some() {
            return Err(anyhow::anyhow!("Email already registered"));
        }

        let password_hash = hash(&password, DEFAULT_COST).context("Failed to hash password")?;

        let username = if username.trim().is_empty() {
            short_name(&email).to_string()
        } else {
            username.trim().to_string()
        };

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            username: username.clone(),
            password_hash,
            avatar_url: None,
            about: None,
            created_at: Utc::now(),
            last_login: None,
            is_active: true,
        };

        sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, created_at, is_active) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at.to_rfc3339())
        .bind(user.is_active)
        .execute(&pool)
        .await?;

        pool.close().await;

        info!("[Auth] User registered: {} ({})", username, email);

        Ok(user)
    }

    /// Login user and create a session. Every sign-in touches the profile
    /// record (last login), which keeps the directory row fresh.
    pub async fn login(&self, email: String, password: String) -> Result<(UserProfile, Session)> {
        let pool = self.get_pool().await?;

        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT id, password_hash FROM users WHERE email = ? AND is_active = 1",
        )
        .bind(&email)
        .fetch_optional(&pool)
        .await?;

        let (user_id, password_hash) =
            row.ok_or_else(|| anyhow::anyhow!("Invalid email or password"))?;

        let valid = verify(&password, &password_hash).context("Failed to verify password")?;

        if !valid {
            warn!("[Auth] Failed login attempt for {}", email);
            return Err(anyhow::anyhow!("Invalid email or password"));
        }

        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&user_id)
            .execute(&pool)
            .await?;

        let session = self.create_session(&pool, &user_id).await?;

        let profile = self
            .fetch_profile(&pool, &user_id)
            .await?
            .context("User row vanished during login")?;

        pool.close().await;

        info!("[Auth] User logged in: {}", profile.username);

        Ok((profile, session))
    }

    /// Create new session
    async fn create_session(&self, pool: &sqlx::SqlitePool, user_id: &str) -> Result<Session> {
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(30),
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(pool)
        .await?;

        // Cache session
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        Ok(session)
    }

    async fn fetch_profile(
        &self,
        pool: &sqlx::SqlitePool,
        user_id: &str,
    ) -> Result<Option<UserProfile>> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT id, email, username, avatar_url, about, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(profile_from_row))
    }

    /// Validate session token
    pub async fn validate_session(&self, token: &str) -> Result<UserProfile> {
        // Check cache first
        let cached_user_id = {
            let sessions = self.sessions.read().await;
            sessions
                .get(token)
                .filter(|s| s.expires_at > Utc::now())
                .map(|s| s.user_id.clone())
        };

        if let Some(user_id) = cached_user_id {
            let pool = self.get_pool().await?;
            let profile = self.fetch_profile(&pool, &user_id).await?;
            pool.close().await;
            if let Some(profile) = profile {
                return Ok(profile);
            }
        }

        // Check database
        let pool = self.get_pool().await?;

        let row: Option<(String, String)> = sqlx::query_as(
            r#"
            SELECT u.id, s.expires_at
            FROM users u
            JOIN sessions s ON u.id = s.user_id
            WHERE s.token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&pool)
        .await?;

        if let Some((user_id, expires_at)) = row {
            let expires: DateTime<Utc> = expires_at
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid date"))?;
            if expires > Utc::now() {
                let profile = self.fetch_profile(&pool, &user_id).await?;
                pool.close().await;
                if let Some(profile) = profile {
                    return Ok(profile);
                }
                return Err(anyhow::anyhow!("User not found"));
            }
        }

        pool.close().await;

        Err(anyhow::anyhow!("Invalid or expired session"))
    }

    /// Logout user (invalidate session)
    pub async fn logout(&self, token: &str) -> Result<()> {
        // Remove from cache
        self.sessions.write().await.remove(token);

        let pool = self.get_pool().await?;
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&pool)
            .await?;
        pool.close().await;

        info!("[Auth] Session invalidated");

        Ok(())
    }

    /// Get user by ID
    pub async fn get_user(&self, user_id: &str) -> Result<UserProfile> {
        let pool = self.get_pool().await?;
        let profile = self.fetch_profile(&pool, user_id).await?;
        pool.close().await;

        profile.ok_or_else(|| anyhow::anyhow!("User not found"))
    }

    /// Update the owner-mutable profile fields. `None` leaves a field as is.
    pub async fn update_profile(
        &self,
        user_id: &str,
        about: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<UserProfile> {
        let pool = self.get_pool().await?;

        if let Some(about) = &about {
            sqlx::query("UPDATE users SET about = ? WHERE id = ?")
                .bind(about)
                .bind(user_id)
                .execute(&pool)
                .await?;
        }

        if let Some(avatar_url) = &avatar_url {
            sqlx::query("UPDATE users SET avatar_url = ? WHERE id = ?")
                .bind(avatar_url)
                .bind(user_id)
                .execute(&pool)
                .await?;
        }

        let profile = self.fetch_profile(&pool, user_id).await?;
        pool.close().await;

        profile.ok_or_else(|| anyhow::anyhow!("User not found"))
    }

    /// List all users (the profile directory clients resolve names through)
    pub async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let pool = self.get_pool().await?;

        let rows: Vec<ProfileRow> = sqlx::query_as(
            "SELECT id, email, username, avatar_url, about, created_at FROM users WHERE is_active = 1",
        )
        .fetch_all(&pool)
        .await?;

        pool.close().await;

        Ok(rows.into_iter().map(profile_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("alice@example.com"), "alice");
        assert_eq!(short_name("no-at-sign"), "no-at-sign");
        assert_eq!(short_name(""), "User");
    }

    #[tokio::test]
    async fn test_signup_login_roundtrip() {
        let dir = tempdir().unwrap();
        let auth = AuthManager::new(dir.path().join("users.sqlite"))
            .await
            .unwrap();

        let user = auth
            .signup("alice@example.com".into(), "Alice".into(), "hunter2".into())
            .await
            .unwrap();
        assert_eq!(user.username, "Alice");

        let (profile, session) = auth
            .login("alice@example.com".into(), "hunter2".into())
            .await
            .unwrap();
        assert_eq!(profile.id, user.id);

        let validated = auth.validate_session(&session.token).await.unwrap();
        assert_eq!(validated.id, user.id);

        auth.logout(&session.token).await.unwrap();
        assert!(auth.validate_session(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_signup_derives_name_from_email() {
        let dir = tempdir().unwrap();
        let auth = AuthManager::new(dir.path().join("users.sqlite"))
            .await
            .unwrap();

        let user = auth
            .signup("bob@example.com".into(), "  ".into(), "pw".into())
            .await
            .unwrap();
        assert_eq!(user.username, "bob");
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let dir = tempdir().unwrap();
        let auth = AuthManager::new(dir.path().join("users.sqlite"))
            .await
            .unwrap();

        auth.signup("carol@example.com".into(), "Carol".into(), "right".into())
            .await
            .unwrap();

        assert!(auth
            .login("carol@example.com".into(), "wrong".into())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_update_profile_fields() {
        let dir = tempdir().unwrap();
        let auth = AuthManager::new(dir.path().join("users.sqlite"))
            .await
            .unwrap();

        let user = auth
            .signup("dave@example.com".into(), "Dave".into(), "pw".into())
            .await
            .unwrap();

        let profile = auth
            .update_profile(&user.id, Some("brb".into()), None)
            .await
            .unwrap();
        assert_eq!(profile.about.as_deref(), Some("brb"));
        // Untouched field survives
        assert_eq!(profile.avatar_url, None);

        let profile = auth
            .update_profile(&user.id, None, Some("/blobs/abc".into()))
            .await
            .unwrap();
        assert_eq!(profile.about.as_deref(), Some("brb"));
        assert_eq!(profile.avatar_url.as_deref(), Some("/blobs/abc"));
    }
}
