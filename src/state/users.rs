use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use data_encoding::BASE32_NOPAD;
use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, Document, doc, oid::ObjectId};
use rand::RngCore;
use std::time::{Duration, SystemTime};

use crate::{
    error::{ApiError, ApiResult, is_duplicate_key},
    models::{Session, User, UserRole},
};

use super::{Actor, AppState, SESSION_TTL_SECONDS};

pub const MIN_PASSWORD_LEN: usize = 8;

/// The subset of a user needed on hot paths (notification delivery, auth).
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: ObjectId,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub room_id: Option<ObjectId>,
    pub email_notifications: bool,
}

impl UserProfile {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }
}

impl TryFrom<User> for UserProfile {
    type Error = anyhow::Error;

    fn try_from(user: User) -> Result<Self> {
        Ok(UserProfile {
            id: user.id.context("user without _id")?,
            email: user.email,
            name: user.name,
            role: user.role,
            room_id: user.room_id,
            email_notifications: user.email_notifications,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

/// Fields a user may change on their own profile. `role` is only honored for admins.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email_notifications: Option<bool>,
    pub password: Option<String>,
    pub role: Option<UserRole>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!("salt encoding: {e}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn validate_new_user(user: &NewUser) -> ApiResult<String> {
    let email = normalize_email(&user.email);
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::validation("รูปแบบอีเมลไม่ถูกต้อง"));
    }
    if user.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "รหัสผ่านต้องมีอย่างน้อย {MIN_PASSWORD_LEN} ตัวอักษร"
        )));
    }
    if user.name.trim().is_empty() {
        return Err(ApiError::validation("กรุณาระบุชื่อ"));
    }
    Ok(email)
}

pub async fn create_user(state: &AppState, user: NewUser) -> ApiResult<ObjectId> {
    let email = validate_new_user(&user)?;
    let now = DateTime::now();
    let res = state
        .users
        .insert_one(User {
            id: None,
            email,
            password_hash: hash_password(&user.password)?,
            name: user.name.trim().to_string(),
            phone: user.phone.filter(|p| !p.trim().is_empty()),
            role: user.role,
            room_id: None,
            email_notifications: true,
            created_at: Some(now),
            updated_at: Some(now),
        })
        .await;
    match res {
        Ok(res) => Ok(res
            .inserted_id
            .as_object_id()
            .context("user insert missing _id")?),
        Err(e) if is_duplicate_key(&e) => Err(ApiError::conflict("อีเมลนี้ถูกใช้งานแล้ว")),
        Err(e) => Err(e.into()),
    }
}

pub async fn admin_exists(state: &AppState) -> Result<bool> {
    let count = state
        .users
        .count_documents(doc! { "role": UserRole::Admin.as_str() })
        .await?;
    Ok(count > 0)
}

/// Creates the first admin account. Refused once any admin exists.
pub async fn bootstrap_admin(state: &AppState, mut user: NewUser) -> ApiResult<ObjectId> {
    if admin_exists(state).await? {
        return Err(ApiError::Forbidden);
    }
    user.role = UserRole::Admin;
    create_user(state, user).await
}

pub async fn find_user_by_email(state: &AppState, email: &str) -> Result<Option<User>> {
    Ok(state
        .users
        .find_one(doc! { "email": normalize_email(email) })
        .await?)
}

pub async fn get_user_by_id(state: &AppState, id: &ObjectId) -> Result<Option<User>> {
    Ok(state.users.find_one(doc! { "_id": id }).await?)
}

/// Returns the user when the password matches. Unknown email and wrong password look the same.
pub async fn authenticate(state: &AppState, email: &str, password: &str) -> Result<Option<User>> {
    let Some(user) = find_user_by_email(state, email).await? else {
        return Ok(None);
    };
    if verify_password(password, &user.password_hash) {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

pub async fn list_users(state: &AppState, role: Option<UserRole>) -> Result<Vec<User>> {
    let filter = match role {
        Some(role) => doc! { "role": role.as_str() },
        None => doc! {},
    };
    let cursor = state.users.find(filter).sort(doc! { "name": 1 }).await?;
    Ok(cursor.try_collect().await?)
}

/// Profile lookup backed by the in-process cache.
pub async fn user_profile(state: &AppState, id: &ObjectId) -> Result<Option<UserProfile>> {
    if let Some(profile) = state.profiles.get(id).await {
        return Ok(Some(profile));
    }
    let Some(user) = get_user_by_id(state, id).await? else {
        return Ok(None);
    };
    let profile = UserProfile::try_from(user)?;
    state.profiles.insert(*id, profile.clone()).await;
    Ok(Some(profile))
}

pub async fn update_user(
    state: &AppState,
    actor: &Actor,
    id: &ObjectId,
    update: UserUpdate,
) -> ApiResult<User> {
    if !actor.can_access(id) {
        return Err(ApiError::Forbidden);
    }
    if update.role.is_some() && !actor.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let mut set = Document::new();
    if let Some(name) = update.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("กรุณาระบุชื่อ"));
        }
        set.insert("name", name.trim());
    }
    if let Some(phone) = update.phone {
        set.insert("phone", phone.trim());
    }
    if let Some(flag) = update.email_notifications {
        set.insert("email_notifications", flag);
    }
    if let Some(password) = update.password {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::validation(format!(
                "รหัสผ่านต้องมีอย่างน้อย {MIN_PASSWORD_LEN} ตัวอักษร"
            )));
        }
        set.insert("password_hash", hash_password(&password)?);
    }
    if let Some(role) = update.role {
        set.insert("role", role.as_str());
    }
    set.insert("updated_at", DateTime::now());

    let res = state
        .users
        .update_one(doc! { "_id": id }, doc! { "$set": set })
        .await?;
    if res.matched_count == 0 {
        return Err(ApiError::NotFound("ไม่พบผู้ใช้"));
    }
    state.profiles.invalidate(id).await;

    get_user_by_id(state, id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบผู้ใช้"))
}

/// Removes a user and their sessions. A tenant still assigned to a room must check out first.
pub async fn delete_user(state: &AppState, id: &ObjectId) -> ApiResult<()> {
    let user = get_user_by_id(state, id)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบผู้ใช้"))?;
    if user.room_id.is_some() {
        return Err(ApiError::conflict("ผู้ใช้ยังพักอาศัยอยู่ในห้อง กรุณาย้ายออกก่อน"));
    }
    state.users.delete_one(doc! { "_id": id }).await?;
    let _ = state
        .sessions
        .delete_many(doc! { "user_email": &user.email })
        .await;
    state.profiles.invalidate(id).await;
    Ok(())
}

pub async fn create_session(state: &AppState, email: &str) -> Result<String> {
    let mut token_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut token_bytes);
    let token = BASE32_NOPAD.encode(&token_bytes);

    let expires_at =
        DateTime::from_system_time(SystemTime::now() + Duration::from_secs(SESSION_TTL_SECONDS));

    state
        .sessions
        .insert_one(Session {
            id: None,
            token: token.clone(),
            user_email: normalize_email(email),
            expires_at,
        })
        .await?;

    Ok(token)
}

pub async fn find_user_by_session(state: &AppState, token: &str) -> Result<Option<User>> {
    if let Some(session) = state.sessions.find_one(doc! { "token": token }).await? {
        let expires_at = session.expires_at.to_system_time();
        if expires_at <= SystemTime::now() {
            // Remove expired session, ignore result
            let _ = state.sessions.delete_one(doc! { "token": token }).await;
            return Ok(None);
        }
        find_user_by_email(state, &session.user_email).await
    } else {
        Ok(None)
    }
}

pub async fn delete_session(state: &AppState, token: &str) -> Result<()> {
    state.sessions.delete_one(doc! { "token": token }).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Somchai@Example.COM "), "somchai@example.com");
    }

    #[test]
    fn new_user_validation() {
        let mut user = NewUser {
            email: "a@b.co".into(),
            password: "short".into(),
            name: "A".into(),
            phone: None,
            role: UserRole::Tenant,
        };
        assert!(matches!(validate_new_user(&user), Err(ApiError::Validation(_))));
        user.password = "long-enough".into();
        assert_eq!(validate_new_user(&user).unwrap(), "a@b.co");
        user.email = "nope".into();
        assert!(matches!(validate_new_user(&user), Err(ApiError::Validation(_))));
    }
}
