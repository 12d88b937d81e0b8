//! Accounts: registration, password and email-code login, profile and
//! address book.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use validator::Validate;

use super::{Paginated, Pagination};
use crate::domain::Pincode;
use crate::domain::aggregates::{Address, AddressFields, Role, User, UserProfile, user::normalize_email};
use crate::error::{AppError, AppResult};
use crate::integrations::OutgoingEmail;
use crate::state::AppState;
use crate::store::{Document, Filter, Query, Sort};

const OTP_TTL_MINUTES: i64 = 10;
const OTP_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileInput {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: Option<String>,
    #[validate(length(min = 10, max = 15, message = "Enter a valid phone number"))]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 10, max = 15, message = "Enter a valid phone number"))]
    pub phone: String,
    #[validate(length(min = 1, max = 200, message = "Address is required"))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "State is required"))]
    pub state: String,
    pub pincode: String,
    pub country: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl AddressInput {
    fn into_fields(self) -> AppResult<AddressFields> {
        self.validate()?;
        Ok(AddressFields {
            pincode: Pincode::parse(&self.pincode)?,
            name: self.name,
            phone: self.phone,
            line1: self.line1,
            line2: self.line2,
            city: self.city,
            state: self.state,
            country: self.country.filter(|c| !c.trim().is_empty()),
            is_default: self.is_default,
        })
    }
}

/// A one-time login code. Only the SHA-256 of the code is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpCode {
    pub id: Uuid,
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

impl Document for OtpCode {
    const COLLECTION: &'static str = "otp_codes";
    fn document_id(&self) -> Uuid {
        self.id
    }
}

// =============================================================================
// Password authentication
// =============================================================================

pub async fn register(state: &AppState, input: RegisterInput) -> AppResult<User> {
    input.validate()?;
    let email = normalize_email(&input.email);
    if find_by_email(state, &email).await?.is_some() {
        return Err(AppError::Conflict("An account with this email already exists".into()));
    }

    // Admin rights wait until the address is verified by email code.
    let user = User::register(input.name, &email, Some(hash_password(&input.password)?), Role::Customer);
    state.collection::<User>().insert(&user).await?;
    tracing::info!(user_id = %user.id(), "User registered");
    Ok(user)
}

pub async fn login(state: &AppState, input: LoginInput) -> AppResult<User> {
    input.validate()?;
    let invalid = || AppError::Unauthorized("Invalid email or password".into());
    let mut user = find_by_email(state, &input.email).await?.ok_or_else(invalid)?;
    let hash = user.password_hash().ok_or_else(invalid)?;
    if !verify_password(&input.password, hash) {
        return Err(invalid());
    }

    promote_configured_admin(state, &mut user).await?;
    Ok(user)
}

pub async fn find_by_email(state: &AppState, email: &str) -> AppResult<Option<User>> {
    let email = normalize_email(email);
    Ok(state.collection::<User>().find_one(Filter::new().eq("email", email)).await?)
}

/// Loads the signed-in user; a session pointing at a deleted user is logged out.
pub async fn load_user(state: &AppState, id: Uuid) -> AppResult<User> {
    state
        .collection::<User>()
        .get(id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Please log in".into()))
}

pub(crate) async fn save_user(state: &AppState, user: &mut User) -> AppResult<()> {
    user.touch();
    if !state.collection::<User>().save(user).await? {
        return Err(AppError::not_found("User"));
    }
    Ok(())
}

/// Grants the admin role to a verified address listed in `ADMIN_EMAILS`.
async fn promote_configured_admin(state: &AppState, user: &mut User) -> AppResult<()> {
    if !user.is_admin() && user.email_verified() && state.config().is_admin_email(user.email()) {
        user.promote_to_admin();
        save_user(state, user).await?;
        tracing::info!(user_id = %user.id(), "User promoted to admin");
    }
    Ok(())
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .is_ok_and(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

// =============================================================================
// Email codes
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OtpRequestInput {
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OtpVerifyInput {
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    #[validate(length(equal = 6, message = "Enter the 6-digit code"))]
    pub code: String,
}

/// Emails a fresh code, replacing any earlier one for the address.
///
/// Failed attempts on a code that has not expired carry over to the new one,
/// and an address that used them all gets no new code until that code
/// expires.
pub async fn request_otp(state: &AppState, input: OtpRequestInput) -> AppResult<()> {
    input.validate()?;
    let email = normalize_email(&input.email);
    let codes = state.collection::<OtpCode>();
    let now = Utc::now();
    let previous = codes.all(Filter::new().eq("email", &email), Sort::Oldest).await?;
    let attempts = previous.iter().filter(|old| old.expires_at > now).map(|old| old.attempts).max().unwrap_or(0);
    if attempts >= OTP_MAX_ATTEMPTS {
        tracing::warn!(email = %email, "Email code requested while locked out");
        return Err(AppError::TooManyRequests("Too many attempts, please try again later".into()));
    }
    for old in previous {
        codes.delete(old.id).await?;
    }

    let code = generate_code();
    let otp = OtpCode {
        id: Uuid::now_v7(),
        email: email.clone(),
        code_hash: hash_code(&code),
        expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
        attempts,
    };
    codes.insert(&otp).await?;

    state
        .mailer()
        .send(OutgoingEmail {
            to: email,
            subject: "Your login code".into(),
            body: format!("Your login code is {code}. It expires in {OTP_TTL_MINUTES} minutes."),
        })
        .await?;
    Ok(())
}

/// Checks the code and signs the user in, creating the account on first use.
pub async fn verify_otp(state: &AppState, input: OtpVerifyInput) -> AppResult<User> {
    input.validate()?;
    let email = normalize_email(&input.email);
    let codes = state.collection::<OtpCode>();
    let mut otp = codes
        .find_one(Filter::new().eq("email", &email))
        .await?
        .ok_or_else(|| AppError::Unauthorized("Code expired or invalid".into()))?;

    if otp.expires_at <= Utc::now() {
        codes.delete(otp.id).await?;
        return Err(AppError::Unauthorized("Code expired or invalid".into()));
    }
    // A spent code stays stored until it expires so the lockout holds.
    if otp.attempts >= OTP_MAX_ATTEMPTS {
        return Err(AppError::Unauthorized("Code expired or invalid".into()));
    }
    if otp.code_hash != hash_code(input.code.trim()) {
        otp.attempts += 1;
        codes.save(&otp).await?;
        return Err(AppError::Unauthorized("Incorrect code".into()));
    }
    codes.delete(otp.id).await?;

    let mut user = match find_by_email(state, &email).await? {
        Some(user) => user,
        None => {
            let name = email.split('@').next().unwrap_or_default().to_string();
            let user = User::register(name, &email, None, Role::Customer);
            state.collection::<User>().insert(&user).await?;
            tracing::info!(user_id = %user.id(), "User registered by email code");
            user
        }
    };
    if !user.email_verified() && user.password_hash().is_some() && state.config().is_admin_email(&email) {
        // A password chosen before the inbox was proven cannot unlock an admin account.
        user.clear_password();
        tracing::warn!(user_id = %user.id(), "Unverified password dropped from admin account");
    }
    user.verify_email();
    save_user(state, &mut user).await?;
    promote_configured_admin(state, &mut user).await?;
    Ok(user)
}

fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000u32).to_string()
}

fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

// =============================================================================
// Profile and addresses
// =============================================================================

pub async fn update_profile(state: &AppState, user_id: Uuid, input: ProfileInput) -> AppResult<UserProfile> {
    input.validate()?;
    let mut user = load_user(state, user_id).await?;
    user.update_profile(input.name, input.phone);
    save_user(state, &mut user).await?;
    Ok(user.profile())
}

pub async fn add_address(state: &AppState, user_id: Uuid, input: AddressInput) -> AppResult<Address> {
    let fields = input.into_fields()?;
    let mut user = load_user(state, user_id).await?;
    let address = user.add_address(fields).clone();
    save_user(state, &mut user).await?;
    Ok(address)
}

pub async fn update_address(state: &AppState, user_id: Uuid, address_id: Uuid, input: AddressInput) -> AppResult<Address> {
    let fields = input.into_fields()?;
    let mut user = load_user(state, user_id).await?;
    let address = user.update_address(address_id, fields)?.clone();
    save_user(state, &mut user).await?;
    Ok(address)
}

pub async fn remove_address(state: &AppState, user_id: Uuid, address_id: Uuid) -> AppResult<Vec<Address>> {
    let mut user = load_user(state, user_id).await?;
    user.remove_address(address_id)?;
    save_user(state, &mut user).await?;
    Ok(user.addresses().to_vec())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
}

pub async fn list_users(state: &AppState, params: &UserListParams) -> AppResult<Paginated<UserProfile>> {
    let pagination = Pagination { page: params.page, per_page: params.per_page };
    let filter = Filter::new().search(&["name", "email"], params.search.as_deref().unwrap_or_default());
    let query = Query::new(filter).paged(pagination.to_page());
    let (users, total) = state.collection::<User>().find(&query).await?;
    Ok(Paginated::new(users, total, pagination).map(|u| u.profile()))
}
