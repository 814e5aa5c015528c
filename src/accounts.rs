//! Account creation: users, and patient/doctor profiles with their user.
//!
//! A profile and its owning user are inserted in one immediate
//! transaction so a failed profile insert never leaves a bare user behind.

use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::{hash_password, validate_password, CryptoError};
use crate::db::repository;
use crate::db::DatabaseError;
use crate::models::*;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Name is required")]
    MissingName,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("{0}")]
    Password(#[from] CryptoError),
    #[error("Email already exists")]
    EmailTaken,
    #[error("License number already exists")]
    LicenseTaken,
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for AccountError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.into())
    }
}

/// Login fields shared by every account kind.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Validate the request and build an unsaved user with a hashed password.
pub fn build_user(account: &NewAccount, role: Role) -> Result<User, AccountError> {
    let name = account.name.trim();
    if name.is_empty() {
        return Err(AccountError::MissingName);
    }
    let email = normalize_email(&account.email);
    if !is_valid_email(&email) {
        return Err(AccountError::InvalidEmail);
    }
    validate_password(&account.password)?;

    let now = Utc::now();
    Ok(User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email,
        password_hash: hash_password(&account.password),
        role,
        phone: account.phone.clone().filter(|p| !p.trim().is_empty()),
        status: UserStatus::Active,
        created_at: now,
        updated_at: now,
    })
}

fn insert_new_user(conn: &Connection, user: &User) -> Result<(), AccountError> {
    if repository::email_exists(conn, &user.email)? {
        return Err(AccountError::EmailTaken);
    }
    repository::insert_user(conn, user).map_err(|e| {
        if e.is_unique_violation() {
            AccountError::EmailTaken
        } else {
            e.into()
        }
    })
}

/// Create a bare user account.
pub fn create_user(conn: &Connection, account: &NewAccount, role: Role) -> Result<User, AccountError> {
    let user = build_user(account, role)?;
    insert_new_user(conn, &user)?;
    tracing::info!(user_id = %user.id, role = %role, "User account created");
    Ok(user)
}

pub fn register_patient(
    conn: &mut Connection,
    account: &NewAccount,
    date_of_birth: NaiveDate,
    gender: Gender,
    profile: PatientProfile,
) -> Result<PatientView, AccountError> {
    let user = build_user(account, Role::Patient)?;
    let now = Utc::now();
    let patient = Patient {
        id: Uuid::new_v4(),
        user_id: user.id,
        date_of_birth,
        gender,
        blood_group: profile.blood_group,
        address: profile.address,
        emergency_contact: profile.emergency_contact,
        medical_history: profile.medical_history,
        allergies: profile.allergies,
        created_at: now,
        updated_at: now,
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    insert_new_user(&tx, &user)?;
    repository::insert_patient(&tx, &patient)?;
    tx.commit()?;

    tracing::info!(patient_id = %patient.id, user_id = %user.id, "Patient registered");
    Ok(PatientView {
        user: UserSummary::from(&user),
        patient,
    })
}

pub fn register_doctor(
    conn: &mut Connection,
    account: &NewAccount,
    profile: DoctorProfile,
) -> Result<DoctorView, AccountError> {
    let user = build_user(account, Role::Doctor)?;
    let now = Utc::now();
    let doctor = Doctor {
        id: Uuid::new_v4(),
        user_id: user.id,
        specialization: profile.specialization.trim().to_string(),
        qualification: profile.qualification.trim().to_string(),
        experience: profile.experience.max(0),
        license_number: profile.license_number.trim().to_string(),
        consultation_fee: profile.consultation_fee,
        schedule: profile.schedule,
        availability: Availability::Available,
        created_at: now,
        updated_at: now,
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    insert_new_user(&tx, &user)?;
    if repository::license_number_exists(&tx, &doctor.license_number)? {
        return Err(AccountError::LicenseTaken);
    }
    repository::insert_doctor(&tx, &doctor).map_err(|e| {
        if e.is_unique_violation() {
            AccountError::LicenseTaken
        } else {
            AccountError::from(e)
        }
    })?;
    tx.commit()?;

    tracing::info!(doctor_id = %doctor.id, user_id = %user.id, "Doctor registered");
    Ok(DoctorView {
        user: UserSummary::from(&user),
        doctor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify_password;
    use crate::db::sqlite::open_memory_database;

    fn account(email: &str) -> NewAccount {
        NewAccount {
            name: "  Jane Roe ".into(),
            email: email.into(),
            password: "secret123".into(),
            phone: Some("555-0101".into()),
        }
    }

    fn profile(license: &str) -> DoctorProfile {
        DoctorProfile {
            specialization: "Neurology".into(),
            qualification: "MD".into(),
            experience: 4,
            license_number: license.into(),
            consultation_fee: Money::from_cents(9000),
            schedule: None,
        }
    }

    #[test]
    fn build_user_normalizes_and_hashes() {
        let user = build_user(&account(" Jane@Example.COM "), Role::Nurse).unwrap();
        assert_eq!(user.name, "Jane Roe");
        assert_eq!(user.email, "jane@example.com");
        assert_ne!(user.password_hash, "secret123");
        assert!(verify_password("secret123", &user.password_hash).unwrap());
    }

    #[test]
    fn build_user_validates_input() {
        let mut bad = account("not-an-email");
        assert!(matches!(build_user(&bad, Role::Patient), Err(AccountError::InvalidEmail)));
        bad = account("a@b.co");
        bad.password = "123".into();
        assert!(matches!(build_user(&bad, Role::Patient), Err(AccountError::Password(_))));
        bad = account("a@b.co");
        bad.name = "   ".into();
        assert!(matches!(build_user(&bad, Role::Patient), Err(AccountError::MissingName)));
    }

    #[test]
    fn duplicate_email_is_rejected_case_insensitively() {
        let conn = open_memory_database().unwrap();
        create_user(&conn, &account("dup@h.test"), Role::Patient).unwrap();
        let err = create_user(&conn, &account("DUP@h.test"), Role::Nurse).unwrap_err();
        assert!(matches!(err, AccountError::EmailTaken));
    }

    #[test]
    fn register_patient_creates_user_and_profile() {
        let mut conn = open_memory_database().unwrap();
        let dob = NaiveDate::from_ymd_opt(1990, 3, 4).unwrap();
        let view = register_patient(
            &mut conn,
            &account("pat@h.test"),
            dob,
            Gender::Female,
            PatientProfile::default(),
        )
        .unwrap();
        let stored = repository::get_patient(&conn, &view.patient.id).unwrap().unwrap();
        assert_eq!(stored.user.email, "pat@h.test");
        assert_eq!(stored.patient.date_of_birth, dob);
        let user = repository::get_user(&conn, &view.user.id).unwrap().unwrap();
        assert_eq!(user.role, Role::Patient);
    }

    #[test]
    fn duplicate_license_leaves_no_orphan_user() {
        let mut conn = open_memory_database().unwrap();
        register_doctor(&mut conn, &account("one@h.test"), profile("LIC-1")).unwrap();
        let err = register_doctor(&mut conn, &account("two@h.test"), profile("LIC-1")).unwrap_err();
        assert!(matches!(err, AccountError::LicenseTaken));
        assert!(!repository::email_exists(&conn, "two@h.test").unwrap());
    }
}
