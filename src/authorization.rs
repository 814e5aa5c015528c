//! Role gates and row-level scoping.
//!
//! Two checks run on every protected request:
//! 1. Role gate: the caller's role must be in the endpoint's allowed set.
//! 2. Row scope: doctors see rows carrying their doctor id, patients rows
//!    carrying their patient id, admins and nurses see everything.
//!
//! A doctor or patient account without a profile row sees nothing.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository::{get_doctor_by_user, get_patient_by_user};
use crate::db::DatabaseError;
use crate::models::{Role, Scope};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// What a caller may see, resolved once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// Admin and nurse.
    All,
    /// Doctor with a profile row.
    Doctor(Uuid),
    /// Patient with a profile row.
    Patient(Uuid),
    /// Doctor or patient account with no profile row.
    Nothing,
}

impl AccessScope {
    /// Merge caller-supplied filters with the caller's own restriction.
    /// The caller's restriction always wins. `None` means no row is visible.
    pub fn restrict(self, requested: Scope) -> Option<Scope> {
        match self {
            Self::All => Some(requested),
            Self::Doctor(id) => Some(Scope {
                doctor_id: Some(id),
                ..requested
            }),
            Self::Patient(id) => Some(Scope {
                patient_id: Some(id),
                ..requested
            }),
            Self::Nothing => None,
        }
    }

    /// Whether a row owned by (`patient_id`, `doctor_id`) is visible.
    pub fn permits(self, patient_id: &Uuid, doctor_id: Option<&Uuid>) -> bool {
        match self {
            Self::All => true,
            Self::Doctor(id) => doctor_id == Some(&id),
            Self::Patient(id) => *patient_id == id,
            Self::Nothing => false,
        }
    }

    /// Whether the caller is the given patient, or is not a patient at all.
    pub fn permits_patient(self, patient_id: &Uuid) -> bool {
        match self {
            Self::Patient(id) => *patient_id == id,
            Self::Nothing => false,
            Self::All | Self::Doctor(_) => true,
        }
    }

    pub fn doctor_id(self) -> Option<Uuid> {
        match self {
            Self::Doctor(id) => Some(id),
            _ => None,
        }
    }

    pub fn patient_id(self) -> Option<Uuid> {
        match self {
            Self::Patient(id) => Some(id),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("Access denied. Required role: {required}")]
    RoleDenied { required: String },
    #[error("Access denied")]
    RowDenied,
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Checks
// ═══════════════════════════════════════════════════════════

/// Fail unless `role` is one of `allowed`.
pub fn require_role(role: Role, allowed: &[Role]) -> Result<(), AuthorizationError> {
    if allowed.contains(&role) {
        return Ok(());
    }
    let required = allowed
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(AuthorizationError::RoleDenied { required })
}

/// Resolve the row scope for a user.
pub fn resolve_scope(
    conn: &Connection,
    user_id: &Uuid,
    role: Role,
) -> Result<AccessScope, AuthorizationError> {
    let scope = match role {
        Role::Admin | Role::Nurse => AccessScope::All,
        Role::Doctor => get_doctor_by_user(conn, user_id)?
            .map(|view| AccessScope::Doctor(view.doctor.id))
            .unwrap_or(AccessScope::Nothing),
        Role::Patient => get_patient_by_user(conn, user_id)?
            .map(|view| AccessScope::Patient(view.patient.id))
            .unwrap_or(AccessScope::Nothing),
    };
    Ok(scope)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Gender;

    #[test]
    fn role_gate_lists_required_roles() {
        assert!(require_role(Role::Admin, &[Role::Admin]).is_ok());
        let err = require_role(Role::Patient, &[Role::Admin, Role::Doctor]).unwrap_err();
        assert_eq!(err.to_string(), "Access denied. Required role: admin, doctor");
    }

    #[test]
    fn staff_roles_see_everything() {
        let conn = open_memory_database().unwrap();
        let admin = make_user(&conn, "Root", "root@h.test", Role::Admin);
        let nurse = make_user(&conn, "Nina", "nina@h.test", Role::Nurse);
        assert_eq!(resolve_scope(&conn, &admin.id, Role::Admin).unwrap(), AccessScope::All);
        assert_eq!(resolve_scope(&conn, &nurse.id, Role::Nurse).unwrap(), AccessScope::All);
    }

    #[test]
    fn profiles_resolve_to_their_ids() {
        let conn = open_memory_database().unwrap();
        let doctor = make_doctor(&conn, "Dr. Who", "Cardiology");
        let patient = make_patient(&conn, "Pat", Gender::Male);

        assert_eq!(
            resolve_scope(&conn, &doctor.user_id, Role::Doctor).unwrap(),
            AccessScope::Doctor(doctor.id)
        );
        assert_eq!(
            resolve_scope(&conn, &patient.user_id, Role::Patient).unwrap(),
            AccessScope::Patient(patient.id)
        );
    }

    #[test]
    fn account_without_profile_sees_nothing() {
        let conn = open_memory_database().unwrap();
        let orphan = make_user(&conn, "Orphan", "orphan@h.test", Role::Doctor);
        let scope = resolve_scope(&conn, &orphan.id, Role::Doctor).unwrap();
        assert_eq!(scope, AccessScope::Nothing);
        assert!(scope.restrict(Scope::default()).is_none());
        assert!(!scope.permits(&Uuid::new_v4(), None));
    }

    #[test]
    fn caller_restriction_overrides_requested_filter() {
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let requested = Scope {
            patient_id: Some(theirs),
            doctor_id: None,
        };
        let merged = AccessScope::Patient(mine).restrict(requested).unwrap();
        assert_eq!(merged.patient_id, Some(mine));

        let merged = AccessScope::Doctor(mine).restrict(requested).unwrap();
        assert_eq!(merged.doctor_id, Some(mine));
        assert_eq!(merged.patient_id, Some(theirs));

        assert_eq!(AccessScope::All.restrict(requested), Some(requested));
    }

    #[test]
    fn row_visibility() {
        let patient = Uuid::new_v4();
        let doctor = Uuid::new_v4();
        assert!(AccessScope::All.permits(&patient, None));
        assert!(AccessScope::Patient(patient).permits(&patient, Some(&doctor)));
        assert!(!AccessScope::Patient(Uuid::new_v4()).permits(&patient, Some(&doctor)));
        assert!(AccessScope::Doctor(doctor).permits(&patient, Some(&doctor)));
        assert!(!AccessScope::Doctor(doctor).permits(&patient, None));
        assert!(AccessScope::Doctor(doctor).permits_patient(&patient));
        assert!(!AccessScope::Patient(doctor).permits_patient(&patient));
    }
}
