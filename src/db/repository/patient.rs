use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{like_pattern, uuid_col, Conditions};
use crate::db::DatabaseError;
use crate::models::*;

const PATIENT_VIEW_SELECT: &str =
    "SELECT p.id, p.user_id, p.date_of_birth, p.gender, p.blood_group, p.address,
            p.emergency_contact, p.medical_history, p.allergies, p.created_at, p.updated_at,
            u.name, u.email, u.phone
     FROM patients p
     JOIN users u ON u.id = p.user_id";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        date_of_birth: row.get(2)?,
        gender: row.get(3)?,
        blood_group: row.get(4)?,
        address: row.get(5)?,
        emergency_contact: row.get(6)?,
        medical_history: row.get(7)?,
        allergies: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn patient_view_from_row(row: &Row<'_>) -> rusqlite::Result<PatientView> {
    let patient = patient_from_row(row)?;
    let user = UserSummary {
        id: patient.user_id,
        name: row.get(11)?,
        email: row.get(12)?,
        phone: row.get(13)?,
    };
    Ok(PatientView { patient, user })
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, user_id, date_of_birth, gender, blood_group, address,
                               emergency_contact, medical_history, allergies, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            patient.id.to_string(),
            patient.user_id.to_string(),
            patient.date_of_birth,
            patient.gender,
            patient.blood_group,
            patient.address,
            patient.emergency_contact,
            patient.medical_history,
            patient.allergies,
            patient.created_at,
            patient.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<PatientView>, DatabaseError> {
    let view = conn
        .query_row(
            &format!("{PATIENT_VIEW_SELECT} WHERE p.id = ?1"),
            params![id.to_string()],
            patient_view_from_row,
        )
        .optional()?;
    Ok(view)
}

pub fn patient_exists(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM patients WHERE id = ?1",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Patient profile owned by a user account, if any.
pub fn get_patient_by_user(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Option<PatientView>, DatabaseError> {
    let view = conn
        .query_row(
            &format!("{PATIENT_VIEW_SELECT} WHERE p.user_id = ?1"),
            params![user_id.to_string()],
            patient_view_from_row,
        )
        .optional()?;
    Ok(view)
}

pub fn list_patients(
    conn: &Connection,
    filter: &PatientFilter,
    page: Page,
) -> Result<(Vec<PatientView>, i64), DatabaseError> {
    let mut cond = Conditions::default();
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        cond.and("u.name LIKE {} COLLATE NOCASE", like_pattern(search));
    }

    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM patients p JOIN users u ON u.id = p.user_id WHERE 1=1{}",
            cond.sql()
        ),
        cond.params().as_slice(),
        |row| row.get(0),
    )?;

    let limit = cond.bind(i64::from(page.limit));
    let offset = cond.bind(page.offset());
    let sql = format!(
        "{PATIENT_VIEW_SELECT} WHERE 1=1{} ORDER BY p.created_at DESC LIMIT {limit} OFFSET {offset}",
        cond.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let patients = stmt
        .query_map(cond.params().as_slice(), patient_view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((patients, total))
}

/// Apply a partial update. Returns false when the patient does not exist.
pub fn update_patient(
    conn: &Connection,
    id: &Uuid,
    update: &PatientUpdate,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET
            date_of_birth = COALESCE(?2, date_of_birth),
            gender = COALESCE(?3, gender),
            blood_group = COALESCE(?4, blood_group),
            address = COALESCE(?5, address),
            emergency_contact = COALESCE(?6, emergency_contact),
            medical_history = COALESCE(?7, medical_history),
            allergies = COALESCE(?8, allergies),
            updated_at = ?9
         WHERE id = ?1",
        params![
            id.to_string(),
            update.date_of_birth,
            update.gender,
            update.blood_group,
            update.address,
            update.emergency_contact,
            update.medical_history,
            update.allergies,
            Utc::now(),
        ],
    )?;
    Ok(changed > 0)
}

/// Delete a patient by removing its owning user; the profile row and its
/// appointments, records and bills cascade.
pub fn delete_patient_with_user(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM users WHERE id = (SELECT user_id FROM patients WHERE id = ?1)",
        params![id.to_string()],
    )?;
    Ok(changed > 0)
}

pub fn patient_stats(conn: &Connection) -> Result<PatientStats, DatabaseError> {
    let stats = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(u.status = 'active'), 0),
                COALESCE(SUM(p.gender = 'male'), 0),
                COALESCE(SUM(p.gender = 'female'), 0)
         FROM patients p JOIN users u ON u.id = p.user_id",
        [],
        |row| {
            Ok(PatientStats {
                total: row.get(0)?,
                active: row.get(1)?,
                male: row.get(2)?,
                female: row.get(3)?,
            })
        },
    )?;
    Ok(stats)
}
