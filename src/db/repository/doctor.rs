use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{like_pattern, uuid_col, Conditions};
use crate::db::DatabaseError;
use crate::models::*;

const DOCTOR_VIEW_SELECT: &str =
    "SELECT d.id, d.user_id, d.specialization, d.qualification, d.experience, d.license_number,
            d.consultation_fee, d.schedule, d.availability, d.created_at, d.updated_at,
            u.name, u.email, u.phone
     FROM doctors d
     JOIN users u ON u.id = d.user_id";

fn schedule_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

fn schedule_text(schedule: &Option<serde_json::Value>) -> Option<String> {
    schedule.as_ref().map(|v| v.to_string())
}

fn doctor_view_from_row(row: &Row<'_>) -> rusqlite::Result<DoctorView> {
    let doctor = Doctor {
        id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        specialization: row.get(2)?,
        qualification: row.get(3)?,
        experience: row.get(4)?,
        license_number: row.get(5)?,
        consultation_fee: row.get(6)?,
        schedule: schedule_col(row, 7)?,
        availability: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    };
    let user = UserSummary {
        id: doctor.user_id,
        name: row.get(11)?,
        email: row.get(12)?,
        phone: row.get(13)?,
    };
    Ok(DoctorView { doctor, user })
}

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, user_id, specialization, qualification, experience, license_number,
                              consultation_fee, schedule, availability, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            doctor.id.to_string(),
            doctor.user_id.to_string(),
            doctor.specialization,
            doctor.qualification,
            doctor.experience,
            doctor.license_number,
            doctor.consultation_fee,
            schedule_text(&doctor.schedule),
            doctor.availability,
            doctor.created_at,
            doctor.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<DoctorView>, DatabaseError> {
    let view = conn
        .query_row(
            &format!("{DOCTOR_VIEW_SELECT} WHERE d.id = ?1"),
            params![id.to_string()],
            doctor_view_from_row,
        )
        .optional()?;
    Ok(view)
}

pub fn get_doctor_by_user(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Option<DoctorView>, DatabaseError> {
    let view = conn
        .query_row(
            &format!("{DOCTOR_VIEW_SELECT} WHERE d.user_id = ?1"),
            params![user_id.to_string()],
            doctor_view_from_row,
        )
        .optional()?;
    Ok(view)
}

/// Availability of a doctor, `None` when no such doctor exists.
pub fn get_doctor_availability(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<Availability>, DatabaseError> {
    let availability = conn
        .query_row(
            "SELECT availability FROM doctors WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(availability)
}

pub fn license_number_exists(conn: &Connection, license: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM doctors WHERE license_number = ?1",
        params![license.trim()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_doctors(
    conn: &Connection,
    filter: &DoctorFilter,
    page: Page,
) -> Result<(Vec<DoctorView>, i64), DatabaseError> {
    let mut cond = Conditions::default();
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        cond.and(
            "(u.name LIKE {} COLLATE NOCASE OR d.specialization LIKE {} COLLATE NOCASE)",
            like_pattern(search),
        );
    }
    if let Some(spec) = filter.specialization.as_deref().filter(|s| !s.trim().is_empty()) {
        cond.and("d.specialization LIKE {} COLLATE NOCASE", like_pattern(spec));
    }

    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM doctors d JOIN users u ON u.id = d.user_id WHERE 1=1{}",
            cond.sql()
        ),
        cond.params().as_slice(),
        |row| row.get(0),
    )?;

    let limit = cond.bind(i64::from(page.limit));
    let offset = cond.bind(page.offset());
    let sql = format!(
        "{DOCTOR_VIEW_SELECT} WHERE 1=1{} ORDER BY d.created_at DESC LIMIT {limit} OFFSET {offset}",
        cond.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let doctors = stmt
        .query_map(cond.params().as_slice(), doctor_view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((doctors, total))
}

/// Doctors currently taking appointments, optionally narrowed by specialization.
pub fn list_available_doctors(
    conn: &Connection,
    specialization: Option<&str>,
) -> Result<Vec<DoctorView>, DatabaseError> {
    let mut cond = Conditions::default();
    cond.and("d.availability = {}", Availability::Available);
    if let Some(spec) = specialization.filter(|s| !s.trim().is_empty()) {
        cond.and("d.specialization LIKE {} COLLATE NOCASE", like_pattern(spec));
    }
    let sql = format!("{DOCTOR_VIEW_SELECT} WHERE 1=1{} ORDER BY u.name ASC", cond.sql());
    let mut stmt = conn.prepare(&sql)?;
    let doctors = stmt
        .query_map(cond.params().as_slice(), doctor_view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(doctors)
}

pub fn update_doctor(
    conn: &Connection,
    id: &Uuid,
    update: &DoctorUpdate,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE doctors SET
            specialization = COALESCE(?2, specialization),
            qualification = COALESCE(?3, qualification),
            experience = COALESCE(?4, experience),
            consultation_fee = COALESCE(?5, consultation_fee),
            schedule = COALESCE(?6, schedule),
            availability = COALESCE(?7, availability),
            updated_at = ?8
         WHERE id = ?1",
        params![
            id.to_string(),
            update.specialization,
            update.qualification,
            update.experience,
            update.consultation_fee,
            schedule_text(&update.schedule),
            update.availability,
            Utc::now(),
        ],
    )?;
    Ok(changed > 0)
}

pub fn delete_doctor_with_user(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM users WHERE id = (SELECT user_id FROM doctors WHERE id = ?1)",
        params![id.to_string()],
    )?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn schedule_round_trips_as_json() {
        let conn = open_memory_database().unwrap();
        let doctor = make_doctor(&conn, "Dr. House", "Diagnostics");
        let schedule = serde_json::json!({"monday": ["09:00-12:00"], "friday": []});
        let update = DoctorUpdate {
            schedule: Some(schedule.clone()),
            availability: Some(Availability::Busy),
            ..Default::default()
        };
        assert!(update_doctor(&conn, &doctor.id, &update).unwrap());

        let view = get_doctor(&conn, &doctor.id).unwrap().unwrap();
        assert_eq!(view.doctor.schedule, Some(schedule));
        assert_eq!(view.doctor.availability, Availability::Busy);
        assert_eq!(view.doctor.specialization, "Diagnostics");
        assert_eq!(view.doctor.consultation_fee, Money::from_cents(15000));
    }

    #[test]
    fn available_listing_skips_busy_and_on_leave() {
        let conn = open_memory_database().unwrap();
        make_doctor(&conn, "Dr. A", "Cardiology");
        let b = make_doctor(&conn, "Dr. B", "Cardiology");
        make_doctor(&conn, "Dr. C", "Neurology");
        let leave = DoctorUpdate { availability: Some(Availability::OnLeave), ..Default::default() };
        update_doctor(&conn, &b.id, &leave).unwrap();

        let all = list_available_doctors(&conn, None).unwrap();
        assert_eq!(all.len(), 2);
        let cardio = list_available_doctors(&conn, Some("cardio")).unwrap();
        assert_eq!(cardio.len(), 1);
        assert_eq!(cardio[0].user.name, "Dr. A");
    }

    #[test]
    fn list_searches_name_and_specialization() {
        let conn = open_memory_database().unwrap();
        make_doctor(&conn, "Dr. Strange", "Neurosurgery");
        make_doctor(&conn, "Dr. Quinn", "General Practice");

        let filter = DoctorFilter { search: Some("neuro".into()), ..Default::default() };
        let (rows, total) = list_doctors(&conn, &filter, Page::default()).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].user.name, "Dr. Strange");

        let filter = DoctorFilter { search: Some("quinn".into()), ..Default::default() };
        let (_, total) = list_doctors(&conn, &filter, Page::default()).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn license_number_is_unique() {
        let conn = open_memory_database().unwrap();
        let doctor = make_doctor(&conn, "Dr. A", "Cardiology");
        assert!(license_number_exists(&conn, &doctor.license_number).unwrap());
        assert!(!license_number_exists(&conn, "LIC-unknown").unwrap());
        assert_eq!(
            get_doctor_availability(&conn, &doctor.id).unwrap(),
            Some(Availability::Available)
        );
        assert_eq!(get_doctor_availability(&conn, &Uuid::new_v4()).unwrap(), None);
    }
}
