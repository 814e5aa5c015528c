use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{uuid_col, Conditions};
use crate::db::DatabaseError;
use crate::models::*;

const APPOINTMENT_COLUMNS: &str = "a.id, a.patient_id, a.doctor_id, a.appointment_date,
     a.appointment_time, a.type, a.status, a.reason, a.notes, a.created_at, a.updated_at";

const APPOINTMENT_JOINS: &str = "FROM appointments a
     JOIN patients p ON p.id = a.patient_id
     JOIN users pu ON pu.id = p.user_id
     JOIN doctors d ON d.id = a.doctor_id
     JOIN users du ON du.id = d.user_id";

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: uuid_col(row, 0)?,
        patient_id: uuid_col(row, 1)?,
        doctor_id: uuid_col(row, 2)?,
        appointment_date: row.get(3)?,
        appointment_time: row.get(4)?,
        appointment_type: row.get(5)?,
        status: row.get(6)?,
        reason: row.get(7)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn appointment_view_from_row(row: &Row<'_>) -> rusqlite::Result<AppointmentView> {
    let appointment = appointment_from_row(row)?;
    let patient = PartyRef {
        id: appointment.patient_id,
        name: row.get(11)?,
        email: row.get(12)?,
        phone: row.get(13)?,
    };
    let doctor = DoctorRef {
        id: appointment.doctor_id,
        name: row.get(14)?,
        specialization: row.get(15)?,
    };
    Ok(AppointmentView {
        appointment,
        patient,
        doctor,
    })
}

fn view_select() -> String {
    format!(
        "SELECT {APPOINTMENT_COLUMNS}, pu.name, pu.email, pu.phone, du.name, d.specialization
         {APPOINTMENT_JOINS}"
    )
}

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, doctor_id, appointment_date, appointment_time,
                                   type, status, reason, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            appt.id.to_string(),
            appt.patient_id.to_string(),
            appt.doctor_id.to_string(),
            appt.appointment_date,
            appt.appointment_time,
            appt.appointment_type,
            appt.status,
            appt.reason,
            appt.notes,
            appt.created_at,
            appt.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let appt = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.id = ?1"),
            params![id.to_string()],
            appointment_from_row,
        )
        .optional()?;
    Ok(appt)
}

pub fn get_appointment_view(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<AppointmentView>, DatabaseError> {
    let view = conn
        .query_row(
            &format!("{} WHERE a.id = ?1", view_select()),
            params![id.to_string()],
            appointment_view_from_row,
        )
        .optional()?;
    Ok(view)
}

/// Paginated listing ordered by date then time.
pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
    page: Page,
) -> Result<(Vec<AppointmentView>, i64), DatabaseError> {
    let mut cond = Conditions::default();
    if let Some(status) = filter.status {
        cond.and("a.status = {}", status);
    }
    if let Some(date) = filter.date {
        cond.and("a.appointment_date = {}", date);
    }
    cond.scoped(&filter.scope, "a.patient_id", "a.doctor_id");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM appointments a WHERE 1=1{}", cond.sql()),
        cond.params().as_slice(),
        |row| row.get(0),
    )?;

    let limit = cond.bind(i64::from(page.limit));
    let offset = cond.bind(page.offset());
    let sql = format!(
        "{} WHERE 1=1{}
         ORDER BY a.appointment_date ASC, a.appointment_time ASC
         LIMIT {limit} OFFSET {offset}",
        view_select(),
        cond.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(cond.params().as_slice(), appointment_view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, total))
}

/// Every appointment on `date` within `scope`, ordered by time.
pub fn list_appointments_on(
    conn: &Connection,
    date: NaiveDate,
    scope: &Scope,
) -> Result<Vec<AppointmentView>, DatabaseError> {
    let mut cond = Conditions::default();
    cond.and("a.appointment_date = {}", date);
    cond.scoped(scope, "a.patient_id", "a.doctor_id");
    let sql = format!(
        "{} WHERE 1=1{} ORDER BY a.appointment_time ASC",
        view_select(),
        cond.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(cond.params().as_slice(), appointment_view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Number of scheduled/confirmed appointments holding a doctor's slot,
/// ignoring `exclude`.
pub fn count_slot_holders(
    conn: &Connection,
    doctor_id: &Uuid,
    date: NaiveDate,
    time: TimeOfDay,
    exclude: Option<&Uuid>,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM appointments
         WHERE doctor_id = ?1 AND appointment_date = ?2 AND appointment_time = ?3
           AND status IN ('scheduled', 'confirmed')
           AND (?4 IS NULL OR id != ?4)",
        params![
            doctor_id.to_string(),
            date,
            time,
            exclude.map(|id| id.to_string()),
        ],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Overwrite the mutable columns of an existing appointment.
pub fn update_appointment(conn: &Connection, appt: &Appointment) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET
            appointment_date = ?2, appointment_time = ?3, type = ?4, status = ?5,
            reason = ?6, notes = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            appt.id.to_string(),
            appt.appointment_date,
            appt.appointment_time,
            appt.appointment_type,
            appt.status,
            appt.reason,
            appt.notes,
            Utc::now(),
        ],
    )?;
    Ok(changed > 0)
}

pub fn set_appointment_status(
    conn: &Connection,
    id: &Uuid,
    status: AppointmentStatus,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), status, Utc::now()],
    )?;
    Ok(changed > 0)
}

pub fn appointment_stats(
    conn: &Connection,
    today: NaiveDate,
    scope: &Scope,
) -> Result<AppointmentStats, DatabaseError> {
    let mut cond = Conditions::default();
    let today_ph = cond.bind(today);
    cond.scoped(scope, "a.patient_id", "a.doctor_id");
    let sql = format!(
        "SELECT COUNT(*),
                COALESCE(SUM(a.appointment_date = {today_ph}), 0),
                COALESCE(SUM(a.status = 'scheduled'), 0),
                COALESCE(SUM(a.status = 'completed'), 0),
                COALESCE(SUM(a.status = 'cancelled'), 0)
         FROM appointments a WHERE 1=1{}",
        cond.sql()
    );
    let stats = conn.query_row(&sql, cond.params().as_slice(), |row| {
        Ok(AppointmentStats {
            total: row.get(0)?,
            today: row.get(1)?,
            scheduled: row.get(2)?,
            completed: row.get(3)?,
            cancelled: row.get(4)?,
        })
    })?;
    Ok(stats)
}
