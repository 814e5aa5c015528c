//! Appointment booking: the per-doctor slot guard plus create, reschedule
//! and cancel.
//!
//! A slot is `(doctor, date, time)`. At most one appointment whose status is
//! scheduled or confirmed may hold it. The check and the write share one
//! `BEGIN IMMEDIATE` transaction, and the partial unique index
//! `idx_appointments_active_slot` rejects whatever slips past the check.

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::*;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Patient not found")]
    PatientNotFound,
    #[error("Doctor not found")]
    DoctorNotFound,
    #[error("Appointment not found")]
    AppointmentNotFound,
    #[error("Doctor is not available")]
    DoctorUnavailable,
    #[error("This time slot is already booked")]
    SlotTaken,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.into())
    }
}

/// Collapse a UNIQUE violation on the active-slot index into `SlotTaken`.
fn slot_conflict(e: DatabaseError) -> BookingError {
    if e.is_unique_violation() {
        BookingError::SlotTaken
    } else {
        BookingError::Database(e)
    }
}

// ─── Slot guard ───────────────────────────────────────────────────────────────

/// True when no other scheduled/confirmed appointment holds the slot.
/// `exclude` skips the appointment being rescheduled.
pub fn can_book(
    conn: &Connection,
    doctor_id: &Uuid,
    date: NaiveDate,
    time: TimeOfDay,
    exclude: Option<&Uuid>,
) -> Result<bool, DatabaseError> {
    Ok(db::count_slot_holders(conn, doctor_id, date, time, exclude)? == 0)
}

// ─── Operations ───────────────────────────────────────────────────────────────

/// Book a new appointment after checking patient, doctor availability and slot.
pub fn book(conn: &mut Connection, request: NewAppointment) -> Result<Appointment, BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !db::patient_exists(&tx, &request.patient_id)? {
        return Err(BookingError::PatientNotFound);
    }
    match db::get_doctor_availability(&tx, &request.doctor_id)? {
        None => return Err(BookingError::DoctorNotFound),
        Some(Availability::Available) => {}
        Some(_) => return Err(BookingError::DoctorUnavailable),
    }
    if !can_book(
        &tx,
        &request.doctor_id,
        request.appointment_date,
        request.appointment_time,
        None,
    )? {
        tracing::warn!(
            doctor_id = %request.doctor_id,
            date = %request.appointment_date,
            time = %request.appointment_time,
            "Booking rejected: slot taken"
        );
        return Err(BookingError::SlotTaken);
    }

    let now = Utc::now();
    let appointment = Appointment {
        id: Uuid::new_v4(),
        patient_id: request.patient_id,
        doctor_id: request.doctor_id,
        appointment_date: request.appointment_date,
        appointment_time: request.appointment_time,
        appointment_type: request.appointment_type.unwrap_or(AppointmentType::Consultation),
        status: AppointmentStatus::Scheduled,
        reason: request.reason,
        notes: request.notes,
        created_at: now,
        updated_at: now,
    };
    db::insert_appointment(&tx, &appointment).map_err(slot_conflict)?;
    tx.commit()?;

    tracing::info!(appointment_id = %appointment.id, "Appointment booked");
    Ok(appointment)
}

/// Partially update an appointment. When the result holds a slot and the
/// slot or status changed, the guard runs excluding the appointment itself.
pub fn update(
    conn: &mut Connection,
    id: &Uuid,
    changes: AppointmentUpdate,
) -> Result<Appointment, BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = db::get_appointment(&tx, id)?.ok_or(BookingError::AppointmentNotFound)?;
    let mut next = current.clone();
    if let Some(date) = changes.appointment_date {
        next.appointment_date = date;
    }
    if let Some(time) = changes.appointment_time {
        next.appointment_time = time;
    }
    if let Some(kind) = changes.appointment_type {
        next.appointment_type = kind;
    }
    if let Some(status) = changes.status {
        next.status = status;
    }
    if changes.reason.is_some() {
        next.reason = changes.reason;
    }
    if changes.notes.is_some() {
        next.notes = changes.notes;
    }

    let slot_changed = next.appointment_date != current.appointment_date
        || next.appointment_time != current.appointment_time;
    let reactivated = !current.status.is_active() && next.status.is_active();
    if next.status.is_active()
        && (slot_changed || reactivated)
        && !can_book(
            &tx,
            &next.doctor_id,
            next.appointment_date,
            next.appointment_time,
            Some(id),
        )?
    {
        tracing::warn!(appointment_id = %id, "Reschedule rejected: slot taken");
        return Err(BookingError::SlotTaken);
    }

    db::update_appointment(&tx, &next).map_err(slot_conflict)?;
    tx.commit()?;
    Ok(next)
}

/// Mark an appointment cancelled, releasing its slot.
pub fn cancel(conn: &Connection, id: &Uuid) -> Result<(), BookingError> {
    if !db::set_appointment_status(conn, id, AppointmentStatus::Cancelled)? {
        return Err(BookingError::AppointmentNotFound);
    }
    tracing::info!(appointment_id = %id, "Appointment cancelled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::open_memory_database;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn request(patient: &Patient, doctor: &Doctor, date: NaiveDate, time: &str) -> NewAppointment {
        NewAppointment {
            patient_id: patient.id,
            doctor_id: doctor.id,
            appointment_date: date,
            appointment_time: time.parse().unwrap(),
            appointment_type: None,
            reason: Some("routine".into()),
            notes: None,
        }
    }

    struct Clinic {
        conn: Connection,
        patient: Patient,
        other_patient: Patient,
        doctor: Doctor,
    }

    fn clinic() -> Clinic {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);
        let other_patient = make_patient(&conn, "Sam", Gender::Male);
        let doctor = make_doctor(&conn, "Dr. A", "GP");
        Clinic { conn, patient, other_patient, doctor }
    }

    #[test]
    fn book_defaults_type_and_status() {
        let mut c = clinic();
        let appt = book(&mut c.conn, request(&c.patient, &c.doctor, day(1), "09:00")).unwrap();
        assert_eq!(appt.appointment_type, AppointmentType::Consultation);
        assert_eq!(appt.status, AppointmentStatus::Scheduled);
    }

    #[test]
    fn second_booking_of_same_slot_is_rejected() {
        let mut c = clinic();
        book(&mut c.conn, request(&c.patient, &c.doctor, day(1), "09:00")).unwrap();
        let err = book(&mut c.conn, request(&c.other_patient, &c.doctor, day(1), "09:00:00"))
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotTaken));
        assert_eq!(err.to_string(), "This time slot is already booked");

        // Different time or different day is fine.
        book(&mut c.conn, request(&c.other_patient, &c.doctor, day(1), "09:30")).unwrap();
        book(&mut c.conn, request(&c.other_patient, &c.doctor, day(2), "09:00")).unwrap();
    }

    #[test]
    fn confirmed_appointment_also_holds_the_slot() {
        let mut c = clinic();
        let first = book(&mut c.conn, request(&c.patient, &c.doctor, day(1), "09:00")).unwrap();
        let confirm = AppointmentUpdate {
            status: Some(AppointmentStatus::Confirmed),
            ..Default::default()
        };
        update(&mut c.conn, &first.id, confirm).unwrap();

        let err = book(&mut c.conn, request(&c.other_patient, &c.doctor, day(1), "09:00")).unwrap_err();
        assert!(matches!(err, BookingError::SlotTaken));
    }

    #[test]
    fn cancelling_frees_the_slot() {
        let mut c = clinic();
        let first = book(&mut c.conn, request(&c.patient, &c.doctor, day(1), "09:00")).unwrap();
        cancel(&c.conn, &first.id).unwrap();
        book(&mut c.conn, request(&c.other_patient, &c.doctor, day(1), "09:00")).unwrap();
    }

    #[test]
    fn missing_parties_and_unavailable_doctor() {
        let mut c = clinic();
        let mut req = request(&c.patient, &c.doctor, day(1), "09:00");
        req.patient_id = Uuid::new_v4();
        assert!(matches!(book(&mut c.conn, req).unwrap_err(), BookingError::PatientNotFound));

        let mut req = request(&c.patient, &c.doctor, day(1), "09:00");
        req.doctor_id = Uuid::new_v4();
        assert!(matches!(book(&mut c.conn, req).unwrap_err(), BookingError::DoctorNotFound));

        let leave = DoctorUpdate {
            availability: Some(Availability::OnLeave),
            ..Default::default()
        };
        db::update_doctor(&c.conn, &c.doctor.id, &leave).unwrap();
        let err = book(&mut c.conn, request(&c.patient, &c.doctor, day(1), "09:00")).unwrap_err();
        assert!(matches!(err, BookingError::DoctorUnavailable));
    }

    #[test]
    fn reschedule_onto_taken_slot_is_rejected() {
        let mut c = clinic();
        book(&mut c.conn, request(&c.patient, &c.doctor, day(1), "09:00")).unwrap();
        let second = book(&mut c.conn, request(&c.other_patient, &c.doctor, day(1), "10:00")).unwrap();

        let move_to_nine = AppointmentUpdate {
            appointment_time: Some("09:00".parse().unwrap()),
            ..Default::default()
        };
        let err = update(&mut c.conn, &second.id, move_to_nine).unwrap_err();
        assert!(matches!(err, BookingError::SlotTaken));

        let unchanged = db::get_appointment(&c.conn, &second.id).unwrap().unwrap();
        assert_eq!(unchanged.appointment_time.to_string(), "10:00");
    }

    #[test]
    fn reschedule_to_own_slot_succeeds() {
        let mut c = clinic();
        let appt = book(&mut c.conn, request(&c.patient, &c.doctor, day(1), "09:00")).unwrap();
        let same = AppointmentUpdate {
            appointment_date: Some(day(1)),
            appointment_time: Some("09:00".parse().unwrap()),
            notes: Some("bring scans".into()),
            ..Default::default()
        };
        let updated = update(&mut c.conn, &appt.id, same).unwrap();
        assert_eq!(updated.notes.as_deref(), Some("bring scans"));
    }

    #[test]
    fn reactivating_into_a_taken_slot_is_rejected() {
        let mut c = clinic();
        let first = book(&mut c.conn, request(&c.patient, &c.doctor, day(1), "09:00")).unwrap();
        cancel(&c.conn, &first.id).unwrap();
        book(&mut c.conn, request(&c.other_patient, &c.doctor, day(1), "09:00")).unwrap();

        let revive = AppointmentUpdate {
            status: Some(AppointmentStatus::Scheduled),
            ..Default::default()
        };
        let err = update(&mut c.conn, &first.id, revive).unwrap_err();
        assert!(matches!(err, BookingError::SlotTaken));
    }

    #[test]
    fn unknown_appointment_is_not_found() {
        let mut c = clinic();
        let err = update(&mut c.conn, &Uuid::new_v4(), AppointmentUpdate::default()).unwrap_err();
        assert!(matches!(err, BookingError::AppointmentNotFound));
        assert!(matches!(
            cancel(&c.conn, &Uuid::new_v4()).unwrap_err(),
            BookingError::AppointmentNotFound
        ));
    }

    #[test]
    fn can_book_ignores_excluded_appointment() {
        let mut c = clinic();
        let appt = book(&mut c.conn, request(&c.patient, &c.doctor, day(1), "09:00")).unwrap();
        let time = appt.appointment_time;
        assert!(!can_book(&c.conn, &c.doctor.id, day(1), time, None).unwrap());
        assert!(can_book(&c.conn, &c.doctor.id, day(1), time, Some(&appt.id)).unwrap());
    }
}
