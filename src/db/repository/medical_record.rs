use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{uuid_col, Conditions};
use crate::db::DatabaseError;
use crate::models::*;

const RECORD_VIEW_SELECT: &str =
    "SELECT r.id, r.patient_id, r.doctor_id, r.visit_date, r.diagnosis, r.symptoms,
            r.prescription, r.lab_tests, r.treatment_notes, r.follow_up_date,
            r.created_at, r.updated_at,
            pu.name, pu.email, pu.phone, du.name, d.specialization
     FROM medical_records r
     JOIN patients p ON p.id = r.patient_id
     JOIN users pu ON pu.id = p.user_id
     JOIN doctors d ON d.id = r.doctor_id
     JOIN users du ON du.id = d.user_id";

fn record_view_from_row(row: &Row<'_>) -> rusqlite::Result<MedicalRecordView> {
    let record = MedicalRecord {
        id: uuid_col(row, 0)?,
        patient_id: uuid_col(row, 1)?,
        doctor_id: uuid_col(row, 2)?,
        visit_date: row.get(3)?,
        diagnosis: row.get(4)?,
        symptoms: row.get(5)?,
        prescription: row.get(6)?,
        lab_tests: row.get(7)?,
        treatment_notes: row.get(8)?,
        follow_up_date: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    };
    let patient = PartyRef {
        id: record.patient_id,
        name: row.get(12)?,
        email: row.get(13)?,
        phone: row.get(14)?,
    };
    let doctor = DoctorRef {
        id: record.doctor_id,
        name: row.get(15)?,
        specialization: row.get(16)?,
    };
    Ok(MedicalRecordView {
        record,
        patient,
        doctor,
    })
}

pub fn insert_medical_record(conn: &Connection, rec: &MedicalRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medical_records (id, patient_id, doctor_id, visit_date, diagnosis, symptoms,
                                      prescription, lab_tests, treatment_notes, follow_up_date,
                                      created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            rec.id.to_string(),
            rec.patient_id.to_string(),
            rec.doctor_id.to_string(),
            rec.visit_date,
            rec.diagnosis,
            rec.symptoms,
            rec.prescription,
            rec.lab_tests,
            rec.treatment_notes,
            rec.follow_up_date,
            rec.created_at,
            rec.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_medical_record(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<MedicalRecordView>, DatabaseError> {
    let view = conn
        .query_row(
            &format!("{RECORD_VIEW_SELECT} WHERE r.id = ?1"),
            params![id.to_string()],
            record_view_from_row,
        )
        .optional()?;
    Ok(view)
}

/// Paginated listing, most recent visit first.
pub fn list_medical_records(
    conn: &Connection,
    filter: &MedicalRecordFilter,
    page: Page,
) -> Result<(Vec<MedicalRecordView>, i64), DatabaseError> {
    let mut cond = Conditions::default();
    cond.scoped(&filter.scope, "r.patient_id", "r.doctor_id");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM medical_records r WHERE 1=1{}", cond.sql()),
        cond.params().as_slice(),
        |row| row.get(0),
    )?;

    let limit = cond.bind(i64::from(page.limit));
    let offset = cond.bind(page.offset());
    let sql = format!(
        "{RECORD_VIEW_SELECT} WHERE 1=1{}
         ORDER BY r.visit_date DESC, r.created_at DESC LIMIT {limit} OFFSET {offset}",
        cond.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(cond.params().as_slice(), record_view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, total))
}

/// Full visit history of one patient, most recent first.
pub fn patient_history(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<MedicalRecordView>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{RECORD_VIEW_SELECT} WHERE r.patient_id = ?1
         ORDER BY r.visit_date DESC, r.created_at DESC"
    ))?;
    let rows = stmt
        .query_map(params![patient_id.to_string()], record_view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_medical_record(
    conn: &Connection,
    id: &Uuid,
    update: &MedicalRecordUpdate,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE medical_records SET
            visit_date = COALESCE(?2, visit_date),
            diagnosis = COALESCE(?3, diagnosis),
            symptoms = COALESCE(?4, symptoms),
            prescription = COALESCE(?5, prescription),
            lab_tests = COALESCE(?6, lab_tests),
            treatment_notes = COALESCE(?7, treatment_notes),
            follow_up_date = COALESCE(?8, follow_up_date),
            updated_at = ?9
         WHERE id = ?1",
        params![
            id.to_string(),
            update.visit_date,
            update.diagnosis,
            update.symptoms,
            update.prescription,
            update.lab_tests,
            update.treatment_notes,
            update.follow_up_date,
            Utc::now(),
        ],
    )?;
    Ok(changed > 0)
}

pub fn delete_medical_record(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM medical_records WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::super::fixtures::*;
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn record(patient: &Patient, doctor: &Doctor, visit: NaiveDate, diagnosis: &str) -> MedicalRecord {
        let now = Utc::now();
        MedicalRecord {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            doctor_id: doctor.id,
            visit_date: visit,
            diagnosis: diagnosis.into(),
            symptoms: Some("cough".into()),
            prescription: None,
            lab_tests: None,
            treatment_notes: None,
            follow_up_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    #[test]
    fn history_is_newest_first() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Male);
        let doctor = make_doctor(&conn, "Dr. A", "GP");
        insert_medical_record(&conn, &record(&patient, &doctor, day(1), "flu")).unwrap();
        insert_medical_record(&conn, &record(&patient, &doctor, day(20), "bronchitis")).unwrap();

        let history = patient_history(&conn, &patient.id).unwrap();
        let diagnoses: Vec<&str> = history.iter().map(|r| r.record.diagnosis.as_str()).collect();
        assert_eq!(diagnoses, ["bronchitis", "flu"]);
        assert_eq!(history[0].doctor.name, "Dr. A");
    }

    #[test]
    fn listing_respects_doctor_scope() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Male);
        let a = make_doctor(&conn, "Dr. A", "GP");
        let b = make_doctor(&conn, "Dr. B", "GP");
        insert_medical_record(&conn, &record(&patient, &a, day(1), "flu")).unwrap();
        insert_medical_record(&conn, &record(&patient, &b, day(2), "cold")).unwrap();

        let filter = MedicalRecordFilter {
            scope: Scope { doctor_id: Some(b.id), patient_id: None },
        };
        let (rows, total) = list_medical_records(&conn, &filter, Page::default()).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].record.diagnosis, "cold");
    }

    #[test]
    fn update_and_delete() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Male);
        let doctor = make_doctor(&conn, "Dr. A", "GP");
        let rec = record(&patient, &doctor, day(1), "flu");
        insert_medical_record(&conn, &rec).unwrap();

        let update = MedicalRecordUpdate {
            prescription: Some("rest and fluids".into()),
            follow_up_date: Some(day(15)),
            ..Default::default()
        };
        assert!(update_medical_record(&conn, &rec.id, &update).unwrap());
        let view = get_medical_record(&conn, &rec.id).unwrap().unwrap();
        assert_eq!(view.record.prescription.as_deref(), Some("rest and fluids"));
        assert_eq!(view.record.diagnosis, "flu");
        assert_eq!(view.record.follow_up_date, Some(day(15)));

        assert!(delete_medical_record(&conn, &rec.id).unwrap());
        assert!(get_medical_record(&conn, &rec.id).unwrap().is_none());
    }
}
