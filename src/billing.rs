//! Billing balance engine.
//!
//! Every bill satisfies `balance == total - paid` and its status is `paid`
//! exactly when the balance is zero. Amounts are integer cents, so these
//! are exact comparisons. `overdue` is the only status set by hand.

use chrono::{Datelike, NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::*;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Patient not found")]
    PatientNotFound,
    #[error("Bill not found")]
    BillNotFound,
    #[error("A bill needs at least one service")]
    NoServices,
    #[error("Invalid service: {0}")]
    InvalidService(String),
    #[error("Bill total must be greater than zero")]
    ZeroTotal,
    #[error("Bill amount is out of range")]
    AmountOutOfRange,
    #[error("Invalid payment amount")]
    InvalidPayment,
    #[error("Bill total cannot be less than the amount already paid")]
    TotalBelowPaid,
    #[error("Only bills with an outstanding balance can be marked overdue")]
    InvalidStatus,
    #[error("Cannot delete a bill that has been paid")]
    PaidBillDeletion,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for BillingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.into())
    }
}

// ─── Pure arithmetic ──────────────────────────────────────────────────────────

/// Sum of `quantity * price` over all lines.
pub fn compute_total(services: &[ServiceLine]) -> Result<Money, BillingError> {
    if services.is_empty() {
        return Err(BillingError::NoServices);
    }
    let mut total = Money::ZERO;
    for line in services {
        if line.name.trim().is_empty() {
            return Err(BillingError::InvalidService("name is required".into()));
        }
        if line.quantity < 1 {
            return Err(BillingError::InvalidService(format!(
                "{}: quantity must be at least 1",
                line.name
            )));
        }
        if line.price.cents() < 0 {
            return Err(BillingError::InvalidService(format!(
                "{}: price cannot be negative",
                line.name
            )));
        }
        total = line
            .price
            .checked_mul(line.quantity)
            .and_then(|amount| total.checked_add(amount))
            .ok_or(BillingError::AmountOutOfRange)?;
    }
    Ok(total)
}

/// Status implied by the amounts alone.
pub fn derive_status(total: Money, paid: Money) -> BillStatus {
    if total == paid {
        BillStatus::Paid
    } else if paid.is_positive() {
        BillStatus::PartiallyPaid
    } else {
        BillStatus::Pending
    }
}

/// Apply a payment to the bill in memory. Rejects non-positive amounts and
/// amounts above the outstanding balance, leaving the bill untouched.
pub fn apply_payment(
    bill: &mut Bill,
    amount: Money,
    method: Option<PaymentMethod>,
) -> Result<(), BillingError> {
    if !amount.is_positive() || amount > bill.balance_amount {
        return Err(BillingError::InvalidPayment);
    }
    let paid = bill
        .paid_amount
        .checked_add(amount)
        .ok_or(BillingError::AmountOutOfRange)?;
    bill.paid_amount = paid;
    bill.balance_amount = bill
        .total_amount
        .checked_sub(paid)
        .ok_or(BillingError::AmountOutOfRange)?;
    bill.status = if bill.balance_amount.is_zero() {
        BillStatus::Paid
    } else {
        BillStatus::PartiallyPaid
    };
    if method.is_some() {
        bill.payment_method = method;
    }
    Ok(())
}

/// `INV-YYYYMM-NNNN`, sequence zero-padded to at least four digits.
pub fn invoice_number(date: NaiveDate, sequence: i64) -> String {
    format!("INV-{}{:02}-{:04}", date.year(), date.month(), sequence)
}

/// Next free invoice number: running bill count plus one, skipping numbers
/// still held after deletions.
pub fn next_invoice_number(conn: &Connection, date: NaiveDate) -> Result<String, DatabaseError> {
    let mut sequence = db::count_bills(conn)? + 1;
    loop {
        let candidate = invoice_number(date, sequence);
        if !db::invoice_number_exists(conn, &candidate)? {
            return Ok(candidate);
        }
        sequence += 1;
    }
}

// ─── Operations ───────────────────────────────────────────────────────────────

pub fn create_bill(
    conn: &mut Connection,
    request: NewBill,
    today: NaiveDate,
) -> Result<Bill, BillingError> {
    let total = compute_total(&request.services)?;
    if total.is_zero() {
        return Err(BillingError::ZeroTotal);
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !db::patient_exists(&tx, &request.patient_id)? {
        return Err(BillingError::PatientNotFound);
    }

    let now = Utc::now();
    let bill = Bill {
        id: Uuid::new_v4(),
        patient_id: request.patient_id,
        invoice_number: next_invoice_number(&tx, today)?,
        services: request.services,
        total_amount: total,
        paid_amount: Money::ZERO,
        balance_amount: total,
        status: BillStatus::Pending,
        bill_date: request.bill_date.unwrap_or(today),
        due_date: request.due_date,
        payment_method: request.payment_method,
        notes: request.notes,
        created_at: now,
        updated_at: now,
    };
    db::insert_bill(&tx, &bill)?;
    tx.commit()?;

    tracing::info!(bill_id = %bill.id, invoice = %bill.invoice_number, total = %bill.total_amount, "Bill created");
    Ok(bill)
}

/// Replace services and/or metadata. A new total is re-balanced against the
/// amount already paid.
pub fn update_bill(
    conn: &mut Connection,
    id: &Uuid,
    changes: BillUpdate,
) -> Result<Bill, BillingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut bill = db::get_bill(&tx, id)?.ok_or(BillingError::BillNotFound)?;

    if let Some(services) = changes.services {
        let total = compute_total(&services)?;
        if total.is_zero() {
            return Err(BillingError::ZeroTotal);
        }
        if total < bill.paid_amount {
            return Err(BillingError::TotalBelowPaid);
        }
        bill.services = services;
        bill.total_amount = total;
        bill.balance_amount = total
            .checked_sub(bill.paid_amount)
            .ok_or(BillingError::AmountOutOfRange)?;
    }

    let derived = derive_status(bill.total_amount, bill.paid_amount);
    bill.status = match changes.status {
        Some(BillStatus::Overdue) if bill.balance_amount.is_positive() => BillStatus::Overdue,
        Some(requested) if requested == derived => derived,
        Some(_) => return Err(BillingError::InvalidStatus),
        None if bill.status == BillStatus::Overdue && bill.balance_amount.is_positive() => {
            BillStatus::Overdue
        }
        None => derived,
    };

    if let Some(due_date) = changes.due_date {
        bill.due_date = due_date;
    }
    if changes.payment_method.is_some() {
        bill.payment_method = changes.payment_method;
    }
    if let Some(notes) = changes.notes {
        bill.notes = notes;
    }

    db::update_bill(&tx, &bill)?;
    tx.commit()?;
    Ok(bill)
}

pub fn record_payment(
    conn: &mut Connection,
    id: &Uuid,
    payment: Payment,
) -> Result<Bill, BillingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut bill = db::get_bill(&tx, id)?.ok_or(BillingError::BillNotFound)?;

    if let Err(e) = apply_payment(&mut bill, payment.amount, payment.payment_method) {
        tracing::warn!(bill_id = %id, amount = %payment.amount, balance = %bill.balance_amount, "Payment rejected");
        return Err(e);
    }
    db::update_bill(&tx, &bill)?;
    tx.commit()?;

    tracing::info!(bill_id = %id, amount = %payment.amount, status = %bill.status, "Payment recorded");
    Ok(bill)
}

/// Delete an unpaid bill. Any recorded payment blocks deletion.
pub fn delete_bill(conn: &Connection, id: &Uuid) -> Result<(), BillingError> {
    let bill = db::get_bill(conn, id)?.ok_or(BillingError::BillNotFound)?;
    if bill.paid_amount.is_positive() {
        return Err(BillingError::PaidBillDeletion);
    }
    db::delete_bill(conn, id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::fixtures::*;

    fn line(name: &str, quantity: i64, price_cents: i64) -> ServiceLine {
        ServiceLine {
            name: name.into(),
            quantity,
            price: Money::from_cents(price_cents),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 17).unwrap()
    }

    fn new_bill(patient: &Patient, services: Vec<ServiceLine>) -> NewBill {
        NewBill {
            patient_id: patient.id,
            services,
            bill_date: None,
            due_date: None,
            payment_method: None,
            notes: None,
        }
    }

    fn pay(cents: i64) -> Payment {
        Payment {
            amount: Money::from_cents(cents),
            payment_method: Some(PaymentMethod::Card),
        }
    }

    fn assert_balanced(bill: &Bill) {
        assert_eq!(
            bill.balance_amount.cents(),
            bill.total_amount.cents() - bill.paid_amount.cents()
        );
        assert_eq!(bill.status == BillStatus::Paid, bill.balance_amount.is_zero());
    }

    #[test]
    fn total_is_sum_of_quantity_times_price() {
        let services = [line("Consultation", 1, 15000), line("Blood test", 3, 2550)];
        assert_eq!(compute_total(&services).unwrap(), Money::from_cents(22650));
    }

    #[test]
    fn total_rejects_bad_lines() {
        assert!(matches!(compute_total(&[]), Err(BillingError::NoServices)));
        assert!(matches!(
            compute_total(&[line("X", 0, 100)]),
            Err(BillingError::InvalidService(_))
        ));
        assert!(matches!(
            compute_total(&[line("X", 1, -100)]),
            Err(BillingError::InvalidService(_))
        ));
        assert!(matches!(
            compute_total(&[line("X", i64::MAX, 100)]),
            Err(BillingError::AmountOutOfRange)
        ));
    }

    #[test]
    fn status_derivation() {
        let m = Money::from_cents;
        assert_eq!(derive_status(m(1000), m(0)), BillStatus::Pending);
        assert_eq!(derive_status(m(1000), m(1)), BillStatus::PartiallyPaid);
        assert_eq!(derive_status(m(1000), m(1000)), BillStatus::Paid);
    }

    #[test]
    fn invoice_number_format() {
        assert_eq!(invoice_number(today(), 1), "INV-202605-0001");
        assert_eq!(invoice_number(today(), 12345), "INV-202605-12345");
    }

    #[test]
    fn create_sets_balance_and_sequential_invoices() {
        let mut conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);

        let first = create_bill(&mut conn, new_bill(&patient, vec![line("A", 2, 5000)]), today()).unwrap();
        let second = create_bill(&mut conn, new_bill(&patient, vec![line("B", 1, 700)]), today()).unwrap();

        assert_eq!(first.total_amount, Money::from_cents(10000));
        assert_eq!(first.balance_amount, first.total_amount);
        assert_eq!(first.status, BillStatus::Pending);
        assert_eq!(first.bill_date, today());
        assert_eq!(first.invoice_number, "INV-202605-0001");
        assert_eq!(second.invoice_number, "INV-202605-0002");
    }

    #[test]
    fn invoice_numbers_stay_unique_after_deletion() {
        let mut conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);
        let first = create_bill(&mut conn, new_bill(&patient, vec![line("A", 1, 100)]), today()).unwrap();
        let second = create_bill(&mut conn, new_bill(&patient, vec![line("B", 1, 100)]), today()).unwrap();
        delete_bill(&conn, &first.id).unwrap();

        let third = create_bill(&mut conn, new_bill(&patient, vec![line("C", 1, 100)]), today()).unwrap();
        assert_ne!(third.invoice_number, second.invoice_number);
        assert_eq!(third.invoice_number, "INV-202605-0003");
    }

    #[test]
    fn create_rejects_zero_total_and_unknown_patient() {
        let mut conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);
        let err = create_bill(&mut conn, new_bill(&patient, vec![line("Free", 1, 0)]), today())
            .unwrap_err();
        assert!(matches!(err, BillingError::ZeroTotal));

        let mut req = new_bill(&patient, vec![line("A", 1, 100)]);
        req.patient_id = Uuid::new_v4();
        assert!(matches!(
            create_bill(&mut conn, req, today()).unwrap_err(),
            BillingError::PatientNotFound
        ));
    }

    #[test]
    fn partial_then_full_payment() {
        let mut conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);
        let bill = create_bill(&mut conn, new_bill(&patient, vec![line("A", 1, 10000)]), today()).unwrap();

        let after_first = record_payment(&mut conn, &bill.id, pay(2550)).unwrap();
        assert_eq!(after_first.status, BillStatus::PartiallyPaid);
        assert_eq!(after_first.balance_amount, Money::from_cents(7450));
        assert_eq!(after_first.payment_method, Some(PaymentMethod::Card));
        assert_balanced(&after_first);

        let settled = record_payment(&mut conn, &bill.id, pay(7450)).unwrap();
        assert_eq!(settled.status, BillStatus::Paid);
        assert!(settled.balance_amount.is_zero());
        assert_balanced(&settled);
    }

    #[test]
    fn invalid_payments_leave_bill_unchanged() {
        let mut conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);
        let bill = create_bill(&mut conn, new_bill(&patient, vec![line("A", 1, 10000)]), today()).unwrap();

        for cents in [0, -500, 10001] {
            let err = record_payment(&mut conn, &bill.id, pay(cents)).unwrap_err();
            assert!(matches!(err, BillingError::InvalidPayment));
            assert_eq!(err.to_string(), "Invalid payment amount");
        }
        let stored = db::get_bill(&conn, &bill.id).unwrap().unwrap();
        assert_eq!(stored.paid_amount, Money::ZERO);
        assert_eq!(stored.balance_amount, Money::from_cents(10000));
        assert_eq!(stored.status, BillStatus::Pending);
    }

    #[test]
    fn overdue_bill_becomes_partially_paid_on_payment() {
        let mut conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);
        let bill = create_bill(&mut conn, new_bill(&patient, vec![line("A", 1, 10000)]), today()).unwrap();
        let overdue = BillUpdate {
            status: Some(BillStatus::Overdue),
            ..Default::default()
        };
        assert_eq!(update_bill(&mut conn, &bill.id, overdue).unwrap().status, BillStatus::Overdue);

        let paid = record_payment(&mut conn, &bill.id, pay(100)).unwrap();
        assert_eq!(paid.status, BillStatus::PartiallyPaid);
    }

    #[test]
    fn update_rebalances_against_paid_amount() {
        let mut conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);
        let bill = create_bill(&mut conn, new_bill(&patient, vec![line("A", 1, 10000)]), today()).unwrap();
        record_payment(&mut conn, &bill.id, pay(4000)).unwrap();

        let grow = BillUpdate {
            services: Some(vec![line("A", 1, 10000), line("B", 1, 2000)]),
            ..Default::default()
        };
        let grown = update_bill(&mut conn, &bill.id, grow).unwrap();
        assert_eq!(grown.total_amount, Money::from_cents(12000));
        assert_eq!(grown.balance_amount, Money::from_cents(8000));
        assert_eq!(grown.status, BillStatus::PartiallyPaid);
        assert_balanced(&grown);

        let shrink = BillUpdate {
            services: Some(vec![line("A", 1, 3000)]),
            ..Default::default()
        };
        assert!(matches!(
            update_bill(&mut conn, &bill.id, shrink).unwrap_err(),
            BillingError::TotalBelowPaid
        ));

        let exact = BillUpdate {
            services: Some(vec![line("A", 1, 4000)]),
            ..Default::default()
        };
        let settled = update_bill(&mut conn, &bill.id, exact).unwrap();
        assert_eq!(settled.status, BillStatus::Paid);
        assert_balanced(&settled);
    }

    #[test]
    fn update_can_clear_due_date_and_notes() {
        let mut conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);
        let mut req = new_bill(&patient, vec![line("A", 1, 10000)]);
        req.due_date = Some(today());
        req.notes = Some("net 30".into());
        let bill = create_bill(&mut conn, req, today()).unwrap();

        let untouched = update_bill(&mut conn, &bill.id, BillUpdate::default()).unwrap();
        assert_eq!(untouched.due_date, Some(today()));
        assert_eq!(untouched.notes.as_deref(), Some("net 30"));

        let clear = BillUpdate {
            due_date: Some(None),
            notes: Some(None),
            ..Default::default()
        };
        let cleared = update_bill(&mut conn, &bill.id, clear).unwrap();
        assert_eq!(cleared.due_date, None);
        assert_eq!(cleared.notes, None);
        let stored = db::get_bill(&conn, &bill.id).unwrap().unwrap();
        assert_eq!(stored.due_date, None);
        assert_eq!(stored.notes, None);
    }

    #[test]
    fn status_cannot_contradict_amounts() {
        let mut conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);
        let bill = create_bill(&mut conn, new_bill(&patient, vec![line("A", 1, 10000)]), today()).unwrap();

        let mark_paid = BillUpdate {
            status: Some(BillStatus::Paid),
            ..Default::default()
        };
        assert!(matches!(
            update_bill(&mut conn, &bill.id, mark_paid).unwrap_err(),
            BillingError::InvalidStatus
        ));

        record_payment(&mut conn, &bill.id, pay(10000)).unwrap();
        let mark_overdue = BillUpdate {
            status: Some(BillStatus::Overdue),
            ..Default::default()
        };
        assert!(matches!(
            update_bill(&mut conn, &bill.id, mark_overdue).unwrap_err(),
            BillingError::InvalidStatus
        ));
    }

    #[test]
    fn delete_refused_once_any_payment_exists() {
        let mut conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Pat", Gender::Female);
        let bill = create_bill(&mut conn, new_bill(&patient, vec![line("A", 1, 10000)]), today()).unwrap();
        record_payment(&mut conn, &bill.id, pay(1)).unwrap();

        let err = delete_bill(&conn, &bill.id).unwrap_err();
        assert!(matches!(err, BillingError::PaidBillDeletion));
        assert!(db::get_bill(&conn, &bill.id).unwrap().is_some());

        let unpaid = create_bill(&mut conn, new_bill(&patient, vec![line("B", 1, 500)]), today()).unwrap();
        delete_bill(&conn, &unpaid.id).unwrap();
        assert!(matches!(
            delete_bill(&conn, &unpaid.id).unwrap_err(),
            BillingError::BillNotFound
        ));
    }
}
