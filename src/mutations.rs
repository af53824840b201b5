//! Write side: turns user intents into stamped records plus an audit entry.
//!
//! Every operation validates against the latest snapshot before writing and
//! commits its record changes and its audit entry in a single `apply`.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{
    new_id, AppData, AuditLogEntry, Floor, Hostel, NewPayment, NewTenant, Payment, PaymentStatus,
    ReportHistoryItem, Room, Stamp, Tenant, TenantForm, TenantStatus,
};
use crate::storage::{DocumentUpdate, FieldPath, Repository};

#[derive(Clone)]
pub struct Mutations<R> {
    store: R,
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

impl<R: Repository> Mutations<R> {
    pub fn new(store: R) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    fn current(&self) -> Result<Arc<AppData>> {
        self.store
            .snapshot()?
            .ok_or_else(|| Error::not_found("state document is not initialized"))
    }

    fn commit(&self, update: DocumentUpdate, actor: &str, action: String) -> Result<()> {
        let entry = AuditLogEntry::now(actor, action);
        let update = update.array_union(FieldPath::audit_logs(), &entry)?;
        self.store.apply(&update)?;
        info!(actor, action = %entry.action, "audit");
        Ok(())
    }

    /// Create the empty document on first use. Returns whether it was created.
    pub fn initialize(&self, actor: &str) -> Result<bool> {
        if self.store.snapshot()?.is_some() {
            return Ok(false);
        }
        let data = AppData {
            audit_logs: vec![AuditLogEntry::now(actor, "Initialized the database.")],
            ..AppData::default()
        };
        self.store.replace(&data)?;
        info!(actor, "state document initialized");
        Ok(true)
    }

    pub fn add_hostel(&self, name: &str, address: &str, actor: &str) -> Result<Hostel> {
        require(name, "hostel name")?;
        require(address, "hostel address")?;
        self.current()?;

        let hostel = Hostel {
            id: new_id("h"),
            name: name.trim().to_string(),
            address: address.trim().to_string(),
            floors: Default::default(),
            stamp: Stamp::now(actor),
        };
        let update = DocumentUpdate::new().set(FieldPath::hostel(&hostel.id), &hostel)?;
        self.commit(update, actor, format!("Added new hostel: {}", hostel.name))?;
        Ok(hostel)
    }

    /// Floor numbers are caller-chosen and not checked for uniqueness.
    pub fn add_floor(&self, hostel_id: &str, floor_number: i32, actor: &str) -> Result<Floor> {
        let data = self.current()?;
        if !data.hostels.contains_key(hostel_id) {
            return Err(Error::not_found(format!("hostel {hostel_id}")));
        }

        let floor = Floor {
            id: new_id("f"),
            floor_number,
            hostel_id: hostel_id.to_string(),
            rooms: Default::default(),
            stamp: Stamp::now(actor),
        };
        let update = DocumentUpdate::new().set(FieldPath::floor(hostel_id, &floor.id), &floor)?;
        self.commit(
            update,
            actor,
            format!("Added Floor {floor_number} to hostel ID {hostel_id}"),
        )?;
        Ok(floor)
    }

    pub fn add_room(
        &self,
        hostel_id: &str,
        floor_id: &str,
        room_number: &str,
        capacity: u32,
        actor: &str,
    ) -> Result<Room> {
        require(room_number, "room number")?;
        if capacity == 0 {
            return Err(Error::validation("room capacity must be at least 1"));
        }
        let data = self.current()?;
        let floor_exists = data
            .hostels
            .get(hostel_id)
            .is_some_and(|h| h.floors.contains_key(floor_id));
        if !floor_exists {
            return Err(Error::not_found(format!("floor {floor_id} in hostel {hostel_id}")));
        }

        let room = Room {
            id: new_id("r"),
            room_number: room_number.trim().to_string(),
            capacity,
            tenant_ids: Vec::new(),
            hostel_id: hostel_id.to_string(),
            floor_id: floor_id.to_string(),
            stamp: Stamp::now(actor),
        };
        let update =
            DocumentUpdate::new().set(FieldPath::room(hostel_id, floor_id, &room.id), &room)?;
        self.commit(
            update,
            actor,
            format!("Added Room {} to floor ID {floor_id}", room.room_number),
        )?;
        Ok(room)
    }

    /// Registers an active tenant and places them in the room.
    ///
    /// Room capacity is the caller's concern; a full room still accepts the tenant.
    pub fn add_tenant(&self, draft: NewTenant, actor: &str) -> Result<Tenant> {
        require(&draft.name, "tenant name")?;
        require(&draft.room_id, "room")?;
        let data = self.current()?;
        if data
            .room_at(&draft.hostel_id, &draft.floor_id, &draft.room_id)
            .is_none()
        {
            return Err(Error::not_found(format!("room {}", draft.room_id)));
        }

        let tenant = draft.into_tenant(new_id("t"), actor);
        let update = DocumentUpdate::new()
            .set(FieldPath::tenant(&tenant.id), &tenant)?
            .array_union(
                FieldPath::room_tenant_ids(&tenant.hostel_id, &tenant.floor_id, &tenant.room_id),
                &tenant.id,
            )?;
        self.commit(update, actor, format!("Added new tenant: {}", tenant.name))?;
        Ok(tenant)
    }

    /// Replace a tenant record, keeping room occupant lists in step.
    ///
    /// A tenant is on its room's list exactly while active, so a move, a
    /// status change, or both take the id off the old room and put it on
    /// the new one as needed.
    pub fn update_tenant(&self, tenant: Tenant, actor: &str) -> Result<Tenant> {
        require(&tenant.name, "tenant name")?;
        let data = self.current()?;
        let previous = data
            .tenants
            .get(&tenant.id)
            .ok_or_else(|| Error::not_found(format!("tenant {}", tenant.id)))?;

        let tenant = Tenant {
            stamp: Stamp::now(actor),
            ..tenant
        };
        let mut update = DocumentUpdate::new().set(FieldPath::tenant(&tenant.id), &tenant)?;

        let moved = previous.hostel_id != tenant.hostel_id
            || previous.floor_id != tenant.floor_id
            || previous.room_id != tenant.room_id;
        let leaves_old_room = previous.is_active() && (moved || !tenant.is_active());
        let enters_new_room = tenant.is_active() && (moved || !previous.is_active());

        if enters_new_room
            && data
                .room_at(&tenant.hostel_id, &tenant.floor_id, &tenant.room_id)
                .is_none()
        {
            return Err(Error::not_found(format!("room {}", tenant.room_id)));
        }
        if leaves_old_room {
            update = update.array_remove(
                FieldPath::room_tenant_ids(&previous.hostel_id, &previous.floor_id, &previous.room_id),
                &tenant.id,
            )?;
        }
        if enters_new_room {
            update = update.array_union(
                FieldPath::room_tenant_ids(&tenant.hostel_id, &tenant.floor_id, &tenant.room_id),
                &tenant.id,
            )?;
        }

        self.commit(
            update,
            actor,
            format!("Updated details for tenant: {}", tenant.name),
        )?;
        Ok(tenant)
    }

    /// Create or edit depending on the form variant.
    pub fn save_tenant(&self, form: TenantForm, actor: &str) -> Result<Tenant> {
        match form {
            TenantForm::Draft(draft) => self.add_tenant(draft, actor),
            TenantForm::Existing(tenant) => self.update_tenant(tenant, actor),
        }
    }

    /// Check a tenant out and free their slot in the room.
    pub fn deactivate_tenant(
        &self,
        tenant_id: &str,
        check_out_date: NaiveDate,
        actor: &str,
    ) -> Result<()> {
        let data = self.current()?;
        let tenant = data
            .tenants
            .get(tenant_id)
            .ok_or_else(|| Error::not_found(format!("tenant {tenant_id}")))?;
        if !tenant.is_active() {
            return Err(Error::validation(format!("tenant {} is already inactive", tenant.name)));
        }

        let path = FieldPath::tenant(tenant_id);
        let stamp = Stamp::now(actor);
        let update = DocumentUpdate::new()
            .set(path.clone().child("status"), &TenantStatus::Inactive)?
            .set(path.clone().child("checkOutDate"), &check_out_date)?
            .set(path.clone().child("lastModifiedAt"), &stamp.last_modified_at)?
            .set(path.child("lastModifiedBy"), &stamp.last_modified_by)?
            .array_remove(
                FieldPath::room_tenant_ids(&tenant.hostel_id, &tenant.floor_id, &tenant.room_id),
                &tenant_id,
            )?;
        self.commit(update, actor, format!("Deactivated tenant: {}", tenant.name))
    }

    /// Record a payment. Status is `Paid` iff the amount covers the tenant's
    /// current rent.
    ///
    /// Does not refuse a second payment for an already settled period; callers
    /// check `aggregate::has_full_payment` first.
    pub fn record_payment(&self, payment: NewPayment, actor: &str) -> Result<Payment> {
        if !(1..=12).contains(&payment.month) {
            return Err(Error::validation(format!("month {} is out of range", payment.month)));
        }
        if !payment.amount.is_finite() || payment.amount <= 0.0 {
            return Err(Error::validation("payment amount must be positive"));
        }
        let data = self.current()?;
        let tenant = data
            .tenants
            .get(&payment.tenant_id)
            .ok_or_else(|| Error::not_found(format!("tenant {}", payment.tenant_id)))?;

        let record = Payment {
            id: new_id("p"),
            status: PaymentStatus::for_amount(payment.amount, tenant.rent_amount),
            tenant_id: payment.tenant_id,
            amount: payment.amount,
            month: payment.month,
            year: payment.year,
            date: payment.date,
            notes: payment.notes.filter(|n| !n.trim().is_empty()),
            stamp: Stamp::now(actor),
        };
        let update = DocumentUpdate::new().set(FieldPath::payment(&record.id), &record)?;
        self.commit(
            update,
            actor,
            format!(
                "Recorded payment of {} for tenant ID {}",
                record.amount, record.tenant_id
            ),
        )?;
        Ok(record)
    }

    pub fn add_report_to_history(
        &self,
        query: &str,
        report: &str,
        actor: &str,
    ) -> Result<ReportHistoryItem> {
        require(report, "report text")?;
        self.current()?;

        let item = ReportHistoryItem {
            id: new_id("rep"),
            user: actor.to_string(),
            query: query.to_string(),
            report: report.to_string(),
            timestamp: Utc::now(),
        };
        let update = DocumentUpdate::new().set(FieldPath::report(&item.id), &item)?;
        self.commit(
            update,
            actor,
            format!("Generated AI report for query: \"{query}\""),
        )?;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate;
    use crate::storage::Storage;

    const OWNER: &str = "owner@example.com";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service() -> Mutations<Storage> {
        let mutations = Mutations::new(Storage::temporary().expect("temporary storage"));
        assert!(mutations.initialize(OWNER).unwrap());
        mutations
    }

    fn snapshot(m: &Mutations<Storage>) -> Arc<AppData> {
        m.store().snapshot().unwrap().expect("document")
    }

    fn building(m: &Mutations<Storage>, capacity: u32) -> (Hostel, Floor, Room) {
        let hostel = m.add_hostel("Sunrise", "12 MG Road", OWNER).unwrap();
        let floor = m.add_floor(&hostel.id, 1, OWNER).unwrap();
        let room = m.add_room(&hostel.id, &floor.id, "101", capacity, OWNER).unwrap();
        (hostel, floor, room)
    }

    fn draft(hostel: &Hostel, floor: &Floor, room: &Room, rent: f64) -> NewTenant {
        NewTenant {
            name: "Asha Rao".to_string(),
            phone: "98450 00000".to_string(),
            email: "asha@example.com".to_string(),
            check_in_date: date(2026, 1, 1),
            rent_amount: rent,
            security_deposit: 10000.0,
            hostel_id: hostel.id.clone(),
            floor_id: floor.id.clone(),
            room_id: room.id.clone(),
            native_address: "Mysuru".to_string(),
            aadhar_id: "0000 1111 2222".to_string(),
        }
    }

    #[test]
    fn test_initialize_only_once() {
        let m = service();
        assert!(!m.initialize(OWNER).unwrap());
        let data = snapshot(&m);
        assert_eq!(data.audit_logs.len(), 1);
        assert_eq!(data.audit_logs[0].action, "Initialized the database.");
    }

    #[test]
    fn test_hierarchy_is_built_and_audited() {
        let m = service();
        let (hostel, floor, room) = building(&m, 2);

        let data = snapshot(&m);
        let stored = data.room_at(&hostel.id, &floor.id, &room.id).expect("room stored");
        assert!(stored.tenant_ids.is_empty());
        assert_eq!(stored.stamp.last_modified_by, OWNER);

        let actions: Vec<&str> = data.audit_logs.iter().map(|e| e.action.as_str()).collect();
        assert!(actions.contains(&"Added new hostel: Sunrise"));
        assert!(actions.contains(&format!("Added Floor 1 to hostel ID {}", hostel.id).as_str()));
        assert!(actions.contains(&format!("Added Room 101 to floor ID {}", floor.id).as_str()));
    }

    #[test]
    fn test_validation_rejects_before_writing() {
        let m = service();
        assert!(matches!(m.add_hostel("  ", "addr", OWNER), Err(Error::Validation(_))));
        assert!(matches!(m.add_floor("h-missing", 1, OWNER), Err(Error::NotFound(_))));
        let (hostel, floor, _) = building(&m, 1);
        assert!(matches!(
            m.add_room(&hostel.id, &floor.id, "102", 0, OWNER),
            Err(Error::Validation(_))
        ));
        let audit_before = snapshot(&m).audit_logs.len();
        assert!(matches!(
            m.add_room(&hostel.id, "f-missing", "102", 1, OWNER),
            Err(Error::NotFound(_))
        ));
        assert_eq!(snapshot(&m).audit_logs.len(), audit_before);
    }

    #[test]
    fn test_add_then_deactivate_restores_room() {
        let m = service();
        let (hostel, floor, room) = building(&m, 2);

        let tenant = m.add_tenant(draft(&hostel, &floor, &room, 5000.0), OWNER).unwrap();
        let data = snapshot(&m);
        assert_eq!(
            data.room_at(&hostel.id, &floor.id, &room.id).unwrap().tenant_ids,
            vec![tenant.id.clone()]
        );
        assert_eq!(data.tenants[&tenant.id].status, TenantStatus::Active);

        m.deactivate_tenant(&tenant.id, date(2026, 6, 30), OWNER).unwrap();
        let data = snapshot(&m);
        assert!(data.room_at(&hostel.id, &floor.id, &room.id).unwrap().tenant_ids.is_empty());
        let stored = &data.tenants[&tenant.id];
        assert_eq!(stored.status, TenantStatus::Inactive);
        assert_eq!(stored.check_out_date, Some(date(2026, 6, 30)));

        let vacant = aggregate::list_vacant_rooms(&data);
        assert_eq!(vacant[0].last_occupant.map(|t| t.id.as_str()), Some(tenant.id.as_str()));

        assert!(matches!(
            m.deactivate_tenant(&tenant.id, date(2026, 7, 1), OWNER),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_add_tenant_requires_name_and_existing_room() {
        let m = service();
        let (hostel, floor, room) = building(&m, 1);
        let mut nameless = draft(&hostel, &floor, &room, 5000.0);
        nameless.name = String::new();
        assert!(matches!(m.add_tenant(nameless, OWNER), Err(Error::Validation(_))));

        let mut lost = draft(&hostel, &floor, &room, 5000.0);
        lost.room_id = "r-missing".to_string();
        assert!(matches!(m.add_tenant(lost, OWNER), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_full_room_still_accepts_tenant() {
        let m = service();
        let (hostel, floor, room) = building(&m, 1);
        m.add_tenant(draft(&hostel, &floor, &room, 5000.0), OWNER).unwrap();
        m.add_tenant(draft(&hostel, &floor, &room, 5000.0), OWNER).unwrap();
        let data = snapshot(&m);
        assert_eq!(data.room_at(&hostel.id, &floor.id, &room.id).unwrap().tenant_ids.len(), 2);
        assert_eq!(aggregate::compute_occupancy(&data).to_string(), "200.0%");
    }

    #[test]
    fn test_save_tenant_dispatches_on_form() {
        let m = service();
        let (hostel, floor, room) = building(&m, 2);
        let created = m
            .save_tenant(TenantForm::Draft(draft(&hostel, &floor, &room, 5000.0)), OWNER)
            .unwrap();

        let edited = Tenant {
            rent_amount: 5500.0,
            phone: "1234".to_string(),
            ..created.clone()
        };
        m.save_tenant(TenantForm::Existing(edited), OWNER).unwrap();

        let data = snapshot(&m);
        assert_eq!(data.tenants.len(), 1);
        assert_eq!(data.tenants[&created.id].rent_amount, 5500.0);
        assert!(data
            .audit_logs
            .iter()
            .any(|e| e.action == "Updated details for tenant: Asha Rao"));
    }

    #[test]
    fn test_update_moves_active_tenant_between_rooms() {
        let m = service();
        let (hostel, floor, room) = building(&m, 2);
        let other = m.add_room(&hostel.id, &floor.id, "102", 1, OWNER).unwrap();
        let tenant = m.add_tenant(draft(&hostel, &floor, &room, 5000.0), OWNER).unwrap();

        m.update_tenant(
            Tenant {
                room_id: other.id.clone(),
                ..tenant.clone()
            },
            OWNER,
        )
        .unwrap();

        let data = snapshot(&m);
        assert!(data.room_at(&hostel.id, &floor.id, &room.id).unwrap().tenant_ids.is_empty());
        assert_eq!(
            data.room_at(&hostel.id, &floor.id, &other.id).unwrap().tenant_ids,
            vec![tenant.id.clone()]
        );
        assert!(matches!(
            m.update_tenant(Tenant { id: "t-missing".to_string(), ..tenant }, OWNER),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_update_status_change_syncs_occupants() {
        let m = service();
        let (hostel, floor, room) = building(&m, 1);
        let other = m.add_room(&hostel.id, &floor.id, "102", 2, OWNER).unwrap();
        let tenant = m.add_tenant(draft(&hostel, &floor, &room, 5000.0), OWNER).unwrap();

        m.update_tenant(
            Tenant {
                status: TenantStatus::Inactive,
                check_out_date: Some(date(2026, 2, 1)),
                ..tenant.clone()
            },
            OWNER,
        )
        .unwrap();
        let data = snapshot(&m);
        assert!(data.room_at(&hostel.id, &floor.id, &room.id).unwrap().tenant_ids.is_empty());
        assert!(aggregate::list_vacant_rooms(&data)
            .iter()
            .any(|v| v.room.id == room.id));

        // Reactivated into a different room in the same edit.
        let reactivated = m
            .update_tenant(
                Tenant {
                    status: TenantStatus::Active,
                    check_out_date: None,
                    room_id: other.id.clone(),
                    ..tenant.clone()
                },
                OWNER,
            )
            .unwrap();
        let data = snapshot(&m);
        assert!(reactivated.is_active());
        assert!(data.room_at(&hostel.id, &floor.id, &room.id).unwrap().tenant_ids.is_empty());
        assert_eq!(
            data.room_at(&hostel.id, &floor.id, &other.id).unwrap().tenant_ids,
            vec![tenant.id.clone()]
        );

        // Moving and checking out together only clears the old room.
        m.update_tenant(
            Tenant {
                status: TenantStatus::Inactive,
                room_id: room.id.clone(),
                ..reactivated
            },
            OWNER,
        )
        .unwrap();
        let data = snapshot(&m);
        assert!(data.room_at(&hostel.id, &floor.id, &room.id).unwrap().tenant_ids.is_empty());
        assert!(data.room_at(&hostel.id, &floor.id, &other.id).unwrap().tenant_ids.is_empty());
    }

    #[test]
    fn test_reactivation_requires_existing_room() {
        let m = service();
        let (hostel, floor, room) = building(&m, 1);
        let tenant = m.add_tenant(draft(&hostel, &floor, &room, 5000.0), OWNER).unwrap();
        m.deactivate_tenant(&tenant.id, date(2026, 3, 1), OWNER).unwrap();
        let inactive = snapshot(&m).tenants[&tenant.id].clone();

        assert!(matches!(
            m.update_tenant(
                Tenant {
                    status: TenantStatus::Active,
                    room_id: "r-missing".to_string(),
                    ..inactive
                },
                OWNER
            ),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_payment_status_follows_rent() {
        let m = service();
        let (hostel, floor, room) = building(&m, 2);
        let tenant = m.add_tenant(draft(&hostel, &floor, &room, 5000.0), OWNER).unwrap();

        let pay = |amount: f64| NewPayment {
            tenant_id: tenant.id.clone(),
            amount,
            month: 10,
            year: 2026,
            date: date(2026, 10, 5),
            notes: Some("  ".to_string()),
        };
        assert_eq!(m.record_payment(pay(3000.0), OWNER).unwrap().status, PaymentStatus::PartiallyPaid);
        assert_eq!(m.record_payment(pay(5000.0), OWNER).unwrap().status, PaymentStatus::Paid);
        let over = m.record_payment(pay(6000.0), OWNER).unwrap();
        assert_eq!(over.status, PaymentStatus::Paid);
        assert_eq!(over.notes, None);

        let data = snapshot(&m);
        assert_eq!(data.payments.len(), 3);
        assert!(data
            .audit_logs
            .iter()
            .any(|e| e.action == format!("Recorded payment of 3000 for tenant ID {}", tenant.id)));
    }

    #[test]
    fn test_payment_validation() {
        let m = service();
        let bad_month = NewPayment {
            tenant_id: "t-1".to_string(),
            amount: 100.0,
            month: 13,
            year: 2026,
            date: date(2026, 1, 1),
            notes: None,
        };
        assert!(matches!(m.record_payment(bad_month.clone(), OWNER), Err(Error::Validation(_))));
        let unknown = NewPayment { month: 1, ..bad_month };
        assert!(matches!(m.record_payment(unknown, OWNER), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_report_history() {
        let m = service();
        assert!(matches!(
            m.add_report_to_history("anything?", "   ", OWNER),
            Err(Error::Validation(_))
        ));
        let item = m
            .add_report_to_history("Who owes rent?", "## Dues\n- Asha", OWNER)
            .unwrap();
        let data = snapshot(&m);
        assert_eq!(data.report_history[&item.id].query, "Who owes rent?");
        assert!(data
            .audit_logs
            .iter()
            .any(|e| e.action == "Generated AI report for query: \"Who owes rent?\""));
    }

    #[test]
    fn test_writes_require_initialized_document() {
        let m = Mutations::new(Storage::temporary().unwrap());
        assert!(matches!(m.add_hostel("A", "B", OWNER), Err(Error::NotFound(_))));
    }
}
