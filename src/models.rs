//! Domain model: the whole application state is one `AppData` document.
//!
//! Collections are keyed maps rather than arrays so the store can address
//! any nested record by path (`hostels.<id>.floors.<id>.rooms.<id>`).

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a fresh record id such as `t-3f2a...`.
pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// Last-modified actor and time, carried by every editable record. Writers
/// always overwrite it, so input bodies may leave it out.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Stamp {
    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,
}

impl Stamp {
    pub fn now(actor: &str) -> Self {
        Self {
            last_modified_by: actor.to_string(),
            last_modified_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Hostel {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub floors: BTreeMap<String, Floor>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Floor {
    pub id: String,
    pub floor_number: i32,
    pub hostel_id: String,
    #[serde(default)]
    pub rooms: BTreeMap<String, Room>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    /// Human-entered label; not unique across hostels.
    pub room_number: String,
    pub capacity: u32,
    /// Occupying tenant ids. Should not exceed `capacity`, but nothing enforces it.
    #[serde(default)]
    pub tenant_ids: Vec<String>,
    pub hostel_id: String,
    pub floor_id: String,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStatus {
    Active,
    Inactive,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    pub check_in_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out_date: Option<NaiveDate>,
    pub rent_amount: f64,
    #[serde(default)]
    pub security_deposit: f64,
    pub status: TenantStatus,
    pub hostel_id: String,
    pub floor_id: String,
    pub room_id: String,
    #[serde(default)]
    pub native_address: String,
    #[serde(default)]
    pub aadhar_id: String,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

/// Tenant fields supplied by the caller when registering a new tenant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTenant {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    pub check_in_date: NaiveDate,
    pub rent_amount: f64,
    #[serde(default)]
    pub security_deposit: f64,
    pub hostel_id: String,
    pub floor_id: String,
    pub room_id: String,
    #[serde(default)]
    pub native_address: String,
    #[serde(default)]
    pub aadhar_id: String,
}

impl NewTenant {
    pub(crate) fn into_tenant(self, id: String, actor: &str) -> Tenant {
        Tenant {
            id,
            name: self.name,
            phone: self.phone,
            email: self.email,
            check_in_date: self.check_in_date,
            check_out_date: None,
            rent_amount: self.rent_amount,
            security_deposit: self.security_deposit,
            status: TenantStatus::Active,
            hostel_id: self.hostel_id,
            floor_id: self.floor_id,
            room_id: self.room_id,
            native_address: self.native_address,
            aadhar_id: self.aadhar_id,
            stamp: Stamp::now(actor),
        }
    }
}

/// Create-or-edit form state: a draft has no id yet, an existing tenant does.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mode", content = "tenant", rename_all = "camelCase")]
pub enum TenantForm {
    Draft(NewTenant),
    Existing(Tenant),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    #[serde(rename = "Partially Paid")]
    PartiallyPaid,
}

impl PaymentStatus {
    /// `Paid` iff the amount covers the tenant's rent.
    pub fn for_amount(amount: f64, rent_amount: f64) -> Self {
        if amount >= rent_amount {
            PaymentStatus::Paid
        } else {
            PaymentStatus::PartiallyPaid
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub tenant_id: String,
    pub amount: f64,
    /// 1-12
    pub month: u32,
    pub year: i32,
    pub date: NaiveDate,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
    pub tenant_id: String,
    pub amount: f64,
    pub month: u32,
    pub year: i32,
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditLogEntry {
    pub id: String,
    /// Actor email.
    pub user: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn now(actor: &str, action: impl Into<String>) -> Self {
        Self {
            id: new_id("log"),
            user: actor.to_string(),
            action: action.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReportHistoryItem {
    pub id: String,
    pub user: String,
    pub query: String,
    pub report: String,
    pub timestamp: DateTime<Utc>,
}

/// The single state document.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    #[serde(default)]
    pub hostels: BTreeMap<String, Hostel>,
    #[serde(default)]
    pub tenants: BTreeMap<String, Tenant>,
    #[serde(default)]
    pub payments: BTreeMap<String, Payment>,
    #[serde(default)]
    pub audit_logs: Vec<AuditLogEntry>,
    /// Absent in documents written before report history existed.
    #[serde(default)]
    pub report_history: BTreeMap<String, ReportHistoryItem>,
}

impl AppData {
    /// Every room in the portfolio, with its hostel and floor.
    pub fn rooms(&self) -> impl Iterator<Item = (&Hostel, &Floor, &Room)> {
        self.hostels.values().flat_map(|hostel| {
            hostel
                .floors
                .values()
                .flat_map(move |floor| floor.rooms.values().map(move |room| (hostel, floor, room)))
        })
    }

    /// Room at an exact placement, if every link resolves.
    pub fn room_at(&self, hostel_id: &str, floor_id: &str, room_id: &str) -> Option<&Room> {
        self.hostels
            .get(hostel_id)?
            .floors
            .get(floor_id)?
            .rooms
            .get(room_id)
    }
}

/// Stored login. Kept outside `AppData` in its own tree.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub email: String,
    pub password_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthPayload {
    pub sub: String, // email
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_uses_camel_case_keys_and_display_statuses() {
        let payment = Payment {
            id: "p-1".to_string(),
            tenant_id: "t-1".to_string(),
            amount: 3000.0,
            month: 4,
            year: 2026,
            date: NaiveDate::from_ymd_opt(2026, 4, 3).unwrap(),
            status: PaymentStatus::PartiallyPaid,
            notes: None,
            stamp: Stamp::now("owner@example.com"),
        };
        let value = serde_json::to_value(&payment).unwrap();
        assert_eq!(value["tenantId"], "t-1");
        assert_eq!(value["status"], "Partially Paid");
        assert_eq!(value["date"], "2026-04-03");
        assert_eq!(value["lastModifiedBy"], "owner@example.com");
        assert!(value.get("notes").is_none());
    }

    #[test]
    fn test_missing_report_history_defaults_to_empty() {
        let data: AppData = serde_json::from_value(json!({
            "hostels": {},
            "tenants": {},
            "payments": {},
            "auditLogs": []
        }))
        .unwrap();
        assert!(data.report_history.is_empty());
    }

    #[test]
    fn test_payment_status_threshold() {
        assert_eq!(PaymentStatus::for_amount(3000.0, 5000.0), PaymentStatus::PartiallyPaid);
        assert_eq!(PaymentStatus::for_amount(5000.0, 5000.0), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::for_amount(6000.0, 5000.0), PaymentStatus::Paid);
    }

    #[test]
    fn test_tenant_form_is_tagged() {
        let form: TenantForm = serde_json::from_value(json!({
            "mode": "draft",
            "tenant": {
                "name": "Asha",
                "checkInDate": "2026-01-01",
                "rentAmount": 4500,
                "hostelId": "h-1",
                "floorId": "f-1",
                "roomId": "r-1"
            }
        }))
        .unwrap();
        assert!(matches!(form, TenantForm::Draft(ref t) if t.name == "Asha"));
    }
}
