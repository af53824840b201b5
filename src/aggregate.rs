//! Dashboard aggregations over a state snapshot.
//!
//! Everything here is pure and synchronous. Snapshots come from live sync and
//! may be briefly inconsistent (a tenant pointing at a room that is not there
//! yet), so unresolved references are skipped rather than reported.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{
    AppData, AuditLogEntry, Hostel, Payment, PaymentStatus, ReportHistoryItem, Room, Tenant,
};

pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Portfolio occupancy: active tenants against total room capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupancy {
    pub total_capacity: u64,
    pub active_tenants: u64,
    /// `None` when there is no capacity at all. May exceed 1.0.
    pub rate: Option<f64>,
}

impl Occupancy {
    pub fn percent(&self) -> Option<f64> {
        self.rate.map(|rate| rate * 100.0)
    }
}

impl fmt::Display for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent() {
            Some(percent) => write!(f, "{percent:.1}%"),
            None => f.write_str("N/A"),
        }
    }
}

pub fn compute_occupancy(data: &AppData) -> Occupancy {
    let total_capacity: u64 = data.rooms().map(|(_, _, room)| u64::from(room.capacity)).sum();
    let active_tenants = data.tenants.values().filter(|t| t.is_active()).count() as u64;
    let rate = (total_capacity > 0).then(|| active_tenants as f64 / total_capacity as f64);
    Occupancy {
        total_capacity,
        active_tenants,
        rate,
    }
}

/// Half-open date range `[start, end)`; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl RevenueRange {
    pub fn lifetime() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date < end)
    }
}

pub fn compute_revenue(data: &AppData, range: RevenueRange) -> f64 {
    data.payments
        .values()
        .filter(|p| range.contains(p.date))
        .fold(0.0, |total, p| total + p.amount)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dues {
    pub total: f64,
    /// Active tenants with no payment record for the period.
    pub tenant_ids: Vec<String>,
}

/// Rent owed for a period by active tenants.
///
/// Any payment record for the tenant and period clears the due, whatever its
/// amount or status.
pub fn compute_current_dues(data: &AppData, month: u32, year: i32) -> Dues {
    let paid: BTreeSet<&str> = data
        .payments
        .values()
        .filter(|p| p.month == month && p.year == year)
        .map(|p| p.tenant_id.as_str())
        .collect();

    data.tenants
        .values()
        .filter(|t| t.is_active() && !paid.contains(t.id.as_str()))
        .fold(Dues::default(), |mut dues, tenant| {
            dues.total += tenant.rent_amount;
            dues.tenant_ids.push(tenant.id.clone());
            dues
        })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VacantRoom<'a> {
    pub room: &'a Room,
    pub hostel_name: &'a str,
    pub floor_number: i32,
    pub last_occupant: Option<&'a Tenant>,
}

/// Rooms with at least one free slot, each with its most recent leaver.
pub fn list_vacant_rooms(data: &AppData) -> Vec<VacantRoom<'_>> {
    let mut vacant: Vec<VacantRoom<'_>> = data
        .rooms()
        .filter(|(_, _, room)| room.tenant_ids.len() < room.capacity as usize)
        .map(|(hostel, floor, room)| VacantRoom {
            room,
            hostel_name: &hostel.name,
            floor_number: floor.floor_number,
            last_occupant: last_occupant(data, &room.id),
        })
        .collect();

    vacant.sort_by(|a, b| {
        a.hostel_name
            .cmp(b.hostel_name)
            .then(a.floor_number.cmp(&b.floor_number))
            .then_with(|| a.room.room_number.cmp(&b.room.room_number))
    });
    vacant
}

fn last_occupant<'a>(data: &'a AppData, room_id: &str) -> Option<&'a Tenant> {
    data.tenants
        .values()
        .filter(|t| !t.is_active() && t.room_id == room_id)
        .filter_map(|t| t.check_out_date.map(|left| (left, t)))
        .max_by_key(|(left, _)| *left)
        .map(|(_, t)| t)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One bucket per year, earliest to latest payment year.
    Yearly,
    /// Twelve calendar-month buckets of a single year.
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueBucket {
    pub name: String,
    pub revenue: f64,
}

pub fn group_revenue_by_period(
    data: &AppData,
    granularity: Granularity,
    current_year: i32,
) -> Vec<RevenueBucket> {
    match granularity {
        Granularity::Yearly => {
            let mut by_year: BTreeMap<i32, f64> = BTreeMap::new();
            for payment in data.payments.values() {
                *by_year.entry(payment.year).or_default() += payment.amount;
            }
            let (Some(&first), Some(&last)) = (by_year.keys().next(), by_year.keys().next_back())
            else {
                return Vec::new();
            };
            (first..=last)
                .map(|year| RevenueBucket {
                    name: year.to_string(),
                    revenue: by_year.get(&year).copied().unwrap_or(0.0),
                })
                .collect()
        }
        Granularity::Monthly => {
            let mut by_month = [0.0f64; 12];
            for payment in data.payments.values().filter(|p| p.year == current_year) {
                // Skip months outside 1-12 rather than trusting the record.
                if let Some(slot) = (payment.month as usize)
                    .checked_sub(1)
                    .and_then(|i| by_month.get_mut(i))
                {
                    *slot += payment.amount;
                }
            }
            MONTH_NAMES
                .iter()
                .zip(by_month)
                .map(|(name, revenue)| RevenueBucket {
                    name: name.to_string(),
                    revenue,
                })
                .collect()
        }
    }
}

/// Dashboard revenue window, always anchored on "today".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    #[default]
    Month,
    Quarter,
    Year,
    Lifetime,
}

impl TimeRange {
    /// From the start of the current period onwards (no upper bound).
    pub fn range(self, today: NaiveDate) -> RevenueRange {
        let start = match self {
            TimeRange::Month => NaiveDate::from_ymd_opt(today.year(), today.month(), 1),
            TimeRange::Quarter => {
                NaiveDate::from_ymd_opt(today.year(), (today.month0() / 3) * 3 + 1, 1)
            }
            TimeRange::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1),
            TimeRange::Lifetime => None,
        };
        RevenueRange { start, end: None }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeRange::Month => "This Month's Revenue",
            TimeRange::Quarter => "This Quarter's Revenue",
            TimeRange::Year => "This Year's Revenue",
            TimeRange::Lifetime => "Lifetime Revenue",
        }
    }

    pub fn chart_granularity(self) -> Granularity {
        match self {
            TimeRange::Lifetime => Granularity::Yearly,
            _ => Granularity::Monthly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub active_tenants: u64,
    pub occupancy: Occupancy,
    /// `occupancy` as shown on the card, e.g. `"62.5%"` or `"N/A"`.
    pub occupancy_label: String,
    pub revenue_label: &'static str,
    pub revenue: f64,
    /// Always this month's dues, whatever the revenue window.
    pub dues: Dues,
    pub chart: Vec<RevenueBucket>,
}

/// Yearly buckets for the lifetime view, this year's months otherwise.
pub fn revenue_chart(data: &AppData, range: TimeRange, current_year: i32) -> Vec<RevenueBucket> {
    group_revenue_by_period(data, range.chart_granularity(), current_year)
}

pub fn dashboard(data: &AppData, range: TimeRange, today: NaiveDate) -> DashboardStats {
    let occupancy = compute_occupancy(data);
    DashboardStats {
        active_tenants: occupancy.active_tenants,
        occupancy,
        occupancy_label: occupancy.to_string(),
        revenue_label: range.label(),
        revenue: compute_revenue(data, range.range(today)),
        dues: compute_current_dues(data, today.month(), today.year()),
        chart: revenue_chart(data, range, today.year()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFilter {
    pub year: i32,
    pub month: u32,
    /// Restrict to tenants of one hostel.
    #[serde(default)]
    pub hostel_id: Option<String>,
}

/// A payment with its tenant, hostel and room resolved for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView<'a> {
    pub payment: &'a Payment,
    pub tenant_name: &'a str,
    pub hostel_name: &'a str,
    pub room_number: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReport<'a> {
    pub title: String,
    pub total: f64,
    pub payments: Vec<PaymentView<'a>>,
}

pub fn filter_payments<'a>(data: &'a AppData, filter: &PaymentFilter) -> PaymentReport<'a> {
    let matching: Vec<&'a Payment> = data
        .payments
        .values()
        .filter(|p| p.year == filter.year && p.month == filter.month)
        .filter(|p| match &filter.hostel_id {
            None => true,
            Some(hostel_id) => data
                .tenants
                .get(&p.tenant_id)
                .is_some_and(|t| &t.hostel_id == hostel_id),
        })
        .collect();
    // Payments whose tenant is gone still count towards the total; only
    // their rows are dropped.
    let total = matching.iter().fold(0.0, |total, p| total + p.amount);

    let mut payments: Vec<PaymentView<'a>> = matching
        .into_iter()
        .filter_map(|p| payment_view(data, p))
        .collect();
    payments.sort_by(|a, b| b.payment.date.cmp(&a.payment.date));

    let title = filter
        .hostel_id
        .as_ref()
        .and_then(|id| data.hostels.get(id))
        .map_or_else(|| "All Hostels".to_string(), |h| h.name.clone());

    PaymentReport {
        title,
        total,
        payments,
    }
}

fn payment_view<'a>(data: &'a AppData, payment: &'a Payment) -> Option<PaymentView<'a>> {
    let tenant = data.tenants.get(&payment.tenant_id)?;
    Some(PaymentView {
        payment,
        tenant_name: &tenant.name,
        hostel_name: data
            .hostels
            .get(&tenant.hostel_id)
            .map_or("N/A", |h| h.name.as_str()),
        room_number: find_room(data, &tenant.room_id).map_or("N/A", |r| r.room_number.as_str()),
    })
}

/// Distinct payment years, newest first.
pub fn years_with_payments(data: &AppData) -> Vec<i32> {
    let years: BTreeSet<i32> = data.payments.values().map(|p| p.year).collect();
    years.into_iter().rev().collect()
}

/// Whether the tenant already has a full (`Paid`) record for the period.
pub fn has_full_payment(data: &AppData, tenant_id: &str, month: u32, year: i32) -> bool {
    data.payments.values().any(|p| {
        p.tenant_id == tenant_id
            && p.month == month
            && p.year == year
            && p.status == PaymentStatus::Paid
    })
}

/// A tenant's payments, newest first.
pub fn tenant_payments<'a>(data: &'a AppData, tenant_id: &str) -> Vec<&'a Payment> {
    let mut payments: Vec<&Payment> = data
        .payments
        .values()
        .filter(|p| p.tenant_id == tenant_id)
        .collect();
    payments.sort_by(|a, b| b.date.cmp(&a.date));
    payments
}

/// A tenant with a display location such as `"Sunrise, Room 101"`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView<'a> {
    pub tenant: &'a Tenant,
    pub location: String,
}

/// Every tenant, active ones first, then by name.
pub fn list_tenants(data: &AppData) -> Vec<TenantView<'_>> {
    let mut tenants: Vec<&Tenant> = data.tenants.values().collect();
    tenants.sort_by(|a, b| {
        b.is_active()
            .cmp(&a.is_active())
            .then_with(|| a.name.cmp(&b.name))
    });
    tenants
        .into_iter()
        .map(|tenant| {
            let hostel = data
                .hostels
                .get(&tenant.hostel_id)
                .map_or("N/A", |h| h.name.as_str());
            let room = find_room(data, &tenant.room_id).map_or("N/A", |r| r.room_number.as_str());
            TenantView {
                tenant,
                location: format!("{hostel}, Room {room}"),
            }
        })
        .collect()
}

/// Tenants whose name or room number matches the query.
pub fn search_tenants<'a>(data: &'a AppData, query: &str) -> Vec<&'a Tenant> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    data.tenants
        .values()
        .filter(|t| {
            t.name.to_lowercase().contains(&query)
                || find_room(data, &t.room_id).is_some_and(|r| r.room_number.to_lowercase().contains(&query))
        })
        .collect()
}

pub fn find_room<'a>(data: &'a AppData, room_id: &str) -> Option<&'a Room> {
    data.rooms()
        .map(|(_, _, room)| room)
        .find(|room| room.id == room_id)
}

/// Rooms on a floor that still have a free slot.
pub fn rooms_with_space<'a>(data: &'a AppData, hostel_id: &str, floor_id: &str) -> Vec<&'a Room> {
    data.hostels
        .get(hostel_id)
        .and_then(|h| h.floors.get(floor_id))
        .map(|floor| {
            floor
                .rooms
                .values()
                .filter(|r| r.tenant_ids.len() < r.capacity as usize)
                .collect()
        })
        .unwrap_or_default()
}

/// Floor number suggested for the next floor of a hostel.
pub fn next_floor_number(hostel: &Hostel) -> i32 {
    hostel
        .floors
        .values()
        .map(|f| f.floor_number)
        .max()
        .map_or(1, |max| max + 1)
}

pub fn sorted_audit_log(data: &AppData) -> Vec<&AuditLogEntry> {
    let mut entries: Vec<&AuditLogEntry> = data.audit_logs.iter().collect();
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries
}

pub fn sorted_report_history(data: &AppData) -> Vec<&ReportHistoryItem> {
    let mut items: Vec<&ReportHistoryItem> = data.report_history.values().collect();
    items.sort_by(|a, b| match b.timestamp.cmp(&a.timestamp) {
        Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppData, Floor, Hostel, Room, Stamp, TenantStatus};
    use chrono::{Duration, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn stamp() -> Stamp {
        Stamp::now("owner@example.com")
    }

    fn room(id: &str, number: &str, capacity: u32, tenant_ids: &[&str]) -> Room {
        Room {
            id: id.to_string(),
            room_number: number.to_string(),
            capacity,
            tenant_ids: tenant_ids.iter().map(|s| s.to_string()).collect(),
            hostel_id: "h-1".to_string(),
            floor_id: "f-1".to_string(),
            stamp: stamp(),
        }
    }

    fn portfolio(rooms: Vec<Room>) -> AppData {
        let mut floor = Floor {
            id: "f-1".to_string(),
            floor_number: 1,
            hostel_id: "h-1".to_string(),
            rooms: BTreeMap::new(),
            stamp: stamp(),
        };
        for r in rooms {
            floor.rooms.insert(r.id.clone(), r);
        }
        let mut hostel = Hostel {
            id: "h-1".to_string(),
            name: "Sunrise".to_string(),
            address: "12 MG Road".to_string(),
            floors: BTreeMap::new(),
            stamp: stamp(),
        };
        hostel.floors.insert(floor.id.clone(), floor);
        let mut data = AppData::default();
        data.hostels.insert(hostel.id.clone(), hostel);
        data
    }

    fn tenant(id: &str, room_id: &str, rent: f64, status: TenantStatus) -> Tenant {
        Tenant {
            id: id.to_string(),
            name: format!("Tenant {id}"),
            phone: String::new(),
            email: String::new(),
            check_in_date: date(2025, 1, 1),
            check_out_date: None,
            rent_amount: rent,
            security_deposit: 0.0,
            status,
            hostel_id: "h-1".to_string(),
            floor_id: "f-1".to_string(),
            room_id: room_id.to_string(),
            native_address: String::new(),
            aadhar_id: String::new(),
            stamp: stamp(),
        }
    }

    fn payment(id: &str, tenant_id: &str, amount: f64, month: u32, year: i32, on: NaiveDate) -> Payment {
        Payment {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            amount,
            month,
            year,
            date: on,
            status: PaymentStatus::for_amount(amount, 5000.0),
            notes: None,
            stamp: stamp(),
        }
    }

    fn add_tenant(data: &mut AppData, t: Tenant) {
        data.tenants.insert(t.id.clone(), t);
    }

    fn add_payment(data: &mut AppData, p: Payment) {
        data.payments.insert(p.id.clone(), p);
    }

    #[test]
    fn test_occupancy_is_na_only_without_capacity() {
        let empty = AppData::default();
        let occupancy = compute_occupancy(&empty);
        assert_eq!(occupancy.rate, None);
        assert_eq!(occupancy.to_string(), "N/A");

        // One room of capacity 2 and nobody in it is 0%, not N/A.
        let data = portfolio(vec![room("r-1", "101", 2, &[])]);
        let occupancy = compute_occupancy(&data);
        assert_eq!(occupancy.total_capacity, 2);
        assert_eq!(occupancy.rate, Some(0.0));
        assert_eq!(occupancy.to_string(), "0.0%");
    }

    #[test]
    fn test_occupancy_counts_active_tenants_and_is_not_clamped() {
        let mut data = portfolio(vec![room("r-1", "101", 1, &["t-1", "t-2"])]);
        add_tenant(&mut data, tenant("t-1", "r-1", 5000.0, TenantStatus::Active));
        add_tenant(&mut data, tenant("t-2", "r-1", 5000.0, TenantStatus::Active));
        add_tenant(&mut data, tenant("t-3", "r-1", 5000.0, TenantStatus::Inactive));

        let occupancy = compute_occupancy(&data);
        assert_eq!(occupancy.active_tenants, 2);
        assert_eq!(occupancy.rate, Some(2.0));
        assert_eq!(occupancy.to_string(), "200.0%");
    }

    #[test]
    fn test_revenue_respects_half_open_range() {
        let mut data = AppData::default();
        add_payment(&mut data, payment("p-1", "t-1", 1000.0, 3, 2026, date(2026, 3, 31)));
        add_payment(&mut data, payment("p-2", "t-1", 2000.0, 4, 2026, date(2026, 4, 1)));
        add_payment(&mut data, payment("p-3", "t-1", 4000.0, 5, 2026, date(2026, 5, 1)));

        let april = RevenueRange {
            start: Some(date(2026, 4, 1)),
            end: Some(date(2026, 5, 1)),
        };
        assert_eq!(compute_revenue(&data, april), 2000.0);
        assert_eq!(compute_revenue(&data, RevenueRange::lifetime()), 7000.0);
    }

    #[test]
    fn test_any_payment_record_clears_dues() {
        let mut data = AppData::default();
        add_tenant(&mut data, tenant("t-1", "r-1", 5000.0, TenantStatus::Active));
        add_tenant(&mut data, tenant("t-2", "r-1", 4000.0, TenantStatus::Active));
        add_tenant(&mut data, tenant("t-3", "r-1", 3000.0, TenantStatus::Inactive));
        // A partial payment still clears t-1 for the period.
        add_payment(&mut data, payment("p-1", "t-1", 100.0, 10, 2026, date(2026, 10, 2)));
        // Wrong period for t-2.
        add_payment(&mut data, payment("p-2", "t-2", 4000.0, 9, 2026, date(2026, 9, 2)));

        let dues = compute_current_dues(&data, 10, 2026);
        assert_eq!(dues.total, 4000.0);
        assert_eq!(dues.tenant_ids, vec!["t-2".to_string()]);
    }

    #[test]
    fn test_vacant_rooms_and_last_occupant() {
        let mut data = portfolio(vec![
            room("r-1", "101", 2, &["t-1"]),
            room("r-2", "102", 1, &["t-2"]),
            room("r-3", "103", 1, &[]),
        ]);
        add_tenant(&mut data, tenant("t-1", "r-1", 5000.0, TenantStatus::Active));
        add_tenant(&mut data, tenant("t-2", "r-2", 5000.0, TenantStatus::Active));
        let mut early = tenant("t-3", "r-3", 4500.0, TenantStatus::Inactive);
        early.check_out_date = Some(date(2026, 1, 10));
        let mut late = tenant("t-4", "r-3", 4800.0, TenantStatus::Inactive);
        late.check_out_date = Some(date(2026, 6, 30));
        add_tenant(&mut data, early);
        add_tenant(&mut data, late);
        // Dangling reference to a room that does not exist is ignored.
        add_tenant(&mut data, tenant("t-5", "r-missing", 1.0, TenantStatus::Active));

        let vacant = list_vacant_rooms(&data);
        let numbers: Vec<&str> = vacant.iter().map(|v| v.room.room_number.as_str()).collect();
        assert_eq!(numbers, vec!["101", "103"]);
        assert!(vacant[0].last_occupant.is_none());
        assert_eq!(vacant[1].last_occupant.map(|t| t.id.as_str()), Some("t-4"));
        assert_eq!(vacant[1].hostel_name, "Sunrise");
        assert_eq!(vacant[1].floor_number, 1);
    }

    #[test]
    fn test_monthly_buckets_fill_missing_months() {
        let mut data = AppData::default();
        add_payment(&mut data, payment("p-1", "t-1", 5000.0, 1, 2026, date(2026, 1, 5)));
        add_payment(&mut data, payment("p-2", "t-2", 2500.0, 1, 2026, date(2026, 1, 9)));
        add_payment(&mut data, payment("p-3", "t-1", 5000.0, 12, 2025, date(2025, 12, 5)));

        let buckets = group_revenue_by_period(&data, Granularity::Monthly, 2026);
        assert_eq!(buckets.len(), 12);
        assert_eq!(buckets[0], RevenueBucket { name: "Jan".to_string(), revenue: 7500.0 });
        assert!(buckets[1..].iter().all(|b| b.revenue == 0.0));
    }

    #[test]
    fn test_yearly_buckets_cover_gaps() {
        let mut data = AppData::default();
        add_payment(&mut data, payment("p-1", "t-1", 100.0, 1, 2023, date(2023, 1, 5)));
        add_payment(&mut data, payment("p-2", "t-1", 200.0, 1, 2025, date(2025, 1, 5)));

        let buckets = group_revenue_by_period(&data, Granularity::Yearly, 2026);
        let names: Vec<&str> = buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["2023", "2024", "2025"]);
        assert_eq!(buckets[1].revenue, 0.0);
        assert!(group_revenue_by_period(&AppData::default(), Granularity::Yearly, 2026).is_empty());
    }

    #[test]
    fn test_time_range_starts() {
        let today = date(2026, 8, 19);
        assert_eq!(TimeRange::Month.range(today).start, Some(date(2026, 8, 1)));
        assert_eq!(TimeRange::Quarter.range(today).start, Some(date(2026, 7, 1)));
        assert_eq!(TimeRange::Year.range(today).start, Some(date(2026, 1, 1)));
        assert_eq!(TimeRange::Lifetime.range(today), RevenueRange::lifetime());
    }

    #[test]
    fn test_dashboard_combines_stats() {
        let mut data = portfolio(vec![room("r-1", "101", 4, &["t-1", "t-2"])]);
        add_tenant(&mut data, tenant("t-1", "r-1", 5000.0, TenantStatus::Active));
        add_tenant(&mut data, tenant("t-2", "r-1", 6000.0, TenantStatus::Active));
        add_payment(&mut data, payment("p-1", "t-1", 5000.0, 8, 2026, date(2026, 8, 3)));
        add_payment(&mut data, payment("p-2", "t-1", 5000.0, 7, 2026, date(2026, 7, 3)));

        let stats = dashboard(&data, TimeRange::Month, date(2026, 8, 19));
        assert_eq!(stats.active_tenants, 2);
        assert_eq!(stats.occupancy_label, "50.0%");
        assert_eq!(stats.revenue, 5000.0);
        assert_eq!(stats.dues.total, 6000.0);
        assert_eq!(stats.chart.len(), 12);

        let lifetime = dashboard(&data, TimeRange::Lifetime, date(2026, 8, 19));
        assert_eq!(lifetime.revenue, 10000.0);
        assert_eq!(lifetime.revenue_label, "Lifetime Revenue");
        assert_eq!(
            revenue_chart(&data, TimeRange::Lifetime, 2026),
            vec![RevenueBucket { name: "2026".to_string(), revenue: 10000.0 }]
        );
    }

    #[test]
    fn test_payment_filter_by_hostel_and_resolution() {
        let mut data = portfolio(vec![room("r-1", "101", 2, &["t-1"])]);
        add_tenant(&mut data, tenant("t-1", "r-1", 5000.0, TenantStatus::Active));
        let mut elsewhere = tenant("t-2", "r-9", 5000.0, TenantStatus::Active);
        elsewhere.hostel_id = "h-2".to_string();
        add_tenant(&mut data, elsewhere);
        add_payment(&mut data, payment("p-1", "t-1", 5000.0, 8, 2026, date(2026, 8, 3)));
        add_payment(&mut data, payment("p-2", "t-2", 3000.0, 8, 2026, date(2026, 8, 4)));
        add_payment(&mut data, payment("p-3", "t-gone", 900.0, 8, 2026, date(2026, 8, 5)));

        let all = filter_payments(&data, &PaymentFilter { year: 2026, month: 8, hostel_id: None });
        assert_eq!(all.title, "All Hostels");
        // The payment of an unknown tenant is not listed but still counts.
        assert_eq!(all.payments.len(), 2);
        assert_eq!(all.total, 8900.0);
        assert_eq!(
            all.total,
            compute_revenue(&data, RevenueRange { start: Some(date(2026, 8, 1)), end: Some(date(2026, 9, 1)) })
        );
        assert_eq!(all.payments[0].hostel_name, "N/A");
        assert_eq!(all.payments[0].room_number, "N/A");

        let sunrise = filter_payments(
            &data,
            &PaymentFilter { year: 2026, month: 8, hostel_id: Some("h-1".to_string()) },
        );
        assert_eq!(sunrise.title, "Sunrise");
        assert_eq!(sunrise.payments.len(), 1);
        assert_eq!(sunrise.payments[0].room_number, "101");
        assert_eq!(sunrise.payments[0].tenant_name, "Tenant t-1");
    }

    #[test]
    fn test_empty_totals_are_positive_zero() {
        let data = AppData::default();
        let revenue = compute_revenue(&data, RevenueRange::lifetime());
        assert!(revenue == 0.0 && revenue.is_sign_positive());
        let report = filter_payments(&data, &PaymentFilter { year: 2026, month: 8, hostel_id: None });
        assert!(report.total.is_sign_positive());
    }

    #[test]
    fn test_tenant_list_orders_active_first_and_resolves_location() {
        let mut data = portfolio(vec![room("r-1", "101", 3, &["t-b", "t-c"])]);
        let named = |id: &str, name: &str, status: TenantStatus| {
            let mut t = tenant(id, "r-1", 5000.0, status);
            t.name = name.to_string();
            t
        };
        let gone = named("t-a", "Aarav", TenantStatus::Inactive);
        let zoya = named("t-b", "Zoya", TenantStatus::Active);
        let bina = named("t-c", "Bina", TenantStatus::Active);
        let mut lost = named("t-d", "Chetan", TenantStatus::Active);
        lost.hostel_id = "h-missing".to_string();
        lost.room_id = "r-missing".to_string();
        for t in [gone, zoya, bina, lost] {
            add_tenant(&mut data, t);
        }

        let views = list_tenants(&data);
        let names: Vec<&str> = views.iter().map(|v| v.tenant.name.as_str()).collect();
        assert_eq!(names, vec!["Bina", "Chetan", "Zoya", "Aarav"]);
        assert_eq!(views[0].location, "Sunrise, Room 101");
        assert_eq!(views[1].location, "N/A, Room N/A");
    }

    #[test]
    fn test_full_payment_check_ignores_partials() {
        let mut data = AppData::default();
        add_payment(&mut data, payment("p-1", "t-1", 3000.0, 8, 2026, date(2026, 8, 3)));
        assert!(!has_full_payment(&data, "t-1", 8, 2026));
        add_payment(&mut data, payment("p-2", "t-1", 5000.0, 8, 2026, date(2026, 8, 9)));
        assert!(has_full_payment(&data, "t-1", 8, 2026));
        assert_eq!(tenant_payments(&data, "t-1")[0].id, "p-2");
    }

    #[test]
    fn test_search_and_room_helpers() {
        let mut data = portfolio(vec![room("r-1", "101", 2, &["t-1"]), room("r-2", "202", 1, &["t-2"])]);
        let mut suresh = tenant("t-1", "r-1", 5000.0, TenantStatus::Active);
        suresh.name = "Suresh Singh".to_string();
        add_tenant(&mut data, suresh);
        add_tenant(&mut data, tenant("t-2", "r-2", 5000.0, TenantStatus::Active));

        assert_eq!(search_tenants(&data, "suresh")[0].id, "t-1");
        assert_eq!(search_tenants(&data, "202")[0].id, "t-2");
        assert!(search_tenants(&data, "   ").is_empty());

        let space: Vec<&str> = rooms_with_space(&data, "h-1", "f-1").iter().map(|r| r.id.as_str()).collect();
        assert_eq!(space, vec!["r-1"]);
        assert!(rooms_with_space(&data, "h-x", "f-1").is_empty());

        let hostel = &data.hostels["h-1"];
        assert_eq!(next_floor_number(hostel), 2);
    }

    #[test]
    fn test_histories_sorted_newest_first() {
        let mut data = AppData::default();
        let base = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        for (i, offset) in [3i64, 1, 2].into_iter().enumerate() {
            data.audit_logs.push(AuditLogEntry {
                id: format!("log-{i}"),
                user: "owner@example.com".to_string(),
                action: format!("action {offset}"),
                timestamp: base + Duration::minutes(offset),
            });
        }
        let actions: Vec<&str> = sorted_audit_log(&data).iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["action 3", "action 2", "action 1"]);
        assert_eq!(years_with_payments(&data), Vec::<i32>::new());
    }
}
