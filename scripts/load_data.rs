//! Seed script for the hostel dashboard
//!
//! Creates a demo login and a small portfolio: two hostels with floors and
//! rooms, a handful of tenants, and a few months of rent payments.
//! Run: cargo run --bin load_data
//! Uses the same HOSTEL_DATA_PATH as the server (stop the server first).

use chrono::{Datelike, Local, Months, NaiveDate};

use hostel_dashboard::aggregate::{self, TimeRange};
use hostel_dashboard::auth::hash_password;
use hostel_dashboard::config::Config;
use hostel_dashboard::models::{NewPayment, NewTenant, User};
use hostel_dashboard::mutations::Mutations;
use hostel_dashboard::storage::{Repository, Storage};

const ACTOR: &str = "admin@example.com";

struct Seed {
    name: &'static str,
    rent: f64,
    /// Months of rent paid, counting back from last month.
    months_paid: u32,
}

const TENANTS: &[Seed] = &[
    Seed { name: "Asha Rao", rent: 6500.0, months_paid: 3 },
    Seed { name: "Vikram Shetty", rent: 6500.0, months_paid: 2 },
    Seed { name: "Meera Iyer", rent: 8000.0, months_paid: 3 },
    Seed { name: "Rahul Nair", rent: 5500.0, months_paid: 1 },
    Seed { name: "Farah Khan", rent: 8000.0, months_paid: 0 },
];

fn tenant(seed: &Seed, placement: (&str, &str, &str), check_in: NaiveDate) -> NewTenant {
    let (hostel_id, floor_id, room_id) = placement;
    NewTenant {
        name: seed.name.to_string(),
        phone: "98450 00000".to_string(),
        email: format!("{}@example.com", seed.name.split(' ').next().unwrap_or("tenant").to_lowercase()),
        check_in_date: check_in,
        rent_amount: seed.rent,
        security_deposit: seed.rent * 2.0,
        hostel_id: hostel_id.to_string(),
        floor_id: floor_id.to_string(),
        room_id: room_id.to_string(),
        native_address: "Bengaluru".to_string(),
        aadhar_id: String::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let storage = Storage::open(&config.data_path)?;
    let mutations = Mutations::new(storage.clone());

    let user = User {
        email: ACTOR.to_string(),
        password_hash: hash_password("admin123")?,
    };
    let _ = storage.create_user(&user); // Ignore if exists
    println!("✅ Login ready: {ACTOR} / admin123");

    mutations.initialize(ACTOR)?;
    let existing = storage.snapshot()?.map_or(0, |data| data.hostels.len());
    if existing > 0 {
        println!("ℹ️  Store already has {existing} hostel(s); skipping sample portfolio");
        return Ok(());
    }

    let sunrise = mutations.add_hostel("Sunrise Residency", "12 MG Road, Bengaluru", ACTOR)?;
    let lakeview = mutations.add_hostel("Lakeview PG", "4 Lake Road, Mysuru", ACTOR)?;

    let mut rooms = Vec::new();
    for (hostel, floors) in [(&sunrise, 2), (&lakeview, 1)] {
        for floor_number in 1..=floors {
            let floor = mutations.add_floor(&hostel.id, floor_number, ACTOR)?;
            for (i, capacity) in [2u32, 3].into_iter().enumerate() {
                let number = format!("{}{:02}", floor_number, i + 1);
                let room = mutations.add_room(&hostel.id, &floor.id, &number, capacity, ACTOR)?;
                rooms.push(room);
            }
        }
    }
    println!("✅ Created 2 hostels with {} rooms", rooms.len());

    let today = Local::now().date_naive();
    let first_of_month = today.with_day(1).unwrap_or(today);
    let check_in = first_of_month - Months::new(4);

    let mut placed = Vec::new();
    for (seed, room) in TENANTS.iter().zip(rooms.iter().cycle()) {
        let added = mutations.add_tenant(
            tenant(seed, (room.hostel_id.as_str(), room.floor_id.as_str(), room.id.as_str()), check_in),
            ACTOR,
        )?;
        placed.push((seed, added));
    }
    println!("✅ Added {} tenants", placed.len());

    let mut payments = 0;
    for (seed, added) in &placed {
        for back in 1..=seed.months_paid {
            let period = first_of_month - Months::new(back);
            mutations.record_payment(
                NewPayment {
                    tenant_id: added.id.clone(),
                    amount: seed.rent,
                    month: period.month(),
                    year: period.year(),
                    date: period + chrono::Days::new(4),
                    notes: None,
                },
                ACTOR,
            )?;
            payments += 1;
        }
    }
    println!("✅ Recorded {payments} payments");

    // One checked-out tenant so vacancy shows a last occupant.
    if let Some((_, leaving)) = placed.last() {
        mutations.deactivate_tenant(&leaving.id, today, ACTOR)?;
        println!("✅ Checked out {}", leaving.name);
    }

    storage.flush()?;

    if let Some(data) = storage.snapshot()? {
        let stats = aggregate::dashboard(&data, TimeRange::Lifetime, today);
        println!(
            "✅ Dashboard: {} active tenants, occupancy {}, lifetime revenue {:.2}, {} vacant rooms",
            stats.active_tenants,
            stats.occupancy_label,
            stats.revenue,
            aggregate::list_vacant_rooms(&data).len()
        );
    }

    Ok(())
}
