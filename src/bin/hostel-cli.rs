use std::fs;
use std::io::Write;

use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

const TOKEN_FILE: &str = ".hostel_token";

#[derive(Parser)]
#[command(name = "hostel-cli")]
#[command(about = "CLI for the hostel dashboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:11111")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    /// Print the whole state document
    Data,
    /// Print a snapshot every time the data changes
    Watch,
    Dashboard {
        /// month, quarter, year or lifetime
        #[arg(short, long, default_value = "month")]
        range: String,
    },
    Vacancy,
    Audit,
    /// All tenants, active first, with their hostel and room
    Tenants,
    AddHostel {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        address: String,
    },
    AddFloor {
        #[arg(short = 'H', long)]
        hostel_id: String,
        /// Defaults to the next floor up
        #[arg(short, long)]
        number: Option<i32>,
    },
    AddRoom {
        #[arg(short = 'H', long)]
        hostel_id: String,
        #[arg(short, long)]
        floor_id: String,
        #[arg(short = 'n', long)]
        room_number: String,
        #[arg(short, long)]
        capacity: u32,
    },
    AddTenant {
        #[arg(short, long)]
        name: String,
        #[arg(short = 'H', long)]
        hostel_id: String,
        #[arg(short, long)]
        floor_id: String,
        #[arg(short, long)]
        room_id: String,
        #[arg(long)]
        rent: f64,
        #[arg(long, default_value_t = 0.0)]
        deposit: f64,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        email: String,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        check_in: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        native_address: String,
        #[arg(long, default_value = "")]
        aadhar_id: String,
    },
    /// Replace a tenant record with the JSON in a file
    UpdateTenant {
        #[arg(short, long)]
        id: String,
        #[arg(short, long)]
        file: String,
    },
    Deactivate {
        #[arg(short, long)]
        id: String,
        /// YYYY-MM-DD, defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    Pay {
        #[arg(short, long)]
        tenant_id: String,
        #[arg(short, long)]
        amount: f64,
        /// Defaults to the current month
        #[arg(short, long)]
        month: Option<u32>,
        #[arg(short, long)]
        year: Option<i32>,
        #[arg(long)]
        notes: Option<String>,
    },
    Payments {
        #[arg(short, long)]
        year: i32,
        #[arg(short, long)]
        month: u32,
        #[arg(short = 'H', long)]
        hostel: Option<String>,
    },
    PaymentYears,
    Search {
        query: String,
    },
    TenantPayments {
        #[arg(short, long)]
        id: String,
    },
    /// Ask a question about the data; the answer streams to stdout
    Report {
        query: String,
    },
    Reports,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

fn with_token(request: RequestBuilder) -> RequestBuilder {
    let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
    request.header("Authorization", format!("Bearer {}", token.trim()))
}

async fn print_response(request: RequestBuilder) -> Result<(), Box<dyn std::error::Error>> {
    let res = with_token(request).send().await?;
    println!("Response: {}", res.text().await?);
    Ok(())
}

/// Copy a streaming body to stdout as it arrives.
async fn stream_response(request: RequestBuilder) -> Result<(), Box<dyn std::error::Error>> {
    let res = with_token(request).send().await?;
    if !res.status().is_success() {
        println!("Request failed: {}", res.text().await?);
        return Ok(());
    }
    let mut body = res.bytes_stream();
    let mut stdout = std::io::stdout();
    while let Some(chunk) = body.next().await {
        stdout.write_all(&chunk?)?;
        stdout.flush()?;
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let url = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Register { email, password } => {
            let res = client
                .post(format!("{url}/register"))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Login { email, password } => {
            let res = client
                .post(format!("{url}/login"))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: LoginResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Logged in. Token saved to {TOKEN_FILE}");
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out (token removed).");
        }
        Commands::Data => print_response(client.get(format!("{url}/data"))).await?,
        Commands::Watch => stream_response(client.get(format!("{url}/events"))).await?,
        Commands::Dashboard { range } => {
            print_response(client.get(format!("{url}/dashboard")).query(&[("range", range)])).await?
        }
        Commands::Vacancy => print_response(client.get(format!("{url}/vacancy"))).await?,
        Commands::Audit => print_response(client.get(format!("{url}/audit"))).await?,
        Commands::Tenants => print_response(client.get(format!("{url}/tenants"))).await?,
        Commands::AddHostel { name, address } => {
            print_response(
                client
                    .post(format!("{url}/hostels"))
                    .json(&json!({ "name": name, "address": address })),
            )
            .await?
        }
        Commands::AddFloor { hostel_id, number } => {
            print_response(
                client
                    .post(format!("{url}/hostels/{hostel_id}/floors"))
                    .json(&json!({ "floorNumber": number })),
            )
            .await?
        }
        Commands::AddRoom { hostel_id, floor_id, room_number, capacity } => {
            print_response(
                client
                    .post(format!("{url}/hostels/{hostel_id}/floors/{floor_id}/rooms"))
                    .json(&json!({ "roomNumber": room_number, "capacity": capacity })),
            )
            .await?
        }
        Commands::AddTenant {
            name,
            hostel_id,
            floor_id,
            room_id,
            rent,
            deposit,
            phone,
            email,
            check_in,
            native_address,
            aadhar_id,
        } => {
            let check_in = check_in.unwrap_or_else(|| Local::now().date_naive());
            print_response(client.post(format!("{url}/tenants")).json(&json!({
                "name": name,
                "phone": phone,
                "email": email,
                "checkInDate": check_in,
                "rentAmount": rent,
                "securityDeposit": deposit,
                "hostelId": hostel_id,
                "floorId": floor_id,
                "roomId": room_id,
                "nativeAddress": native_address,
                "aadharId": aadhar_id,
            })))
            .await?
        }
        Commands::UpdateTenant { id, file } => {
            let tenant: serde_json::Value = serde_json::from_str(&fs::read_to_string(file)?)?;
            print_response(client.put(format!("{url}/tenants/{id}")).json(&tenant)).await?
        }
        Commands::Deactivate { id, date } => {
            print_response(
                client
                    .post(format!("{url}/tenants/{id}/deactivate"))
                    .json(&json!({ "checkOutDate": date })),
            )
            .await?
        }
        Commands::Pay { tenant_id, amount, month, year, notes } => {
            let today = Local::now().date_naive();
            print_response(client.post(format!("{url}/payments")).json(&json!({
                "tenantId": tenant_id,
                "amount": amount,
                "month": month.unwrap_or(today.month()),
                "year": year.unwrap_or(today.year()),
                "date": today,
                "notes": notes,
            })))
            .await?
        }
        Commands::Payments { year, month, hostel } => {
            let mut query = vec![("year", year.to_string()), ("month", month.to_string())];
            if let Some(hostel) = hostel {
                query.push(("hostel", hostel));
            }
            print_response(client.get(format!("{url}/payments")).query(&query)).await?
        }
        Commands::PaymentYears => print_response(client.get(format!("{url}/payments/years"))).await?,
        Commands::Search { query } => {
            print_response(client.get(format!("{url}/tenants/search")).query(&[("q", query)])).await?
        }
        Commands::TenantPayments { id } => {
            print_response(client.get(format!("{url}/tenants/{id}/payments"))).await?
        }
        Commands::Report { query } => {
            stream_response(client.post(format!("{url}/reports")).json(&json!({ "query": query }))).await?
        }
        Commands::Reports => print_response(client.get(format!("{url}/reports"))).await?,
    }

    Ok(())
}
