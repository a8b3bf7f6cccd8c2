//! gymdesk - command line front desk for the gym backend.
//!
//! Sign in once with `gymdesk login`; the token pair is kept in the user
//! cache directory and refreshed transparently on later runs.

mod commands;

use std::io;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gymdesk_core::models::{MemberStatus, MembershipType, PaymentMethod, PaymentStatus, RevenuePeriod};
use gymdesk_core::ApiError;

use commands::Desk;

#[derive(Parser)]
#[command(name = "gymdesk", version)]
#[command(about = "Front-desk client for the gym backend", long_about = None)]
struct Cli {
    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        /// Defaults to the last username used
        username: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in staff account
    Whoami,
    #[command(subcommand)]
    Members(MembersCommand),
    /// Check a member in
    Checkin { member: i64 },
    /// Check a member out
    Checkout { member: i64 },
    /// Attendance log, or who is in the building with --active
    Attendance {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        active: bool,
    },
    #[command(subcommand)]
    Payments(PaymentsCommand),
    /// Membership plans
    Plans,
    /// Today's numbers
    Dashboard {
        /// Also show the revenue report for this period
        #[arg(long)]
        revenue: Option<RevenuePeriod>,
    },
    /// Send a renewal reminder to one member, or to everyone expiring soon
    Remind {
        member: Option<i64>,
        #[arg(long, conflicts_with = "member")]
        expiring_within: Option<u32>,
    },
}

#[derive(Subcommand)]
enum MembersCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        status: Option<StatusArg>,
        #[arg(long = "type")]
        membership_type: Option<TypeArg>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Name or phone lookup
    Search { query: String },
    /// Search as you type: one query per line on stdin
    Find,
    Stats,
    Show { id: i64 },
}

#[derive(Subcommand)]
enum PaymentsCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        method: Option<MethodArg>,
        #[arg(long)]
        status: Option<PaymentStatusArg>,
    },
    /// Record a cash payment
    Cash { member: i64, amount: f64 },
    /// Send a mobile-money prompt to the member's phone
    Mobile {
        member: i64,
        amount: f64,
        phone: String,
        /// Poll until the payment completes or fails
        #[arg(long)]
        wait: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Active,
    Expired,
    Suspended,
}

impl From<StatusArg> for MemberStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => MemberStatus::Active,
            StatusArg::Expired => MemberStatus::Expired,
            StatusArg::Suspended => MemberStatus::Suspended,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    Indoor,
    Outdoor,
}

impl From<TypeArg> for MembershipType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Indoor => MembershipType::Indoor,
            TypeArg::Outdoor => MembershipType::Outdoor,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Cash,
    Mobile,
}

impl From<MethodArg> for PaymentMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Cash => PaymentMethod::Cash,
            MethodArg::Mobile => PaymentMethod::MobileMoney,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PaymentStatusArg {
    Pending,
    Completed,
    Failed,
}

impl From<PaymentStatusArg> for PaymentStatus {
    fn from(arg: PaymentStatusArg) -> Self {
        match arg {
            PaymentStatusArg::Pending => PaymentStatus::Pending,
            PaymentStatusArg::Completed => PaymentStatus::Completed,
            PaymentStatusArg::Failed => PaymentStatus::Failed,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let desk = Desk::open(cli.json)?;
    info!(api = desk.api_url(), "gymdesk starting");

    let result = run(&desk, cli.command).await;
    if desk.session_expired() {
        eprintln!("Session expired, run `gymdesk login` to sign in again.");
    }
    match result {
        Err(e) if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::SessionExpired)) => {
            std::process::exit(2);
        }
        other => other,
    }
}

async fn run(desk: &Desk, command: Command) -> Result<()> {
    match command {
        Command::Login { username } => desk.login(username).await,
        Command::Logout => desk.logout(),
        Command::Whoami => desk.whoami(),
        Command::Members(MembersCommand::List {
            page,
            status,
            membership_type,
            search,
        }) => {
            let filters = gymdesk_core::models::MemberFilters {
                status: status.map(Into::into),
                membership_type: membership_type.map(Into::into),
                search,
            };
            desk.list_members(page, filters).await
        }
        Command::Members(MembersCommand::Search { query }) => desk.search_members(&query).await,
        Command::Members(MembersCommand::Find) => desk.find_members().await,
        Command::Members(MembersCommand::Stats) => desk.member_stats().await,
        Command::Members(MembersCommand::Show { id }) => desk.show_member(id).await,
        Command::Checkin { member } => desk.check_in(member).await,
        Command::Checkout { member } => desk.check_out(member).await,
        Command::Attendance { date, page, active } => desk.attendance(page, date, active).await,
        Command::Payments(PaymentsCommand::List { page, method, status }) => {
            let filters = gymdesk_core::models::PaymentFilters {
                method: method.map(Into::into),
                status: status.map(Into::into),
                member: None,
            };
            desk.list_payments(page, filters).await
        }
        Command::Payments(PaymentsCommand::Cash { member, amount }) => desk.record_cash(member, amount).await,
        Command::Payments(PaymentsCommand::Mobile {
            member,
            amount,
            phone,
            wait,
        }) => desk.mobile_money(member, amount, &phone, wait).await,
        Command::Plans => desk.plans().await,
        Command::Dashboard { revenue } => desk.dashboard(revenue).await,
        Command::Remind {
            member,
            expiring_within,
        } => desk.remind(member, expiring_within).await,
    }
}
