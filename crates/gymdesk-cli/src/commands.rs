use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use gymdesk_core::api::ClientOptions;
use gymdesk_core::models::money::format_amount;
use gymdesk_core::models::{
    AttendanceRecord, DashboardStats, Member, MemberFilters, MobileMoneyRequest, NewCashPayment,
    Page, Payment, PaymentFilters, RevenuePeriod,
};
use gymdesk_core::query::MutationOptions;
use gymdesk_core::services::{DASHBOARD_RESOURCE, LIST_CACHE_TTL, MEMBERS_RESOURCE, SUMMARY_CACHE_TTL};
use gymdesk_core::utils::format::{
    format_date, format_duration, format_optional, format_phone, format_time, normalize_msisdn,
    truncate_string,
};
use gymdesk_core::{
    ApiClient, ApiMutation, ApiQuery, AuthStatus, Config, Gym, QueryClient, QueryOptions, Session,
};

// ============================================================================
// Constants
// ============================================================================

/// How often `payments mobile --wait` polls the payment status
const PAYMENT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Give up waiting for a mobile-money confirmation after this many polls
const PAYMENT_POLL_ATTEMPTS: u32 = 20;

pub struct Desk {
    config: Config,
    gym: Gym,
    json: bool,
}

impl Desk {
    pub fn open(json: bool) -> Result<Self> {
        let config = Config::load()?;
        let mut session = Session::new(config.cache_dir()?);
        if let Err(e) = session.load() {
            warn!(error = %e, "Ignoring unreadable session file");
        }

        let client = ApiClient::with_session(ClientOptions::from_config(&config)?, session)?;
        Ok(Self {
            config,
            gym: Gym::with_queries(client, QueryClient::shared()),
            json,
        })
    }

    pub fn api_url(&self) -> &str {
        self.gym.client.base_url()
    }

    pub fn session_expired(&self) -> bool {
        *self.gym.client.auth_status().borrow() == AuthStatus::Expired
    }

    fn require_session(&self) -> Result<()> {
        if self.gym.client.is_authenticated() {
            Ok(())
        } else {
            bail!("Not signed in, run `gymdesk login` first")
        }
    }

    /// Print `value` as JSON when requested, otherwise run `table`.
    fn emit<T: Serialize>(&self, value: &T, table: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            table(value);
        }
        Ok(())
    }

    // ===== Session =====

    pub async fn login(&self, username: Option<String>) -> Result<()> {
        let username = username
            .or_else(|| self.config.last_username.clone())
            .ok_or_else(|| anyhow!("Username required: gymdesk login <username>"))?;
        let password = rpassword::prompt_password(format!("Password for {}: ", username))
            .context("Failed to read password")?;

        let user = self.gym.client.login(&username, &password).await?;
        self.gym.clear_caches();

        let mut config = self.config.clone();
        config.last_username = Some(username);
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to save config");
        }
        println!("Signed in as {}", user.display_name());
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        self.gym.logout();
        println!("Signed out");
        Ok(())
    }

    pub fn whoami(&self) -> Result<()> {
        self.require_session()?;
        match self.gym.client.current_user() {
            Some(user) => self.emit(&user, |user| {
                println!("{} ({})", user.display_name(), user.username);
                if let Some(role) = &user.role {
                    println!("Role: {}", role);
                }
            }),
            None => {
                println!("{}", self.gym.client.username().unwrap_or_default());
                Ok(())
            }
        }
    }

    // ===== Members =====

    pub async fn list_members(&self, page: u32, filters: MemberFilters) -> Result<()> {
        self.require_session()?;
        let gym = self.gym.clone();
        let query = ApiQuery::new(
            self.gym.queries.clone(),
            move |(page, filters): (u32, MemberFilters)| {
                let gym = gym.clone();
                async move { gym.members.list(page, &filters).await }
            },
            QueryOptions::new(MEMBERS_RESOURCE)
                .cache_ttl(LIST_CACHE_TTL)
                .on_error(|e| debug!(error = %e, "Member list failed")),
        );

        let members = query
            .fetch_data((page, filters))
            .await?
            .ok_or_else(|| anyhow!("Member list request was cancelled"))?;
        self.emit(&members, |members| print_members(page, members))
    }

    pub async fn search_members(&self, query: &str) -> Result<()> {
        self.require_session()?;
        let members = self.gym.members.search(query).await?;
        self.emit(&members, |members| {
            if members.is_empty() {
                println!("No members match \"{}\"", query);
            }
            for member in members {
                print_member_row(member);
            }
        })
    }

    /// Interactive lookup: each line read from stdin replaces the query, and
    /// matches are printed once typing pauses.
    pub async fn find_members(&self) -> Result<()> {
        self.require_session()?;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let lookup = self.gym.members.autocomplete(move |query, result| {
            let _ = tx.send((query, result));
        });
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => match line.context("Failed to read search input")? {
                    Some(line) => lookup.call(line),
                    None => break,
                },
                Some((query, result)) = rx.recv() => self.print_matches(&query, result?)?,
            }
        }

        // Stdin closed: let the last pending lookup finish.
        drop(lookup);
        while let Some((query, result)) = rx.recv().await {
            self.print_matches(&query, result?)?;
        }
        Ok(())
    }

    fn print_matches(&self, query: &str, members: Vec<Member>) -> Result<()> {
        if query.trim().is_empty() {
            return Ok(());
        }
        self.emit(&members, |members| {
            println!("-- {} match(es) for \"{}\"", members.len(), query.trim());
            for member in members {
                print_member_row(member);
            }
        })
    }

    pub async fn member_stats(&self) -> Result<()> {
        self.require_session()?;
        let stats = self.gym.members.stats().await?;
        self.emit(&stats, |stats| {
            println!("Members:        {}", stats.total_members);
            println!("  active:       {}", stats.active_members);
            println!("  expired:      {}", stats.expired_members);
            println!("  indoor:       {}", stats.indoor_members);
            println!("  outdoor:      {}", stats.outdoor_members);
            println!("Expiring soon:  {}", stats.expiring_soon);
        })
    }

    pub async fn show_member(&self, id: i64) -> Result<()> {
        self.require_session()?;
        let member = self.gym.members.get(id).await?;
        self.emit(&member, |m| {
            println!("{} (#{})", m.full_name(), m.id);
            println!("Status:  {:?}", m.status);
            println!("Type:    {}", m.membership_type);
            println!("Plan:    {}", format_optional(&m.plan_name, "-"));
            println!("Phone:   {}", m.phone_number.as_deref().map(format_phone).unwrap_or_default());
            println!("Expires: {}", format_date(m.expiry_date));
            if let Some(days) = m.days_until_expiry() {
                if (0..=7).contains(&days) {
                    println!("         expires in {} day(s)", days);
                }
            }
            if m.is_checked_in {
                println!("Currently checked in");
            }
        })
    }

    // ===== Attendance =====

    fn visit_mutation(&self, check_in: bool) -> ApiMutation<i64, AttendanceRecord> {
        let gym = self.gym.clone();
        ApiMutation::new(
            move |member: i64| {
                let gym = gym.clone();
                async move {
                    if check_in {
                        gym.attendance.check_in(member).await
                    } else {
                        gym.attendance.check_out(member).await
                    }
                }
            },
            MutationOptions::default().on_error(|e| debug!(error = %e, "Visit update failed")),
        )
    }

    pub async fn check_in(&self, member: i64) -> Result<()> {
        self.require_session()?;
        let record = self.visit_mutation(true).mutate(member).await?;
        self.emit(&record, |r| {
            println!("Member #{} checked in at {}", r.member, format_time(r.check_in_time));
        })
    }

    pub async fn check_out(&self, member: i64) -> Result<()> {
        self.require_session()?;
        let record = self.visit_mutation(false).mutate(member).await?;
        self.emit(&record, |r| {
            println!(
                "Member #{} checked out after {}",
                r.member,
                format_duration(r.duration())
            );
        })
    }

    pub async fn attendance(&self, page: u32, date: Option<NaiveDate>, active: bool) -> Result<()> {
        self.require_session()?;
        if active {
            let records = self.gym.attendance.active().await?;
            return self.emit(&records, |records| {
                println!("{} in the building", records.len());
                for record in records {
                    print_visit(record);
                }
            });
        }

        let records = self.gym.attendance.list(page, date).await?;
        self.emit(&records, |records| {
            for record in &records.items {
                print_visit(record);
            }
            print_page_footer(page, records);
        })
    }

    // ===== Payments =====

    pub async fn list_payments(&self, page: u32, filters: PaymentFilters) -> Result<()> {
        self.require_session()?;
        let payments = self.gym.payments.list(page, &filters).await?;
        self.emit(&payments, |payments| {
            for payment in &payments.items {
                print_payment(payment);
            }
            print_page_footer(page, payments);
        })
    }

    pub async fn record_cash(&self, member: i64, amount: f64) -> Result<()> {
        self.require_session()?;
        let payment = self
            .gym
            .payments
            .record_cash(&NewCashPayment::new(member, amount))
            .await?;
        self.emit(&payment, print_payment)
    }

    pub async fn mobile_money(&self, member: i64, amount: f64, phone: &str, wait: bool) -> Result<()> {
        self.require_session()?;
        let phone_number = normalize_msisdn(phone)
            .ok_or_else(|| anyhow!("{} is not a mobile number", phone))?;

        let mut payment = self
            .gym
            .payments
            .initiate_mobile_money(&MobileMoneyRequest {
                member,
                amount,
                phone_number,
                plan: None,
            })
            .await?;

        if wait {
            eprintln!("Waiting for the member to approve on their phone...");
            let mut attempts = 0;
            while !payment.status.is_final() && attempts < PAYMENT_POLL_ATTEMPTS {
                tokio::time::sleep(PAYMENT_POLL_INTERVAL).await;
                payment = self.gym.payments.payment_status(payment.id).await?;
                attempts += 1;
            }
        }
        self.emit(&payment, print_payment)
    }

    // ===== Admin and analytics =====

    pub async fn plans(&self) -> Result<()> {
        self.require_session()?;
        let plans = self.gym.admin.plans().await?;
        self.emit(&plans, |plans| {
            for plan in plans.iter().filter(|p| p.is_active) {
                println!(
                    "{:>4}  {:<24} {:<8} {:>4} days  {:>12}",
                    plan.id,
                    truncate_string(&plan.name, 24),
                    plan.plan_type,
                    plan.duration_days,
                    format_amount(plan.price)
                );
            }
        })
    }

    pub async fn dashboard(&self, revenue: Option<RevenuePeriod>) -> Result<()> {
        self.require_session()?;
        let gym = self.gym.clone();
        let query: ApiQuery<(), DashboardStats> = ApiQuery::new(
            self.gym.queries.clone(),
            move |()| {
                let gym = gym.clone();
                async move { gym.analytics.dashboard().await }
            },
            QueryOptions::new(DASHBOARD_RESOURCE).cache_ttl(SUMMARY_CACHE_TTL),
        );
        let stats = query
            .fetch_data(())
            .await?
            .ok_or_else(|| anyhow!("Dashboard request was cancelled"))?;

        self.emit(&stats, |s| {
            println!("Members:          {} ({} active)", s.total_members, s.active_members);
            println!("In the building:  {}", s.checked_in_now);
            println!("Visits today:     {}", s.visits_today);
            println!("Revenue today:    {}", format_amount(s.revenue_today));
            println!("Revenue (month):  {}", format_amount(s.revenue_this_month));
            println!("Expiring (week):  {}", s.expiring_this_week);
        })?;

        if let Some(period) = revenue {
            let report = self.gym.analytics.revenue(period).await?;
            self.emit(&report, |points| {
                println!();
                for point in points {
                    println!("{}  {:>12}", point.period_start, format_amount(point.total));
                }
            })?;
        }
        Ok(())
    }

    pub async fn remind(&self, member: Option<i64>, expiring_within: Option<u32>) -> Result<()> {
        self.require_session()?;
        match (member, expiring_within) {
            (Some(member), _) => {
                let reminder = self.gym.admin.send_reminder(member).await?;
                self.emit(&reminder, |r| println!("Reminder sent to member #{}", r.member))
            }
            (None, Some(days)) => {
                let batch = self.gym.admin.send_expiry_reminders(days).await?;
                self.emit(&batch, |b| println!("{} reminder(s) sent, {} skipped", b.sent, b.skipped))
            }
            (None, None) => bail!("Give a member id or --expiring-within <days>"),
        }
    }
}

// ============================================================================
// Table output
// ============================================================================

fn print_member_row(member: &Member) {
    println!(
        "{:>5}  {:<28} {:<8} {:<10} {}",
        member.id,
        truncate_string(&member.full_name(), 28),
        member.membership_type,
        member.status.as_param(),
        format_date(member.expiry_date)
    );
}

fn print_members(page: u32, members: &Page<Member>) {
    if members.is_empty() {
        println!("No members");
        return;
    }
    for member in &members.items {
        print_member_row(member);
    }
    print_page_footer(page, members);
}

fn print_visit(record: &AttendanceRecord) {
    let who = record
        .member_name
        .clone()
        .unwrap_or_else(|| format!("#{}", record.member));
    let out = record
        .check_out_time
        .map(format_time)
        .unwrap_or_else(|| "--:--".to_string());
    println!(
        "{}  {}  {:<28} {}",
        format_time(record.check_in_time),
        out,
        truncate_string(&who, 28),
        format_duration(record.duration())
    );
}

fn print_payment(payment: &Payment) {
    println!(
        "{:>6}  #{:<5} {:>12}  {:<12} {:<10} {}",
        payment.id,
        payment.member,
        format_amount(payment.amount),
        payment.payment_method.to_string(),
        payment.status.as_param(),
        format_optional(&payment.reference, "")
    );
}

fn print_page_footer<T>(page: u32, rows: &Page<T>) {
    let more = if rows.has_next() { ", more with --page" } else { "" };
    println!("-- page {} ({} of {} total{})", page, rows.len(), rows.count, more);
}

