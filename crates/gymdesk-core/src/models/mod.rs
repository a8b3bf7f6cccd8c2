//! Data models for gym entities.
//!
//! This module contains the data structures exchanged with the backend:
//!
//! - `Member`, `MemberStats`: registrations and their aggregates
//! - `MembershipPlan`: indoor/outdoor plans
//! - `Payment`, `PaymentStats`: cash and mobile-money payments
//! - `AttendanceRecord`, `Booking`: check-ins and class bookings
//! - `Reminder`, `Invoice`, `StaffUser`: admin tooling
//! - `DashboardStats`, `RevenuePoint`, `AttendancePoint`: analytics
//! - `Page`, `ListResponse`: list-envelope normalization

pub mod admin;
pub mod analytics;
pub mod attendance;
pub mod member;
pub mod money;
pub mod page;
pub mod payment;
pub mod plan;
pub mod user;

pub use admin::{Invoice, InvoiceStatus, NewInvoice, Reminder, ReminderBatch, StaffUser};
pub use analytics::{AttendancePoint, DashboardStats, RevenuePeriod, RevenuePoint};
pub use attendance::{AttendanceFilters, AttendanceRecord, AttendanceStats, Booking, BookingStatus, NewBooking};
pub use member::{Member, MemberFilters, MemberStats, MemberStatus, MemberUpdate, MembershipType, NewMember};
pub use page::{ListResponse, Page};
pub use payment::{MobileMoneyRequest, NewCashPayment, Payment, PaymentFilters, PaymentMethod, PaymentStats, PaymentStatus};
pub use plan::{MembershipPlan, PlanInput};
pub use user::UserProfile;
