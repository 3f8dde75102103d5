use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::bookings;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = bookings)]
pub struct BookingEntity {
    pub id: Uuid,
    pub user_id: i64,
    pub ticket_detail_id: i64,
    pub total_tickets: i32,
    pub full_name: String,
    pub personal_id: String,
    pub booking_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bookings)]
pub struct InsertBookingEntity {
    pub user_id: i64,
    pub ticket_detail_id: i64,
    pub total_tickets: i32,
    pub full_name: String,
    pub personal_id: String,
    pub booking_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert input for the booking store. `id: None` means "insert, or adopt
/// the live row matching the allocation natural key" (same user, same
/// ticket detail, booking_date within the same minute).
#[derive(Debug, Clone)]
pub struct UpsertBookingEntity {
    pub id: Option<Uuid>,
    pub user_id: i64,
    pub ticket_detail_id: i64,
    pub total_tickets: i32,
    pub full_name: String,
    pub personal_id: String,
    pub booking_date: DateTime<Utc>,
}
