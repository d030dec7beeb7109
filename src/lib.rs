//! Keeps a government appointment registry in step with local bookings.
//!
//! A booking workflow calls one of two tasks when an appointment is created,
//! rescheduled or cancelled. The task reads the application numbers typed in
//! the booking form, checks their status on the registry, and adds or removes
//! the matching remote appointments.

pub mod config;
pub mod db;
pub mod model;
pub mod registry;
pub mod sync;
pub mod tasks;
