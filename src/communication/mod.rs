//! Fan-out of session events to observers.

pub mod broadcast;
