//! Wire types for the member chat engine.
//!
//! This crate contains the serde-serializable shapes exchanged with the
//! eligibility service and the third-party widget bus. These types are
//! the "protocol layer": data as it appears on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * Vendor-neutral: widget commands and events are named, payloads stay opaque JSON
//! * Stable: Changes only when the eligibility contract or widget adapter changes
//!
//! Behavior built on top of these types lives in `memberchat`.

pub mod eligibility;
pub mod widget;

pub use eligibility::*;
pub use widget::*;
