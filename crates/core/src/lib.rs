//! Chat availability and session orchestration for the member portal.
//!
//! The engine answers whether a member may chat right now, brings the
//! vendor widget up in order, and keeps a live conversation bound to a
//! single insurance plan.
//!
//! * [`hours`] parses business-hours descriptors and decides open/closed.
//! * [`eligibility`] turns plan flags plus hours into a verdict.
//! * [`bootstrap`] sequences eligibility, script loading and link
//!   enhancement with TTL, retry and stale-result guards.
//! * [`session`] runs the session state machine and the plan-switch lock.
//! * [`links`] turns "Start a chat" anchors into chat triggers.
//!
//! Host capabilities (widget, document, clock) are traits with in-memory
//! implementations for tests.

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod dom;
pub mod eligibility;
pub mod error;
pub mod hours;
pub mod links;
pub mod session;
pub mod subscription;
pub mod widget;

pub use bootstrap::{Applied, BootstrapSequencer, BootstrapSnapshot, FetchTicket, LoadTicket, Readiness};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BootstrapPolicy, ChatConfig};
pub use dom::{Document, MemoryDocument, NodeId};
pub use eligibility::{EligibilityResolver, EligibilityVerdict, PlanBook, PlanDirectory, PlanFlags, PlanProfile, VerdictReason};
pub use error::{ChatError, Result};
pub use hours::BusinessHoursSpec;
pub use links::{LinkEnhancer, OpenChat};
pub use memberchat_protocol::ChatMode;
pub use session::{PlanSwitchDecision, PlanSwitcher, SessionLifecycleController, SessionPhase, SessionState, Transition};
pub use subscription::Subscription;
pub use widget::{FakeWidgetBus, WidgetBus};
