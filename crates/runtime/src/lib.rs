//! Async drivers for the member portal chat engine.
//!
//! The core crate decides what should happen; this crate performs the I/O:
//! eligibility queries ([`source`]), widget script loading ([`script`]),
//! the bootstrap loop ([`bootstrapper`]) and page-level wiring
//! ([`orchestrator`]).

pub mod bootstrapper;
pub mod orchestrator;
pub mod script;
pub mod source;

pub use bootstrapper::Bootstrapper;
pub use orchestrator::{ChatOrchestrator, HostParts};
pub use script::{HttpScriptLoader, ScriptBehavior, ScriptLoader, ScriptSignal, ScriptSignalSender, ScriptedLoader};
pub use source::{EligibilitySource, FetchFuture, HttpEligibilitySource, StaticEligibilitySource};
