//! The content publishing pipeline.
//!
//! This module contains:
//! - FingerprintIndex: Near-duplicate detection for discovered content
//! - DiscoveryCoordinator: Source rotation, dedup, persistence
//! - ModerationMachine: Approve/edit/reject lifecycle of candidates
//! - DeliveryEngine: Text or image+caption sends with text fallback
//! - SchedulerLoop: Publishes due scheduled posts
//! - Agent: Facade over all of the above plus the background loops

pub mod agent;
pub mod context;
pub mod delivery;
pub mod discovery;
pub mod fingerprint;
pub mod limits;
pub mod moderation;
pub mod scheduler;

// Re-export commonly used types
pub use agent::{Agent, AgentError, AgentParts, AgentSettings};
pub use context::{AgentContext, Shutdown, Ticker};
pub use delivery::{DeliveryEngine, DeliveryError, DeliveryMode, Receipt};
pub use discovery::{DiscoveryCoordinator, DiscoverySettings};
pub use fingerprint::{fingerprint, DedupSettings, FingerprintIndex};
pub use limits::Limits;
pub use moderation::{ModerationError, ModerationMachine, Outcome, Preview};
pub use scheduler::{SchedulerLoop, TickReport};
