//! herald - Channel publishing agent
//!
//! Discovers candidate posts, routes them through human moderation, and
//! delivers approved content to a Telegram channel, either right away or at
//! a scheduled time.
//!
//! # Architecture
//!
//! Three long-lived loops share one SQLite store:
//! - The scheduler publishes due posts (at-least-once, idempotent marking)
//! - Discovery asks content sources for drafts and drops near-duplicates
//! - The operator bridge turns button presses and replies into moderation
//!   decisions
//!
//! # Modules
//!
//! - `adapters`: Telegram Bot API client, image fetching
//! - `core`: Pipeline (fingerprints, discovery, moderation, delivery, scheduler)
//! - `domain`: Data structures (ScheduledPost, Candidate, Content)
//! - `operator`: Operator events and acknowledgments
//! - `sources`: Content sources (templates, RSS/Atom feeds)
//! - `store`: Persistence
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the agent
//! herald run
//!
//! # Schedule a post
//! herald schedule "Hello" --at "2026-10-20 09:00"
//!
//! # Moderate from the terminal
//! herald decide 5 approve
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod operator;
pub mod sources;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{Agent, AgentContext, AgentError, AgentParts, AgentSettings};
pub use domain::{Candidate, CandidateDraft, CandidateState, Content, Decision, ScheduledPost};
pub use store::{SqliteStore, Store, StoreError};

// Telegram integration
pub use adapters::{TelegramClient, TelegramConfig};
