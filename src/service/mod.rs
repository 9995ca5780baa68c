//! Service layer: business logic orchestration.
//!
//! [`LiveService`] validates writes, commits them through the
//! [`crate::persistence::MatchStore`] and only then hands them to the
//! [`crate::domain::BroadcastHub`].

pub mod live_service;

pub use live_service::LiveService;
