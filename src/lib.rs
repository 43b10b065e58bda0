//! Idle economy: a generator-based resource game with per-identity saves.
//!
//! The pure economy lives in [`economy`]; [`session`] wraps it with an
//! identity, persistence through a [`store::SaveStore`], a confirmation
//! delay for actions and change notifications.

pub mod config;
pub mod economy;
pub mod session;
pub mod store;
pub mod time;
