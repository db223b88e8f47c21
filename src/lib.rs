//! Dealer Onboarding — scripted onboarding sequencer with an HTTP/WS surface.

pub mod config;
pub mod error;
pub mod onboarding;
