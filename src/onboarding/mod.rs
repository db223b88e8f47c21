//! Dealer onboarding: a scripted five-stage run driven by timed delays.
//!
//! A dealer fills in a contact form, the run starts, and each stage is marked
//! in progress, held for a fixed delay, then completed before the next one
//! begins. Nothing real happens behind the stages; observers watch snapshots
//! and events to render progress.

pub mod model;
pub mod routes;
pub mod scheduler;
pub mod sequencer;
pub mod state;

pub use model::{
    AgentActivity, AgentProfile, AgentView, BusinessType, DealerInfo, Stage, StageStatus,
};
pub use routes::{OnboardingRouteState, cors_layer, onboarding_routes};
pub use sequencer::{OnboardingSequencer, OnboardingSnapshot, SequencerEvent};
pub use state::{Completion, StageBoard, StageTicket, StartRefused};
