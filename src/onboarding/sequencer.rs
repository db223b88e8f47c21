//! OnboardingSequencer — owns the stage board, the dealer form snapshot and
//! the single outstanding stage continuation.
//!
//! Callers only get commands (`start`, `reset`, `update_dealer_info`) and
//! immutable snapshots. Every mutation happens under one mutex, and each
//! continuation re-reads live state under that mutex before touching it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{
    AgentActivity, AgentProfile, AgentView, DealerInfo, Stage, StageStatus, default_agents,
    default_stages,
};
use super::scheduler::StageTimer;
use super::state::{Completion, StageBoard, StageTicket, StartRefused};
use crate::config::SequencerConfig;
use crate::error::OnboardingError;

/// Events broadcast to observers as the sequence moves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SequencerEvent {
    DealerUpdated {
        dealer: DealerInfo,
    },
    Started {
        run_id: Uuid,
        dealer: DealerInfo,
        at: DateTime<Utc>,
    },
    StageStarted {
        run_id: Uuid,
        index: usize,
        stage_id: String,
        agent_id: String,
    },
    StageCompleted {
        run_id: Uuid,
        index: usize,
        stage_id: String,
        agent_id: String,
    },
    Completed {
        run_id: Uuid,
        message: String,
        at: DateTime<Utc>,
    },
    Reset {
        epoch: u64,
    },
}

/// Read-only view of the sequencer for rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnboardingSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub started: bool,
    pub current_index: usize,
    pub epoch: u64,
    pub stages: Vec<Stage>,
    pub agents: Vec<AgentView>,
    pub dealer: DealerInfo,
    /// Every stage completed; the frontend shows its banner.
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl OnboardingSnapshot {
    /// The stage currently in progress, if any.
    pub fn active_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|s| s.status == StageStatus::InProgress)
    }
}

fn completion_message(dealer: &DealerInfo) -> String {
    format!(
        "{} has been successfully onboarded. Welcome to the team!",
        dealer.name
    )
}

struct Inner {
    board: StageBoard,
    dealer: DealerInfo,
    timer: StageTimer,
    run_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

struct Shared {
    inner: Mutex<Inner>,
    agents: Vec<AgentProfile>,
    tx: broadcast::Sender<SequencerEvent>,
}

/// Scripted five-stage onboarding run. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct OnboardingSequencer {
    shared: Arc<Shared>,
}

impl OnboardingSequencer {
    pub fn new(config: SequencerConfig) -> Self {
        let (tx, _rx) = broadcast::channel(config.event_capacity.max(1));
        let inner = Inner {
            board: StageBoard::new(default_stages()),
            dealer: DealerInfo::default(),
            timer: StageTimer::new(config.step_delay),
            run_id: None,
            started_at: None,
            completed_at: None,
        };
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                agents: default_agents(),
                tx,
            }),
        }
    }

    /// Subscribe to sequencer events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencerEvent> {
        self.shared.tx.subscribe()
    }

    pub async fn snapshot(&self) -> OnboardingSnapshot {
        let inner = self.shared.inner.lock().await;
        self.shared.snapshot_of(&inner)
    }

    pub async fn agents(&self) -> Vec<AgentView> {
        self.snapshot().await.agents
    }

    /// Replace the form contents. Only allowed before the run starts.
    pub async fn update_dealer_info(
        &self,
        dealer: DealerInfo,
    ) -> Result<OnboardingSnapshot, OnboardingError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.board.is_started() {
            return Err(OnboardingError::AlreadyStarted);
        }
        inner.dealer = dealer.clone();
        let _ = self.shared.tx.send(SequencerEvent::DealerUpdated { dealer });
        Ok(self.shared.snapshot_of(&inner))
    }

    /// Validate the form and begin the run at stage 0.
    pub async fn start(&self, dealer: DealerInfo) -> Result<OnboardingSnapshot, OnboardingError> {
        let missing = dealer.missing_required();
        if !missing.is_empty() {
            warn!(missing = ?missing, "Onboarding start rejected: required fields empty");
            return Err(OnboardingError::validation(&missing));
        }

        let mut inner = self.shared.inner.lock().await;
        let ticket = inner.board.start().map_err(|refused| match refused {
            StartRefused::AlreadyStarted => OnboardingError::AlreadyStarted,
            StartRefused::NoStages => OnboardingError::NoStages,
        })?;

        let run_id = Uuid::new_v4();
        let now = Utc::now();
        inner.dealer = dealer.clone();
        inner.run_id = Some(run_id);
        inner.started_at = Some(now);
        inner.completed_at = None;

        info!(
            %run_id,
            dealer = %dealer.name,
            business_type = %dealer.business_type,
            epoch = ticket.epoch,
            "Onboarding started"
        );
        let _ = self.shared.tx.send(SequencerEvent::Started {
            run_id,
            dealer,
            at: now,
        });
        self.shared.stage_started(&inner, ticket);
        Shared::schedule_completion(&self.shared, &mut inner, ticket);

        Ok(self.shared.snapshot_of(&inner))
    }

    /// Back to an empty form with every stage pending. Safe at any time.
    pub async fn reset(&self) -> OnboardingSnapshot {
        let mut inner = self.shared.inner.lock().await;
        let cancelled = inner.timer.cancel();
        let epoch = inner.board.reset();
        inner.dealer = DealerInfo::default();
        inner.run_id = None;
        inner.started_at = None;
        inner.completed_at = None;

        info!(epoch, cancelled = ?cancelled.map(|t| t.index), "Onboarding reset");
        let _ = self.shared.tx.send(SequencerEvent::Reset { epoch });
        self.shared.snapshot_of(&inner)
    }

    #[cfg(test)]
    async fn fire(&self, ticket: StageTicket) {
        Shared::on_stage_elapsed(&self.shared, ticket).await;
    }
}

impl Shared {
    fn schedule_completion(shared: &Arc<Self>, inner: &mut Inner, ticket: StageTicket) {
        let weak = Arc::downgrade(shared);
        inner.timer.schedule(ticket, move |ticket| async move {
            if let Some(shared) = weak.upgrade() {
                Shared::on_stage_elapsed(&shared, ticket).await;
            }
        });
    }

    async fn on_stage_elapsed(shared: &Arc<Self>, ticket: StageTicket) {
        let mut inner = shared.inner.lock().await;
        inner.timer.release(ticket);

        match inner.board.complete(ticket) {
            Completion::Stale => {
                debug!(
                    epoch = ticket.epoch,
                    current_epoch = inner.board.epoch(),
                    stage_index = ticket.index,
                    "Ignoring stale stage continuation"
                );
            }
            Completion::Next(next) => {
                shared.stage_completed(&inner, ticket.index);
                shared.stage_started(&inner, next);
                Shared::schedule_completion(shared, &mut inner, next);
            }
            Completion::Finished => {
                shared.stage_completed(&inner, ticket.index);
                let now = Utc::now();
                inner.completed_at = Some(now);
                let message = completion_message(&inner.dealer);
                info!(run_id = ?inner.run_id, dealer = %inner.dealer.name, "Onboarding complete");
                if let Some(run_id) = inner.run_id {
                    let _ = shared.tx.send(SequencerEvent::Completed {
                        run_id,
                        message,
                        at: now,
                    });
                }
            }
        }
    }

    fn stage_started(&self, inner: &Inner, ticket: StageTicket) {
        let Some(stage) = inner.board.stages().get(ticket.index) else {
            return;
        };
        info!(
            stage_index = ticket.index,
            stage = %stage.title,
            agent = %stage.agent_id,
            "Stage in progress"
        );
        if let Some(run_id) = inner.run_id {
            let _ = self.tx.send(SequencerEvent::StageStarted {
                run_id,
                index: ticket.index,
                stage_id: stage.id.clone(),
                agent_id: stage.agent_id.clone(),
            });
        }
    }

    fn stage_completed(&self, inner: &Inner, index: usize) {
        let Some(stage) = inner.board.stages().get(index) else {
            return;
        };
        info!(stage_index = index, stage = %stage.title, "Stage completed");
        if let Some(run_id) = inner.run_id {
            let _ = self.tx.send(SequencerEvent::StageCompleted {
                run_id,
                index,
                stage_id: stage.id.clone(),
                agent_id: stage.agent_id.clone(),
            });
        }
    }

    fn snapshot_of(&self, inner: &Inner) -> OnboardingSnapshot {
        let stages = inner.board.stages().to_vec();
        let agents = self
            .agents
            .iter()
            .map(|profile| AgentView {
                activity: AgentActivity::derive(&profile.id, &stages),
                profile: profile.clone(),
            })
            .collect();
        let completed = inner.board.is_complete();
        OnboardingSnapshot {
            run_id: inner.run_id,
            started: inner.board.is_started(),
            current_index: inner.board.current_index(),
            epoch: inner.board.epoch(),
            stages,
            agents,
            dealer: inner.dealer.clone(),
            completed,
            completion_message: completed.then(|| completion_message(&inner.dealer)),
            started_at: inner.started_at,
            completed_at: inner.completed_at,
        }
    }
}
