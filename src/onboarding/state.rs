//! Stage progression state machine.
//!
//! `StageBoard` is the synchronous core of the sequencer. It knows nothing
//! about timers: activating a stage hands out a `StageTicket` tagged with
//! the current epoch, and the stage only completes when that ticket is
//! redeemed. `reset` bumps the epoch, so tickets issued before it are
//! rejected as stale.

use super::model::{Stage, StageStatus};

/// Token for one scheduled stage completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTicket {
    pub epoch: u64,
    pub index: usize,
}

/// Outcome of redeeming a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The stage completed and the next one is now in progress.
    Next(StageTicket),
    /// The last stage completed.
    Finished,
    /// The ticket predates a reset or does not match the active stage.
    Stale,
}

/// Why `StageBoard::start` refused to begin a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRefused {
    AlreadyStarted,
    /// The board has no stages. It stays unstarted.
    NoStages,
}

#[derive(Debug, Clone)]
pub struct StageBoard {
    stages: Vec<Stage>,
    current: usize,
    started: bool,
    epoch: u64,
}

impl StageBoard {
    pub fn new(mut stages: Vec<Stage>) -> Self {
        for stage in &mut stages {
            stage.status = StageStatus::Pending;
        }
        Self {
            stages,
            current: 0,
            started: false,
            epoch: 0,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Every stage completed. An empty board is never complete.
    pub fn is_complete(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(|s| s.status == StageStatus::Completed)
    }

    /// Begin the sequence at stage 0.
    pub fn start(&mut self) -> Result<StageTicket, StartRefused> {
        if self.started {
            return Err(StartRefused::AlreadyStarted);
        }
        let ticket = self.activate(0).ok_or(StartRefused::NoStages)?;
        self.started = true;
        Ok(ticket)
    }

    fn activate(&mut self, index: usize) -> Option<StageTicket> {
        let stage = self.stages.get_mut(index)?;
        debug_assert!(stage.status.can_transition_to(StageStatus::InProgress));
        stage.status = StageStatus::InProgress;
        self.current = index;
        Some(StageTicket {
            epoch: self.epoch,
            index,
        })
    }

    /// Complete the stage named by `ticket` and activate the next one.
    pub fn complete(&mut self, ticket: StageTicket) -> Completion {
        if !self.started || ticket.epoch != self.epoch || ticket.index != self.current {
            return Completion::Stale;
        }
        let Some(stage) = self.stages.get_mut(ticket.index) else {
            return Completion::Stale;
        };
        if !stage.status.can_transition_to(StageStatus::Completed) {
            return Completion::Stale;
        }
        stage.status = StageStatus::Completed;

        match self.activate(ticket.index + 1) {
            Some(next) => Completion::Next(next),
            None => Completion::Finished,
        }
    }

    /// Back to the initial state. Returns the new epoch.
    pub fn reset(&mut self) -> u64 {
        self.started = false;
        self.current = 0;
        for stage in &mut self.stages {
            stage.status = StageStatus::Pending;
        }
        self.epoch += 1;
        self.epoch
    }

    /// Verify the completed* → in_progress? → pending* ordering.
    pub fn check_ordering(&self) -> Result<(), String> {
        let completed = self
            .stages
            .iter()
            .take_while(|s| s.status == StageStatus::Completed)
            .count();
        let mut rest = self.stages[completed..].iter().enumerate();

        if let Some((offset, stage)) = rest.next() {
            if stage.status == StageStatus::InProgress && !self.started {
                return Err(format!("stage {} in progress before start", stage.id));
            }
            if stage.status == StageStatus::InProgress && completed + offset != self.current {
                return Err(format!(
                    "stage {} in progress but current index is {}",
                    stage.id, self.current
                ));
            }
        }
        for (_, stage) in rest {
            if stage.status != StageStatus::Pending {
                return Err(format!(
                    "stage {} is {} after an unfinished stage",
                    stage.id, stage.status
                ));
            }
        }
        if !self.started && completed > 0 {
            return Err("stages completed before start".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::model::default_stages;

    fn statuses(board: &StageBoard) -> Vec<StageStatus> {
        board.stages().iter().map(|s| s.status).collect()
    }

    #[test]
    fn new_board_is_all_pending() {
        let mut stages = default_stages();
        stages[2].status = StageStatus::Completed;
        let board = StageBoard::new(stages);
        assert!(statuses(&board).iter().all(|s| *s == StageStatus::Pending));
        assert!(!board.is_started());
        assert!(!board.is_complete());
        board.check_ordering().unwrap();
    }

    #[test]
    fn start_activates_first_stage_once() {
        let mut board = StageBoard::new(default_stages());
        let ticket = board.start().unwrap();
        assert_eq!(ticket, StageTicket { epoch: 0, index: 0 });
        assert_eq!(board.stages()[0].status, StageStatus::InProgress);
        assert_eq!(board.start(), Err(StartRefused::AlreadyStarted));
        board.check_ordering().unwrap();
    }

    #[test]
    fn tickets_walk_all_stages_in_order() {
        let mut board = StageBoard::new(default_stages());
        let mut ticket = board.start().unwrap();

        for expected in 1..5 {
            match board.complete(ticket) {
                Completion::Next(next) => {
                    assert_eq!(next.index, expected);
                    ticket = next;
                }
                other => panic!("expected Next at {expected}, got {other:?}"),
            }
            board.check_ordering().unwrap();
            let in_progress = statuses(&board)
                .iter()
                .filter(|s| **s == StageStatus::InProgress)
                .count();
            assert_eq!(in_progress, 1);
            assert_eq!(board.current_index(), expected);
        }

        assert_eq!(board.complete(ticket), Completion::Finished);
        assert!(board.is_complete());
        board.check_ordering().unwrap();
    }

    #[test]
    fn completed_board_ignores_replayed_tickets() {
        let mut board = StageBoard::new(default_stages());
        let mut ticket = board.start().unwrap();
        while let Completion::Next(next) = board.complete(ticket) {
            ticket = next;
        }
        assert!(board.is_complete());
        assert_eq!(board.complete(ticket), Completion::Stale);
        assert!(board.is_complete());
        assert_eq!(board.current_index(), 4);
    }

    #[test]
    fn reset_invalidates_outstanding_ticket() {
        let mut board = StageBoard::new(default_stages());
        let ticket = board.start().unwrap();
        assert_eq!(board.reset(), 1);

        assert_eq!(board.complete(ticket), Completion::Stale);
        assert!(statuses(&board).iter().all(|s| *s == StageStatus::Pending));
        assert!(!board.is_started());
    }

    #[test]
    fn stale_ticket_cannot_complete_restarted_run() {
        let mut board = StageBoard::new(default_stages());
        let old = board.start().unwrap();
        board.reset();
        let fresh = board.start().unwrap();
        assert_eq!(fresh, StageTicket { epoch: 1, index: 0 });

        assert_eq!(board.complete(old), Completion::Stale);
        assert_eq!(board.stages()[0].status, StageStatus::InProgress);
        assert!(matches!(board.complete(fresh), Completion::Next(_)));
    }

    #[test]
    fn ticket_for_wrong_index_is_stale() {
        let mut board = StageBoard::new(default_stages());
        board.start().unwrap();
        let bogus = StageTicket { epoch: 0, index: 3 };
        assert_eq!(board.complete(bogus), Completion::Stale);
        board.check_ordering().unwrap();
    }

    #[test]
    fn reset_mid_sequence_and_after_completion() {
        let mut board = StageBoard::new(default_stages());
        let ticket = board.start().unwrap();
        board.complete(ticket);
        board.reset();
        assert!(statuses(&board).iter().all(|s| *s == StageStatus::Pending));
        assert_eq!(board.current_index(), 0);

        let mut ticket = board.start().unwrap();
        while let Completion::Next(next) = board.complete(ticket) {
            ticket = next;
        }
        board.reset();
        assert!(!board.is_complete());
        board.check_ordering().unwrap();
    }

    #[test]
    fn check_ordering_flags_gaps() {
        let mut stages = default_stages();
        let mut board = StageBoard::new(stages.clone());
        board.start().unwrap();
        board.stages[3].status = StageStatus::Completed;
        assert!(board.check_ordering().is_err());

        stages[1].status = StageStatus::InProgress;
        let mut board = StageBoard::new(stages);
        board.stages[1].status = StageStatus::InProgress;
        assert!(board.check_ordering().is_err(), "in progress before start");
    }

    #[test]
    fn empty_board_refuses_to_start_and_stays_idle() {
        let mut board = StageBoard::new(Vec::new());
        assert_eq!(board.start(), Err(StartRefused::NoStages));
        assert!(!board.is_started());
        assert!(!board.is_complete());
        board.check_ordering().unwrap();

        // Still NoStages on a retry, never AlreadyStarted.
        assert_eq!(board.start(), Err(StartRefused::NoStages));
    }
}
