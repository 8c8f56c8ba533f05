#![deny(warnings)]

//! Boss-game decision engine.
//!
//! A pure, deterministic reducer over [`BossGameState`]:
//! - [`create_state`] starts a play-through from a scenario's initial meters
//! - [`resolve_decision`] applies one option of a current-month decision
//! - [`advance_month`] moves the month cursor and, after the last month,
//!   selects the ending with [`resolve_ending`]
//!
//! Every operation takes the state by reference and returns a new one, so a
//! failed call never leaves a half-applied state behind.

use game_core::{
    BossGameConfig, Decision, DecisionId, GameEnding, GameMeters, ModuleId, OptionId, Unlocks,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors produced by engine operations.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    /// Decision id is not part of the current month.
    #[error("decision {decision} not found in month index {month}")]
    DecisionNotFound { month: usize, decision: String },
    /// Option id is not part of the named decision.
    #[error("option {option} not found in decision {decision}")]
    OptionNotFound { decision: String, option: String },
    /// Option prerequisites are not granted by earlier decisions.
    #[error("option {option} is locked; missing tags {missing:?}")]
    OptionLocked { option: String, missing: Vec<String> },
    #[error("month index {month} has unresolved decisions {pending:?}")]
    MonthIncomplete { month: usize, pending: Vec<String> },
    #[error("play-through is already complete")]
    GameComplete,
    #[error("month index {0} is outside the scenario")]
    MonthOutOfRange(usize),
    /// No ending predicate matched; the scenario lacks a catch-all.
    #[error("no ending matched the final state")]
    NoEndingMatched,
    #[error("state does not belong to this scenario: {0}")]
    StateMismatch(String),
}

impl EngineError {
    /// Lookup failures signal a caller out of sync with the engine's month.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::DecisionNotFound { .. } | EngineError::OptionNotFound { .. }
        )
    }
}

/// One entry of the decision log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    /// Zero-based month index the decision belongs to.
    pub month: usize,
    pub decision: DecisionId,
    pub option: OptionId,
}

/// Where a play-through stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum GamePhase {
    Playing { month: usize },
    Complete { ending: GameEnding },
}

/// Runtime state of one play-through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BossGameState {
    module: ModuleId,
    meters: GameMeters,
    unlocks: Unlocks,
    /// Ordered by first answer; re-answers replace in place.
    decisions: Vec<DecisionRecord>,
    phase: GamePhase,
}

impl BossGameState {
    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    pub fn meters(&self) -> &GameMeters {
        &self.meters
    }

    pub fn unlocks(&self) -> &Unlocks {
        &self.unlocks
    }

    pub fn decisions(&self) -> &[DecisionRecord] {
        &self.decisions
    }

    /// Option chosen for a decision, if answered.
    pub fn chosen_option(&self, decision: &str) -> Option<&OptionId> {
        self.decisions
            .iter()
            .find(|r| r.decision.as_str() == decision)
            .map(|r| &r.option)
    }

    pub fn phase(&self) -> &GamePhase {
        &self.phase
    }

    /// Zero-based month index while playing; `None` once complete.
    pub fn current_month(&self) -> Option<usize> {
        match self.phase {
            GamePhase::Playing { month } => Some(month),
            GamePhase::Complete { .. } => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, GamePhase::Complete { .. })
    }

    pub fn ending(&self) -> Option<&GameEnding> {
        match &self.phase {
            GamePhase::Complete { ending } => Some(ending),
            GamePhase::Playing { .. } => None,
        }
    }

    fn playing_month(&self) -> Result<usize, EngineError> {
        self.current_month().ok_or(EngineError::GameComplete)
    }
}

/// Result of [`advance_month`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Advance {
    /// Cursor moved to `month`; `events` are special-event texts of the month just closed.
    NextMonth { month: usize, events: Vec<String> },
    /// Last month closed and an ending was selected.
    Completed {
        ending: GameEnding,
        events: Vec<String>,
    },
}

/// Fresh state at month 0 with the scenario's initial meters.
pub fn create_state(config: &BossGameConfig) -> BossGameState {
    BossGameState {
        module: config.id.clone(),
        meters: config.initial_meters,
        unlocks: Unlocks::new(),
        decisions: Vec::new(),
        phase: GamePhase::Playing { month: 0 },
    }
}

/// Apply `option_id` of `decision_id` in the current month.
///
/// Answering an already-answered decision replaces the earlier choice; meters
/// and unlocks are rebuilt from the initial meters (see [`replay`]) so only the
/// latest choice counts. Locked options and re-answers that would strand a
/// later choice's prerequisites are rejected.
pub fn resolve_decision(
    config: &BossGameConfig,
    state: &BossGameState,
    decision_id: &str,
    option_id: &str,
) -> Result<BossGameState, EngineError> {
    let month = state.playing_month()?;
    let current = config
        .month(month)
        .ok_or(EngineError::MonthOutOfRange(month))?;
    let decision = current
        .decision(decision_id)
        .ok_or_else(|| EngineError::DecisionNotFound {
            month,
            decision: decision_id.to_string(),
        })?;
    let option = decision
        .option(option_id)
        .ok_or_else(|| EngineError::OptionNotFound {
            decision: decision_id.to_string(),
            option: option_id.to_string(),
        })?;

    let mut log = state.decisions.clone();
    let reanswer = match log.iter_mut().find(|r| r.decision == decision.id) {
        Some(record) => {
            record.option = option.id.clone();
            true
        }
        None => {
            log.push(DecisionRecord {
                month,
                decision: decision.id.clone(),
                option: option.id.clone(),
            });
            false
        }
    };
    let (meters, unlocks) = replay(config, &log)?;
    debug!(
        decision = %decision.id,
        option = %option.id,
        reanswer,
        ?meters,
        "decision resolved"
    );

    Ok(BossGameState {
        module: state.module.clone(),
        meters,
        unlocks,
        decisions: log,
        phase: state.phase.clone(),
    })
}

/// Fold a decision log over the scenario's initial meters.
///
/// Entries are applied in scenario-declared order, whatever order they were
/// answered in. Each option must be available given the tags granted by the
/// decisions declared before it.
pub fn replay(
    config: &BossGameConfig,
    log: &[DecisionRecord],
) -> Result<(GameMeters, Unlocks), EngineError> {
    let mut steps = Vec::with_capacity(log.len());
    for record in log {
        let not_found = || EngineError::DecisionNotFound {
            month: record.month,
            decision: record.decision.0.clone(),
        };
        let (index, decision) = config
            .month(record.month)
            .ok_or_else(not_found)?
            .decisions
            .iter()
            .enumerate()
            .find(|(_, d)| d.id == record.decision)
            .ok_or_else(not_found)?;
        let option =
            decision
                .option(record.option.as_str())
                .ok_or_else(|| EngineError::OptionNotFound {
                    decision: record.decision.0.clone(),
                    option: record.option.0.clone(),
                })?;
        steps.push(((record.month, index), option));
    }
    steps.sort_by_key(|(position, _)| *position);

    let mut meters = config.initial_meters;
    let mut unlocks = Unlocks::new();
    for (_, option) in steps {
        let missing = unlocks.missing(&option.requires);
        if !missing.is_empty() {
            return Err(EngineError::OptionLocked {
                option: option.id.0.clone(),
                missing: missing.into_iter().map(str::to_string).collect(),
            });
        }
        meters = meters.apply_change(&option.changes);
        unlocks.extend(&option.unlocks);
    }
    Ok((meters, unlocks))
}

/// Decisions of the current month that have no recorded answer.
pub fn pending_decisions<'a>(
    config: &'a BossGameConfig,
    state: &BossGameState,
) -> Result<Vec<&'a Decision>, EngineError> {
    let month = state.playing_month()?;
    let current = config
        .month(month)
        .ok_or(EngineError::MonthOutOfRange(month))?;
    Ok(current
        .decisions
        .iter()
        .filter(|d| state.chosen_option(d.id.as_str()).is_none())
        .collect())
}

/// Close the current month.
///
/// Requires every decision of the month to be answered. After the last month
/// the ending is resolved and the state becomes terminal.
pub fn advance_month(
    config: &BossGameConfig,
    state: &BossGameState,
) -> Result<(BossGameState, Advance), EngineError> {
    let month = state.playing_month()?;
    let current = config
        .month(month)
        .ok_or(EngineError::MonthOutOfRange(month))?;
    let pending: Vec<String> = pending_decisions(config, state)?
        .into_iter()
        .map(|d| d.id.0.clone())
        .collect();
    if !pending.is_empty() {
        return Err(EngineError::MonthIncomplete { month, pending });
    }

    let events = current.special_event_texts(&state.meters, &state.unlocks);
    let mut next = state.clone();
    let outcome = if month + 1 < config.months.len() {
        next.phase = GamePhase::Playing { month: month + 1 };
        debug!(month = month + 1, "month advanced");
        Advance::NextMonth {
            month: month + 1,
            events,
        }
    } else {
        let ending = resolve_ending(&config.endings, &state.meters, &state.unlocks)?.clone();
        info!(
            module = %state.module,
            ending = %ending.id,
            trajectory = %ending.trajectory,
            "play-through complete"
        );
        next.phase = GamePhase::Complete {
            ending: ending.clone(),
        };
        Advance::Completed { ending, events }
    };
    Ok((next, outcome))
}

/// First ending, in declared order, whose conditions hold.
pub fn resolve_ending<'a>(
    endings: &'a [GameEnding],
    meters: &GameMeters,
    unlocks: &Unlocks,
) -> Result<&'a GameEnding, EngineError> {
    endings
        .iter()
        .find(|e| e.matches(meters, unlocks))
        .ok_or(EngineError::NoEndingMatched)
}

/// Check that a (restored) state is consistent with `config`.
///
/// The module id must match and the month cursor must be in range. Every
/// decision of a closed month must be answered exactly once, nothing past the
/// cursor may be answered, and the log must replay to the stored meters,
/// unlocks and (once complete) ending.
pub fn verify_state(config: &BossGameConfig, state: &BossGameState) -> Result<(), EngineError> {
    if state.module != config.id {
        return Err(EngineError::StateMismatch(format!(
            "state is for module {}, scenario is {}",
            state.module, config.id
        )));
    }
    let closed = match state.phase {
        GamePhase::Playing { month } if month >= config.months.len() => {
            return Err(EngineError::MonthOutOfRange(month));
        }
        GamePhase::Playing { month } => month,
        GamePhase::Complete { .. } => config.months.len(),
    };

    for (i, record) in state.decisions.iter().enumerate() {
        if state.current_month().is_some_and(|m| record.month > m) {
            return Err(EngineError::StateMismatch(format!(
                "decision {} is ahead of the month cursor",
                record.decision
            )));
        }
        if state.decisions[..i]
            .iter()
            .any(|r| r.decision == record.decision)
        {
            return Err(EngineError::StateMismatch(format!(
                "decision {} is answered twice",
                record.decision
            )));
        }
    }
    for month in &config.months[..closed] {
        if let Some(skipped) = month
            .decisions
            .iter()
            .find(|d| state.chosen_option(d.id.as_str()).is_none())
        {
            return Err(EngineError::StateMismatch(format!(
                "decision {} of closed month {} is unanswered",
                skipped.id, month.month
            )));
        }
    }

    let (meters, unlocks) = replay(config, &state.decisions)?;
    if meters != state.meters || unlocks != state.unlocks {
        return Err(EngineError::StateMismatch(
            "decision log does not reproduce stored meters".to_string(),
        ));
    }
    if let Some(stored) = state.ending() {
        let ending = resolve_ending(&config.endings, &meters, &unlocks)?;
        if ending != stored {
            return Err(EngineError::StateMismatch(format!(
                "stored ending {} does not match resolved ending {}",
                stored.id, ending.id
            )));
        }
    }
    Ok(())
}
