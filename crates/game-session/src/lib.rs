#![deny(warnings)]

//! Session layer: one player's play-through of one scenario.
//!
//! Drives the engine one input at a time, checkpoints to a [`SaveStore`]
//! after each month, and reports what happened as a list of
//! [`SessionEvent`]s returned from every call.

use game_core::{BossGameConfig, Decision, GameEnding, GameMeters};
use game_engine::{
    advance_month, create_state, pending_decisions, resolve_decision, verify_state, Advance,
    BossGameState, EngineError,
};
use persistence::{PersistError, SaveStore};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Something the presentation layer should show.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SessionEvent {
    /// A saved play-through was picked up.
    Resumed { decisions: usize },
    MonthStarted {
        month: usize,
        title: String,
        intro: String,
    },
    DecisionResolved {
        decision: String,
        option: String,
        feedback: String,
        meters: GameMeters,
    },
    SpecialEvent { text: String },
    GameCompleted { ending: GameEnding },
    Checkpointed { key: String },
}

/// Session options.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Save slot; defaults to the scenario's module id.
    pub save_key: Option<String>,
    /// Checkpoint after every month.
    pub autosave: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_key: None,
            autosave: true,
        }
    }
}

pub struct Session<'c> {
    scenario: &'c BossGameConfig,
    state: BossGameState,
    store: Option<SaveStore>,
    key: String,
    autosave: bool,
}

impl<'c> Session<'c> {
    /// Resume the saved play-through for this scenario, or start a fresh one.
    ///
    /// A save that cannot be read, or no longer replays against the scenario,
    /// is discarded.
    pub fn start(
        scenario: &'c BossGameConfig,
        store: Option<SaveStore>,
        config: SessionConfig,
    ) -> Result<(Self, Vec<SessionEvent>), SessionError> {
        let key = config
            .save_key
            .unwrap_or_else(|| scenario.id.0.clone());
        let mut events = Vec::new();

        let saved = match store.as_ref().map(|s| s.load(&key)) {
            Some(Ok(record)) => record,
            Some(Err(e @ (PersistError::Corrupt { .. } | PersistError::SchemaMismatch { .. }))) => {
                warn!(key = %key, error = %e, "discarding unreadable save");
                None
            }
            Some(Err(e)) => return Err(e.into()),
            None => None,
        };
        let state = match saved {
            Some(record) => match verify_state(scenario, &record.state) {
                Ok(()) => {
                    info!(key = %key, saved_at = %record.saved_at, "resuming play-through");
                    events.push(SessionEvent::Resumed {
                        decisions: record.state.decisions().len(),
                    });
                    record.state
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "discarding stale save");
                    create_state(scenario)
                }
            },
            None => create_state(scenario),
        };

        let session = Self {
            scenario,
            state,
            store,
            key,
            autosave: config.autosave,
        };
        match (session.state.current_month(), session.state.ending()) {
            (Some(month), _) => events.push(session.month_started(month)),
            (None, Some(ending)) => events.push(SessionEvent::GameCompleted {
                ending: ending.clone(),
            }),
            (None, None) => {}
        }
        Ok((session, events))
    }

    pub fn scenario(&self) -> &BossGameConfig {
        self.scenario
    }

    pub fn state(&self) -> &BossGameState {
        &self.state
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Unanswered decisions of the current month.
    pub fn pending(&self) -> Result<Vec<&'c Decision>, SessionError> {
        Ok(pending_decisions(self.scenario, &self.state)?)
    }

    /// Answer (or re-answer) a decision of the current month.
    pub fn choose(
        &mut self,
        decision: &str,
        option: &str,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        let next = resolve_decision(self.scenario, &self.state, decision, option)?;
        let feedback = self
            .scenario
            .find_decision(decision)
            .and_then(|(_, d)| d.option(option))
            .map(|o| o.feedback.clone())
            .unwrap_or_default();
        self.state = next;
        Ok(vec![SessionEvent::DecisionResolved {
            decision: decision.to_string(),
            option: option.to_string(),
            feedback,
            meters: *self.state.meters(),
        }])
    }

    /// Close the current month, then checkpoint if autosave is on.
    pub fn advance(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        let (next, advance) = advance_month(self.scenario, &self.state)?;
        self.state = next;

        let mut events = Vec::new();
        match advance {
            Advance::NextMonth { month, events: fired } => {
                events.extend(fired.into_iter().map(|text| SessionEvent::SpecialEvent { text }));
                events.push(self.month_started(month));
            }
            Advance::Completed {
                ending,
                events: fired,
            } => {
                events.extend(fired.into_iter().map(|text| SessionEvent::SpecialEvent { text }));
                events.push(SessionEvent::GameCompleted { ending });
            }
        }

        if self.autosave {
            // A lost write only costs the player this month's progress.
            match self.checkpoint() {
                Ok(true) => events.push(SessionEvent::Checkpointed {
                    key: self.key.clone(),
                }),
                Ok(false) => {}
                Err(e) => warn!(key = %self.key, error = %e, "checkpoint failed"),
            }
        }
        Ok(events)
    }

    /// Save the current state. Returns `false` when the session has no store.
    pub fn checkpoint(&self) -> Result<bool, SessionError> {
        match &self.store {
            Some(store) => {
                store.save(&self.key, &self.state)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop any save and start over from the scenario's initial meters.
    pub fn reset(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        if let Some(store) = &self.store {
            store.delete(&self.key)?;
        }
        self.state = create_state(self.scenario);
        info!(key = %self.key, "session reset");
        Ok(vec![self.month_started(0)])
    }

    fn month_started(&self, month: usize) -> SessionEvent {
        let (title, intro) = self
            .scenario
            .month(month)
            .map(|m| (m.title.clone(), m.intro.clone()))
            .unwrap_or_default();
        SessionEvent::MonthStarted {
            month,
            title,
            intro,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use content::ContentStore;

    const PERFECT: [(&str, &str); 5] = [
        ("phase1-bonus", "save-bonus"),
        ("phase2-emergency", "use-fund"),
        ("phase3-budget", "spend-adjust"),
        ("phase4-raise", "increase-savings"),
        ("phase4-market", "stay-course"),
    ];

    fn play_month(session: &mut Session<'_>) -> Vec<SessionEvent> {
        let pending: Vec<String> = session
            .pending()
            .unwrap()
            .iter()
            .map(|d| d.id.0.clone())
            .collect();
        for d in pending {
            let (_, option) = PERFECT.iter().find(|(id, _)| *id == d).unwrap();
            session.choose(&d, option).unwrap();
        }
        session.advance().unwrap()
    }

    #[test]
    fn fresh_session_announces_first_month() {
        let content = ContentStore::builtin().unwrap();
        let cfg = content.get("cash-flow-stress-test").unwrap();
        let (session, events) = Session::start(cfg, None, SessionConfig::default()).unwrap();
        assert_eq!(session.key(), "cash-flow-stress-test");
        assert!(matches!(
            &events[..],
            [SessionEvent::MonthStarted { month: 0, title, .. }] if title == "The Bonus"
        ));
    }

    #[test]
    fn choose_reports_feedback_and_meters() {
        let content = ContentStore::builtin().unwrap();
        let cfg = content.get("cash-flow-stress-test").unwrap();
        let (mut session, _) = Session::start(cfg, None, SessionConfig::default()).unwrap();
        let events = session.choose("phase1-bonus", "save-bonus").unwrap();
        match &events[0] {
            SessionEvent::DecisionResolved {
                feedback, meters, ..
            } => {
                assert!(feedback.starts_with("Boring today"));
                assert_eq!(meters.income, 80);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(session.choose("phase2-emergency", "use-fund").is_err());
    }

    #[test]
    fn checkpoint_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::builtin().unwrap();
        let cfg = content.get("cash-flow-stress-test").unwrap();

        let store = SaveStore::open(dir.path()).unwrap();
        let (mut session, _) =
            Session::start(cfg, Some(store.clone()), SessionConfig::default()).unwrap();
        let events = play_month(&mut session);
        assert!(events.contains(&SessionEvent::Checkpointed {
            key: "cash-flow-stress-test".into()
        }));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::SpecialEvent { .. })));
        let meters = *session.state().meters();
        drop(session);

        let (resumed, events) = Session::start(cfg, Some(store), SessionConfig::default()).unwrap();
        assert_eq!(events[0], SessionEvent::Resumed { decisions: 1 });
        assert!(matches!(events[1], SessionEvent::MonthStarted { month: 1, .. }));
        assert_eq!(*resumed.state().meters(), meters);
    }

    #[test]
    fn full_session_reaches_perfect_win() {
        let content = ContentStore::builtin().unwrap();
        let cfg = content.get("cash-flow-stress-test").unwrap();
        let (mut session, _) = Session::start(cfg, None, SessionConfig::default()).unwrap();
        let mut last = Vec::new();
        while !session.state().is_complete() {
            last = play_month(&mut session);
        }
        let ending = last.iter().find_map(|e| match e {
            SessionEvent::GameCompleted { ending } => Some(ending.id.as_str()),
            _ => None,
        });
        assert_eq!(ending, Some("perfect-win"));
        // no store, so no checkpoint events
        assert!(!last
            .iter()
            .any(|e| matches!(e, SessionEvent::Checkpointed { .. })));
    }

    #[test]
    fn stale_save_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::builtin().unwrap();
        let cash = content.get("cash-flow-stress-test").unwrap();
        let raise = content.get("raise-negotiation").unwrap();
        let store = SaveStore::open(dir.path()).unwrap();

        // A raise-negotiation state parked under the cash-flow slot.
        store.save("cash-flow-stress-test", &create_state(raise)).unwrap();
        let (session, events) =
            Session::start(cash, Some(store), SessionConfig::default()).unwrap();
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Resumed { .. })));
        assert_eq!(session.state().module().as_str(), "cash-flow-stress-test");
    }

    #[test]
    fn unreadable_save_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::builtin().unwrap();
        let cfg = content.get("cash-flow-stress-test").unwrap();
        let store = SaveStore::open(dir.path()).unwrap();
        let path = dir.path().join("cash-flow-stress-test.json");

        std::fs::write(&path, b"{truncated").unwrap();
        let (session, events) =
            Session::start(cfg, Some(store.clone()), SessionConfig::default()).unwrap();
        assert!(matches!(events[..], [SessionEvent::MonthStarted { month: 0, .. }]));
        assert!(session.checkpoint().unwrap());
        assert!(store.load("cash-flow-stress-test").unwrap().is_some());

        let mut v: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        v["schemaVersion"] = serde_json::json!(99);
        std::fs::write(&path, serde_json::to_vec(&v).unwrap()).unwrap();
        let (session, events) = Session::start(cfg, Some(store), SessionConfig::default()).unwrap();
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Resumed { .. })));
        assert!(session.state().decisions().is_empty());
    }

    #[test]
    fn reset_deletes_save() {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::builtin().unwrap();
        let cfg = content.get("cash-flow-stress-test").unwrap();
        let store = SaveStore::open(dir.path()).unwrap();
        let config = SessionConfig {
            save_key: Some("slot-a".into()),
            autosave: true,
        };
        let (mut session, _) = Session::start(cfg, Some(store.clone()), config).unwrap();
        play_month(&mut session);
        assert!(store.load("slot-a").unwrap().is_some());

        let events = session.reset().unwrap();
        assert!(store.load("slot-a").unwrap().is_none());
        assert!(matches!(events[0], SessionEvent::MonthStarted { month: 0, .. }));
        assert!(session.state().decisions().is_empty());
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let e = SessionEvent::SpecialEvent { text: "hi".into() };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["kind"], "specialEvent");
    }
}
