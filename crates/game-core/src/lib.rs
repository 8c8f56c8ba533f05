#![deny(warnings)]

//! Core domain models and invariants for boss-game scenarios.
//!
//! A scenario ([`BossGameConfig`]) is pure data: an ordered list of months,
//! each holding decisions whose options carry meter deltas and unlock tags,
//! plus an ordered list of endings selected by [`Condition`] predicates.
//! This crate defines those serializable types, the meter and unlock
//! arithmetic, and validation helpers that reject authoring defects.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

/// Lowest value any meter can hold.
pub const METER_MIN: i32 = 0;
/// Highest value any meter can hold.
pub const METER_MAX: i32 = 100;

/// Clamp a raw meter value into `[METER_MIN, METER_MAX]`.
pub fn clamp_meter(value: i32) -> i32 {
    value.clamp(METER_MIN, METER_MAX)
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Learning-module identifier a scenario is keyed by, e.g. "cash-flow-stress-test".
    ModuleId
);
string_id!(
    /// Stable identifier of a decision within a scenario.
    DecisionId
);
string_id!(
    /// Stable identifier of an option within a scenario.
    OptionId
);
string_id!(
    /// Stable identifier of an ending.
    EndingId
);

/// The five tracked meters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeterKind {
    /// Resource level / score proxy.
    Income,
    /// Efficiency or strategy-quality proxy.
    HourlyValue,
    /// Stress / capacity proxy.
    Energy,
    /// Vulnerability proxy; lower is better.
    Replaceability,
    /// Future-flexibility proxy.
    Optionality,
}

impl MeterKind {
    pub const ALL: [MeterKind; 5] = [
        MeterKind::Income,
        MeterKind::HourlyValue,
        MeterKind::Energy,
        MeterKind::Replaceability,
        MeterKind::Optionality,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MeterKind::Income => "income",
            MeterKind::HourlyValue => "hourlyValue",
            MeterKind::Energy => "energy",
            MeterKind::Replaceability => "replaceability",
            MeterKind::Optionality => "optionality",
        }
    }
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Five bounded meters, each in `[0, 100]` once produced by [`GameMeters::apply_change`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMeters {
    pub income: i32,
    pub hourly_value: i32,
    pub energy: i32,
    pub replaceability: i32,
    pub optionality: i32,
}

impl GameMeters {
    /// All five meters set to the same value.
    pub const fn uniform(value: i32) -> Self {
        Self {
            income: value,
            hourly_value: value,
            energy: value,
            replaceability: value,
            optionality: value,
        }
    }

    pub fn get(&self, kind: MeterKind) -> i32 {
        match kind {
            MeterKind::Income => self.income,
            MeterKind::HourlyValue => self.hourly_value,
            MeterKind::Energy => self.energy,
            MeterKind::Replaceability => self.replaceability,
            MeterKind::Optionality => self.optionality,
        }
    }

    fn get_mut(&mut self, kind: MeterKind) -> &mut i32 {
        match kind {
            MeterKind::Income => &mut self.income,
            MeterKind::HourlyValue => &mut self.hourly_value,
            MeterKind::Energy => &mut self.energy,
            MeterKind::Replaceability => &mut self.replaceability,
            MeterKind::Optionality => &mut self.optionality,
        }
    }

    /// Apply a change and clamp every field to `[0, 100]`.
    ///
    /// Deltas saturate before clamping, so arbitrarily large inputs are safe.
    /// Fields absent from `change` keep their (clamped) value.
    pub fn apply_change(&self, change: &MeterChange) -> GameMeters {
        let mut next = *self;
        for kind in MeterKind::ALL {
            let slot = next.get_mut(kind);
            let delta = change.get(kind).unwrap_or(0);
            *slot = clamp_meter(slot.saturating_add(delta));
        }
        next
    }

    /// True when every meter lies in `[0, 100]`.
    pub fn in_range(&self) -> bool {
        MeterKind::ALL
            .iter()
            .all(|k| (METER_MIN..=METER_MAX).contains(&self.get(*k)))
    }
}

/// Fold a change into meters; see [`GameMeters::apply_change`].
pub fn apply_change(meters: &GameMeters, change: &MeterChange) -> GameMeters {
    meters.apply_change(change)
}

/// Signed deltas for any subset of the five meters. Missing fields are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_value: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaceability: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optionality: Option<i32>,
}

impl MeterChange {
    pub fn get(&self, kind: MeterKind) -> Option<i32> {
        match kind {
            MeterKind::Income => self.income,
            MeterKind::HourlyValue => self.hourly_value,
            MeterKind::Energy => self.energy,
            MeterKind::Replaceability => self.replaceability,
            MeterKind::Optionality => self.optionality,
        }
    }

    /// Builder-style setter, handy for tests and generated content.
    pub fn with(mut self, kind: MeterKind, delta: i32) -> Self {
        let slot = match kind {
            MeterKind::Income => &mut self.income,
            MeterKind::HourlyValue => &mut self.hourly_value,
            MeterKind::Energy => &mut self.energy,
            MeterKind::Replaceability => &mut self.replaceability,
            MeterKind::Optionality => &mut self.optionality,
        };
        *slot = Some(delta);
        self
    }

    pub fn is_empty(&self) -> bool {
        MeterKind::ALL.iter().all(|k| self.get(*k).is_none())
    }
}

/// Accumulated narrative unlock tags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unlocks(BTreeSet<String>);

impl Unlocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set union with `tags`. Granting a present tag is a no-op.
    pub fn grant<I, S>(&self, tags: I) -> Unlocks
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut next = self.clone();
        next.extend(tags);
        next
    }

    pub fn extend<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            self.0.insert(tag.as_ref().to_string());
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// Tags from `required` that are not present.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|t| !self.contains(t))
            .map(String::as_str)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Unlocks {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut u = Unlocks::new();
        u.extend(iter);
        u
    }
}

/// Set union; see [`Unlocks::grant`].
pub fn grant<S: AsRef<str>>(unlocks: &Unlocks, tags: &[S]) -> Unlocks {
    unlocks.grant(tags)
}

/// True iff every prerequisite tag of `option` is present.
pub fn is_available(option: &DecisionOption, unlocks: &Unlocks) -> bool {
    option.is_available(unlocks)
}

/// Comparison operator used by meter conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn holds(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }
}

/// Predicate over final meters and unlocks.
///
/// In YAML: `always`, `{ has: tag }`, `{ lacks: tag }`,
/// `{ meter: { meter: energy, op: lt, value: 30 } }`, `{ all: [..] }`,
/// `{ any: [..] }`, `{ not: .. }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Always,
    Meter {
        meter: MeterKind,
        op: Comparison,
        value: i32,
    },
    Has(String),
    Lacks(String),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn meter(meter: MeterKind, op: Comparison, value: i32) -> Self {
        Condition::Meter { meter, op, value }
    }

    /// Evaluate without side effects.
    pub fn evaluate(&self, meters: &GameMeters, unlocks: &Unlocks) -> bool {
        match self {
            Condition::Always => true,
            Condition::Meter { meter, op, value } => op.holds(meters.get(*meter), *value),
            Condition::Has(tag) => unlocks.contains(tag),
            Condition::Lacks(tag) => !unlocks.contains(tag),
            Condition::All(cs) => cs.iter().all(|c| c.evaluate(meters, unlocks)),
            Condition::Any(cs) => cs.iter().any(|c| c.evaluate(meters, unlocks)),
            Condition::Not(c) => !c.evaluate(meters, unlocks),
        }
    }

    /// Syntactically true for every input. Conservative: `false` may still be a tautology.
    pub fn is_unconditional(&self) -> bool {
        match self {
            Condition::Always => true,
            Condition::All(cs) => cs.iter().all(Condition::is_unconditional),
            Condition::Any(cs) => cs.iter().any(Condition::is_unconditional),
            _ => false,
        }
    }
}

/// Closed set of decision categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionCategory {
    Work,
    Skill,
    Negotiation,
    Money,
}

/// Qualitative arc of an ending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trajectory {
    Stuck,
    Growing,
    Burnout,
    Momentum,
    Balanced,
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trajectory::Stuck => "stuck",
            Trajectory::Growing => "growing",
            Trajectory::Burnout => "burnout",
            Trajectory::Momentum => "momentum",
            Trajectory::Balanced => "balanced",
        };
        f.write_str(s)
    }
}

/// One selectable branch of a decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOption {
    pub id: OptionId,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Narrative shown after the option is picked.
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub changes: MeterChange,
    /// Tags granted when picked.
    #[serde(default)]
    pub unlocks: Vec<String>,
    /// Tags that must already be granted for the option to be offered.
    #[serde(default)]
    pub requires: Vec<String>,
}

impl DecisionOption {
    pub fn is_available(&self, unlocks: &Unlocks) -> bool {
        self.requires.iter().all(|t| unlocks.contains(t))
    }
}

/// A player-facing choice point with 2–3 options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: DecisionId,
    pub category: DecisionCategory,
    pub prompt: String,
    pub options: Vec<DecisionOption>,
}

impl Decision {
    pub fn option(&self, id: &str) -> Option<&DecisionOption> {
        self.options.iter().find(|o| o.id.as_str() == id)
    }

    /// Options whose prerequisites are satisfied, in declared order.
    pub fn available_options<'a, 'u>(
        &'a self,
        unlocks: &'u Unlocks,
    ) -> impl Iterator<Item = &'a DecisionOption> + 'u
    where
        'a: 'u,
    {
        self.options.iter().filter(move |o| o.is_available(unlocks))
    }
}

/// Flavor text shown at the close of a month when its condition holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialEvent {
    pub condition: Condition,
    pub text: String,
}

/// A chapter of the play-through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMonth {
    /// 1-based month number.
    pub month: u32,
    pub title: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub outro: String,
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub special_events: Vec<SpecialEvent>,
}

impl GameMonth {
    pub fn decision(&self, id: &str) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.id.as_str() == id)
    }

    pub fn special_event_texts(&self, meters: &GameMeters, unlocks: &Unlocks) -> Vec<String> {
        self.special_events
            .iter()
            .filter(|e| e.condition.evaluate(meters, unlocks))
            .map(|e| e.text.clone())
            .collect()
    }
}

/// Terminal narrative outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEnding {
    pub id: EndingId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub snapshot: String,
    pub trajectory: Trajectory,
    pub conditions: Condition,
}

impl GameEnding {
    pub fn matches(&self, meters: &GameMeters, unlocks: &Unlocks) -> bool {
        self.conditions.evaluate(meters, unlocks)
    }
}

/// A complete boss-game scenario for one learning module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BossGameConfig {
    pub id: ModuleId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub initial_meters: GameMeters,
    pub months: Vec<GameMonth>,
    /// Evaluated in declared order; first match wins.
    pub endings: Vec<GameEnding>,
}

impl BossGameConfig {
    pub fn month(&self, index: usize) -> Option<&GameMonth> {
        self.months.get(index)
    }

    /// Find a decision anywhere in the scenario.
    pub fn find_decision(&self, id: &str) -> Option<(usize, &Decision)> {
        self.months
            .iter()
            .enumerate()
            .find_map(|(i, m)| m.decision(id).map(|d| (i, d)))
    }

    pub fn decision_count(&self) -> usize {
        self.months.iter().map(|m| m.decisions.len()).sum()
    }
}

/// Validation errors for scenario authoring defects.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("scenario {0} has no months")]
    NoMonths(String),
    #[error("month {0} has no decisions")]
    EmptyMonth(u32),
    #[error("month numbers must run 1..=n in order: expected {expected}, found {found}")]
    MonthOutOfOrder { expected: u32, found: u32 },
    #[error("decision {decision} has {count} options; expected 2 or 3")]
    OptionCount { decision: String, count: usize },
    #[error("blank {0} identifier")]
    BlankId(&'static str),
    #[error("duplicate decision id: {0}")]
    DuplicateDecision(String),
    #[error("duplicate option id: {0}")]
    DuplicateOption(String),
    #[error("duplicate ending id: {0}")]
    DuplicateEnding(String),
    #[error("initial meter {meter} = {value} is outside [0, 100]")]
    MeterOutOfRange { meter: MeterKind, value: i32 },
    #[error("option {option} requires tag {tag:?} that no earlier option grants")]
    DeadOption { option: String, tag: String },
    #[error("decision {0} has no option without prerequisites")]
    NoOpenOption(String),
    #[error("ending list has no unconditional catch-all")]
    NoCatchAllEnding,
    #[error("ending {0} is listed after the catch-all and can never be selected")]
    UnreachableEnding(String),
}

/// Validate starting meters.
pub fn validate_meters(m: &GameMeters) -> Result<(), ValidationError> {
    for kind in MeterKind::ALL {
        let value = m.get(kind);
        if !(METER_MIN..=METER_MAX).contains(&value) {
            return Err(ValidationError::MeterOutOfRange { meter: kind, value });
        }
    }
    Ok(())
}

/// Validate the ending list: unique ids, a catch-all, and nothing after it.
pub fn validate_endings(endings: &[GameEnding]) -> Result<(), ValidationError> {
    let mut ids = HashSet::new();
    let mut catch_all_seen = false;
    for e in endings {
        if e.id.0.trim().is_empty() {
            return Err(ValidationError::BlankId("ending"));
        }
        if !ids.insert(e.id.as_str()) {
            return Err(ValidationError::DuplicateEnding(e.id.0.clone()));
        }
        if catch_all_seen {
            return Err(ValidationError::UnreachableEnding(e.id.0.clone()));
        }
        catch_all_seen = e.conditions.is_unconditional();
    }
    if !catch_all_seen {
        return Err(ValidationError::NoCatchAllEnding);
    }
    Ok(())
}

/// Validate a scenario, including cross-references like unlock prerequisites.
pub fn validate_config(config: &BossGameConfig) -> Result<(), ValidationError> {
    if config.id.0.trim().is_empty() {
        return Err(ValidationError::BlankId("module"));
    }
    if config.months.is_empty() {
        return Err(ValidationError::NoMonths(config.id.0.clone()));
    }
    validate_meters(&config.initial_meters)?;

    let mut decision_ids: HashSet<&str> = HashSet::new();
    let mut option_ids: HashSet<&str> = HashSet::new();
    // Tags granted by decisions strictly before the one being checked.
    let mut granted: BTreeSet<&str> = BTreeSet::new();

    for (i, month) in config.months.iter().enumerate() {
        let expected = i as u32 + 1;
        if month.month != expected {
            return Err(ValidationError::MonthOutOfOrder {
                expected,
                found: month.month,
            });
        }
        if month.decisions.is_empty() {
            return Err(ValidationError::EmptyMonth(month.month));
        }
        for d in &month.decisions {
            if d.id.0.trim().is_empty() {
                return Err(ValidationError::BlankId("decision"));
            }
            if !decision_ids.insert(d.id.as_str()) {
                return Err(ValidationError::DuplicateDecision(d.id.0.clone()));
            }
            if !(2..=3).contains(&d.options.len()) {
                return Err(ValidationError::OptionCount {
                    decision: d.id.0.clone(),
                    count: d.options.len(),
                });
            }
            for o in &d.options {
                if o.id.0.trim().is_empty() {
                    return Err(ValidationError::BlankId("option"));
                }
                if !option_ids.insert(o.id.as_str()) {
                    return Err(ValidationError::DuplicateOption(o.id.0.clone()));
                }
                if let Some(tag) = o.requires.iter().find(|t| !granted.contains(t.as_str())) {
                    return Err(ValidationError::DeadOption {
                        option: o.id.0.clone(),
                        tag: tag.clone(),
                    });
                }
            }
            if d.options.iter().all(|o| !o.requires.is_empty()) {
                return Err(ValidationError::NoOpenOption(d.id.0.clone()));
            }
            for o in &d.options {
                granted.extend(o.unlocks.iter().map(String::as_str));
            }
        }
    }

    validate_endings(&config.endings)
}
