//! Rule Application Engine
//!
//! Folds the active rule set over the current selection into a per-item state map.
//!
//! Rules run in ascending priority order (ties keep declaration order). Availability rules
//! are applied first so that gift rules see which selected items are still available.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    cart::Selection,
    items::{Catalog, ItemId},
    rules::{GiftSettings, RuleAction, RuleId, RuleKind, SelectionRule},
};

/// Default iteration cap for [`EvaluationStrategy::FixedPoint`].
pub const DEFAULT_MAX_ITERATIONS: usize = 8;

/// How the engine reaches a final item state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvaluationStrategy {
    /// One availability pass followed by one gift pass.
    #[default]
    TwoPass,

    /// Repeat the two passes, dropping newly blocked items from the selection, until no more
    /// selected items become blocked or the iteration cap is reached.
    FixedPoint {
        /// Maximum number of passes before giving up on settling
        max_iterations: usize,
    },
}

/// Engine settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSettings {
    /// Evaluation strategy
    pub strategy: EvaluationStrategy,
}

/// Derived state of one catalog item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemState {
    /// Item id
    pub item_id: ItemId,

    /// Whether the item can be selected
    pub is_available: bool,

    /// Whether the item is free
    pub is_gift: bool,

    /// Gift presentation, set together with `is_gift`
    pub gift_settings: Option<GiftSettings>,

    /// Rules whose condition held and that target this item, in application order
    pub applied_rules: Vec<RuleId>,

    /// Rule that last disabled the item, cleared when a later rule enables it
    pub blocked_by: Option<RuleId>,
}

impl ItemState {
    /// Available, not a gift, untouched by any rule.
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            is_available: true,
            is_gift: false,
            gift_settings: None,
            applied_rules: Vec::new(),
            blocked_by: None,
        }
    }

    fn record(&mut self, rule: &RuleId) {
        if !self.applied_rules.contains(rule) {
            self.applied_rules.push(rule.clone());
        }
    }
}

/// Output of one engine evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RulesEvaluation {
    /// State of every catalog item
    pub item_states: FxHashMap<ItemId, ItemState>,

    /// Rules whose condition held, in application order
    pub applied_rules: Vec<RuleId>,
}

impl RulesEvaluation {
    /// Everything available, nothing a gift.
    pub fn with_catalog(catalog: &Catalog<'_>) -> Self {
        Self {
            item_states: catalog
                .iter()
                .map(|item| (item.id.clone(), ItemState::new(item.id.clone())))
                .collect(),
            applied_rules: Vec::new(),
        }
    }

    /// State of an item, if it is in the catalog.
    pub fn item_state(&self, id: &str) -> Option<&ItemState> {
        self.item_states.get(id)
    }

    /// Whether an item can be selected. Items without state are available.
    pub fn is_available(&self, id: &str) -> bool {
        self.item_state(id).is_none_or(|state| state.is_available)
    }

    /// Whether an item is a gift.
    pub fn is_gift(&self, id: &str) -> bool {
        self.item_state(id).is_some_and(|state| state.is_gift)
    }

    /// Ids of all gift items.
    pub fn gift_item_ids(&self) -> FxHashSet<ItemId> {
        self.item_states
            .values()
            .filter(|state| state.is_gift)
            .map(|state| state.item_id.clone())
            .collect()
    }

    /// Ids of all unavailable items.
    pub fn unavailable_item_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.item_states
            .values()
            .filter(|state| !state.is_available)
            .map(|state| &state.item_id)
    }

    fn record_rule(&mut self, rule: &RuleId) {
        if !self.applied_rules.contains(rule) {
            self.applied_rules.push(rule.clone());
        }
    }

    fn target_state(&mut self, rule: &SelectionRule, target: &ItemId) -> Option<&mut ItemState> {
        let state = self.item_states.get_mut(target.as_str());

        if state.is_none() {
            warn!(
                rule = %rule.id,
                item = %target,
                "rule targets an item that is not in the catalog; skipping"
            );
        }

        state
    }
}

/// Rule Application Engine
#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    rules: Vec<SelectionRule>,
    settings: EngineSettings,
}

impl RulesEngine {
    /// Create an engine over the active subset of `rules`, ordered by priority.
    ///
    /// Rules of an unknown kind are dropped with a warning.
    pub fn new(rules: impl IntoIterator<Item = SelectionRule>) -> Self {
        let mut rules: Vec<SelectionRule> = rules
            .into_iter()
            .filter(|rule| rule.active && is_known_kind(rule))
            .collect();

        // `sort_by_key` is stable, so equal priorities keep declaration order.
        rules.sort_by_key(|rule| rule.priority);

        Self {
            rules,
            settings: EngineSettings::default(),
        }
    }

    /// Replace the engine settings.
    #[must_use]
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Active rules in evaluation order.
    pub fn rules(&self) -> &[SelectionRule] {
        &self.rules
    }

    /// Look up an active rule by id.
    pub fn rule(&self, id: &str) -> Option<&SelectionRule> {
        self.rules.iter().find(|rule| rule.id.as_str() == id)
    }

    /// Engine settings
    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Evaluate every active rule against the selection.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(rules = self.rules.len(), selected = selection.len())
    )]
    pub fn evaluate(&self, catalog: &Catalog<'_>, selection: &Selection) -> RulesEvaluation {
        match self.settings.strategy {
            EvaluationStrategy::TwoPass => self.evaluate_pass(catalog, selection),
            EvaluationStrategy::FixedPoint { max_iterations } => {
                self.evaluate_fixed_point(catalog, selection, max_iterations)
            }
        }
    }

    fn evaluate_pass(&self, catalog: &Catalog<'_>, selection: &Selection) -> RulesEvaluation {
        let mut evaluation = RulesEvaluation::with_catalog(catalog);

        for rule in &self.rules {
            if rule.kind == RuleKind::Availability && is_applicable(rule) {
                apply_availability_rule(rule, selection, &mut evaluation);
            }
        }

        // Gift rules only see selected items that survived the availability pass.
        let available = selection.retain(|id| evaluation.is_available(id.as_str()));

        for rule in &self.rules {
            if rule.kind == RuleKind::GiftTransformation && is_applicable(rule) {
                apply_gift_rule(rule, &available, &mut evaluation);
            }
        }

        evaluation
    }

    fn evaluate_fixed_point(
        &self,
        catalog: &Catalog<'_>,
        selection: &Selection,
        max_iterations: usize,
    ) -> RulesEvaluation {
        let mut effective = selection.clone();
        let mut dropped: FxHashMap<ItemId, ItemState> = FxHashMap::default();
        let mut evaluation = self.evaluate_pass(catalog, &effective);

        for iteration in 1..max_iterations.max(1) {
            let blocked: Vec<ItemId> = effective
                .ids()
                .filter(|id| !evaluation.is_available(id.as_str()))
                .cloned()
                .collect();

            if blocked.is_empty() {
                return with_dropped(evaluation, dropped);
            }

            debug!(iteration, blocked = blocked.len(), "dropping blocked items and re-evaluating");

            for id in &blocked {
                if let Some(state) = evaluation.item_states.get(id.as_str()) {
                    dropped.insert(id.clone(), state.clone());
                }
            }

            effective = effective.retain(|id| !blocked.contains(id));
            evaluation = self.evaluate_pass(catalog, &effective);
        }

        let settled = effective
            .ids()
            .all(|id| evaluation.is_available(id.as_str()));

        if !settled {
            warn!(max_iterations, "rule evaluation did not settle; using the last pass");
        }

        with_dropped(evaluation, dropped)
    }
}

/// Items dropped from the selection in an earlier pass keep the state that blocked them.
fn with_dropped(
    mut evaluation: RulesEvaluation,
    dropped: FxHashMap<ItemId, ItemState>,
) -> RulesEvaluation {
    for (id, state) in dropped {
        evaluation.item_states.insert(id, state);
    }

    evaluation
}

fn is_known_kind(rule: &SelectionRule) -> bool {
    if rule.kind == RuleKind::Unknown {
        warn!(rule = %rule.id, "unknown rule kind; skipping");
        return false;
    }

    true
}

/// Check the kind/action pairing, warning about rules that can never do anything.
fn is_applicable(rule: &SelectionRule) -> bool {
    let supported = matches!(
        (rule.kind, rule.action),
        (RuleKind::Availability, RuleAction::Disable | RuleAction::Enable)
            | (RuleKind::GiftTransformation, RuleAction::MakeGift)
    );

    if !supported {
        warn!(
            rule = %rule.id,
            kind = ?rule.kind,
            action = ?rule.action,
            "unsupported rule action; skipping"
        );
    }

    supported
}

fn apply_availability_rule(
    rule: &SelectionRule,
    selection: &Selection,
    evaluation: &mut RulesEvaluation,
) {
    if !rule.condition.is_satisfied(selection) {
        return;
    }

    evaluation.record_rule(&rule.id);

    for target in &rule.target_items {
        let Some(state) = evaluation.target_state(rule, target) else {
            continue;
        };

        state.record(&rule.id);

        if rule.action == RuleAction::Disable {
            state.is_available = false;
            state.blocked_by = Some(rule.id.clone());
        } else {
            state.is_available = true;
            state.blocked_by = None;
        }

        debug!(rule = %rule.id, item = %target, available = state.is_available, "availability rule applied");
    }
}

fn apply_gift_rule(rule: &SelectionRule, selection: &Selection, evaluation: &mut RulesEvaluation) {
    if !rule.condition.is_satisfied(selection) {
        return;
    }

    evaluation.record_rule(&rule.id);

    for target in &rule.target_items {
        let Some(state) = evaluation.target_state(rule, target) else {
            continue;
        };

        state.record(&rule.id);

        if !selection.contains(target.as_str()) {
            continue;
        }

        state.is_gift = true;
        state.gift_settings = Some(rule.gift_settings.clone().unwrap_or_default());

        debug!(rule = %rule.id, item = %target, "gift rule applied");
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::{Money, iso::BRL};
    use testresult::TestResult;

    use super::*;
    use crate::{
        items::{Item, ItemCategory},
        rules::Condition,
    };

    fn catalog<'a>() -> Result<Catalog<'a>, crate::items::CatalogError> {
        Catalog::new(
            ["a", "b", "c", "x", "y"].map(|id| {
                Item::new(id, id, ItemCategory::Service, Money::from_minor(10_000, BRL))
            }),
            BRL,
        )
    }

    fn selection(ids: &[&str]) -> Selection {
        Selection::from_pairs(
            ids.iter()
                .map(|id| (ItemId::from(*id), ItemCategory::Service)),
        )
    }

    fn always() -> Condition {
        Condition::MinSelectionCount {
            value: 0,
            categories: Vec::new(),
        }
    }

    fn when_selected(id: &str) -> Condition {
        Condition::SpecificItems {
            specific_items: vec![ItemId::from(id)],
        }
    }

    #[test]
    fn no_rules_leaves_everything_available() -> TestResult {
        let evaluation = RulesEngine::default().evaluate(&catalog()?, &selection(&["a"]));

        assert!(evaluation.item_states.values().all(|s| s.is_available && !s.is_gift));
        assert!(evaluation.applied_rules.is_empty());
        assert_eq!(evaluation.item_states.len(), 5);

        Ok(())
    }

    #[test]
    fn disable_rule_blocks_targets_and_records_trace() -> TestResult {
        let engine = RulesEngine::new([SelectionRule::availability(
            "r1",
            1,
            when_selected("a"),
            RuleAction::Disable,
            ["b"],
        )]);

        let evaluation = engine.evaluate(&catalog()?, &selection(&["a"]));
        let state = evaluation.item_state("b");

        assert!(!evaluation.is_available("b"));
        assert_eq!(state.and_then(|s| s.blocked_by.clone()), Some(RuleId::from("r1")));
        assert_eq!(state.map(|s| s.applied_rules.clone()), Some(vec![RuleId::from("r1")]));
        assert_eq!(evaluation.applied_rules, vec![RuleId::from("r1")]);

        Ok(())
    }

    #[test]
    fn later_enable_overrides_earlier_disable() -> TestResult {
        let engine = RulesEngine::new([
            SelectionRule::availability("enable-y", 2, when_selected("x"), RuleAction::Enable, ["y"]),
            SelectionRule::availability("disable-y", 1, always(), RuleAction::Disable, ["y"]),
        ]);

        let without_x = engine.evaluate(&catalog()?, &selection(&["y"]));
        let with_x = engine.evaluate(&catalog()?, &selection(&["x", "y"]));

        assert!(!without_x.is_available("y"));
        assert!(with_x.is_available("y"));
        assert_eq!(with_x.item_state("y").and_then(|s| s.blocked_by.clone()), None);

        Ok(())
    }

    #[test]
    fn equal_priorities_keep_declaration_order() -> TestResult {
        let engine = RulesEngine::new([
            SelectionRule::availability("first", 1, always(), RuleAction::Enable, ["a"]),
            SelectionRule::availability("second", 1, always(), RuleAction::Disable, ["a"]),
        ]);

        let evaluation = engine.evaluate(&catalog()?, &Selection::default());

        assert!(!evaluation.is_available("a"));
        assert_eq!(
            evaluation.applied_rules,
            vec![RuleId::from("first"), RuleId::from("second")]
        );

        Ok(())
    }

    #[test]
    fn inactive_rules_are_ignored() -> TestResult {
        let engine = RulesEngine::new([SelectionRule::availability(
            "r1",
            1,
            always(),
            RuleAction::Disable,
            ["a"],
        )
        .inactive()]);

        assert!(engine.rules().is_empty());
        assert!(engine.evaluate(&catalog()?, &Selection::default()).is_available("a"));

        Ok(())
    }

    #[test]
    fn gift_rule_only_marks_selected_targets() -> TestResult {
        let engine = RulesEngine::new([SelectionRule::gift("g", 1, when_selected("a"), ["b", "c"])]);

        let evaluation = engine.evaluate(&catalog()?, &selection(&["a", "b"]));

        assert!(evaluation.is_gift("b"));
        assert!(!evaluation.is_gift("c"));
        assert_eq!(
            evaluation.item_state("c").map(|s| s.applied_rules.clone()),
            Some(vec![RuleId::from("g")])
        );
        assert_eq!(
            evaluation.item_state("b").and_then(|s| s.gift_settings.clone()),
            Some(GiftSettings::default())
        );

        Ok(())
    }

    #[test]
    fn gift_rules_skip_items_blocked_in_the_same_pass() -> TestResult {
        let engine = RulesEngine::new([
            SelectionRule::availability("block-b", 1, when_selected("x"), RuleAction::Disable, ["b"]),
            SelectionRule::gift("gift-b", 2, when_selected("a"), ["b"]),
        ]);

        let evaluation = engine.evaluate(&catalog()?, &selection(&["a", "b", "x"]));

        assert!(!evaluation.is_available("b"));
        assert!(!evaluation.is_gift("b"));

        Ok(())
    }

    #[test]
    fn dangling_targets_and_unknown_actions_are_skipped() -> TestResult {
        let engine = RulesEngine::new([
            SelectionRule::availability("ghost", 1, always(), RuleAction::Disable, ["nope", "a"]),
            SelectionRule::availability("odd", 2, always(), RuleAction::Unknown, ["b"]),
            SelectionRule::availability("bad-cond", 3, Condition::Unknown, RuleAction::Disable, ["c"]),
        ]);

        let evaluation = engine.evaluate(&catalog()?, &Selection::default());

        assert!(!evaluation.is_available("a"));
        assert!(evaluation.is_available("b"));
        assert!(evaluation.is_available("c"));
        assert!(evaluation.item_state("nope").is_none());
        assert_eq!(evaluation.applied_rules, vec![RuleId::from("ghost")]);

        Ok(())
    }

    #[test]
    fn unknown_rule_kinds_are_dropped() -> TestResult {
        let mut future = SelectionRule::availability("future", 1, always(), RuleAction::Disable, ["a"]);
        future.kind = RuleKind::Unknown;

        let engine = RulesEngine::new([
            future,
            SelectionRule::availability("known", 2, always(), RuleAction::Disable, ["b"]),
        ]);

        let evaluation = engine.evaluate(&catalog()?, &Selection::default());

        assert!(engine.rule("future").is_none());
        assert_eq!(engine.rules().len(), 1);
        assert!(evaluation.is_available("a"));
        assert!(!evaluation.is_available("b"));

        Ok(())
    }

    #[test]
    fn evaluation_is_idempotent() -> TestResult {
        let engine = RulesEngine::new([
            SelectionRule::availability("r1", 1, when_selected("a"), RuleAction::Disable, ["b"]),
            SelectionRule::gift("g", 2, when_selected("a"), ["c"]),
        ]);

        let catalog = catalog()?;
        let selected = selection(&["a", "c"]);

        assert_eq!(engine.evaluate(&catalog, &selected), engine.evaluate(&catalog, &selected));

        Ok(())
    }

    #[test]
    fn fixed_point_propagates_chained_blocks() -> TestResult {
        // "y" is only offered alongside "x"; "x" conflicts with "a".
        let rules = [
            SelectionRule::availability("x-conflicts-a", 1, when_selected("a"), RuleAction::Disable, ["x"]),
            SelectionRule::availability("y-default-off", 2, always(), RuleAction::Disable, ["y"]),
            SelectionRule::availability("y-with-x", 3, when_selected("x"), RuleAction::Enable, ["y"]),
        ];

        let catalog = catalog()?;
        let selected = selection(&["a", "x", "y"]);

        let two_pass = RulesEngine::new(rules.clone()).evaluate(&catalog, &selected);

        let fixed_point = RulesEngine::new(rules)
            .with_settings(EngineSettings {
                strategy: EvaluationStrategy::FixedPoint {
                    max_iterations: DEFAULT_MAX_ITERATIONS,
                },
            })
            .evaluate(&catalog, &selected);

        assert!(!two_pass.is_available("x"));
        assert!(two_pass.is_available("y"));

        assert!(!fixed_point.is_available("x"));
        assert!(!fixed_point.is_available("y"));
        assert_eq!(
            fixed_point.item_state("x").and_then(|s| s.blocked_by.clone()),
            Some(RuleId::from("x-conflicts-a"))
        );

        Ok(())
    }

    #[test]
    fn gift_item_ids_lists_gifts() -> TestResult {
        let engine = RulesEngine::new([SelectionRule::gift("g", 1, when_selected("a"), ["b"])]);

        let gifts = engine
            .evaluate(&catalog()?, &selection(&["a", "b"]))
            .gift_item_ids();

        assert_eq!(gifts.len(), 1);
        assert!(gifts.contains("b"));

        Ok(())
    }
}
