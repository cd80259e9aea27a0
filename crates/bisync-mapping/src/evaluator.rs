//! Generic bidirectional rule selection
//!
//! Every mapper in this crate is a [`RuleBook`] over some
//! [`DirectionalRule`]. Selection works the same for all of them:
//!
//! 1. Rules declared for the requested direction are tried first.
//! 2. Among applicable rules the lowest rank wins; on equal rank the rule
//!    registered first wins.
//! 3. A directional winner is final. Only when the directional pool has no
//!    applicable rule is the two-way pool consulted, with the same ranking.

use crate::rule::{MappingDirection, Side, TranslationDirection};
use std::collections::HashMap;

/// A rule that can be ranked against an input from one side
pub trait DirectionalRule {
    /// Value being translated
    type Input: ?Sized;
    /// Extra evaluation state (field values, matching options)
    type Context: ?Sized;
    /// Specificity; lower is more specific
    type Rank: Ord;

    /// Direction this rule is declared for
    fn direction(&self) -> MappingDirection;

    /// Rank of this rule for `input` read from `side`, or `None` if not applicable
    fn rank(&self, input: &Self::Input, side: Side, context: &Self::Context) -> Option<Self::Rank>;
}

/// Rules grouped by declared direction
///
/// Grouping happens once on construction; [`replace`](Self::replace) rebuilds
/// it wholesale. Rules are never mutated in place.
#[derive(Debug, Clone)]
pub struct RuleBook<R> {
    pools: HashMap<MappingDirection, Vec<R>>,
}

impl<R> Default for RuleBook<R> {
    fn default() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }
}

impl<R: DirectionalRule> RuleBook<R> {
    /// Group rules by direction, keeping registration order within each pool
    #[must_use]
    pub fn new(rules: impl IntoIterator<Item = R>) -> Self {
        let mut pools: HashMap<MappingDirection, Vec<R>> = HashMap::new();
        for rule in rules {
            pools.entry(rule.direction()).or_default().push(rule);
        }
        Self { pools }
    }

    /// Replace every rule
    pub fn replace(&mut self, rules: impl IntoIterator<Item = R>) {
        *self = Self::new(rules);
    }

    /// Rules declared for one direction, in registration order
    #[must_use]
    pub fn pool(&self, direction: MappingDirection) -> &[R] {
        self.pools.get(&direction).map_or(&[], Vec::as_slice)
    }

    /// Total number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    /// Whether the book has no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The winning rule for `input`, if any
    #[must_use]
    pub fn select(
        &self,
        input: &R::Input,
        direction: TranslationDirection,
        context: &R::Context,
    ) -> Option<&R> {
        let side = direction.source_side();
        Self::best(self.pool(direction.into()), input, side, context)
            .or_else(|| Self::best(self.pool(MappingDirection::TwoWay), input, side, context))
    }

    fn best<'a>(
        pool: &'a [R],
        input: &R::Input,
        side: Side,
        context: &R::Context,
    ) -> Option<&'a R> {
        let mut winner: Option<(&'a R, R::Rank)> = None;
        for rule in pool {
            let Some(rank) = rule.rank(input, side, context) else {
                continue;
            };
            let replaces = match &winner {
                Some((_, best)) => rank < *best,
                None => true,
            };
            if replaces {
                winner = Some((rule, rank));
            }
        }
        winner.map(|(rule, _)| rule)
    }
}
