//! State graphs: the legal states of one entity kind and the edges between
//! them.
//!
//! A [`StateGraph`] is built once through [`StateGraphBuilder`], validated,
//! and then only queried. It has no interior mutability, so a shared
//! `&StateGraph` (or `Arc<StateGraph>`) can be read from any number of
//! threads without synchronization.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use crate::lifecycle::EntityKind;

/// A typed lifecycle state that persists as a stable string code.
pub trait StateCode:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// The entity kind this state enum belongs to.
    const KIND: EntityKind;

    /// Every variant, in declaration order.
    fn all() -> &'static [Self];

    /// The persisted code, e.g. `"PENDING"`.
    fn code(self) -> &'static str;

    fn from_code(code: &str) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.code() == code)
    }
}

/// A state outside the graph's declared set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} state '{state}'")]
pub struct UnknownStateError {
    pub kind: EntityKind,
    pub state: String,
}

/// A graph definition that violates the structural invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("{kind} edge {from} -> {to} targets an undeclared state")]
    UndeclaredTarget {
        kind: EntityKind,
        from: String,
        to: String,
    },
    #[error("{kind} state {state} is not reachable from initial state {initial}")]
    Unreachable {
        kind: EntityKind,
        state: String,
        initial: String,
    },
}

/// Immutable mapping from each declared state to the states it may move to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateGraph<S: StateCode> {
    initial: S,
    edges: BTreeMap<S, BTreeSet<S>>,
}

impl<S: StateCode> StateGraph<S> {
    pub fn builder(initial: S) -> StateGraphBuilder<S> {
        StateGraphBuilder::new(initial)
    }

    pub fn kind(&self) -> EntityKind {
        S::KIND
    }

    /// The state newly created entities start in.
    pub fn initial(&self) -> S {
        self.initial
    }

    pub fn contains(&self, state: S) -> bool {
        self.edges.contains_key(&state)
    }

    /// Declared states, in `Ord` order.
    pub fn states(&self) -> impl Iterator<Item = S> + '_ {
        self.edges.keys().copied()
    }

    /// States reachable in one step from `state`.
    ///
    /// An empty set means `state` is terminal; an error means it is not a
    /// state of this graph at all.
    pub fn allowed_transitions(&self, state: S) -> Result<&BTreeSet<S>, UnknownStateError> {
        self.edges.get(&state).ok_or_else(|| self.unknown(state))
    }

    pub fn is_terminal(&self, state: S) -> Result<bool, UnknownStateError> {
        Ok(self.allowed_transitions(state)?.is_empty())
    }

    pub fn can_transition(&self, from: S, to: S) -> Result<bool, UnknownStateError> {
        Ok(self.allowed_transitions(from)?.contains(&to))
    }

    pub fn terminal_states(&self) -> Vec<S> {
        self.edges
            .iter()
            .filter(|(_, targets)| targets.is_empty())
            .map(|(state, _)| *state)
            .collect()
    }

    /// Map a persisted code to a declared state.
    pub fn parse_state(&self, code: &str) -> Result<S, UnknownStateError> {
        S::from_code(code)
            .filter(|s| self.contains(*s))
            .ok_or_else(|| UnknownStateError {
                kind: S::KIND,
                state: code.to_string(),
            })
    }

    fn unknown(&self, state: S) -> UnknownStateError {
        UnknownStateError {
            kind: S::KIND,
            state: state.code().to_string(),
        }
    }
}

/// Collects state declarations and edges, then validates them in `build`.
#[derive(Debug, Clone)]
pub struct StateGraphBuilder<S: StateCode> {
    initial: S,
    edges: BTreeMap<S, BTreeSet<S>>,
}

impl<S: StateCode> StateGraphBuilder<S> {
    fn new(initial: S) -> Self {
        let mut edges = BTreeMap::new();
        edges.insert(initial, BTreeSet::new());
        Self { initial, edges }
    }

    /// Declare `from` and add edges to each of `targets`.
    ///
    /// Calling this twice for the same state merges the target sets.
    pub fn transitions(mut self, from: S, targets: &[S]) -> Self {
        self.edges
            .entry(from)
            .or_default()
            .extend(targets.iter().copied());
        self
    }

    /// Declare a state with no outgoing edges.
    pub fn terminal(mut self, state: S) -> Self {
        self.edges.entry(state).or_default();
        self
    }

    /// Check that every edge lands on a declared state and that every state
    /// is reachable from the initial state.
    pub fn build(self) -> Result<StateGraph<S>, GraphError> {
        for (from, targets) in &self.edges {
            if let Some(to) = targets.iter().find(|t| !self.edges.contains_key(*t)) {
                return Err(GraphError::UndeclaredTarget {
                    kind: S::KIND,
                    from: from.code().to_string(),
                    to: to.code().to_string(),
                });
            }
        }

        let mut seen = BTreeSet::from([self.initial]);
        let mut queue = VecDeque::from([self.initial]);
        while let Some(state) = queue.pop_front() {
            for next in &self.edges[&state] {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        if let Some(state) = self.edges.keys().find(|s| !seen.contains(*s)) {
            return Err(GraphError::Unreachable {
                kind: S::KIND,
                state: state.code().to_string(),
                initial: self.initial.code().to_string(),
            });
        }

        Ok(StateGraph {
            initial: self.initial,
            edges: self.edges,
        })
    }
}
