//! Transition planning: exit and entry sequences between two states.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::event::Event;
use crate::graph::{StateGraph, StateId};

/// How a transition from a state to itself is planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelfTransition {
    /// Nothing is exited or entered unless the state has an initial chain below it.
    #[default]
    Ignore,
    /// The state is exited and entered again.
    Reenter,
}

/// A computed transition plan. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    from: StateId,
    to: StateId,
    exits: Vec<StateId>,
    entries: Vec<StateId>,
    resting: StateId,
}

impl Transition {
    /// State the transition starts from.
    pub fn from(&self) -> StateId {
        self.from
    }

    /// Destination as requested, before initial-chain resolution.
    pub fn to(&self) -> StateId {
        self.to
    }

    /// States to exit, deepest first.
    pub fn exits(&self) -> &[StateId] {
        &self.exits
    }

    /// States to enter, shallowest first, ending at the resolved leaf.
    pub fn entries(&self) -> &[StateId] {
        &self.entries
    }

    /// State the machine rests in once the transition has run.
    pub fn resting(&self) -> StateId {
        self.resting
    }

    pub fn is_empty(&self) -> bool {
        self.exits.is_empty() && self.entries.is_empty()
    }
}

/// Computes transitions and caches them by `(source, requested destination)`.
#[derive(Debug, Default)]
pub struct TransitionPlanner {
    cache: HashMap<(StateId, StateId), Arc<Transition>>,
    policy: SelfTransition,
    walks: u64,
}

impl TransitionPlanner {
    pub fn new(policy: SelfTransition) -> Self {
        Self {
            cache: HashMap::new(),
            policy,
            walks: 0,
        }
    }

    /// Returns the plan for `from -> to`, computing it on first request.
    pub fn plan<C, E: Event>(
        &mut self,
        graph: &StateGraph<C, E>,
        from: StateId,
        to: StateId,
    ) -> Arc<Transition> {
        if let Some(cached) = self.cache.get(&(from, to)) {
            return Arc::clone(cached);
        }
        self.walks += 1;
        let transition = Arc::new(compute(graph, from, to, self.policy));
        self.cache.insert((from, to), Arc::clone(&transition));
        transition
    }

    /// Number of plans computed by walking the graph (cache misses).
    pub fn walks(&self) -> u64 {
        self.walks
    }

    /// Number of cached plans.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn policy(&self) -> SelfTransition {
        self.policy
    }
}

fn compute<C, E: Event>(
    graph: &StateGraph<C, E>,
    from: StateId,
    to: StateId,
    policy: SelfTransition,
) -> Transition {
    let top = graph.top();

    // Candidate exit path from the source up to the top (exclusive); `depth` maps every
    // node on that path, the top included, to its position so the common ancestor can be
    // found in one lookup.
    let mut exits = Vec::new();
    let mut depth = HashMap::new();
    let mut node = Some(from);
    while let Some(state) = node {
        depth.insert(state, exits.len());
        if state == top {
            break;
        }
        exits.push(state);
        node = graph.parent_of(state);
    }

    let mut entries = VecDeque::new();
    let mut cut = exits.len();
    let mut node = Some(to);
    while let Some(state) = node {
        if let Some(&d) = depth.get(&state) {
            cut = d;
            break;
        }
        if state == top {
            break;
        }
        entries.push_front(state);
        node = graph.parent_of(state);
    }
    exits.truncate(cut);

    if from == to && policy == SelfTransition::Reenter && from != top {
        exits.push(from);
        entries.push_back(from);
    }

    let mut tail = entries.back().copied().unwrap_or(to);
    while let Some(child) = graph.initial_child_of(tail) {
        entries.push_back(child);
        tail = child;
    }

    let entries: Vec<StateId> = entries.into();
    let resting = match (entries.last(), exits.last()) {
        (Some(&last), _) => last,
        (None, Some(&last)) => graph.parent_of(last).unwrap_or(top),
        (None, None) => from,
    };

    Transition {
        from,
        to,
        exits,
        entries,
        resting,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StateGraphBuilder;

    #[derive(Debug)]
    struct Tick;

    impl Event for Tick {
        type Reply = ();

        fn name(&self) -> &'static str {
            "Tick"
        }

        fn names() -> &'static [&'static str] {
            &["Tick"]
        }
    }

    struct Tree {
        graph: Arc<StateGraph<(), Tick>>,
        a: StateId,
        a1: StateId,
        a11: StateId,
        a111: StateId,
        a2: StateId,
        a21: StateId,
        a211: StateId,
        c: StateId,
        chain: Vec<StateId>,
    }

    // Top > A > {A1 > A11 > A111, A2 > A21 > A211}, Top > C > C1 > C11 > C111 > C1111
    // with every C level the initial child of its parent.
    fn tree() -> Tree {
        let mut b = StateGraphBuilder::<(), Tick>::new("Top");
        let top = b.top();
        let a = b.state("A", top).unwrap();
        let a1 = b.state("A1", a).unwrap();
        let a11 = b.state("A11", a1).unwrap();
        let a111 = b.state("A111", a11).unwrap();
        let a2 = b.state("A2", a).unwrap();
        let a21 = b.state("A21", a2).unwrap();
        let a211 = b.state("A211", a21).unwrap();

        let c = b.state("C", top).unwrap();
        let mut chain = vec![c];
        let mut parent = c;
        for name in ["C1", "C11", "C111", "C1111"] {
            let child = b.state(name, parent).unwrap();
            b.initial(parent, child).unwrap();
            chain.push(child);
            parent = child;
        }

        Tree {
            graph: b.build(),
            a,
            a1,
            a11,
            a111,
            a2,
            a21,
            a211,
            c,
            chain,
        }
    }

    #[test]
    fn exits_up_to_and_enters_down_from_common_ancestor() {
        let t = tree();
        let mut planner = TransitionPlanner::default();

        let plan = planner.plan(&t.graph, t.a111, t.a211);
        assert_eq!(plan.exits(), &[t.a111, t.a11, t.a1]);
        assert_eq!(plan.entries(), &[t.a2, t.a21, t.a211]);
        assert_eq!(plan.resting(), t.a211);
        assert!(!plan.exits().contains(&t.a));
    }

    #[test]
    fn destination_follows_initial_chain_to_leaf() {
        let t = tree();
        let mut planner = TransitionPlanner::default();

        let plan = planner.plan(&t.graph, t.a111, t.c);
        assert_eq!(plan.exits(), &[t.a111, t.a11, t.a1, t.a]);
        assert_eq!(plan.entries(), t.chain.as_slice());
        assert_eq!(plan.resting(), *t.chain.last().unwrap());
    }

    #[test]
    fn self_transition_is_a_no_op() {
        let t = tree();
        let mut planner = TransitionPlanner::default();

        let plan = planner.plan(&t.graph, t.a, t.a);
        assert!(plan.is_empty());
        assert_eq!(plan.resting(), t.a);

        let plan = planner.plan(&t.graph, t.a211, t.a211);
        assert!(plan.is_empty());
        assert_eq!(plan.resting(), t.a211);
    }

    #[test]
    fn self_transition_can_reenter() {
        let t = tree();
        let mut planner = TransitionPlanner::new(SelfTransition::Reenter);

        let plan = planner.plan(&t.graph, t.a211, t.a211);
        assert_eq!(plan.exits(), &[t.a211]);
        assert_eq!(plan.entries(), &[t.a211]);
        assert_eq!(plan.resting(), t.a211);
    }

    #[test]
    fn transition_to_ancestor_without_initial_rests_on_it() {
        let t = tree();
        let mut planner = TransitionPlanner::default();

        let plan = planner.plan(&t.graph, t.a111, t.a1);
        assert_eq!(plan.exits(), &[t.a111, t.a11]);
        assert!(plan.entries().is_empty());
        assert_eq!(plan.resting(), t.a1);
    }

    #[test]
    fn transition_to_ancestor_with_initial_chain_is_symmetric() {
        let t = tree();
        let mut planner = TransitionPlanner::default();
        let c11 = t.chain[2];
        let c1111 = t.chain[4];

        let plan = planner.plan(&t.graph, c1111, c11);
        assert_eq!(plan.exits(), &[c1111, t.chain[3]]);
        assert_eq!(plan.entries(), &[t.chain[3], c1111]);
        assert_eq!(plan.resting(), c1111);
    }

    #[test]
    fn transition_into_descendant_exits_nothing() {
        let t = tree();
        let mut planner = TransitionPlanner::default();

        let plan = planner.plan(&t.graph, t.a, t.a21);
        assert!(plan.exits().is_empty());
        assert_eq!(plan.entries(), &[t.a2, t.a21]);
    }

    #[test]
    fn fatal_state_exits_everything_below_top() {
        let t = tree();
        let mut planner = TransitionPlanner::default();
        let fatal = t.graph.fatal();

        let plan = planner.plan(&t.graph, t.a211, fatal);
        assert_eq!(plan.exits(), &[t.a211, t.a21, t.a2, t.a]);
        assert_eq!(plan.entries(), &[fatal]);
        assert_eq!(plan.resting(), fatal);
    }

    #[test]
    fn cache_hits_do_not_walk_the_graph() {
        let t = tree();
        let mut planner = TransitionPlanner::default();

        let first = planner.plan(&t.graph, t.a111, t.a211);
        assert_eq!(planner.walks(), 1);
        let second = planner.plan(&t.graph, t.a111, t.a211);
        assert_eq!(planner.walks(), 1);
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));

        planner.plan(&t.graph, t.a211, t.a111);
        assert_eq!(planner.walks(), 2);
        assert_eq!(planner.cached(), 2);
    }
}
