//! The intraprocedural monotone fixpoint iterator.

use crate::domain::AbstractDomain;
use crate::il;
use crate::Error;
use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// A client of the fixpoint iterator: the transfer function of one analysis.
///
/// `analyze_instruction` is the per-instruction transfer function.
/// `analyze_node` may be overridden for block-level special-casing (for
/// example, forcing a distinguished sub-state on exception-handler blocks
/// before ordinary instruction processing); the default folds
/// `analyze_instruction` over the block. `analyze_edge` maps a predecessor's
/// exit state to its contribution along one edge and defaults to the
/// identity; overriding it lets a client prune branch edges it can prove
/// infeasible.
pub trait IntraproceduralAnalysis {
    type State: AbstractDomain;

    fn analyze_instruction(
        &self,
        instruction: &il::Instruction,
        state: &mut Self::State,
    ) -> Result<(), Error>;

    fn analyze_node(&self, block: &il::Block, state: &mut Self::State) -> Result<(), Error> {
        for instruction in block.instructions() {
            self.analyze_instruction(instruction, state)?;
        }
        Ok(())
    }

    fn analyze_edge(
        &self,
        edge: &il::Edge,
        exit_state: &Self::State,
    ) -> Result<Self::State, Error> {
        let _ = edge;
        Ok(exit_state.clone())
    }
}

/// How many times one block may be processed before the iteration is
/// declared divergent.
pub const DEFAULT_VISIT_LIMIT: usize = 1_000;

/// A worklist fixpoint iterator over one function's control-flow graph.
///
/// Each block's entry state is the join over its predecessors' exit states
/// (as contributed by `analyze_edge`); its exit state is the transfer
/// function folded over its instructions. Blocks are revisited until nothing
/// changes. A Bottom entry state denotes proven-unreachable code: the block's
/// transfer is skipped and the state is not widened further.
///
/// Exceeding the per-block visit limit is fatal — on a finite-height domain
/// it can only mean the client's transfer function is not monotone.
pub struct MonotonicFixpointIterator<'a, A: IntraproceduralAnalysis> {
    analysis: &'a A,
    cfg: &'a il::ControlFlowGraph,
    visit_limit: usize,
    entry_states: FxHashMap<usize, A::State>,
    exit_states: FxHashMap<usize, A::State>,
}

impl<'a, A: IntraproceduralAnalysis> MonotonicFixpointIterator<'a, A> {
    pub fn new(
        analysis: &'a A,
        cfg: &'a il::ControlFlowGraph,
    ) -> MonotonicFixpointIterator<'a, A> {
        MonotonicFixpointIterator {
            analysis,
            cfg,
            visit_limit: DEFAULT_VISIT_LIMIT,
            entry_states: FxHashMap::default(),
            exit_states: FxHashMap::default(),
        }
    }

    pub fn with_visit_limit(mut self, visit_limit: usize) -> Self {
        self.visit_limit = visit_limit;
        self
    }

    /// Run the analysis to fixpoint from the given entry state.
    pub fn run(&mut self, entry_state: A::State) -> Result<(), Error> {
        let entry_index = self
            .cfg
            .entry()
            .ok_or_else(|| Error::Custom("control flow graph has no entry block".to_string()))?;

        let mut bottom = entry_state.clone();
        bottom.set_to_bottom();

        // Seed the worklist in reverse post order, so that on acyclic graphs
        // every block is processed after all of its predecessors and the
        // fixpoint is reached in a single pass.
        let mut order = self.cfg.graph().post_order(entry_index)?;
        order.reverse();

        let mut queue: VecDeque<usize> = order.into_iter().collect();
        let mut queued: FxHashSet<usize> = queue.iter().copied().collect();
        let mut visits: FxHashMap<usize, usize> = FxHashMap::default();

        while let Some(index) = queue.pop_front() {
            queued.remove(&index);

            let visit_count = visits.entry(index).or_insert(0);
            *visit_count += 1;
            if *visit_count > self.visit_limit {
                return Err(Error::FixpointDiverged(self.visit_limit));
            }

            // The entry state is the join over all processed predecessors'
            // exit states, each filtered through analyze_edge.
            let mut in_state = if index == entry_index {
                entry_state.clone()
            } else {
                bottom.clone()
            };
            for edge in self.cfg.edges_in(index)? {
                if let Some(exit_state) = self.exit_states.get(&edge.head()) {
                    if exit_state.is_bottom() {
                        continue;
                    }
                    let contribution = self.analysis.analyze_edge(edge, exit_state)?;
                    in_state.join_with(&contribution);
                }
            }

            // A Bottom entry state on a non-entry block is proven
            // unreachable and is not widened further. The entry block always
            // runs its transfer: its state is the client's chosen initial
            // state, which may itself be Bottom (set-like domains grow from
            // it).
            let out_state = if in_state.is_bottom() && index != entry_index {
                bottom.clone()
            } else {
                let mut state = in_state.clone();
                self.analysis.analyze_node(self.cfg.block(index)?, &mut state)?;
                state
            };

            self.entry_states.insert(index, in_state);

            let changed = self.exit_states.get(&index) != Some(&out_state);
            trace!("block {} visit {} changed {}", index, visit_count, changed);
            if !changed {
                continue;
            }
            self.exit_states.insert(index, out_state);

            for successor in self.cfg.successor_indices(index)? {
                if queued.insert(successor) {
                    queue.push_back(successor);
                }
            }
        }

        Ok(())
    }

    /// The state at the entry of a block, after fixpoint. `None` for blocks
    /// that are not reachable from the entry block.
    pub fn entry_state_at(&self, block: usize) -> Option<&A::State> {
        self.entry_states.get(&block)
    }

    /// The state at the exit of a block, after fixpoint.
    pub fn exit_state_at(&self, block: usize) -> Option<&A::State> {
        self.exit_states.get(&block)
    }

    /// The join of the exit states of every return block, or `None` if the
    /// function has no reachable return block.
    pub fn joined_return_state(&self) -> Option<A::State> {
        let mut result: Option<A::State> = None;
        for index in self.cfg.return_blocks() {
            if let Some(state) = self.exit_states.get(&index) {
                match result {
                    Some(ref mut joined) => joined.join_with(state),
                    None => result = Some(state.clone()),
                }
            }
        }
        result
    }

    /// Replay the transfer function once over every reachable block and cache
    /// the state immediately before each instruction, keyed by instruction
    /// id. A convenience for point queries after the fixpoint; not part of
    /// the fixpoint itself. Block-level `analyze_node` special-casing is not
    /// replayed.
    pub fn instruction_states(
        &self,
    ) -> Result<FxHashMap<il::InstructionId, A::State>, Error> {
        let mut states = FxHashMap::default();
        for block in self.cfg.blocks() {
            let entry_state = match self.entry_states.get(&block.index()) {
                Some(state) if !state.is_bottom() => state,
                _ => continue,
            };
            let mut state = entry_state.clone();
            for instruction in block.instructions() {
                states.insert(instruction.id(), state.clone());
                self.analysis.analyze_instruction(instruction, &mut state)?;
            }
        }
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConstantDomain;
    use crate::il::{ControlFlowGraph, Operation};

    // Constant propagation over a single register, as a minimal client.
    struct OneRegisterConstants;

    impl IntraproceduralAnalysis for OneRegisterConstants {
        type State = ConstantDomain<i64>;

        fn analyze_instruction(
            &self,
            instruction: &il::Instruction,
            state: &mut Self::State,
        ) -> Result<(), Error> {
            if let Operation::Const { value, .. } = *instruction.operation() {
                *state = ConstantDomain::new(value);
            }
            Ok(())
        }
    }

    // Like OneRegisterConstants, but branch-true edges out of a block ending
    // in a constant-condition branch are pruned when the constant is zero.
    struct PruningConstants;

    impl IntraproceduralAnalysis for PruningConstants {
        type State = ConstantDomain<i64>;

        fn analyze_instruction(
            &self,
            instruction: &il::Instruction,
            state: &mut Self::State,
        ) -> Result<(), Error> {
            OneRegisterConstants.analyze_instruction(instruction, state)
        }

        fn analyze_edge(
            &self,
            edge: &il::Edge,
            exit_state: &Self::State,
        ) -> Result<Self::State, Error> {
            // The guard is always false: its block's constant is zero.
            if edge.is_branch_true() && exit_state.get() == Some(&0) {
                return Ok(ConstantDomain::bottom());
            }
            Ok(exit_state.clone())
        }
    }

    fn diamond_cfg(lhs: i64, rhs: i64) -> ControlFlowGraph {
        let mut cfg = ControlFlowGraph::new();
        let entry = cfg.new_block().unwrap();
        entry.constant(0, 0);
        entry.if_zero(crate::il::ZeroTest::Ne, 0);
        let entry = entry.index();
        let left = cfg.new_block().unwrap();
        left.constant(0, lhs);
        let left = left.index();
        let right = cfg.new_block().unwrap();
        right.constant(0, rhs);
        let right = right.index();
        let exit = cfg.new_block().unwrap();
        exit.ret(0);
        let exit = exit.index();
        cfg.branch_true_edge(entry, left).unwrap();
        cfg.goto_edge(entry, right).unwrap();
        cfg.goto_edge(left, exit).unwrap();
        cfg.goto_edge(right, exit).unwrap();
        cfg.set_entry(entry).unwrap();
        cfg
    }

    #[test]
    fn acyclic_graph_reaches_fixpoint_in_one_pass() {
        let cfg = diamond_cfg(1, 2);
        let mut iterator = MonotonicFixpointIterator::new(&OneRegisterConstants, &cfg)
            // One visit per block: enough iff a single pass suffices.
            .with_visit_limit(1);
        iterator.run(ConstantDomain::top()).unwrap();
        // The two branches disagree, so the join at the exit block is Top.
        assert!(iterator.exit_state_at(3).unwrap().is_top());
    }

    #[test]
    fn agreeing_branches_stay_precise() {
        let cfg = diamond_cfg(7, 7);
        let mut iterator = MonotonicFixpointIterator::new(&OneRegisterConstants, &cfg);
        iterator.run(ConstantDomain::top()).unwrap();
        assert_eq!(iterator.exit_state_at(3).unwrap().get(), Some(&7));
    }

    #[test]
    fn always_false_guard_proves_the_block_bottom() {
        let cfg = diamond_cfg(1, 2);
        let mut iterator = MonotonicFixpointIterator::new(&PruningConstants, &cfg);
        iterator.run(ConstantDomain::top()).unwrap();
        // Block 1 sits behind the always-false branch: proven unreachable.
        assert!(iterator.entry_state_at(1).unwrap().is_bottom());
        assert!(iterator.exit_state_at(1).unwrap().is_bottom());
        // The exit block only sees the feasible branch.
        assert_eq!(iterator.exit_state_at(3).unwrap().get(), Some(&2));
    }

    #[test]
    fn loops_converge() {
        // entry -> body -> body (self loop) -> exit
        let mut cfg = ControlFlowGraph::new();
        let entry = cfg.new_block().unwrap();
        entry.constant(0, 5);
        let entry = entry.index();
        let body = cfg.new_block().unwrap();
        body.if_zero(crate::il::ZeroTest::Ne, 0);
        let body = body.index();
        let exit = cfg.new_block().unwrap();
        exit.ret(0);
        let exit = exit.index();
        cfg.goto_edge(entry, body).unwrap();
        cfg.branch_true_edge(body, body).unwrap();
        cfg.goto_edge(body, exit).unwrap();
        cfg.set_entry(entry).unwrap();

        let mut iterator = MonotonicFixpointIterator::new(&OneRegisterConstants, &cfg);
        iterator.run(ConstantDomain::top()).unwrap();
        assert_eq!(iterator.exit_state_at(exit).unwrap().get(), Some(&5));
    }

    #[test]
    fn divergent_clients_are_detected() {
        // A counter ordered by <= with join = max has infinite height; a
        // transfer function that keeps incrementing it never stabilizes
        // around a loop.
        #[derive(Clone, Debug, PartialEq)]
        struct Counter(i64);
        impl crate::domain::AbstractDomain for Counter {
            fn is_bottom(&self) -> bool {
                self.0 == i64::MIN
            }
            fn is_top(&self) -> bool {
                self.0 == i64::MAX
            }
            fn leq(&self, other: &Self) -> bool {
                self.0 <= other.0
            }
            fn join_with(&mut self, other: &Self) {
                self.0 = self.0.max(other.0);
            }
            fn meet_with(&mut self, other: &Self) {
                self.0 = self.0.min(other.0);
            }
            fn set_to_bottom(&mut self) {
                self.0 = i64::MIN;
            }
            fn set_to_top(&mut self) {
                self.0 = i64::MAX;
            }
        }

        struct Diverging;
        impl IntraproceduralAnalysis for Diverging {
            type State = Counter;
            fn analyze_instruction(
                &self,
                _instruction: &il::Instruction,
                state: &mut Self::State,
            ) -> Result<(), Error> {
                state.0 += 1;
                Ok(())
            }
        }

        let mut cfg = ControlFlowGraph::new();
        let a = cfg.new_block().unwrap();
        a.nop();
        let a = a.index();
        let b = cfg.new_block().unwrap();
        b.nop();
        let b = b.index();
        cfg.goto_edge(a, b).unwrap();
        cfg.branch_true_edge(b, a).unwrap();
        cfg.set_entry(a).unwrap();

        let mut iterator =
            MonotonicFixpointIterator::new(&Diverging, &cfg).with_visit_limit(16);
        let result = iterator.run(Counter(0));
        assert_eq!(result, Err(Error::FixpointDiverged(16)));
    }

    #[test]
    fn instruction_states_cache_point_queries() {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        let first = block.constant(0, 1);
        let second = block.constant(0, 2);
        block.ret(0);
        let index = block.index();
        cfg.set_entry(index).unwrap();

        let mut iterator = MonotonicFixpointIterator::new(&OneRegisterConstants, &cfg);
        iterator.run(ConstantDomain::top()).unwrap();
        let states = iterator.instruction_states().unwrap();
        // Each snapshot holds the state immediately before its instruction.
        assert!(states[&first].is_top());
        assert_eq!(states[&second].get(), Some(&1));
    }
}
