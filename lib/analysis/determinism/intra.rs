//! The intraprocedural half of the determinism analysis.

use crate::analysis::determinism::{CallingContext, DeterminismAnalysis, DeterminismValue};
use crate::analysis::fixpoint::{IntraproceduralAnalysis, MonotonicFixpointIterator};
use crate::domain::{
    AbstractDomain, ConstantDomain, Environment, FiniteValue, Partition, ReducedProduct,
};
use crate::il::{
    self, FieldId, InstructionId, InvokeKind, Operation, ParamIndex, Register,
};
use crate::Error;
use log::trace;

use super::ExceptionState;

pub(crate) type RegisterEnvironment = Environment<Register, DeterminismValue>;
pub(crate) type FieldEnvironment = Environment<FieldId, DeterminismValue>;
pub(crate) type CallSiteContexts = Environment<InstructionId, CallingContext>;
pub(crate) type ExceptionValue = FiniteValue<ExceptionState>;

type Components = (
    RegisterEnvironment,
    DeterminismValue,
    CallSiteContexts,
    FieldEnvironment,
    ExceptionValue,
    ConstantDomain<FieldId>,
);

fn no_reduction(_: &mut Components) {}

/// The transfer state of the determinism analysis: a reduced product of the
/// register environment, the return-value domain, the calling contexts
/// established at call sites, the instance-field environment, the
/// exception-reachability sub-state of the current block, and the last field
/// read (consumed by setter calls).
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DetState {
    product: ReducedProduct<Components>,
}

impl DetState {
    pub(crate) fn top(analysis: &DeterminismAnalysis) -> DetState {
        let components = (
            Environment::top(FiniteValue::top(&analysis.lattice)),
            FiniteValue::top(&analysis.lattice),
            Environment::top(Partition::top(FiniteValue::bottom(&analysis.lattice))),
            Environment::top(FiniteValue::top(&analysis.lattice)),
            FiniteValue::top(&analysis.exception_lattice),
            ConstantDomain::top(),
        );
        DetState {
            product: ReducedProduct::new(components, no_reduction),
        }
    }

    pub(crate) fn get_reg(&self, register: Register) -> DeterminismValue {
        self.product.components().0.get(&register)
    }

    pub(crate) fn set_reg(&mut self, register: Register, value: DeterminismValue) {
        self.product
            .apply(|components| components.0.set_in_place(register, value));
    }

    pub(crate) fn return_value(&self) -> DeterminismValue {
        self.product.components().1.clone()
    }

    /// Overwrite the return-value component (set-to-top, then narrow by
    /// meet).
    pub(crate) fn set_return_value(&mut self, value: DeterminismValue) {
        self.product.apply(|components| {
            components.1.set_to_top();
            components.1.meet_with(&value);
        });
    }

    pub(crate) fn call_contexts(&self) -> &CallSiteContexts {
        &self.product.components().2
    }

    pub(crate) fn set_call_context(&mut self, site: InstructionId, context: CallingContext) {
        self.product
            .apply(|components| components.2.set_in_place(site, context));
    }

    pub(crate) fn get_field(&self, field: FieldId) -> DeterminismValue {
        self.product.components().3.get(&field)
    }

    pub(crate) fn set_field(&mut self, field: FieldId, value: DeterminismValue) {
        self.product
            .apply(|components| components.3.set_in_place(field, value));
    }

    pub(crate) fn exception(&self) -> ExceptionValue {
        self.product.components().4.clone()
    }

    pub(crate) fn set_exception(&mut self, value: &ExceptionValue) {
        self.product.apply(|components| {
            components.4.set_to_top();
            components.4.meet_with(value);
        });
    }

    pub(crate) fn last_field(&self) -> Option<FieldId> {
        self.product.components().5.get().copied()
    }

    pub(crate) fn set_last_field(&mut self, field: FieldId) {
        self.product
            .apply(|components| components.5 = ConstantDomain::new(field));
    }

    pub(crate) fn clear_last_field(&mut self) {
        self.product
            .apply(|components| components.5 = ConstantDomain::top());
    }
}

impl AbstractDomain for DetState {
    fn is_bottom(&self) -> bool {
        self.product.is_bottom()
    }

    fn is_top(&self) -> bool {
        self.product.is_top()
    }

    fn leq(&self, other: &Self) -> bool {
        self.product.leq(&other.product)
    }

    fn join_with(&mut self, other: &Self) {
        self.product.join_with(&other.product);
    }

    fn meet_with(&mut self, other: &Self) {
        self.product.meet_with(&other.product);
    }

    fn set_to_bottom(&mut self) {
        self.product.set_to_bottom();
    }

    fn set_to_top(&mut self) {
        self.product.set_to_top();
    }
}

pub(crate) type SummaryQueryFn<'a> = &'a dyn Fn(&il::Instruction) -> DeterminismValue;

/// Analyzes one function body. The summary query resolves the effect of call
/// instructions against the interprocedural registry; without one, every
/// call is an unknown external effect (Top).
pub(crate) struct Analyzer<'a> {
    analysis: &'a DeterminismAnalysis,
    function: &'a il::Function,
    summary_query: Option<SummaryQueryFn<'a>>,
}

impl<'a> Analyzer<'a> {
    pub(crate) fn new(
        analysis: &'a DeterminismAnalysis,
        function: &'a il::Function,
        summary_query: Option<SummaryQueryFn<'a>>,
    ) -> Analyzer<'a> {
        Analyzer {
            analysis,
            function,
            summary_query,
        }
    }

    /// Run to fixpoint under the given calling context. Returns the
    /// function's return summary — the joined state over all return blocks,
    /// narrowed by meet from an initial Top assumption — and the calling
    /// context established at each call site.
    pub(crate) fn run(
        &self,
        context: &CallingContext,
    ) -> Result<(DeterminismValue, Vec<(InstructionId, CallingContext)>), Error> {
        let cfg = self.function.control_flow_graph();
        let mut iterator = MonotonicFixpointIterator::new(self, cfg);
        iterator.run(self.entry_state(context))?;

        let mut summary = FiniteValue::top(&self.analysis.lattice);
        let mut call_site_contexts = Vec::new();
        if let Some(exit_state) = iterator.joined_return_state() {
            summary.meet_with(&exit_state.return_value());
            for (site, context) in exit_state.call_contexts().bindings() {
                call_site_contexts.push((*site, context.clone()));
            }
        }
        trace!("{} summarizes to {}", self.function.qualified_name(), summary);
        Ok((summary, call_site_contexts))
    }

    /// The state at function entry: all registers unconstrained, parameters
    /// bound from the calling context. The receiver of a non-static function
    /// is always a known object; parameters no caller constrains are assumed
    /// deterministic inputs.
    fn entry_state(&self, context: &CallingContext) -> DetState {
        let analysis = self.analysis;
        let mut state = DetState::top(analysis);
        state.set_exception(&analysis.unvisited);
        for param in 0..self.function.param_count() {
            let value = if param == 0 && !self.function.is_static() {
                analysis.det.clone()
            } else if context.is_bottom() {
                analysis.det.clone()
            } else {
                let value = context.get(&param);
                if value.is_bottom() {
                    analysis.det.clone()
                } else {
                    value
                }
            };
            state.set_reg(param, value);
        }
        state
    }

    /// Top stays Top, NotDet stays NotDet, and a known-deterministic left
    /// operand takes the right operand's value.
    fn combine(&self, a: &DeterminismValue, b: &DeterminismValue) -> DeterminismValue {
        let analysis = self.analysis;
        if a.is_top() {
            FiniteValue::top(&analysis.lattice)
        } else if *a == analysis.not_det {
            analysis.not_det.clone()
        } else if *a == analysis.det {
            b.clone()
        } else {
            FiniteValue::bottom(&analysis.lattice)
        }
    }

    fn join_registers(&self, state: &DetState, registers: &[Register]) -> DeterminismValue {
        let mut combined = FiniteValue::bottom(&self.analysis.lattice);
        for &register in registers {
            combined.join_with(&state.get_reg(register));
        }
        combined
    }

    fn analyze_invoke(
        &self,
        instruction: &il::Instruction,
        state: &mut DetState,
    ) -> Result<(), Error> {
        let analysis = self.analysis;
        let (kind, target, arguments, dst) = match instruction.operation() {
            Operation::Invoke {
                kind,
                target,
                arguments,
                dst,
            } => (*kind, target, arguments.as_slice(), *dst),
            _ => {
                return Err(Error::InstructionShape(format!(
                    "{} is not an invoke",
                    instruction
                )))
            }
        };

        // Capture the calling context visible at this site: the abstraction
        // of each argument, keyed by the callee's parameter index. The
        // receiver of a non-static callee is its parameter 0 and is always a
        // known object there, so it is not captured.
        let mut context = Partition::bottom(FiniteValue::bottom(&analysis.lattice));
        for (index, &register) in arguments.iter().enumerate() {
            if kind != InvokeKind::Static && index == 0 {
                continue;
            }
            context.set_in_place(index as ParamIndex, state.get_reg(register));
        }
        if !context.is_bottom() {
            state.set_call_context(instruction.id(), context);
        }

        let callee_return = match self.summary_query {
            Some(query) => query(instruction),
            None => FiniteValue::top(&analysis.lattice),
        };

        // A reset function re-labels its receiver: known again if every
        // argument is already known, unknown otherwise.
        if analysis.reset_functions.contains(&target.qualified()) {
            let receiver = *arguments.first().ok_or_else(|| {
                Error::InstructionShape(format!(
                    "reset function {} called without a receiver",
                    target
                ))
            })?;
            let combined = self.join_registers(state, &arguments[1..]);
            if combined == analysis.det || combined.is_bottom() {
                state.set_reg(receiver, analysis.det.clone());
            } else {
                state.set_reg(receiver, FiniteValue::top(&analysis.lattice));
            }
            return Ok(());
        }

        let result = match kind {
            InvokeKind::Static => {
                if arguments.is_empty() {
                    // The call's effect is the callee's alone.
                    callee_return.clone()
                } else {
                    let combined = self.join_registers(state, arguments);
                    self.combine(&combined, &callee_return)
                }
            }
            InvokeKind::Virtual | InvokeKind::Direct => {
                if arguments.is_empty() {
                    return Err(Error::InstructionShape(format!(
                        "{} call to {} has no receiver",
                        instruction, target
                    )));
                }
                let combined = self.join_registers(state, arguments);
                self.combine(&combined, &callee_return)
            }
        };

        let last_field = if target.name.starts_with("set") {
            state.last_field()
        } else {
            None
        };
        if target.is_constructor() {
            // A constructor initializes its receiver in place.
            let receiver = arguments[0];
            state.set_reg(receiver, result);
        } else if let Some(field) = last_field {
            // A setter invoked right after a field read writes that field.
            state.set_field(field, result);
            state.clear_last_field();
        } else if let Some(dst) = dst {
            state.set_reg(dst, result);
        }
        Ok(())
    }
}

impl IntraproceduralAnalysis for Analyzer<'_> {
    type State = DetState;

    fn analyze_node(&self, block: &il::Block, state: &mut DetState) -> Result<(), Error> {
        if self.analysis.track_exception {
            // A block that catches an exception enters a distinguished
            // "from-exception" sub-state; any other block still unvisited
            // enters the "no-exception" sub-state.
            if block.starts_with_move_exception() {
                state.set_exception(&self.analysis.from_exception);
            } else if state.exception() == self.analysis.unvisited {
                state.set_exception(&self.analysis.no_exception);
            }
        }
        for instruction in block.instructions() {
            self.analyze_instruction(instruction, state)?;
        }
        Ok(())
    }

    fn analyze_instruction(
        &self,
        instruction: &il::Instruction,
        state: &mut DetState,
    ) -> Result<(), Error> {
        let analysis = self.analysis;
        match *instruction.operation() {
            // Compile-time constants and fresh allocations are the same
            // value on every run.
            Operation::Const { dst, .. }
            | Operation::ConstString { dst, .. }
            | Operation::NewInstance { dst, .. } => {
                state.set_reg(dst, analysis.det.clone());
            }
            Operation::Move { dst, src }
            | Operation::Unary { dst, src, .. }
            | Operation::BinaryConst { dst, src, .. } => {
                let value = state.get_reg(src);
                state.set_reg(dst, value);
            }
            Operation::Binary { dst, lhs, rhs, .. } => {
                let value = self.combine(&state.get_reg(lhs), &state.get_reg(rhs));
                state.set_reg(dst, value);
            }
            Operation::NewArray { dst, size } => {
                let value = state.get_reg(size);
                state.set_reg(dst, value);
            }
            Operation::ArrayGet { dst, array, index } => {
                let value = self.combine(&state.get_reg(array), &state.get_reg(index));
                state.set_reg(dst, value);
            }
            Operation::ArrayPut { src, array, index } => {
                // Storing an unknown value or indexing unpredictably
                // contaminates a known array; an already-unknown array is
                // unchanged.
                if state.get_reg(array) == analysis.det {
                    let source = state.get_reg(src);
                    let index = state.get_reg(index);
                    if !(source == analysis.det && index == analysis.det) {
                        state.set_reg(array, index.join(&source));
                    }
                }
            }
            Operation::FieldGet { dst, field, .. } => {
                let value = state.get_field(field);
                state.set_reg(dst, value);
                state.set_last_field(field);
            }
            Operation::FieldPut { src, field, .. } => {
                let value = state.get_reg(src);
                state.set_field(field, value);
            }
            Operation::Invoke { .. } => self.analyze_invoke(instruction, state)?,
            Operation::Return { src } => {
                let value = state.get_reg(src);
                state.set_return_value(value);
            }
            Operation::IfZero { .. }
            | Operation::Goto
            | Operation::MoveException { .. }
            | Operation::ReturnVoid
            | Operation::Nop => {}
        }
        Ok(())
    }
}
