//! Masking every memory access of a module.

use crate::datarando::catalog::{MEMMOVE, MEMSET};
use crate::datarando::randomizer::{self, Randomizer};
use crate::datarando::{EquivalenceClassRegistry, LibraryWrapperCatalog, MASK_SIZE, NULL_MASK};
use crate::il;
use crate::Error;
use log::{debug, trace, warn};
use std::collections::BTreeSet;

/// The operation at `location`.
pub(crate) fn operation_mut(
    cfg: &mut il::ControlFlowGraph,
    location: il::InstructionLocation,
) -> Result<&mut il::Operation, Error> {
    cfg.block_mut(location.block)?
        .instruction_mut(location.instruction)
        .map(|instruction| instruction.operation_mut())
        .ok_or_else(|| Error::Custom(format!("No instruction at location {}", location)))
}

fn position(cfg: &il::ControlFlowGraph, location: il::InstructionLocation) -> Result<usize, Error> {
    cfg.block(location.block)?
        .position(location.instruction)
        .ok_or_else(|| Error::Custom(format!("No instruction at location {}", location)))
}

/// Insert `operation` directly before the instruction at `location`.
pub(crate) fn insert_before(
    cfg: &mut il::ControlFlowGraph,
    location: il::InstructionLocation,
    operation: il::Operation,
) -> Result<usize, Error> {
    let position = position(cfg, location)?;
    cfg.block_mut(location.block)?.insert(position, operation)
}

/// Insert `operation` directly after the instruction at `location`.
pub(crate) fn insert_after(
    cfg: &mut il::ControlFlowGraph,
    location: il::InstructionLocation,
    operation: il::Operation,
) -> Result<usize, Error> {
    let position = position(cfg, location)?;
    cfg.block_mut(location.block)?.insert(position + 1, operation)
}

/// Convert `expression` to an integer of `bits` bits.
fn int_argument(expression: il::Expression, bits: usize) -> Result<il::Expression, Error> {
    let expression = if expression.ty().is_pointer() {
        il::Expression::ptr_to_int(il::Type::Int(il::POINTER_BITS), expression)?
    } else {
        expression
    };
    il::Expression::zext_or_trun(il::Type::Int(bits), expression)
}

fn i8_pointer(expression: il::Expression) -> Result<il::Expression, Error> {
    il::Expression::cast(il::Type::i8_pointer(), expression)
}

/// Rewrites loads, stores, atomics, bulk memory operations and `va_arg` so
/// memory holds masked values.
pub struct AccessInstrumenter<'r, 'a> {
    registry: &'r mut EquivalenceClassRegistry,
    randomizer: Randomizer<'a>,
    catalog: &'a LibraryWrapperCatalog,
    helpers: BTreeSet<&'static str>,
    instrumented: usize,
}

impl<'r, 'a> AccessInstrumenter<'r, 'a> {
    pub fn new(
        registry: &'r mut EquivalenceClassRegistry,
        randomizer: Randomizer<'a>,
        catalog: &'a LibraryWrapperCatalog,
    ) -> AccessInstrumenter<'r, 'a> {
        AccessInstrumenter {
            registry,
            randomizer,
            catalog,
            helpers: BTreeSet::new(),
            instrumented: 0,
        }
    }

    /// The number of memory operations rewritten so far.
    pub fn instrumented(&self) -> usize {
        self.instrumented
    }

    /// Instrument every defined function of `module`, and declare the runtime
    /// routines the rewritten code calls.
    pub fn instrument_module(&mut self, module: &mut il::Module) -> Result<(), Error> {
        for name in module.function_names() {
            let cfg = match module
                .function_mut(&name)
                .and_then(|function| function.control_flow_graph_mut())
            {
                Some(cfg) => cfg,
                None => continue,
            };
            cfg.reserve_temps();
            self.instrument_function(&name, cfg)?;
        }

        for helper in &self.helpers {
            module.get_or_insert_function(helper, self.catalog.runtime_helper(helper)?);
        }
        debug!("Instrumented {} memory operations", self.instrumented);
        Ok(())
    }

    pub fn instrument_function(
        &mut self,
        function: &str,
        cfg: &mut il::ControlFlowGraph,
    ) -> Result<(), Error> {
        for location in cfg.locations() {
            self.instrument(function, cfg, location)?;
        }
        Ok(())
    }

    fn instrument(
        &mut self,
        function: &str,
        cfg: &mut il::ControlFlowGraph,
        location: il::InstructionLocation,
    ) -> Result<(), Error> {
        let operation = cfg.instruction(location)?.operation().clone();
        let rewritten = match operation {
            il::Operation::Load {
                dst,
                index,
                alignment,
                ..
            } => self.load(function, cfg, location, dst, index, alignment, false)?,
            il::Operation::VaArg { dst, list } => {
                self.load(function, cfg, location, dst, list, 1, true)?
            }
            il::Operation::Store {
                index,
                src,
                alignment,
            } => {
                let mask = self.registry.mask_for_expression(function, &index);
                if mask == NULL_MASK || !self.supported(&src.ty(), location) {
                    return Ok(());
                }
                let effective = self
                    .randomizer
                    .effective_mask(mask, &index, &src.ty(), alignment)?;
                let src = randomizer::xor(src, effective)?;
                *operation_mut(cfg, location)? = il::Operation::Store {
                    index,
                    src,
                    alignment,
                };
                true
            }
            il::Operation::CmpXchg {
                dst,
                index,
                compare,
                new,
                alignment,
            } => {
                let mask = self.registry.mask_for_expression(function, &index);
                if mask == NULL_MASK || !self.supported(dst.ty(), location) {
                    return Ok(());
                }
                let effective = self
                    .randomizer
                    .effective_mask(mask, &index, dst.ty(), alignment)?;
                let encrypted = cfg.temp(dst.ty().clone());
                *operation_mut(cfg, location)? = il::Operation::CmpXchg {
                    dst: encrypted.clone(),
                    index,
                    compare: randomizer::xor(compare, effective.clone())?,
                    new: randomizer::xor(new, effective.clone())?,
                    alignment,
                };
                self.decrypt_result(function, cfg, location, &dst, encrypted, effective)?;
                true
            }
            il::Operation::AtomicRmw {
                dst,
                op,
                index,
                src,
                alignment,
            } => {
                let mask = self.registry.mask_for_expression(function, &index);
                if mask == NULL_MASK || !self.supported(dst.ty(), location) {
                    return Ok(());
                }
                let src = match op {
                    il::RmwOp::Xchg | il::RmwOp::Xor => src,
                    _ => {
                        warn!(
                            "Atomic {} at {} in {} is left unmasked",
                            op, location, function
                        );
                        return Ok(());
                    }
                };
                let effective = self
                    .randomizer
                    .effective_mask(mask, &index, dst.ty(), alignment)?;
                let src = match op {
                    il::RmwOp::Xchg => randomizer::xor(src, effective.clone())?,
                    _ => src,
                };
                let encrypted = cfg.temp(dst.ty().clone());
                *operation_mut(cfg, location)? = il::Operation::AtomicRmw {
                    dst: encrypted.clone(),
                    op,
                    index,
                    src,
                    alignment,
                };
                self.decrypt_result(function, cfg, location, &dst, encrypted, effective)?;
                true
            }
            il::Operation::MemSet {
                dst, value, length, ..
            } => {
                let mask = self.registry.mask_for_expression(function, &dst);
                if mask == NULL_MASK {
                    return Ok(());
                }
                let mask = il::expr_const(mask, 64);
                let arguments = vec![
                    i8_pointer(dst)?,
                    int_argument(value, 32)?,
                    int_argument(length, 64)?,
                    mask.clone(),
                    mask,
                ];
                self.call_helper(cfg, location, MEMSET, arguments)?;
                true
            }
            il::Operation::MemTransfer {
                dst,
                src,
                length,
                alignment,
                ..
            } => {
                let dst_mask = self.registry.mask_for_expression(function, &dst);
                let src_mask = self.registry.mask_for_expression(function, &src);
                if dst_mask == NULL_MASK && src_mask == NULL_MASK {
                    return Ok(());
                }
                if alignment != 0 && alignment % MASK_SIZE == 0 && dst_mask == src_mask {
                    trace!("{} in {} copies within one class", location, function);
                    return Ok(());
                }
                let dst_mask = il::expr_const(dst_mask, 64);
                let arguments = vec![
                    i8_pointer(dst)?,
                    i8_pointer(src)?,
                    int_argument(length, 64)?,
                    dst_mask.clone(),
                    dst_mask,
                    il::expr_const(src_mask, 64),
                ];
                self.call_helper(cfg, location, MEMMOVE, arguments)?;
                true
            }
            _ => false,
        };

        if rewritten {
            trace!("Masked {} in {}", location, function);
            self.instrumented += 1;
        }
        Ok(())
    }

    /// Values the pass cannot cast to an integer are left unmasked.
    fn supported(&self, ty: &il::Type, location: il::InstructionLocation) -> bool {
        if ty.is_first_class() {
            true
        } else {
            warn!("Access of {} at {} is left unmasked", ty, location);
            false
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn load(
        &mut self,
        function: &str,
        cfg: &mut il::ControlFlowGraph,
        location: il::InstructionLocation,
        dst: il::Scalar,
        index: il::Expression,
        alignment: u64,
        va_arg: bool,
    ) -> Result<bool, Error> {
        let mask = self.registry.mask_for_expression(function, &index);
        if mask == NULL_MASK || !self.supported(dst.ty(), location) {
            return Ok(false);
        }
        let effective = self
            .randomizer
            .effective_mask(mask, &index, dst.ty(), alignment)?;
        let encrypted = cfg.temp(dst.ty().clone());
        *operation_mut(cfg, location)? = if va_arg {
            il::Operation::VaArg {
                dst: encrypted.clone(),
                list: index,
            }
        } else {
            il::Operation::Load {
                dst: encrypted.clone(),
                index,
                alignment,
                range: None,
            }
        };
        self.decrypt_result(function, cfg, location, &dst, encrypted, effective)?;
        Ok(true)
    }

    /// Follow the instruction at `location`, which now writes `encrypted`,
    /// with the decryption of `encrypted` back into `dst`.
    ///
    /// The mask reads the address operands of the access before `dst` is
    /// written, so `p = load p` decrypts with the address it loaded from.
    fn decrypt_result(
        &mut self,
        function: &str,
        cfg: &mut il::ControlFlowGraph,
        location: il::InstructionLocation,
        dst: &il::Scalar,
        encrypted: il::Scalar,
        effective: il::Expression,
    ) -> Result<(), Error> {
        self.registry.replace(
            &il::ValueRef::local(function, dst.name()),
            il::ValueRef::local(function, encrypted.name()),
        );
        let src = randomizer::xor(encrypted.into(), effective)?;
        insert_after(cfg, location, il::Operation::assign(dst.clone(), src))?;
        Ok(())
    }

    fn call_helper(
        &mut self,
        cfg: &mut il::ControlFlowGraph,
        location: il::InstructionLocation,
        helper: &'static str,
        arguments: Vec<il::Expression>,
    ) -> Result<(), Error> {
        let function_type = self.catalog.runtime_helper(helper)?.clone();
        *operation_mut(cfg, location)? = il::Operation::call(None, helper, arguments, function_type);
        self.helpers.insert(helper);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::*;
    use crate::datarando::MaskGenerator;
    use crate::il::*;

    fn registry(graph: PointsToGraph) -> EquivalenceClassRegistry {
        let values = ValueToNodeMap::build(&graph);
        EquivalenceClassRegistry::new(graph, values, MaskGenerator::new(7, "test", 8))
    }

    /// A graph where `p` and `q` of `f` point to different classes.
    fn graph() -> PointsToGraph {
        let mut graph = PointsToGraph::new();
        let p = graph.add_node(NodeFlags::empty(), 8);
        let q = graph.add_node(NodeFlags::empty(), 8);
        graph.map_scalar(ValueRef::local("f", "p"), NodeHandle::new(p, 0));
        graph.map_scalar(ValueRef::local("f", "q"), NodeHandle::new(q, 0));
        graph
    }

    fn instrument(registry: &mut EquivalenceClassRegistry, cfg: &mut ControlFlowGraph) {
        let layout = Layout::default();
        let catalog = LibraryWrapperCatalog::new().unwrap();
        let randomizer = Randomizer::new(&layout, 8, false);
        let mut instrumenter = AccessInstrumenter::new(registry, randomizer, &catalog);
        instrumenter.instrument_function("f", cfg).unwrap();
    }

    fn operations(cfg: &ControlFlowGraph) -> Vec<Operation> {
        cfg.blocks()
            .into_iter()
            .flat_map(|block| block.instructions())
            .map(|instruction| instruction.operation().clone())
            .collect()
    }

    #[test]
    fn loads_are_decrypted_into_their_destination() {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        let p = expr_scalar("p", Type::pointer(Type::Int(64)));
        block.load(scalar("x", Type::Int(64)), p, 8);
        block.ret(Some(expr_scalar("x", Type::Int(64))));

        let mut registry = registry(graph());
        instrument(&mut registry, &mut cfg);
        let mask = registry.mask(&ValueRef::local("f", "p"));

        let operations = operations(&cfg);
        assert_eq!(operations.len(), 3);
        match operations[0] {
            Operation::Load { ref dst, range, .. } => {
                assert_eq!(dst.name(), "temp_0");
                assert_eq!(range, None);
            }
            ref operation => panic!("unexpected {}", operation),
        }
        assert_eq!(
            operations[1],
            Operation::assign(
                scalar("x", Type::Int(64)),
                Expression::xor(expr_scalar("temp_0", Type::Int(64)), expr_const(mask, 64))
                    .unwrap()
            )
        );
        assert_eq!(
            operations[2],
            Operation::Return {
                value: Some(expr_scalar("x", Type::Int(64)))
            }
        );
    }

    #[test]
    fn null_masks_leave_accesses_alone() {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        let p = expr_scalar("p", Type::pointer(Type::Int(32)));
        block.store(p, expr_const(5, 32), 4);
        let before = operations(&cfg);

        let mut graph = graph();
        graph
            .node_mut(0)
            .unwrap()
            .insert_flags(NodeFlags::DO_NOT_ENCRYPT);
        let mut registry = registry(graph);
        instrument(&mut registry, &mut cfg);
        assert_eq!(before, operations(&cfg));
    }

    #[test]
    fn copies_between_classes_use_memmove() {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        block.push(Operation::MemTransfer {
            kind: TransferKind::Copy,
            dst: expr_scalar("p", Type::i8_pointer()),
            src: expr_scalar("q", Type::i8_pointer()),
            length: expr_const(16, 64),
            alignment: 8,
        });
        let mut registry = registry(graph());
        instrument(&mut registry, &mut cfg);

        match operations(&cfg)[0] {
            Operation::Call {
                ref target,
                ref arguments,
                ..
            } => {
                assert_eq!(target.direct_name(), Some(MEMMOVE));
                assert_eq!(arguments.len(), 6);
                assert_eq!(arguments[3], arguments[4]);
                assert_ne!(arguments[3], arguments[5]);
            }
            ref operation => panic!("unexpected {}", operation),
        }
    }

    #[test]
    fn unsupported_rmw_is_left_unmasked() {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        block.push(Operation::AtomicRmw {
            dst: scalar("old", Type::Int(32)),
            op: RmwOp::Add,
            index: expr_scalar("p", Type::pointer(Type::Int(32))),
            src: expr_const(1, 32),
            alignment: 4,
        });
        let before = operations(&cfg);
        let mut registry = registry(graph());
        instrument(&mut registry, &mut cfg);
        assert_eq!(before, operations(&cfg));
    }

    #[test]
    fn va_args_are_decrypted_like_loads() {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        block.push(Operation::VaArg {
            dst: scalar("q", Type::i8_pointer()),
            list: expr_scalar("p", Type::i8_pointer()),
        });
        block.ret(Some(expr_scalar("q", Type::i8_pointer())));

        let mut registry = registry(graph());
        instrument(&mut registry, &mut cfg);

        let operations = operations(&cfg);
        assert_eq!(operations.len(), 3);
        match operations[0] {
            Operation::VaArg { ref dst, .. } => assert_eq!(dst.name(), "temp_0"),
            ref operation => panic!("unexpected {}", operation),
        }
        match operations[1] {
            Operation::Assign { ref dst, ref src } => {
                assert_eq!(dst.name(), "q");
                assert!(src.scalars().iter().any(|scalar| scalar.name() == "temp_0"));
            }
            ref operation => panic!("unexpected {}", operation),
        }

        let values = registry.values();
        let encrypted = values.get(&ValueRef::local("f", "temp_0")).unwrap();
        assert_eq!(Some(encrypted), values.get(&ValueRef::local("f", "q")));
    }
}
