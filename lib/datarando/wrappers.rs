//! Redirecting calls to external library functions to mask-aware wrappers.

use crate::datarando::catalog::XOR_MEM;
use crate::datarando::instrument::{insert_after, insert_before, operation_mut};
use crate::datarando::{EquivalenceClassRegistry, LibraryWrapperCatalog, NULL_MASK};
use crate::il;
use crate::Error;
use log::{debug, warn};
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, BTreeSet};

/// Rewrites calls to wrapped library functions and jump functions.
pub struct LibraryCallRewriter<'r, 'a> {
    registry: &'r mut EquivalenceClassRegistry,
    catalog: &'a LibraryWrapperCatalog,
    layout: &'a il::Layout,
    declarations: BTreeMap<String, il::FunctionType>,
    mismatched: FxHashSet<String>,
    wrapped: usize,
}

impl<'r, 'a> LibraryCallRewriter<'r, 'a> {
    pub fn new(
        registry: &'r mut EquivalenceClassRegistry,
        catalog: &'a LibraryWrapperCatalog,
        layout: &'a il::Layout,
    ) -> LibraryCallRewriter<'r, 'a> {
        LibraryCallRewriter {
            registry,
            catalog,
            layout,
            declarations: BTreeMap::new(),
            mismatched: FxHashSet::default(),
            wrapped: 0,
        }
    }

    /// The number of calls rewritten so far.
    pub fn wrapped(&self) -> usize {
        self.wrapped
    }

    pub fn rewrite_module(&mut self, module: &mut il::Module) -> Result<(), Error> {
        // Callees missing from the module are external, too
        let internal: BTreeSet<String> = module
            .functions()
            .filter(|function| !function.is_declaration() || function.is_intrinsic())
            .map(|function| function.name().to_string())
            .collect();

        for name in module.function_names() {
            let cfg = match module
                .function_mut(&name)
                .and_then(|function| function.control_flow_graph_mut())
            {
                Some(cfg) => cfg,
                None => continue,
            };
            for location in cfg.locations() {
                let callee = match cfg.instruction(location)?.operation() {
                    il::Operation::Call {
                        target: il::CallTarget::Direct(ref callee),
                        ..
                    } => callee.clone(),
                    _ => continue,
                };
                if internal.contains(&callee) || callee.starts_with("llvm.") {
                    continue;
                }
                if self.catalog.has_wrapper(&callee) {
                    self.wrap(&name, cfg, location, &callee)?;
                } else if self.catalog.is_jmp_function(&callee) {
                    self.protect_jump_buffer(&name, cfg, location, &callee)?;
                }
            }
        }

        for (name, function_type) in &self.declarations {
            module.get_or_insert_function(name, function_type);
        }
        debug!("Rewrote {} library calls", self.wrapped);
        Ok(())
    }

    fn wrap(
        &mut self,
        function: &str,
        cfg: &mut il::ControlFlowGraph,
        location: il::InstructionLocation,
        callee: &str,
    ) -> Result<(), Error> {
        let (dst, arguments, function_type) = match cfg.instruction(location)?.operation().clone() {
            il::Operation::Call {
                dst,
                arguments,
                function_type,
                ..
            } => (dst, arguments, function_type),
            _ => return Ok(()),
        };
        let fixed = function_type.num_params();
        if arguments.len() < fixed {
            debug!("Call to {} at {} has too few arguments", callee, location);
            return Ok(());
        }
        let descriptor = match self.catalog.wrapper(callee) {
            Some(descriptor) => descriptor,
            None => return Ok(()),
        };
        let format = self.catalog.is_format_function(callee);

        let mut masks = Vec::new();
        let ret = dst.as_ref().and_then(|dst| {
            self.registry
                .values()
                .get(&il::ValueRef::local(function, dst.name()))
        });
        self.registry.append_masks_for_type(
            function_type.ret(),
            ret,
            self.layout,
            self.catalog,
            &mut masks,
            &mut BTreeSet::new(),
        )?;
        for (argument, ty) in arguments.iter().zip(function_type.params()) {
            let handle = self.registry.values().node_for_expression(function, argument);
            self.registry.append_masks_for_type(
                ty,
                handle,
                self.layout,
                self.catalog,
                &mut masks,
                &mut BTreeSet::new(),
            )?;
        }
        let varargs = &arguments[fixed..];
        if function_type.variadic() && !format {
            masks.push(self.registry.mask_for_varargs(function, varargs));
        }

        let mut params = function_type.params().to_vec();
        params.extend(masks.iter().map(|_| il::Type::Int(64)));
        let wrapper_type =
            il::FunctionType::new(function_type.ret().clone(), params, function_type.variadic());
        if &wrapper_type != descriptor.function_type() && self.mismatched.insert(callee.to_string())
        {
            warn!(
                "Wrapper {} has type {}, but calls to {} need {}",
                descriptor.wrapper(),
                descriptor.function_type(),
                callee,
                wrapper_type
            );
        }

        let mut wrapped_arguments = arguments[..fixed].to_vec();
        wrapped_arguments.extend(masks.iter().map(|mask| il::expr_const(*mask, 64)));
        for argument in varargs {
            wrapped_arguments.push(argument.clone());
            if format {
                let mask = self.registry.mask_for_expression(function, argument);
                wrapped_arguments.push(il::expr_const(mask, 64));
            }
        }

        let wrapper = descriptor.wrapper().to_string();
        *operation_mut(cfg, location)? = il::Operation::Call {
            dst,
            target: il::CallTarget::Direct(wrapper.clone()),
            arguments: wrapped_arguments,
            function_type: wrapper_type.clone(),
        };
        self.declarations.entry(wrapper).or_insert(wrapper_type);
        self.wrapped += 1;
        Ok(())
    }

    /// Decrypt the jump buffer around a call to a jump function.
    fn protect_jump_buffer(
        &mut self,
        function: &str,
        cfg: &mut il::ControlFlowGraph,
        location: il::InstructionLocation,
        callee: &str,
    ) -> Result<(), Error> {
        let (buffer, function_type) = match *cfg.instruction(location)?.operation() {
            il::Operation::Call {
                ref arguments,
                ref function_type,
                ..
            } => match arguments.first() {
                Some(buffer) => (buffer.clone(), function_type.clone()),
                None => {
                    debug!("Call to {} at {} has no jump buffer", callee, location);
                    return Ok(());
                }
            },
            _ => return Ok(()),
        };
        let pointee = match function_type.param(0).and_then(|ty| ty.pointee()) {
            Some(pointee) if pointee.is_aggregate() => pointee.clone(),
            _ => {
                debug!("Call to {} at {} has a suspicious jump buffer", callee, location);
                return Ok(());
            }
        };
        let mask = self.registry.mask_for_expression(function, &buffer);
        if mask == NULL_MASK {
            return Ok(());
        }
        let size = self.layout.alloc_size(&pointee)?;

        let xor_mem_type = self.catalog.runtime_helper(XOR_MEM)?.clone();
        let arguments = vec![
            il::Expression::cast(il::Type::i8_pointer(), buffer)?,
            il::expr_const(mask, 64),
            il::expr_const(size, 64),
        ];
        let xor_mem = il::Operation::call(None, XOR_MEM, arguments, xor_mem_type.clone());
        insert_before(cfg, location, xor_mem.clone())?;
        insert_after(cfg, location, xor_mem)?;
        self.declarations
            .entry(XOR_MEM.to_string())
            .or_insert(xor_mem_type);
        self.wrapped += 1;
        Ok(())
    }
}
