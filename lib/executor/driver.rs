//! A driver concretely executes the functions of an IL module.

use crate::executor::successor::*;
use crate::executor::*;
use crate::il;
use crate::{Error, RC};
use log::trace;
use std::collections::BTreeMap;

/// Global variables are laid out from this address.
const GLOBAL_BASE: u64 = 0x1_0000;
/// Functions receive addresses from here. No memory backs them.
const FUNCTION_BASE: u64 = 0x10_0000_0000;

const DEFAULT_STEP_LIMIT: usize = 1_000_000;

/// A driver for a concrete executor over the IL.
#[derive(Debug, Clone)]
pub struct Driver {
    module: RC<il::Module>,
    state: State,
    functions_by_address: BTreeMap<u64, String>,
    steps: usize,
    step_limit: usize,
}

impl Driver {
    /// Load `module` into a fresh memory, writing every global initializer.
    pub fn new(module: RC<il::Module>) -> Result<Driver, Error> {
        let layout = module.layout();
        let mut memory = Memory::new();
        let mut symbols = BTreeMap::new();
        let mut functions_by_address = BTreeMap::new();

        let mut next = GLOBAL_BASE;
        for global in module.globals() {
            let size = layout.alloc_size(global.ty()).unwrap_or(0);
            let alignment = match global.alignment() {
                0 => layout.abi_alignment(global.ty()).unwrap_or(1),
                alignment => alignment,
            }
            .max(1);
            let address = (next + alignment - 1) / alignment * alignment;
            next = address + size.max(1);
            symbols.insert(global.name().to_string(), address);
        }
        for (index, function) in module.functions().enumerate() {
            let address = FUNCTION_BASE + index as u64 * 0x10;
            symbols.insert(function.name().to_string(), address);
            functions_by_address.insert(address, function.name().to_string());
        }

        for global in module.globals() {
            let initializer = match global.initializer() {
                Some(initializer) => initializer,
                None => continue,
            };
            let address = symbols[global.name()];
            memory.store_bytes(address, initializer.bytes());
            for (offset, symbol) in initializer.relocations() {
                let target = symbols
                    .get(symbol)
                    .cloned()
                    .ok_or_else(|| Error::GlobalNotFound(symbol.to_string()))?;
                memory.store_u64(address + offset, target);
            }
        }

        Ok(Driver {
            state: State::new(memory, symbols, layout),
            module,
            functions_by_address,
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        })
    }

    pub fn set_step_limit(&mut self, step_limit: usize) {
        self.step_limit = step_limit;
    }

    pub fn module(&self) -> &il::Module {
        &self.module
    }

    /// Retrieve the concrete `State` associated with this driver.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Retrieve a mutable reference to the `State` associated with this driver.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// The address of a global variable or function.
    pub fn address_of(&self, name: &str) -> Result<u64, Error> {
        self.state
            .symbol_address(name)
            .ok_or_else(|| Error::GlobalNotFound(name.to_string()))
    }

    /// Run every module constructor, lowest priority first.
    pub fn run_constructors(&mut self) -> Result<(), Error> {
        let mut constructors = self.module.constructors().to_vec();
        constructors.sort_by_key(|constructor| constructor.priority);
        for constructor in constructors {
            self.call(&constructor.function, Vec::new())?;
        }
        Ok(())
    }

    /// Run constructors, then call `main` with the given command line.
    pub fn run_main(&mut self, args: &[&str]) -> Result<Option<il::Constant>, Error> {
        self.run_constructors()?;
        let num_params = self
            .module
            .function("main")
            .ok_or_else(|| Error::FunctionNotFound("main".to_string()))?
            .function_type()
            .num_params();

        let argv = self
            .state
            .memory_mut()
            .allocate((args.len() as u64 + 1) * 8, 8);
        for (index, arg) in args.iter().enumerate() {
            let mut bytes = arg.as_bytes().to_vec();
            bytes.push(0);
            let string = self.state.memory_mut().allocate(bytes.len() as u64, 1);
            self.state.memory_mut().store_bytes(string, &bytes);
            self.state
                .memory_mut()
                .store_u64(argv + index as u64 * 8, string);
        }
        let envp = self.state.memory_mut().allocate(8, 8);

        let arguments = vec![
            il::const_(args.len() as u64, 32),
            il::const_(argv, il::POINTER_BITS),
            il::const_(envp, il::POINTER_BITS),
        ];
        self.call("main", arguments.into_iter().take(num_params).collect())
    }

    fn tick(&mut self) -> Result<(), Error> {
        self.steps += 1;
        if self.steps > self.step_limit {
            Err(Error::ExecutorStepLimit)
        } else {
            Ok(())
        }
    }

    /// Call the function `name`.
    pub fn call(
        &mut self,
        name: &str,
        arguments: Vec<il::Constant>,
    ) -> Result<Option<il::Constant>, Error> {
        let module = self.module.clone();
        let function = match module.function(name) {
            Some(function) => function,
            None if runtime::is_runtime_function(name) => {
                return runtime::call_runtime(&mut self.state, name, &arguments)
            }
            None => return Err(Error::ExecutorFunctionNotFound(name.to_string())),
        };
        let cfg = match function.control_flow_graph() {
            Some(cfg) => cfg,
            None => return runtime::call_runtime(&mut self.state, name, &arguments),
        };

        let function_type = function.function_type();
        if arguments.len() < function_type.num_params()
            || (arguments.len() > function_type.num_params() && !function_type.variadic())
        {
            return Err(Error::CallArity(
                name.to_string(),
                function_type.num_params(),
                arguments.len(),
            ));
        }

        let varargs = if function_type.variadic() {
            let extra = &arguments[function_type.num_params()..];
            let area = self
                .state
                .memory_mut()
                .allocate((extra.len() as u64).max(1) * 8, 8);
            for (index, argument) in extra.iter().enumerate() {
                self.state
                    .memory_mut()
                    .store(area + index as u64 * 8, argument);
            }
            Some(area)
        } else {
            None
        };

        trace!("enter {}", name);
        let frame = self.state.enter_frame(varargs);
        for (param, argument) in function.params().iter().zip(arguments.iter()) {
            let bits = param.ty().primitive_bits().unwrap_or(argument.bits());
            self.state.set_scalar(param.name(), argument.resize(bits));
        }
        let result = self.execute_cfg(cfg);
        self.state.leave_frame(frame);
        trace!("leave {}", name);
        result
    }

    fn execute_cfg(&mut self, cfg: &il::ControlFlowGraph) -> Result<Option<il::Constant>, Error> {
        let mut block_index = cfg
            .entry()
            .ok_or_else(|| Error::Custom("Function has no entry block".to_string()))?;
        loop {
            for instruction in cfg.block(block_index)?.instructions() {
                self.tick()?;
                match self.state.execute(instruction.operation())? {
                    Successor::FallThrough => {}
                    Successor::Return(value) => return Ok(value),
                    Successor::Call {
                        dst,
                        callee,
                        arguments,
                    } => {
                        let name = match callee {
                            Callee::Named(name) => name,
                            Callee::Address(address) => self
                                .functions_by_address
                                .get(&address)
                                .cloned()
                                .ok_or(Error::ExecutorInvalidAddress(address))?,
                        };
                        let result = self.call(&name, arguments)?;
                        if let (Some(dst), Some(result)) = (dst, result) {
                            let bits = dst.ty().primitive_bits().unwrap_or(result.bits());
                            self.state.set_scalar(dst.name(), result.resize(bits));
                        }
                    }
                }
            }

            let edges = cfg.edges_out(block_index)?;
            if edges.is_empty() {
                return Ok(None);
            }
            let mut next = None;
            for edge in edges {
                let taken = match edge.condition() {
                    Some(condition) => self.state.eval(condition)?.is_one(),
                    None => true,
                };
                if taken {
                    next = Some(edge.tail());
                    break;
                }
            }
            block_index = next.ok_or(Error::ExecutorNoValidLocation)?;
        }
    }
}
