//! Encrypting memory the program starts with: initialized globals, and the
//! command line handed to `main`.

use crate::datarando::catalog::XOR_MEM;
use crate::datarando::randomizer::{self, Randomizer};
use crate::datarando::{EquivalenceClassRegistry, LibraryWrapperCatalog, NULL_MASK};
use crate::il;
use crate::Error;
use log::{debug, warn};

/// The constructor which encrypts global initializers.
pub const ENCRYPT_GLOBALS: &str = "drrt_encrypt_globals";

/// Priority of the `ENCRYPT_GLOBALS` constructor.
pub const ENCRYPT_GLOBALS_PRIORITY: u32 = 2;

/// Library name under which the catalog lists the wrapper of `main`.
const MAIN_WRAPPER: &str = "__not_main";

/// Globals which are never encrypted.
fn is_skipped(global: &il::GlobalVariable) -> bool {
    global.section() == Some("llvm.metadata") || global.name() == "llvm.global_ctors"
}

/// Encrypts the initializers of global variables in a module constructor.
pub struct GlobalInitializer<'r, 'a> {
    registry: &'r mut EquivalenceClassRegistry,
    randomizer: Randomizer<'a>,
    catalog: &'a LibraryWrapperCatalog,
}

impl<'r, 'a> GlobalInitializer<'r, 'a> {
    pub fn new(
        registry: &'r mut EquivalenceClassRegistry,
        randomizer: Randomizer<'a>,
        catalog: &'a LibraryWrapperCatalog,
    ) -> GlobalInitializer<'r, 'a> {
        GlobalInitializer {
            registry,
            randomizer,
            catalog,
        }
    }

    /// Add the constructor encrypting every masked global with an
    /// initializer. Returns the number of globals encrypted.
    pub fn encrypt_globals(&mut self, module: &mut il::Module) -> Result<usize, Error> {
        let mut cfg = il::ControlFlowGraph::new();
        let entry = cfg.new_block()?.index();
        cfg.set_entry(entry)?;

        let mut encrypted = Vec::new();
        let mut uses_xor_mem = false;
        for global in module.globals() {
            if global.initializer().is_none() || is_skipped(global) {
                continue;
            }
            let mask = self.registry.mask(&il::ValueRef::global(global.name()));
            if mask == NULL_MASK {
                continue;
            }

            let address = il::Expression::global(global.name(), global.pointer_type());
            let ty = global.ty();
            let operations = if ty.is_aggregate() {
                uses_xor_mem = true;
                let size = self.randomizer.layout().alloc_size(ty)?;
                vec![il::Operation::call(
                    None,
                    XOR_MEM,
                    vec![
                        il::Expression::cast(il::Type::i8_pointer(), address)?,
                        il::expr_const(mask, 64),
                        il::expr_const(size, 64),
                    ],
                    self.catalog.runtime_helper(XOR_MEM)?.clone(),
                )]
            } else if ty.is_first_class() {
                let effective = self
                    .randomizer
                    .effective_mask(mask, &address, ty, global.alignment())?;
                let plain = cfg.temp(ty.clone());
                vec![
                    il::Operation::load(plain.clone(), address.clone(), global.alignment()),
                    il::Operation::store(
                        address,
                        randomizer::xor(plain.into(), effective)?,
                        global.alignment(),
                    ),
                ]
            } else {
                warn!("Global {} of type {} is left unmasked", global.name(), ty);
                continue;
            };

            let block = cfg.block_mut(entry)?;
            for operation in operations {
                block.push(operation);
            }
            encrypted.push(global.name().to_string());
        }

        if encrypted.is_empty() {
            return Ok(0);
        }
        cfg.block_mut(entry)?.ret(None);

        for name in &encrypted {
            if let Some(global) = module.global_mut(name) {
                global.set_constant(false);
            }
        }
        if uses_xor_mem {
            module.get_or_insert_function(XOR_MEM, self.catalog.runtime_helper(XOR_MEM)?);
        }

        let function_type = il::FunctionType::new(il::Type::Void, Vec::new(), false);
        let mut function = il::Function::new(ENCRYPT_GLOBALS, function_type, Vec::new(), cfg)?;
        function.set_internal(true);
        module.add_function(function);
        module.constructors_mut().insert(
            0,
            il::Constructor::new(ENCRYPT_GLOBALS_PRIORITY, ENCRYPT_GLOBALS),
        );
        debug!("Encrypted {} global initializers", encrypted.len());
        Ok(encrypted.len())
    }
}

/// Encrypts the command line on entry to `main`.
pub struct MainArgsEncryptor<'r, 'a> {
    registry: &'r mut EquivalenceClassRegistry,
    catalog: &'a LibraryWrapperCatalog,
    layout: &'a il::Layout,
}

impl<'r, 'a> MainArgsEncryptor<'r, 'a> {
    pub fn new(
        registry: &'r mut EquivalenceClassRegistry,
        catalog: &'a LibraryWrapperCatalog,
        layout: &'a il::Layout,
    ) -> MainArgsEncryptor<'r, 'a> {
        MainArgsEncryptor {
            registry,
            catalog,
            layout,
        }
    }

    /// Call the wrapper of `main` on `argc` and `argv` before anything else
    /// in `main` runs.
    ///
    /// # Error
    /// `main` takes a number of arguments other than 0, 2 or 3.
    pub fn encrypt_main_args(&mut self, module: &mut il::Module) -> Result<(), Error> {
        let (argc, argv) = match module.function("main") {
            Some(main) if !main.is_declaration() => match main.params().len() {
                0 => return Ok(()),
                2 | 3 => (main.params()[0].clone(), main.params()[1].clone()),
                n => return Err(Error::InvalidMain(n)),
            },
            _ => return Ok(()),
        };
        let descriptor = self
            .catalog
            .wrapper(MAIN_WRAPPER)
            .ok_or_else(|| Error::Custom(format!("No wrapper for {}", MAIN_WRAPPER)))?;

        let mut masks = Vec::new();
        self.registry.append_masks_for_reachable(
            "main",
            &argv.clone().into(),
            self.layout,
            self.catalog,
            &mut masks,
        )?;

        let mut params = vec![argc.ty().clone(), argv.ty().clone()];
        params.extend(masks.iter().map(|_| il::Type::Int(64)));
        let function_type = il::FunctionType::new(il::Type::Int(32), params, false);
        if &function_type != descriptor.function_type() {
            warn!(
                "Wrapper {} has type {}, but main needs {}",
                descriptor.wrapper(),
                descriptor.function_type(),
                function_type
            );
        }

        let mut arguments: Vec<il::Expression> = vec![argc.into(), argv.into()];
        arguments.extend(masks.iter().map(|mask| il::expr_const(*mask, 64)));
        let call = il::Operation::call(None, descriptor.wrapper(), arguments, function_type.clone());

        let cfg = module
            .function_mut("main")
            .and_then(|main| main.control_flow_graph_mut())
            .ok_or_else(|| Error::FunctionNotFound("main".to_string()))?;
        let entry = cfg
            .entry()
            .ok_or_else(|| Error::Custom("main has no entry block".to_string()))?;
        cfg.block_mut(entry)?.insert(0, call)?;
        module.get_or_insert_function(descriptor.wrapper(), &function_type);
        debug!("Encrypting {} levels of the command line", masks.len());
        Ok(())
    }
}
