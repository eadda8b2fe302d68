//! Classification of the equivalence classes which may never be masked.
//!
//! Memory escaping to code the pass cannot see, or laid out by such code,
//! must stay in plaintext, along with everything reachable from it.
//! Classification seeds nodes with `DO_NOT_ENCRYPT_REACHABLE`, then marks
//! every node reachable from a seed `DO_NOT_ENCRYPT`.

use crate::analysis::*;
use crate::datarando::{LibraryWrapperCatalog, Options, Statistics};
use crate::il;
use crate::Error;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

pub const REASON_ENVIRONMENT: &str = "Environment argument to main";
pub const REASON_VA_LIST: &str = "Contains va_list";
pub const REASON_REENTRANT: &str = "Static string returned by reentrant function";
pub const REASON_INDIRECT_CALL: &str = "Unencryptable indirect call";
pub const REASON_SAFE: &str = "Safe equivalence class";

/// A call instruction, with the function holding it.
#[derive(Clone, Debug)]
pub struct Call<'m> {
    pub site: CallSite,
    pub dst: Option<&'m il::Scalar>,
    pub target: &'m il::CallTarget,
    pub arguments: &'m [il::Expression],
}

/// Every call in the defined functions of `module`.
pub fn calls(module: &il::Module) -> Vec<Call> {
    let mut calls = Vec::new();
    for function in module.functions() {
        let cfg = match function.control_flow_graph() {
            Some(cfg) => cfg,
            None => continue,
        };
        for block in cfg.blocks() {
            for instruction in block.instructions() {
                if let il::Operation::Call {
                    ref dst,
                    ref target,
                    ref arguments,
                    ..
                } = *instruction.operation()
                {
                    calls.push(Call {
                        site: CallSite::new(
                            function.name(),
                            il::InstructionLocation::new(block.index(), instruction.index()),
                        ),
                        dst: dst.as_ref(),
                        target,
                        arguments,
                    });
                }
            }
        }
    }
    calls
}

/// Mark every node reachable from a `DO_NOT_ENCRYPT_REACHABLE` node
/// `DO_NOT_ENCRYPT`, passing on the reasons of the seed.
pub fn propagate_do_not_encrypt(graph: &mut PointsToGraph) -> Result<(), Error> {
    let seeds: Vec<(usize, BTreeSet<String>)> = graph
        .nodes()
        .into_iter()
        .filter(|node| node.contains(NodeFlags::DO_NOT_ENCRYPT_REACHABLE))
        .map(|node| (node.index(), node.reasons().clone()))
        .collect();

    for (seed, reasons) in seeds {
        for index in graph.reachable(Some(seed))? {
            let node = graph.node_mut(index)?;
            node.insert_flags(NodeFlags::DO_NOT_ENCRYPT);
            for reason in &reasons {
                node.add_reason(reason.as_str());
            }
        }
    }
    Ok(())
}

/// The outcome of classification.
#[derive(Clone, Debug, Default)]
pub struct Classification {
    /// Global equivalence class leaders of functions whose address escapes
    /// to code which cannot be masked.
    pub do_not_replace_address: BTreeSet<String>,
    /// Nodes which are safe to leave in plaintext.
    pub safe_nodes: BTreeSet<usize>,
    pub fixed_point_iterations: usize,
    pub fixed_point_reached: bool,
}

/// Decides which storage nodes may never be masked.
pub struct SafetyClassifier<'a> {
    module: &'a il::Module,
    values: &'a ValueToNodeMap,
    call_graph: &'a CallGraph,
    catalog: &'a LibraryWrapperCatalog,
    options: &'a Options,
    do_not_replace_address: BTreeSet<String>,
}

impl<'a> SafetyClassifier<'a> {
    pub fn new(
        module: &'a il::Module,
        values: &'a ValueToNodeMap,
        call_graph: &'a CallGraph,
        catalog: &'a LibraryWrapperCatalog,
        options: &'a Options,
    ) -> SafetyClassifier<'a> {
        SafetyClassifier {
            module,
            values,
            call_graph,
            catalog,
            options,
            do_not_replace_address: BTreeSet::new(),
        }
    }

    /// Flag the nodes of `graph` which must not be masked.
    pub fn classify(
        mut self,
        graph: &mut PointsToGraph,
        statistics: &mut Statistics,
    ) -> Result<Classification, Error> {
        let calls = calls(self.module);

        statistics.cant_encrypt_va_list = self.mark_va_lists(graph)?;

        let (iterations, reached) = self.find_do_not_replace_functions(graph, &calls)?;

        for call in &calls {
            if !self.can_encrypt_call(graph, call) {
                statistics.cant_encrypt_external_call += self.mark_call(graph, call)?;
            }
            self.special_cases(graph, call)?;
        }

        statistics.cant_encrypt_global = self.mark_external_globals(graph)?;
        statistics.cant_encrypt_type = self.mark_unencryptable_types(graph)?;

        if let Some(main) = self.module.function("main") {
            if let Some(environment) = main.params().get(2) {
                let value = il::ValueRef::local("main", environment.name());
                if let Some(handle) = self.values.get(&value) {
                    mark_reachable(graph, handle.node, REASON_ENVIRONMENT)?;
                }
            }
        }

        propagate_do_not_encrypt(graph)?;

        for leader in &self.do_not_replace_address {
            if let Some(handle) = graph.global_node(leader) {
                graph
                    .node_mut(handle.node)?
                    .insert_flags(NodeFlags::DO_NOT_REPLACE_ADDRESS);
            }
        }

        let safe_nodes = if self.options.safety_analysis() {
            self.safe_nodes(graph, &calls)
        } else {
            BTreeSet::new()
        };

        self.gather_statistics(graph, statistics);
        statistics.cant_encrypt_classes = graph
            .nodes()
            .into_iter()
            .filter(|node| node.is_do_not_encrypt())
            .count();
        statistics.safe_classes = safe_nodes.len();
        statistics.fixed_point_iterations = iterations;
        info!(
            "{} of {} nodes cannot be encrypted, {} are safe",
            statistics.cant_encrypt_classes, statistics.nodes, statistics.safe_classes
        );

        Ok(Classification {
            do_not_replace_address: self.do_not_replace_address,
            safe_nodes,
            fixed_point_iterations: iterations,
            fixed_point_reached: reached,
        })
    }

    fn is_declaration(&self, name: &str) -> bool {
        self.module
            .function(name)
            .map(|function| function.is_declaration())
            .unwrap_or(true)
    }

    /// Returns true if everything passed to and returned from `call` may be
    /// masked.
    pub fn can_encrypt_call(&self, graph: &PointsToGraph, call: &Call) -> bool {
        match *call.target {
            il::CallTarget::Direct(ref name) => {
                !self.is_declaration(name)
                    || name.starts_with("llvm.")
                    || self.catalog.has_wrapper(name)
                    || self.catalog.is_memory_management_function(name)
                    || self.catalog.is_jmp_function(name)
                    || self.catalog.is_harmless_function(name)
            }
            il::CallTarget::InlineAsm(_) => false,
            il::CallTarget::Indirect(ref callee) => {
                let callee_node = self
                    .values
                    .node_for_expression(&call.site.function, callee)
                    .and_then(|handle| graph.node(handle.node).ok());
                if let Some(node) = callee_node {
                    if node.is_complete() && node.contains(NodeFlags::EXTERNAL_FUNCTION) {
                        return false;
                    }
                }

                let mut callees = self.call_graph.callees(&call.site).peekable();
                if callees.peek().is_none() {
                    return false;
                }
                callees.all(|callee| {
                    self.can_replace_address(graph, callee) && !self.is_declaration(callee)
                })
            }
        }
    }

    /// Returns false if the address of `function` may reach code which
    /// cannot be masked.
    pub fn can_replace_address(&self, graph: &PointsToGraph, function: &str) -> bool {
        let leader = graph.leader_for_global(function);
        let external = graph
            .global_node(leader)
            .and_then(|handle| graph.node(handle.node).ok())
            .map(|node| node.contains(NodeFlags::EXTERNAL_FUNCTION))
            .unwrap_or(false);
        !external && !self.do_not_replace_address.contains(leader)
    }

    fn find_do_not_replace_functions(
        &mut self,
        graph: &PointsToGraph,
        calls: &[Call],
    ) -> Result<(usize, bool), Error> {
        let mut iterations = 0;
        loop {
            let count = self.do_not_replace_address.len();
            for call in calls {
                if self.can_encrypt_call(graph, call) {
                    continue;
                }

                let roots: BTreeSet<usize> = call
                    .arguments
                    .iter()
                    .filter_map(|argument| {
                        self.values
                            .node_for_expression(&call.site.function, argument)
                    })
                    .map(|handle| handle.node)
                    .collect();
                let mut functions = BTreeSet::new();
                for index in graph.reachable(roots)? {
                    functions.extend(graph.node(index)?.functions().iter().cloned());
                }
                // All callees of a call site share a node, one stands for all
                if call.target.direct_name().is_none() {
                    if let Some(callee) = self.call_graph.callees(&call.site).next() {
                        functions.insert(callee.to_string());
                    }
                }

                for function in functions {
                    let leader = graph.leader_for_global(&function).to_string();
                    self.do_not_replace_address.insert(leader);
                }
            }

            iterations += 1;
            if count == self.do_not_replace_address.len() {
                return Ok((iterations, true));
            }
            if iterations >= self.options.max_fixed_point_iterations() {
                warn!("fixed point of escaping function addresses not reached");
                return Ok((iterations, false));
            }
        }
    }

    fn mark_call(&self, graph: &mut PointsToGraph, call: &Call) -> Result<usize, Error> {
        let reason = match call.target.direct_name() {
            Some(name) => format!("Unwrapped call to: {}", name),
            None => REASON_INDIRECT_CALL.to_string(),
        };
        let function = call.site.function.as_str();

        let mut handles = Vec::new();
        if let Some(dst) = call.dst {
            handles.extend(self.values.get(&il::ValueRef::local(function, dst.name())));
        }
        for argument in call.arguments {
            handles.extend(self.values.node_for_expression(function, argument));
        }

        let mut marked = 0;
        for handle in handles {
            if mark_reachable(graph, handle.node, reason.as_str())? {
                marked += 1;
            }
        }
        if marked > 0 {
            debug!("{} at {} forces {} nodes unencrypted", reason, call.site, marked);
        }
        Ok(marked)
    }

    fn special_cases(&self, graph: &mut PointsToGraph, call: &Call) -> Result<(), Error> {
        match call.target.direct_name() {
            Some("gmtime_r") | Some("localtime_r") => {}
            _ => return Ok(()),
        }
        let result = match call.arguments.get(1) {
            Some(result) => result,
            None => return Ok(()),
        };
        if let Some(handle) = self
            .values
            .node_for_expression(&call.site.function, result)
        {
            for child in graph.children(handle.node)? {
                let node = graph.node_mut(child)?;
                node.insert_flags(NodeFlags::DO_NOT_ENCRYPT);
                node.add_reason(REASON_REENTRANT);
            }
        }
        Ok(())
    }

    fn mark_va_lists(&self, graph: &mut PointsToGraph) -> Result<usize, Error> {
        let mut lists = Vec::new();
        for function in self.module.functions() {
            let cfg = match function.control_flow_graph() {
                Some(cfg) => cfg,
                None => continue,
            };
            for block in cfg.blocks() {
                for instruction in block.instructions() {
                    match *instruction.operation() {
                        il::Operation::VaStart { ref list } => {
                            lists.push((function.name(), list));
                        }
                        il::Operation::VaCopy { ref dst, ref src } => {
                            lists.push((function.name(), dst));
                            lists.push((function.name(), src));
                        }
                        _ => {}
                    }
                }
            }
        }

        let mut marked = BTreeSet::new();
        for (function, list) in lists {
            let handle = match self.values.node_for_expression(function, list) {
                Some(handle) => handle,
                None => continue,
            };
            let mut nodes = graph.children(handle.node)?;
            nodes.push(handle.node);
            for index in nodes {
                let node = graph.node_mut(index)?;
                if !node.is_do_not_encrypt() {
                    marked.insert(index);
                }
                node.insert_flags(NodeFlags::DO_NOT_ENCRYPT);
                node.add_reason(REASON_VA_LIST);
            }
        }
        Ok(marked.len())
    }

    fn mark_external_globals(&self, graph: &mut PointsToGraph) -> Result<usize, Error> {
        let mut marked = 0;
        for global in self.module.globals() {
            if !global.is_declaration()
                || global.section() == Some("llvm.metadata")
                || self.catalog.is_rtti_vtable(global.name())
            {
                continue;
            }
            if let Some(handle) = self.values.get(&il::ValueRef::global(global.name())) {
                let reason = format!("External global variable: {}", global.name());
                if mark_reachable(graph, handle.node, reason)? {
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }

    fn mark_unencryptable_types(&self, graph: &mut PointsToGraph) -> Result<usize, Error> {
        let layout = self.module.layout();
        let mut marked = 0;
        for (value, handle) in self.values.iter() {
            let ty = match self.module.value_type(value) {
                Some(ty) => ty,
                None => continue,
            };
            if !self.catalog.type_can_be_encrypted(&ty, &layout) {
                let reason = format!("Unencryptable data type: {}", ty);
                if mark_reachable(graph, handle.node, reason)? {
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }

    /// Nodes whose every value is a constant address that never escapes to
    /// a declared function, or a call the pass cannot resolve.
    fn safe_nodes(&self, graph: &PointsToGraph, calls: &[Call]) -> BTreeSet<usize> {
        let mut escaping = BTreeSet::new();
        for call in calls {
            let external = match *call.target {
                il::CallTarget::Direct(ref name) => {
                    if self.is_declaration(name) {
                        escaping.insert(name.as_str());
                        true
                    } else {
                        false
                    }
                }
                il::CallTarget::Indirect(_) | il::CallTarget::InlineAsm(_) => true,
            };
            if external {
                for argument in call.arguments {
                    escaping.extend(argument.globals());
                }
            }
        }

        let mut nodes: BTreeMap<usize, bool> = BTreeMap::new();
        for (value, handle) in self.values.iter() {
            let safe = value
                .global_name()
                .map(|name| !escaping.contains(name))
                .unwrap_or(false);
            *nodes.entry(handle.node).or_insert(true) &= safe;
        }
        nodes
            .into_iter()
            .filter(|&(node, safe)| {
                safe && graph
                    .node(node)
                    .map(|node| !node.is_do_not_encrypt())
                    .unwrap_or(false)
            })
            .map(|(node, _)| node)
            .collect()
    }

    fn gather_statistics(&self, graph: &PointsToGraph, statistics: &mut Statistics) {
        let nodes: BTreeSet<usize> = self.values.iter().map(|(_, handle)| handle.node).collect();
        statistics.nodes = nodes.len();
        for index in &nodes {
            if let Ok(node) = graph.node(*index) {
                if !node.is_complete() {
                    statistics.incomplete_nodes += 1;
                }
                if node.contains(NodeFlags::HEAP) {
                    statistics.heap_nodes += 1;
                }
            }
        }

        let mut global_classes: BTreeMap<usize, usize> = BTreeMap::new();
        for global in self.module.globals() {
            if global.is_declaration() || global.section() == Some("llvm.metadata") {
                continue;
            }
            if let Some(handle) = self.values.get(&il::ValueRef::global(global.name())) {
                *global_classes.entry(handle.node).or_insert(0) += 1;
            }
        }
        statistics.global_classes = global_classes.len();
        statistics.max_global_class = global_classes.values().cloned().max().unwrap_or(0);
    }
}

/// Seed `node` as unencryptable along with everything it reaches. Returns
/// true if the node was not seeded before.
fn mark_reachable<S: Into<String>>(
    graph: &mut PointsToGraph,
    node: usize,
    reason: S,
) -> Result<bool, Error> {
    let node = graph.node_mut(node)?;
    let seeded = node.contains(NodeFlags::DO_NOT_ENCRYPT_REACHABLE);
    node.insert_flags(NodeFlags::DO_NOT_ENCRYPT_REACHABLE);
    node.add_reason(reason);
    Ok(!seeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    struct Fixture {
        module: Module,
        graph: PointsToGraph,
        call_graph: CallGraph,
    }

    impl Fixture {
        fn classify(&mut self, options: &Options) -> Classification {
            let values = ValueToNodeMap::build(&self.graph);
            let catalog = LibraryWrapperCatalog::new().unwrap();
            let classifier =
                SafetyClassifier::new(&self.module, &values, &self.call_graph, &catalog, options);
            classifier
                .classify(&mut self.graph, &mut Statistics::default())
                .unwrap()
        }
    }

    /// `main` calls `callee(p)`, where `p` points to a node linking to a
    /// second node.
    fn fixture(callee: &str, declared: bool) -> Fixture {
        let mut module = Module::new("test");
        let ft = FunctionType::parse("void (i8*)").unwrap();
        if declared {
            module.add_function(Function::declaration(callee, ft.clone()));
        }
        let mut cfg = ControlFlowGraph::new();
        let entry = cfg.new_block().unwrap();
        let p = scalar("p", Type::i8_pointer());
        entry.call(None, callee, vec![p.clone().into()], ft);
        entry.ret(None);
        let index = entry.index();
        cfg.set_entry(index).unwrap();
        let main_ft = FunctionType::parse("i32 ()").unwrap();
        module.add_function(Function::new("main", main_ft, Vec::new(), cfg).unwrap());

        let mut graph = PointsToGraph::new();
        let object = graph.add_node(NodeFlags::empty(), 8);
        let inner = graph.add_node(NodeFlags::empty(), 8);
        graph.add_link(object, 0, NodeHandle::new(inner, 0)).unwrap();
        graph.map_scalar(ValueRef::local("main", "p"), NodeHandle::new(object, 0));

        Fixture {
            module,
            graph,
            call_graph: CallGraph::new(),
        }
    }

    #[test]
    fn unwrapped_calls_poison_reachable_memory() {
        let mut fixture = fixture("frobnicate", true);
        fixture.classify(&Options::default());
        for node in fixture.graph.nodes() {
            assert!(node.is_do_not_encrypt());
            assert!(node.reasons().contains("Unwrapped call to: frobnicate"));
        }
    }

    #[test]
    fn wrapped_calls_are_encryptable() {
        let mut fixture = fixture("puts", true);
        fixture.classify(&Options::default());
        assert!(fixture.graph.nodes().iter().all(|node| !node.is_do_not_encrypt()));
    }

    #[test]
    fn closure_is_idempotent() {
        let mut fixture = fixture("frobnicate", true);
        let cycle = fixture.graph.add_node(NodeFlags::DO_NOT_ENCRYPT_REACHABLE, 8);
        fixture.graph.node_mut(cycle).unwrap().add_reason("seed");
        fixture.graph.add_link(cycle, 0, NodeHandle::new(0, 0)).unwrap();
        fixture.classify(&Options::default());

        let once = fixture.graph.clone();
        propagate_do_not_encrypt(&mut fixture.graph).unwrap();
        assert_eq!(once, fixture.graph);
    }

    #[test]
    fn indirect_calls_without_callees_are_unencryptable() {
        let fixture = fixture("unused", false);
        let calls = calls(&fixture.module);
        assert_eq!(calls.len(), 1);

        let target = CallTarget::Indirect(expr_scalar("fp", Type::parse("void (i8*)*").unwrap()));
        let call = Call {
            site: calls[0].site.clone(),
            dst: None,
            target: &target,
            arguments: calls[0].arguments,
        };
        let values = ValueToNodeMap::build(&fixture.graph);
        let catalog = LibraryWrapperCatalog::new().unwrap();
        let options = Options::default();
        let mut call_graph = CallGraph::new();
        {
            let classifier =
                SafetyClassifier::new(&fixture.module, &values, &call_graph, &catalog, &options);
            assert!(!classifier.can_encrypt_call(&fixture.graph, &call));
        }
        call_graph.add_callee(call.site.clone(), "main");
        let classifier =
            SafetyClassifier::new(&fixture.module, &values, &call_graph, &catalog, &options);
        assert!(classifier.can_encrypt_call(&fixture.graph, &call));
    }

    #[test]
    fn escaping_function_addresses_cannot_be_replaced() {
        let mut fixture = fixture("frobnicate", true);
        let handler_node = fixture.graph.add_node(NodeFlags::empty(), 0);
        fixture.graph.node_mut(handler_node).unwrap().add_function("handler");
        fixture
            .graph
            .map_global(ValueRef::global("handler"), NodeHandle::new(handler_node, 0));
        let object = fixture.graph.scalar_map()[&ValueRef::local("main", "p")].node;
        fixture
            .graph
            .add_link(object, 8, NodeHandle::new(handler_node, 0))
            .unwrap();

        let classification = fixture.classify(&Options::default());
        assert!(classification.fixed_point_reached);
        assert!(classification.do_not_replace_address.contains("handler"));
        let node = fixture.graph.node(handler_node).unwrap();
        assert!(node.contains(NodeFlags::DO_NOT_REPLACE_ADDRESS));
    }

    #[test]
    fn safe_classes_hold_only_private_globals() {
        let mut fixture = fixture("puts", true);
        let counter = fixture.graph.add_node(NodeFlags::empty(), 4);
        fixture
            .graph
            .map_global(ValueRef::global("counter"), NodeHandle::new(counter, 0));

        let options = crate::datarando::OptionsBuilder::new()
            .safety_analysis(true)
            .build();
        let classification = fixture.classify(&options);
        assert!(classification.safe_nodes.contains(&counter));
        let object = fixture.graph.scalar_map()[&ValueRef::local("main", "p")].node;
        assert!(!classification.safe_nodes.contains(&object));
    }

    /// `main` calls through `fp`, which may reach `first`, handing it `q`
    /// which points to `second`. It then hands `p`, pointing to `first`, to
    /// an external function. Only the second pass sees that the indirect call
    /// lets `second` escape as well.
    fn escaping_chain() -> Fixture {
        let mut module = Module::new("chain");
        let ft = FunctionType::parse("void (i8*)").unwrap();
        for name in &["first", "second"] {
            let mut cfg = ControlFlowGraph::new();
            let block = cfg.new_block().unwrap();
            block.ret(None);
            let index = block.index();
            cfg.set_entry(index).unwrap();
            let params = vec![scalar("x", Type::i8_pointer())];
            module.add_function(Function::new(*name, ft.clone(), params, cfg).unwrap());
        }
        module.add_function(Function::declaration("frobnicate", ft.clone()));

        let mut cfg = ControlFlowGraph::new();
        let entry = cfg.new_block().unwrap();
        let indirect = entry.push(Operation::Call {
            dst: None,
            target: CallTarget::Indirect(expr_scalar("fp", Type::parse("void (i8*)*").unwrap())),
            arguments: vec![expr_scalar("q", Type::i8_pointer())],
            function_type: ft.clone(),
        });
        entry.call(None, "frobnicate", vec![expr_scalar("p", Type::i8_pointer())], ft);
        entry.ret(None);
        let index = entry.index();
        cfg.set_entry(index).unwrap();
        let main_ft = FunctionType::parse("i32 ()").unwrap();
        module.add_function(Function::new("main", main_ft, Vec::new(), cfg).unwrap());

        let mut graph = PointsToGraph::new();
        for (function, pointer) in &[("first", "p"), ("second", "q")] {
            let code = graph.add_node(NodeFlags::empty(), 0);
            graph.node_mut(code).unwrap().add_function(*function);
            graph.map_global(ValueRef::global(*function), NodeHandle::new(code, 0));
            let object = graph.add_node(NodeFlags::empty(), 8);
            graph.add_link(object, 0, NodeHandle::new(code, 0)).unwrap();
            graph.map_scalar(ValueRef::local("main", *pointer), NodeHandle::new(object, 0));
        }

        let mut call_graph = CallGraph::new();
        let site = CallSite::new("main", InstructionLocation::new(index, indirect));
        call_graph.add_callee(site, "first");

        Fixture {
            module,
            graph,
            call_graph,
        }
    }

    #[test]
    fn escaping_addresses_converge_over_several_passes() {
        let mut fixture = escaping_chain();
        let classification = fixture.classify(&Options::default());
        assert!(classification.fixed_point_reached);
        assert_eq!(classification.fixed_point_iterations, 3);
        assert!(classification.do_not_replace_address.contains("first"));
        assert!(classification.do_not_replace_address.contains("second"));
    }

    #[test]
    fn capped_fixed_point_is_reported() {
        let mut fixture = escaping_chain();
        let options = crate::datarando::OptionsBuilder::new()
            .max_fixed_point_iterations(1)
            .build();
        let classification = fixture.classify(&options);
        assert!(!classification.fixed_point_reached);
        assert_eq!(classification.fixed_point_iterations, 1);
        assert!(classification.do_not_replace_address.contains("first"));
        assert!(!classification.do_not_replace_address.contains("second"));
    }
}
