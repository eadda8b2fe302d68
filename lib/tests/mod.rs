//! Randomize small modules, then run them on the executor.

use crate::analysis::*;
use crate::datarando::{tile, DataRando, Options, OptionsBuilder, Report, ENCRYPT_GLOBALS, NULL_MASK};
use crate::executor::{runtime, Driver};
use crate::il::*;
use crate::RC;

fn function<F>(name: &str, signature: &str, params: Vec<Scalar>, body: F) -> Function
where
    F: FnOnce(&mut Block),
{
    let mut cfg = ControlFlowGraph::new();
    let block = cfg.new_block().unwrap();
    body(block);
    let index = block.index();
    cfg.set_entry(index).unwrap();
    Function::new(name, FunctionType::parse(signature).unwrap(), params, cfg).unwrap()
}

fn declare(module: &mut Module, name: &str, signature: &str) {
    module.add_function(Function::declaration(
        name,
        FunctionType::parse(signature).unwrap(),
    ));
}

fn randomize(module: &mut Module, graph: PointsToGraph, options: Options) -> Report {
    let oracle = PrecomputedOracle::new(graph, CallGraph::new());
    DataRando::new(options).unwrap().run(module, &oracle).unwrap()
}

fn driver(module: Module) -> Driver {
    Driver::new(RC::new(module)).unwrap()
}

fn global_node(graph: &mut PointsToGraph, names: &[&str], size: u64) -> usize {
    let node = graph.add_node(NodeFlags::empty(), size);
    for name in names {
        graph.map_global(ValueRef::global(*name), NodeHandle::new(node, 0));
        graph.node_mut(node).unwrap().add_global(*name);
    }
    node
}

fn i32_pointer() -> Type {
    Type::pointer(Type::Int(32))
}

#[test]
fn initialized_globals_are_masked_before_main() {
    let mut module = Module::new("counter");
    module.add_global(GlobalVariable::new(
        "g",
        Type::Int(32),
        Initializer::from_constant(&const_(5, 32)),
    ));
    module.add_function(function("main", "i32 ()", Vec::new(), |block| {
        let g = Expression::global("g", i32_pointer());
        block.load(scalar("x", Type::Int(32)), g, 4);
        block.ret(Some(expr_scalar("x", Type::Int(32))));
    }));
    let mut graph = PointsToGraph::new();
    let node = global_node(&mut graph, &["g"], 4);

    let report = randomize(&mut module, graph, Options::new());
    let mask = report.masks[&node];
    assert_ne!(mask, NULL_MASK);
    assert_eq!(report.statistics.encrypted_globals, 1);
    assert_eq!(module.constructors()[0].function, ENCRYPT_GLOBALS);

    let mut driver = driver(module);
    let g = driver.address_of("g").unwrap();
    assert_eq!(driver.state().memory().load(g, 32).unwrap().value_u64(), Some(5));

    driver.run_constructors().unwrap();
    let stored = driver.state().memory().load(g, 32).unwrap().value_u64().unwrap();
    assert_eq!(stored, 5 ^ (mask & 0xffff_ffff));

    let result = driver.call("main", Vec::new()).unwrap().unwrap();
    assert_eq!(result.value_u64(), Some(5));
}

#[test]
fn narrow_masks_survive_misaligned_reads() {
    let mut module = Module::new("alignment");
    module.add_global(
        GlobalVariable::new("buf", Type::Int(64), Initializer::zeroed(8)).with_alignment(8),
    );
    let word = || Expression::global("buf", Type::pointer(Type::Int(64)));
    module.add_function(function("write", "void ()", Vec::new(), |block| {
        block.store(word(), expr_const(0x1122_3344_5566_7788, 64), 8);
        block.ret(None);
    }));
    module.add_function(function("read_byte", "i8 ()", Vec::new(), |block| {
        let bytes = Expression::bitcast(Type::i8_pointer(), word()).unwrap();
        let third = Expression::gep(Type::i8_pointer(), bytes, expr_const(3, 64)).unwrap();
        block.load(scalar("b", Type::Int(8)), third, 1);
        block.ret(Some(expr_scalar("b", Type::Int(8))));
    }));
    module.add_function(function("read_word", "i64 ()", Vec::new(), |block| {
        block.load(scalar("w", Type::Int(64)), word(), 8);
        block.ret(Some(expr_scalar("w", Type::Int(64))));
    }));
    let mut graph = PointsToGraph::new();
    let node = global_node(&mut graph, &["buf"], 8);

    let options = OptionsBuilder::new().seed(3).effective_mask_size(1).build();
    let report = randomize(&mut module, graph, options);
    let mask = report.masks[&node];
    assert_eq!(mask, tile(mask, 1));

    let mut driver = driver(module);
    driver.run_constructors().unwrap();
    driver.call("write", Vec::new()).unwrap();
    let buf = driver.address_of("buf").unwrap();
    assert_eq!(
        driver.state().memory().load_u64(buf).unwrap(),
        0x1122_3344_5566_7788 ^ mask
    );

    let byte = driver.call("read_byte", Vec::new()).unwrap().unwrap();
    assert_eq!(byte.value_u64(), Some(0x55));
    let word = driver.call("read_word", Vec::new()).unwrap().unwrap();
    assert_eq!(word.value_u64(), Some(0x1122_3344_5566_7788));
}

#[test]
fn library_calls_see_plaintext_through_wrappers() {
    let mut module = Module::new("greeting");
    module.add_global(GlobalVariable::new(
        "s",
        Type::array(Type::Int(8), 6),
        Initializer::new(b"hello\0".to_vec()),
    ));
    declare(&mut module, "strlen", "i64 (i8*)");
    declare(&mut module, "puts", "i32 (i8*)");
    module.add_function(function("main", "i32 ()", Vec::new(), |block| {
        let s = || {
            let global = Expression::global("s", Type::pointer(Type::array(Type::Int(8), 6)));
            Expression::bitcast(Type::i8_pointer(), global).unwrap()
        };
        block.call(
            Some(scalar("n", Type::Int(64))),
            "strlen",
            vec![s()],
            FunctionType::parse("i64 (i8*)").unwrap(),
        );
        block.call(
            None,
            "puts",
            vec![s()],
            FunctionType::parse("i32 (i8*)").unwrap(),
        );
        let n = Expression::trun(Type::Int(32), expr_scalar("n", Type::Int(64))).unwrap();
        block.ret(Some(n));
    }));
    let mut graph = PointsToGraph::new();
    let node = global_node(&mut graph, &["s"], 6);

    let report = randomize(&mut module, graph, OptionsBuilder::new().seed(11).build());
    assert_eq!(report.statistics.wrapped_calls, 2);
    assert_eq!(report.statistics.cant_encrypt_external_call, 0);
    assert!(module.function("drrt_strlen").unwrap().is_declaration());
    assert!(module.function("drrt_puts").unwrap().is_declaration());
    let mask = report.masks[&node];

    let mut driver = driver(module);
    let result = driver.run_main(&[]).unwrap().unwrap();
    assert_eq!(result.value_u64(), Some(5));
    assert_eq!(driver.state().output(), &["hello".to_string()]);

    let s = driver.address_of("s").unwrap();
    let stored = driver.state().memory().load_bytes(s, 6).unwrap();
    let expected: Vec<u8> = b"hello\0"
        .iter()
        .enumerate()
        .map(|(offset, byte)| byte ^ runtime::mask_byte(mask, s + offset as u64))
        .collect();
    assert_eq!(stored, expected);
}

#[test]
fn memory_passed_to_unknown_code_stays_plaintext() {
    let mut module = Module::new("escape");
    module.add_global(GlobalVariable::new(
        "secret",
        Type::Int(64),
        Initializer::from_constant(&const_(42, 64)),
    ));
    declare(&mut module, "frobnicate", "void (i64*)");
    module.add_function(function("main", "i64 ()", Vec::new(), |block| {
        let secret = || Expression::global("secret", Type::pointer(Type::Int(64)));
        block.call(
            None,
            "frobnicate",
            vec![secret()],
            FunctionType::parse("void (i64*)").unwrap(),
        );
        block.load(scalar("x", Type::Int(64)), secret(), 8);
        block.ret(Some(expr_scalar("x", Type::Int(64))));
    }));
    let mut graph = PointsToGraph::new();
    let node = global_node(&mut graph, &["secret"], 8);

    let report = randomize(&mut module, graph, Options::new());
    assert_eq!(report.masks.get(&node).cloned().unwrap_or(NULL_MASK), NULL_MASK);
    assert_eq!(report.statistics.cant_encrypt_external_call, 1);
    assert_eq!(report.statistics.encrypted_globals, 0);
    assert!(module.function(ENCRYPT_GLOBALS).is_none());

    let main = module.function("main").unwrap().control_flow_graph().unwrap();
    assert_eq!(main.blocks()[0].instructions().len(), 3);

    let mut driver = driver(module);
    driver.run_constructors().unwrap();
    let secret = driver.address_of("secret").unwrap();
    assert_eq!(driver.state().memory().load_u64(secret).unwrap(), 42);
}

fn shared_classes() -> (Module, PointsToGraph, usize, usize) {
    let mut module = Module::new("classes");
    for name in &["a", "b", "c"] {
        module.add_global(
            GlobalVariable::new(*name, Type::Int(64), Initializer::zeroed(8)).with_alignment(8),
        );
    }
    let mut graph = PointsToGraph::new();
    let shared = global_node(&mut graph, &["a", "b"], 8);
    let alone = global_node(&mut graph, &["c"], 8);
    (module, graph, shared, alone)
}

#[test]
fn aliasing_globals_share_one_mask() {
    let (mut module, graph, shared, alone) = shared_classes();
    let report = randomize(&mut module, graph, OptionsBuilder::new().seed(7).build());
    assert_eq!(report.statistics.encrypted_globals, 3);
    assert_ne!(report.masks[&shared], report.masks[&alone]);

    let mut driver = driver(module);
    driver.run_constructors().unwrap();
    let load = |name: &str| {
        let address = driver.address_of(name).unwrap();
        driver.state().memory().load_u64(address).unwrap()
    };
    assert_eq!(load("a"), report.masks[&shared]);
    assert_eq!(load("b"), report.masks[&shared]);
    assert_eq!(load("c"), report.masks[&alone]);
}

#[test]
fn masks_depend_only_on_seed_and_salt() {
    let run = |options: Options| {
        let (mut module, graph, _, _) = shared_classes();
        randomize(&mut module, graph, options).masks
    };
    let first = run(OptionsBuilder::new().seed(7).build());
    assert_eq!(first, run(OptionsBuilder::new().seed(7).build()));
    assert_eq!(first, run(OptionsBuilder::new().seed(7).salt("classes").build()));
    assert_ne!(first, run(OptionsBuilder::new().seed(7).salt("other").build()));
    assert_ne!(first, run(OptionsBuilder::new().seed(8).build()));
}

fn heap_sum() -> (Module, PointsToGraph) {
    let mut module = Module::new("heap");
    declare(&mut module, "malloc", "i8* (i64)");
    declare(&mut module, "free", "void (i8*)");
    module.add_function(function("main", "i32 ()", Vec::new(), |block| {
        let p = || expr_scalar("p", Type::i8_pointer());
        let first = || Expression::bitcast(i32_pointer(), p()).unwrap();
        let second = || Expression::gep(i32_pointer(), p(), expr_const(4, 64)).unwrap();
        block.call(
            Some(scalar("p", Type::i8_pointer())),
            "malloc",
            vec![expr_const(16, 64)],
            FunctionType::parse("i8* (i64)").unwrap(),
        );
        block.store(first(), expr_const(7, 32), 4);
        block.store(second(), expr_const(9, 32), 4);
        block.load(scalar("x", Type::Int(32)), first(), 4);
        block.load(scalar("y", Type::Int(32)), second(), 4);
        block.call(
            None,
            "free",
            vec![p()],
            FunctionType::parse("void (i8*)").unwrap(),
        );
        let sum = Expression::add(
            expr_scalar("x", Type::Int(32)),
            expr_scalar("y", Type::Int(32)),
        )
        .unwrap();
        block.ret(Some(sum));
    }));
    let mut graph = PointsToGraph::new();
    let node = graph.add_node(NodeFlags::HEAP, 16);
    graph.node_mut(node).unwrap().set_allocations(1);
    graph.map_scalar(ValueRef::local("main", "p"), NodeHandle::new(node, 0));
    (module, graph)
}

#[test]
fn heap_values_round_trip() {
    let option_sets = vec![
        Options::new(),
        OptionsBuilder::new().seed(1).effective_mask_size(2).build(),
        OptionsBuilder::new()
            .seed(2)
            .always_emit_mask_alignment(true)
            .build(),
    ];
    for options in option_sets {
        let (mut module, graph) = heap_sum();
        let report = randomize(&mut module, graph, options);
        assert_eq!(report.statistics.instrumented, 4);
        assert_eq!(report.statistics.heap_classes, 1);

        let mut driver = driver(module);
        let result = driver.run_main(&[]).unwrap().unwrap();
        assert_eq!(result.value_u64(), Some(16));
    }
}

#[test]
fn command_line_is_encrypted_on_entry() {
    let argv_type = Type::pointer(Type::i8_pointer());
    let mut module = Module::new("echo");
    declare(&mut module, "puts", "i32 (i8*)");
    let params = vec![
        scalar("argc", Type::Int(32)),
        scalar("argv", argv_type.clone()),
    ];
    module.add_function(function("main", "i32 (i32, i8**)", params, |block| {
        let argv = expr_scalar("argv", argv_type.clone());
        let second = Expression::gep(argv_type.clone(), argv, expr_const(8, 64)).unwrap();
        block.load(scalar("arg", Type::i8_pointer()), second, 8);
        block.call(
            None,
            "puts",
            vec![expr_scalar("arg", Type::i8_pointer())],
            FunctionType::parse("i32 (i8*)").unwrap(),
        );
        block.ret(Some(expr_const(0, 32)));
    }));
    let mut graph = PointsToGraph::new();
    let pointers = graph.add_node(NodeFlags::EXTERNAL, 16);
    let strings = graph.add_node(NodeFlags::EXTERNAL, 8);
    graph.add_link(pointers, 0, NodeHandle::new(strings, 0)).unwrap();
    graph.map_scalar(ValueRef::local("main", "argv"), NodeHandle::new(pointers, 0));
    graph.map_scalar(ValueRef::local("main", "arg"), NodeHandle::new(strings, 0));

    let report = randomize(&mut module, graph, OptionsBuilder::new().seed(5).build());
    assert_ne!(report.masks[&pointers], NULL_MASK);
    assert_ne!(report.masks[&strings], NULL_MASK);

    let main = module.function("main").unwrap().control_flow_graph().unwrap();
    match *main.blocks()[0].instructions()[0].operation() {
        Operation::Call { ref target, .. } => assert_eq!(target.direct_name(), Some("drrt_main")),
        ref operation => panic!("unexpected {}", operation),
    }

    let mut driver = driver(module);
    let result = driver.run_main(&["echo", "world"]).unwrap().unwrap();
    assert_eq!(result.value_u64(), Some(0));
    assert_eq!(driver.state().output(), &["world".to_string()]);
}

#[test]
fn loops_read_masked_arrays() {
    let array = Type::array(Type::Int(32), 4);
    let mut bytes = Vec::new();
    for value in 1u32..5 {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    let mut module = Module::new("sum");
    module.add_global(GlobalVariable::new("values", array.clone(), Initializer::new(bytes)));

    let i = || expr_scalar("i", Type::Int(64));
    let sum = || expr_scalar("sum", Type::Int(32));
    let mut cfg = ControlFlowGraph::new();
    let entry = {
        let block = cfg.new_block().unwrap();
        block.assign(scalar("i", Type::Int(64)), expr_const(0, 64));
        block.assign(scalar("sum", Type::Int(32)), expr_const(0, 32));
        block.index()
    };
    let body = {
        let block = cfg.new_block().unwrap();
        let base = Expression::bitcast(
            i32_pointer(),
            Expression::global("values", Type::pointer(array.clone())),
        )
        .unwrap();
        let offset = Expression::mul(i(), expr_const(4, 64)).unwrap();
        let element = Expression::gep(i32_pointer(), base, offset).unwrap();
        block.load(scalar("x", Type::Int(32)), element, 4);
        block.assign(
            scalar("sum", Type::Int(32)),
            Expression::add(sum(), expr_scalar("x", Type::Int(32))).unwrap(),
        );
        block.assign(
            scalar("i", Type::Int(64)),
            Expression::add(i(), expr_const(1, 64)).unwrap(),
        );
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(Some(sum()));
        block.index()
    };
    cfg.set_entry(entry).unwrap();
    cfg.unconditional_edge(entry, body).unwrap();
    let done = Expression::cmpeq(i(), expr_const(4, 64)).unwrap();
    let more = Expression::cmpneq(i(), expr_const(4, 64)).unwrap();
    cfg.conditional_edge(body, body, more).unwrap();
    cfg.conditional_edge(body, exit, done).unwrap();
    let ft = FunctionType::parse("i32 ()").unwrap();
    module.add_function(Function::new("main", ft, Vec::new(), cfg).unwrap());

    let mut graph = PointsToGraph::new();
    let node = global_node(&mut graph, &["values"], 16);
    let report = randomize(&mut module, graph, OptionsBuilder::new().seed(13).build());
    assert_ne!(report.masks[&node], NULL_MASK);
    assert!(module.function("drrt_xor_mem").unwrap().is_declaration());

    let mut driver = driver(module);
    let result = driver.run_main(&[]).unwrap().unwrap();
    assert_eq!(result.value_u64(), Some(10));
}

#[test]
fn reassigned_load_destinations_keep_later_writes() {
    let mut module = Module::new("reassign");
    for &(name, value) in &[("g", 5), ("h", 7)] {
        module.add_global(
            GlobalVariable::new(name, Type::Int(32), Initializer::from_constant(&const_(value, 32)))
                .with_alignment(8),
        );
    }
    module.add_function(function("main", "i32 ()", Vec::new(), |block| {
        let x = || expr_scalar("x", Type::Int(32));
        block.load(scalar("x", Type::Int(32)), Expression::global("g", i32_pointer()), 4);
        block.assign(
            scalar("x", Type::Int(32)),
            Expression::add(x(), expr_const(1, 32)).unwrap(),
        );
        block.assign(scalar("y", Type::Int(32)), x());
        block.load(scalar("x", Type::Int(32)), Expression::global("h", i32_pointer()), 4);
        let sum = Expression::add(x(), expr_scalar("y", Type::Int(32))).unwrap();
        block.ret(Some(sum));
    }));
    let mut graph = PointsToGraph::new();
    let g = global_node(&mut graph, &["g"], 4);
    let h = global_node(&mut graph, &["h"], 4);

    let report = randomize(&mut module, graph, OptionsBuilder::new().seed(17).build());
    assert_ne!(report.masks[&g], report.masks[&h]);
    assert_eq!(report.statistics.instrumented, 2);

    let mut driver = driver(module);
    let result = driver.run_main(&[]).unwrap().unwrap();
    assert_eq!(result.value_u64(), Some(13));
}

#[test]
fn pointer_chasing_reloads_through_one_scalar() {
    let link = Type::pointer(Type::i8_pointer());
    let mut module = Module::new("chain");
    for &(name, next) in &[("n0", Some("n1")), ("n1", Some("n2")), ("n2", None)] {
        let initializer = match next {
            Some(next) => Initializer::zeroed(8).with_relocation(0, next),
            None => Initializer::zeroed(8),
        };
        module.add_global(
            GlobalVariable::new(name, Type::i8_pointer(), initializer).with_alignment(8),
        );
    }

    let p = || expr_scalar("p", link.clone());
    let count = || expr_scalar("count", Type::Int(32));
    let mut cfg = ControlFlowGraph::new();
    let entry = {
        let block = cfg.new_block().unwrap();
        block.assign(scalar("p", link.clone()), Expression::global("n0", link.clone()));
        block.assign(scalar("count", Type::Int(32)), expr_const(0, 32));
        block.index()
    };
    let body = {
        let block = cfg.new_block().unwrap();
        block.load(scalar("p", link.clone()), p(), 8);
        block.assign(
            scalar("count", Type::Int(32)),
            Expression::add(count(), expr_const(1, 32)).unwrap(),
        );
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(Some(count()));
        block.index()
    };
    cfg.set_entry(entry).unwrap();
    cfg.unconditional_edge(entry, body).unwrap();
    let address = || Expression::ptr_to_int(Type::Int(64), p()).unwrap();
    let done = Expression::cmpeq(address(), expr_const(0, 64)).unwrap();
    let more = Expression::cmpneq(address(), expr_const(0, 64)).unwrap();
    cfg.conditional_edge(body, body, more).unwrap();
    cfg.conditional_edge(body, exit, done).unwrap();
    let ft = FunctionType::parse("i32 ()").unwrap();
    module.add_function(Function::new("main", ft, Vec::new(), cfg).unwrap());

    let mut graph = PointsToGraph::new();
    let node = global_node(&mut graph, &["n0", "n1", "n2"], 8);
    graph.add_link(node, 0, NodeHandle::new(node, 0)).unwrap();
    graph.map_scalar(ValueRef::local("main", "p"), NodeHandle::new(node, 0));

    let report = randomize(&mut module, graph, OptionsBuilder::new().seed(19).build());
    let mask = report.masks[&node];
    assert_ne!(mask, NULL_MASK);
    assert_eq!(report.statistics.instrumented, 1);

    let mut driver = driver(module);
    driver.run_constructors().unwrap();
    let n0 = driver.address_of("n0").unwrap();
    let n1 = driver.address_of("n1").unwrap();
    assert_eq!(driver.state().memory().load_u64(n0).unwrap(), n1 ^ mask);

    let result = driver.call("main", Vec::new()).unwrap().unwrap();
    assert_eq!(result.value_u64(), Some(3));
}

#[test]
fn atomics_round_trip_through_masked_memory() {
    let mut module = Module::new("atomics");
    module.add_global(
        GlobalVariable::new("g", Type::Int(32), Initializer::from_constant(&const_(5, 32)))
            .with_alignment(8),
    );
    module.add_function(function("main", "i32 ()", Vec::new(), |block| {
        let g = || Expression::global("g", i32_pointer());
        let value = |name: &str| expr_scalar(name, Type::Int(32));
        block.push(Operation::CmpXchg {
            dst: scalar("swapped", Type::Int(32)),
            index: g(),
            compare: expr_const(5, 32),
            new: expr_const(9, 32),
            alignment: 4,
        });
        block.push(Operation::AtomicRmw {
            dst: scalar("exchanged", Type::Int(32)),
            op: RmwOp::Xchg,
            index: g(),
            src: expr_const(0xa0, 32),
            alignment: 4,
        });
        block.push(Operation::AtomicRmw {
            dst: scalar("flipped", Type::Int(32)),
            op: RmwOp::Xor,
            index: g(),
            src: expr_const(0x0f, 32),
            alignment: 4,
        });
        block.load(scalar("last", Type::Int(32)), g(), 4);
        let mut sum = value("swapped");
        for name in &["exchanged", "flipped", "last"] {
            sum = Expression::add(sum, value(*name)).unwrap();
        }
        block.ret(Some(sum));
    }));
    let mut graph = PointsToGraph::new();
    let node = global_node(&mut graph, &["g"], 4);

    let report = randomize(&mut module, graph, OptionsBuilder::new().seed(23).build());
    let mask = report.masks[&node];
    assert_eq!(report.statistics.instrumented, 4);

    let mut driver = driver(module);
    let result = driver.run_main(&[]).unwrap().unwrap();
    // 5 + 9 + 0xa0 + 0xaf
    assert_eq!(result.value_u64(), Some(349));
    let g = driver.address_of("g").unwrap();
    let stored = driver.state().memory().load(g, 32).unwrap().value_u64().unwrap();
    assert_eq!(stored, 0xaf ^ (mask & 0xffff_ffff));
}

#[test]
fn memset_fills_with_masked_bytes() {
    let buffer = Type::array(Type::Int(8), 16);
    let mut module = Module::new("fill");
    module.add_global(
        GlobalVariable::new("buf", buffer.clone(), Initializer::zeroed(16)).with_alignment(8),
    );
    module.add_function(function("main", "i64 ()", Vec::new(), |block| {
        let bytes = Expression::bitcast(
            Type::i8_pointer(),
            Expression::global("buf", Type::pointer(buffer.clone())),
        )
        .unwrap();
        block.push(Operation::MemSet {
            dst: bytes.clone(),
            value: expr_const(0x41, 8),
            length: expr_const(16, 64),
            alignment: 8,
        });
        let upper = Expression::gep(Type::pointer(Type::Int(64)), bytes, expr_const(8, 64)).unwrap();
        block.load(scalar("w", Type::Int(64)), upper, 8);
        block.ret(Some(expr_scalar("w", Type::Int(64))));
    }));
    let mut graph = PointsToGraph::new();
    let node = global_node(&mut graph, &["buf"], 16);

    let report = randomize(&mut module, graph, OptionsBuilder::new().seed(29).build());
    let mask = report.masks[&node];
    assert!(module.function("drrt_memset").unwrap().is_declaration());

    let mut driver = driver(module);
    let result = driver.run_main(&[]).unwrap().unwrap();
    assert_eq!(result.value_u64(), Some(0x4141_4141_4141_4141));

    let buf = driver.address_of("buf").unwrap();
    let stored = driver.state().memory().load_bytes(buf, 16).unwrap();
    let expected: Vec<u8> = (0..16)
        .map(|offset| 0x41 ^ runtime::mask_byte(mask, buf + offset))
        .collect();
    assert_eq!(stored, expected);
}

#[test]
fn variadic_arguments_are_read_in_plaintext() {
    let list_type = Type::pointer(Type::i8_pointer());
    let mut module = Module::new("varargs");
    let params = vec![scalar("n", Type::Int(32))];
    module.add_function(function("sum", "i32 (i32, ...)", params, |block| {
        let list = || expr_scalar("list", list_type.clone());
        block.push(Operation::Alloca {
            dst: scalar("list", list_type.clone()),
            ty: Type::i8_pointer(),
            alignment: 8,
        });
        block.push(Operation::VaStart { list: list() });
        for name in &["a", "b"] {
            block.push(Operation::VaArg {
                dst: scalar(*name, Type::Int(32)),
                list: list(),
            });
        }
        let sum = Expression::add(
            expr_scalar("a", Type::Int(32)),
            expr_scalar("b", Type::Int(32)),
        )
        .unwrap();
        block.ret(Some(sum));
    }));
    module.add_function(function("main", "i32 ()", Vec::new(), |block| {
        block.call(
            Some(scalar("r", Type::Int(32))),
            "sum",
            vec![expr_const(2, 32), expr_const(3, 32), expr_const(4, 32)],
            FunctionType::parse("i32 (i32, ...)").unwrap(),
        );
        block.ret(Some(expr_scalar("r", Type::Int(32))));
    }));
    let mut graph = PointsToGraph::new();
    let list = graph.add_node(NodeFlags::empty(), 8);
    graph.map_scalar(ValueRef::local("sum", "list"), NodeHandle::new(list, 0));

    let report = randomize(&mut module, graph, OptionsBuilder::new().seed(31).build());
    assert_eq!(report.statistics.cant_encrypt_va_list, 1);
    assert_eq!(report.masks.get(&list).cloned().unwrap_or(NULL_MASK), NULL_MASK);
    assert_eq!(report.statistics.instrumented, 0);

    let mut driver = driver(module);
    let result = driver.run_main(&[]).unwrap().unwrap();
    assert_eq!(result.value_u64(), Some(7));
}
