use crate::il::*;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A function is either defined, with a `ControlFlowGraph`, or declared and
/// provided by some other unit at link time.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Function {
    name: String,
    function_type: FunctionType,
    // The scalars holding each fixed parameter on entry
    #[serde(default)]
    params: Vec<Scalar>,
    // The `ControlFlowGraph` capturing semantics of the function
    #[serde(default)]
    control_flow_graph: Option<ControlFlowGraph>,
    // Internal functions are not visible outside the module
    #[serde(default)]
    internal: bool,
}

impl Function {
    /// Create a defined function.
    ///
    /// # Error
    /// The parameter scalars do not match the types of `function_type`.
    pub fn new<S: Into<String>>(
        name: S,
        function_type: FunctionType,
        params: Vec<Scalar>,
        control_flow_graph: ControlFlowGraph,
    ) -> Result<Function, Error> {
        let name = name.into();
        if params.len() != function_type.num_params()
            || params
                .iter()
                .zip(function_type.params())
                .any(|(param, ty)| param.ty() != ty)
        {
            return Err(Error::Signature(
                function_type.to_string(),
                format!("parameters of {} do not match", name),
            ));
        }
        Ok(Function {
            name,
            function_type,
            params,
            control_flow_graph: Some(control_flow_graph),
            internal: false,
        })
    }

    /// Create a function declaration.
    pub fn declaration<S: Into<String>>(name: S, function_type: FunctionType) -> Function {
        Function {
            name: name.into(),
            function_type,
            params: Vec::new(),
            control_flow_graph: None,
            internal: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function_type(&self) -> &FunctionType {
        &self.function_type
    }

    /// The type of this function's address.
    pub fn pointer_type(&self) -> Type {
        Type::pointer(Type::function(self.function_type.clone()))
    }

    pub fn params(&self) -> &[Scalar] {
        &self.params
    }

    pub fn control_flow_graph(&self) -> Option<&ControlFlowGraph> {
        self.control_flow_graph.as_ref()
    }

    pub fn control_flow_graph_mut(&mut self) -> Option<&mut ControlFlowGraph> {
        self.control_flow_graph.as_mut()
    }

    pub fn is_declaration(&self) -> bool {
        self.control_flow_graph.is_none()
    }

    /// Intrinsics are functions provided by the compiler, named `llvm.*`.
    pub fn is_intrinsic(&self) -> bool {
        self.name.starts_with("llvm.")
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn set_internal(&mut self, internal: bool) {
        self.internal = internal;
    }

    /// The type of every scalar this function defines or uses, by name.
    pub fn scalar_types(&self) -> BTreeMap<&str, &Type> {
        let mut types = BTreeMap::new();
        for param in &self.params {
            types.insert(param.name(), param.ty());
        }
        if let Some(ref cfg) = self.control_flow_graph {
            for block in cfg.blocks() {
                for instruction in block.instructions() {
                    if let Some(scalar) = instruction.scalar_written() {
                        types.insert(scalar.name(), scalar.ty());
                    }
                    for scalar in instruction.scalars_read() {
                        types.entry(scalar.name()).or_insert_with(|| scalar.ty());
                    }
                }
            }
        }
        types
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        match self.control_flow_graph {
            Some(ref cfg) => {
                writeln!(f, "define @{}({}) : {}", self.name, params.join(", "), self.function_type)?;
                write!(f, "{}", cfg)
            }
            None => writeln!(f, "declare @{} : {}", self.name, self.function_type),
        }
    }
}

#[test]
fn parameters_must_match_type() {
    let function_type = FunctionType::parse("i32 (i32, i8**)").unwrap();
    let params = vec![
        scalar("argc", Type::Int(32)),
        scalar("argv", Type::parse("i8**").unwrap()),
    ];
    assert!(Function::new("main", function_type.clone(), params, ControlFlowGraph::new()).is_ok());

    let params = vec![scalar("argc", Type::Int(32))];
    assert!(Function::new("main", function_type, params, ControlFlowGraph::new()).is_err());
}
