//! A `Module` is one compilation unit: struct types, globals and functions.

use crate::il::*;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A function run before `main`. Lower priorities run first.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Constructor {
    pub priority: u32,
    pub function: String,
}

impl Constructor {
    pub fn new<S: Into<String>>(priority: u32, function: S) -> Constructor {
        Constructor {
            priority,
            function: function.into(),
        }
    }
}

/// Items keyed by their own name, serialized as a plain list.
trait Named {
    fn key(&self) -> &str;
}

impl Named for Function {
    fn key(&self) -> &str {
        self.name()
    }
}

impl Named for GlobalVariable {
    fn key(&self) -> &str {
        self.name()
    }
}

mod by_name {
    use super::Named;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<T, S>(map: &BTreeMap<String, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
    where
        T: Named + Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(items
            .into_iter()
            .map(|item| (item.key().to_string(), item))
            .collect())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Module {
    name: String,
    #[serde(default)]
    data_layout: DataLayout,
    #[serde(default)]
    structs: StructTable,
    #[serde(default, with = "by_name")]
    globals: BTreeMap<String, GlobalVariable>,
    #[serde(default, with = "by_name")]
    functions: BTreeMap<String, Function>,
    #[serde(default)]
    constructors: Vec<Constructor>,
}

impl Module {
    pub fn new<S: Into<String>>(name: S) -> Module {
        Module {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_layout(&self) -> &DataLayout {
        &self.data_layout
    }

    pub fn set_data_layout(&mut self, data_layout: DataLayout) {
        self.data_layout = data_layout;
    }

    pub fn structs(&self) -> &StructTable {
        &self.structs
    }

    pub fn add_struct<S: Into<String>>(&mut self, name: S, body: StructBody) {
        self.structs.insert(name.into(), body);
    }

    /// Layout information for the types of this module.
    pub fn layout(&self) -> Layout {
        Layout::new(self.data_layout.clone(), self.structs.clone())
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalVariable> {
        self.globals.values()
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.get(name)
    }

    pub fn global_mut(&mut self, name: &str) -> Option<&mut GlobalVariable> {
        self.globals.get_mut(name)
    }

    /// Add a global, replacing any existing global of the same name.
    pub fn add_global(&mut self, global: GlobalVariable) {
        self.globals.insert(global.name().to_string(), global);
    }

    pub fn global_names(&self) -> Vec<String> {
        self.globals.keys().cloned().collect()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    /// Add a function, replacing any existing function of the same name.
    pub fn add_function(&mut self, function: Function) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    /// Get the function `name`, declaring it with `function_type` if it does
    /// not exist yet.
    pub fn get_or_insert_function(&mut self, name: &str, function_type: &FunctionType) -> &Function {
        self.functions
            .entry(name.to_string())
            .or_insert_with(|| Function::declaration(name, function_type.clone()))
    }

    pub fn constructors(&self) -> &[Constructor] {
        &self.constructors
    }

    pub fn constructors_mut(&mut self) -> &mut Vec<Constructor> {
        &mut self.constructors
    }

    /// The address of the global variable or function `name`.
    pub fn address_of(&self, name: &str) -> Result<Expression, Error> {
        if let Some(global) = self.global(name) {
            Ok(Expression::global(name, global.pointer_type()))
        } else if let Some(function) = self.function(name) {
            Ok(Expression::global(name, function.pointer_type()))
        } else {
            Err(Error::GlobalNotFound(name.to_string()))
        }
    }

    /// The type of the value `value`, if it exists in this module.
    pub fn value_type(&self, value: &ValueRef) -> Option<Type> {
        match *value {
            ValueRef::Global(ref name) => self.address_of(name).ok().map(|address| address.ty()),
            ValueRef::Local {
                ref function,
                ref scalar,
            } => self
                .function(function)
                .and_then(|function| function.scalar_types().get(scalar.as_str()).cloned())
                .cloned(),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (name, body) in &self.structs {
            match body.fields() {
                Some(fields) => {
                    let fields: Vec<String> = fields.iter().map(|t| t.to_string()).collect();
                    writeln!(f, "%{} = type {{ {} }}", name, fields.join(", "))?;
                }
                None => writeln!(f, "%{} = type opaque", name)?,
            }
        }
        for global in self.globals() {
            writeln!(f, "{}", global)?;
        }
        for constructor in &self.constructors {
            writeln!(f, "; constructor {} @{}", constructor.priority, constructor.function)?;
        }
        for function in self.functions() {
            writeln!(f, "{}", function)?;
        }
        Ok(())
    }
}

#[test]
fn module_json_lists_functions_by_value() {
    let mut module = Module::new("m");
    module.add_function(Function::declaration(
        "puts",
        FunctionType::parse("i32 (i8*)").unwrap(),
    ));
    module.add_global(GlobalVariable::new(
        "g",
        Type::Int(32),
        Initializer::from_constant(&const_(5, 32)),
    ));
    let json = serde_json::to_value(&module).unwrap();
    assert!(json["functions"].is_array());
    let parsed: Module = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, module);
    assert_eq!(
        parsed.value_type(&ValueRef::global("g")),
        Some(Type::pointer(Type::Int(32)))
    );
}
