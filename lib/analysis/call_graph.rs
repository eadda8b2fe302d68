use crate::analysis::points_to::pairs;
use crate::il::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A call instruction within a module.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CallSite {
    pub function: String,
    pub location: InstructionLocation,
}

impl CallSite {
    pub fn new<S: Into<String>>(function: S, location: InstructionLocation) -> CallSite {
        CallSite {
            function: function.into(),
            location,
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.function, self.location)
    }
}

/// The potential callees of indirect call sites.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CallGraph {
    #[serde(with = "pairs")]
    callees: BTreeMap<CallSite, BTreeSet<String>>,
}

impl CallGraph {
    pub fn new() -> CallGraph {
        CallGraph::default()
    }

    pub fn add_callee<S: Into<String>>(&mut self, call_site: CallSite, callee: S) {
        self.callees
            .entry(call_site)
            .or_insert_with(BTreeSet::new)
            .insert(callee.into());
    }

    /// Every function which may be called from `call_site`. Call sites the
    /// analysis never resolved have no callees.
    pub fn callees(&self, call_site: &CallSite) -> impl Iterator<Item = &str> {
        self.callees
            .get(call_site)
            .into_iter()
            .flat_map(|callees| callees.iter().map(|callee| callee.as_str()))
    }

    pub fn call_sites(&self) -> impl Iterator<Item = &CallSite> {
        self.callees.keys()
    }
}

#[test]
fn unresolved_call_sites_have_no_callees() {
    let mut call_graph = CallGraph::new();
    let site = CallSite::new("main", InstructionLocation::new(0, 3));
    call_graph.add_callee(site.clone(), "handler");
    call_graph.add_callee(site.clone(), "other");

    let callees: Vec<&str> = call_graph.callees(&site).collect();
    assert_eq!(callees, vec!["handler", "other"]);
    let unresolved = CallSite::new("main", InstructionLocation::new(0, 4));
    assert_eq!(call_graph.callees(&unresolved).count(), 0);

    let json = serde_json::to_string(&call_graph).unwrap();
    assert_eq!(serde_json::from_str::<CallGraph>(&json).unwrap(), call_graph);
}
