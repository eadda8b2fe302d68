use crate::analysis::{CallGraph, PointsToGraph};
use crate::il;
use crate::Error;
use serde::{Deserialize, Serialize};

/// A whole-program points-to analysis.
///
/// The randomization pass consumes this, and never computes aliasing itself.
pub trait AliasOracle {
    /// The storage-node graph of `module`, with value mappings for its
    /// globals and scalars.
    fn points_to(&self, module: &il::Module) -> Result<PointsToGraph, Error>;

    /// Resolution of the indirect call sites of `module`.
    fn call_graph(&self, module: &il::Module) -> Result<CallGraph, Error>;
}

/// An oracle serving results computed ahead of time, for example by an
/// external tool and exchanged as JSON.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PrecomputedOracle {
    points_to: PointsToGraph,
    #[serde(default)]
    call_graph: CallGraph,
}

impl PrecomputedOracle {
    pub fn new(points_to: PointsToGraph, call_graph: CallGraph) -> PrecomputedOracle {
        PrecomputedOracle {
            points_to,
            call_graph,
        }
    }
}

impl AliasOracle for PrecomputedOracle {
    fn points_to(&self, _: &il::Module) -> Result<PointsToGraph, Error> {
        Ok(self.points_to.clone())
    }

    fn call_graph(&self, _: &il::Module) -> Result<CallGraph, Error> {
        Ok(self.call_graph.clone())
    }
}
