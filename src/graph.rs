//! A minimal concrete dataflow graph (§1b) good enough to build, rewrite, and
//! walk the operator set in §4.3, mirroring how the reference crate
//! represents its own frontend IR as a `StableGraph<Operation, OperandInfo>`.
//!
//! Shape inference and layout planning beyond what the executable runner
//! needs for kernel dispatch stay out of scope; nodes carry their output
//! shape/dtype as fixed metadata rather than deriving it.

use petgraph::stable_graph::StableGraph;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

pub use petgraph::stable_graph::NodeIndex;

use crate::error::{Error, Result};
use crate::tensor::Datatype;

/// The operator set named in §4.3, plus `Input`/`Output` markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    /// A graph input; bound to a tensor by name when the executable runs.
    Input {
        /// Name the executable looks up bound input tensors by.
        name: String,
    },
    /// A graph output; the executable returns this node's tensor.
    Output,
    /// §4.3.1.
    Add,
    /// §4.3.2.
    Multiply,
    /// §4.3.3.
    Negate,
    /// §4.3.4. `reduction_axes` is the trailing-axis count `r` reduced over.
    Dot {
        /// Count of trailing axes of the left operand (leading axes of the
        /// right operand) contracted over.
        reduction_axes: usize,
    },
    /// §4.3.6.
    Broadcast {
        /// The node's output shape.
        out_shape: Vec<usize>,
        /// Axes of `out_shape` not present in the input.
        broadcast_axes: Vec<usize>,
    },
    /// §4.7: splice target after every `Multiply`/`Dot`.
    Relinearize,
    /// §4.3.5.
    Rescale,
}

impl Operator {
    /// Whether this operator produces a ciphertext of degree 3, requiring a
    /// `Relinearize` before any non-multiply consumer (§3 invariant 2).
    pub fn raises_degree(&self) -> bool {
        matches!(self, Operator::Multiply | Operator::Dot { .. })
    }
}

/// One graph node: an operator plus its output tensor's static shape/dtype.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// The operation this node performs.
    pub operator: Operator,
    /// This node's output shape.
    pub shape: Vec<usize>,
    /// This node's output element datatype.
    pub dtype: Datatype,
}

impl Node {
    /// Builds a node with the given operator and output metadata.
    pub fn new(operator: Operator, shape: Vec<usize>, dtype: Datatype) -> Self {
        Self {
            operator,
            shape,
            dtype,
        }
    }
}

/// Edge weight recording which operand position the source node feeds into
/// the target (operand order matters for `Dot`/non-commutative shapes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandInfo {
    /// 0-based operand position at the target node.
    pub operand_index: u8,
}

/// The dataflow graph: nodes are operators, edges carry operand order.
#[derive(Debug, Default)]
pub struct Graph {
    inner: StableGraph<Node, OperandInfo>,
}

impl Graph {
    /// An empty graph.
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
        }
    }

    /// Adds a node, returning its index.
    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        self.inner.add_node(node)
    }

    /// Adds an edge from `from` into `to` at `operand_index`.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, operand_index: u8) {
        self.inner.add_edge(from, to, OperandInfo { operand_index });
    }

    /// Borrows a node.
    pub fn node(&self, ix: NodeIndex) -> &Node {
        &self.inner[ix]
    }

    /// Mutably borrows a node.
    pub fn node_mut(&mut self, ix: NodeIndex) -> &mut Node {
        &mut self.inner[ix]
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// This node's operands, in operand order.
    pub fn operands_of(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        let mut ordered: Vec<(u8, NodeIndex)> = self
            .inner
            .edges_directed(ix, Direction::Incoming)
            .map(|e| (e.weight().operand_index, e.source()))
            .collect();
        ordered.sort_by_key(|(idx, _)| *idx);
        ordered.into_iter().map(|(_, ix)| ix).collect()
    }

    /// Nodes that consume this node's output, and at which operand position.
    pub fn consumers_of(&self, ix: NodeIndex) -> Vec<(NodeIndex, u8)> {
        self.inner
            .edges_directed(ix, Direction::Outgoing)
            .map(|e| (e.target(), e.weight().operand_index))
            .collect()
    }

    /// Removes an edge between two nodes, if one exists (used by the
    /// relinearize-insertion pass to splice a node into an existing edge).
    pub fn remove_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if let Some(e) = self.inner.find_edge(from, to) {
            self.inner.remove_edge(e);
        }
    }

    /// A topological walk order, leaves first.
    pub fn topo_order(&self) -> Result<Vec<NodeIndex>> {
        petgraph::algo::toposort(&self.inner, None).map_err(|_| Error::GraphCycle)
    }

    /// Every live node's index, in no particular order.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.inner.node_indices()
    }
}

/// One edge in a [`GraphSpec`]: `(source_index, target_index, operand_index)`
/// where the indices refer to positions in `GraphSpec::nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Index into `GraphSpec::nodes` of the edge's source.
    pub from: usize,
    /// Index into `GraphSpec::nodes` of the edge's target.
    pub to: usize,
    /// Which operand position at the target this edge feeds.
    pub operand_index: u8,
}

/// The on-disk shape of a `--graph` file: a flat node list plus edges
/// addressing nodes by position, since [`Graph`] itself (a `petgraph`
/// `StableGraph`) isn't `serde`-enabled in this crate's dependency set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSpec {
    /// Nodes, in the order their `NodeIndex` will be assigned.
    pub nodes: Vec<Node>,
    /// Edges referencing node positions.
    pub edges: Vec<EdgeSpec>,
}

impl GraphSpec {
    /// Builds a runnable [`Graph`] from this description.
    pub fn build(&self) -> Result<Graph> {
        let mut g = Graph::new();
        let mut indices = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            indices.push(g.add_node(node.clone()));
        }
        for edge in &self.edges {
            let from = *indices.get(edge.from).ok_or_else(|| {
                Error::ShapeMismatch(format!("edge references unknown node index {}", edge.from))
            })?;
            let to = *indices.get(edge.to).ok_or_else(|| {
                Error::ShapeMismatch(format!("edge references unknown node index {}", edge.to))
            })?;
            g.add_edge(from, to, edge.operand_index);
        }
        Ok(g)
    }

    /// Reads and parses a `GraphSpec` from a JSON file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::ShapeMismatch(format!("graph file parse error: {e}")))
    }

    /// Finds the shape of the named `Input` node, if present.
    pub fn input_shape(&self, name: &str) -> Option<&[usize]> {
        self.nodes.iter().find_map(|n| match &n.operator {
            Operator::Input { name: n_name } if n_name == name => Some(n.shape.as_slice()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topo_order_respects_dependencies() {
        let mut g = Graph::new();
        let a = g.add_node(Node::new(
            Operator::Input { name: "a".into() },
            vec![1],
            Datatype::F64,
        ));
        let b = g.add_node(Node::new(
            Operator::Input { name: "b".into() },
            vec![1],
            Datatype::F64,
        ));
        let add = g.add_node(Node::new(Operator::Add, vec![1], Datatype::F64));
        g.add_edge(a, add, 0);
        g.add_edge(b, add, 1);

        let order = g.topo_order().unwrap();
        let pos = |ix: NodeIndex| order.iter().position(|&x| x == ix).unwrap();
        assert!(pos(a) < pos(add));
        assert!(pos(b) < pos(add));
    }

    #[test]
    fn operands_of_respects_operand_index() {
        let mut g = Graph::new();
        let a = g.add_node(Node::new(
            Operator::Input { name: "a".into() },
            vec![1],
            Datatype::F64,
        ));
        let b = g.add_node(Node::new(
            Operator::Input { name: "b".into() },
            vec![1],
            Datatype::F64,
        ));
        let add = g.add_node(Node::new(Operator::Add, vec![1], Datatype::F64));
        // Insert out of order to confirm sorting, not insertion order, wins.
        g.add_edge(b, add, 1);
        g.add_edge(a, add, 0);

        assert_eq!(g.operands_of(add), vec![a, b]);
    }

    #[test]
    fn graph_spec_builds_matching_topology() {
        let spec = GraphSpec {
            nodes: vec![
                Node::new(Operator::Input { name: "a".into() }, vec![2], Datatype::F64),
                Node::new(Operator::Input { name: "b".into() }, vec![2], Datatype::F64),
                Node::new(Operator::Add, vec![2], Datatype::F64),
                Node::new(Operator::Output, vec![2], Datatype::F64),
            ],
            edges: vec![
                EdgeSpec { from: 0, to: 2, operand_index: 0 },
                EdgeSpec { from: 1, to: 2, operand_index: 1 },
                EdgeSpec { from: 2, to: 3, operand_index: 0 },
            ],
        };
        let g = spec.build().unwrap();
        assert_eq!(g.node_count(), 4);
        assert_eq!(spec.input_shape("a"), Some(&[2usize][..]));
        assert_eq!(spec.input_shape("missing"), None);
    }

    #[test]
    fn graph_spec_round_trips_through_json() {
        let spec = GraphSpec {
            nodes: vec![Node::new(
                Operator::Input { name: "x".into() },
                vec![4],
                Datatype::F64,
            )],
            edges: vec![],
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: GraphSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nodes.len(), 1);
    }

    #[test]
    fn graph_spec_rejects_dangling_edge() {
        let spec = GraphSpec {
            nodes: vec![Node::new(
                Operator::Input { name: "x".into() },
                vec![4],
                Datatype::F64,
            )],
            edges: vec![EdgeSpec { from: 0, to: 5, operand_index: 0 }],
        };
        assert!(spec.build().is_err());
    }

    #[test]
    fn graph_spec_loads_from_a_real_file() {
        let spec = GraphSpec {
            nodes: vec![
                Node::new(Operator::Input { name: "x".into() }, vec![5], Datatype::F64),
                Node::new(Operator::Output, vec![5], Datatype::F64),
            ],
            edges: vec![EdgeSpec { from: 0, to: 1, operand_index: 0 }],
        };
        let json = serde_json::to_string_pretty(&spec).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, json).unwrap();

        let loaded = GraphSpec::load(&path).unwrap();
        assert_eq!(loaded.input_shape("x"), Some(&[5usize][..]));
        let g = loaded.build().unwrap();
        assert_eq!(g.node_count(), 2);
    }

    #[test]
    fn graph_spec_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        assert!(GraphSpec::load(&path).is_err());
    }
}
