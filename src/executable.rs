//! The executable runner (§4.6): walks a graph topologically, dispatches
//! kernels by operator, and materializes output tensors of the right
//! shape/encryption-state, timing each node into a [`PerformanceCounter`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeIndex, Operator};
use crate::kernel;
use crate::scheme::SchemeContext;
use crate::tensor::HeTensor;
use crate::value::HeValue;

/// Accumulates per-node wall-clock timing across one or more `run` calls.
///
/// Guarded by a `Mutex` per §5 ("guard with a lock if read concurrently") —
/// a single `Executable` is expected to run one graph walk at a time, but the
/// counter may be read from another thread (e.g. a metrics endpoint) while
/// a run is in flight.
#[derive(Debug, Default)]
pub struct PerformanceCounter {
    totals: Mutex<HashMap<String, Duration>>,
}

impl PerformanceCounter {
    fn record(&self, label: &str, elapsed: Duration) {
        let mut totals = self
            .totals
            .lock()
            .expect("performance counter mutex poisoned");
        *totals.entry(label.to_string()).or_default() += elapsed;
    }

    /// A snapshot of accumulated per-node timing.
    pub fn snapshot(&self) -> HashMap<String, Duration> {
        self.totals
            .lock()
            .expect("performance counter mutex poisoned")
            .clone()
    }
}

/// A graph, relinearize-rewritten at construction time, ready to run.
pub struct Executable {
    graph: Graph,
    performance: PerformanceCounter,
}

impl Executable {
    /// Builds an executable from `graph`, running the insert-relinearize
    /// pass (§4.7) once up front.
    pub fn new(mut graph: Graph) -> Self {
        crate::pass::insert_relinearize(&mut graph);
        Self {
            graph,
            performance: PerformanceCounter::default(),
        }
    }

    /// Accumulated per-node timing across every `run` so far.
    pub fn performance_data(&self) -> HashMap<String, Duration> {
        self.performance.snapshot()
    }

    /// Runs the graph against `inputs` (by `Input` node name), returning the
    /// single `Output` node's tensor.
    pub fn run(&self, ctx: &SchemeContext, inputs: &HashMap<String, HeTensor>) -> Result<HeTensor> {
        let order = self.graph.topo_order()?;
        let mut values: HashMap<NodeIndex, HeTensor> = HashMap::new();
        let mut output: Option<HeTensor> = None;

        for ix in order {
            let node = self.graph.node(ix);
            let label = operator_label(&node.operator);
            let start = Instant::now();

            let result = match &node.operator {
                Operator::Input { name } => inputs.get(name).cloned().ok_or_else(|| {
                    Error::ShapeMismatch(format!("no input tensor bound for '{name}'"))
                })?,
                Operator::Output => {
                    let src = self.only_operand(ix)?;
                    values
                        .get(&src)
                        .cloned()
                        .ok_or_else(|| Error::ShapeMismatch("Output operand not yet computed".into()))?
                }
                Operator::Add => {
                    let (a, b) = self.binary_operands(&values, ix)?;
                    kernel::add::add(ctx, a, b)?
                }
                Operator::Multiply => {
                    let (a, b) = self.binary_operands(&values, ix)?;
                    kernel::multiply::multiply(ctx, a, b)?
                }
                Operator::Negate => {
                    let a = self.unary_operand(&values, ix)?;
                    kernel::negate::negate(ctx, a)?
                }
                Operator::Dot { reduction_axes } => {
                    let (a, b) = self.binary_operands(&values, ix)?;
                    self.run_dot(ctx, node, *reduction_axes, a, b)?
                }
                Operator::Broadcast {
                    out_shape,
                    broadcast_axes,
                } => {
                    let a = self.unary_operand(&values, ix)?;
                    kernel::broadcast::broadcast(a, out_shape, broadcast_axes)?
                }
                Operator::Relinearize => {
                    let a = self.unary_operand(&values, ix)?;
                    kernel::relinearize::relinearize(ctx, a)?
                }
                Operator::Rescale => {
                    let a = self.unary_operand(&values, ix)?;
                    kernel::rescale::rescale(ctx, a)?
                }
            };

            let elapsed = start.elapsed();
            self.performance.record(&label, elapsed);
            debug!(node = %label, elapsed_us = elapsed.as_micros(), "executed node");

            if matches!(node.operator, Operator::Output) {
                output = Some(result.clone());
            }
            values.insert(ix, result);
        }

        output.ok_or_else(|| Error::ShapeMismatch("graph has no Output node".into()))
    }

    /// `C[p, q] = Σ_k A[p, k] * B[k, q]` (§4.3.4), flattened over the node's
    /// operand tensors treating their trailing/leading `reduction_axes` axes
    /// as the contracted dimension.
    fn run_dot(
        &self,
        ctx: &SchemeContext,
        node: &crate::graph::Node,
        reduction_axes: usize,
        a: &HeTensor,
        b: &HeTensor,
    ) -> Result<HeTensor> {
        let a_shape = a.shape();
        let b_shape = b.shape();
        if reduction_axes == 0 || reduction_axes > a_shape.len() || reduction_axes > b_shape.len() {
            return Err(Error::ShapeMismatch(format!(
                "dot reduction_axes {reduction_axes} incompatible with operand ranks {} / {}",
                a_shape.len(),
                b_shape.len()
            )));
        }
        let reduce_size: usize = a_shape[a_shape.len() - reduction_axes..].iter().product();
        let reduce_size_b: usize = b_shape[..reduction_axes].iter().product();
        if reduce_size != reduce_size_b {
            return Err(Error::ShapeMismatch(format!(
                "dot reduction dimension mismatch: {reduce_size} vs {reduce_size_b}"
            )));
        }
        let a_elems = a.get_elements();
        let b_elems = b.get_elements();
        if reduce_size == 0 || a_elems.len() % reduce_size != 0 || b_elems.len() % reduce_size != 0 {
            return Err(Error::ShapeMismatch(
                "dot operand element counts do not divide evenly by the reduction size".into(),
            ));
        }
        let outer_a = a_elems.len() / reduce_size;
        let outer_b = b_elems.len() / reduce_size;

        let mut out_elements = Vec::with_capacity(outer_a * outer_b);
        for p in 0..outer_a {
            let a_slice = &a_elems[p * reduce_size..(p + 1) * reduce_size];
            for q in 0..outer_b {
                let b_slice: Vec<HeValue> = (0..reduce_size).map(|k| b_elems[k * outer_b + q].clone()).collect();
                out_elements.push(kernel::dot::dot(ctx, a_slice, &b_slice)?);
            }
        }

        let any_cipher = out_elements.iter().any(HeValue::is_cipher);
        let mut out = HeTensor::new(node.dtype, node.shape.clone(), a.packed(), any_cipher)?;
        out.set_elements(out_elements)?;
        Ok(out)
    }

    fn only_operand(&self, ix: NodeIndex) -> Result<NodeIndex> {
        self.graph
            .operands_of(ix)
            .into_iter()
            .next()
            .ok_or_else(|| Error::ShapeMismatch("node has no operand".into()))
    }

    fn binary_operands<'a>(
        &self,
        values: &'a HashMap<NodeIndex, HeTensor>,
        ix: NodeIndex,
    ) -> Result<(&'a HeTensor, &'a HeTensor)> {
        let operands = self.graph.operands_of(ix);
        if operands.len() != 2 {
            return Err(Error::ShapeMismatch(format!(
                "binary op expected 2 operands, got {}",
                operands.len()
            )));
        }
        let a = values
            .get(&operands[0])
            .ok_or_else(|| Error::ShapeMismatch("operand not yet computed".into()))?;
        let b = values
            .get(&operands[1])
            .ok_or_else(|| Error::ShapeMismatch("operand not yet computed".into()))?;
        Ok((a, b))
    }

    fn unary_operand<'a>(
        &self,
        values: &'a HashMap<NodeIndex, HeTensor>,
        ix: NodeIndex,
    ) -> Result<&'a HeTensor> {
        let src = self.only_operand(ix)?;
        values
            .get(&src)
            .ok_or_else(|| Error::ShapeMismatch("operand not yet computed".into()))
    }
}

fn operator_label(op: &Operator) -> String {
    match op {
        Operator::Input { name } => format!("Input({name})"),
        Operator::Output => "Output".into(),
        Operator::Add => "Add".into(),
        Operator::Multiply => "Multiply".into(),
        Operator::Negate => "Negate".into(),
        Operator::Dot { .. } => "Dot".into(),
        Operator::Broadcast { .. } => "Broadcast".into(),
        Operator::Relinearize => "Relinearize".into(),
        Operator::Rescale => "Rescale".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::scheme::bfv::BfvScheme;
    use crate::scheme::SchemeParameters;
    use crate::tensor::Datatype;
    use byteorder::{ByteOrder, LittleEndian};

    fn ctx() -> SchemeContext {
        let scheme = BfvScheme::new(SchemeParameters::bfv_default()).unwrap();
        SchemeContext::new(Box::new(scheme)).unwrap()
    }

    fn tensor_of(ctx: &SchemeContext, values: &[f64], encrypted: bool) -> HeTensor {
        let mut t = HeTensor::new(Datatype::F64, vec![values.len()], false, encrypted).unwrap();
        let mut bytes = vec![0u8; values.len() * 8];
        for (i, v) in values.iter().enumerate() {
            LittleEndian::write_f64(&mut bytes[i * 8..i * 8 + 8], *v);
        }
        t.write(ctx, &bytes, 0, bytes.len()).unwrap();
        t
    }

    #[test]
    fn runs_add_graph_end_to_end() {
        let ctx = ctx();
        let mut g = Graph::new();
        let a = g.add_node(Node::new(
            Operator::Input { name: "a".into() },
            vec![2],
            Datatype::F64,
        ));
        let b = g.add_node(Node::new(
            Operator::Input { name: "b".into() },
            vec![2],
            Datatype::F64,
        ));
        let add = g.add_node(Node::new(Operator::Add, vec![2], Datatype::F64));
        g.add_edge(a, add, 0);
        g.add_edge(b, add, 1);
        let out = g.add_node(Node::new(Operator::Output, vec![2], Datatype::F64));
        g.add_edge(add, out, 0);

        let exe = Executable::new(g);
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), tensor_of(&ctx, &[1.0, 2.0], true));
        inputs.insert("b".to_string(), tensor_of(&ctx, &[10.0, 20.0], true));

        let result = exe.run(&ctx, &inputs).unwrap();
        let mut out_bytes = vec![0u8; 16];
        result.read(&ctx, &mut out_bytes, 0, 16).unwrap();
        assert_eq!(LittleEndian::read_f64(&out_bytes[0..8]), 11.0);
        assert_eq!(LittleEndian::read_f64(&out_bytes[8..16]), 22.0);

        assert!(exe.performance_data().contains_key("Add"));
    }

    #[test]
    fn runs_multiply_graph_with_auto_relinearize() {
        let ctx = ctx();
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
        let mul = g.add_node(Node::new(Operator::Multiply, vec![1], Datatype::F64));
        g.add_edge(a, mul, 0);
        g.add_edge(b, mul, 1);
        let out = g.add_node(Node::new(Operator::Output, vec![1], Datatype::F64));
        g.add_edge(mul, out, 0);

        let exe = Executable::new(g);
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), tensor_of(&ctx, &[6.0], true));
        inputs.insert("b".to_string(), tensor_of(&ctx, &[7.0], true));

        let result = exe.run(&ctx, &inputs).unwrap();
        assert_eq!(result.get_element(0).unwrap().as_cipher().degree(), 2);
        let mut out_bytes = vec![0u8; 8];
        result.read(&ctx, &mut out_bytes, 0, 8).unwrap();
        assert_eq!(LittleEndian::read_f64(&out_bytes), 42.0);
        assert!(exe.performance_data().contains_key("Relinearize"));
    }

    #[test]
    fn runs_dot_graph() {
        let ctx = ctx();
        let mut g = Graph::new();
        let a = g.add_node(Node::new(
            Operator::Input { name: "a".into() },
            vec![4],
            Datatype::F64,
        ));
        let b = g.add_node(Node::new(
            Operator::Input { name: "b".into() },
            vec![4],
            Datatype::F64,
        ));
        let dot = g.add_node(Node::new(
            Operator::Dot { reduction_axes: 1 },
            vec![1],
            Datatype::F64,
        ));
        g.add_edge(a, dot, 0);
        g.add_edge(b, dot, 1);
        let out = g.add_node(Node::new(Operator::Output, vec![1], Datatype::F64));
        g.add_edge(dot, out, 0);

        let exe = Executable::new(g);
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), tensor_of(&ctx, &[1.0, 2.0, 3.0, 4.0], true));
        inputs.insert("b".to_string(), tensor_of(&ctx, &[10.0, 20.0, 30.0, 40.0], true));

        let result = exe.run(&ctx, &inputs).unwrap();
        let mut out_bytes = vec![0u8; 8];
        result.read(&ctx, &mut out_bytes, 0, 8).unwrap();
        assert_eq!(LittleEndian::read_f64(&out_bytes), 300.0);
    }
}
