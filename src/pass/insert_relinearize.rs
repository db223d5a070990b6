//! Insert-relinearize pass (§4.7): splice a `Relinearize` node after every
//! `Multiply`/`Dot` node, consuming its output and feeding its former
//! consumers. Idempotent — a node whose sole consumer is already a
//! `Relinearize` is left alone.

use crate::graph::{Graph, Node, NodeIndex, Operator};

/// Runs the pass over `graph` in place.
pub fn insert_relinearize(graph: &mut Graph) {
    let targets: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|&ix| graph.node(ix).operator.raises_degree())
        .collect();

    for ix in targets {
        let consumers = graph.consumers_of(ix);
        if consumers.is_empty() {
            continue;
        }
        if consumers.len() == 1 {
            let (sole, _) = consumers[0];
            if matches!(graph.node(sole).operator, Operator::Relinearize) {
                continue;
            }
        }

        let shape = graph.node(ix).shape.clone();
        let dtype = graph.node(ix).dtype;
        let relin = graph.add_node(Node::new(Operator::Relinearize, shape, dtype));

        for (consumer, operand_index) in consumers {
            graph.remove_edge(ix, consumer);
            graph.add_edge(relin, consumer, operand_index);
        }
        graph.add_edge(ix, relin, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Datatype;

    fn multiply_chain() -> (Graph, NodeIndex, NodeIndex) {
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
        (g, mul, out)
    }

    #[test]
    fn splices_relinearize_between_multiply_and_consumer() {
        let (mut g, mul, out) = multiply_chain();
        insert_relinearize(&mut g);

        let consumers = g.consumers_of(mul);
        assert_eq!(consumers.len(), 1);
        let (relin, _) = consumers[0];
        assert!(matches!(g.node(relin).operator, Operator::Relinearize));
        assert_eq!(g.consumers_of(relin), vec![(out, 0)]);
    }

    #[test]
    fn running_twice_does_not_double_insert() {
        let (mut g, mul, _out) = multiply_chain();
        insert_relinearize(&mut g);
        let count_after_first = g.node_count();
        insert_relinearize(&mut g);
        assert_eq!(g.node_count(), count_after_first);

        let consumers = g.consumers_of(mul);
        assert_eq!(consumers.len(), 1);
    }

    #[test]
    fn dot_node_also_gets_relinearized() {
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
        let dot = g.add_node(Node::new(
            Operator::Dot { reduction_axes: 1 },
            vec![1],
            Datatype::F64,
        ));
        g.add_edge(a, dot, 0);
        g.add_edge(b, dot, 1);
        let out = g.add_node(Node::new(Operator::Output, vec![1], Datatype::F64));
        g.add_edge(dot, out, 0);

        insert_relinearize(&mut g);
        let consumers = g.consumers_of(dot);
        assert_eq!(consumers.len(), 1);
        assert!(matches!(
            g.node(consumers[0].0).operator,
            Operator::Relinearize
        ));
    }
}
