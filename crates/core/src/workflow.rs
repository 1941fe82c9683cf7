//! Workflow graph model.
//!
//! A workflow is the DAG of typed processing nodes submitted to the
//! render server: a map from string node id to `{class_type, inputs}`,
//! where each input is either a JSON literal or a reference to another
//! node's output slot, serialized on the wire as `["<node_id>", slot]`.
//!
//! Graphs built by this worker are valid by construction, but
//! caller-supplied graphs are accepted verbatim from the job payload,
//! so [`WorkflowGraph::validate`] checks link resolution and acyclicity
//! before anything is submitted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// One node input: a literal parameter value or a link to a producer
/// node's output slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeInput {
    /// `["<producer_node_id>", output_slot]` on the wire.
    Link(String, u32),
    /// Any literal JSON value.
    Value(serde_json::Value),
}

impl NodeInput {
    /// Reference another node's output slot.
    pub fn link(node_id: &str, slot: u32) -> Self {
        Self::Link(node_id.to_string(), slot)
    }

    /// Literal parameter value.
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self::Value(value.into())
    }
}

/// A typed processing node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub class_type: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, NodeInput>,
}

/// Directed acyclic graph of processing nodes, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    pub nodes: BTreeMap<String, WorkflowNode>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node under the given id.
    pub fn insert(&mut self, id: &str, node: WorkflowNode) {
        self.nodes.insert(id.to_string(), node);
    }

    /// Check that every link resolves to a node present in the graph
    /// and that the link structure contains no cycle.
    pub fn validate(&self) -> Result<(), JobError> {
        for (id, node) in &self.nodes {
            for input in node.inputs.values() {
                if let NodeInput::Link(target, _) = input {
                    if !self.nodes.contains_key(target) {
                        return Err(JobError::InvalidGraph(format!(
                            "node {id} references missing node {target}"
                        )));
                    }
                }
            }
        }

        self.check_acyclic()
    }

    /// Depth-first cycle detection over link edges (consumer -> producer).
    fn check_acyclic(&self) -> Result<(), JobError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: BTreeMap<&str, Mark> =
            self.nodes.keys().map(|id| (id.as_str(), Mark::Unvisited)).collect();

        // Iterative DFS; a back edge to an in-progress node is a cycle.
        for start in self.nodes.keys() {
            if marks[start.as_str()] != Mark::Unvisited {
                continue;
            }

            let mut stack: Vec<(&str, bool)> = vec![(start.as_str(), false)];
            while let Some((id, children_done)) = stack.pop() {
                if children_done {
                    marks.insert(id, Mark::Done);
                    continue;
                }
                if marks[id] == Mark::Done {
                    continue;
                }
                marks.insert(id, Mark::InProgress);
                stack.push((id, true));

                for input in self.nodes[id].inputs.values() {
                    if let NodeInput::Link(target, _) = input {
                        match marks[target.as_str()] {
                            Mark::InProgress => {
                                return Err(JobError::InvalidGraph(format!(
                                    "cycle through node {target}"
                                )));
                            }
                            Mark::Unvisited => stack.push((target.as_str(), false)),
                            Mark::Done => {}
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(class_type: &str, inputs: Vec<(&str, NodeInput)>) -> WorkflowNode {
        WorkflowNode {
            class_type: class_type.to_string(),
            inputs: inputs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    #[test]
    fn links_serialize_as_wire_arrays() {
        let mut graph = WorkflowGraph::new();
        graph.insert("1", node("LoadImage", vec![("image", NodeInput::value("a.png"))]));
        graph.insert(
            "2",
            node("VAEDecode", vec![("samples", NodeInput::link("1", 0))]),
        );

        let wire = serde_json::to_value(&graph).unwrap();
        assert_eq!(wire["2"]["inputs"]["samples"], json!(["1", 0]));
        assert_eq!(wire["1"]["inputs"]["image"], json!("a.png"));
        assert_eq!(wire["1"]["class_type"], json!("LoadImage"));
    }

    #[test]
    fn wire_arrays_deserialize_as_links() {
        let graph: WorkflowGraph = serde_json::from_value(json!({
            "1": {"class_type": "LoadImage", "inputs": {"image": "a.png"}},
            "2": {"class_type": "VAEDecode", "inputs": {"samples": ["1", 0]}},
        }))
        .unwrap();

        assert_eq!(
            graph.nodes["2"].inputs["samples"],
            NodeInput::Link("1".to_string(), 0)
        );
        assert_eq!(
            graph.nodes["1"].inputs["image"],
            NodeInput::Value(json!("a.png"))
        );
    }

    #[test]
    fn valid_graph_accepted() {
        let mut graph = WorkflowGraph::new();
        graph.insert("1", node("LoadImage", vec![]));
        graph.insert(
            "2",
            node("VAEDecode", vec![("samples", NodeInput::link("1", 0))]),
        );
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn dangling_link_rejected() {
        let mut graph = WorkflowGraph::new();
        graph.insert(
            "2",
            node("VAEDecode", vec![("samples", NodeInput::link("99", 0))]),
        );

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("missing node 99"));
    }

    #[test]
    fn cycle_rejected() {
        let mut graph = WorkflowGraph::new();
        graph.insert("a", node("X", vec![("in", NodeInput::link("b", 0))]));
        graph.insert("b", node("Y", vec![("in", NodeInput::link("a", 0))]));

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn self_loop_rejected() {
        let mut graph = WorkflowGraph::new();
        graph.insert("a", node("X", vec![("in", NodeInput::link("a", 0))]));
        assert!(graph.validate().is_err());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        // 1 -> 2, 1 -> 3, 2+3 -> 4: shared ancestor, no cycle.
        let mut graph = WorkflowGraph::new();
        graph.insert("1", node("A", vec![]));
        graph.insert("2", node("B", vec![("in", NodeInput::link("1", 0))]));
        graph.insert("3", node("C", vec![("in", NodeInput::link("1", 1))]));
        graph.insert(
            "4",
            node(
                "D",
                vec![
                    ("left", NodeInput::link("2", 0)),
                    ("right", NodeInput::link("3", 0)),
                ],
            ),
        );
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn literal_arrays_stay_literals() {
        // A two-element array whose first element is not a string must
        // not be mistaken for a link.
        let graph: WorkflowGraph = serde_json::from_value(json!({
            "1": {"class_type": "X", "inputs": {"size": [512, 512]}},
        }))
        .unwrap();
        assert_eq!(
            graph.nodes["1"].inputs["size"],
            NodeInput::Value(json!([512, 512]))
        );
        assert!(graph.validate().is_ok());
    }
}
