//! Flow graph type definitions
//!
//! A flow is a set of typed nodes joined by edges. In YAML:
//!
//! ```yaml
//! id: triage
//! name: Bug triage
//! projects: [OPS]
//! nodes:
//!   - id: start
//!     type: start
//!   - id: severity
//!     type: question
//!     prompt: How bad is it?
//!     answer_type: single-choice
//!     options:
//!       - { value: "1", label: Critical }
//!       - { value: "2", label: Minor }
//!   - id: is_critical
//!     type: logic
//!     subject: { kind: question, node: severity }
//!     operator: equals
//!     expected: { kind: literal, value: "1" }
//! edges:
//!   - { source: start, target: severity }
//!   - { source: severity, target: is_critical }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::forge::flow::condition::ConditionOperator;
use crate::kit::collaborator::ActionKind;
use crate::kit::error::ConfigError;
use crate::kit::value::ChoiceOption;

/// An admin-authored decision graph
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct FlowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Project keys this flow is offered in
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A node in the flow graph
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Node {
    /// Unique within the flow
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Node payload, one variant per node type
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Question(QuestionNode),
    Logic(LogicNode),
    Action(ActionNode),
}

/// Node type without payload, for audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Start,
    Question,
    Logic,
    Action,
}

/// Prompts the user and pauses execution until answered
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct QuestionNode {
    pub prompt: String,
    pub answer_type: AnswerType,
    /// Only meaningful for choice questions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceOption>,
}

/// Expected shape of a question's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerType {
    SingleChoice,
    MultiChoice,
    Date,
    Number,
    Text,
}

impl AnswerType {
    pub fn is_choice(&self) -> bool {
        matches!(self, AnswerType::SingleChoice | AnswerType::MultiChoice)
    }
}

/// Branches on a comparison
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LogicNode {
    pub subject: Subject,
    pub operator: ConditionOperator,
    /// Not needed for `isEmpty` / `isNotEmpty`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<ValueSpec>,
}

/// Requests a side effect on the record
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ActionNode {
    pub action: ActionKind,
    /// Target field key; required for `setField`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub value: ValueSpec,
}

/// What a logic node compares
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    /// A field of the record
    Field { key: String },
    /// The stored answer of a question node
    Question { node: String },
}

/// A value-bearing configuration slot, resolved uniformly for logic and action nodes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueSpec {
    /// Fixed value
    Literal { value: serde_json::Value },
    /// Date expression such as `today() + 7d`
    Date { expression: String },
    /// Answer stored for a question node
    Question { node: String },
    /// A selected option of a select field; `value` is the raw option value
    Choice {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl ValueSpec {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        ValueSpec::Literal {
            value: value.into(),
        }
    }

    pub fn date(expression: impl Into<String>) -> Self {
        ValueSpec::Date {
            expression: expression.into(),
        }
    }

    pub fn question(node: impl Into<String>) -> Self {
        ValueSpec::Question { node: node.into() }
    }
}

/// Outgoing branch of a logic node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    True,
    False,
}

impl From<bool> for Branch {
    fn from(value: bool) -> Self {
        if value {
            Branch::True
        } else {
            Branch::False
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::True => write!(f, "true"),
            Branch::False => write!(f, "false"),
        }
    }
}

impl Serialize for Branch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Branch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // YAML authors write `branch: true`; JSON clients tend to send "true"
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Ok(Branch::from(b)),
            Raw::Text(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(Branch::True),
                "false" => Ok(Branch::False),
                other => Err(serde::de::Error::custom(format!(
                    "invalid branch label '{}', expected true or false",
                    other
                ))),
            },
        }
    }
}

/// A directed connection between two nodes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// Set only on edges leaving logic nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Branch>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            branch: None,
        }
    }

    pub fn branch(
        source: impl Into<String>,
        branch: impl Into<Branch>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            branch: Some(branch.into()),
        }
    }

    fn label(&self) -> String {
        match self.branch {
            Some(b) => format!("'{}'", b),
            None => "unlabeled".to_string(),
        }
    }
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn start(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Start)
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn is_start(&self) -> bool {
        matches!(self.kind, NodeKind::Start)
    }
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Start => NodeType::Start,
            NodeKind::Question(_) => NodeType::Question,
            NodeKind::Logic(_) => NodeType::Logic,
            NodeKind::Action(_) => NodeType::Action,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Start => write!(f, "start"),
            NodeType::Question => write!(f, "question"),
            NodeType::Logic => write!(f, "logic"),
            NodeType::Action => write!(f, "action"),
        }
    }
}

impl fmt::Display for AnswerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerType::SingleChoice => write!(f, "single-choice"),
            AnswerType::MultiChoice => write!(f, "multi-choice"),
            AnswerType::Date => write!(f, "date"),
            AnswerType::Number => write!(f, "number"),
            AnswerType::Text => write!(f, "text"),
        }
    }
}

impl FlowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn start_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_start())
    }

    /// The unique start node
    pub fn start(&self) -> Result<&Node, ConfigError> {
        let starts: Vec<&Node> = self.start_nodes().collect();
        match starts.as_slice() {
            [start] => Ok(start),
            [] => Err(ConfigError::MissingStart),
            many => Err(ConfigError::MultipleStarts(many.len())),
        }
    }

    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Target of the edge leaving `node_id` on `branch` (`None` = unlabeled)
    pub fn next(&self, node_id: &str, branch: Option<Branch>) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.source == node_id && e.branch == branch)
            .map(|e| e.target.as_str())
    }

    /// Add a node, rejecting duplicate ids and a second start node
    pub fn add_node(&mut self, node: Node) -> Result<(), ConfigError> {
        if self.node(&node.id).is_some() {
            return Err(ConfigError::DuplicateNode(node.id));
        }
        if node.is_start() {
            let existing = self.start_nodes().count();
            if existing > 0 {
                return Err(ConfigError::MultipleStarts(existing + 1));
            }
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let index = self.nodes.iter().position(|n| n.id == id)?;
        self.edges.retain(|e| e.source != id && e.target != id);
        Some(self.nodes.remove(index))
    }

    /// Add an edge, enforcing endpoint existence and the per-branch uniqueness rules
    pub fn connect(&mut self, edge: Edge) -> Result<(), ConfigError> {
        let source = self
            .node(&edge.source)
            .ok_or_else(|| ConfigError::DanglingEdge {
                source_id: edge.source.clone(),
                target: edge.target.clone(),
            })?;
        if self.node(&edge.target).is_none() {
            return Err(ConfigError::DanglingEdge {
                source_id: edge.source.clone(),
                target: edge.target.clone(),
            });
        }
        check_branch_label(source, &edge)?;
        if self
            .outgoing(&edge.source)
            .any(|e| e.branch == edge.branch)
        {
            return Err(ConfigError::DuplicateBranch {
                node: edge.source.clone(),
                branch: edge.label(),
            });
        }
        self.edges.push(edge);
        Ok(())
    }
}

/// Logic nodes need labeled edges; every other node type needs an unlabeled one
pub(crate) fn check_branch_label(source: &Node, edge: &Edge) -> Result<(), ConfigError> {
    let is_logic = matches!(source.kind, NodeKind::Logic(_));
    if is_logic == edge.branch.is_some() {
        return Ok(());
    }
    Err(ConfigError::InvalidBranchLabel {
        node: source.id.clone(),
        kind: source.node_type().to_string(),
        expected: if is_logic {
            "labeled true or false".to_string()
        } else {
            "unlabeled".to_string()
        },
    })
}

pub(crate) fn edge_label(edge: &Edge) -> String {
    edge.label()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(id: &str) -> Node {
        Node::new(
            id,
            NodeKind::Question(QuestionNode {
                prompt: "?".to_string(),
                answer_type: AnswerType::Text,
                options: vec![],
            }),
        )
    }

    fn logic(id: &str) -> Node {
        Node::new(
            id,
            NodeKind::Logic(LogicNode {
                subject: Subject::Field {
                    key: "duedate".to_string(),
                },
                operator: ConditionOperator::IsEmpty,
                expected: None,
            }),
        )
    }

    #[test]
    fn test_deserialize_nodes() {
        let yaml = r#"
            id: f1
            name: Flow
            nodes:
              - id: start
                type: start
              - id: q1
                type: question
                prompt: Pick one
                answer_type: single-choice
                options:
                  - { value: "a", label: Alpha }
                  - { value: "b" }
              - id: check
                type: logic
                subject: { kind: question, node: q1 }
                operator: equals
                expected: { kind: literal, value: "a" }
              - id: bump
                type: action
                action: setField
                field: duedate
                value: { kind: date, expression: "today() + 7d" }
            edges:
              - { source: start, target: q1 }
              - { source: q1, target: check }
              - { source: check, target: bump, branch: true }
        "#;
        let def: FlowDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.nodes.len(), 4);
        assert!(def.nodes[0].is_start());

        match &def.nodes[1].kind {
            NodeKind::Question(q) => {
                assert_eq!(q.answer_type, AnswerType::SingleChoice);
                assert_eq!(q.options[0].display(), "Alpha");
                assert_eq!(q.options[1].display(), "b");
            }
            other => panic!("Expected question, got {:?}", other),
        }

        match &def.nodes[2].kind {
            NodeKind::Logic(l) => {
                assert_eq!(
                    l.subject,
                    Subject::Question {
                        node: "q1".to_string()
                    }
                );
                assert_eq!(l.expected, Some(ValueSpec::literal("a")));
            }
            other => panic!("Expected logic, got {:?}", other),
        }

        match &def.nodes[3].kind {
            NodeKind::Action(a) => {
                assert_eq!(a.action, ActionKind::SetField);
                assert_eq!(a.value, ValueSpec::date("today() + 7d"));
            }
            other => panic!("Expected action, got {:?}", other),
        }

        assert_eq!(def.edges[2].branch, Some(Branch::True));
        assert_eq!(def.next("check", Some(Branch::True)), Some("bump"));
        assert_eq!(def.next("check", Some(Branch::False)), None);
    }

    #[test]
    fn test_branch_accepts_bool_or_string() {
        let edge: Edge =
            serde_json::from_value(json!({"source": "a", "target": "b", "branch": "false"}))
                .unwrap();
        assert_eq!(edge.branch, Some(Branch::False));

        let edge: Edge =
            serde_json::from_value(json!({"source": "a", "target": "b", "branch": true})).unwrap();
        assert_eq!(edge.branch, Some(Branch::True));

        let bad = serde_json::from_value::<Edge>(
            json!({"source": "a", "target": "b", "branch": "maybe"}),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_node_serializes_with_type_tag() {
        let value = serde_json::to_value(Node::start("s")).unwrap();
        assert_eq!(value, json!({"id": "s", "type": "start"}));
    }

    #[test]
    fn test_start_uniqueness_on_add() {
        let mut def = FlowDefinition::new("f", "Flow");
        def.add_node(Node::start("s1")).unwrap();
        assert_eq!(
            def.add_node(Node::start("s2")),
            Err(ConfigError::MultipleStarts(2))
        );

        def.remove_node("s1").unwrap();
        assert!(def.add_node(Node::start("s2")).is_ok());
        assert_eq!(def.start().unwrap().id, "s2");
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut def = FlowDefinition::new("f", "Flow");
        def.add_node(question("q")).unwrap();
        assert_eq!(
            def.add_node(question("q")),
            Err(ConfigError::DuplicateNode("q".to_string()))
        );
    }

    #[test]
    fn test_remove_node_drops_edges() {
        let mut def = FlowDefinition::new("f", "Flow");
        def.add_node(Node::start("s")).unwrap();
        def.add_node(question("q")).unwrap();
        def.connect(Edge::new("s", "q")).unwrap();

        def.remove_node("q").unwrap();
        assert!(def.edges.is_empty());
        assert!(def.remove_node("q").is_none());
    }

    #[test]
    fn test_connect_enforces_branch_rules() {
        let mut def = FlowDefinition::new("f", "Flow");
        def.add_node(Node::start("s")).unwrap();
        def.add_node(logic("l")).unwrap();
        def.add_node(question("a")).unwrap();
        def.add_node(question("b")).unwrap();

        def.connect(Edge::new("s", "l")).unwrap();
        assert!(matches!(
            def.connect(Edge::new("s", "a")),
            Err(ConfigError::DuplicateBranch { .. })
        ));
        assert!(matches!(
            def.connect(Edge::new("l", "a")),
            Err(ConfigError::InvalidBranchLabel { .. })
        ));
        assert!(matches!(
            def.connect(Edge::branch("s", true, "a")),
            Err(ConfigError::InvalidBranchLabel { .. })
        ));

        def.connect(Edge::branch("l", true, "a")).unwrap();
        def.connect(Edge::branch("l", false, "b")).unwrap();
        assert!(matches!(
            def.connect(Edge::branch("l", true, "b")),
            Err(ConfigError::DuplicateBranch { .. })
        ));
        assert!(matches!(
            def.connect(Edge::new("a", "missing")),
            Err(ConfigError::DanglingEdge { .. })
        ));
    }

    #[test]
    fn test_next_outlives_lookup_id() {
        let mut def = FlowDefinition::new("f", "Flow");
        def.add_node(Node::start("s")).unwrap();
        def.add_node(logic("l")).unwrap();
        def.add_node(question("a")).unwrap();
        def.connect(Edge::new("s", "l")).unwrap();
        def.connect(Edge::branch("l", false, "a")).unwrap();

        let target = {
            let id = String::from("l");
            def.next(&id, Some(Branch::False))
        };
        assert_eq!(target, Some("a"));
        assert_eq!(def.next("l", Some(Branch::True)), None);
        assert_eq!(def.next("s", None), Some("l"));
        assert_eq!(def.next("s", Some(Branch::True)), None);
    }

    #[test]
    fn test_start_lookup_errors() {
        let def = FlowDefinition::new("f", "Flow");
        assert_eq!(def.start(), Err(ConfigError::MissingStart));

        let mut def = FlowDefinition::new("f", "Flow");
        def.nodes.push(Node::start("a"));
        def.nodes.push(Node::start("b"));
        assert_eq!(def.start(), Err(ConfigError::MultipleStarts(2)));
    }
}
