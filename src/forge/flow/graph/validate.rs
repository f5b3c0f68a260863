// SPDX-License-Identifier: MIT

//! Structural validation of flow definitions

use std::collections::{HashMap, HashSet, VecDeque};

use super::types::{
    check_branch_label, edge_label, FlowDefinition, LogicNode, NodeKind, Subject, ValueSpec,
};
use crate::forge::flow::expression;
use crate::kit::collaborator::ActionKind;
use crate::kit::error::ConfigError;

impl FlowDefinition {
    /// Collect every structural problem in the definition.
    ///
    /// An empty flow is considered a valid draft.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();
        if self.nodes.is_empty() {
            return issues;
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                issues.push(ConfigError::DuplicateNode(node.id.clone()));
            }
        }

        let starts = self.start_nodes().count();
        match starts {
            0 => issues.push(ConfigError::MissingStart),
            1 => {}
            n => issues.push(ConfigError::MultipleStarts(n)),
        }

        self.check_edges(&mut issues);
        self.check_payloads(&mut issues);

        if starts == 1 {
            self.check_reachability(&mut issues);
        }

        issues
    }

    /// First structural problem, if any
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(issue) => Err(issue),
            None => Ok(()),
        }
    }

    fn check_edges(&self, issues: &mut Vec<ConfigError>) {
        let mut labels: HashSet<(&str, String)> = HashSet::new();

        for edge in &self.edges {
            let Some(source) = self.node(&edge.source) else {
                issues.push(ConfigError::DanglingEdge {
                    source_id: edge.source.clone(),
                    target: edge.target.clone(),
                });
                continue;
            };
            if self.node(&edge.target).is_none() {
                issues.push(ConfigError::DanglingEdge {
                    source_id: edge.source.clone(),
                    target: edge.target.clone(),
                });
                continue;
            }
            if let Err(e) = check_branch_label(source, edge) {
                issues.push(e);
                continue;
            }
            let label = edge_label(edge);
            if !labels.insert((edge.source.as_str(), label.clone())) {
                issues.push(ConfigError::DuplicateBranch {
                    node: edge.source.clone(),
                    branch: label,
                });
            }
        }
    }

    fn check_payloads(&self, issues: &mut Vec<ConfigError>) {
        for node in &self.nodes {
            match &node.kind {
                NodeKind::Start => {}
                NodeKind::Question(q) => {
                    if q.answer_type.is_choice() && q.options.is_empty() {
                        issues.push(ConfigError::MissingOptions(node.id.clone()));
                    }
                }
                NodeKind::Logic(LogicNode {
                    subject, expected, ..
                }) => {
                    if let Subject::Question { node: reference } = subject {
                        self.check_question_ref(&node.id, reference, issues);
                    }
                    if let Some(spec) = expected {
                        self.check_value_spec(&node.id, spec, issues);
                    }
                }
                NodeKind::Action(action) => {
                    if action.action == ActionKind::SetField
                        && action.field.as_deref().map_or(true, str::is_empty)
                    {
                        issues.push(ConfigError::MissingTargetField(node.id.clone()));
                    }
                    self.check_value_spec(&node.id, &action.value, issues);
                }
            }
        }
    }

    fn check_value_spec(&self, node_id: &str, spec: &ValueSpec, issues: &mut Vec<ConfigError>) {
        match spec {
            ValueSpec::Date { expression: raw } => {
                if let Err(error) = expression::parse(raw) {
                    issues.push(ConfigError::InvalidExpression {
                        node: node_id.to_string(),
                        error,
                    });
                }
            }
            ValueSpec::Question { node: reference } => {
                self.check_question_ref(node_id, reference, issues)
            }
            ValueSpec::Literal { .. } | ValueSpec::Choice { .. } => {}
        }
    }

    fn check_question_ref(&self, node_id: &str, reference: &str, issues: &mut Vec<ConfigError>) {
        let is_question = self
            .node(reference)
            .is_some_and(|n| matches!(n.kind, NodeKind::Question(_)));
        if !is_question {
            issues.push(ConfigError::InvalidQuestionRef {
                node: node_id.to_string(),
                reference: reference.to_string(),
            });
        }
    }

    fn check_reachability(&self, issues: &mut Vec<ConfigError>) {
        let Ok(start) = self.start() else {
            return;
        };

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::from([start.id.as_str()]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(targets) = adjacency.get(id) {
                queue.extend(targets.iter().copied());
            }
        }

        for node in &self.nodes {
            if !visited.contains(node.id.as_str()) {
                issues.push(ConfigError::Unreachable(node.id.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::flow::condition::ConditionOperator;
    use crate::forge::flow::graph::types::{
        ActionNode, AnswerType, Edge, Node, QuestionNode,
    };

    fn question(id: &str, answer_type: AnswerType) -> Node {
        Node::new(
            id,
            NodeKind::Question(QuestionNode {
                prompt: "?".to_string(),
                answer_type,
                options: vec![],
            }),
        )
    }

    fn set_due(id: &str, expr: &str) -> Node {
        Node::new(
            id,
            NodeKind::Action(ActionNode {
                action: ActionKind::SetField,
                field: Some("duedate".to_string()),
                value: ValueSpec::date(expr),
            }),
        )
    }

    fn linear() -> FlowDefinition {
        let mut def = FlowDefinition::new("f", "Flow");
        def.nodes = vec![
            Node::start("s"),
            question("q", AnswerType::Text),
            set_due("a", "today() + 7d"),
        ];
        def.edges = vec![Edge::new("s", "q"), Edge::new("q", "a")];
        def
    }

    #[test]
    fn test_valid_flow() {
        assert!(linear().validate().is_empty());
        assert!(linear().ensure_valid().is_ok());
        assert!(FlowDefinition::new("empty", "Draft").validate().is_empty());
    }

    #[test]
    fn test_two_starts_rejected() {
        let mut def = linear();
        def.nodes.push(Node::start("s2"));
        assert!(def.validate().contains(&ConfigError::MultipleStarts(2)));
    }

    #[test]
    fn test_missing_start() {
        let mut def = linear();
        def.remove_node("s");
        assert_eq!(def.ensure_valid(), Err(ConfigError::MissingStart));
    }

    #[test]
    fn test_unreachable_node() {
        let mut def = linear();
        def.nodes.push(question("orphan", AnswerType::Date));
        assert_eq!(
            def.validate(),
            vec![ConfigError::Unreachable("orphan".to_string())]
        );
    }

    #[test]
    fn test_dangling_and_mislabeled_edges() {
        let mut def = linear();
        def.edges.push(Edge::new("a", "nowhere"));
        def.edges.push(Edge::branch("q", true, "a"));
        let issues = def.validate();
        assert!(issues
            .iter()
            .any(|e| matches!(e, ConfigError::DanglingEdge { .. })));
        assert!(issues
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidBranchLabel { .. })));
    }

    #[test]
    fn test_duplicate_unlabeled_edge() {
        let mut def = linear();
        def.edges.push(Edge::new("s", "a"));
        assert!(def
            .validate()
            .iter()
            .any(|e| matches!(e, ConfigError::DuplicateBranch { node, .. } if node == "s")));
    }

    #[test]
    fn test_payload_checks() {
        let mut def = linear();
        def.nodes.push(question("choice", AnswerType::SingleChoice));
        def.nodes.push(set_due("bad", "today() * 2"));
        def.nodes.push(Node::new(
            "cmp",
            NodeKind::Logic(LogicNode {
                subject: Subject::Question {
                    node: "a".to_string(),
                },
                operator: ConditionOperator::IsEmpty,
                expected: None,
            }),
        ));
        def.edges.push(Edge::new("a", "choice"));
        def.edges.push(Edge::new("choice", "bad"));
        def.edges.push(Edge::new("bad", "cmp"));

        let issues = def.validate();
        assert!(issues.contains(&ConfigError::MissingOptions("choice".to_string())));
        assert!(issues
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidExpression { node, .. } if node == "bad")));
        assert!(issues.contains(&ConfigError::InvalidQuestionRef {
            node: "cmp".to_string(),
            reference: "a".to_string(),
        }));
    }

    #[test]
    fn test_set_field_requires_target() {
        let mut def = linear();
        if let NodeKind::Action(action) = &mut def.nodes[2].kind {
            action.field = None;
        }
        assert_eq!(
            def.ensure_valid(),
            Err(ConfigError::MissingTargetField("a".to_string()))
        );
    }
}
