//! Flow execution state machine
//!
//! `FlowExecutor::advance` moves an execution from one stable state to the next: it
//! walks from the start node (or from the question just answered) through logic and
//! action nodes until it reaches a question or a node with no way out. It keeps nothing
//! between calls; the caller round-trips `ExecutionState` through a store.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::resolver::ValueResolver;
use super::types::{ActionNode, Branch, FlowDefinition, LogicNode, Node, NodeKind};
use crate::forge::flow::audit::{AuditLogEntry, AuditOutcome};
use crate::forge::flow::condition;
use crate::forge::flow::state::{Answer, ExecutionKey, ExecutionState, ExecutionStatus};
use crate::kit::collaborator::{
    ActionDescriptor, ActionExecutor, ActionKind, FieldMetadata, FieldReader,
};
use crate::kit::config::EngineConfig;
use crate::kit::error::{ConfigError, ResolutionError, ValidationError};

/// External systems a pass talks to
#[derive(Clone)]
pub struct Collaborators {
    pub fields: Arc<dyn FieldReader>,
    pub metadata: Arc<dyn FieldMetadata>,
    pub actions: Arc<dyn ActionExecutor>,
}

impl Collaborators {
    /// Use one client for reads, metadata and actions
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: FieldReader + FieldMetadata + ActionExecutor + 'static,
    {
        Self {
            fields: client.clone(),
            metadata: client.clone(),
            actions: client,
        }
    }
}

/// An action emitted during a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmittedAction {
    pub node_id: String,
    pub descriptor: ActionDescriptor,
    /// False if the action executor reported a failure
    pub applied: bool,
}

/// Result of one pass
#[derive(Debug, Clone, Serialize)]
pub struct Advance {
    pub state: ExecutionState,
    pub actions: Vec<EmittedAction>,
    pub audit: Vec<AuditLogEntry>,
}

/// Why a pass stopped early
enum Halt {
    Configuration(ConfigError),
    Resolution(ResolutionError),
}

impl From<ConfigError> for Halt {
    fn from(e: ConfigError) -> Self {
        Halt::Configuration(e)
    }
}

impl From<ResolutionError> for Halt {
    fn from(e: ResolutionError) -> Self {
        Halt::Resolution(e)
    }
}

impl std::fmt::Display for Halt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Halt::Configuration(e) => write!(f, "{}", e),
            Halt::Resolution(e) => write!(f, "{}", e),
        }
    }
}

/// Accumulates the outputs of one pass
struct Pass {
    key: ExecutionKey,
    timestamp: DateTime<Utc>,
    state: ExecutionState,
    actions: Vec<EmittedAction>,
    audit: Vec<AuditLogEntry>,
    hops: usize,
}

impl Pass {
    fn new(state: &ExecutionState, now: DateTime<FixedOffset>) -> Self {
        Self {
            key: state.key(),
            timestamp: now.with_timezone(&Utc),
            state: state.clone(),
            actions: Vec::new(),
            audit: Vec::new(),
            hops: 0,
        }
    }

    fn record(&mut self, node: Option<&Node>, outcome: AuditOutcome) {
        self.audit
            .push(AuditLogEntry::new(&self.key, node, outcome, self.timestamp));
    }

    fn reach(&mut self, node: &Node) {
        self.state.last_node = Some(node.id.clone());
    }

    fn await_answer(mut self, question: &Node) -> Advance {
        log::info!("{} awaiting answer to '{}'", self.key, question.id);
        self.reach(question);
        self.state.status = ExecutionStatus::AwaitingAnswer {
            node: question.id.clone(),
        };
        self.record(Some(question), AuditOutcome::AwaitingAnswer);
        self.finish()
    }

    fn complete(mut self, last: &Node) -> Advance {
        log::info!("{} completed at '{}'", self.key, last.id);
        self.reach(last);
        self.state.status = ExecutionStatus::Completed;
        self.record(Some(last), AuditOutcome::Completed);
        self.finish()
    }

    fn fail(mut self, node: Option<&Node>, halt: Halt) -> Advance {
        let reason = halt.to_string();
        log::error!(
            "{} failed at '{}': {}",
            self.key,
            node.map_or("-", |n| n.id.as_str()),
            reason
        );
        if let Some(node) = node {
            self.reach(node);
        }
        self.state.status = ExecutionStatus::Failed {
            reason: reason.clone(),
        };
        let entry = AuditLogEntry::new(&self.key, node, AuditOutcome::Failed, self.timestamp)
            .with_error(reason);
        self.audit.push(entry);
        self.finish()
    }

    fn finish(self) -> Advance {
        Advance {
            state: self.state,
            actions: self.actions,
            audit: self.audit,
        }
    }
}

/// What to do after visiting a node
enum Step<'f> {
    Goto(&'f Node),
    Stop,
}

/// Drives executions through flow graphs
#[derive(Clone)]
pub struct FlowExecutor {
    collaborators: Collaborators,
    config: EngineConfig,
}

impl FlowExecutor {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one pass.
    ///
    /// `now` supplies both the calendar day date expressions resolve against and the audit
    /// timestamp. Errors are returned only for rejected answers and finished executions;
    /// the input state is then untouched. Every other failure yields a `Failed` state.
    pub async fn advance(
        &self,
        flow: &FlowDefinition,
        state: &ExecutionState,
        answer: Option<&Value>,
        now: DateTime<FixedOffset>,
    ) -> Result<Advance, ValidationError> {
        let mut pass = Pass::new(state, now);
        log::info!("Advancing {} from {}", pass.key, state.status);

        let entry = match &state.status {
            ExecutionStatus::Completed | ExecutionStatus::Failed { .. } => {
                return Err(ValidationError::Finished(state.status.to_string()));
            }
            ExecutionStatus::NotStarted => {
                if answer.is_some() {
                    return Err(ValidationError::AnswerNotExpected);
                }
                let start = match flow.start() {
                    Ok(start) => start,
                    Err(e) => return Ok(pass.fail(None, e.into())),
                };
                pass.record(Some(start), AuditOutcome::Started);
                start
            }
            ExecutionStatus::AwaitingAnswer { node: node_id } => {
                let Some(raw) = answer else {
                    return Ok(pass.finish());
                };
                let (node, question) = match flow.node(node_id) {
                    Some(node @ Node {
                        kind: NodeKind::Question(question),
                        ..
                    }) => (node, question),
                    _ => {
                        let missing = ConfigError::NodeNotFound(node_id.clone());
                        return Ok(pass.fail(None, missing.into()));
                    }
                };

                let parsed = Answer::parse(node_id, question, raw)?;
                log::info!("{} answered '{}'", pass.key, node_id);
                pass.state.answers.insert(node_id.clone(), parsed.clone());
                pass.reach(node);
                pass.record(Some(node), AuditOutcome::AnswerReceived { answer: parsed });

                match self.follow(flow, node, None, &mut pass) {
                    Ok(Step::Goto(next)) => next,
                    Ok(Step::Stop) => return Ok(pass.complete(node)),
                    Err(halt) => return Ok(pass.fail(Some(node), halt)),
                }
            }
        };

        Ok(self.run(flow, entry, pass, now).await)
    }

    /// Walk from `node` until a question or a dead end
    async fn run<'f>(
        &self,
        flow: &'f FlowDefinition,
        mut node: &'f Node,
        mut pass: Pass,
        now: DateTime<FixedOffset>,
    ) -> Advance {
        loop {
            pass.reach(node);
            let step = match &node.kind {
                NodeKind::Question(_) => return pass.await_answer(node),
                NodeKind::Start => self.follow(flow, node, None, &mut pass),
                NodeKind::Logic(logic) => match self.visit_logic(node, logic, &mut pass, now).await
                {
                    Ok(branch) => self.follow(flow, node, Some(branch), &mut pass),
                    Err(halt) => Err(halt),
                },
                NodeKind::Action(action) => {
                    match self.visit_action(node, action, &mut pass, now).await {
                        Ok(()) => self.follow(flow, node, None, &mut pass),
                        Err(halt) => Err(halt),
                    }
                }
            };

            node = match step {
                Ok(Step::Goto(next)) => next,
                Ok(Step::Stop) => return pass.complete(node),
                Err(halt) => return pass.fail(Some(node), halt),
            };
        }
    }

    /// Take the edge leaving `node` on `branch`, counting hops against the limit
    fn follow<'f>(
        &self,
        flow: &'f FlowDefinition,
        node: &Node,
        branch: Option<Branch>,
        pass: &mut Pass,
    ) -> Result<Step<'f>, Halt> {
        let Some(target) = flow.next(&node.id, branch) else {
            return Ok(Step::Stop);
        };
        pass.hops += 1;
        if pass.hops > self.config.max_hops {
            return Err(ConfigError::HopLimitExceeded(self.config.max_hops).into());
        }
        let next = flow
            .node(target)
            .ok_or_else(|| ConfigError::NodeNotFound(target.to_string()))?;
        log::debug!("{}: {} -> {}", pass.key, node.id, next.id);
        Ok(Step::Goto(next))
    }

    fn resolver<'a>(&'a self, pass: &'a Pass, now: DateTime<FixedOffset>) -> ValueResolver<'a> {
        ValueResolver::new(
            &pass.key.record_id,
            &pass.state.answers,
            self.collaborators.fields.as_ref(),
            self.collaborators.metadata.as_ref(),
            now.date_naive(),
        )
    }

    async fn visit_logic(
        &self,
        node: &Node,
        logic: &LogicNode,
        pass: &mut Pass,
        now: DateTime<FixedOffset>,
    ) -> Result<Branch, Halt> {
        let (subject, expected) = {
            let resolver = self.resolver(pass, now);
            let subject = resolver.subject(&logic.subject).await?;
            let expected = match &logic.expected {
                Some(spec) if logic.operator.needs_expected() => resolver.value(spec).await?,
                _ => Default::default(),
            };
            (subject, expected)
        };

        let result = condition::evaluate(logic.operator, &subject, &expected);
        log::info!(
            "{} condition '{}': {} {} {} => {}",
            pass.key,
            node.id,
            subject,
            logic.operator,
            expected,
            result
        );
        pass.record(
            Some(node),
            AuditOutcome::Condition {
                operator: logic.operator,
                subject,
                expected,
                result,
            },
        );
        Ok(Branch::from(result))
    }

    async fn visit_action(
        &self,
        node: &Node,
        action: &ActionNode,
        pass: &mut Pass,
        now: DateTime<FixedOffset>,
    ) -> Result<(), Halt> {
        let descriptor = {
            let resolver = self.resolver(pass, now);
            let value = resolver.value(&action.value).await?;
            match (action.action, action.field.as_deref()) {
                (ActionKind::SetField, Some(field)) => {
                    let kind = resolver.field_kind(field).await?;
                    let value = resolver.coerce_for_field(field, kind, value).await?;
                    ActionDescriptor {
                        kind: action.action,
                        field: Some(field.to_string()),
                        field_kind: Some(kind),
                        value,
                    }
                }
                (ActionKind::SetField, None) => {
                    return Err(ConfigError::MissingTargetField(node.id.clone()).into())
                }
                (kind, field) => ActionDescriptor {
                    kind,
                    field: field.map(str::to_string),
                    field_kind: None,
                    value,
                },
            }
        };

        let outcome = self
            .collaborators
            .actions
            .execute(&pass.key.record_id, &descriptor)
            .await;
        let applied = outcome.is_ok();
        log::info!(
            "{} action '{}': {} applied={}",
            pass.key,
            node.id,
            descriptor,
            applied
        );

        pass.actions.push(EmittedAction {
            node_id: node.id.clone(),
            descriptor: descriptor.clone(),
            applied,
        });
        pass.record(
            Some(node),
            AuditOutcome::Action {
                action: descriptor.clone(),
                applied,
            },
        );

        outcome.map_err(|e| {
            ResolutionError::Action {
                action: descriptor.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}
