// SPDX-License-Identifier: MIT

//! Building blocks shared by the engine and its integrations:
//! - `error` - the error taxonomy
//! - `value` - resolved values and field descriptions
//! - `collaborator` - traits for record systems the engine runs against
//! - `config` - engine tunables

pub mod collaborator;
pub mod config;
pub mod error;
pub mod value;

pub use collaborator::{ActionDescriptor, ActionExecutor, ActionKind, FieldMetadata, FieldReader};
pub use config::EngineConfig;
pub use error::{
    BoxError, ConfigError, ExpressionError, FlowError, ResolutionError, StoreError,
    ValidationError,
};
pub use value::{ChoiceOption, FieldKind, FlowValue};
