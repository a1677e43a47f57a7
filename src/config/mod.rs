pub mod expand;
pub mod loader;
pub mod schema;

pub use expand::{
    axes, expand, strategy_count, EditDirective, EditStrategy, FileEditPlan, ParameterAxis,
};
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{FileSpec, ParamValue, Scalar, ValidationError, ValidationIssue, VariableSpec};
