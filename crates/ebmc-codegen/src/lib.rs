//! Visitor/dispatch framework for EBM code generation.
//!
//! Code generators implement [`Visitor`] and drive the dispatchers; hooks
//! fire per (object kind, phase) with the pass sentinel as the continue
//! signal. [`MergedVisitor`] stacks hook layers in search order. The
//! [`printer`] module is the default code-gen layer and the `--dump-code`
//! backend.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod printer;
pub mod visitor;

pub use context::{ExpressionCtx, Phase, StatementCtx, TypeCtx};
pub use dispatch::{
    run_main_expression, run_main_statement, run_main_type, visit_block, visit_expression,
    visit_expressions, visit_object, visit_statement, visit_type, visit_types,
};
pub use error::{VisitError, VisitResult};
pub use printer::{dump_code, Printer};
pub use visitor::{MergedVisitor, Visitor};
