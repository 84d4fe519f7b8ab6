//! AST -> EBM conversion.
//!
//! The converter walks the source AST once and produces a raw Extended
//! Binary Module: types, expressions, and statements interned into the
//! module arenas, encode/decode bodies synthesized eagerly per format, and
//! union fields derived into properties. The transform pipeline takes over
//! from there.

pub mod build;
pub mod context;
pub mod decode;
pub mod encode;
pub mod error;
pub mod expr;
pub mod property;
pub mod stmt;
pub mod types;

pub use build::{make_io_data, Build};
pub use context::{Converter, GenerateMode};
pub use error::ConvertError;

use ebmc_ast::Ast;
use ebmc_core::{Module, StatementRef};

/// Converts a whole AST into a raw module. The program root lands on the
/// reserved entry id.
pub fn convert_ast(ast: &Ast) -> error::Result<Module> {
    ast.validate()?;
    let mut converter = Converter::new(ast);
    converter
        .visited
        .insert((ast.root, GenerateMode::Normal), StatementRef::ENTRY);
    converter.convert_statement_with_id(StatementRef::ENTRY, ast.root)?;
    let mut module = converter.module;
    module.finalize()?;
    tracing::info!(
        types = module.types.len(),
        statements = module.statements.len(),
        expressions = module.expressions.len(),
        "conversion finished"
    );
    Ok(module)
}
