//! The EBM transform pipeline.
//!
//! Pass order is fixed: adjacent bit fields group under composites first,
//! control-flow analysis feeds the bit-field lowering, vectorization
//! coalesces fixed-size runs, accessor synthesis derives property and
//! vector setters, cast resolution binds FUNCTION_CASTs, and dead-object
//! elimination compacts the id space last. A final CFG build gives callers
//! the post-transform flow view.

pub mod bit_io;
pub mod bits;
pub mod cast_fn;
pub mod cfg;
pub mod composite;
pub mod ctx;
pub mod dce;
pub mod error;
pub mod property;
pub mod vector_setter;
pub mod vectorize;

pub use cfg::{analyze_module, write_dot, CfgSet};
pub use ctx::TransformCtx;
pub use error::TransformError;

use ebmc_core::Module;

/// Pipeline options. Dead-object elimination can be disabled for debugging
/// a raw module.
#[derive(Debug, Clone)]
pub struct Options {
    pub remove_unused: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { remove_unused: true }
    }
}

/// Runs the whole pipeline in place and returns the final CFG view.
pub fn transform(module: &mut Module, options: &Options) -> error::Result<CfgSet> {
    let mut ctx = TransformCtx::new(std::mem::take(module));

    {
        let span = tracing::info_span!("pass", name = "merge_bit_fields");
        let _enter = span.enter();
        composite::merge_bit_fields(&mut ctx)?;
    }
    {
        let span = tracing::info_span!("pass", name = "bit_io");
        let _enter = span.enter();
        let flow = cfg::analyze_module(&ctx.module)?;
        bit_io::lowered_dynamic_bit_io(&mut ctx, &flow, false)?;
        bit_io::lowered_dynamic_bit_io(&mut ctx, &flow, true)?;
    }
    {
        let span = tracing::info_span!("pass", name = "vectorize_io");
        let _enter = span.enter();
        vectorize::vectorized_io(&mut ctx, false)?;
        vectorize::vectorized_io(&mut ctx, true)?;
    }
    {
        let span = tracing::info_span!("pass", name = "property_synthesis");
        let _enter = span.enter();
        property::derive_property_setter_getter(&mut ctx)?;
        vector_setter::derive_vector_setter(&mut ctx)?;
    }
    {
        let span = tracing::info_span!("pass", name = "cast_resolution");
        let _enter = span.enter();
        cast_fn::add_cast_func(&mut ctx)?;
    }
    if options.remove_unused {
        let span = tracing::info_span!("pass", name = "remove_unused");
        let _enter = span.enter();
        dce::remove_unused_object(&mut ctx)?;
    }

    let final_cfg = cfg::analyze_module(&ctx.module)?;
    *module = ctx.into_module();
    Ok(final_cfg)
}
