//! The `ebmc` binary: schema AST in, Extended Binary Module out.
//!
//! Drives the same library pipeline end to end: load the AST JSON, convert
//! to a raw module, run the transform passes, serialize. Diagnostics go to
//! stderr as `ebmc: <message>`; success exits 0, any failure exits 1.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Binary-format schema compiler producing Extended Binary Modules.
#[derive(Parser)]
#[command(name = "ebmc", about = "Compile a binary-format schema AST into an EBM")]
struct Cli {
    /// Input AST file (JSON).
    #[arg(short, long)]
    input: PathBuf,

    /// Output module file; `-` writes to stdout.
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Write the JSON diagnostic form instead of the binary format.
    #[arg(long)]
    dump_json: bool,

    /// Print the module as pseudo-code after transformation.
    #[arg(long)]
    dump_code: bool,

    /// Print the per-function control-flow graphs in Graphviz dot form.
    #[arg(long)]
    dump_cfg: bool,

    /// Report per-stage timings.
    #[arg(long)]
    timing: bool,

    /// Keep unused objects; skips dead-object elimination and renumbering.
    #[arg(long)]
    not_remove_unused: bool,

    /// Print the full error chain for unimplemented constructs.
    #[arg(long)]
    debug_unimplemented: bool,

    /// Print the resolved flag set and exit.
    #[arg(long)]
    show_flags: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(if cli.timing { "info" } else { "warn" })
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("ebmc: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    if cli.show_flags {
        println!(
            "input={} output={} dump_json={} dump_code={} dump_cfg={} timing={} \
             not_remove_unused={} debug_unimplemented={}",
            cli.input.display(),
            cli.output,
            cli.dump_json,
            cli.dump_code,
            cli.dump_cfg,
            cli.timing,
            cli.not_remove_unused,
            cli.debug_unimplemented,
        );
        return Ok(());
    }

    let mut timer = StageTimer::new(cli.timing);

    let text = fs::read_to_string(&cli.input)
        .map_err(|e| format!("failed to read {}: {e}", cli.input.display()))?;
    let ast = ebmc_ast::Ast::from_json_str(&text).map_err(|e| format!("{e}"))?;
    timer.stage("load");

    let mut module = ebmc_convert::convert_ast(&ast).map_err(|e| {
        if cli.debug_unimplemented {
            format!("{e:?}")
        } else {
            format!("{e}")
        }
    })?;
    timer.stage("convert");

    let options = ebmc_transform::Options { remove_unused: !cli.not_remove_unused };
    let cfg = ebmc_transform::transform(&mut module, &options).map_err(|e| format!("{e}"))?;
    timer.stage("transform");

    if cli.dump_cfg {
        print!("{}", ebmc_transform::write_dot(&module, &cfg));
    }
    if cli.dump_code {
        let code = ebmc_codegen::dump_code(&module).map_err(|e| format!("{e}"))?;
        print!("{code}");
    }

    let payload = if cli.dump_json {
        ebmc_format::to_json_string(&module)
            .map_err(|e| format!("{e}"))?
            .into_bytes()
    } else {
        ebmc_format::encode_module(&module).map_err(|e| format!("{e}"))?
    };
    timer.stage("serialize");

    if cli.output == "-" {
        if !cli.dump_code && !cli.dump_cfg {
            std::io::stdout()
                .write_all(&payload)
                .map_err(|e| format!("failed to write output: {e}"))?;
        }
    } else {
        fs::write(&cli.output, &payload)
            .map_err(|e| format!("failed to write {}: {e}", cli.output))?;
    }
    timer.stage("write");
    Ok(())
}

/// Wall-clock per stage, printed to stderr when `--timing` is set.
struct StageTimer {
    enabled: bool,
    last: Instant,
}

impl StageTimer {
    fn new(enabled: bool) -> Self {
        StageTimer { enabled, last: Instant::now() }
    }

    fn stage(&mut self, name: &str) {
        if self.enabled {
            let elapsed = self.last.elapsed();
            tracing::info!(stage = name, ?elapsed, "stage finished");
        }
        self.last = Instant::now();
    }
}
