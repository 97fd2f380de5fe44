use anyhow::{Context as _, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use inkwell::context::Context;
use mips_llvm::TranslationOptions;

#[derive(Parser)]
#[command(name = "mips-llvm")]
#[command(about = "Static binary translator: MIPS-like ELF objects to LLVM bitcode")]
struct Cli {
    #[arg(help = "Input ELF object to translate", default_value = "a.out")]
    input: PathBuf,

    #[arg(short, long, help = "Output bitcode path")]
    output: Option<PathBuf>,

    #[arg(long, help = "Run the verify + mem2reg + scalar cleanup pipeline")]
    optimize: bool,

    #[arg(long, default_value_t = 300, help = "Reserved guest-stack size in bytes")]
    stacksize: u32,

    #[arg(long, help = "Dump the textual IR to stderr")]
    dump: bool,

    #[arg(long, help = "Target feature attributes (a1,+a2,-a3,...)")]
    mattr: Option<String>,

    #[arg(long, help = "Host code-generation target (e.g. x86)")]
    target: Option<String>,

    #[arg(long, help = "Target triple override")]
    triple: Option<String>,

    #[arg(long, help = "Dump per-function IR before optimization")]
    debug_ir: bool,

    #[arg(long, help = "Lower the whole program into a single function")]
    one_region: bool,

    #[arg(long, help = "Use host pointers directly instead of the shadow image")]
    no_shadow: bool,

    #[arg(long, help = "Disable per-function register mirrors")]
    no_locals: bool,

    #[arg(long, help = "Redirect stack-address takes into the spill arena")]
    optimize_stack: bool,

    #[arg(long, help = "Aggressively redirect stack accesses into the spill arena")]
    aggr_optimize_stack: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let object = fs::read(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let options = TranslationOptions {
        one_region: cli.one_region,
        no_shadow: cli.no_shadow,
        no_locals: cli.no_locals,
        optimize_stack: cli.optimize_stack,
        aggr_optimize_stack: cli.aggr_optimize_stack,
        stack_size: cli.stacksize,
        debug_ir: cli.debug_ir,
        triple: cli.triple.clone(),
    };

    if let Some(target) = &cli.target {
        tracing::debug!(target, "code-generation target recorded");
    }
    if let Some(mattr) = &cli.mattr {
        tracing::debug!(mattr, "target attributes recorded");
    }

    let ctx = Context::create();
    let module = mips_llvm::translate_object(&ctx, &object, &options)
        .context("translation failed")?;

    if cli.optimize {
        println!("Running verification and basic optimization pipeline...");
        mips_llvm::run_optimization_passes(&module).context("optimization failed")?;
    }

    if cli.dump {
        eprintln!("{}", module.print_to_string().to_string());
    }

    if let Some(output) = &cli.output {
        if !module.write_bitcode_to_path(output) {
            anyhow::bail!("failed to write bitcode to {}", output.display());
        }
        println!(
            "Translated {} -> {}",
            cli.input.display(),
            output.display()
        );
    }

    Ok(())
}
