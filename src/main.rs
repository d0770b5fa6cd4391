//! CLI entry point.
//!
//! A `clap::Parser` with a `Subcommand` derive and a `clap_complete`-backed
//! completions subcommand. The driver has one job, so `Commands` is just
//! `Build` plus a completions helper for shell integration.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use emberc::backend::RelocModel;
use emberc::config::{CompilerConfig, EmitKind};
use emberc::{compile_file_with_config, CompileOutcome};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emberc", about = "Compiler front end and middle end for the Ember language", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug). `EMBERC_LOG` overrides this.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile one or more Ember source files.
    Build {
        /// Ember source files to compile.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// What to emit.
        #[arg(long, value_enum, default_value = "object")]
        emit: EmitArg,

        /// Optimization level 0-3.
        #[arg(short = 'O', long = "opt-level", default_value_t = 0)]
        opt_level: u8,

        /// Override the target triple instead of detecting the host.
        #[arg(long)]
        target: Option<String>,

        /// Relocation model.
        #[arg(long, value_enum, default_value = "pic")]
        reloc: RelocArg,

        /// Output path template; per-artifact extensions are appended.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Additional `import` search paths.
        #[arg(long = "search-path")]
        search_paths: Vec<PathBuf>,
    },
    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

#[derive(Clone, Copy, ValueEnum)]
enum EmitArg {
    Ir,
    Asm,
    Object,
    Jit,
}

impl From<EmitArg> for EmitKind {
    fn from(v: EmitArg) -> Self {
        match v {
            EmitArg::Ir => EmitKind::TextualIr,
            EmitArg::Asm => EmitKind::Assembly,
            EmitArg::Object => EmitKind::Object,
            EmitArg::Jit => EmitKind::Jit,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RelocArg {
    Static,
    Pic,
}

impl From<RelocArg> for RelocModel {
    fn from(v: RelocArg) -> Self {
        match v {
            RelocArg::Static => RelocModel::Static,
            RelocArg::Pic => RelocModel::Pic,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            ExitCode::SUCCESS
        }
        Commands::Build {
            inputs,
            emit,
            opt_level,
            target,
            reloc,
            output,
            search_paths,
        } => run_build(inputs, emit, opt_level, target, reloc, output, search_paths),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_build(
    inputs: Vec<PathBuf>,
    emit: EmitArg,
    opt_level: u8,
    target: Option<String>,
    reloc: RelocArg,
    output: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
) -> ExitCode {
    let mut config = CompilerConfig::new().with_emit(emit.into()).with_opt_level(opt_level).with_reloc_model(reloc.into());
    if let Some(triple) = target {
        config = config.with_target_triple(triple);
    }
    for p in search_paths {
        config = config.with_search_path(p);
    }

    let mut exit_code = 0i32;
    for input in &inputs {
        let mut per_file = config.clone();
        if let Some(template) = &output {
            per_file.output_path = Some(if inputs.len() > 1 {
                template.join(input.file_stem().unwrap_or_default())
            } else {
                template.clone()
            });
        }
        match compile_file_with_config(input, &per_file) {
            Ok(CompileOutcome::Artifacts(paths)) => {
                for p in paths {
                    println!("{}", p.display());
                }
            }
            Ok(CompileOutcome::JitExit(code)) => exit_code = code,
            Err(e) => {
                eprintln!("{e}");
                exit_code = e.exit_code();
            }
        }
    }
    ExitCode::from(exit_code.clamp(0, 255) as u8)
}

fn init_tracing(verbose: u8) {
    let filter = match std::env::var("EMBERC_LOG") {
        Ok(from_env) => EnvFilter::new(from_env),
        Err(_) => EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
