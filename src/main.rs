use clap::Parser;

use adder::{diagnostics, CompileOptions, EmitKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitArg {
    /// Textual LLVM IR
    Ir,
    /// Relocatable object file
    Obj,
    /// Linked executable
    Bin,
}

/// AOT compiler for the Adder scripting language.
#[derive(Parser, Debug)]
#[command(name = "adderc", version, about)]
struct Cli {
    /// Source file to compile
    input: String,

    /// Output path (defaults next to the input)
    #[arg(short, long)]
    output: Option<String>,

    /// Artifact to produce
    #[arg(long, value_enum, default_value_t = EmitArg::Bin)]
    emit: EmitArg,

    /// Skip the emitted runtime checks (defined-use, operand types, bounds)
    #[arg(long)]
    no_checks: bool,

    /// Linker for the final binary (defaults to cc)
    #[arg(long)]
    linker: Option<String>,
}

fn main() {
    if run().is_err() {
        // The diagnostic has already been reported.
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = CompileOptions {
        src_file: cli.input.clone(),
        out_name: cli.output,
        emit: match cli.emit {
            EmitArg::Ir => EmitKind::Ir,
            EmitArg::Obj => EmitKind::Object,
            EmitArg::Bin => EmitKind::Binary,
        },
        exceptions: !cli.no_checks,
        linker: cli.linker,
    };

    match adder::compile(options) {
        Ok(Some(path)) => {
            println!("{}", path);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            let source = std::fs::read_to_string(&cli.input).ok();
            diagnostics::report_error_and_bail(
                Some(&cli.input),
                source.as_deref(),
                &err.to_string(),
                None,
            )
        }
    }
}
