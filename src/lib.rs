pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod sast;
pub mod semant;
pub mod transform;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use inkwell::context::Context;
use inkwell::targets::{CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine};
use inkwell::OptimizationLevel;

/// Which artifact the driver should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitKind {
    /// Textual LLVM IR (`.ll`).
    Ir,
    /// A relocatable object file for the host triple.
    Object,
    /// A linked executable.
    Binary,
}

/// Compilation options for the Adder compiler.
///
/// The compiler accepts explicit options rather than discovering project
/// structure; the CLI in `main.rs` is a thin wrapper over this.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Path to the source file to compile.
    pub src_file: String,
    /// Override the output path.
    pub out_name: Option<String>,
    pub emit: EmitKind,
    /// Emit the runtime checks (on unless `--no-checks`).
    pub exceptions: bool,
    /// Explicit linker for the final binary; defaults to `cc`.
    pub linker: Option<String>,
}

impl CompileOptions {
    pub fn new(src_file: impl Into<String>) -> Self {
        CompileOptions {
            src_file: src_file.into(),
            out_name: None,
            emit: EmitKind::Binary,
            exceptions: true,
            linker: None,
        }
    }
}

/// Run the frontend and semantic pass over source text.
pub fn analyze(source: &str) -> error::SemantResult<sast::SProgram> {
    let tokens = lexer::lex(source)?;
    let program = parser::parse(tokens)?;
    semant::check_program(&program)
}

/// Compile source text all the way to textual LLVM IR. This is the
/// programmatic surface the tests drive.
pub fn compile_source_to_ir(
    source: &str,
    module_name: &str,
    exceptions: bool,
) -> anyhow::Result<String> {
    let sprog = analyze(source)?;
    let context = Context::create();
    let cg = codegen::CodeGen::new(&context, module_name, exceptions);
    cg.emit_program(&sprog)
        .map_err(|d| anyhow::anyhow!("{}", d.message))?;
    Ok(cg.module.print_to_string().to_string())
}

/// Compile a source file with the given options.
///
/// Returns the path of the produced artifact.
pub fn compile(options: CompileOptions) -> anyhow::Result<Option<String>> {
    let source = std::fs::read_to_string(&options.src_file)
        .with_context(|| format!("failed to read {}", options.src_file))?;
    let sprog = analyze(&source)?;

    let context = Context::create();
    let module_name = Path::new(&options.src_file)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "adder".to_string());
    let cg = codegen::CodeGen::new(&context, &module_name, options.exceptions);
    cg.emit_program(&sprog)
        .map_err(|d| anyhow::anyhow!("{}", d.message))?;

    let default_out = |ext: &str| -> PathBuf {
        let mut p = PathBuf::from(&options.src_file);
        p.set_extension(ext);
        p
    };

    match options.emit {
        EmitKind::Ir => {
            let out = options
                .out_name
                .clone()
                .map(PathBuf::from)
                .unwrap_or_else(|| default_out("ll"));
            std::fs::write(&out, cg.module.print_to_string().to_string())
                .with_context(|| format!("failed to write {}", out.display()))?;
            Ok(Some(out.to_string_lossy().to_string()))
        }
        EmitKind::Object => {
            let out = options
                .out_name
                .clone()
                .map(PathBuf::from)
                .unwrap_or_else(|| default_out("o"));
            write_object(&cg.module, &out)?;
            Ok(Some(out.to_string_lossy().to_string()))
        }
        EmitKind::Binary => {
            let out = options
                .out_name
                .clone()
                .map(PathBuf::from)
                .unwrap_or_else(|| default_out(""));
            let obj = out.with_extension("o");
            write_object(&cg.module, &obj)?;
            link_binary(&obj, &out, options.linker.as_deref())?;
            let _ = std::fs::remove_file(&obj);
            Ok(Some(out.to_string_lossy().to_string()))
        }
    }
}

fn write_object(module: &inkwell::module::Module, out: &Path) -> anyhow::Result<()> {
    Target::initialize_native(&InitializationConfig::default())
        .map_err(|e| anyhow::anyhow!("target init failed: {}", e))?;
    let triple = TargetMachine::get_default_triple();
    module.set_triple(&triple);
    let target = Target::from_triple(&triple).map_err(|e| anyhow::anyhow!("{}", e))?;
    let machine = target
        .create_target_machine(
            &triple,
            "generic",
            "",
            OptimizationLevel::Default,
            RelocMode::PIC,
            CodeModel::Default,
        )
        .ok_or_else(|| anyhow::anyhow!("no target machine for {}", triple))?;
    module.set_data_layout(&machine.get_target_data().get_data_layout());
    machine
        .write_to_file(module, FileType::Object, out)
        .map_err(|e| anyhow::anyhow!("{}", e))
}

/// Link with the system C compiler; `-lm` covers the `pow` dependency of
/// the emitted exponentiation code.
fn link_binary(obj: &Path, out: &Path, linker: Option<&str>) -> anyhow::Result<()> {
    let cc = linker.unwrap_or("cc");
    let status = std::process::Command::new(cc)
        .arg(obj)
        .arg("-o")
        .arg(out)
        .arg("-lm")
        .status()
        .with_context(|| format!("failed to invoke {}", cc))?;
    if !status.success() {
        anyhow::bail!("{} exited with {}", cc, status);
    }
    Ok(())
}
