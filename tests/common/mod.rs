use anyhow::Result;

/// Compile Adder source text to textual LLVM IR with runtime checks on.
#[allow(dead_code)]
pub fn gen_ir_for_source(src: &str) -> Result<String> {
    adder::compile_source_to_ir(src, "adder_test", true)
}

/// Same, with the runtime checks suppressed.
#[allow(dead_code)]
pub fn gen_ir_no_checks(src: &str) -> Result<String> {
    adder::compile_source_to_ir(src, "adder_test", false)
}
