use forge86::assembler::{assemble_source, AssembleOptions, CompiledUnit};
use forge86::core::error::AsmError;

pub fn assemble(source: &str) -> CompiledUnit {
    assemble_source(source, &AssembleOptions::default())
        .unwrap_or_else(|e| panic!("assembly failed: {e}"))
}

pub fn assemble_err(source: &str) -> AsmError {
    assemble_source(source, &AssembleOptions::default()).expect_err("assembly should fail")
}

#[allow(dead_code)]
pub fn label_address(unit: &CompiledUnit, name: &str) -> u32 {
    unit.labels
        .iter()
        .find(|(n, _)| n == name)
        .unwrap_or_else(|| panic!("label {name} missing"))
        .1
}
