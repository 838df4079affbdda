mod lowering;
mod properties;
mod scenarios;
mod vm;

use ralphc_compiler::{CompileResult, CompilerError};

pub fn compile(source: &str) -> Result<CompileResult, CompilerError> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    ralphc_compiler::compile_project(source)
}

pub fn compile_ok(source: &str) -> CompileResult {
    match compile(source) {
        Ok(result) => result,
        Err(err) => panic!("expected successful compilation, got:\n{err}"),
    }
}

pub fn compile_err(source: &str) -> CompilerError {
    match compile(source) {
        Ok(_) => panic!("expected a compilation error"),
        Err(err) => err,
    }
}
