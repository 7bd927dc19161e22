use thiserror::Error;

/// Failure vocabulary of the table-hooking engine.
///
/// The engine itself reports outcomes as booleans and inactive symbols, never
/// as control flow; these variants exist so the reason a hook half was left
/// inactive is logged in one consistent shape.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("{function} not found in {table} table of {module}")]
    SymbolNotFound {
        table: &'static str,
        module: String,
        function: String,
    },

    #[error("module {name} is not loaded and loading was not requested")]
    ModuleUnavailable { name: String },

    #[error("could not change protection of slot {address:#x}")]
    ProtectionChangeFailed { address: usize },

    #[error("replacement {value:#x} is not encodable relative to base {base:#x}")]
    RelocationOutOfRange { value: usize, base: usize },
}
