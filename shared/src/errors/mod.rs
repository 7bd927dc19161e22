mod hook_errors;
mod inject_errors;

pub use hook_errors::HookError;
pub use inject_errors::InjectError;
