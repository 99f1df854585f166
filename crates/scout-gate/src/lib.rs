//! Pre-execution gate for shell commands.
//!
//! `CommandGate::evaluate` takes a raw command string and answers allow or
//! block. Anything the gate cannot parse is blocked.

pub mod extract;
pub mod hook;
pub mod policy;
pub mod validators;

pub use extract::{extract_programs, split_segments, Extraction};
pub use hook::{is_shell_tool, shell_command};
pub use policy::{BlockKind, CommandGate, Decision, GatePolicy};
pub use validators::ArgumentValidator;
