pub mod records;
pub mod roster;
pub mod state;

pub use records::*;
pub use roster::*;
pub use state::*;
