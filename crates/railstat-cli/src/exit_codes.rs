//! Exit codes for the `railstat` binary. Scripts depend on these values.

pub const SUCCESS: i32 = 0;
pub const NO_REQUESTS: i32 = 1; // Input was readable but no request could be reconstructed
pub const CONFIG_ERROR: i32 = 2; // Bad arguments, unreadable config or input
