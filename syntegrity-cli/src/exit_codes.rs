/// Exit codes for CI/automation.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
