/// Everything succeeded.
pub const SUCCESS: i32 = 0;
/// Reading, processing or writing failed.
pub const EXECUTION_ERROR: i32 = 1;
/// Bad arguments, missing files or an unreadable configuration.
pub const INPUT_ERROR: i32 = 2;
/// The recording is not a well-formed XDF file.
pub const PARSE_ERROR: i32 = 3;
/// Some batch inputs failed while others succeeded.
pub const PARTIAL_FAILURE: i32 = 4;
