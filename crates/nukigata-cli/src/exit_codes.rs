//! Process exit codes.
//!
//! Library errors map through `NukigataError::exit_code`; anything else is a
//! generic failure.

use nukigata_core::NukigataError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
/// Lookup completed but the die was not found.
pub const NOT_FOUND: i32 = 4;

pub fn for_error(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<NukigataError>())
        .map(NukigataError::exit_code)
        .unwrap_or(FAILURE)
}
