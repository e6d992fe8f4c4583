//! Exit codes for guructl

use guru_common::engine::EngineResult;

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code when the turn failed (generation, validation, execution)
pub const EXIT_TURN_ERROR: i32 = 1;

/// Exit code when the question was too ambiguous to answer
pub const EXIT_NEEDS_CLARIFICATION: i32 = 2;

pub fn exit_code_for(res: &EngineResult) -> i32 {
    if res.needs_clarification {
        EXIT_NEEDS_CLARIFICATION
    } else if res.error.is_some() {
        EXIT_TURN_ERROR
    } else {
        EXIT_SUCCESS
    }
}
