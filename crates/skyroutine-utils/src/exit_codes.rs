//! Exit code constants for skyroutine.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Routine completed and every step succeeded |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `ROUTINE_ABORTED` | Force stop or abort policy ended the mission early |
//! | 4 | `STEP_FAILURES` | Routine completed but one or more steps failed |
//! | 5 | `INVALID_PARAMS` | Startup parameter string could not be parsed |

/// Exit codes matching the documented exit code table.
///
/// ```rust
/// use skyroutine_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::ROUTINE_ABORTED, ExitCode::from_i32(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - routine completed without failed steps
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Routine aborted before all mission steps ran (landing was still issued)
    pub const ROUTINE_ABORTED: ExitCode = ExitCode(3);

    /// Routine completed but at least one step reported a failure
    pub const STEP_FAILURES: ExitCode = ExitCode(4);

    /// Startup parameter string was malformed
    pub const INVALID_PARAMS: ExitCode = ExitCode(5);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
