//! Confirmation messages and run outcomes.

use std::fmt;

/// A one-line confirmation or failure notice.
pub struct OperationStatus {
    pub message: String,
    pub success: bool,
}

impl OperationStatus {
    pub fn success(message: String) -> Self {
        Self {
            message,
            success: true,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            message,
            success: false,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}",
            if self.success { "Success:" } else { "Error:" },
            self.message
        )
    }
}

/// The terminal event of a run, as shown once the run ends.
pub struct RunResult<'a> {
    pub session_id: &'a str,
    pub success: bool,
    pub summary: &'a str,
}

impl fmt::Display for RunResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "## Run {} ({})",
            if self.success { "complete" } else { "failed" },
            self.session_id
        )?;
        writeln!(f)?;
        writeln!(f, "{}", self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_status_display() {
        let success = OperationStatus::success("Run started".to_string());
        assert!(format!("{success}").contains("Success:"));

        let failure = OperationStatus::failure("No active run".to_string());
        assert!(format!("{failure}").contains("Error:"));
    }

    #[test]
    fn test_run_result_display() {
        let result = RunResult {
            session_id: "s1",
            success: false,
            summary: "Completed 1 of 2 objectives.",
        };
        let output = result.to_string();
        assert!(output.starts_with("## Run failed (s1)"));
        assert!(output.contains("Completed 1 of 2"));
    }
}
