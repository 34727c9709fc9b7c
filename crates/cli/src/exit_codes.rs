//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain     | Description                                   |
//! |---------|------------|-----------------------------------------------|
//! | 0       | Universal  | Success                                       |
//! | 1       | Universal  | General error (unspecified)                   |
//! | 2       | Universal  | CLI usage error (bad args)                    |
//! | 3       | Universal  | File read/write failure                       |
//! | 10-19   | config     | Project file parse/validation                 |
//! | 20-29   | input      | Feature files, pair files, value ranges       |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Map the error kind in [`exit_code_for`]

use zeroer_core::ZeroerError;

// =============================================================================
// Universal (0-3)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, conflicting options.
pub const EXIT_USAGE: u8 = 2;

/// A file could not be read or written.
pub const EXIT_IO: u8 = 3;

// =============================================================================
// Config (10-19)
// =============================================================================

/// Project file is not valid TOML or has unknown keys.
pub const EXIT_CONFIG_PARSE: u8 = 10;

/// Project file parsed but a value is out of range, a required file is
/// missing, or a dataset id has no blocking rule.
pub const EXIT_CONFIG_INVALID: u8 = 11;

// =============================================================================
// Input (20-29)
// =============================================================================

/// Malformed input: missing id columns, unparsable cells, empty or
/// misaligned matrices.
pub const EXIT_INPUT_MALFORMED: u8 = 20;

/// A feature value cannot be brought into [0,1] (NaN, infinite).
pub const EXIT_INPUT_RANGE: u8 = 21;

/// Main and self-join feature files share no column.
pub const EXIT_FEATURE_SET: u8 = 22;

/// Map an engine error to its exit code.
pub fn exit_code_for(err: &ZeroerError) -> u8 {
    match err.kind() {
        "config_parse" => EXIT_CONFIG_PARSE,
        "config_validation" => EXIT_CONFIG_INVALID,
        "empty_matrix" | "shape_mismatch" | "missing_identity_table" | "missing_column"
        | "value_parse" => EXIT_INPUT_MALFORMED,
        "input_range" => EXIT_INPUT_RANGE,
        "inconsistent_feature_set" => EXIT_FEATURE_SET,
        "io" => EXIT_IO,
        _ => EXIT_ERROR,
    }
}

/// One-line remedy for an error kind, if there is a useful one.
pub fn hint_for(err: &ZeroerError) -> Option<&'static str> {
    match err.kind() {
        "input_range" => Some("NaN or infinite feature values cannot be rescaled; check feature extraction"),
        "inconsistent_feature_set" => {
            Some("self-join feature files must share at least one column with the main feature file")
        }
        "missing_column" => Some("feature files need ltable_id and rtable_id columns"),
        "empty_matrix" => Some("the feature file has no rows or no feature columns"),
        "config_parse" => Some("see `zeroer validate --help` for the project file layout"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_specific_code() {
        let errors = [
            ZeroerError::ConfigParse("x".into()),
            ZeroerError::ConfigValidation("x".into()),
            ZeroerError::EmptyMatrix { what: "features".into(), rows: 0, columns: 0 },
            ZeroerError::ShapeMismatch("x".into()),
            ZeroerError::MissingIdentityTable("x".into()),
            ZeroerError::InputRange { column: "c".into(), row: 0, value: f64::NAN },
            ZeroerError::InconsistentFeatureSet { main: vec![], left: vec![], right: vec![] },
            ZeroerError::MissingColumn { source_name: "f".into(), column: "c".into() },
            ZeroerError::ValueParse {
                source_name: "f".into(),
                row: 1,
                column: "c".into(),
                value: "v".into(),
            },
            ZeroerError::Io("x".into()),
        ];
        for err in &errors {
            assert_ne!(exit_code_for(err), EXIT_ERROR, "{}", err.kind());
        }
    }
}
