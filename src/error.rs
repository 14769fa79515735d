use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the hard-body engine.
///
/// Only [`Error::Configuration`] is worth retrying (with a fresh seed or a larger
/// attempt budget). Everything else means the inputs or the engine state are unusable.
#[derive(Debug, Error)]
pub enum Error {
    /// Precondition violation: bad dimension count, non-positive radius, non-finite
    /// values, or a supplied state that overlaps or leaves the domain.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Requested packing density cannot be realized in this geometry.
    #[error("density {density:.6} exceeds close-packing limit {limit:.6}")]
    DensityExceeded { density: f64, limit: f64 },

    /// Initial placement failed (attempt budget exhausted or lattice too tight).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Negative or NaN event time, failed energy check, degenerate contact normal,
    /// or a broken overlap/bounds invariant during a run.
    #[error("numerical inconsistency: {0}")]
    NumericalInconsistency(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_informative() {
        let e = Error::InvalidParam("sigma must be > 0".to_string());
        let msg = format!("{e}");
        assert!(msg.contains("invalid parameter"));
        assert!(msg.contains("sigma"));
    }

    #[test]
    fn density_error_reports_both_values() {
        let e = Error::DensityExceeded {
            density: 0.95,
            limit: 0.9069,
        };
        let msg = e.to_string();
        assert!(msg.contains("0.950000"));
        assert!(msg.contains("0.906900"));
    }

    #[test]
    fn result_type_alias_compiles() -> Result<()> {
        Ok(())
    }
}
