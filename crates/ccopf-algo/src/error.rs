use ccopf_core::FeederError;
use thiserror::Error;

/// Errors raised while building (or solving) a chance-constrained OPF model.
#[derive(Debug, Error)]
pub enum OpfError {
    /// A required settings key is absent
    #[error("missing required setting `{0}`")]
    MissingSetting(String),

    /// A settings value is present but unusable
    #[error("invalid setting `{key}`: {reason}")]
    InvalidSetting { key: String, reason: String },

    /// Linear-algebra precondition violated (indefinite covariance, singular sensitivity matrix, ...)
    #[error("numerical issue: {0}")]
    NumericalIssue(String),

    /// A constraint family needs a variable group the schema did not declare
    #[error("variable group `{0}` was not declared for this model")]
    MissingVariable(&'static str),

    /// The conic solver could not be set up or did not reach a usable status
    #[error("solver error: {0}")]
    Solver(String),

    /// Feeder data or lookup failure
    #[error(transparent)]
    Feeder(#[from] FeederError),
}

impl OpfError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        OpfError::InvalidSetting {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccopf_core::BusId;

    #[test]
    fn test_missing_setting_names_key() {
        let err = OpfError::MissingSetting("z_v".into());
        assert_eq!(err.to_string(), "missing required setting `z_v`");
    }

    #[test]
    fn test_feeder_error_conversion() {
        fn inner() -> Result<(), OpfError> {
            Err(FeederError::UnknownBus(BusId::new(9)))?;
            Ok(())
        }
        assert!(matches!(inner(), Err(OpfError::Feeder(_))));
    }
}
