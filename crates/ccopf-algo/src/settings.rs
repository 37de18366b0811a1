//! Settings bundle selecting the uncertainty model and active chance constraints.
//!
//! The bundle is a flat key/value mapping. Keys keep their customary spellings
//! (`Σ`, `Ψ`); the ASCII aliases `sigma` and `psi` are accepted as well.
//!
//! ```
//! use ccopf_algo::settings::Settings;
//!
//! let settings = Settings::from_json_str(r#"{
//!     "var_vec": [0.0, 0.1],
//!     "sigma": [[0.0, 0.0], [0.0, 0.01]],
//!     "z_g": 1.645, "z_v": 1.645,
//!     "toggle_volt_cc": true, "toggle_gen_cc": true, "toggle_thermal_cc": false,
//!     "thermal_const_method": 2,
//!     "vfac": 0.05, "qcfac": 1.0,
//!     "output_level": 0,
//!     "psi": 10.0
//! }"#).unwrap();
//!
//! assert!(settings.toggle_volt_cc);
//! assert_eq!(settings.loadfac, None);
//! ```

use serde::{Deserialize, Serialize};

use crate::OpfError;

/// Required keys with their accepted aliases. `loadfac` is the only optional key.
pub const REQUIRED_KEYS: &[(&str, &[&str])] = &[
    ("var_vec", &[]),
    ("Σ", &["sigma"]),
    ("z_g", &[]),
    ("z_v", &[]),
    ("toggle_volt_cc", &[]),
    ("toggle_gen_cc", &[]),
    ("toggle_thermal_cc", &[]),
    ("thermal_const_method", &[]),
    ("vfac", &[]),
    ("qcfac", &[]),
    ("output_level", &[]),
    ("Ψ", &["psi"]),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Uncertainty basis: per-bus forecast standard deviation behind `sigma`
    pub var_vec: Vec<f64>,
    /// Covariance of uncertain net injections, one row/column per bus (root row is the reference)
    #[serde(rename = "Σ", alias = "sigma")]
    pub sigma: Vec<Vec<f64>>,
    /// Standard-normal quantile for generation (and line-flow) chance constraints.
    /// Negative for risk levels above one half.
    pub z_g: f64,
    /// Standard-normal quantile for voltage chance constraints
    pub z_v: f64,
    pub toggle_volt_cc: bool,
    pub toggle_gen_cc: bool,
    pub toggle_thermal_cc: bool,
    /// 0 = none, 1 = exact SOC, 2 = 12-facet polyhedral; anything else falls back to none
    pub thermal_const_method: i64,
    /// Relative voltage band; `> 0` overrides per-bus limits with `[1 - vfac, 1 + vfac]`
    pub vfac: f64,
    /// Multiplier on quadratic cost coefficients
    pub qcfac: f64,
    /// Solver verbosity (0 = silent)
    pub output_level: u8,
    /// Weight of the voltage variance penalty
    #[serde(rename = "Ψ", alias = "psi")]
    pub psi: f64,
    /// Uniform demand scaling applied before the build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loadfac: Option<f64>,
}

/// Deterministic thermal-limit encodings selectable through `thermal_const_method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalMethod {
    None,
    ExactCone,
    Polyhedral,
}

impl ThermalMethod {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ThermalMethod::None),
            1 => Some(ThermalMethod::ExactCone),
            2 => Some(ThermalMethod::Polyhedral),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            ThermalMethod::None => 0,
            ThermalMethod::ExactCone => 1,
            ThermalMethod::Polyhedral => 2,
        }
    }
}

impl Settings {
    /// Parse a settings mapping, reporting the first missing required key by name.
    pub fn from_value(value: serde_json::Value) -> Result<Self, OpfError> {
        let map = value
            .as_object()
            .ok_or_else(|| OpfError::invalid("settings", "expected a key/value mapping"))?;
        for (key, aliases) in REQUIRED_KEYS {
            if !map.contains_key(*key) && !aliases.iter().any(|a| map.contains_key(*a)) {
                return Err(OpfError::MissingSetting((*key).to_string()));
            }
        }
        serde_json::from_value(value).map_err(|e| OpfError::invalid("settings", e.to_string()))
    }

    pub fn from_json_str(json: &str) -> Result<Self, OpfError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| OpfError::invalid("settings", e.to_string()))?;
        Self::from_value(value)
    }

    /// Zero covariance, every chance constraint off, no thermal limits.
    pub fn deterministic(n_buses: usize) -> Self {
        Self {
            var_vec: vec![0.0; n_buses],
            sigma: vec![vec![0.0; n_buses]; n_buses],
            z_g: 0.0,
            z_v: 0.0,
            toggle_volt_cc: false,
            toggle_gen_cc: false,
            toggle_thermal_cc: false,
            thermal_const_method: 0,
            vfac: 0.0,
            qcfac: 1.0,
            output_level: 0,
            psi: 0.0,
            loadfac: None,
        }
    }

    /// Diagonal covariance built from `var_vec` (`Σ = diag(var_vec²)`).
    pub fn with_independent_uncertainty(mut self, std_dev: Vec<f64>) -> Self {
        let n = std_dev.len();
        self.sigma = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| if i == j { std_dev[i] * std_dev[i] } else { 0.0 })
                    .collect()
            })
            .collect();
        self.var_vec = std_dev;
        self
    }

    pub fn thermal_method(&self) -> Option<ThermalMethod> {
        ThermalMethod::from_code(self.thermal_const_method)
    }

    /// Effective load factor (`loadfac` or 1).
    pub fn load_factor(&self) -> f64 {
        self.loadfac.unwrap_or(1.0)
    }

    /// Check value ranges and dimensions against a feeder with `n_buses` buses.
    pub fn validate(&self, n_buses: usize) -> Result<(), OpfError> {
        if self.var_vec.len() != n_buses {
            return Err(OpfError::invalid(
                "var_vec",
                format!("expected {} entries, found {}", n_buses, self.var_vec.len()),
            ));
        }
        if self.sigma.len() != n_buses || self.sigma.iter().any(|row| row.len() != n_buses) {
            return Err(OpfError::invalid(
                "Σ",
                format!("expected a {}x{} covariance matrix", n_buses, n_buses),
            ));
        }
        if self.sigma.iter().flatten().any(|v| !v.is_finite()) {
            return Err(OpfError::invalid("Σ", "contains non-finite entries"));
        }
        for (key, value) in [("z_g", self.z_g), ("z_v", self.z_v)] {
            if !value.is_finite() {
                return Err(OpfError::invalid(key, format!("must be finite, got {}", value)));
            }
        }
        for (key, value) in [
            ("qcfac", self.qcfac),
            ("Ψ", self.psi),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(OpfError::invalid(
                    key,
                    format!("must be finite and non-negative, got {}", value),
                ));
            }
        }
        if !(self.vfac.is_finite() && (0.0..1.0).contains(&self.vfac)) {
            return Err(OpfError::invalid(
                "vfac",
                format!("must lie in [0, 1), got {}", self.vfac),
            ));
        }
        if let Some(f) = self.loadfac {
            if !f.is_finite() || f < 0.0 {
                return Err(OpfError::invalid(
                    "loadfac",
                    format!("must be finite and non-negative, got {}", f),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_mapping() -> serde_json::Value {
        json!({
            "var_vec": [0.0, 0.1, 0.2],
            "Σ": [[0.0, 0.0, 0.0], [0.0, 0.01, 0.0], [0.0, 0.0, 0.04]],
            "z_g": 1.28,
            "z_v": 1.64,
            "toggle_volt_cc": true,
            "toggle_gen_cc": false,
            "toggle_thermal_cc": false,
            "thermal_const_method": 1,
            "vfac": 0.0,
            "qcfac": 1.0,
            "output_level": 0,
            "Ψ": 5.0
        })
    }

    #[test]
    fn test_parses_greek_keys() {
        let settings = Settings::from_value(full_mapping()).unwrap();
        assert_eq!(settings.sigma[2][2], 0.04);
        assert_eq!(settings.psi, 5.0);
        assert_eq!(settings.thermal_method(), Some(ThermalMethod::ExactCone));
        assert_eq!(settings.load_factor(), 1.0);
        settings.validate(3).unwrap();
    }

    #[test]
    fn test_missing_key_is_named() {
        let mut value = full_mapping();
        value.as_object_mut().unwrap().remove("z_v");
        match Settings::from_value(value) {
            Err(OpfError::MissingSetting(key)) => assert_eq!(key, "z_v"),
            other => panic!("expected missing z_v, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_covariance_reports_canonical_name() {
        let mut value = full_mapping();
        value.as_object_mut().unwrap().remove("Σ");
        match Settings::from_value(value) {
            Err(OpfError::MissingSetting(key)) => assert_eq!(key, "Σ"),
            other => panic!("expected missing Σ, got {:?}", other),
        }
    }

    #[test]
    fn test_loadfac_is_optional() {
        let mut value = full_mapping();
        value["loadfac"] = json!(1.2);
        let settings = Settings::from_value(value).unwrap();
        assert_eq!(settings.loadfac, Some(1.2));
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let mut value = full_mapping();
        value["toggle_gen_cc"] = json!("yes");
        assert!(matches!(
            Settings::from_value(value),
            Err(OpfError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_quantiles_may_be_negative() {
        let mut settings = Settings::from_value(full_mapping()).unwrap();
        settings.z_g = -0.52;
        settings.z_v = -1.28;
        assert!(settings.validate(3).is_ok());

        settings.z_v = f64::NAN;
        assert!(matches!(
            settings.validate(3),
            Err(OpfError::InvalidSetting { ref key, .. }) if key == "z_v"
        ));

        settings.z_v = 1.0;
        settings.psi = -1.0;
        assert!(settings.validate(3).is_err());
    }

    #[test]
    fn test_unknown_thermal_code() {
        assert_eq!(ThermalMethod::from_code(7), None);
        assert_eq!(ThermalMethod::from_code(2), Some(ThermalMethod::Polyhedral));
    }

    #[test]
    fn test_validate_dimensions() {
        let settings = Settings::deterministic(3);
        assert!(settings.validate(3).is_ok());
        assert!(matches!(
            settings.validate(4),
            Err(OpfError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_independent_uncertainty() {
        let settings = Settings::deterministic(3).with_independent_uncertainty(vec![0.0, 0.1, 0.2]);
        assert!((settings.sigma[1][1] - 0.01).abs() < 1e-15);
        assert_eq!(settings.sigma[1][2], 0.0);
    }
}
