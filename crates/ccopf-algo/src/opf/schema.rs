//! Model shape as a function of the settings toggles.
//!
//! The schema is resolved once, before any variable is declared. Every later
//! stage asks the schema instead of re-reading the toggles, so the derived
//! `any_cc` flag has a single source.

use ccopf_core::Diagnostics;
use serde::Serialize;
use tracing::warn;

use crate::model::VarGroup;
use crate::settings::{Settings, ThermalMethod};

/// Thermal limit encoding applied to lines with a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalLimit {
    Unconstrained,
    /// `‖(fp, fq)‖₂ ≤ s_max`
    ExactCone,
    /// 12-facet outer approximation of the disk
    Polyhedral,
    /// Polyhedral facets inflated by the flow standard deviation
    ChanceConstrained,
}

/// Independently assembled constraint families, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintFamily {
    PowerBalance,
    VoltageDrop,
    Substation,
    GenerationLimits,
    VoltageBand,
    Balancing,
    VoltageChance,
    ThermalExact,
    ThermalPolyhedral,
    ThermalChance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSchema {
    pub volt_cc: bool,
    pub gen_cc: bool,
    pub thermal_cc: bool,
    /// Any chance constraint enabled: shared participation factors and balancing cost
    pub any_cc: bool,
    /// Raw `thermal_const_method` as configured
    pub thermal_method_code: i64,
    pub thermal: ThermalLimit,
}

impl ModelSchema {
    /// Resolve the schema. An unknown thermal method is recorded in `diagnostics`
    /// and treated as "no thermal limit".
    pub fn from_settings(settings: &Settings, diagnostics: &mut Diagnostics) -> Self {
        let method = settings.thermal_method();
        if method.is_none() {
            warn!(
                thermal_const_method = settings.thermal_const_method,
                "unknown thermal constraint method; thermal limits left unconstrained"
            );
            diagnostics.add_warning_with_entity(
                "thermal",
                &format!(
                    "unknown thermal_const_method {}; expected 0, 1 or 2, thermal limits unconstrained",
                    settings.thermal_const_method
                ),
                "thermal_const_method",
            );
        }

        let thermal = if settings.toggle_thermal_cc {
            ThermalLimit::ChanceConstrained
        } else {
            match method {
                Some(ThermalMethod::ExactCone) => ThermalLimit::ExactCone,
                Some(ThermalMethod::Polyhedral) => ThermalLimit::Polyhedral,
                Some(ThermalMethod::None) | None => ThermalLimit::Unconstrained,
            }
        };

        Self {
            volt_cc: settings.toggle_volt_cc,
            gen_cc: settings.toggle_gen_cc,
            thermal_cc: settings.toggle_thermal_cc,
            any_cc: settings.toggle_volt_cc
                || settings.toggle_gen_cc
                || settings.toggle_thermal_cc,
            thermal_method_code: settings.thermal_const_method,
            thermal,
        }
    }

    pub fn variable_groups(&self) -> Vec<VarGroup> {
        let mut groups = vec![
            VarGroup::V,
            VarGroup::Fp,
            VarGroup::Fq,
            VarGroup::Gp,
            VarGroup::Gq,
            VarGroup::RSched,
        ];
        if self.any_cc {
            groups.extend([VarGroup::Alpha, VarGroup::RBal]);
        }
        if self.volt_cc {
            groups.extend([VarGroup::Rho, VarGroup::T]);
        }
        if self.thermal_cc {
            groups.extend([VarGroup::RhoF, VarGroup::TF]);
        }
        groups
    }

    pub fn constraint_families(&self) -> Vec<ConstraintFamily> {
        let mut families = vec![
            ConstraintFamily::PowerBalance,
            ConstraintFamily::VoltageDrop,
            ConstraintFamily::Substation,
            ConstraintFamily::GenerationLimits,
            ConstraintFamily::VoltageBand,
        ];
        if self.any_cc {
            families.push(ConstraintFamily::Balancing);
        }
        if self.volt_cc {
            families.push(ConstraintFamily::VoltageChance);
        }
        match self.thermal {
            ThermalLimit::Unconstrained => {}
            ThermalLimit::ExactCone => families.push(ConstraintFamily::ThermalExact),
            ThermalLimit::Polyhedral => families.push(ConstraintFamily::ThermalPolyhedral),
            ThermalLimit::ChanceConstrained => families.push(ConstraintFamily::ThermalChance),
        }
        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(volt: bool, gen: bool, thermal: bool, method: i64) -> Settings {
        let mut s = Settings::deterministic(3);
        s.toggle_volt_cc = volt;
        s.toggle_gen_cc = gen;
        s.toggle_thermal_cc = thermal;
        s.thermal_const_method = method;
        s
    }

    #[test]
    fn test_deterministic_schema() {
        let mut diag = Diagnostics::new();
        let schema = ModelSchema::from_settings(&settings(false, false, false, 0), &mut diag);

        assert!(!schema.any_cc);
        assert_eq!(schema.thermal, ThermalLimit::Unconstrained);
        assert_eq!(schema.variable_groups().len(), 6);
        assert!(!schema
            .constraint_families()
            .contains(&ConstraintFamily::Balancing));
        assert!(!diag.has_warnings());
    }

    #[test]
    fn test_any_cc_from_single_toggle() {
        let mut diag = Diagnostics::new();
        let schema = ModelSchema::from_settings(&settings(false, true, false, 1), &mut diag);

        assert!(schema.any_cc);
        let groups = schema.variable_groups();
        assert!(groups.contains(&VarGroup::Alpha));
        assert!(groups.contains(&VarGroup::RBal));
        assert!(!groups.contains(&VarGroup::Rho));
        assert_eq!(schema.thermal, ThermalLimit::ExactCone);
    }

    #[test]
    fn test_thermal_cc_overrides_method() {
        let mut diag = Diagnostics::new();
        let schema = ModelSchema::from_settings(&settings(false, false, true, 1), &mut diag);

        assert_eq!(schema.thermal, ThermalLimit::ChanceConstrained);
        assert!(schema.variable_groups().contains(&VarGroup::TF));
        assert!(schema
            .constraint_families()
            .contains(&ConstraintFamily::ThermalChance));
    }

    #[test]
    fn test_unknown_method_warns() {
        let mut diag = Diagnostics::new();
        let schema = ModelSchema::from_settings(&settings(false, false, false, 5), &mut diag);

        assert_eq!(schema.thermal, ThermalLimit::Unconstrained);
        assert_eq!(diag.warning_count(), 1);
        assert!(diag.issues[0].message.contains('5'));
    }
}
