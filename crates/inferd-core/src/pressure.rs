//! GPU memory pressure classification

use serde::{Deserialize, Serialize};

/// The pressure bucket derived from current GPU memory utilization.
///
/// Boundaries are exact: 79.9% is Healthy, 80.0% is Warning, 90.0% is
/// Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PressureLevel {
    /// Below 80% used
    Healthy,
    /// 80% to just under 90% used
    Warning,
    /// 90% or more used
    Critical,
}

impl PressureLevel {
    /// Classify a utilization percentage (0.0 to 100.0)
    pub fn from_utilization(percent: f64) -> Self {
        if percent >= 90.0 {
            PressureLevel::Critical
        } else if percent >= 80.0 {
            PressureLevel::Warning
        } else {
            PressureLevel::Healthy
        }
    }

    /// Classify from raw byte counts
    pub fn classify(used_bytes: u64, total_bytes: u64) -> Self {
        if total_bytes == 0 {
            // A zero-capacity reading is a telemetry fault; treat it as the
            // loudest signal rather than a healthy one.
            return PressureLevel::Critical;
        }
        Self::from_utilization(used_bytes as f64 / total_bytes as f64 * 100.0)
    }

    /// Whether this level warrants an advisory event
    pub fn is_elevated(&self) -> bool {
        matches!(self, PressureLevel::Warning | PressureLevel::Critical)
    }
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PressureLevel::Healthy => write!(f, "healthy"),
            PressureLevel::Warning => write!(f, "warning"),
            PressureLevel::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_are_exact() {
        assert_eq!(PressureLevel::from_utilization(79.9), PressureLevel::Healthy);
        assert_eq!(PressureLevel::from_utilization(80.0), PressureLevel::Warning);
        assert_eq!(PressureLevel::from_utilization(89.9), PressureLevel::Warning);
        assert_eq!(PressureLevel::from_utilization(90.0), PressureLevel::Critical);
        assert_eq!(PressureLevel::from_utilization(92.0), PressureLevel::Critical);
    }

    #[test]
    fn test_classify_from_bytes() {
        let total = 1000u64;
        assert_eq!(PressureLevel::classify(799, total), PressureLevel::Healthy);
        assert_eq!(PressureLevel::classify(800, total), PressureLevel::Warning);
        assert_eq!(PressureLevel::classify(900, total), PressureLevel::Critical);
    }

    #[test]
    fn test_zero_capacity_is_critical() {
        assert_eq!(PressureLevel::classify(0, 0), PressureLevel::Critical);
    }

    #[test]
    fn test_ordering_and_elevation() {
        assert!(PressureLevel::Healthy < PressureLevel::Warning);
        assert!(PressureLevel::Warning < PressureLevel::Critical);
        assert!(!PressureLevel::Healthy.is_elevated());
        assert!(PressureLevel::Warning.is_elevated());
        assert!(PressureLevel::Critical.is_elevated());
    }

    #[test]
    fn test_display() {
        assert_eq!(PressureLevel::Healthy.to_string(), "healthy");
        assert_eq!(PressureLevel::Critical.to_string(), "critical");
    }
}
