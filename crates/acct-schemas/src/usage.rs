use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Provider-computed usage totals for one resource over the queried window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageAggregateEntry {
    pub resource_id: String,
    pub memory_mb: u64,
    pub vcpus: u32,
    pub disk_gb: u64,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    /// Measured compute-hours for the aggregation period.
    pub hours: f64,
}

impl UsageAggregateEntry {
    /// Measured compute time in whole seconds, truncated toward zero.
    /// Negative or NaN hours read as zero.
    pub fn compute_secs(&self) -> i64 {
        let hours = if self.hours.is_nan() { 0.0 } else { self.hours.max(0.0) };
        (hours * 3600.0) as i64
    }
}

/// Energy drawn by one resource over the queried window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyReading {
    pub resource_id: String,
    pub energy_wh: f64,
}

impl EnergyReading {
    /// NaN, zero and negative readings carry no energy.
    pub fn has_energy(&self) -> bool {
        self.energy_wh > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hours: f64) -> UsageAggregateEntry {
        UsageAggregateEntry {
            resource_id: "vm-1".to_string(),
            memory_mb: 2048,
            vcpus: 2,
            disk_gb: 20,
            started_at: chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            ended_at: None,
            hours,
        }
    }

    #[test]
    fn compute_secs_truncates() {
        assert_eq!(entry(1.5).compute_secs(), 5400);
        assert_eq!(entry(0.00027).compute_secs(), 0);
    }

    #[test]
    fn compute_secs_ignores_garbage() {
        assert_eq!(entry(-2.0).compute_secs(), 0);
        assert_eq!(entry(f64::NAN).compute_secs(), 0);
    }

    #[test]
    fn only_positive_readings_carry_energy() {
        let r = |wh| EnergyReading {
            resource_id: "vm-1".to_string(),
            energy_wh: wh,
        };
        assert!(r(0.5).has_energy());
        assert!(!r(0.0).has_energy());
        assert!(!r(-1.0).has_energy());
        assert!(!r(f64::NAN).has_energy());
    }
}
