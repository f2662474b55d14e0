//! # 碳排放估计
//!
//! 按运行时间、平均功率和电网碳强度估算一次计算的 CO₂ 当量排放：
//! ```text
//! emissions [kg] = power [W] × t [s] / 3.6e6 × intensity [kg/kWh]
//! ```
//!
//! ## 依赖关系
//! - 被 `eos/` 使用

use crate::error::{QeosError, Result};

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::info;

/// 计时下限，保证估计值为正
const MIN_DURATION: Duration = Duration::from_micros(1);

/// 排放估计参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// 平均功率 (W)
    pub power_watts: f64,
    /// 电网碳强度 (kg CO₂eq / kWh)
    pub carbon_intensity: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            power_watts: 42.5,
            carbon_intensity: 0.475,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.power_watts > 0.0) || !(self.carbon_intensity > 0.0) {
            return Err(QeosError::InvalidConfig(format!(
                "Tracker power ({} W) and carbon intensity ({} kg/kWh) must be positive",
                self.power_watts, self.carbon_intensity
            )));
        }
        Ok(())
    }
}

/// 运行期间的排放计时器
#[derive(Debug)]
pub struct EmissionsTracker {
    config: TrackerConfig,
    started: Instant,
}

impl EmissionsTracker {
    pub fn start(config: &TrackerConfig) -> Self {
        info!("Starting emissions tracker");
        EmissionsTracker {
            config: config.clone(),
            started: Instant::now(),
        }
    }

    /// 停止计时，返回排放量 (kg CO₂eq)
    pub fn stop(self) -> f64 {
        let elapsed = self.started.elapsed().max(MIN_DURATION);
        let emissions = estimate(&self.config, elapsed);
        info!(
            "Emissions tracker stopped after {:.3} s: {:.3e} kg CO2eq",
            elapsed.as_secs_f64(),
            emissions
        );
        emissions
    }
}

/// 给定时长的排放量 (kg CO₂eq)
pub fn estimate(config: &TrackerConfig, elapsed: Duration) -> f64 {
    let kwh = config.power_watts * elapsed.as_secs_f64() / 3.6e6;
    kwh * config.carbon_intensity
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_estimate() {
        let config = TrackerConfig {
            power_watts: 1000.0,
            carbon_intensity: 0.5,
        };
        // 1 kW × 1 h = 1 kWh
        assert_relative_eq!(estimate(&config, Duration::from_secs(3600)), 0.5);
    }

    #[test]
    fn test_tracker_is_positive() {
        let tracker = EmissionsTracker::start(&TrackerConfig::default());
        assert!(tracker.stop() > 0.0);
    }

    #[test]
    fn test_invalid_config() {
        let config = TrackerConfig {
            power_watts: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
