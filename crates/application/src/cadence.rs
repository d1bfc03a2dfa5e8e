//! 发布节奏调度
//!
//! 基于cron表达式推导下一个kickoff候选时刻；工作日吸附由
//! [`crate::calendar::WorkingCalendar`] 负责。

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::warn;

use orchestrator_errors::{OrchestratorError, OrchestratorResult};

#[derive(Debug)]
pub struct CadenceSchedule {
    schedule: Schedule,
}

impl CadenceSchedule {
    pub fn new(cron_expr: &str) -> OrchestratorResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| OrchestratorError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { schedule })
    }

    /// 上次kickoff之后的下一个节奏时刻
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// 判断节奏是否已经到期
    pub fn should_trigger(&self, last_kickoff: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let base = match last_kickoff {
            Some(last) => last,
            None => now - chrono::Duration::days(1),
        };
        match self.next_after(base) {
            Some(next_time) => next_time <= now,
            None => {
                warn!("节奏表达式无法解析出下一个时刻");
                false
            }
        }
    }

    pub fn validate(cron_expr: &str) -> OrchestratorResult<()> {
        Schedule::from_str(cron_expr).map_err(|e| OrchestratorError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_invalid_expression_is_rejected() {
        assert!(CadenceSchedule::new("not a cron").is_err());
        assert!(CadenceSchedule::validate("* * *").is_err());
        assert!(CadenceSchedule::validate("0 0 9 * * Mon").is_ok());
    }

    #[test]
    fn test_next_after_weekly_cadence() {
        // 每周一 09:00
        let cadence = CadenceSchedule::new("0 0 9 * * Mon").unwrap();
        let friday = Utc.with_ymd_and_hms(2026, 8, 21, 12, 0, 0).single().unwrap();
        let next = cadence.next_after(friday).unwrap();
        assert_eq!(next.to_rfc3339(), "2026-08-24T09:00:00+00:00");
    }

    #[test]
    fn test_should_trigger_respects_last_kickoff() {
        let cadence = CadenceSchedule::new("0 0 9 * * Mon").unwrap();
        let last = Utc.with_ymd_and_hms(2026, 8, 17, 9, 0, 0).single().unwrap();

        // 下一个周一之前不触发
        let thursday = Utc.with_ymd_and_hms(2026, 8, 20, 9, 0, 0).single().unwrap();
        assert!(!cadence.should_trigger(Some(last), thursday));

        // 下一个周一之后触发
        let next_monday = Utc.with_ymd_and_hms(2026, 8, 24, 10, 0, 0).single().unwrap();
        assert!(cadence.should_trigger(Some(last), next_monday));
    }
}
