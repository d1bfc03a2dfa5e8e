//! 工作日历
//!
//! 发布排期的纯日期运算：工作日判断、工作日偏移、租户时区内的
//! 时刻合成。无任何I/O，可以任意频率调用。

use std::collections::HashSet;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday,
};

use orchestrator_domain::WeekDay;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone)]
pub struct WorkingCalendar {
    working_days: HashSet<Weekday>,
    offset: FixedOffset,
}

impl WorkingCalendar {
    pub fn new(working_days: &[WeekDay], utc_offset_minutes: i32) -> OrchestratorResult<Self> {
        if working_days.is_empty() {
            return Err(OrchestratorError::config_error("工作日集合不能为空"));
        }
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            OrchestratorError::config_error(format!("无效的时区偏移: {utc_offset_minutes}分钟"))
        })?;
        Ok(Self {
            working_days: working_days.iter().map(|d| d.to_chrono()).collect(),
            offset,
        })
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_days.contains(&date.weekday())
    }

    /// 向前推进 `n` 个工作日。
    ///
    /// `n = 0` 时：若当天已是工作日则返回当天，否则返回下一个工作日。
    pub fn add_working_days(&self, date: NaiveDate, n: u32) -> NaiveDate {
        let mut current = self.snap_forward(date);
        for _ in 0..n {
            current = self.snap_forward(current + Duration::days(1));
        }
        current
    }

    /// 向后回退 `n` 个工作日，`n = 0` 时向过去方向吸附。
    pub fn subtract_working_days(&self, date: NaiveDate, n: u32) -> NaiveDate {
        let mut current = self.snap_backward(date);
        for _ in 0..n {
            current = self.snap_backward(current - Duration::days(1));
        }
        current
    }

    fn snap_forward(&self, mut date: NaiveDate) -> NaiveDate {
        while !self.is_working_day(date) {
            date += Duration::days(1);
        }
        date
    }

    fn snap_backward(&self, mut date: NaiveDate) -> NaiveDate {
        while !self.is_working_day(date) {
            date -= Duration::days(1);
        }
        date
    }

    /// 在租户时区内把日期与时刻合成为UTC时间点
    pub fn at_time(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        match self.offset.from_local_datetime(&local).single() {
            Some(dt) => dt.with_timezone(&Utc),
            // FixedOffset下本地时间总是唯一的，此分支仅为保持接口整洁
            None => Utc.from_utc_datetime(&local),
        }
    }

    /// UTC时间点在租户时区内对应的日期
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}
