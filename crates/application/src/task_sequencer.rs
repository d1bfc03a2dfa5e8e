//! 任务排序器
//!
//! 纯函数：给定一个阶段的任务列表，判断哪些任务可派发、阶段是否
//! 完成、是否存在阻塞性的失败任务。派发顺序按声明序号稳定排序，
//! 与到达顺序无关，保证确定性重放。

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use orchestrator_domain::{ReleaseTask, TaskStatus};

/// 可派发的任务：PENDING、退避时间已到、所有依赖已满足。
///
/// 依赖满足 = 依赖任务为 COMPLETED 或 SKIPPED。列表中不存在的依赖ID
/// 视为未满足（数据不一致时宁可阻塞也不抢跑）。
pub fn eligible_tasks(tasks: &[ReleaseTask], now: DateTime<Utc>) -> Vec<&ReleaseTask> {
    let by_id: HashMap<i64, &ReleaseTask> = tasks.iter().map(|t| (t.id, t)).collect();

    let mut eligible: Vec<&ReleaseTask> = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Pending)
        .filter(|task| match task.next_attempt_at {
            Some(at) => at <= now,
            None => true,
        })
        .filter(|task| {
            task.dependencies.iter().all(|dep_id| {
                by_id
                    .get(dep_id)
                    .map(|dep| dep.satisfies_dependency())
                    .unwrap_or(false)
            })
        })
        .collect();

    eligible.sort_by_key(|task| (task.sequence, task.id));
    eligible
}

/// 阶段完成 = 所有必选任务为 COMPLETED 或 SKIPPED；可选任务不阻塞。
pub fn is_stage_complete(tasks: &[ReleaseTask]) -> bool {
    tasks
        .iter()
        .filter(|task| !task.optional)
        .all(|task| task.satisfies_dependency())
}

/// 第一个处于 FAILED 的必选任务（按序号），存在即应阻塞阶段推进
pub fn first_failed_required(tasks: &[ReleaseTask]) -> Option<&ReleaseTask> {
    tasks
        .iter()
        .filter(|task| !task.optional && task.status == TaskStatus::Failed)
        .min_by_key(|task| (task.sequence, task.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::{Stage, TaskError, TaskErrorKind, TaskType};

    fn task(id: i64, sequence: i32, deps: Vec<i64>, optional: bool) -> ReleaseTask {
        let mut t = ReleaseTask::new(
            1,
            Stage::Kickoff,
            TaskType::TriggerBuild,
            format!("task-{id}"),
            sequence,
            deps,
            optional,
            serde_json::json!({}),
        );
        t.id = id;
        t
    }

    #[test]
    fn test_task_without_dependencies_is_eligible() {
        let tasks = vec![task(1, 1, vec![], false)];
        let eligible = eligible_tasks(&tasks, Utc::now());
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, 1);
    }

    #[test]
    fn test_unmet_dependency_blocks_eligibility() {
        let tasks = vec![task(1, 1, vec![], false), task(2, 2, vec![1], false)];
        let eligible = eligible_tasks(&tasks, Utc::now());
        // 任务2自身是PENDING，但依赖1未完成，不可派发
        assert_eq!(eligible.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_completed_and_skipped_dependencies_both_satisfy() {
        let mut dep_completed = task(1, 1, vec![], false);
        dep_completed.complete(serde_json::Value::Null, Utc::now());
        let mut dep_skipped = task(2, 2, vec![], true);
        dep_skipped.skip(Utc::now());
        let tasks = vec![dep_completed, dep_skipped, task(3, 3, vec![1, 2], false)];

        let eligible = eligible_tasks(&tasks, Utc::now());
        assert_eq!(eligible.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_missing_dependency_id_blocks() {
        let tasks = vec![task(1, 1, vec![99], false)];
        assert!(eligible_tasks(&tasks, Utc::now()).is_empty());
    }

    #[test]
    fn test_eligible_order_is_sequence_not_insertion() {
        // 乱序插入，仍按声明序号返回
        let tasks = vec![task(5, 3, vec![], false), task(2, 1, vec![], false), task(9, 2, vec![], false)];
        let eligible = eligible_tasks(&tasks, Utc::now());
        assert_eq!(
            eligible.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![2, 9, 5]
        );
    }

    #[test]
    fn test_backoff_window_delays_eligibility() {
        let now = Utc::now();
        let mut delayed = task(1, 1, vec![], false);
        delayed.next_attempt_at = Some(now + chrono::Duration::seconds(60));
        let mut due = task(2, 2, vec![], false);
        due.next_attempt_at = Some(now - chrono::Duration::seconds(1));

        let tasks = vec![delayed, due];
        let eligible = eligible_tasks(&tasks, now);
        assert_eq!(eligible.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_stage_complete_ignores_optional_tasks() {
        let mut required = task(1, 1, vec![], false);
        required.complete(serde_json::Value::Null, Utc::now());
        let optional_incomplete = task(2, 2, vec![], true);

        assert!(is_stage_complete(&[required, optional_incomplete]));
    }

    #[test]
    fn test_failed_required_task_blocks_stage() {
        let mut failed = task(1, 1, vec![], false);
        failed.fail(TaskError::new(TaskErrorKind::Rejected, "build failed"), Utc::now());
        let mut done = task(2, 2, vec![], false);
        done.complete(serde_json::Value::Null, Utc::now());

        let tasks = vec![failed, done];
        assert!(!is_stage_complete(&tasks));
        assert_eq!(first_failed_required(&tasks).unwrap().id, 1);
    }

    #[test]
    fn test_failed_optional_task_does_not_block_stage() {
        let mut failed_optional = task(1, 1, vec![], true);
        failed_optional.fail(TaskError::new(TaskErrorKind::Transient, "network"), Utc::now());
        let mut done = task(2, 2, vec![], false);
        done.complete(serde_json::Value::Null, Utc::now());

        let tasks = vec![failed_optional, done];
        // 可选任务失败后 satisfies_dependency 为 false，但它不是必选任务
        assert!(is_stage_complete(&tasks));
        assert!(first_failed_required(&tasks).is_none());
    }

    #[test]
    fn test_empty_stage_is_complete() {
        assert!(is_stage_complete(&[]));
    }
}
