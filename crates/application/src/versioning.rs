//! 版本推导
//!
//! 纯函数：根据发布类型升级版本号，以及为新排期的发布解析目标版本。

use orchestrator_domain::{ReleaseType, SemanticVersion};

/// 按发布类型升级版本号（预发布/构建元数据已在解析时剥离）
pub fn bump_version(version: SemanticVersion, release_type: ReleaseType) -> SemanticVersion {
    version.bump(release_type)
}

/// 为下一个排期发布解析版本号。
///
/// 没有历史版本时直接使用配置的初始版本；否则取
/// `max(配置初始版本, bump(最近版本))`，保证即使配置滞后于线上
/// 实际版本，版本号也单调递增。
pub fn resolve_version_for_first_scheduled_release(
    initial_version: SemanticVersion,
    latest_version: Option<SemanticVersion>,
    release_type: ReleaseType,
) -> SemanticVersion {
    match latest_version {
        None => initial_version,
        Some(latest) => initial_version.max(bump_version(latest, release_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::parse(s).unwrap()
    }

    #[test]
    fn test_bump_version_arithmetic() {
        assert_eq!(bump_version(v("1.2.3"), ReleaseType::Major), v("2.0.0"));
        assert_eq!(bump_version(v("1.2.3"), ReleaseType::Minor), v("1.3.0"));
        assert_eq!(bump_version(v("1.2.3"), ReleaseType::Hotfix), v("1.2.4"));
    }

    #[test]
    fn test_resolve_without_history_returns_initial() {
        assert_eq!(
            resolve_version_for_first_scheduled_release(v("1.0.0"), None, ReleaseType::Minor),
            v("1.0.0")
        );
        assert_eq!(
            resolve_version_for_first_scheduled_release(v("3.7.2"), None, ReleaseType::Major),
            v("3.7.2")
        );
    }

    #[test]
    fn test_resolve_bumped_previous_exceeds_initial() {
        assert_eq!(
            resolve_version_for_first_scheduled_release(
                v("1.0.0"),
                Some(v("1.2.0")),
                ReleaseType::Minor
            ),
            v("1.3.0")
        );
    }

    #[test]
    fn test_resolve_initial_exceeds_bumped_previous() {
        assert_eq!(
            resolve_version_for_first_scheduled_release(
                v("2.0.0"),
                Some(v("1.2.0")),
                ReleaseType::Minor
            ),
            v("2.0.0")
        );
    }

    #[test]
    fn test_resolve_is_monotonic_across_types() {
        // hotfix链条也不会倒退
        assert_eq!(
            resolve_version_for_first_scheduled_release(
                v("1.0.0"),
                Some(v("2.5.1")),
                ReleaseType::Hotfix
            ),
            v("2.5.2")
        );
    }
}
