//! 存活探针：不触达存储，只报告进程自身信息

use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthView {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub async fn health_check() -> Json<HealthView> {
    Json(HealthView {
        status: "ok",
        service: "release-orchestrator",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_payload() {
        let Json(view) = health_check().await;
        assert_eq!(view.status, "ok");
        assert_eq!(view.service, "release-orchestrator");
        assert!(!view.version.is_empty());
    }
}
