use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // Repository Metrics
    pub static ref REPOSITORY_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "repository_operations_total",
        "Total number of repository operations",
        &["operation", "entity", "status"]
    )
    .unwrap();

    pub static ref REPOSITORY_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "repository_operation_duration_seconds",
        "Repository operation duration in seconds",
        &["operation", "entity"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Content Metrics
    pub static ref MENU_MUTATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "menu_mutations_total",
        "Total number of menu tree mutations",
        &["operation"]
    )
    .unwrap();

    pub static ref MENU_ITEMS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "menu_items_total",
        "Total number of menu item mutations",
        &["operation"]
    )
    .unwrap();

    pub static ref QUIZ_QUESTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_questions_total",
        "Total number of quiz bank mutations",
        &["operation"]
    )
    .unwrap();

    // Session Metrics
    pub static ref QUIZ_SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_sessions_total",
        "Total number of quiz sessions by lifecycle event",
        &["status"]
    )
    .unwrap();

    pub static ref QUIZ_SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "quiz_sessions_active",
        "Number of quiz sessions currently in progress"
    )
    .unwrap();

    pub static ref QUIZ_ANSWERS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_answers_submitted_total",
        "Total number of answers recorded",
        &["outcome"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track repository operation with metrics
pub async fn track_repository_operation<F, T, E>(
    operation: &str,
    entity: &str,
    future: F,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    REPOSITORY_OPERATIONS_TOTAL
        .with_label_values(&[operation, entity, status])
        .inc();

    REPOSITORY_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, entity])
        .observe(duration);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = QUIZ_SESSIONS_TOTAL.with_label_values(&["started"]).get();
        let _ = QUIZ_SESSIONS_ACTIVE.get();
    }

    #[test]
    fn test_render_metrics() {
        MENU_MUTATIONS_TOTAL.with_label_values(&["create"]).inc();

        let output = render_metrics().unwrap();
        assert!(output.contains("menu_mutations_total"));
    }

    #[tokio::test]
    async fn test_track_repository_operation_counts_errors() {
        let before = REPOSITORY_OPERATIONS_TOTAL
            .with_label_values(&["probe", "test", "error"])
            .get();

        let result: Result<(), &str> =
            track_repository_operation("probe", "test", async { Err("boom") }).await;

        assert!(result.is_err());
        let after = REPOSITORY_OPERATIONS_TOTAL
            .with_label_values(&["probe", "test", "error"])
            .get();
        assert_eq!(after, before + 1);
    }
}
