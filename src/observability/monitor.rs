use super::MetricsCollector;

pub struct PipelineMonitor {
    collector: MetricsCollector,
}

impl PipelineMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.collector.snapshot();

        if snapshot.is_empty() {
            return "No nodes registered".to_string();
        }

        let mut report = String::from("=== Graph Metrics ===\n");

        for (name, metrics) in snapshot.iter() {
            report.push_str(&format!(
                "\n[{}]\n  Steps: {} steps completed\n  Errors: {}\n  Avg Latency: {}μs\n",
                name,
                metrics.steps_completed,
                plural(metrics.errors_count, "error"),
                metrics.avg_latency_us
            ));
            if metrics.previews_dropped > 0 {
                report.push_str(&format!(
                    "  Previews: {} dropped\n",
                    metrics.previews_dropped
                ));
            }
        }

        report
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}

fn plural(count: u64, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
