//! Prometheus metrics and tracing spans.
//!
//! Labels such as the statement tag are passed explicitly by callers; there is
//! no process-wide prefix state.

#[cfg(feature = "metrics")]
pub use prometheus_metrics::{TidemarkMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<TidemarkMetrics> = Lazy::new(TidemarkMetrics::init);

    pub struct TidemarkMetrics {
        registry: Registry,
        _provider: Option<SdkMeterProvider>,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub statements_total: Counter<u64>,
        pub migrations_applied_total: Counter<u64>,
        pub rows_copied_total: Counter<u64>,
    }

    impl TidemarkMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => Some(SdkMeterProvider::builder().with_reader(exporter).build()),
                Err(e) => {
                    log::warn!("prometheus exporter unavailable, metrics will not be exported: {e}");
                    None
                }
            };
            let meter = match &provider {
                Some(provider) => provider.meter("tidemark"),
                None => opentelemetry::global::meter("tidemark"),
            };

            let queries_total = meter
                .u64_counter("tidemark_queries_total")
                .with_description("Total queries executed")
                .build();
            let query_errors_total = meter
                .u64_counter("tidemark_query_errors_total")
                .with_description("Queries that returned a driver error")
                .build();
            let query_duration = meter
                .f64_histogram("tidemark_query_duration_seconds")
                .with_description("Duration of queries")
                .build();
            let statements_total = meter
                .u64_counter("tidemark_statements_total")
                .with_description("Synthesized statements executed, by kind and tag")
                .build();
            let migrations_applied_total = meter
                .u64_counter("tidemark_migrations_applied_total")
                .with_description("Migration steps applied")
                .build();
            let rows_copied_total = meter
                .u64_counter("tidemark_rows_copied_total")
                .with_description("Rows streamed through bulk import")
                .build();

            Self {
                registry,
                _provider: provider,
                queries_total,
                query_errors_total,
                query_duration,
                statements_total,
                migrations_applied_total,
                rows_copied_total,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_statement(&self, kind: &'static str, tag: Option<&str>) {
            let tag = tag.unwrap_or("untagged").to_string();
            self.statements_total
                .add(1, &[KeyValue::new("kind", kind), KeyValue::new("tag", tag)]);
        }

        pub fn record_migrations_applied(&self, count: u64) {
            self.migrations_applied_total.add(count, &[]);
        }

        pub fn record_rows_copied(&self, table: &str, rows: u64) {
            self.rows_copied_total
                .add(rows, &[KeyValue::new("table", table.to_string())]);
        }

        /// Render all collected metrics in the Prometheus text exposition format.
        pub fn render(&self) -> String {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("failed to encode metrics: {e}");
            }
            String::from_utf8(buffer).unwrap_or_default()
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn execute_query_span(query: &str) -> Span {
        let summary: String = query.chars().take(120).collect();
        info_span!("tidemark.query", db.statement = %summary)
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("tidemark.connect")
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("tidemark.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("tidemark.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("tidemark.transaction.rollback")
    }

    pub fn migration_span(step_count: usize) -> Span {
        info_span!("tidemark.migrate", steps = step_count)
    }

    pub fn copy_span(table: &str) -> Span {
        info_span!("tidemark.copy", table = %table)
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::METRICS;

    #[test]
    fn test_render_includes_recorded_counters() {
        METRICS.record_statement("select", Some("unit"));
        METRICS.record_query_duration(std::time::Duration::from_millis(2));
        let rendered = METRICS.render();
        assert!(rendered.contains("tidemark_statements_total"));
    }
}
