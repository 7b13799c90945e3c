use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observability (OpenTelemetry) configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// OpenTelemetry observability configuration.
///
/// When `otlp_endpoint` is `None` (the default), no OTel exporter is
/// started and logging stays structured JSON only. Setting it enables
/// OTLP/gRPC trace export so every `tracing` span is also forwarded to a
/// collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// OTLP gRPC endpoint (e.g. `http://localhost:4317`).
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// The `service.name` resource attribute reported to the collector.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Trace sampling rate (`0.0` = never, `1.0` = always).
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

fn d_service_name() -> String {
    "homebase".into()
}

fn d_sample_rate() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ObservabilityConfig = toml::from_str("").unwrap();
        assert!(cfg.otlp_endpoint.is_none());
        assert_eq!(cfg.service_name, "homebase");
        assert!((cfg.sample_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialize_with_endpoint() {
        let cfg: ObservabilityConfig = toml::from_str(
            r#"
            otlp_endpoint = "http://localhost:4317"
            sample_rate = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.otlp_endpoint.as_deref(), Some("http://localhost:4317"));
        assert!((cfg.sample_rate - 0.5).abs() < f64::EPSILON);
    }
}
