//! OpenTelemetry export of tracing spans.
//!
//! Built only with the `otel` feature. Without it [`layer`] is a no-op and
//! `OTEL_ENABLED` only produces a warning.

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::error::RagError;

/// `service.name` attached to exported spans.
pub const SERVICE_NAME: &str = "conversational-rag";

#[cfg(feature = "otel")]
mod otlp {
    use opentelemetry::{global, KeyValue};
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;

    use super::SERVICE_NAME;
    use crate::error::RagError;

    /// Shuts the tracer provider down, flushing pending spans, on drop.
    #[derive(Debug)]
    pub struct TelemetryGuard {
        provider: SdkTracerProvider,
    }

    impl Drop for TelemetryGuard {
        fn drop(&mut self) {
            let _ = self.provider.shutdown();
        }
    }

    /// Install an OTLP tracer provider as the global provider.
    ///
    /// The exporter reads `OTEL_EXPORTER_OTLP_ENDPOINT` and friends.
    pub fn init() -> Result<TelemetryGuard, RagError> {
        let resource = Resource::builder_empty()
            .with_attributes([KeyValue::new("service.name", SERVICE_NAME)])
            .build();

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()
            .map_err(|e| RagError::Telemetry(e.to_string()))?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build();
        global::set_tracer_provider(provider.clone());

        Ok(TelemetryGuard { provider })
    }
}

/// Keeps span export alive until dropped.
#[cfg(feature = "otel")]
pub use otlp::TelemetryGuard;

/// Keeps span export alive until dropped.
#[cfg(not(feature = "otel"))]
#[derive(Debug)]
pub struct TelemetryGuard;

/// Start span export when `enabled`.
///
/// Must run before [`layer`], which reads the global tracer provider.
#[cfg(feature = "otel")]
pub fn init(enabled: bool) -> Result<Option<TelemetryGuard>, RagError> {
    if !enabled {
        return Ok(None);
    }
    otlp::init().map(Some)
}

/// Start span export when `enabled`.
#[cfg(not(feature = "otel"))]
pub fn init(enabled: bool) -> Result<Option<TelemetryGuard>, RagError> {
    if enabled {
        return Err(RagError::InvalidConfig(
            "OTEL_ENABLED requires a build with the `otel` feature".to_string(),
        ));
    }
    Ok(None)
}

/// Tracing layer forwarding spans to the global OpenTelemetry tracer.
#[cfg(feature = "otel")]
pub fn layer<S>(enabled: bool) -> Option<Box<dyn Layer<S> + Send + Sync + 'static>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    enabled.then(|| {
        let tracer = opentelemetry::global::tracer(SERVICE_NAME);
        tracing_opentelemetry::layer().with_tracer(tracer).boxed()
    })
}

/// Tracing layer forwarding spans to the global OpenTelemetry tracer.
#[cfg(not(feature = "otel"))]
pub fn layer<S>(_enabled: bool) -> Option<Box<dyn Layer<S> + Send + Sync + 'static>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::Registry;

    #[test]
    fn disabled_export_installs_nothing() {
        assert!(init(false).unwrap().is_none());
        assert!(layer::<Registry>(false).is_none());
    }

    #[cfg(not(feature = "otel"))]
    #[test]
    fn enabling_export_without_feature_is_a_config_error() {
        assert!(matches!(init(true), Err(RagError::InvalidConfig(_))));
        assert!(layer::<Registry>(true).is_none());
    }
}
