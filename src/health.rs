use crate::error::RelayError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "call-relay-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "relay": {
            "active_connections": metrics.active_connections,
            "sessions": state.registry.session_count(),
            "sessions_processing": state.registry.processing_count(),
            "display_language": config.relay.display_language
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "chunks_processed": metrics.chunks_processed,
            "upstream_errors": metrics.upstream_errors
        }
    }))
}

/// Diagnostic snapshot of one call session.
pub async fn call_status(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, RelayError> {
    let call_id = path.into_inner();
    let session = state
        .registry
        .get(&call_id)
        .ok_or_else(|| RelayError::Validation("Unknown callId".to_string()))?;

    Ok(HttpResponse::Ok().json(json!({
        "callId": session.call_id(),
        "hasCaller": session.has_caller(),
        "operators": session.operator_count(),
        "detectedLanguage": session.detected_language(),
        "processing": session.is_processing(),
        "createdAt": session.created_at().to_rfc3339(),
        "lastUpdated": session.last_updated().to_rfc3339()
    })))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "http": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "endpoints": endpoint_stats
        },
        "relay": {
            "active_connections": metrics.active_connections,
            "sessions": state.registry.session_count(),
            "sessions_processing": state.registry.processing_count(),
            "chunks_processed": metrics.chunks_processed,
            "chunks_dropped": metrics.chunks_dropped,
            "spam_rejected": metrics.spam_rejected,
            "upstream_errors": metrics.upstream_errors,
            "validation_errors": metrics.validation_errors,
            "replies_delivered": metrics.replies_delivered
        }
    }))
}
