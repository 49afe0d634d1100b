use std::sync::Arc;

use axum::{body::Bytes, http::HeaderMap, response::IntoResponse, Extension, Json};

use crate::{
    dtos::webhookdtos::WebhookResponseDto,
    error::{ErrorMessage, HttpError},
    service::{payment_pipeline::PipelineOutcome, webhook_verifier::SIGNATURE_HEADER},
    AppState,
};

/// Payment processor notification endpoint.
///
/// The body is taken as raw bytes: the signature covers exactly what was
/// sent, so it must be checked before any JSON parsing.
pub async fn coinbase_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Webhook received without {} header", SIGNATURE_HEADER);
            HttpError::bad_request(ErrorMessage::InvalidSignature.to_string())
        })?;

    let event = app_state
        .webhook_verifier
        .verify(&body, signature)
        .map_err(|e| {
            tracing::warn!("Rejected webhook: {}", e);
            HttpError::from(e)
        })?;

    match app_state.pipeline.process(&event).await {
        Ok(PipelineOutcome::Processed(summary)) => {
            tracing::info!("Webhook {} processed: {}", summary.event_id, summary.message);
        }
        Ok(PipelineOutcome::Duplicate { event_id }) => {
            tracing::info!("Webhook {} was a duplicate delivery", event_id);
        }
        Ok(PipelineOutcome::Ignored { event_type }) => {
            tracing::debug!("Webhook event type {} ignored", event_type);
        }
        Err(e) if e.is_acknowledged() => {
            tracing::warn!("Acknowledging webhook {} without changes: {}", event.id, e);
        }
        Err(e) => {
            tracing::error!("Webhook {} failed, processor will retry: {}", event.id, e);
            return Err(HttpError::from(e));
        }
    }

    Ok(Json(WebhookResponseDto::new("success")))
}
