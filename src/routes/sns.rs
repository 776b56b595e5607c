use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use tracing::{debug, warn};

use crate::{
    dto::sns_dto::SnsMessageType,
    error::{Error, Result},
    AppState,
};

pub const SNS_MESSAGE_TYPE_HEADER: &str = "x-amz-sns-message-type";

#[utoipa::path(
    post,
    path = "/sns/events",
    params(
        ("x-amz-sns-message-type" = String, Header, description = "SubscriptionConfirmation, UnsubscribeConfirmation or Notification")
    ),
    responses(
        (status = 200, description = "Notification accepted"),
        (status = 400, description = "Missing header, bad payload or rejected notification")
    )
)]
#[axum::debug_handler]
pub async fn handle_sns_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let Some(raw) = headers.get(SNS_MESSAGE_TYPE_HEADER) else {
        return Err(Error::BadRequest(format!(
            "missing {} header",
            SNS_MESSAGE_TYPE_HEADER
        )));
    };
    let Some(kind) = raw.to_str().ok().and_then(SnsMessageType::from_header) else {
        debug!(message_type = ?raw, "ignoring unknown notification type");
        return Ok(StatusCode::OK);
    };

    let topics = &state.topic_service;
    let handled = match kind {
        SnsMessageType::SubscriptionConfirmation => topics.confirm_subscribe(&body).await,
        SnsMessageType::UnsubscribeConfirmation => topics.confirm_unsubscribe(&body).await,
        SnsMessageType::Notification => topics.process_notification(&body).await,
    };

    match handled {
        Ok(()) => Ok(StatusCode::OK),
        Err(err) => {
            warn!(message_type = ?kind, error = %err, "notification rejected");
            Ok(StatusCode::BAD_REQUEST)
        }
    }
}
