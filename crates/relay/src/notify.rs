use serde_json::json;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::framer::RawRequest;
use crate::manager::NotificationManager;
use crate::payload::decode_request;
use crate::response::Response;
use crate::token::AuthToken;

/// `POST /notify`: authenticate, decode, present.
#[derive(Clone)]
pub struct NotifyHandler {
    token: AuthToken,
    manager: NotificationManager,
}

impl NotifyHandler {
    pub fn new(token: AuthToken, manager: NotificationManager) -> Self {
        Self { token, manager }
    }

    pub fn manager(&self) -> &NotificationManager {
        &self.manager
    }

    pub async fn handle(&self, request: &RawRequest) -> Response {
        match self.try_handle(request).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }

    async fn try_handle(&self, request: &RawRequest) -> Result<Response, RelayError> {
        self.authorize(request)?;

        let payload = decode_request(&request.body).map_err(|source| {
            debug!("rejecting notification payload: {}", source);
            RelayError::decode(source, &request.body)
        })?;

        let notification_id = self.manager.show_notification(payload).await?;
        debug!(%notification_id, "notification accepted");

        Ok(Response::json(
            200,
            &json!({ "status": "OK", "message": "Notification sent" }),
        ))
    }

    fn authorize(&self, request: &RawRequest) -> Result<(), RelayError> {
        match request.header("authorization") {
            Some(value) if self.token.matches_bearer(value) => Ok(()),
            Some(_) => {
                warn!(path = %request.path, "rejected request with invalid bearer token");
                Err(RelayError::Unauthorized)
            }
            None => {
                warn!(path = %request.path, "rejected request without authorization header");
                Err(RelayError::Unauthorized)
            }
        }
    }
}
