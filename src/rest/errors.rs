use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{catalog::CatalogError, common::errors::ApiError, player::PlayerError};

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

pub fn player_error(err: &PlayerError, path: &str) -> ApiError {
    match err {
        PlayerError::TransportUnavailable(_) => ApiError::bad_request(err.to_string(), path),
        PlayerError::LaunchFailure { .. } => ApiError::bad_gateway(err.to_string(), path),
        PlayerError::ConcurrentStateConflict(_)
        | PlayerError::NotConnected
        | PlayerError::NothingPlaying
        | PlayerError::NothingQueued
        | PlayerError::AlreadyPlaying => ApiError::conflict(err.to_string(), path),
    }
}

pub fn catalog_error(err: &CatalogError, path: &str) -> ApiError {
    match err {
        CatalogError::NotFound(_) => ApiError::not_found(err.to_string(), path),
        CatalogError::Http(_) | CatalogError::Status { .. } => {
            ApiError::bad_gateway(err.to_string(), path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::RoomId;

    #[test]
    fn player_errors_map_to_statuses() {
        let path = "/v1/rooms/r/skip";
        assert_eq!(player_error(&PlayerError::not_in_room(), path).status, 400);
        assert_eq!(player_error(&PlayerError::NothingPlaying, path).status, 409);
        assert_eq!(
            player_error(&PlayerError::ConcurrentStateConflict(RoomId::from("r")), path).status,
            409
        );
    }

    #[test]
    fn error_body_carries_message_and_path() {
        let err = catalog_error(&CatalogError::NotFound("abba".into()), "/v1/search");
        assert_eq!(err.status, 404);
        assert_eq!(err.error, "Not Found");
        assert_eq!(err.path, "/v1/search");
        assert!(err.message.contains("abba"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
