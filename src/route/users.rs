use axum::{
	body::Body,
	extract::State,
	http::{Response, StatusCode},
	response::IntoResponse,
	routing::put,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
	extract::{Auth, Json},
	AppState, Database,
};

pub fn routes() -> axum::Router<AppState> {
	axum::Router::new().route("/fcm-token", put(update_fcm_token))
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("User not found")]
	UnknownUser,
}

impl Error {
	pub fn status(&self) -> StatusCode {
		match self {
			Self::UnknownUser => StatusCode::NOT_FOUND,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response<Body> {
		crate::Error::from(self).into_response()
	}
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FcmTokenInput {
	#[validate(length(min = 1, message = "FCM token is required"))]
	pub fcm_token: String,
}

#[derive(Debug, Serialize)]
pub struct FcmTokenResponse {
	pub success: bool,
	pub message: &'static str,
}

/// Stores or replaces the device push token for the authenticated user.
async fn update_fcm_token(
	State(database): State<Database>,
	auth: Auth,
	Json(input): Json<FcmTokenInput>,
) -> Result<impl IntoResponse, crate::Error> {
	let updated = sqlx::query(r#"UPDATE "user" SET fcm_token = $1 WHERE id = $2"#)
		.bind(&input.fcm_token)
		.bind(auth.user.id)
		.execute(&database)
		.await?;

	if updated.rows_affected() == 0 {
		return Err(Error::UnknownUser.into());
	}

	tracing::info!(user_id = %auth.user.id, "FCM token updated");

	Ok(Json(FcmTokenResponse {
		success: true,
		message: "FCM token updated successfully",
	}))
}

#[cfg(test)]
mod test {
	use crate::test::*;

	#[tokio::test]
	async fn test_requires_bearer_token() {
		let server = server();

		let response = server
			.put("/users/fcm-token")
			.json(&json!({ "fcmToken": "device-token" }))
			.await;

		assert_eq!(response.status_code(), 401);

		let body = response.json::<serde_json::Value>();

		assert_eq!(body["success"], false);
		assert_eq!(body["message"], "No bearer token provided");
	}

	#[tokio::test]
	async fn test_rejects_invalid_bearer_token() {
		let server = server();

		let response = server
			.put("/users/fcm-token")
			.authorization_bearer("not-a-token")
			.json(&json!({ "fcmToken": "device-token" }))
			.await;

		assert_eq!(response.status_code(), 401);
		assert_eq!(
			response.json::<serde_json::Value>()["message"],
			"Invalid or expired token"
		);
	}
}
