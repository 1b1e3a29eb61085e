use axum::{
	body::Body,
	extract::rejection,
	http::{Response, StatusCode},
	response::IntoResponse,
	Json,
};
use serde::Serialize;

use crate::route;

/// Error type for the application.
///
/// The Display trait is not sent to the client, so it can show
/// sensitive information.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("validation error: {0}")]
	Validation(#[from] validator::ValidationErrors),
	#[error("json error: {0}")]
	Json(#[from] rejection::JsonRejection),
	#[error("query error: {0}")]
	Query(#[from] rejection::QueryRejection),
	#[error("auth error: {0}")]
	Auth(#[from] route::auth::Error),
	#[error("user error: {0}")]
	User(#[from] route::users::Error),
	#[error("post error: {0}")]
	Post(#[from] route::posts::Error),
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
	#[error("token error: {0}")]
	Token(#[from] jsonwebtoken::errors::Error),
}

/// The body every failed request responds with.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
	pub success: bool,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_messages: Option<Vec<ErrorMessage>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
	pub path: String,
	pub message: String,
}

fn respond(
	status: StatusCode,
	message: impl Into<String>,
	error_messages: Option<Vec<ErrorMessage>>,
) -> Response<Body> {
	(
		status,
		Json(ErrorResponse {
			success: false,
			message: message.into(),
			error_messages,
		}),
	)
		.into_response()
}

impl IntoResponse for Error {
	fn into_response(self) -> Response<Body> {
		match self {
			Error::Validation(errors) => respond(
				StatusCode::BAD_REQUEST,
				"Validation Error",
				Some(
					errors
						.field_errors()
						.into_iter()
						.flat_map(|(field, errors)| {
							errors.iter().map(move |error| ErrorMessage {
								path: field.to_string(),
								message: error.to_string(),
							})
						})
						.collect(),
				),
			),
			Error::Json(error) => respond(StatusCode::BAD_REQUEST, error.body_text(), None),
			Error::Query(error) => respond(StatusCode::BAD_REQUEST, error.body_text(), None),
			Error::Auth(error) => respond(error.status(), error.to_string(), None),
			Error::User(error) => respond(error.status(), error.to_string(), None),
			Error::Post(error) => respond(error.status(), error.to_string(), None),
			// Never leak store or token internals to the client.
			Error::Database(..) | Error::Token(..) => respond(
				StatusCode::INTERNAL_SERVER_ERROR,
				"Something went wrong!",
				None,
			),
		}
	}
}
