use argon2::Argon2;
use axum::{
	body::Body,
	extract::State,
	http::{Response, StatusCode},
	response::IntoResponse,
	routing::post,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{extract::Json, model, token, AppState};

pub const KEY_LENGTH: usize = 32;

pub fn routes() -> axum::Router<AppState> {
	axum::Router::new()
		.route("/signup", post(signup))
		.route("/login", post(login))
}

/// An error that can occur during authentication.
///
/// Note that the messages are presented to the client, so they should not contain
/// sensitive information.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid email or password")]
	InvalidEmailOrPassword,
	#[error("password validation error")]
	Argon(#[from] argon2::Error),
	#[error("No bearer token provided")]
	NoBearerToken,
	#[error("Invalid or expired token")]
	InvalidToken,
	#[error("Username is already taken")]
	UsernameTaken,
	#[error("Email is already registered")]
	EmailTaken,
}

impl Error {
	pub fn status(&self) -> StatusCode {
		match self {
			Self::InvalidEmailOrPassword | Self::NoBearerToken | Self::InvalidToken => {
				StatusCode::UNAUTHORIZED
			}
			Self::Argon(..) => StatusCode::INTERNAL_SERVER_ERROR,
			Self::UsernameTaken | Self::EmailTaken => StatusCode::CONFLICT,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response<Body> {
		crate::Error::from(self).into_response()
	}
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
	if username
		.chars()
		.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
	{
		Ok(())
	} else {
		let mut error = ValidationError::new("username");
		error.message =
			Some("Username can only contain letters, numbers, hyphens, and underscores".into());
		Err(error)
	}
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupInput {
	#[validate(
		length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"),
		custom(function = "validate_username")
	)]
	pub username: String,
	#[validate(email(message = "Please provide a valid email address"))]
	pub email: String,
	#[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
	pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginInput {
	#[validate(email(message = "Please provide a valid email address"))]
	pub email: String,
	#[validate(length(min = 1, message = "Password is required"))]
	pub password: String,
}

/// The user fields that are safe to hand to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBody {
	pub user_id: Uuid,
	pub email: String,
	pub username: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<model::User> for UserBody {
	fn from(user: model::User) -> Self {
		Self {
			user_id: user.id,
			email: user.email,
			username: user.username,
			created_at: user.created_at,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
	pub success: bool,
	pub message: &'static str,
	pub data: UserBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
	pub user: UserBody,
	pub token: String,
	pub expires_in: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
	pub success: bool,
	pub message: &'static str,
	pub data: LoginBody,
}

/// Hashes a password with Argon2, using the user's id as a salt.
/// Since this is only used for logging in and creating a new password,
/// the scope of this function can remain in here with no issues.
fn hash_password(
	hasher: &Argon2,
	password: &str,
	id: &Uuid,
) -> Result<[u8; KEY_LENGTH], argon2::Error> {
	let mut hash = [0; KEY_LENGTH];

	hasher.hash_password_into(password.as_bytes(), id.as_bytes(), &mut hash)?;
	Ok(hash)
}

/// Registers a new account. Username and email are stored case-folded;
/// duplicates of either are rejected by the store's unique constraints.
async fn signup(
	State(state): State<AppState>,
	Json(input): Json<SignupInput>,
) -> Result<impl IntoResponse, crate::Error> {
	let user_id = Uuid::new_v4();
	let hashed = hash_password(&state.hasher, &input.password, &user_id).map_err(Error::Argon)?;

	let user = sqlx::query_as::<_, model::User>(
		r#"
			INSERT INTO "user" (id, email, username, password) VALUES ($1, $2, $3, $4) RETURNING *
		"#,
	)
	.bind(user_id)
	.bind(input.email.to_lowercase())
	.bind(input.username.to_lowercase())
	.bind(&hashed[..])
	.fetch_one(&state.database)
	.await
	.map_err(|e| match e {
		sqlx::Error::Database(ref d) => match d.constraint() {
			Some("user_email_key") => Error::EmailTaken.into(),
			Some("user_username_key") => Error::UsernameTaken.into(),
			_ => crate::Error::Database(e),
		},
		e => crate::Error::Database(e),
	})?;

	tracing::info!(user_id = %user.id, "user registered");

	Ok((
		StatusCode::CREATED,
		Json(SignupResponse {
			success: true,
			message: "User registered successfully",
			data: user.into(),
		}),
	))
}

/// Returns a bearer token, assuming the credentials are valid. Unknown
/// emails and wrong passwords are indistinguishable to the client.
async fn login(
	State(state): State<AppState>,
	Json(input): Json<LoginInput>,
) -> Result<impl IntoResponse, crate::Error> {
	let user = sqlx::query_as::<_, model::User>(r#"SELECT * FROM "user" WHERE email = $1"#)
		.bind(input.email.to_lowercase())
		.fetch_optional(&state.database)
		.await?;

	let Some(user) = user else {
		return Err(Error::InvalidEmailOrPassword.into());
	};

	let hashed = hash_password(&state.hasher, &input.password, &user.id).map_err(Error::Argon)?;

	if user.password != hashed {
		return Err(Error::InvalidEmailOrPassword.into());
	}

	let token = state.keys.sign(user.id)?;

	tracing::info!(user_id = %user.id, "user logged in");

	Ok(Json(LoginResponse {
		success: true,
		message: "Login successful",
		data: LoginBody {
			user: user.into(),
			token,
			expires_in: token::EXPIRES_IN,
		},
	}))
}

#[cfg(test)]
mod test {
	use crate::test::*;

	#[tokio::test]
	async fn test_signup_rejects_bad_username() {
		let server = server();

		let response = server
			.post("/auth/signup")
			.json(&json!({
				"username": "a b!",
				"email": "john@smith.com",
				"password": "hunter2hunter",
			}))
			.await;

		assert_eq!(response.status_code(), 400);

		let body = response.json::<serde_json::Value>();

		assert_eq!(body["success"], false);
		assert_eq!(body["message"], "Validation Error");
		assert_eq!(body["errorMessages"][0]["path"], "username");
	}

	#[tokio::test]
	async fn test_signup_rejects_short_password() {
		let server = server();

		let response = server
			.post("/auth/signup")
			.json(&json!({
				"username": "john",
				"email": "john@smith.com",
				"password": "short",
			}))
			.await;

		assert_eq!(response.status_code(), 400);
		assert_eq!(response.json::<serde_json::Value>()["success"], false);
	}

	#[tokio::test]
	async fn test_login_rejects_missing_field() {
		let server = server();

		let response = server
			.post("/auth/login")
			.json(&json!({ "email": "john@smith.com" }))
			.await;

		assert_eq!(response.status_code(), 400);
		assert_eq!(response.json::<serde_json::Value>()["success"], false);
	}
}
