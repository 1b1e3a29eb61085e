use axum::{
	body::Body,
	extract::{FromRef, FromRequest, FromRequestParts, Request},
	http::{header, request, Response},
	response::IntoResponse,
};
use serde::de;

use crate::{error::Error, model, route::auth::Error as AuthError, token, Database};

/// Extractor that deserializes a JSON body and validates it.
pub struct Json<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
	T: de::DeserializeOwned + validator::Validate,
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		let result = axum::extract::Json::<T>::from_request(req, state).await?.0;

		result.validate().map_err(Error::Validation)?;
		Ok(Self(result))
	}
}

impl<T> IntoResponse for Json<T>
where
	T: serde::Serialize,
{
	fn into_response(self) -> Response<Body> {
		axum::extract::Json(self.0).into_response()
	}
}

/// Extractor that deserializes a query string and validates it.
pub struct Query<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for Query<T>
where
	T: de::DeserializeOwned + validator::Validate,
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(
		parts: &mut request::Parts,
		state: &S,
	) -> Result<Self, Self::Rejection> {
		let result = axum::extract::Query::<T>::from_request_parts(parts, state)
			.await?
			.0;

		result.validate().map_err(Error::Validation)?;
		Ok(Self(result))
	}
}

/// Extracts the bearer token from the request and resolves the user it
/// was issued for.
///
/// If no `Authorization: Bearer <token>` header is present, a
/// [`AuthError::NoBearerToken`] is returned. If the token fails to
/// verify or its user no longer exists, a [`AuthError::InvalidToken`]
/// is returned.
#[derive(Debug)]
pub struct Auth {
	pub user: model::User,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Auth
where
	Database: FromRef<S>,
	token::Keys: FromRef<S>,
	S: Sync + Send,
{
	type Rejection = Error;

	async fn from_request_parts(
		parts: &mut request::Parts,
		state: &S,
	) -> Result<Self, Self::Rejection> {
		let bearer = parts
			.headers
			.get(header::AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix("Bearer "))
			.ok_or(AuthError::NoBearerToken)?;

		let keys = token::Keys::from_ref(state);
		let user_id = keys.verify(bearer).map_err(|_| AuthError::InvalidToken)?;

		let database = Database::from_ref(state);
		let user = sqlx::query_as::<_, model::User>(r#"SELECT * FROM "user" WHERE id = $1"#)
			.bind(user_id)
			.fetch_optional(&database)
			.await?;

		// A valid token for a user that has since disappeared is as good
		// as no token at all.
		let Some(user) = user else {
			return Err(AuthError::InvalidToken.into());
		};

		Ok(Self { user })
	}
}
