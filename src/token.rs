use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access tokens are valid for a fixed seven days; there is no refresh
/// flow, clients simply log in again.
pub const TOKEN_LIFETIME_DAYS: i64 = 7;

pub const EXPIRES_IN: &str = "7d";

/// Claims carried by an access token. The payload holds nothing but the
/// user id and the timestamps.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
	pub sub: Uuid,
	pub iat: i64,
	pub exp: i64,
}

/// HS256 signing and verification keys, derived once from `JWT_SECRET`
/// and shared through the application state.
#[derive(Clone)]
pub struct Keys {
	encoding: EncodingKey,
	decoding: DecodingKey,
}

impl Keys {
	pub fn new(secret: &[u8]) -> Self {
		Self {
			encoding: EncodingKey::from_secret(secret),
			decoding: DecodingKey::from_secret(secret),
		}
	}

	/// Issues a token for the given user.
	pub fn sign(&self, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
		let iat = Utc::now();
		let claims = Claims {
			sub: user_id,
			iat: iat.timestamp(),
			exp: (iat + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
		};

		encode(&Header::default(), &claims, &self.encoding)
	}

	/// Verifies a token's signature and expiry, returning the user id it
	/// was issued for.
	pub fn verify(&self, token: &str) -> Result<Uuid, jsonwebtoken::errors::Error> {
		let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;

		Ok(data.claims.sub)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_roundtrip() {
		let keys = Keys::new(b"test-secret");
		let user_id = Uuid::new_v4();

		let token = keys.sign(user_id).unwrap();

		assert_eq!(keys.verify(&token).unwrap(), user_id);
	}

	#[test]
	fn test_lifetime_is_seven_days() {
		let keys = Keys::new(b"test-secret");
		let token = keys.sign(Uuid::new_v4()).unwrap();

		let data = decode::<Claims>(
			&token,
			&DecodingKey::from_secret(b"test-secret"),
			&Validation::default(),
		)
		.unwrap();

		assert_eq!(
			data.claims.exp - data.claims.iat,
			Duration::days(TOKEN_LIFETIME_DAYS).num_seconds()
		);
	}

	#[test]
	fn test_rejects_foreign_signature() {
		let keys = Keys::new(b"test-secret");
		let other = Keys::new(b"other-secret");

		let token = other.sign(Uuid::new_v4()).unwrap();

		assert!(keys.verify(&token).is_err());
	}

	#[test]
	fn test_rejects_garbage() {
		let keys = Keys::new(b"test-secret");

		assert!(keys.verify("not-a-token").is_err());
	}
}
