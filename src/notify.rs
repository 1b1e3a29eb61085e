use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Database;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// What a like or comment looks like to the push provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
	Like,
	Comment,
}

impl Kind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Like => "like",
			Self::Comment => "comment",
		}
	}
}

/// A pending push notification for a post's author.
#[derive(Debug, Clone)]
pub struct Notification {
	pub kind: Kind,
	pub post_id: Uuid,
	pub sender_username: String,
}

impl Notification {
	pub fn title(&self) -> String {
		match self.kind {
			Kind::Like => format!("{} liked your post", self.sender_username),
			Kind::Comment => format!("{} commented on your post", self.sender_username),
		}
	}

	pub fn body(&self) -> &'static str {
		match self.kind {
			Kind::Like => "Tap to view your post",
			Kind::Comment => "Tap to read the comment",
		}
	}

	/// The data payload delivered alongside the notification. FCM only
	/// accepts string values here.
	pub fn data(&self) -> serde_json::Value {
		serde_json::json!({
			"type": self.kind.as_str(),
			"postId": self.post_id.to_string(),
			"senderUsername": self.sender_username,
		})
	}
}

/// Best-effort push notification handle.
///
/// Dispatching never blocks the request that triggered it and never
/// surfaces an error: delivery runs on a detached task and failures are
/// logged and dropped. When no FCM credentials are configured every
/// dispatch is a silent no-op.
#[derive(Clone)]
pub struct Notifier {
	client: Option<Arc<FcmClient>>,
}

impl Notifier {
	pub fn disabled() -> Self {
		Self { client: None }
	}

	/// Builds the notifier from `FCM_PROJECT_ID` and
	/// `FCM_SERVICE_ACCOUNT_PATH`. Missing or unreadable configuration
	/// disables push delivery rather than failing startup.
	pub fn from_env() -> Self {
		let (Ok(project_id), Ok(path)) = (
			std::env::var("FCM_PROJECT_ID"),
			std::env::var("FCM_SERVICE_ACCOUNT_PATH"),
		) else {
			tracing::warn!("FCM not configured, push notifications disabled");
			return Self::disabled();
		};

		match FcmClient::from_file(project_id, &path) {
			Ok(client) => Self {
				client: Some(Arc::new(client)),
			},
			Err(error) => {
				tracing::error!(%error, "failed to load FCM service account, push notifications disabled");
				Self::disabled()
			}
		}
	}

	/// Fires off a notification to `recipient` without waiting for the
	/// outcome.
	pub fn dispatch(&self, database: Database, recipient: Uuid, notification: Notification) {
		let Some(client) = self.client.clone() else {
			tracing::debug!("FCM not configured, skipping notification");
			return;
		};

		tokio::spawn(async move {
			if let Err(error) = deliver(&client, &database, recipient, &notification).await {
				tracing::warn!(%error, %recipient, "push notification dropped");
			}
		});
	}
}

async fn deliver(
	client: &FcmClient,
	database: &Database,
	recipient: Uuid,
	notification: &Notification,
) -> Result<(), FcmError> {
	let fcm_token =
		sqlx::query_scalar::<_, Option<String>>(r#"SELECT fcm_token FROM "user" WHERE id = $1"#)
			.bind(recipient)
			.fetch_optional(database)
			.await?
			.flatten();

	let Some(fcm_token) = fcm_token else {
		tracing::debug!(%recipient, "no FCM token for user, skipping notification");
		return Ok(());
	};

	client
		.send(
			&fcm_token,
			&notification.title(),
			notification.body(),
			notification.data(),
		)
		.await?;

	tracing::info!(%recipient, kind = notification.kind.as_str(), "push notification sent");
	Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum FcmError {
	#[error("service account error: {0}")]
	ServiceAccount(#[from] std::io::Error),
	#[error("service account parse error: {0}")]
	Parse(#[from] serde_json::Error),
	#[error("assertion error: {0}")]
	Assertion(#[from] jsonwebtoken::errors::Error),
	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),
	#[error("token lookup error: {0}")]
	Database(#[from] sqlx::Error),
	#[error("FCM API error: {status} - {body}")]
	Api {
		status: reqwest::StatusCode,
		body: String,
	},
}

fn default_token_uri() -> String {
	"https://oauth2.googleapis.com/token".into()
}

/// The subset of a Google service-account key file needed to mint
/// OAuth2 access tokens.
#[derive(Debug, Deserialize)]
struct ServiceAccount {
	client_email: String,
	private_key: String,
	#[serde(default = "default_token_uri")]
	token_uri: String,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
	iss: &'a str,
	scope: &'a str,
	aud: &'a str,
	iat: i64,
	exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
	expires_in: i64,
}

struct CachedToken {
	token: String,
	expires_at: DateTime<Utc>,
}

/// Firebase Cloud Messaging HTTP v1 client.
///
/// Exchanges a signed service-account assertion for an OAuth2 access
/// token, caches it until shortly before expiry, and posts messages to
/// single device tokens.
pub struct FcmClient {
	project_id: String,
	credentials: ServiceAccount,
	token_cache: tokio::sync::Mutex<Option<CachedToken>>,
	http: reqwest::Client,
}

impl FcmClient {
	fn from_file(project_id: String, path: &str) -> Result<Self, FcmError> {
		let credentials = serde_json::from_str(&std::fs::read_to_string(path)?)?;

		Ok(Self {
			project_id,
			credentials,
			token_cache: tokio::sync::Mutex::new(None),
			http: reqwest::Client::new(),
		})
	}

	/// Returns a cached access token, minting a fresh one when the cache
	/// is empty or within a minute of expiry.
	async fn access_token(&self) -> Result<String, FcmError> {
		let mut cache = self.token_cache.lock().await;

		if let Some(cached) = cache.as_ref() {
			if cached.expires_at > Utc::now() + Duration::seconds(60) {
				return Ok(cached.token.clone());
			}
		}

		let iat = Utc::now();
		let claims = AssertionClaims {
			iss: &self.credentials.client_email,
			scope: FCM_SCOPE,
			aud: &self.credentials.token_uri,
			iat: iat.timestamp(),
			exp: (iat + Duration::hours(1)).timestamp(),
		};

		let assertion = encode(
			&Header::new(Algorithm::RS256),
			&claims,
			&EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())?,
		)?;

		let response: TokenResponse = self
			.http
			.post(&self.credentials.token_uri)
			.form(&[
				("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
				("assertion", &assertion),
			])
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		let token = response.access_token.clone();

		*cache = Some(CachedToken {
			token: response.access_token,
			expires_at: Utc::now() + Duration::seconds(response.expires_in),
		});

		Ok(token)
	}

	/// Sends one notification to a single device token.
	async fn send(
		&self,
		device_token: &str,
		title: &str,
		body: &str,
		data: serde_json::Value,
	) -> Result<(), FcmError> {
		let access_token = self.access_token().await?;

		let url = format!(
			"https://fcm.googleapis.com/v1/projects/{}/messages:send",
			self.project_id
		);

		let response = self
			.http
			.post(&url)
			.bearer_auth(access_token)
			.json(&serde_json::json!({
				"message": {
					"token": device_token,
					"notification": { "title": title, "body": body },
					"data": data,
				}
			}))
			.send()
			.await?;

		let status = response.status();

		if status.is_success() {
			Ok(())
		} else {
			Err(FcmError::Api {
				status,
				body: response.text().await.unwrap_or_default(),
			})
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn notification(kind: Kind) -> Notification {
		Notification {
			kind,
			post_id: Uuid::nil(),
			sender_username: "alice".into(),
		}
	}

	#[test]
	fn test_like_message() {
		let notification = notification(Kind::Like);

		assert_eq!(notification.title(), "alice liked your post");
		assert_eq!(notification.body(), "Tap to view your post");
	}

	#[test]
	fn test_comment_message() {
		let notification = notification(Kind::Comment);

		assert_eq!(notification.title(), "alice commented on your post");
		assert_eq!(notification.body(), "Tap to read the comment");
	}

	#[test]
	fn test_data_payload_is_all_strings() {
		let data = notification(Kind::Comment).data();
		let map = data.as_object().unwrap();

		assert_eq!(map["type"], "comment");
		assert_eq!(map["postId"], Uuid::nil().to_string());
		assert!(map.values().all(serde_json::Value::is_string));
	}
}
