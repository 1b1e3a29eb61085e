use uuid::Uuid;

/// A model representing a single user.
///
/// Fetched from the database when authenticating a request. The push
/// token is looked up separately by the notifier, and the password hash
/// never leaves the server; routes that return user data build their
/// own response bodies instead of serializing this.
#[derive(Debug, sqlx::FromRow)]
pub struct User {
	pub id: Uuid,
	pub email: String,
	/// argon2, salted with `id`
	pub password: Vec<u8>,
	pub username: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A model representing a single post. Immutable after creation.
#[derive(Debug, sqlx::FromRow)]
pub struct Post {
	pub id: Uuid,
	pub user_id: Uuid,
	pub content: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One page-worth row of the feed: a post joined with its author's
/// username. Like/comment counts are aggregated separately.
#[derive(Debug, sqlx::FromRow)]
pub struct FeedPost {
	pub id: Uuid,
	pub content: String,
	pub author: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
}
