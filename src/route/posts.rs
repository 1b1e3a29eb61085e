use std::collections::{HashMap, HashSet};

use axum::{
	body::Body,
	extract::{Path, State},
	http::{Response, StatusCode},
	response::IntoResponse,
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
	extract::{Auth, Json, Query},
	model, notify, AppState, Database,
};

use super::model::Paginate;

pub fn routes() -> axum::Router<AppState> {
	axum::Router::new()
		.route("/", get(get_posts).post(create_post))
		.route("/:id/like", post(toggle_like))
		.route("/:id/comment", post(add_comment))
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Post not found")]
	UnknownPost,
}

impl Error {
	pub fn status(&self) -> StatusCode {
		match self {
			Self::UnknownPost => StatusCode::NOT_FOUND,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response<Body> {
		crate::Error::from(self).into_response()
	}
}

fn trimmed_length(content: &str, max: usize, what: &'static str) -> Result<(), ValidationError> {
	let trimmed = content.trim();

	if trimmed.is_empty() {
		let mut error = ValidationError::new("length");
		error.message = Some(format!("{what} cannot be empty").into());
		return Err(error);
	}

	if trimmed.chars().count() > max {
		let mut error = ValidationError::new("length");
		error.message = Some(format!("{what} must not exceed {max} characters").into());
		return Err(error);
	}

	Ok(())
}

fn validate_post_content(content: &str) -> Result<(), ValidationError> {
	trimmed_length(content, 500, "Content")
}

fn validate_comment_content(content: &str) -> Result<(), ValidationError> {
	trimmed_length(content, 300, "Comment")
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostInput {
	#[validate(custom(function = "validate_post_content"))]
	pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentInput {
	#[validate(custom(function = "validate_comment_content"))]
	pub content: String,
}

/// These can be removed when [`serde`] supports
/// literal defaults: <https://github.com/serde-rs/serde/issues/368>
fn one() -> i64 {
	1
}

fn ten() -> i64 {
	10
}

#[derive(Debug, Deserialize, Validate)]
pub struct FeedQuery {
	#[validate(range(min = 1, message = "Page must be a positive integer"))]
	#[serde(default = "one")]
	pub page: i64,
	#[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
	#[serde(default = "ten")]
	pub limit: i64,
	/// Restricts the feed to a single author's posts.
	pub username: Option<String>,
}

impl FeedQuery {
	fn paginate(&self) -> Paginate {
		Paginate {
			page: self.page,
			limit: self.limit,
		}
	}
}

/// A single feed item: a post annotated with live counts and the
/// requester's like state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostBody {
	pub post_id: Uuid,
	pub content: String,
	pub author: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
	pub like_count: i64,
	pub comment_count: i64,
	pub liked_by_current_user: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedBody {
	pub success: bool,
	pub page: i64,
	pub total_pages: i64,
	pub total_posts: i64,
	pub data: Vec<PostBody>,
}

#[derive(Debug, Serialize)]
pub struct CreatePostResponse {
	pub success: bool,
	pub message: &'static str,
	pub data: PostBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeBody {
	pub liked: bool,
	pub like_count: i64,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
	pub success: bool,
	pub message: &'static str,
	pub data: LikeBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentBody {
	pub comment_id: Uuid,
	pub content: String,
	pub author: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentData {
	pub comment: CommentBody,
	pub comment_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
	pub success: bool,
	pub message: &'static str,
	pub data: CommentData,
}

/// Merges the page of posts with the aggregated counts and the
/// requester's liked set. Posts with no likes or comments fall back to
/// zero, and the like flag defaults to false.
fn assemble(
	posts: Vec<model::FeedPost>,
	like_counts: &HashMap<Uuid, i64>,
	comment_counts: &HashMap<Uuid, i64>,
	liked: &HashSet<Uuid>,
) -> Vec<PostBody> {
	posts
		.into_iter()
		.map(|post| PostBody {
			like_count: like_counts.get(&post.id).copied().unwrap_or(0),
			comment_count: comment_counts.get(&post.id).copied().unwrap_or(0),
			liked_by_current_user: liked.contains(&post.id),
			post_id: post.id,
			content: post.content,
			author: post.author,
			created_at: post.created_at,
		})
		.collect()
}

/// Creates a new text-only post.
async fn create_post(
	State(database): State<Database>,
	auth: Auth,
	Json(input): Json<CreatePostInput>,
) -> Result<impl IntoResponse, crate::Error> {
	let post = sqlx::query_as::<_, model::Post>(
		"INSERT INTO post (user_id, content) VALUES ($1, $2) RETURNING *",
	)
	.bind(auth.user.id)
	.bind(input.content.trim())
	.fetch_one(&database)
	.await?;

	tracing::info!(user_id = %auth.user.id, post_id = %post.id, "post created");

	Ok((
		StatusCode::CREATED,
		Json(CreatePostResponse {
			success: true,
			message: "Post created successfully",
			data: PostBody {
				post_id: post.id,
				content: post.content,
				author: auth.user.username,
				created_at: post.created_at,
				like_count: 0,
				comment_count: 0,
				liked_by_current_user: false,
			},
		}),
	))
}

/// Returns a page of the feed, newest first, each post annotated with
/// its live like count, comment count and whether the requester has
/// liked it. Counts are aggregated over exactly the page's post ids on
/// every request; nothing is cached.
async fn get_posts(
	State(database): State<Database>,
	auth: Auth,
	Query(query): Query<FeedQuery>,
) -> Result<Json<FeedBody>, crate::Error> {
	let author = match &query.username {
		Some(username) => {
			let id = sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM "user" WHERE username = $1"#)
				.bind(username.trim().to_lowercase())
				.fetch_optional(&database)
				.await?;

			match id {
				Some(id) => Some(id),
				// An unknown author filters down to an empty feed, not
				// an error.
				None => {
					return Ok(Json(FeedBody {
						success: true,
						page: query.page,
						total_pages: 0,
						total_posts: 0,
						data: Vec::new(),
					}))
				}
			}
		}
		None => None,
	};

	let total = sqlx::query_scalar::<_, i64>(
		"SELECT COUNT(*) FROM post WHERE $1::uuid IS NULL OR user_id = $1",
	)
	.bind(author)
	.fetch_one(&database)
	.await?;

	let window = query.paginate().resolve(total);

	let posts = sqlx::query_as::<_, model::FeedPost>(
		r#"
			SELECT p.id, p.content, u.username AS author, p.created_at
			FROM post p
			JOIN "user" u ON u.id = p.user_id
			WHERE $1::uuid IS NULL OR p.user_id = $1
			ORDER BY p.created_at DESC
			LIMIT $2 OFFSET $3
		"#,
	)
	.bind(author)
	.bind(query.limit)
	.bind(window.offset)
	.fetch_all(&database)
	.await?;

	let ids = posts.iter().map(|post| post.id).collect::<Vec<_>>();

	let like_counts = sqlx::query_as::<_, (Uuid, i64)>(
		r#"SELECT post_id, COUNT(*) FROM "like" WHERE post_id = ANY($1) GROUP BY post_id"#,
	)
	.bind(&ids)
	.fetch_all(&database)
	.await?
	.into_iter()
	.collect::<HashMap<_, _>>();

	let comment_counts = sqlx::query_as::<_, (Uuid, i64)>(
		"SELECT post_id, COUNT(*) FROM comment WHERE post_id = ANY($1) GROUP BY post_id",
	)
	.bind(&ids)
	.fetch_all(&database)
	.await?
	.into_iter()
	.collect::<HashMap<_, _>>();

	let liked = sqlx::query_scalar::<_, Uuid>(
		r#"SELECT post_id FROM "like" WHERE user_id = $1 AND post_id = ANY($2)"#,
	)
	.bind(auth.user.id)
	.bind(&ids)
	.fetch_all(&database)
	.await?
	.into_iter()
	.collect::<HashSet<_>>();

	Ok(Json(FeedBody {
		success: true,
		page: window.page,
		total_pages: window.total_pages,
		total_posts: total,
		data: assemble(posts, &like_counts, &comment_counts, &liked),
	}))
}

/// What a toggle did to the like relation, derived from the
/// delete-then-insert row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
	/// The existing like was removed.
	Unliked,
	/// A like was created.
	Liked,
	/// A concurrent request created the like first; the relation holds
	/// but this request has nothing to notify about.
	AlreadyLiked,
}

impl Toggle {
	fn resolve(deleted: u64, inserted: u64) -> Self {
		if deleted > 0 {
			Self::Unliked
		} else if inserted > 0 {
			Self::Liked
		} else {
			Self::AlreadyLiked
		}
	}

	fn liked(self) -> bool {
		!matches!(self, Self::Unliked)
	}

	fn created(self) -> bool {
		matches!(self, Self::Liked)
	}
}

/// A like or comment only notifies the post's author when somebody
/// else produced it.
fn notifies_author(author: Uuid, actor: Uuid) -> bool {
	author != actor
}

/// Flips the like relation between the authenticated user and a post,
/// returning the resulting state and a fresh count.
async fn toggle_like(
	State(state): State<AppState>,
	auth: Auth,
	Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, crate::Error> {
	let post = sqlx::query_as::<_, model::Post>("SELECT * FROM post WHERE id = $1")
		.bind(post_id)
		.fetch_optional(&state.database)
		.await?
		.ok_or(Error::UnknownPost)?;

	let deleted = sqlx::query(r#"DELETE FROM "like" WHERE user_id = $1 AND post_id = $2"#)
		.bind(auth.user.id)
		.bind(post_id)
		.execute(&state.database)
		.await?
		.rows_affected();

	// The unique (user_id, post_id) constraint resolves concurrent
	// double-submissions; a conflicting insert becomes a no-op instead
	// of a duplicate row.
	let inserted = if deleted > 0 {
		0
	} else {
		sqlx::query(
			r#"
				INSERT INTO "like" (user_id, post_id) VALUES ($1, $2)
				ON CONFLICT (user_id, post_id) DO NOTHING
			"#,
		)
		.bind(auth.user.id)
		.bind(post_id)
		.execute(&state.database)
		.await?
		.rows_affected()
	};

	let toggle = Toggle::resolve(deleted, inserted);

	if toggle.liked() {
		tracing::info!(user_id = %auth.user.id, %post_id, "post liked");
	} else {
		tracing::info!(user_id = %auth.user.id, %post_id, "post unliked");
	}

	if toggle.created() && notifies_author(post.user_id, auth.user.id) {
		state.notifier.dispatch(
			state.database.clone(),
			post.user_id,
			notify::Notification {
				kind: notify::Kind::Like,
				post_id,
				sender_username: auth.user.username.clone(),
			},
		);
	}

	let liked = toggle.liked();

	let like_count =
		sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(*) FROM "like" WHERE post_id = $1"#)
			.bind(post_id)
			.fetch_one(&state.database)
			.await?;

	Ok(Json(LikeResponse {
		success: true,
		message: if liked { "Post liked" } else { "Post unliked" },
		data: LikeBody { liked, like_count },
	}))
}

/// Appends a comment to a post, returning the created comment and a
/// fresh count.
async fn add_comment(
	State(state): State<AppState>,
	auth: Auth,
	Path(post_id): Path<Uuid>,
	Json(input): Json<CommentInput>,
) -> Result<impl IntoResponse, crate::Error> {
	let post = sqlx::query_as::<_, model::Post>("SELECT * FROM post WHERE id = $1")
		.bind(post_id)
		.fetch_optional(&state.database)
		.await?
		.ok_or(Error::UnknownPost)?;

	let content = input.content.trim();

	let (comment_id, created_at) = sqlx::query_as::<_, (Uuid, chrono::DateTime<chrono::Utc>)>(
		"INSERT INTO comment (user_id, post_id, content) VALUES ($1, $2, $3) RETURNING id, created_at",
	)
	.bind(auth.user.id)
	.bind(post_id)
	.bind(content)
	.fetch_one(&state.database)
	.await?;

	tracing::info!(user_id = %auth.user.id, %post_id, %comment_id, "comment added");

	if notifies_author(post.user_id, auth.user.id) {
		state.notifier.dispatch(
			state.database.clone(),
			post.user_id,
			notify::Notification {
				kind: notify::Kind::Comment,
				post_id,
				sender_username: auth.user.username.clone(),
			},
		);
	}

	let comment_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comment WHERE post_id = $1")
		.bind(post_id)
		.fetch_one(&state.database)
		.await?;

	Ok((
		StatusCode::CREATED,
		Json(CommentResponse {
			success: true,
			message: "Comment added successfully",
			data: CommentData {
				comment: CommentBody {
					comment_id,
					content: content.to_string(),
					author: auth.user.username,
					created_at,
				},
				comment_count,
			},
		}),
	))
}

#[cfg(test)]
mod test {
	use validator::Validate;

	use super::*;
	use crate::test::*;

	#[tokio::test]
	async fn test_feed_requires_bearer_token() {
		let server = server();

		let response = server.get("/posts").await;

		assert_eq!(response.status_code(), 401);
		assert_eq!(response.json::<serde_json::Value>()["success"], false);
	}

	#[tokio::test]
	async fn test_like_rejects_invalid_bearer_token() {
		let server = server();

		let response = server
			.post(&format!("/posts/{}/like", Uuid::new_v4()))
			.authorization_bearer("not-a-token")
			.await;

		assert_eq!(response.status_code(), 401);
	}

	#[test]
	fn test_feed_query_bounds() {
		let query = FeedQuery {
			page: 0,
			limit: 10,
			username: None,
		};

		assert!(query.validate().is_err());

		let query = FeedQuery {
			page: 1,
			limit: 101,
			username: None,
		};

		assert!(query.validate().is_err());

		let query = FeedQuery {
			page: 1,
			limit: 100,
			username: Some("alice".into()),
		};

		assert!(query.validate().is_ok());
	}

	#[test]
	fn test_content_validation_trims() {
		assert!(validate_post_content("   ").is_err());
		assert!(validate_post_content("hello").is_ok());
		assert!(validate_post_content(&"x".repeat(500)).is_ok());
		assert!(validate_post_content(&"x".repeat(501)).is_err());

		assert!(validate_comment_content(&"x".repeat(300)).is_ok());
		assert!(validate_comment_content(&"x".repeat(301)).is_err());
		assert!(validate_comment_content("\n\t").is_err());
	}

	#[test]
	fn test_double_toggle_returns_to_baseline() {
		// No like yet: the delete removes nothing, the insert creates
		// the row.
		let first = Toggle::resolve(0, 1);

		assert!(first.liked());
		assert!(first.created());

		// The like now exists: the second toggle deletes it and skips
		// the insert entirely.
		let second = Toggle::resolve(1, 0);

		assert!(!second.liked());
		assert!(!second.created());
	}

	#[test]
	fn test_concurrent_duplicate_like_creates_nothing() {
		// A racing request inserted the pair first, so the unique
		// constraint swallowed this insert.
		let toggle = Toggle::resolve(0, 0);

		assert_eq!(toggle, Toggle::AlreadyLiked);
		assert!(toggle.liked());
		assert!(!toggle.created());
	}

	#[test]
	fn test_self_interaction_never_notifies() {
		let author = Uuid::new_v4();
		let other = Uuid::new_v4();

		assert!(!notifies_author(author, author));
		assert!(notifies_author(author, other));

		// A self-like that created a row still stays silent.
		let toggle = Toggle::resolve(0, 1);

		assert!(!(toggle.created() && notifies_author(author, author)));

		// A cross-user like that lost the race stays silent too.
		let raced = Toggle::resolve(0, 0);

		assert!(!(raced.created() && notifies_author(author, other)));
	}

	#[test]
	fn test_assemble_defaults_and_counts() {
		let first = Uuid::new_v4();
		let second = Uuid::new_v4();

		let posts = vec![
			model::FeedPost {
				id: first,
				content: "1".into(),
				author: "alice".into(),
				created_at: chrono::Utc::now(),
			},
			model::FeedPost {
				id: second,
				content: "2".into(),
				author: "bob".into(),
				created_at: chrono::Utc::now(),
			},
		];

		let like_counts = HashMap::from([(first, 3)]);
		let comment_counts = HashMap::from([(second, 1)]);
		let liked = HashSet::from([first]);

		let data = assemble(posts, &like_counts, &comment_counts, &liked);

		assert_eq!(data[0].like_count, 3);
		assert_eq!(data[0].comment_count, 0);
		assert!(data[0].liked_by_current_user);

		assert_eq!(data[1].like_count, 0);
		assert_eq!(data[1].comment_count, 1);
		assert!(!data[1].liked_by_current_user);
	}
}
