#![warn(clippy::pedantic)]

mod error;
mod extract;
mod model;
mod notify;
mod route;
mod token;

use argon2::Argon2;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::Error;

pub type Database = sqlx::Pool<sqlx::Postgres>;
pub type AppState = State;

/// The shared application state.
///
/// Everything in here is constructed once at startup and handed to every
/// request handler: the connection pool, the password hash configuration,
/// the JWT signing keys and the push-notification handle.
#[derive(Clone, axum::extract::FromRef)]
pub struct State {
	pub database: Database,
	pub hasher: Argon2<'static>,
	pub keys: token::Keys,
	pub notifier: notify::Notifier,
}

fn app(state: State) -> Router {
	Router::new()
		.nest("/auth", route::auth::routes())
		.nest("/users", route::users::routes())
		.nest("/posts", route::posts::routes())
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
		.with_state(state)
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt::init();
	dotenvy::dotenv().ok();

	let database = Database::connect(
		&std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
	)
	.await
	.expect("failed to connect to database");

	sqlx::migrate!()
		.run(&database)
		.await
		.expect("failed to run migrations");

	let state = State {
		database,
		hasher: Argon2::default(),
		keys: token::Keys::new(
			std::env::var("JWT_SECRET")
				.expect("JWT_SECRET must be set")
				.as_bytes(),
		),
		notifier: notify::Notifier::from_env(),
	};

	let port = std::env::var("PORT").map_or_else(
		|_| 3000,
		|port| port.parse().expect("PORT must be a number"),
	);

	let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
		.await
		.expect("failed to bind to port");

	tracing::info!("listening on port {}", port);

	axum::serve(listener, app(state))
		.with_graceful_shutdown(shutdown_signal())
		.await
		.unwrap();
}

/// Resolves on SIGINT or SIGTERM so `axum::serve` can drain in-flight
/// requests before the pool is dropped.
async fn shutdown_signal() {
	let ctrl_c = async {
		tokio::signal::ctrl_c()
			.await
			.expect("failed to install SIGINT handler");
	};

	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}

	tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod test {
	pub use axum_test::TestServer;
	pub use serde_json::json;

	/// A test server backed by a lazy pool, for request paths that are
	/// rejected before any query runs (validation and auth failures).
	pub fn server() -> TestServer {
		let database = sqlx::postgres::PgPoolOptions::new()
			.connect_lazy("postgres://postgres@localhost/social_feed_test")
			.unwrap();

		let state = crate::State {
			database,
			hasher: argon2::Argon2::default(),
			keys: crate::token::Keys::new(b"test-secret"),
			notifier: crate::notify::Notifier::disabled(),
		};

		TestServer::new(crate::app(state)).unwrap()
	}
}
