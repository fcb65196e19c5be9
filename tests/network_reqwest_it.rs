#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
// self
use common::*;
use oauth2_nested_broker::{
	auth::{CorrelationId, TokenSecret},
	error::{Error, TransportError},
	network::{NetworkClient, RefreshExchange, ReqwestNetworkClient},
};

const TOKEN_PATH: &str = "/common/oauth2/v2.0/token";

fn exchange(server: &MockServer) -> RefreshExchange {
	RefreshExchange {
		authority: server.url("/common"),
		client_id: client_id(CHILD_CLIENT),
		account: account("user"),
		refresh_token: TokenSecret::new("refresh-old"),
		scopes: scopes(&["User.Read"]),
		correlation_id: CorrelationId::new("corr-1").expect("Correlation id should be valid."),
	}
}

fn client() -> ReqwestNetworkClient {
	ReqwestNetworkClient::new().expect("Reqwest client should build.")
}

#[tokio::test]
async fn refresh_redeems_and_rotates_tokens() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "refresh-old")
				.form_urlencoded_tuple("client-request-id", "corr-1");
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-new\",\"refresh_token\":\"refresh-new\",\"id_token\":\"id-new\",\"token_type\":\"bearer\",\"expires_in\":1800,\"scope\":\"User.Read openid\"}",
				);
		})
		.await;
	let grant = client().refresh(&exchange(&server)).await.expect("Refresh should succeed.");

	mock.assert_async().await;

	assert_eq!(grant.access_token.as_ref().map(|token| token.expose()), Some("access-new"));
	assert_eq!(grant.refresh_token.as_ref().map(|token| token.expose()), Some("refresh-new"));
	assert_eq!(grant.id_token.as_ref().map(|token| token.expose()), Some("id-new"));
	assert_eq!(grant.expires_in, time::Duration::seconds(1800));
	assert!(grant.scopes.contains("openid"));
}

#[tokio::test]
async fn refresh_keeps_the_old_refresh_token_when_not_rotated() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"access-new\",\"token_type\":\"bearer\",\"expires_in\":600}");
		})
		.await;

	let grant = client().refresh(&exchange(&server)).await.expect("Refresh should succeed.");

	assert_eq!(grant.refresh_token.as_ref().map(|token| token.expose()), Some("refresh-old"));
	assert_eq!(grant.scopes, scopes(&["User.Read"]));
}

#[tokio::test]
async fn invalid_grant_requires_interaction() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"Refresh token expired.\"}");
		})
		.await;

	let err = client().refresh(&exchange(&server)).await.expect_err("Expired grant should fail.");

	match err {
		Error::InteractionRequired { code, description } => {
			assert_eq!(code, "invalid_grant");
			assert_eq!(description.as_deref(), Some("Refresh token expired."));
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn other_oauth_errors_keep_their_status() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_client\"}");
		})
		.await;

	match client().refresh(&exchange(&server)).await {
		Err(Error::Server(server)) => {
			assert_eq!(server.code, "invalid_client");
			assert_eq!(server.status, Some(401));
		},
		other => panic!("Unexpected outcome: {other:?}."),
	}
}

#[tokio::test]
async fn malformed_bodies_are_transport_errors() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body("{\"nope\":true}");
		})
		.await;

	let err = client().refresh(&exchange(&server)).await.expect_err("Malformed body should fail.");

	assert!(matches!(err, Error::Network(TransportError::ResponseParse { status: Some(200), .. })));
}

#[tokio::test]
async fn discovery_reads_the_openid_configuration() {
	let server = MockServer::start_async().await;
	let authority = server.url("/common");
	let body = serde_json::json!({
		"issuer": format!("{authority}/v2.0"),
		"authorization_endpoint": format!("{authority}/oauth2/v2.0/authorize"),
		"token_endpoint": format!("{authority}/oauth2/v2.0/token"),
		"jwks_uri": format!("{authority}/discovery/v2.0/keys"),
	});
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/common/v2.0/.well-known/openid-configuration");
			then.status(200).header("content-type", "application/json").json_body(body);
		})
		.await;
	let metadata = client().discover(&authority).await.expect("Discovery should succeed.");

	mock.assert_async().await;

	assert_eq!(metadata.token_endpoint.as_str(), server.url(TOKEN_PATH));
	assert!(metadata.end_session_endpoint.is_none());
}

#[tokio::test]
async fn discovery_failures_are_transport_errors() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/common/v2.0/.well-known/openid-configuration");
			then.status(404);
		})
		.await;

	let err = client()
		.discover(&server.url("/common"))
		.await
		.expect_err("Missing metadata should fail.");

	assert!(matches!(
		err,
		Error::Network(TransportError::UnexpectedResponse { status: Some(404), .. })
	));
}
