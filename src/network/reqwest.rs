//! Reqwest-backed [`NetworkClient`] built on the `oauth2` crate.
//!
//! Token requests run through an instrumented [`AsyncHttpClient`] handle that records the HTTP
//! status of the last response, so OAuth errors and malformed bodies are classified with the
//! status the identity provider actually returned.

// crates.io
use oauth2::{
	AsyncHttpClient, Client, ClientId as OAuthClientId, EndpointNotSet, EndpointSet,
	ExtraTokenFields, HttpClientError, HttpRequest, HttpResponse, RefreshToken, RequestTokenError,
	Scope, StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::{ConfigError, TransportError},
	network::{self, AuthorityMetadata, NetworkClient, NetworkFuture, RefreshExchange, TokenGrant},
};

const DISCOVERY_PATH: &str = "v2.0/.well-known/openid-configuration";

/// Extra token fields carrying the OpenID Connect ID token.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// Raw ID token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

type GrantResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type TokenClient = Client<
	BasicErrorResponse,
	GrantResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;

/// Shares the HTTP status of the latest response between the transport and error mapping.
#[derive(Clone, Debug, Default)]
pub struct StatusSlot(Arc<Mutex<Option<u16>>>);
impl StatusSlot {
	/// Records the status of the current response.
	pub fn store(&self, status: u16) {
		*self.0.lock() = Some(status);
	}

	/// Returns the captured status, consuming it from the slot.
	pub fn take(&self) -> Option<u16> {
		self.0.lock().take()
	}
}

/// Token endpoint client for the crate's default reqwest stack.
///
/// Token endpoints answer directly, so the default client does not follow redirects. Any
/// client passed to [`ReqwestNetworkClient::with_client`] should be configured the same way.
#[derive(Clone, Debug)]
pub struct ReqwestNetworkClient {
	http: ReqwestClient,
}
impl ReqwestNetworkClient {
	/// Builds a client with redirects disabled.
	pub fn new() -> Result<Self, ConfigError> {
		let http = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self { http })
	}

	/// Wraps an existing reqwest client.
	pub fn with_client(http: ReqwestClient) -> Self {
		Self { http }
	}

	/// Token endpoint derived from a canonical authority.
	pub fn token_endpoint(authority: &str) -> Result<TokenUrl, ConfigError> {
		Ok(TokenUrl::from_url(AuthorityMetadata::conventional(authority)?.token_endpoint))
	}

	fn oauth_client(exchange: &RefreshExchange) -> Result<TokenClient, ConfigError> {
		let token_url = Self::token_endpoint(&exchange.authority)?;

		Ok(Client::new(OAuthClientId::new(exchange.client_id.to_string())).set_token_uri(token_url))
	}
}
impl NetworkClient for ReqwestNetworkClient {
	fn refresh<'a>(&'a self, exchange: &'a RefreshExchange) -> NetworkFuture<'a, TokenGrant> {
		Box::pin(async move {
			let oauth_client = Self::oauth_client(exchange)?;
			let slot = StatusSlot::default();
			let handle = InstrumentedHandle::new(self.http.clone(), slot.clone());
			let refresh_secret = RefreshToken::new(exchange.refresh_token.expose().to_owned());
			let mut request = oauth_client
				.exchange_refresh_token(&refresh_secret)
				.add_extra_param("client-request-id", exchange.correlation_id.to_string());

			for scope in exchange.scopes.iter() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}

			let response = request
				.request_async(&handle)
				.await
				.map_err(|err| map_request_error(slot.take(), err))?;

			tracing::debug!(
				authority = %exchange.authority,
				client_id = %exchange.client_id,
				"refresh token redeemed"
			);

			map_grant_response(exchange, response)
		})
	}

	fn discover<'a>(&'a self, authority: &'a str) -> NetworkFuture<'a, AuthorityMetadata> {
		Box::pin(async move {
			let endpoint = format!("{}/{DISCOVERY_PATH}", authority.trim_end_matches('/'));
			let url = Url::parse(&endpoint).map_err(|source| ConfigError::InvalidAuthority {
				authority: authority.into(),
				source,
			})?;
			let response = self.http.get(url).send().await.map_err(TransportError::from)?;
			let status = response.status();
			let body = response.bytes().await.map_err(TransportError::from)?;

			if !status.is_success() {
				return Err(TransportError::UnexpectedResponse {
					message: format!("metadata discovery answered {status}"),
					status: Some(status.as_u16()),
				}
				.into());
			}

			let metadata: AuthorityMetadata = serde_path_to_error::deserialize(
				&mut serde_json::Deserializer::from_slice(&body),
			)
			.map_err(|source| TransportError::ResponseParse {
				source,
				status: Some(status.as_u16()),
			})?;

			tracing::debug!(%authority, issuer = %metadata.issuer, "authority metadata discovered");

			Ok(metadata)
		})
	}
}

struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: StatusSlot,
}

#[derive(Clone)]
struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: StatusSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, slot }))
	}
}
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			client.slot.store(status.as_u16());

			let mut converted =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

fn map_grant_response(exchange: &RefreshExchange, response: GrantResponse) -> Result<TokenGrant> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;
	let scopes = match response.scopes() {
		Some(scopes) =>
			ScopeSet::new(scopes.iter().map(|scope| scope.as_ref())).map_err(ConfigError::from)?,
		None => exchange.scopes.clone(),
	};

	Ok(TokenGrant {
		account: exchange.account.clone(),
		access_token: Some(TokenSecret::new(response.access_token().secret().to_owned())),
		id_token: response.extra_fields().id_token.clone().map(TokenSecret::new),
		refresh_token: response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned()))
			.or_else(|| Some(exchange.refresh_token.clone())),
		scopes,
		expires_in: Duration::seconds(expires_in),
	})
}

fn map_request_error(
	status: Option<u16>,
	err: RequestTokenError<HttpClientError<ReqwestError>, BasicErrorResponse>,
) -> Error {
	match err {
		RequestTokenError::ServerResponse(response) => network::classify_oauth_error(
			response.error().as_ref(),
			response.error_description().cloned(),
			status,
		),
		RequestTokenError::Request(error) => map_transport_error(status, error),
		RequestTokenError::Parse(source, _body) =>
			TransportError::ResponseParse { source, status }.into(),
		RequestTokenError::Other(message) =>
			TransportError::UnexpectedResponse { message, status }.into(),
	}
}

fn map_transport_error(status: Option<u16>, err: HttpClientError<ReqwestError>) -> Error {
	match err {
		HttpClientError::Reqwest(inner) if inner.is_builder() => ConfigError::from(*inner).into(),
		HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransportError::UnexpectedResponse { message, status }.into(),
		_ => TransportError::UnexpectedResponse {
			message: "HTTP client error occurred while calling the token endpoint".into(),
			status,
		}
		.into(),
	}
}
