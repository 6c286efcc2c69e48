use std::sync::Arc;
use std::time::Duration;

use hyper::body::{Bytes, to_bytes};
use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, HeaderName, HeaderValue, RETRY_AFTER};
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::debug;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{AdapterError, AdapterResult};

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

#[allow(clippy::unnecessary_wraps)]
pub(crate) fn build_https_client() -> AdapterResult<HyperClient> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Ok(Client::builder().build::<_, Body>(connector))
}

/// POSTs `payload` as JSON and decodes a JSON response of type `R`.
///
/// `provider` is only used to label errors.
pub(crate) async fn post_json<P, R>(
    client: &HyperClient,
    endpoint: &Uri,
    headers: &[(HeaderName, String)],
    payload: &P,
    deadline: Duration,
    provider: &str,
) -> AdapterResult<R>
where
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let body = serde_json::to_vec(payload).map_err(|err| {
        AdapterError::invalid_request(format!("failed to encode {provider} request: {err}"))
    })?;

    let mut builder = Request::post(endpoint.clone()).header(CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        let value = HeaderValue::from_str(value).map_err(|err| {
            AdapterError::configuration(format!("invalid {provider} header `{name}`: {err}"))
        })?;
        builder = builder.header(name.clone(), value);
    }

    let request = builder.body(Body::from(body)).map_err(|err| {
        AdapterError::transport(format!("failed to build {provider} request: {err}"))
    })?;

    debug!(provider, endpoint = %endpoint, "sending request");
    let response = timeout(deadline, client.request(request))
        .await
        .map_err(|_| AdapterError::Timeout { elapsed: deadline })?
        .map_err(|err| AdapterError::transport(format!("{provider} request failed: {err}")))?;

    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let bytes = to_bytes(response.into_body()).await.map_err(|err| {
        AdapterError::transport(format!("failed to read {provider} response: {err}"))
    })?;

    check_status(status, retry_after, &bytes, provider)?;

    serde_json::from_slice(&bytes).map_err(|err| {
        AdapterError::response(format!("failed to decode {provider} response: {err}"))
    })
}

fn check_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    bytes: &Bytes,
    provider: &str,
) -> AdapterResult<()> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AdapterError::RateLimited { retry_after });
    }
    if status.is_server_error() {
        let reason = String::from_utf8_lossy(bytes);
        return Err(AdapterError::transport(format!(
            "{provider} returned {status}: {reason}"
        )));
    }
    if !status.is_success() {
        let reason = String::from_utf8_lossy(bytes);
        return Err(AdapterError::response(format!(
            "{provider} returned {status}: {reason}"
        )));
    }
    Ok(())
}

pub(crate) fn sanitize_base_url(input: &str, provider: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(format!(
            "{provider} base URL must start with http:// or https://"
        )));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>().map_err(|err| {
        AdapterError::configuration(format!("invalid {provider} base URL: {err}"))
    })?;
    Ok(base)
}

pub(crate) fn parse_endpoint(url: &str, provider: &str) -> AdapterResult<Uri> {
    url.parse::<Uri>()
        .map_err(|err| AdapterError::configuration(format!("invalid {provider} endpoint: {err}")))
}
