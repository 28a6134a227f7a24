use std::sync::Arc;
use std::time::Duration;

use hyper::client::HttpConnector;
use hyper::{Body, Client};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use webpki_roots::TLS_SERVER_ROOTS;

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Idle keep-alive connections are dropped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Embedding calls go to a single host, so a small pool suffices.
const POOL_MAX_IDLE_PER_HOST: usize = 4;

fn webpki_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));
    roots
}

/// Client accepting both `https://` and plain `http://` endpoints (local
/// OpenAI-compatible servers usually speak plain HTTP).
pub(crate) fn build_https_client() -> HyperClient {
    let tls = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(webpki_roots())
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);

    let connector = HttpsConnector::from((http, Arc::new(tls)));

    Client::builder()
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .build::<_, Body>(connector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_roots_are_loaded() {
        assert!(!webpki_roots().is_empty());
    }
}
