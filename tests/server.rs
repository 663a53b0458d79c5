//! End-to-end tests for the courier server.
//!
//! Each test starts a server on an ephemeral port backed by a `MockStore` and
//! talks to it with the courier API client or plain reqwest.

use std::sync::{Arc, Mutex};

use base64::Engine;
use tokio_util::sync::CancellationToken;

use courier::client::{ApiV1, ClientError, CourierClient};
use courier::config::Config;
use courier::models::{StoreCertificateRequest, StorePasswordRequest};
use courier::server::Server;
use courier::store::mock::{self, MockStore};
use courier::store::{Store, StoreError};
use courier::trust::{self, Provider};

const PASSWORD: &str = "supersecretsquirrel";

fn test_config(maintenance: bool) -> Config {
    Config {
        maintenance,
        bind_addr: "127.0.0.1:0".into(),
        ..Default::default()
    }
}

async fn start(maintenance: bool) -> (Server, Arc<MockStore>, ApiV1) {
    let store = Arc::new(MockStore::new());
    let server = Server::with_store(test_config(maintenance), store.clone() as Arc<dyn Store>);
    server.start().await.unwrap();

    let client = ApiV1::new(&server.url().unwrap())
        .unwrap()
        .with_retries(0)
        .unwrap();
    (server, store, client)
}

/// A self-signed certificate and key sealed in a PKCS12 container.
fn pkcs12_fixture(password: &str) -> (Provider, Vec<u8>) {
    let certified = rcgen::generate_simple_self_signed(vec!["courier.local".to_string()]).unwrap();
    let provider = Provider::new(
        vec![certified.cert.der().to_vec()],
        Some(certified.key_pair.serialize_der()),
    );
    let sealed = provider.encrypt(password).unwrap();
    (provider, sealed)
}

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Capture whatever the handler writes through `update_certificate`.
fn capture_certificates(store: &MockStore) -> Arc<Mutex<Option<(String, Vec<u8>)>>> {
    let captured = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    store.on_update_certificate(move |id, data| {
        *sink.lock().unwrap() = Some((id.to_string(), data.to_vec()));
        Ok(())
    });
    captured
}

mod status_tests {
    use super::*;

    #[tokio::test]
    async fn test_status_ok() {
        let (server, _, client) = start(false).await;

        let reply = client.status(&CancellationToken::new()).await.unwrap();
        assert_eq!(reply.status, "ok");
        assert!(!reply.uptime.is_empty());
        assert_eq!(reply.version, courier::version::version());

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_status_in_maintenance() {
        let (server, _, client) = start(true).await;

        // 503 is a valid status reply, not an error.
        let reply = client.status(&CancellationToken::new()).await.unwrap();
        assert_eq!(reply.status, "maintenance");

        server.shutdown().await.unwrap();
    }
}

mod password_tests {
    use super::*;

    #[tokio::test]
    async fn test_store_password() {
        let (server, store, client) = start(false).await;

        let stored = Arc::new(Mutex::new(Vec::new()));
        let sink = stored.clone();
        store.on_update_password(move |id, password| {
            sink.lock().unwrap().push((id.to_string(), password.to_vec()));
            Ok(())
        });

        let req = StorePasswordRequest {
            id: "foo".into(),
            password: PASSWORD.into(),
        };
        client
            .store_certificate_password(&req, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.calls(mock::UPDATE_PASSWORD), 1);
        assert_eq!(
            stored.lock().unwrap().as_slice(),
            &[("foo".to_string(), PASSWORD.as_bytes().to_vec())]
        );

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_password_requires_password() {
        let (server, store, client) = start(false).await;

        let req = StorePasswordRequest {
            id: "foo".into(),
            password: String::new(),
        };
        let err = client
            .store_certificate_password(&req, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.to_string(), "[400]: missing password in request");
        assert_eq!(store.calls(mock::UPDATE_PASSWORD), 0);

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_password_store_failure() {
        let (server, store, client) = start(false).await;
        store.on_update_password(|_, _| Err(StoreError::Other("disk full".into())));

        let req = StorePasswordRequest {
            id: "foo".into(),
            password: PASSWORD.into(),
        };
        let err = client
            .store_certificate_password(&req, &CancellationToken::new())
            .await
            .unwrap_err();

        // Internal details are not leaked to the caller.
        assert_eq!(err.to_string(), "[500]: internal server error");

        server.shutdown().await.unwrap();
    }
}

mod certificate_tests {
    use super::*;

    #[tokio::test]
    async fn test_store_certificate_decrypts() {
        let (server, store, client) = start(false).await;
        let (provider, sealed) = pkcs12_fixture(PASSWORD);

        store.on_get_password(|_| Ok(PASSWORD.as_bytes().to_vec()));
        let captured = capture_certificates(&store);

        let req = StoreCertificateRequest {
            id: "foo".into(),
            no_decrypt: false,
            base64_certificate: b64(&sealed),
        };
        client
            .store_certificate(&req, &CancellationToken::new())
            .await
            .unwrap();

        let (id, data) = captured.lock().unwrap().take().unwrap();
        assert_eq!(id, "foo");

        let pem = String::from_utf8(data.clone()).unwrap();
        assert!(pem.contains("-----BEGIN CERTIFICATE-----"));
        assert!(pem.contains("PRIVATE KEY-----"));

        let stored = Provider::from_pem(&data).unwrap();
        assert_eq!(stored.certificates(), provider.certificates());
        assert!(stored.has_private_key());

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_certificate_no_decrypt() {
        let (server, store, client) = start(false).await;
        let (_, sealed) = pkcs12_fixture(PASSWORD);
        let captured = capture_certificates(&store);

        let req = StoreCertificateRequest {
            id: "foo".into(),
            no_decrypt: true,
            base64_certificate: b64(&sealed),
        };
        client
            .store_certificate(&req, &CancellationToken::new())
            .await
            .unwrap();

        let (_, data) = captured.lock().unwrap().take().unwrap();
        assert_eq!(data, sealed);
        assert_eq!(store.calls(mock::GET_PASSWORD), 0);

        // The raw container still opens with the sealing password.
        assert!(trust::decrypt(&data, PASSWORD.as_bytes()).is_ok());

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_certificate_missing_password() {
        let (server, store, client) = start(false).await;
        let (_, sealed) = pkcs12_fixture(PASSWORD);
        store.on_get_password(|_| Err(StoreError::NotFound));

        let req = StoreCertificateRequest {
            id: "foo".into(),
            no_decrypt: false,
            base64_certificate: b64(&sealed),
        };
        let err = client
            .store_certificate(&req, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(404));
        assert_eq!(
            err.to_string(),
            "[404]: pkcs12 password not found, unable to decrypt certificate"
        );
        assert_eq!(store.calls(mock::UPDATE_CERTIFICATE), 0);

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_certificate_wrong_password() {
        let (server, store, client) = start(false).await;
        let (_, sealed) = pkcs12_fixture(PASSWORD);
        store.on_get_password(|_| Ok(b"notthepassword".to_vec()));

        let req = StoreCertificateRequest {
            id: "foo".into(),
            no_decrypt: false,
            base64_certificate: b64(&sealed),
        };
        let err = client
            .store_certificate(&req, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(409));
        assert_eq!(store.calls(mock::UPDATE_CERTIFICATE), 0);

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_certificate_unsupported_mac_digest() {
        let (server, store, client) = start(false).await;
        let (_, mut sealed) = pkcs12_fixture(PASSWORD);
        store.on_get_password(|_| Ok(PASSWORD.as_bytes().to_vec()));

        // Point the MAC digest (the last SHA-1 OID in the bundle) at an unknown algorithm.
        const SHA1_OID: [u8; 7] = [0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a];
        let pos = sealed
            .windows(SHA1_OID.len())
            .rposition(|w| w == SHA1_OID)
            .unwrap();
        sealed[pos + SHA1_OID.len() - 1] ^= 0x01;

        let req = StoreCertificateRequest {
            id: "foo".into(),
            no_decrypt: false,
            base64_certificate: b64(&sealed),
        };
        let err = client
            .store_certificate(&req, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "[409]: failed to decrypt certificate with stored pkcs12 password"
        );
        assert_eq!(store.calls(mock::UPDATE_CERTIFICATE), 0);

        // The server is still answering after the rejected bundle.
        assert!(client.status(&CancellationToken::new()).await.is_ok());

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_certificate_password_lookup_failure() {
        let (server, store, client) = start(false).await;
        let (_, sealed) = pkcs12_fixture(PASSWORD);
        store.on_get_password(|_| Err(StoreError::Other("backend unavailable".into())));

        let req = StoreCertificateRequest {
            id: "foo".into(),
            no_decrypt: false,
            base64_certificate: b64(&sealed),
        };
        let err = client
            .store_certificate(&req, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "[500]: internal server error");
        assert_eq!(store.calls(mock::GET_PASSWORD), 1);
        assert_eq!(store.calls(mock::UPDATE_CERTIFICATE), 0);

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_certificate_store_failure() {
        let (server, store, client) = start(false).await;
        let (_, sealed) = pkcs12_fixture(PASSWORD);
        store.on_get_password(|_| Ok(PASSWORD.as_bytes().to_vec()));
        store.on_update_certificate(|_, _| Err(StoreError::Other("disk full".into())));
        let cancel = CancellationToken::new();

        for no_decrypt in [false, true] {
            let req = StoreCertificateRequest {
                id: "foo".into(),
                no_decrypt,
                base64_certificate: b64(&sealed),
            };
            let err = client.store_certificate(&req, &cancel).await.unwrap_err();
            assert_eq!(err.to_string(), "[500]: internal server error", "no_decrypt={}", no_decrypt);
        }

        assert_eq!(store.calls(mock::UPDATE_CERTIFICATE), 2);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_certificate_bad_request() {
        let (server, store, client) = start(false).await;
        let cancel = CancellationToken::new();

        let mut req = StoreCertificateRequest {
            id: "foo".into(),
            no_decrypt: true,
            base64_certificate: String::new(),
        };
        let err = client.store_certificate(&req, &cancel).await.unwrap_err();
        assert_eq!(err.to_string(), "[400]: missing certificate in request");

        req.base64_certificate = "not base64!!".into();
        let err = client.store_certificate(&req, &cancel).await.unwrap_err();
        assert_eq!(err.status_code(), Some(400));

        // Standard base64 only; surrounding whitespace is not stripped.
        req.base64_certificate = format!(" {}\n", b64(b"foobar"));
        let err = client.store_certificate(&req, &cancel).await.unwrap_err();
        assert_eq!(err.status_code(), Some(400));

        assert_eq!(store.calls(mock::UPDATE_CERTIFICATE), 0);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let (server, _, _) = start(false).await;

        let rep = reqwest::Client::new()
            .post(format!("{}/v1/certs/foo", server.url().unwrap()))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(rep.status(), 400);

        let body: serde_json::Value = rep.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(!body["error"].as_str().unwrap().is_empty());

        server.shutdown().await.unwrap();
    }
}

mod routing_tests {
    use super::*;

    #[tokio::test]
    async fn test_not_found_and_method_not_allowed() {
        let (server, _, _) = start(false).await;
        let url = server.url().unwrap();
        let http = reqwest::Client::new();

        let rep = http.get(format!("{}/v1/nope", url)).send().await.unwrap();
        assert_eq!(rep.status(), 404);
        let body: serde_json::Value = rep.json().await.unwrap();
        assert_eq!(body["error"], "resource not found");

        let rep = http.get(format!("{}/v1/certs/foo", url)).send().await.unwrap();
        assert_eq!(rep.status(), 405);
        let body: serde_json::Value = rep.json().await.unwrap();
        assert_eq!(body["error"], "method not allowed");

        let rep = http.post(format!("{}/v1/status", url)).send().await.unwrap();
        assert_eq!(rep.status(), 405);

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_probes_bypass_maintenance() {
        let (server, store, client) = start(true).await;
        let url = server.url().unwrap();
        let http = reqwest::Client::new();

        for probe in ["/healthz", "/livez", "/readyz"] {
            let rep = http.get(format!("{}{}", url, probe)).send().await.unwrap();
            assert_eq!(rep.status(), 200, "{}", probe);
        }

        let rep = http.get(format!("{}/metrics", url)).send().await.unwrap();
        assert_eq!(rep.status(), 200);
        assert!(rep.text().await.unwrap().contains("courier_requests_total"));

        let req = StorePasswordRequest {
            id: "foo".into(),
            password: PASSWORD.into(),
        };
        let err = client
            .store_certificate_password(&req, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(store.calls(mock::UPDATE_PASSWORD), 0);

        server.shutdown().await.unwrap();
    }
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_closes_store_once() {
        let (server, store, _) = start(false).await;
        store.on_close(|| Ok(()));

        server.shutdown().await.unwrap();
        server.shutdown().await.unwrap();
        assert_eq!(store.calls(mock::CLOSE), 1);
    }

    #[tokio::test]
    async fn test_requests_fail_after_shutdown() {
        let (server, _, client) = start(false).await;
        server.shutdown().await.unwrap();

        let err = client.status(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
