//! Verifier behaviour against a wiremock stand-in for the deployed function.

use std::time::Duration;

use metadata_systest::{Verifier, VerifyError};
use rstest::{fixture, rstest};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[fixture]
fn verifier() -> Verifier {
    Verifier::new(Duration::from_secs(5)).expect("verifier should build")
}

async fn serve(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gcloud-tests-0a1b2c3d"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;
    server
}

#[rstest]
#[tokio::test]
async fn verify_accepts_available_metadata(verifier: Verifier) {
    let server = serve(200, r#"{"isAvailable":true,"project":"test-project"}"#).await;

    let body = verifier
        .verify(&format!("{}/gcloud-tests-0a1b2c3d", server.uri()))
        .await
        .expect("verification should pass");

    assert_eq!(body["project"], "test-project");
}

#[rstest]
#[tokio::test]
async fn verify_reports_unavailable_metadata_as_assertion(verifier: Verifier) {
    let server = serve(200, r#"{"isAvailable":false}"#).await;

    let err = verifier
        .verify(&format!("{}/gcloud-tests-0a1b2c3d", server.uri()))
        .await
        .expect_err("false flag should fail");

    assert!(matches!(err, VerifyError::Assertion(_)), "got {err:?}");
}

#[rstest]
#[tokio::test]
async fn verify_reports_error_status_as_request_failure(verifier: Verifier) {
    let server = serve(500, "boom").await;

    let err = verifier
        .verify(&format!("{}/gcloud-tests-0a1b2c3d", server.uri()))
        .await
        .expect_err("500 should fail");

    let VerifyError::Request { message, .. } = err else {
        panic!("expected request failure, got {err:?}");
    };
    assert!(message.contains("500"), "message: {message}");
}

#[rstest]
#[tokio::test]
async fn verify_reports_non_json_body_as_assertion(verifier: Verifier) {
    let server = serve(200, "<html>hello</html>").await;

    let err = verifier
        .verify(&format!("{}/gcloud-tests-0a1b2c3d", server.uri()))
        .await
        .expect_err("html should fail");

    assert!(matches!(err, VerifyError::Assertion(_)), "got {err:?}");
}
