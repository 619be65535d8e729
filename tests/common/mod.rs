//! Shared fixtures: a mocked backend + realtime endpoint and a controller
//! wired to the in-memory transport.

#![allow(dead_code)]

use std::sync::Arc;

use rtc_session::config::{ClientConfig, ClientVariant};
use rtc_session::realtime::transport::memory::{MemoryMedia, MemoryPeerConnector, MemoryPeerHandle};
use rtc_session::realtime::{ConnectionState, SessionController};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "ek_test_token";
pub const REALTIME_PATH: &str = "/v1/realtime";
pub const ANSWER_SDP: &str = "v=0\r\no=- 42 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

pub fn token_path(variant: ClientVariant) -> String {
    format!("/{}/api/session/", variant.default_app())
}

pub async fn mount_token(server: &MockServer, variant: ClientVariant) {
    Mock::given(path(token_path(variant)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"client_secret": {"value": TOKEN, "expires_at": 0}})),
        )
        .mount(server)
        .await;
}

pub async fn mount_answer(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(REALTIME_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_string(ANSWER_SDP))
        .mount(server)
        .await;
}

pub fn config_for(server: &MockServer, variant: ClientVariant) -> ClientConfig {
    ClientConfig::for_variant(variant)
        .with_backend_url(server.uri())
        .with_realtime_url(format!("{}{REALTIME_PATH}", server.uri()))
}

/// Controller on the loopback transport; the channel opens with the answer.
pub fn controller(config: ClientConfig) -> (SessionController, MemoryPeerHandle) {
    controller_with_media(config, MemoryMedia::available())
}

pub fn controller_with_media(
    config: ClientConfig,
    media: MemoryMedia,
) -> (SessionController, MemoryPeerHandle) {
    let (connector, handle) = MemoryPeerConnector::new();
    let controller =
        SessionController::new(config, Arc::new(media), Arc::new(connector.with_auto_open()))
            .expect("controller should build");
    (controller, handle)
}

/// Controller whose data channel only opens when the test calls
/// `handle.open_channel()`.
pub fn manual_controller(config: ClientConfig) -> (SessionController, MemoryPeerHandle) {
    let (connector, handle) = MemoryPeerConnector::new();
    let controller =
        SessionController::new(config, Arc::new(MemoryMedia::available()), Arc::new(connector))
            .expect("controller should build");
    (controller, handle)
}

/// A controller that has completed the whole connect flow with its data
/// channel open and its effects drained.
pub async fn connected(
    server: &MockServer,
    variant: ClientVariant,
) -> (SessionController, MemoryPeerHandle) {
    connected_with(server, config_for(server, variant)).await
}

pub async fn connected_with(
    server: &MockServer,
    config: ClientConfig,
) -> (SessionController, MemoryPeerHandle) {
    mount_token(server, config.variant).await;
    mount_answer(server).await;
    let (mut controller, handle) = controller(config);
    controller.connect().await.expect("connect should succeed");
    controller.process_pending();
    assert_eq!(controller.state(), ConnectionState::DataChannelOpen);
    controller.drain_effects();
    (controller, handle)
}
