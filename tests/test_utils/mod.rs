#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use stackseek_connect::{
    ConnectClient,
    config::{AppConfig, ProviderConfig},
    identity::{StaticIdentity, User},
    models::{Notice, ProviderKind},
    notifier::Presenter,
};
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

pub const ID_TOKEN: &str = "id-token-123";

/// Config with the backend and every provider API pointed at `server`.
pub fn test_config(server: &MockServer) -> AppConfig {
    let provider = |client_id: &str| {
        ProviderConfig::new(Some(client_id.to_string()), server.uri(), server.uri())
    };
    AppConfig {
        profile: "test".to_string(),
        backend_base_url: server.uri(),
        request_timeout_ms: 2_000,
        github: provider("gh-client"),
        gitlab: provider("gl-client"),
        bitbucket: provider("bb-client"),
        azure_devops: provider("az-client"),
        azure_devops_organization: Some("acme".to_string()),
        ..AppConfig::default()
    }
}

/// Presenter that records everything it is asked to show
#[derive(Default)]
pub struct RecordingPresenter {
    pub notices: Mutex<Vec<Notice>>,
    pub loading: Mutex<Vec<(ProviderKind, bool)>>,
}

impl RecordingPresenter {
    pub fn messages(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message().to_string())
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn present(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }

    fn loading(&self, provider: ProviderKind, active: bool) {
        self.loading.lock().unwrap().push((provider, active));
    }
}

pub fn signed_in() -> Arc<StaticIdentity> {
    Arc::new(StaticIdentity::signed_in(User::new("user-1"), ID_TOKEN))
}

pub fn build_client(
    config: AppConfig,
    identity: Arc<StaticIdentity>,
) -> (ConnectClient, Arc<RecordingPresenter>) {
    let presenter = Arc::new(RecordingPresenter::default());
    let client = ConnectClient::init(config, identity, presenter.clone()).unwrap();
    (client, presenter)
}

pub fn callback_url(query: &str) -> Url {
    Url::parse(&format!("http://127.0.0.1:8765/oauth/callback?{}", query)).unwrap()
}

pub async fn mount_exchange(server: &MockServer, provider: &str, token: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/api/repository/oauth/{}", provider)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": token })))
        .mount(server)
        .await;
}

pub async fn mount_token_save(server: &MockServer, provider: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/api/repository/{}-token", provider)))
        .and(header("authorization", format!("Bearer {}", ID_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(server)
        .await;
}

pub async fn mount_connect(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/repository/connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(server)
        .await;
}

pub async fn mount_user_repositories(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/api/repository/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// GitHub `/user/repos` listing `count` repositories under `acme`.
pub async fn mount_github_repos(server: &MockServer, count: usize) {
    let repos: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "id": i,
                "html_url": github_repo_url(i),
                "private": i % 2 == 0
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(repos)))
        .mount(server)
        .await;
}

pub fn github_repo_url(i: usize) -> String {
    format!("https://github.com/acme/repo-{}", i)
}

/// Requests received by `server` on `path`.
pub async fn requests_to(server: &MockServer, request_path: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == request_path)
        .collect()
}
