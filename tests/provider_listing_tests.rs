use reqwest::Client;
use serde_json::{Value, json};
use stackseek_connect::{
    ConnectError,
    config::ProviderConfig,
    models::{ProviderKind, ProviderToken, RemoteRepository},
    providers::{
        AzureDevOpsProvider, BitbucketProvider, GitHubProvider, GitLabProvider, RepositoryProvider,
    },
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

fn endpoints(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(Some("client".to_string()), server.uri(), server.uri())
}

fn token() -> ProviderToken {
    ProviderToken::new("provider-token")
}

#[tokio::test]
async fn github_listing_is_capped_at_one_page() {
    let server = MockServer::start().await;
    let repos: Vec<Value> = (0..120)
        .map(|i| json!({ "html_url": format!("https://github.com/acme/r{}", i), "private": false }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("per_page", "100"))
        .and(query_param("sort", "updated"))
        .and(header("authorization", "Bearer provider-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(repos)))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GitHubProvider::new(Client::new(), endpoints(&server));
    let listed = provider.list_repositories(&token()).await.unwrap();

    assert_eq!(listed.len(), 100);
    assert_eq!(listed[0], RemoteRepository::new("https://github.com/acme/r0", false));
}

#[tokio::test]
async fn gitlab_lists_member_projects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("membership", "true"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "web_url": "https://gitlab.com/acme/web", "visibility": "public" },
            { "web_url": "https://gitlab.com/acme/api", "visibility": "private" }
        ])))
        .mount(&server)
        .await;

    let provider = GitLabProvider::new(Client::new(), endpoints(&server));
    let listed = provider.list_repositories(&token()).await.unwrap();

    assert_eq!(
        listed,
        vec![
            RemoteRepository::new("https://gitlab.com/acme/web", false),
            RemoteRepository::new("https://gitlab.com/acme/api", true),
        ]
    );
}

#[tokio::test]
async fn bitbucket_reads_html_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2.0/repositories"))
        .and(query_param("role", "member"))
        .and(query_param("pagelen", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagelen": 100,
            "values": [
                {
                    "full_name": "acme/billing",
                    "is_private": true,
                    "links": { "html": { "href": "https://bitbucket.org/acme/billing" } }
                }
            ]
        })))
        .mount(&server)
        .await;

    let provider = BitbucketProvider::new(Client::new(), endpoints(&server));
    let listed = provider.list_repositories(&token()).await.unwrap();

    assert_eq!(
        listed,
        vec![RemoteRepository::new("https://bitbucket.org/acme/billing", true)]
    );
}

#[tokio::test]
async fn azure_devops_uses_configured_organization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/_apis/git/repositories"))
        .and(query_param("api-version", "7.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "value": [
                { "webUrl": "https://dev.azure.com/acme/core/_git/core", "project": { "visibility": "private" } },
                { "webUrl": "https://dev.azure.com/acme/oss/_git/oss", "project": { "visibility": "public" } }
            ]
        })))
        .mount(&server)
        .await;

    let provider =
        AzureDevOpsProvider::new(Client::new(), endpoints(&server), Some("acme".to_string()));
    let listed = provider.list_repositories(&token()).await.unwrap();

    assert_eq!(listed.len(), 2);
    assert!(listed[0].is_private);
    assert!(!listed[1].is_private);
    assert!(
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .all(|r| !r.url.path().starts_with("/_apis/"))
    );
}

#[tokio::test]
async fn azure_devops_discovers_first_organization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_apis/profile/profiles/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "member-1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_apis/accounts"))
        .and(query_param("memberId", "member-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "accountName": "contoso" }, { "accountName": "fabrikam" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contoso/_apis/git/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "webUrl": "https://dev.azure.com/contoso/app/_git/app" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AzureDevOpsProvider::new(Client::new(), endpoints(&server), None);
    let listed = provider.list_repositories(&token()).await.unwrap();

    assert_eq!(
        listed,
        vec![RemoteRepository::new(
            "https://dev.azure.com/contoso/app/_git/app",
            true
        )]
    );
}

#[tokio::test]
async fn azure_devops_without_organizations_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_apis/profile/profiles/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "member-1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_apis/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .mount(&server)
        .await;

    let provider = AzureDevOpsProvider::new(Client::new(), endpoints(&server), None);
    let err = provider.list_repositories(&token()).await.unwrap_err();

    assert!(matches!(
        err,
        ConnectError::ProviderApi {
            provider: ProviderKind::AzureDevOps,
            status: None,
            ..
        }
    ));
}

#[tokio::test]
async fn rejected_token_maps_to_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })),
        )
        .mount(&server)
        .await;

    let provider = GitHubProvider::new(Client::new(), endpoints(&server));
    let err = provider.list_repositories(&token()).await.unwrap_err();

    match err {
        ConnectError::ProviderApi {
            provider,
            status,
            message,
        } => {
            assert_eq!(provider, ProviderKind::GitHub);
            assert_eq!(status, Some(401));
            assert_eq!(message, "Bad credentials");
        }
        other => panic!("expected ProviderApi, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_listing_maps_to_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
        .mount(&server)
        .await;

    let provider = GitLabProvider::new(Client::new(), endpoints(&server));
    let err = provider.list_repositories(&token()).await.unwrap_err();

    assert!(matches!(
        err,
        ConnectError::ProviderApi {
            provider: ProviderKind::GitLab,
            status: Some(200),
            ..
        }
    ));
    assert_eq!(
        err.user_message(),
        "Could not list GitLab repositories: unexpected response format"
    );
}
