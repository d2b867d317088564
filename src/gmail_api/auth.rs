use crate::error::GmailError;
use crate::settings::GmailSettings;
use crate::types::{TokenErrorResponse, TokenResponse};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
pub const DEFAULT_TOKEN_PATH: &str = "./token.json";
pub const AUTHORIZED_USER: &str = "authorized_user";

/// OAuth client registration, read from Google's client secret download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_uri: String,
    pub token_uri: String,
}

impl ClientConfig {
    pub async fn load(path: &Path) -> Result<Self, GmailError> {
        let secret = yup_oauth2::read_application_secret(path)
            .await
            .map_err(|source| GmailError::Config {
                path: path.to_path_buf(),
                source,
            })?;

        let redirect_uri = secret.redirect_uris.first().cloned().ok_or_else(|| {
            GmailError::MissingRedirectUri {
                path: path.to_path_buf(),
            }
        })?;

        Ok(Self {
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            redirect_uri,
            auth_uri: secret.auth_uri,
            token_uri: secret.token_uri,
        })
    }

    /// Consent URL for the send-only scope. `prompt=consent` makes Google
    /// issue a refresh token even when the user has approved the app before.
    pub fn authorization_url(&self) -> Result<String, GmailError> {
        let url = Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", GMAIL_SEND_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| GmailError::AuthUrl(format!("{}: {}", self.auth_uri, e)))?;
        Ok(url.to_string())
    }
}

/// The persisted refresh credential, in Google's `authorized_user` format.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credential {
    #[serde(rename = "type")]
    pub credential_type: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl Credential {
    pub fn authorized_user(config: &ClientConfig, refresh_token: String) -> Self {
        Self {
            credential_type: AUTHORIZED_USER.to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token,
        }
    }
}

// Keep secrets out of debug output
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("credential_type", &self.credential_type)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

// Source of the authorization code the operator copies from the consent page
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeProvider: Send + Sync {
    async fn request_authorization_code(&self, url: &str) -> Result<String, GmailError>;
}

/// Prints the consent URL and blocks on one line of stdin.
pub struct ConsoleCodeProvider;

#[async_trait]
impl CodeProvider for ConsoleCodeProvider {
    async fn request_authorization_code(&self, url: &str) -> Result<String, GmailError> {
        println!("Authorize this app by visiting this url: {}", url);

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(b"Enter the code from that page here: ")
            .await
            .map_err(GmailError::CodeInput)?;
        stdout.flush().await.map_err(GmailError::CodeInput)?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(GmailError::CodeInput)?;
        Ok(line.trim().to_string())
    }
}

// Token endpoint operations, behind a trait so tests can stub them
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthFlow: Send + Sync {
    async fn exchange_code(
        &self,
        config: &ClientConfig,
        code: &str,
    ) -> Result<TokenResponse, GmailError>;

    async fn refresh_access_token(
        &self,
        config: &ClientConfig,
        credential: &Credential,
    ) -> Result<String, GmailError>;
}

pub struct RealOAuthFlow {
    client: reqwest::Client,
}

impl RealOAuthFlow {
    pub fn new(settings: &GmailSettings) -> Result<Self, GmailError> {
        Ok(Self {
            client: settings.http_client()?,
        })
    }
}

// Pull a readable reason out of a failed token endpoint response
async fn token_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    match serde_json::from_str::<TokenErrorResponse>(&body) {
        Ok(err) => match err.error_description {
            Some(description) => format!("{} ({}): {}", err.error, status, description),
            None => format!("{} ({})", err.error, status),
        },
        Err(_) => format!("{}: {}", status, body),
    }
}

#[async_trait]
impl OAuthFlow for RealOAuthFlow {
    async fn exchange_code(
        &self,
        config: &ClientConfig,
        code: &str,
    ) -> Result<TokenResponse, GmailError> {
        let params = [
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(&config.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| GmailError::AuthExchange(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GmailError::AuthExchange(token_error(response).await));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| GmailError::AuthExchange(e.to_string()))
    }

    async fn refresh_access_token(
        &self,
        config: &ClientConfig,
        credential: &Credential,
    ) -> Result<String, GmailError> {
        let params = [
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("refresh_token", credential.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&config.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| GmailError::TokenRefresh(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GmailError::TokenRefresh(token_error(response).await));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GmailError::TokenRefresh(e.to_string()))?;
        Ok(token.access_token)
    }
}

/// A client config paired with a credential that can mint access tokens.
pub struct AuthorizedClient {
    config: ClientConfig,
    credential: Credential,
    // Set only right after an interactive exchange
    access_token: Option<String>,
}

impl AuthorizedClient {
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub async fn access_token<O: OAuthFlow + ?Sized>(
        &self,
        oauth_flow: &O,
    ) -> Result<String, GmailError> {
        match &self.access_token {
            Some(token) => Ok(token.clone()),
            None => {
                debug!("Refreshing access token");
                oauth_flow
                    .refresh_access_token(&self.config, &self.credential)
                    .await
            }
        }
    }
}

// A missing, unreadable or malformed file all mean "no credential"
pub async fn load_credential(path: &Path) -> Option<Credential> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No stored credential");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read stored credential");
            return None;
        }
    };

    match serde_json::from_str::<Credential>(&contents) {
        Ok(credential) if credential.credential_type == AUTHORIZED_USER => Some(credential),
        Ok(credential) => {
            warn!(
                path = %path.display(),
                credential_type = %credential.credential_type,
                "Ignoring stored credential of unexpected type"
            );
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed stored credential");
            None
        }
    }
}

/// Overwrite the credential file. The JSON goes to a sibling temp file first
/// and is renamed into place, so readers see the old file or the new one.
pub async fn save_credential(path: &Path, credential: &Credential) -> Result<(), GmailError> {
    let json = serde_json::to_string(credential)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let store_err = |source| GmailError::CredentialStore {
        path: path.to_path_buf(),
        source,
    };
    let written = match write_owner_only(&tmp, json.as_bytes()).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        // Don't leave the secret behind in the temp file
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(store_err(e));
    }
    Ok(())
}

async fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    drop(file);

    // mode() only applies on creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

/// Delete the stored credential. Returns false if there was nothing to delete.
pub async fn clear_credential(path: &Path) -> Result<bool, GmailError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(GmailError::CredentialStore {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Authorize with the console prompt and the live token endpoint.
pub async fn authorize(
    config_path: &Path,
    token_path: &Path,
) -> Result<AuthorizedClient, GmailError> {
    let oauth_flow = RealOAuthFlow::new(&GmailSettings::default())?;
    authorize_with(config_path, token_path, &ConsoleCodeProvider, &oauth_flow).await
}

pub async fn authorize_with<C: CodeProvider + ?Sized, O: OAuthFlow + ?Sized>(
    config_path: &Path,
    token_path: &Path,
    code_provider: &C,
    oauth_flow: &O,
) -> Result<AuthorizedClient, GmailError> {
    let config = ClientConfig::load(config_path).await?;

    if let Some(credential) = load_credential(token_path).await {
        debug!(path = %token_path.display(), "Using stored credential");
        return Ok(AuthorizedClient {
            config,
            credential,
            access_token: None,
        });
    }

    info!(path = %token_path.display(), "No usable credential, starting authorization");
    let url = config.authorization_url()?;
    let code = code_provider.request_authorization_code(&url).await?;
    if code.is_empty() {
        return Err(GmailError::AuthExchange(
            "no authorization code entered".to_string(),
        ));
    }

    let token = oauth_flow.exchange_code(&config, &code).await?;
    let refresh_token = token.refresh_token.ok_or_else(|| {
        GmailError::AuthExchange("token endpoint did not issue a refresh token".to_string())
    })?;

    let credential = Credential::authorized_user(&config, refresh_token);
    save_credential(token_path, &credential).await?;
    info!(path = %token_path.display(), "Saved credential");

    Ok(AuthorizedClient {
        config,
        credential,
        access_token: Some(token.access_token),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CLIENT_SECRET_JSON: &str = r#"{
        "installed": {
            "client_id": "test-client.apps.googleusercontent.com",
            "client_secret": "test-secret",
            "project_id": "test-project",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("client_secret.json"), CLIENT_SECRET_JSON).unwrap();
            Self { dir }
        }

        fn config_path(&self) -> PathBuf {
            self.dir.path().join("client_secret.json")
        }

        fn token_path(&self) -> PathBuf {
            self.dir.path().join("token.json")
        }
    }

    fn stored_credential() -> Credential {
        Credential {
            credential_type: AUTHORIZED_USER.to_string(),
            client_id: "test-client.apps.googleusercontent.com".to_string(),
            client_secret: "test-secret".to_string(),
            refresh_token: "stored-refresh".to_string(),
        }
    }

    fn token_response(refresh_token: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "fresh-access".to_string(),
            refresh_token: refresh_token.map(|t| t.to_string()),
        }
    }

    #[tokio::test]
    async fn test_load_client_config() {
        let fixture = Fixture::new();
        let config = ClientConfig::load(&fixture.config_path()).await.unwrap();
        assert_eq!(config.client_id, "test-client.apps.googleusercontent.com");
        assert_eq!(config.client_secret, "test-secret");
        assert_eq!(config.redirect_uri, "http://localhost");
        assert_eq!(config.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[tokio::test]
    async fn test_load_client_config_missing_file() {
        let fixture = Fixture::new();
        let missing = fixture.dir.path().join("nope.json");
        let err = ClientConfig::load(&missing).await.unwrap_err();
        assert!(matches!(err, GmailError::Config { .. }));
    }

    #[tokio::test]
    async fn test_load_client_config_malformed() {
        let fixture = Fixture::new();
        std::fs::write(fixture.config_path(), "{ not json").unwrap();
        let err = ClientConfig::load(&fixture.config_path()).await.unwrap_err();
        assert!(matches!(err, GmailError::Config { .. }));
    }

    #[tokio::test]
    async fn test_load_client_config_without_redirect_uris() {
        let fixture = Fixture::new();
        let json = CLIENT_SECRET_JSON.replace(r#"["http://localhost"]"#, "[]");
        std::fs::write(fixture.config_path(), json).unwrap();
        let err = ClientConfig::load(&fixture.config_path()).await.unwrap_err();
        assert!(matches!(err, GmailError::MissingRedirectUri { .. }));
    }

    #[tokio::test]
    async fn test_authorization_url_requests_offline_send_scope() {
        let fixture = Fixture::new();
        let config = ClientConfig::load(&fixture.config_path()).await.unwrap();
        let url = Url::parse(&config.authorization_url().unwrap()).unwrap();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| {
            query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("scope"), Some(GMAIL_SEND_SCOPE));
        assert_eq!(get("access_type"), Some("offline"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("redirect_uri"), Some("http://localhost"));
        assert_eq!(
            get("client_id"),
            Some("test-client.apps.googleusercontent.com")
        );
    }

    #[tokio::test]
    async fn test_stored_credential_skips_interactive_flow() {
        let fixture = Fixture::new();
        save_credential(&fixture.token_path(), &stored_credential())
            .await
            .unwrap();

        let mut code_provider = MockCodeProvider::new();
        code_provider.expect_request_authorization_code().times(0);
        let mut oauth_flow = MockOAuthFlow::new();
        oauth_flow.expect_exchange_code().times(0);
        oauth_flow
            .expect_refresh_access_token()
            .withf(|_, credential| credential.refresh_token == "stored-refresh")
            .times(1)
            .returning(|_, _| Ok("refreshed-access".to_string()));

        let client = authorize_with(
            &fixture.config_path(),
            &fixture.token_path(),
            &code_provider,
            &oauth_flow,
        )
        .await
        .unwrap();

        assert_eq!(client.credential(), &stored_credential());
        assert_eq!(
            client.access_token(&oauth_flow).await.unwrap(),
            "refreshed-access"
        );
    }

    #[tokio::test]
    async fn test_interactive_flow_persists_credential() {
        let fixture = Fixture::new();

        let mut code_provider = MockCodeProvider::new();
        code_provider
            .expect_request_authorization_code()
            .withf(|url| url.contains("gmail.send") && url.contains("access_type=offline"))
            .times(1)
            .returning(|_| Ok("operator-code".to_string()));
        let mut oauth_flow = MockOAuthFlow::new();
        oauth_flow
            .expect_exchange_code()
            .withf(|_, code| code == "operator-code")
            .times(1)
            .returning(|_, _| Ok(token_response(Some("new-refresh"))));
        oauth_flow.expect_refresh_access_token().times(0);

        let client = authorize_with(
            &fixture.config_path(),
            &fixture.token_path(),
            &code_provider,
            &oauth_flow,
        )
        .await
        .unwrap();

        // The in-memory token from the exchange is used as-is
        assert_eq!(
            client.access_token(&oauth_flow).await.unwrap(),
            "fresh-access"
        );

        let saved = std::fs::read_to_string(fixture.token_path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&saved).unwrap();
        assert_eq!(json["type"], "authorized_user");
        assert_eq!(json["client_id"], "test-client.apps.googleusercontent.com");
        assert_eq!(json["client_secret"], "test-secret");
        assert_eq!(json["refresh_token"], "new-refresh");
        assert_eq!(json.as_object().unwrap().len(), 4);
        assert!(!fixture.dir.path().join("token.json.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_credential_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let fixture = Fixture::new();
        std::fs::write(fixture.token_path(), "stale").unwrap();
        std::fs::set_permissions(
            fixture.token_path(),
            std::fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        save_credential(&fixture.token_path(), &stored_credential())
            .await
            .unwrap();

        let mode = std::fs::metadata(fixture.token_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_save_removes_temp_file() {
        let fixture = Fixture::new();
        // A non-empty directory in the way makes the rename fail
        std::fs::create_dir(fixture.token_path()).unwrap();
        std::fs::write(fixture.token_path().join("keep"), "x").unwrap();

        let result = save_credential(&fixture.token_path(), &stored_credential()).await;

        assert!(matches!(result, Err(GmailError::CredentialStore { .. })));
        assert!(!fixture.dir.path().join("token.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_malformed_credential_triggers_reauthorization() {
        let fixture = Fixture::new();
        std::fs::write(fixture.token_path(), "{\"refresh_token\": ").unwrap();

        let mut code_provider = MockCodeProvider::new();
        code_provider
            .expect_request_authorization_code()
            .times(1)
            .returning(|_| Ok("operator-code".to_string()));
        let mut oauth_flow = MockOAuthFlow::new();
        oauth_flow
            .expect_exchange_code()
            .times(1)
            .returning(|_, _| Ok(token_response(Some("new-refresh"))));

        authorize_with(
            &fixture.config_path(),
            &fixture.token_path(),
            &code_provider,
            &oauth_flow,
        )
        .await
        .unwrap();

        assert_eq!(
            load_credential(&fixture.token_path())
                .await
                .unwrap()
                .refresh_token,
            "new-refresh"
        );
    }

    #[tokio::test]
    async fn test_unexpected_credential_type_is_ignored() {
        let fixture = Fixture::new();
        let mut credential = stored_credential();
        credential.credential_type = "service_account".to_string();
        save_credential(&fixture.token_path(), &credential)
            .await
            .unwrap();

        assert!(load_credential(&fixture.token_path()).await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_code_leaves_no_credential() {
        let fixture = Fixture::new();

        let mut code_provider = MockCodeProvider::new();
        code_provider
            .expect_request_authorization_code()
            .returning(|_| Ok("bad-code".to_string()));
        let mut oauth_flow = MockOAuthFlow::new();
        oauth_flow
            .expect_exchange_code()
            .returning(|_, _| Err(GmailError::AuthExchange("invalid_grant".to_string())));

        let result = authorize_with(
            &fixture.config_path(),
            &fixture.token_path(),
            &code_provider,
            &oauth_flow,
        )
        .await;

        assert!(matches!(result, Err(GmailError::AuthExchange(_))));
        assert!(!fixture.token_path().exists());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_an_exchange_error() {
        let fixture = Fixture::new();

        let mut code_provider = MockCodeProvider::new();
        code_provider
            .expect_request_authorization_code()
            .returning(|_| Ok("operator-code".to_string()));
        let mut oauth_flow = MockOAuthFlow::new();
        oauth_flow
            .expect_exchange_code()
            .returning(|_, _| Ok(token_response(None)));

        let result = authorize_with(
            &fixture.config_path(),
            &fixture.token_path(),
            &code_provider,
            &oauth_flow,
        )
        .await;

        assert!(matches!(result, Err(GmailError::AuthExchange(_))));
        assert!(!fixture.token_path().exists());
    }

    #[tokio::test]
    async fn test_empty_code_is_rejected_before_exchange() {
        let fixture = Fixture::new();

        let mut code_provider = MockCodeProvider::new();
        code_provider
            .expect_request_authorization_code()
            .returning(|_| Ok(String::new()));
        let mut oauth_flow = MockOAuthFlow::new();
        oauth_flow.expect_exchange_code().times(0);

        let result = authorize_with(
            &fixture.config_path(),
            &fixture.token_path(),
            &code_provider,
            &oauth_flow,
        )
        .await;

        assert!(matches!(result, Err(GmailError::AuthExchange(_))));
    }

    #[tokio::test]
    async fn test_clear_credential() {
        let fixture = Fixture::new();
        assert!(!clear_credential(&fixture.token_path()).await.unwrap());

        save_credential(&fixture.token_path(), &stored_credential())
            .await
            .unwrap();
        assert!(clear_credential(&fixture.token_path()).await.unwrap());
        assert!(!fixture.token_path().exists());
    }

    #[test]
    fn test_credential_debug_hides_secrets() {
        let rendered = format!("{:?}", stored_credential());
        assert!(!rendered.contains("stored-refresh"));
        assert!(!rendered.contains("test-secret"));
    }
}
