// API client module: a small blocking HTTP client for the four GitHub
// REST endpoints the upload flow needs. Calls are synchronous and made one
// at a time; there is no retry layer.

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use reqwest::blocking::{Client, ClientBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Description given to every repository this tool creates.
pub const DEFAULT_DESCRIPTION: &str = "Repository created automatically";

/// Bearer token, kept as a ready-made sensitive header value so it is
/// never formatted into logs or error messages.
#[derive(Clone)]
pub struct Credential {
    header: HeaderValue,
}

impl Credential {
    pub fn new(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::EmptyInput("access token"));
        }
        let mut header = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::MalformedCredential)?;
        header.set_sensitive(true);
        Ok(Credential { header })
    }

    fn header(&self) -> &HeaderValue {
        &self.header
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// The authenticated identity. Only `login` is kept.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub login: String,
}

/// One entry of `GET /user/repos`. Only `name` is kept.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
}

/// Payload for `POST /user/repos`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateRepositoryRequest {
    pub name: String,
    pub description: String,
    pub private: bool,
}

impl CreateRepositoryRequest {
    /// Public repository with the fixed default description.
    pub fn public(name: &str) -> Self {
        CreateRepositoryRequest {
            name: name.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            private: false,
        }
    }
}

/// Payload for `PUT /repos/{owner}/{repo}/contents/{path}`. `content` is
/// standard base64. No `sha` is ever sent, so overwriting an existing path
/// is rejected by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PutContentsRequest {
    pub message: String,
    pub content: String,
}

/// The remote collaborator the session talks to.
#[cfg_attr(test, mockall::automock)]
pub trait HostingApi {
    /// `GET /user`; only a 200 counts as success.
    fn current_user(&self, credential: &Credential) -> Result<User>;

    /// `GET /user/repos`, every page, in the order the provider returns them.
    fn list_repositories(&self, credential: &Credential) -> Result<Vec<Repository>>;

    /// `POST /user/repos`; only a 201 counts as success.
    fn create_repository(&self, credential: &Credential, req: &CreateRepositoryRequest)
        -> Result<()>;

    /// `PUT /repos/{owner}/{repo}/contents/{path}`; 200 or 201.
    fn put_contents(
        &self,
        credential: &Credential,
        owner: &str,
        repo: &str,
        path: &str,
        req: &PutContentsRequest,
    ) -> Result<()>;
}

/// Blocking reqwest client bound to one API host.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = client_builder(&config).build()?;
        Ok(ApiClient { client, config })
    }

    /// Create an ApiClient configured from `GITHUB_API_URL` /
    /// `GITHUB_RAW_URL`, or the public github.com hosts.
    pub fn from_env() -> Result<Self> {
        Self::new(ApiConfig::from_env())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Join path segments onto the API base, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let base = &self.config.api_base;
        let mut url = Url::parse(base).map_err(|e| Error::InvalidUrl(format!("{}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(format!("{} cannot be a base", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn client_builder(config: &ApiConfig) -> ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
}

impl HostingApi for ApiClient {
    fn current_user(&self, credential: &Credential) -> Result<User> {
        let url = self.endpoint(&["user"])?;
        tracing::debug!(%url, "fetching authenticated user");
        let res = self
            .client
            .get(url)
            .header(AUTHORIZATION, credential.header().clone())
            .send()?;
        if res.status() != StatusCode::OK {
            let (status, message) = failure(res);
            return Err(Error::AuthenticationFailure { status, message });
        }
        res.json().map_err(Error::Decode)
    }

    fn list_repositories(&self, credential: &Credential) -> Result<Vec<Repository>> {
        let mut url = self.endpoint(&["user", "repos"])?;
        url.query_pairs_mut()
            .append_pair("type", "owner")
            .append_pair("per_page", "100");

        let mut repos = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            tracing::debug!(%url, "listing repositories");
            let res = self
                .client
                .get(url)
                .header(AUTHORIZATION, credential.header().clone())
                .send()?;
            if !res.status().is_success() {
                let (status, message) = failure(res);
                return Err(Error::ListFailure { status, message });
            }
            next = res
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_page)
                .map(|link| Url::parse(link).map_err(|e| Error::InvalidUrl(format!("{}: {}", link, e))))
                .transpose()?;
            let page: Vec<Repository> = res.json().map_err(Error::Decode)?;
            repos.extend(page);
        }
        Ok(repos)
    }

    fn create_repository(
        &self,
        credential: &Credential,
        req: &CreateRepositoryRequest,
    ) -> Result<()> {
        let url = self.endpoint(&["user", "repos"])?;
        tracing::debug!(%url, name = %req.name, "creating repository");
        let res = self
            .client
            .post(url)
            .header(AUTHORIZATION, credential.header().clone())
            .json(req)
            .send()?;
        if res.status() != StatusCode::CREATED {
            let (status, message) = failure(res);
            return Err(Error::CreateFailure {
                name: req.name.clone(),
                status,
                message,
            });
        }
        Ok(())
    }

    fn put_contents(
        &self,
        credential: &Credential,
        owner: &str,
        repo: &str,
        path: &str,
        req: &PutContentsRequest,
    ) -> Result<()> {
        let url = self.endpoint(&["repos", owner, repo, "contents", path])?;
        tracing::debug!(%url, encoded_len = req.content.len(), "uploading contents");
        let res = self
            .client
            .put(url)
            .header(AUTHORIZATION, credential.header().clone())
            .json(req)
            .send()?;
        match res.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            _ => {
                let (status, message) = failure(res);
                Err(Error::UploadFailure {
                    path: path.to_string(),
                    status,
                    message,
                })
            }
        }
    }
}

/// Target of the `rel="next"` entry in a pagination `Link` header.
fn next_page(link: &str) -> Option<&str> {
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| target.trim().trim_start_matches('<').trim_end_matches('>'))
    })
}

/// GitHub error body: `{"message": "...", "errors": [{"message": "..."}]}`.
#[derive(Deserialize)]
struct ProviderError {
    message: String,
    #[serde(default)]
    errors: Vec<ProviderErrorDetail>,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn failure(res: Response) -> (u16, String) {
    let status = res.status().as_u16();
    let body = res.text().unwrap_or_default();
    (status, describe_failure(&body))
}

/// Turn a provider error body into one readable line. Falls back to the
/// raw body when it is not the usual JSON shape.
fn describe_failure(body: &str) -> String {
    let Ok(err) = serde_json::from_str::<ProviderError>(body) else {
        let body = body.trim();
        return if body.is_empty() { "no response body".into() } else { body.into() };
    };
    let details: Vec<String> = err
        .errors
        .into_iter()
        .filter_map(|d| d.message.or(d.code))
        .collect();
    if details.is_empty() {
        err.message
    } else {
        format!("{} ({})", err.message, details.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    fn client(api_base: &str) -> ApiClient {
        let config = ApiConfig {
            api_base: api_base.into(),
            ..ApiConfig::default()
        };
        // loopback stubs must not be routed through an ambient proxy
        let client = client_builder(&config).no_proxy().build().unwrap();
        ApiClient { client, config }
    }

    #[test]
    fn credential_rejects_blank_token() {
        assert!(matches!(Credential::new("   "), Err(Error::EmptyInput(_))));
    }

    #[test]
    fn credential_rejects_header_breaking_token() {
        assert!(matches!(
            Credential::new("abc\ndef"),
            Err(Error::MalformedCredential)
        ));
    }

    #[test]
    fn credential_builds_bearer_header_and_hides_it() {
        let cred = Credential::new(" ghp_secret ").unwrap();
        assert_eq!(cred.header().to_str().unwrap(), "Bearer ghp_secret");
        assert!(cred.header().is_sensitive());
        assert_eq!(format!("{:?}", cred), "Credential(***)");
    }

    #[test]
    fn endpoint_joins_onto_bare_host() {
        let url = client("https://api.github.com").endpoint(&["user", "repos"]).unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/user/repos");
    }

    #[test]
    fn endpoint_keeps_enterprise_prefix_and_encodes_segments() {
        let url = client("https://ghe.example.com/api/v3")
            .endpoint(&["repos", "me", "demo", "contents", "my notes#1.txt"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/me/demo/contents/my%20notes%231.txt"
        );
    }

    #[test]
    fn endpoint_rejects_garbage_base() {
        assert!(matches!(
            client("not a url").endpoint(&["user"]),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn create_request_is_public_with_default_description() {
        let json = serde_json::to_value(CreateRepositoryRequest::public("demo1")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "demo1",
                "description": "Repository created automatically",
                "private": false
            })
        );
    }

    #[test]
    fn records_ignore_unknown_fields() {
        let repos: Vec<Repository> =
            serde_json::from_str(r#"[{"name":"x","id":1,"private":false},{"name":"y"}]"#).unwrap();
        assert_eq!(repos.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), ["x", "y"]);
        let user: User = serde_json::from_str(r#"{"login":"octo","id":7}"#).unwrap();
        assert_eq!(user.login, "octo");
    }

    #[test]
    fn describe_failure_includes_detail_messages() {
        let body = r#"{"message":"Repository creation failed.","errors":[{"resource":"Repository","code":"custom","field":"name","message":"name already exists on this account"}]}"#;
        assert_eq!(
            describe_failure(body),
            "Repository creation failed. (name already exists on this account)"
        );
    }

    #[test]
    fn describe_failure_falls_back_to_code_then_raw_body() {
        let body = r#"{"message":"Validation Failed","errors":[{"code":"missing_field"}]}"#;
        assert_eq!(describe_failure(body), "Validation Failed (missing_field)");
        assert_eq!(describe_failure("Bad gateway\n"), "Bad gateway");
        assert_eq!(describe_failure(""), "no response body");
    }

    #[test]
    fn next_page_follows_rel_next_only() {
        let link = r#"<https://api.github.com/user/repos?page=2>; rel="next", <https://api.github.com/user/repos?page=5>; rel="last""#;
        assert_eq!(next_page(link), Some("https://api.github.com/user/repos?page=2"));
        let last = r#"<https://api.github.com/user/repos?page=1>; rel="prev", <https://api.github.com/user/repos?page=1>; rel="first""#;
        assert_eq!(next_page(last), None);
        assert_eq!(next_page(""), None);
    }

    /// One canned HTTP response.
    struct Reply {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: String,
    }

    fn reply(status: u16, body: &str) -> Reply {
        Reply {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    /// Loopback HTTP server answering one connection per reply, in order.
    /// Joining the handle yields each raw request it saw.
    struct Stub {
        listener: TcpListener,
    }

    impl Stub {
        fn bind() -> Self {
            Stub {
                listener: TcpListener::bind("127.0.0.1:0").unwrap(),
            }
        }

        fn base(&self) -> String {
            format!("http://{}", self.listener.local_addr().unwrap())
        }

        fn serve(self, replies: Vec<Reply>) -> JoinHandle<Vec<String>> {
            thread::spawn(move || {
                replies
                    .into_iter()
                    .map(|reply| {
                        let (mut stream, _) = self.listener.accept().unwrap();
                        let request = read_request(&mut stream);
                        let mut head = format!(
                            "HTTP/1.1 {} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                            reply.status,
                            reply.body.len()
                        );
                        for (name, value) in &reply.headers {
                            head.push_str(&format!("{}: {}\r\n", name, value));
                        }
                        head.push_str("\r\n");
                        stream.write_all(head.as_bytes()).unwrap();
                        stream.write_all(reply.body.as_bytes()).unwrap();
                        stream.flush().unwrap();
                        request
                    })
                    .collect()
            })
        }
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before headers ended");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map(|v| v.trim().parse::<usize>().unwrap())
            .unwrap_or(0);
        while buf.len() < head_end + body_len {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before body ended");
            buf.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn head_of(request: &str) -> String {
        request.split("\r\n\r\n").next().unwrap().to_ascii_lowercase()
    }

    fn body_of(request: &str) -> serde_json::Value {
        serde_json::from_str(request.split_once("\r\n\r\n").unwrap().1).unwrap()
    }

    fn token() -> Credential {
        Credential::new("ghp_test").unwrap()
    }

    #[test]
    fn current_user_sends_auth_headers_and_needs_200() {
        let stub = Stub::bind();
        let api = client(&stub.base());
        let seen = stub.serve(vec![
            reply(200, r#"{"login":"octo","id":1}"#),
            reply(401, r#"{"message":"Bad credentials"}"#),
        ]);

        assert_eq!(api.current_user(&token()).unwrap().login, "octo");
        match api.current_user(&token()) {
            Err(Error::AuthenticationFailure { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Bad credentials");
            }
            other => panic!("expected AuthenticationFailure, got {:?}", other),
        }

        let requests = seen.join().unwrap();
        let head = head_of(&requests[0]);
        assert!(head.starts_with("get /user http/1.1"));
        assert!(head.contains("authorization: bearer ghp_test"));
        assert!(head.contains("accept: application/vnd.github+json"));
        assert!(head.contains("user-agent: gh-raw-uploader/"));
    }

    #[test]
    fn current_user_rejects_other_success_codes() {
        let stub = Stub::bind();
        let api = client(&stub.base());
        let seen = stub.serve(vec![reply(204, "")]);
        assert!(matches!(
            api.current_user(&token()),
            Err(Error::AuthenticationFailure { status: 204, .. })
        ));
        seen.join().unwrap();
    }

    #[test]
    fn create_repository_needs_201() {
        let stub = Stub::bind();
        let api = client(&stub.base());
        let seen = stub.serve(vec![
            reply(201, r#"{"name":"demo1"}"#),
            reply(200, r#"{"name":"demo1"}"#),
            reply(
                422,
                r#"{"message":"Repository creation failed.","errors":[{"message":"name already exists on this account"}]}"#,
            ),
        ]);
        let req = CreateRepositoryRequest::public("demo1");

        api.create_repository(&token(), &req).unwrap();
        assert!(matches!(
            api.create_repository(&token(), &req),
            Err(Error::CreateFailure { status: 200, .. })
        ));
        match api.create_repository(&token(), &req) {
            Err(Error::CreateFailure { name, status, message }) => {
                assert_eq!((name.as_str(), status), ("demo1", 422));
                assert!(message.contains("name already exists"));
            }
            other => panic!("expected CreateFailure, got {:?}", other),
        }

        let requests = seen.join().unwrap();
        let head = head_of(&requests[0]);
        assert!(head.starts_with("post /user/repos http/1.1"));
        assert!(head.contains("authorization: bearer ghp_test"));
        assert_eq!(
            body_of(&requests[0]),
            serde_json::json!({
                "name": "demo1",
                "description": "Repository created automatically",
                "private": false
            })
        );
    }

    #[test]
    fn put_contents_accepts_200_and_201_only() {
        let stub = Stub::bind();
        let api = client(&stub.base());
        let seen = stub.serve(vec![
            reply(201, "{}"),
            reply(200, "{}"),
            reply(409, r#"{"message":"is at 1a2b but expected 3c4d"}"#),
        ]);
        let req = PutContentsRequest {
            message: "Add a b.txt".into(),
            content: "aGVsbG8=".into(),
        };

        api.put_contents(&token(), "octo", "demo1", "a b.txt", &req).unwrap();
        api.put_contents(&token(), "octo", "demo1", "a b.txt", &req).unwrap();
        match api.put_contents(&token(), "octo", "demo1", "a b.txt", &req) {
            Err(Error::UploadFailure { path, status, .. }) => {
                assert_eq!((path.as_str(), status), ("a b.txt", 409));
            }
            other => panic!("expected UploadFailure, got {:?}", other),
        }

        let requests = seen.join().unwrap();
        let head = head_of(&requests[0]);
        assert!(head.starts_with("put /repos/octo/demo1/contents/a%20b.txt http/1.1"));
        assert!(head.contains("authorization: bearer ghp_test"));
        assert!(head.contains("accept: application/vnd.github+json"));
        assert_eq!(
            body_of(&requests[0]),
            serde_json::json!({ "message": "Add a b.txt", "content": "aGVsbG8=" })
        );
    }

    #[test]
    fn list_repositories_follows_pages_in_order() {
        let stub = Stub::bind();
        let base = stub.base();
        let api = client(&base);
        let mut first = reply(200, r#"[{"name":"x"},{"name":"y"}]"#);
        first.headers.push((
            "Link",
            format!(r#"<{}/user/repos?type=owner&per_page=100&page=2>; rel="next""#, base),
        ));
        let seen = stub.serve(vec![first, reply(200, r#"[{"name":"z"}]"#)]);

        let names: Vec<String> = api
            .list_repositories(&token())
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["x", "y", "z"]);

        let requests = seen.join().unwrap();
        assert!(head_of(&requests[0]).starts_with("get /user/repos?type=owner&per_page=100 http/1.1"));
        assert!(head_of(&requests[1]).starts_with("get /user/repos?type=owner&per_page=100&page=2 http/1.1"));
        assert!(head_of(&requests[1]).contains("authorization: bearer ghp_test"));
    }

    #[test]
    fn list_repositories_failure_is_typed() {
        let stub = Stub::bind();
        let api = client(&stub.base());
        let seen = stub.serve(vec![reply(403, r#"{"message":"Forbidden"}"#)]);
        match api.list_repositories(&token()) {
            Err(Error::ListFailure { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "Forbidden");
            }
            other => panic!("expected ListFailure, got {:?}", other),
        }
        seen.join().unwrap();
    }
}
