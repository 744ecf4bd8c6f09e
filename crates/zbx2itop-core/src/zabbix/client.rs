//! Zabbix JSON-RPC client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::host::ZabbixHost;
use super::{HostQuery, HostSource};
use crate::config::ZabbixOptions;
use crate::error::{ExportError, Result};

const API_ENDPOINT: &str = "api_jsonrpc.php";

/// JSON-RPC request envelope.
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

impl From<RpcError> for ExportError {
    fn from(e: RpcError) -> Self {
        ExportError::Api {
            code: e.code,
            message: e.message,
            data: match e.data {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            },
        }
    }
}

/// How the client authenticates.
#[derive(Debug, Clone)]
enum Session {
    /// Not logged in yet.
    None,
    /// API token from the config; never logged out.
    Token(String),
    /// Session id from `user.login`.
    Login(String),
}

/// HTTP client for the Zabbix API.
pub struct ZabbixClient {
    client: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
    session: Session,
}

impl ZabbixClient {
    /// Create a client for the configured frontend URL.
    pub fn new(options: &ZabbixOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .danger_accept_invalid_certs(!options.verify_tls)
            .build()?;

        Ok(Self::with_client(client, &options.url))
    }

    /// Create a client with a custom reqwest client.
    pub fn with_client(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            endpoint: api_endpoint(url),
            next_id: AtomicU64::new(1),
            session: Session::None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Authenticate with a token or with user/password.
    pub async fn login(&mut self, options: &ZabbixOptions) -> Result<()> {
        if let Some(token) = options.token.as_deref().filter(|t| !t.is_empty()) {
            tracing::debug!(endpoint = %self.endpoint, "Using API token");
            self.session = Session::Token(token.to_string());
            return Ok(());
        }

        let user = options.user.clone().unwrap_or_default();
        let params = json!({
            "username": user,
            "password": options.password.clone().unwrap_or_default(),
        });
        let result = self.call("user.login", params).await?;
        let session_id = result.as_str().ok_or_else(|| {
            ExportError::Json(format!("user.login returned a non-string result: {}", result))
        })?;

        tracing::info!(endpoint = %self.endpoint, user = %user, "Logged in to Zabbix");
        self.session = Session::Login(session_id.to_string());
        Ok(())
    }

    /// End a `user.login` session. Token sessions are left alone.
    pub async fn logout(&mut self) -> Result<()> {
        if let Session::Login(_) = self.session {
            self.call("user.logout", json!([])).await?;
            tracing::debug!("Logged out of Zabbix");
        }
        self.session = Session::None;
        Ok(())
    }

    /// Call an API method and return its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        tracing::debug!(method, id = request.id, "Zabbix API call");

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Session::Token(auth) | Session::Login(auth) = &self.session {
            if method != "user.login" && method != "apiinfo.version" {
                builder = builder.bearer_auth(auth);
            }
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Http(format!("Status {}: {}", status, body)));
        }

        let body: RpcResponse = response.json().await?;
        parse_response(method, body)
    }
}

fn parse_response(method: &str, body: RpcResponse) -> Result<Value> {
    if let Some(error) = body.error {
        return Err(error.into());
    }
    body.result
        .ok_or_else(|| ExportError::Json(format!("{} response has neither result nor error", method)))
}

/// Append `api_jsonrpc.php` unless the URL already points at it.
pub fn api_endpoint(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with(API_ENDPOINT) {
        trimmed.to_string()
    } else {
        format!("{}/{}", trimmed, API_ENDPOINT)
    }
}

/// Pull one id field out of every object in a `*.get` result.
fn collect_ids(result: &Value, field: &str) -> Vec<String> {
    result
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item.get(field))
        .filter_map(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

/// Build `host.get` parameters listing candidate host ids.
pub fn host_id_params(query: &HostQuery) -> Value {
    let mut params = json!({ "output": ["hostid"] });
    if let Some(ids) = &query.group_ids {
        params["groupids"] = json!(ids);
    }
    if let Some(ids) = &query.template_ids {
        params["templateids"] = json!(ids);
    }
    if !query.tags.is_empty() {
        params["tags"] = query
            .tags
            .iter()
            .map(|t| json!({ "tag": t.name, "value": t.value, "operator": 0 }))
            .collect();
    }
    params
}

/// Build `host.get` parameters fetching full host details.
pub fn host_detail_params(ids: &[String]) -> Value {
    json!({
        "hostids": ids,
        "selectInventory": "extend",
        "selectHostGroups": "extend",
        "selectTags": "extend",
        "selectParentTemplates": ["templateid", "name"],
        "selectInterfaces": "extend",
        "selectInheritedTags": "extend",
    })
}

#[async_trait]
impl HostSource for ZabbixClient {
    async fn resolve_group_ids(&self, names: &[String]) -> Result<Vec<String>> {
        let result = self
            .call(
                "hostgroup.get",
                json!({ "output": ["groupid"], "filter": { "name": names } }),
            )
            .await?;
        Ok(collect_ids(&result, "groupid"))
    }

    async fn resolve_template_ids(&self, names: &[String]) -> Result<Vec<String>> {
        let result = self
            .call(
                "template.get",
                json!({ "output": ["templateid"], "filter": { "host": names } }),
            )
            .await?;
        Ok(collect_ids(&result, "templateid"))
    }

    async fn list_host_ids(&self, query: &HostQuery) -> Result<Vec<String>> {
        let result = self.call("host.get", host_id_params(query)).await?;
        Ok(collect_ids(&result, "hostid"))
    }

    async fn fetch_hosts(&self, ids: &[String]) -> Result<Vec<ZabbixHost>> {
        let result = self.call("host.get", host_detail_params(ids)).await?;
        match result {
            Value::Array(items) => Ok(items.into_iter().map(ZabbixHost::from_value).collect()),
            other => Err(ExportError::Json(format!(
                "host.get returned a non-array result: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagFilter;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// A request seen by the stub server.
    #[derive(Debug)]
    struct Seen {
        auth: Option<String>,
        body: Value,
    }

    /// Serve JSON-RPC over plain HTTP on a local port.
    ///
    /// `reply` returns the `result` or `error` part of the response for a method.
    async fn stub_server(reply: fn(&str) -> Value) -> (String, Arc<Mutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let mut reader = BufReader::new(stream);
                    let mut auth = None;
                    let mut length = 0;
                    loop {
                        let mut line = String::new();
                        if reader.read_line(&mut line).await.unwrap() == 0 {
                            return;
                        }
                        let line = line.trim_end();
                        if line.is_empty() {
                            break;
                        }
                        if let Some((name, value)) = line.split_once(':') {
                            match name.to_ascii_lowercase().as_str() {
                                "authorization" => auth = Some(value.trim().to_string()),
                                "content-length" => length = value.trim().parse().unwrap(),
                                _ => {}
                            }
                        }
                    }

                    let mut raw = vec![0; length];
                    reader.read_exact(&mut raw).await.unwrap();
                    let body: Value = serde_json::from_slice(&raw).unwrap();

                    let mut response = reply(body["method"].as_str().unwrap_or_default());
                    response["jsonrpc"] = json!("2.0");
                    response["id"] = body["id"].clone();
                    let response = response.to_string();

                    log.lock().unwrap().push(Seen { auth, body });

                    let mut stream = reader.into_inner();
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        response.len()
                    );
                    stream.write_all(head.as_bytes()).await.unwrap();
                    stream.write_all(response.as_bytes()).await.unwrap();
                    stream.shutdown().await.ok();
                });
            }
        });

        (url, seen)
    }

    fn zabbix_reply(method: &str) -> Value {
        match method {
            "user.login" => json!({ "result": "SID" }),
            "user.logout" => json!({ "result": true }),
            "apiinfo.version" => json!({ "result": "7.0.0" }),
            _ => json!({ "result": [] }),
        }
    }

    fn local_client(options: &ZabbixOptions) -> ZabbixClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        ZabbixClient::with_client(http, &options.url)
    }

    fn options(url: &str) -> ZabbixOptions {
        ZabbixOptions {
            url: url.to_string(),
            ..ZabbixOptions::default()
        }
    }

    #[tokio::test]
    async fn test_password_session_logs_in_and_out() {
        let (url, seen) = stub_server(zabbix_reply).await;
        let options = ZabbixOptions {
            user: Some("reader".to_string()),
            password: Some("secret".to_string()),
            ..options(&url)
        };

        let mut client = local_client(&options);
        client.login(&options).await.unwrap();
        client.logout().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);

        assert_eq!(seen[0].body["method"], "user.login");
        assert_eq!(seen[0].body["jsonrpc"], "2.0");
        assert_eq!(seen[0].body["id"], 1);
        assert_eq!(
            seen[0].body["params"],
            json!({"username": "reader", "password": "secret"})
        );
        assert_eq!(seen[0].auth, None);

        assert_eq!(seen[1].body["method"], "user.logout");
        assert_eq!(seen[1].body["id"], 2);
        assert_eq!(seen[1].body["params"], json!([]));
        assert_eq!(seen[1].auth.as_deref(), Some("Bearer SID"));
    }

    #[tokio::test]
    async fn test_token_session_is_never_logged_out() {
        let (url, seen) = stub_server(zabbix_reply).await;
        let options = ZabbixOptions {
            token: Some("TOK".to_string()),
            user: Some("ignored".to_string()),
            ..options(&url)
        };

        let mut client = local_client(&options);
        client.login(&options).await.unwrap();
        let ids = client.list_host_ids(&HostQuery::default()).await.unwrap();
        assert!(ids.is_empty());
        client.logout().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].body["method"], "host.get");
        assert_eq!(seen[0].auth.as_deref(), Some("Bearer TOK"));
    }

    #[tokio::test]
    async fn test_request_ids_increase_and_version_is_unauthenticated() {
        let (url, seen) = stub_server(zabbix_reply).await;
        let options = ZabbixOptions {
            token: Some("TOK".to_string()),
            ..options(&url)
        };

        let mut client = local_client(&options);
        client.login(&options).await.unwrap();
        assert_eq!(
            client.call("apiinfo.version", json!([])).await.unwrap(),
            json!("7.0.0")
        );
        client.call("host.get", json!({})).await.unwrap();
        client.call("host.get", json!({})).await.unwrap();

        let seen = seen.lock().unwrap();
        let ids: Vec<u64> = seen.iter().filter_map(|s| s.body["id"].as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(seen[0].auth, None);
        assert_eq!(seen[1].auth.as_deref(), Some("Bearer TOK"));
    }

    #[tokio::test]
    async fn test_failed_login_maps_api_error() {
        let (url, seen) = stub_server(|_| {
            json!({
                "error": {
                    "code": -32602,
                    "message": "Invalid params.",
                    "data": "Incorrect user name or password or account is temporarily blocked."
                }
            })
        })
        .await;
        let options = ZabbixOptions {
            user: Some("reader".to_string()),
            password: Some("wrong".to_string()),
            ..options(&url)
        };

        let mut client = local_client(&options);
        match client.login(&options).await {
            Err(ExportError::Api { code, data, .. }) => {
                assert_eq!(code, -32602);
                assert!(data.starts_with("Incorrect user name"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        client.logout().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_api_endpoint() {
        assert_eq!(
            api_endpoint("https://zabbix.example.com"),
            "https://zabbix.example.com/api_jsonrpc.php"
        );
        assert_eq!(
            api_endpoint("https://zabbix.example.com/zabbix/"),
            "https://zabbix.example.com/zabbix/api_jsonrpc.php"
        );
        assert_eq!(
            api_endpoint("https://zabbix.example.com/api_jsonrpc.php"),
            "https://zabbix.example.com/api_jsonrpc.php"
        );
    }

    #[test]
    fn test_parse_response() {
        let ok: RpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "result": "abc", "id": 1})).unwrap();
        assert_eq!(parse_response("user.login", ok).unwrap(), json!("abc"));

        let err: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "error": {"code": -32602, "message": "Invalid params.", "data": "Incorrect user name or password."},
            "id": 1
        }))
        .unwrap();
        match parse_response("user.login", err) {
            Err(ExportError::Api { code, data, .. }) => {
                assert_eq!(code, -32602);
                assert_eq!(data, "Incorrect user name or password.");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let empty: RpcResponse = serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        assert!(matches!(parse_response("host.get", empty), Err(ExportError::Json(_))));
    }

    #[test]
    fn test_collect_ids() {
        let result = json!([{"groupid": "2"}, {"groupid": 7}, {"other": "x"}]);
        assert_eq!(collect_ids(&result, "groupid"), vec!["2", "7"]);
        assert!(collect_ids(&json!({}), "groupid").is_empty());
    }

    #[test]
    fn test_host_id_params() {
        let query = HostQuery::default();
        assert_eq!(host_id_params(&query), json!({"output": ["hostid"]}));

        let query = HostQuery {
            group_ids: Some(vec!["2".to_string()]),
            template_ids: Some(vec!["10001".to_string()]),
            tags: vec![TagFilter::parse("env=prod").unwrap()],
        };
        let params = host_id_params(&query);
        assert_eq!(params["groupids"], json!(["2"]));
        assert_eq!(params["templateids"], json!(["10001"]));
        assert_eq!(
            params["tags"],
            json!([{"tag": "env", "value": "prod", "operator": 0}])
        );
    }

    #[test]
    fn test_host_detail_params() {
        let params = host_detail_params(&["1".to_string(), "2".to_string()]);
        assert_eq!(params["hostids"], json!(["1", "2"]));
        assert_eq!(params["selectInventory"], json!("extend"));
        assert_eq!(params["selectParentTemplates"], json!(["templateid", "name"]));
    }

    #[test]
    fn test_client_endpoint() {
        let client = ZabbixClient::with_client(reqwest::Client::new(), "http://localhost/zabbix");
        assert_eq!(client.endpoint(), "http://localhost/zabbix/api_jsonrpc.php");
    }
}
