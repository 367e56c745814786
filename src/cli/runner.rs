//! CLI runner - executes commands

use crate::auth::AuthConfig;
use crate::cli::commands::{AuthArgs, Cli, Commands};
use crate::config::ClientSettings;
use crate::error::{Error, Result};
use crate::http::{ApiClient, ApiResponse, RequestOptions};
use crate::pagination::{CursorIterable, ListQuery, PathUnwrapper, ResourceClient, ResourceDefinition};
use crate::types::{JsonValue, Params};
use futures::StreamExt;
use reqwest::Method;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command, writing JSON to stdout
    pub async fn run(&self) -> Result<()> {
        self.run_with_output(&mut std::io::stdout()).await
    }

    /// Run the CLI command, writing JSON to `out`
    pub async fn run_with_output<W: Write + Send>(&self, out: &mut W) -> Result<()> {
        let api = Arc::new(self.build_client()?);

        let result = match &self.cli.command {
            Commands::Request {
                path,
                method,
                params,
                body,
            } => {
                self.request(&api, path, method, params, body.as_deref(), out)
                    .await
            }
            Commands::Iterate {
                path,
                params,
                sort_by,
                page_size,
                limit,
                ..
            } => {
                self.iterate(
                    &api,
                    path,
                    params,
                    sort_by.as_deref(),
                    *page_size,
                    *limit,
                    out,
                )
                .await
            }
        };

        api.close().await;
        result
    }

    /// Build the API client from flags and the optional settings file
    fn build_client(&self) -> Result<ApiClient> {
        let base_url = self
            .cli
            .base_url
            .as_ref()
            .ok_or_else(|| Error::config("Base URL not specified (use --base-url)"))?;

        let settings = match &self.cli.settings {
            Some(path) => ClientSettings::from_yaml_file(path)?,
            None => ClientSettings::default(),
        };

        let mut builder = ApiClient::builder(base_url)
            .settings(settings)
            .auth(Self::auth_config(&self.cli.auth).into_strategy()?);

        if let Commands::Iterate {
            results_path,
            cursor_path,
            ..
        } = &self.cli.command
        {
            builder = builder.unwrapper(Arc::new(
                PathUnwrapper::new()
                    .results_path(results_path)
                    .next_cursor_path(cursor_path),
            ));
        }

        builder.build()
    }

    /// Select the auth strategy from flags
    fn auth_config(auth: &AuthArgs) -> AuthConfig {
        if let Some(token) = &auth.token {
            return AuthConfig::StaticToken {
                token: token.clone(),
            };
        }
        match &auth.client_id {
            Some(client_id) => AuthConfig::ClientCredentials {
                client_id: client_id.clone(),
                client_secret: auth.client_secret.clone().unwrap_or_default(),
                token_url: auth.token_url.clone().unwrap_or_default(),
            },
            None => AuthConfig::None,
        }
    }

    /// Send a single request
    async fn request<W: Write + Send>(
        &self,
        api: &ApiClient,
        path: &str,
        method: &str,
        params: &[(String, String)],
        body: Option<&str>,
        out: &mut W,
    ) -> Result<()> {
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| Error::validation(format!("Invalid HTTP method: {method}")))?;

        let mut options = RequestOptions::new().params(Self::collect_params(params));
        if let Some(body) = body {
            let body: JsonValue = serde_json::from_str(body)
                .map_err(|e| Error::validation(format!("Invalid body JSON: {e}")))?;
            options = options.json(body);
        }

        debug!("{method} {path}");
        match api.request::<JsonValue>(method, path, options).await? {
            ApiResponse::Parsed(value) => Self::emit(out, &value),
            ApiResponse::Raw(raw) => {
                writeln!(out, "{}", raw.text())?;
                Ok(())
            }
        }
    }

    /// Follow cursor pagination and emit each item
    #[allow(clippy::too_many_arguments)]
    async fn iterate<W: Write + Send>(
        &self,
        api: &Arc<ApiClient>,
        path: &str,
        params: &[(String, String)],
        sort_by: Option<&str>,
        page_size: Option<u32>,
        limit: Option<usize>,
        out: &mut W,
    ) -> Result<()> {
        let resource: ResourceClient =
            ResourceClient::new(Arc::clone(api), ResourceDefinition::new(path, path));

        let mut query = ListQuery::new();
        for (key, value) in Self::collect_params(params) {
            query = query.filter(key, value);
        }
        if let Some(sort_by) = sort_by {
            query = query.sort_by(sort_by);
        }
        if let Some(size) = page_size {
            query = query.page_size(size);
        }

        let stream = resource.iterate(query);
        let mut stream = match limit {
            Some(limit) => stream.take(limit).boxed(),
            None => stream,
        };

        let mut count = 0usize;
        while let Some(item) = stream.next().await {
            Self::emit(out, &item?.to_json()?)?;
            count += 1;
        }
        debug!("Emitted {count} items from {path}");
        Ok(())
    }

    /// Group `key=value` flags into parameters. A repeated key becomes an array
    /// and is sent as repeated query keys.
    fn collect_params(pairs: &[(String, String)]) -> Params {
        let mut params = Params::new();
        for (key, value) in pairs {
            let value = JsonValue::from(value.as_str());
            match params.remove(key) {
                None => {
                    params.insert(key.clone(), value);
                }
                Some(JsonValue::Array(mut values)) => {
                    values.push(value);
                    params.insert(key.clone(), JsonValue::Array(values));
                }
                Some(first) => {
                    params.insert(key.clone(), JsonValue::Array(vec![first, value]));
                }
            }
        }
        params
    }

    /// Write one JSON document per line
    fn emit<W: Write>(out: &mut W, value: &JsonValue) -> Result<()> {
        writeln!(out, "{}", serde_json::to_string(value)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::parse_key_val;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    async fn run_to_lines(cli: Cli) -> Vec<JsonValue> {
        let mut out = Vec::new();
        Runner::new(cli).run_with_output(&mut out).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("search=graphene").unwrap(),
            ("search".to_string(), "graphene".to_string())
        );
        assert_eq!(
            parse_key_val("filter=a=b").unwrap(),
            ("filter".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_repeated_params_become_arrays() {
        let pairs = vec![
            ("type".to_string(), "a".to_string()),
            ("q".to_string(), "x".to_string()),
            ("type".to_string(), "b".to_string()),
            ("type".to_string(), "c".to_string()),
        ];
        let params = Runner::collect_params(&pairs);
        assert_eq!(params["type"], json!(["a", "b", "c"]));
        assert_eq!(params["q"], json!("x"));
    }

    #[tokio::test]
    async fn test_request_sends_repeated_param_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        run_to_lines(parse(&[
            "bibliofabric",
            "--base-url",
            &server.uri(),
            "request",
            "items",
            "-p",
            "type=a",
            "-p",
            "type=b",
        ]))
        .await;

        let requests = server.received_requests().await.unwrap();
        let types: Vec<String> = requests[0]
            .url
            .query_pairs()
            .filter(|(k, _)| k == "type")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(types, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_cli_parses_request() {
        let cli = parse(&[
            "bibliofabric",
            "--base-url",
            "https://api.example.com",
            "request",
            "items",
            "-X",
            "POST",
            "--param",
            "a=1",
            "--param",
            "b=2",
        ]);
        match cli.command {
            Commands::Request { path, method, params, body } => {
                assert_eq!(path, "items");
                assert_eq!(method, "POST");
                assert_eq!(params.len(), 2);
                assert!(body.is_none());
            }
            Commands::Iterate { .. } => panic!("expected request"),
        }
    }

    #[test]
    fn test_cli_iterate_defaults() {
        let cli = parse(&["bibliofabric", "iterate", "items"]);
        match cli.command {
            Commands::Iterate {
                results_path,
                cursor_path,
                limit,
                ..
            } => {
                assert_eq!(results_path, "results");
                assert_eq!(cursor_path, "header.nextCursor");
                assert!(limit.is_none());
            }
            Commands::Request { .. } => panic!("expected iterate"),
        }
    }

    #[test]
    fn test_client_id_requires_secret_and_url() {
        assert!(Cli::try_parse_from(["bibliofabric", "--client-id", "id", "iterate", "x"]).is_err());
    }

    #[test]
    fn test_auth_selection() {
        let token = AuthArgs {
            token: Some("t".to_string()),
            ..AuthArgs::default()
        };
        assert_eq!(
            Runner::auth_config(&token),
            AuthConfig::StaticToken {
                token: "t".to_string()
            }
        );
        assert_eq!(Runner::auth_config(&AuthArgs::default()), AuthConfig::None);
    }

    #[tokio::test]
    async fn test_missing_base_url_is_config_error() {
        let cli = Cli {
            base_url: None,
            ..parse(&["bibliofabric", "request", "items"])
        };
        let mut out = Vec::new();
        let err = Runner::new(cli).run_with_output(&mut out).await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_request_prints_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/1"))
            .and(query_param("expand", "true"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .mount(&server)
            .await;

        let lines = run_to_lines(parse(&[
            "bibliofabric",
            "--base-url",
            &server.uri(),
            "--token",
            "secret",
            "request",
            "items/1",
            "--param",
            "expand=true",
        ]))
        .await;

        assert_eq!(lines, vec![json!({"id": 1})]);
    }

    #[tokio::test]
    async fn test_iterate_follows_cursor_with_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("cursor", "*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"next": "c2"},
                "data": [{"id": 1}, {"id": 2}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("cursor", "c2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {},
                "data": [{"id": 3}, {"id": 4}]
            })))
            .mount(&server)
            .await;

        let lines = run_to_lines(parse(&[
            "bibliofabric",
            "--base-url",
            &server.uri(),
            "iterate",
            "items",
            "--results-path",
            "data",
            "--cursor-path",
            "meta.next",
            "--limit",
            "3",
        ]))
        .await;

        assert_eq!(lines, vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
    }
}
