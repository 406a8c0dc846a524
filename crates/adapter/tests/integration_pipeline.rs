use anyhow::Context as _;
use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::routing::get;
use openapi_mcp_adapter::{AdapterConfig, App};
use openapi_mcp_tools::chain::CallContext;
use openapi_mcp_tools::live_reload::{LiveReload, ReloadOutcome};
use openapi_mcp_tools::publish::ToolServer;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn petstore(base: &str) -> String {
    format!(
        r#"
openapi: 3.0.3
info: {{title: Pets, version: "1.0.0"}}
servers:
  - url: {base}/api
paths:
  /pets/{{petId}}:
    get:
      operationId: getPetById
      summary: Find pet by ID
      parameters:
        - {{name: petId, in: path, required: true, schema: {{type: integer}}}}
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema: {{$ref: '#/components/schemas/Pet'}}
              example: {{id: 7, name: Mock}}
  /pets:
    post:
      operationId: addPet
      security:
        - petstore_auth: [write:pets, read:pets]
      requestBody:
        required: true
        content:
          application/json:
            schema: {{$ref: '#/components/schemas/Pet'}}
      responses: {{"200": {{description: ok}}}}
components:
  securitySchemes:
    petstore_auth:
      type: oauth2
      flows:
        implicit:
          authorizationUrl: https://auth.example.com/authorize
          scopes: {{write:pets: write, read:pets: read}}
  schemas:
    Pet:
      type: object
      required: [name]
      properties:
        id: {{type: integer}}
        name: {{type: string}}
"#
    )
}

async fn spawn_backend() -> anyhow::Result<String> {
    let app = Router::new().route(
        "/api/pets/{id}",
        get(|Path(id): Path<u64>| async move { Json(json!({"id": id, "name": "Rex"})) }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.context("bind backend")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn text(result: &rmcp::model::CallToolResult) -> String {
    result.content[0]
        .as_text()
        .map(|t| t.text.clone())
        .unwrap_or_default()
}

#[tokio::test]
async fn spec_file_to_downstream_call() -> anyhow::Result<()> {
    let base = spawn_backend().await?;
    let dir = tempdir()?;
    let spec = dir.path().join("petstore.yaml");
    std::fs::write(&spec, petstore(&base))?;
    let cfg = dir.path().join("adapter.yaml");
    std::fs::write(
        &cfg,
        format!(
            "openApiUrl: {}\nscopeDiscovery: {{enabled: true, calculateMinimalScopes: greedy}}\n",
            spec.display()
        ),
    )?;

    let app = App::build(AdapterConfig::load(Some(&cfg), None)?).await?;
    assert_eq!(app.published().tool_names(), vec!["getpetbyid", "addpet"]);

    let tools = app.published().list_tools();
    let add = tools.iter().find(|t| t.name == "addpet").context("addpet")?;
    assert_eq!(add.input_schema["properties"]["name"]["type"], "string");
    assert_eq!(add.input_schema["required"], json!(["name"]));

    let result = app
        .published()
        .call_tool(
            "getpetbyid",
            json!({"petId": 42}).as_object().cloned(),
            CallContext::default(),
        )
        .await;
    assert_ne!(result.is_error, Some(true), "{}", text(&result));
    let body: Value = serde_json::from_str(&text(&result))?;
    assert_eq!(body, json!({"id": 42, "name": "Rex"}));

    let scopes = app.scopes().context("scopes enabled")?;
    assert_eq!(scopes.len(), 1);

    assert!(app.start_live_reload(&CancellationToken::new())?.is_none());
    Ok(())
}

#[tokio::test]
async fn scopes_follow_live_reload() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let spec = dir.path().join("petstore.yaml");
    std::fs::write(&spec, petstore("http://127.0.0.1:9"))?;
    let cfg = dir.path().join("adapter.yaml");
    std::fs::write(
        &cfg,
        format!(
            "openApiUrl: {}\nscopeDiscovery: {{enabled: true, calculateMinimalScopes: greedy}}\n",
            spec.display()
        ),
    )?;

    let app = App::build(AdapterConfig::load(Some(&cfg), None)?).await?;
    let before = app.scopes().context("scopes enabled")?;
    assert_eq!(*before, BTreeSet::from(["read:pets".to_string()]));

    std::fs::write(
        &spec,
        petstore("http://127.0.0.1:9")
            .replace(r#"version: "1.0.0""#, r#"version: "2.0.0""#)
            .replace("[write:pets, read:pets]", "[admin:pets]"),
    )?;
    let reload = LiveReload::new(
        Arc::clone(app.tools()),
        Arc::clone(app.published()) as Arc<dyn ToolServer>,
        1,
        CancellationToken::new(),
    );
    assert_eq!(
        reload.run_cycle().await,
        ReloadOutcome::ToolsUpdated { removed: 0, upserted: 0 }
    );

    let after = app.scopes().context("scopes enabled")?;
    assert_eq!(*after, BTreeSet::from(["admin:pets".to_string()]));
    assert_eq!(app.catalog_json()["scopes"], json!(["admin:pets"]));
    Ok(())
}

#[tokio::test]
async fn mock_mode_and_live_reload_task() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let spec = dir.path().join("petstore.yaml");
    std::fs::write(&spec, petstore("http://127.0.0.1:9"))?;
    let cfg = dir.path().join("adapter.yaml");
    std::fs::write(
        &cfg,
        format!(
            "openApiUrl: {}\nsessionMode: stateless\ntools: {{mock: true}}\nliveReload: {{enabled: true, cronExpression: '0 0 0 1 1 * 2099'}}\n",
            spec.display()
        ),
    )?;

    let app = App::build(AdapterConfig::load(Some(&cfg), None)?).await?;
    let result = app
        .published()
        .call_tool("getpetbyid", None, CallContext::default())
        .await;
    assert_eq!(text(&result), r#"{"id":7,"name":"Mock"}"#);

    let cancel = CancellationToken::new();
    let handle = app.start_live_reload(&cancel)?.context("scheduler")?;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await??;
    Ok(())
}

#[test]
fn print_tools_dumps_the_catalog() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let spec = dir.path().join("petstore.yaml");
    std::fs::write(&spec, petstore("http://127.0.0.1:9"))?;

    let output = Command::new(env!("CARGO_BIN_EXE_openapi-mcp-adapter"))
        .arg("--spec")
        .arg(&spec)
        .arg("--print-tools")
        .env_remove("OPENAPI_MCP_CONFIG")
        .output()
        .context("run adapter")?;
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let catalog: Value = serde_json::from_slice(&output.stdout)?;
    let names: Vec<&str> = catalog["tools"]
        .as_array()
        .context("tools array")?
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["getpetbyid", "addpet"]);
    assert_eq!(catalog["tools"][0]["annotations"]["readOnlyHint"], true);
    assert!(catalog["scopes"].is_null());
    Ok(())
}
