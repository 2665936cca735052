//! Example process host embedding `ten-runtime`: loads a `TenAppConfig`,
//! builds one `App`, registers the addons it knows about, and runs until
//! asked to shut down. Not a CLI — behavior is driven entirely by
//! `CONFIG_PATH` and `RUST_LOG`.

mod config;

use std::sync::Arc;

use async_trait::async_trait;
use ten_runtime::addon::{AddonRegistry, ExtensionFactory};
use ten_runtime::extension::{Extension, ExtensionCtx};
use ten_runtime::msg::Message;
use ten_runtime::Result;
use tooling::error::{format_error_chain, ErrorContext};

use config::TenAppConfig;

/// Read and parse one predefined-graph file, reporting the full cause chain
/// on failure rather than just the innermost error.
fn load_predefined_graph(path: &str) -> std::result::Result<ten_runtime::graph_def::GraphDecl, Box<dyn std::error::Error + Send + Sync>> {
    let contents = std::fs::read_to_string(path).context(format!("failed to read predefined graph file: {path}"))?;
    let json: serde_json::Value =
        serde_json::from_str(&contents).context(format!("predefined graph file is not valid JSON: {path}"))?;
    ten_runtime::graph_def::GraphDecl::parse(&json)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
        .context(format!("failed to parse predefined graph: {path}"))
}

/// A trivial extension registered by default so the host has something to
/// route to out of the box: answers every command with an `"ok"` result.
struct EchoExtension;

#[async_trait]
impl Extension for EchoExtension {
    async fn on_cmd(&mut self, ctx: &mut ExtensionCtx, cmd: Message) -> Result<()> {
        let cmd_id = cmd.cmd_id.clone().unwrap_or_default();
        ctx.return_result(Message::ok_result(cmd_id, "ok"));
        Ok(())
    }
}

struct EchoFactory;

#[async_trait]
impl ExtensionFactory for EchoFactory {
    async fn on_create_instance(&self, _instance_name: &str) -> Result<Box<dyn Extension>> {
        Ok(Box::new(EchoExtension))
    }
}

fn register_builtin_addons(registry: &AddonRegistry) {
    registry.register_extension("echo", Arc::new(EchoFactory));
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    tracing::info!("loading ten-app configuration");
    let config = TenAppConfig::load();
    tracing::info!(app_uri = %config.app_uri, log_filter = %config.log_filter, "configuration loaded");

    let mut app = ten_runtime::app::App::new(config.app_uri.clone());
    register_builtin_addons(&app.addons);

    for path in &config.predefined_graph_paths {
        match load_predefined_graph(path) {
            Ok(decl) => app.predefined_graph_infos.push(ten_runtime::app::PredefinedGraphInfo {
                name: decl.predefined_graph.clone(),
                graph: decl,
                auto_start: false,
            }),
            Err(e) => tracing::warn!(path = %path, "skipping predefined graph:\n{}", format_error_chain(&*e)),
        }
    }

    tracing::info!(
        app_uri = %app.uri,
        predefined_graphs = app.predefined_graph_infos.len(),
        "ten-app ready"
    );

    shutdown_signal().await;
    tracing::info!("shutdown signal received, closing app");
    app.begin_close();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received CTRL-C");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM");
        }
    }
}
