use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cfgdex::completion::completions;
use cfgdex::config::Settings;
use cfgdex::diagnostics::DiagnosticBatch;
use cfgdex::document::{line_at, word_at, word_before, DocumentKind};
use cfgdex::function_index::FunctionRecord;
use cfgdex::gotodef::goto_definition;
use cfgdex::hover::hover;
use cfgdex::reparse::ReparseCoordinator;
use cfgdex::workspace::Workspace;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cfgdex")]
#[command(about = "Function index and diagnostics for mission config files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the language server on stdio (default)
    Serve,
    /// Index a workspace once and report its diagnostics
    Check {
        /// Workspace directory (defaults to the current directory)
        dir: Option<PathBuf>,
        /// Print the function table as JSON instead of diagnostics
        #[arg(long)]
        json: bool,
    },
}

struct Backend {
    client: Client,
    workspace: RwLock<Option<Arc<Workspace>>>,
    reparse: ReparseCoordinator<Url>,
}

impl Backend {
    async fn workspace(&self) -> Option<Arc<Workspace>> {
        self.workspace.read().await.clone()
    }

    /// Index every root on a blocking thread and publish the result.
    async fn scan(&self) {
        let Some(workspace) = self.workspace().await else {
            return;
        };

        let indexing = Arc::clone(&workspace);
        match tokio::task::spawn_blocking(move || indexing.index_workspace()).await {
            Ok(batch) => {
                let message = format!(
                    "Indexed {} function(s) in {} root file(s)",
                    workspace.function_count(),
                    workspace.roots().len()
                );
                publish(&self.client, batch).await;
                self.client.log_message(MessageType::INFO, message).await;
            }
            Err(err) => error!("Workspace scan failed: {err}"),
        }
    }

    /// Debounced re-index of whatever `uri` affects.
    async fn schedule_reparse(&self, uri: Url) {
        let Some(workspace) = self.workspace().await else {
            return;
        };

        let client = self.client.clone();
        let key = uri.clone();
        self.reparse.run(key, move || async move {
            match tokio::task::spawn_blocking(move || workspace.parse_document(&uri)).await {
                Ok(batch) => publish(&client, batch).await,
                Err(err) => error!("Reparse failed: {err}"),
            }
        });
    }

    /// The line of the request and the kind of its document.
    async fn request_line(&self, position: &TextDocumentPositionParams) -> Option<(Arc<Workspace>, DocumentKind, String)> {
        let workspace = self.workspace().await?;
        let uri = &position.text_document.uri;
        let text = workspace
            .document_text(uri)
            .or_else(|| std::fs::read_to_string(uri.to_file_path().ok()?).ok())?;
        let line = line_at(&text, position.position)?.to_string();
        Some((workspace, DocumentKind::from_uri(uri), line))
    }
}

async fn publish(client: &Client, batch: DiagnosticBatch) {
    for (uri, diagnostics) in batch {
        client.publish_diagnostics(uri, diagnostics, None).await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let root_dir = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|folder| folder.uri.to_file_path().ok())
            .or_else(|| params.root_uri.as_ref()?.to_file_path().ok())
            .or_else(|| std::env::current_dir().ok());

        if let Some(root_dir) = root_dir {
            let mut settings = Settings::new(&root_dir).unwrap_or_else(|err| {
                warn!("Falling back to default settings: {err:#}");
                Settings::default()
            });
            if let Some(options) = &params.initialization_options {
                if let Err(err) = settings.merge_client_settings(options) {
                    warn!("Ignoring initialization options: {err:#}");
                }
            }

            info!("Workspace root {}", root_dir.display());
            self.reparse
                .set_delay(Duration::from_millis(settings.reparse_delay_ms));
            *self.workspace.write().await = Some(Arc::new(Workspace::new(&root_dir, settings)));
        } else {
            warn!("No workspace root, nothing will be indexed");
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions::default()),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "cfgdex".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.scan().await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(workspace) = self.workspace().await {
            workspace.open_document(uri.clone(), params.text_document.text);
        }
        self.schedule_reparse(uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        if let (Some(workspace), Some(change)) =
            (self.workspace().await, params.content_changes.into_iter().last())
        {
            workspace.update_document(uri.clone(), change.text);
        }
        self.schedule_reparse(uri).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        if let (Some(workspace), Some(text)) = (self.workspace().await, params.text) {
            workspace.update_document(uri.clone(), text);
        }
        self.schedule_reparse(uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(workspace) = self.workspace().await {
            workspace.close_document(&uri);
        }
        self.schedule_reparse(uri).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let Some(workspace) = self.workspace().await else {
            return;
        };

        let mut settings = workspace.settings();
        if let Err(err) = settings.merge_client_settings(&params.settings) {
            warn!("Ignoring configuration change: {err:#}");
            return;
        }
        self.reparse
            .set_delay(Duration::from_millis(settings.reparse_delay_ms));
        workspace.set_settings(settings);
        self.scan().await;
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position = &params.text_document_position;
        let Some((workspace, kind, line)) = self.request_line(position).await else {
            return Ok(None);
        };

        let prefix = word_before(&line, position.position.character as usize);
        let items = completions(&workspace, kind, &prefix);
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = &params.text_document_position_params;
        let Some((workspace, kind, line)) = self.request_line(position).await else {
            return Ok(None);
        };

        Ok(word_at(&line, position.position.character as usize)
            .and_then(|word| hover(&workspace, kind, &word)))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = &params.text_document_position_params;
        let Some((workspace, _, line)) = self.request_line(position).await else {
            return Ok(None);
        };

        let locations = word_at(&line, position.position.character as usize)
            .map(|word| goto_definition(&workspace, &word))
            .unwrap_or_default();
        Ok((!locations.is_empty()).then_some(GotoDefinitionResponse::Array(locations)))
    }
}

fn severity_label(diagnostic: &Diagnostic) -> &'static str {
    match diagnostic.severity {
        Some(DiagnosticSeverity::ERROR) => "error",
        Some(DiagnosticSeverity::WARNING) => "warning",
        Some(DiagnosticSeverity::HINT) => "hint",
        _ => "info",
    }
}

/// Index `dir` once. Returns whether any error was reported.
fn check(dir: &Path, json: bool) -> anyhow::Result<bool> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Cannot open {}", dir.display()))?;
    let settings = Settings::new(&dir)?;
    let workspace = Workspace::new(&dir, settings);
    let batch = workspace.index_workspace();

    if json {
        let table: BTreeMap<String, BTreeMap<String, FunctionRecord>> = workspace
            .roots()
            .iter()
            .filter_map(|root| {
                let map = workspace.function_map(root)?;
                let functions = map
                    .iter()
                    .map(|(key, record)| (key.clone(), record.clone()))
                    .collect();
                Some((root.display().to_string(), functions))
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&table)?);
    } else {
        let reported = batch
            .iter()
            .sorted_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()))
            .flat_map(|(uri, diagnostics)| {
                let file = uri
                    .to_file_path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|_| uri.to_string());
                diagnostics.iter().map(move |diagnostic| {
                    format!(
                        "{}:{}:{}: {}: {}",
                        file,
                        diagnostic.range.start.line + 1,
                        diagnostic.range.start.character + 1,
                        severity_label(diagnostic),
                        diagnostic.message
                    )
                })
            })
            .collect_vec();
        for line in &reported {
            println!("{line}");
        }
        eprintln!(
            "{} function(s), {} diagnostic(s)",
            workspace.function_count(),
            reported.len()
        );
    }

    Ok(batch.error_count() > 0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CFGDEX_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    match cli.command {
        Some(Commands::Check { dir, json }) => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            let had_errors = tokio::task::spawn_blocking(move || check(&dir, json)).await??;
            if had_errors {
                std::process::exit(1);
            }
        }
        Some(Commands::Serve) | None => {
            let stdin = tokio::io::stdin();
            let stdout = tokio::io::stdout();

            let (service, socket) = LspService::new(|client| Backend {
                client,
                workspace: RwLock::new(None),
                reparse: ReparseCoordinator::default(),
            });
            Server::new(stdin, stdout, socket).serve(service).await;
        }
    }

    Ok(())
}
