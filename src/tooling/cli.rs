//! CLI Tooling
//!
//! Read-only inspection of a container: the node tree, attributes of one node,
//! the logical keys of a collection, and the stamped schema version.

use crate::config::{ConfigLoader, StashConfig};
use crate::error::StoreError;
use crate::migration;
use crate::store::{Container, Node};
use crate::views;
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;
use std::path::PathBuf;

/// Nodestash CLI - inspect typed record containers
#[derive(Parser)]
#[command(name = "nodestash")]
#[command(about = "Inspect containers written by the nodestash persistence layer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store directory (overrides storage.path from configuration)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Configuration file path (layered over the global config file)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Fold the logging flags into a loaded configuration
    pub fn apply_overrides(&self, config: &mut StashConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.logging.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
        if let Some(store) = &self.store {
            config.storage.path = Some(store.clone());
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the node tree below a path
    Tree {
        /// Node path, relative to the root
        #[arg(default_value = "/")]
        path: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the attributes of one node
    Attrs {
        #[arg(default_value = "/")]
        path: String,
    },
    /// List the logical keys of a dict or list collection
    Keys { path: String },
    /// Show the schema version stamped on the root
    Version,
}

/// Opened container plus the configuration it came from
pub struct CliContext {
    container: Container,
    config: StashConfig,
}

impl CliContext {
    /// Load configuration and open the configured container
    pub fn new(store: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<Self, StoreError> {
        let mut config = ConfigLoader::load_with(config_path.as_deref())?;
        if let Some(store) = store {
            config.storage.path = Some(store);
        }
        Self::from_config(config)
    }

    pub fn from_config(config: StashConfig) -> Result<Self, StoreError> {
        let container = Container::open(&config.storage)?;
        tracing::debug!(backend = ?config.storage.backend, "opened container");
        Ok(Self { container, config })
    }

    /// Wrap an already open container
    pub fn with_container(container: Container) -> Self {
        Self {
            container,
            config: StashConfig::default(),
        }
    }

    pub fn config(&self) -> &StashConfig {
        &self.config
    }

    fn resolve(&self, path: &str) -> Result<Node, StoreError> {
        let node = self.container.root().descend(path)?;
        if !node.exists()? {
            return Err(StoreError::KeyNotFound(node.path().to_string()));
        }
        Ok(node)
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, StoreError> {
        match command {
            Commands::Tree { path, format } => {
                let node = self.resolve(path)?;
                match format.as_str() {
                    "text" => {
                        let mut out = String::new();
                        render_tree_text(&node, 0, &mut out)?;
                        Ok(out.trim_end().to_string())
                    }
                    "json" => {
                        let tree = render_tree_json(&node)?;
                        serde_json::to_string_pretty(&tree)
                            .map_err(|e| StoreError::Config(format!("Failed to render JSON: {}", e)))
                    }
                    other => Err(StoreError::Config(format!(
                        "Invalid format: {} (must be 'text' or 'json')",
                        other
                    ))),
                }
            }
            Commands::Attrs { path } => {
                let node = self.resolve(path)?;
                let attrs = node.attrs()?;
                if attrs.is_empty() {
                    return Ok(format!("{}: no attributes", node.path()));
                }
                let mut table = Table::new();
                table.load_preset(UTF8_BORDERS_ONLY);
                table.set_header(vec!["Name", "Type", "Value"]);
                for (name, value) in attrs {
                    table.add_row(vec![name, value.type_name().to_string(), value.to_string()]);
                }
                Ok(table.to_string())
            }
            Commands::Keys { path } => {
                let node = self.resolve(path)?;
                let keys = views::read_manifest(&node)?.unwrap_or_default();
                let kind = node
                    .str_attr(views::COLLECTION_ATTR)?
                    .unwrap_or_else(|| "collection".to_string());
                let mut out = format!("{} {} ({} keys)", kind, node.path(), keys.len());
                for key in keys {
                    out.push_str("\n  ");
                    out.push_str(&key);
                }
                Ok(out)
            }
            Commands::Version => {
                let version = migration::stored_version(&self.container.root())?;
                Ok(format!("Schema version: {}", version))
            }
        }
    }
}

fn describe(node: &Node) -> Result<String, StoreError> {
    let mut label = node.name().to_string();
    if let Some(dataset) = node.dataset()? {
        label.push_str(&format!(" [{}]", dataset.shape_label()));
    }
    if let Some(kind) = node.str_attr(crate::codec::record::TYPE_ATTR).ok().flatten() {
        label.push_str(&format!(" <{}>", kind));
    }
    Ok(label)
}

fn render_tree_text(node: &Node, depth: usize, out: &mut String) -> Result<(), StoreError> {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&describe(node)?);
    out.push('\n');
    for name in node.children()? {
        render_tree_text(&node.child(&name)?, depth + 1, out)?;
    }
    Ok(())
}

fn render_tree_json(node: &Node) -> Result<serde_json::Value, StoreError> {
    let attrs: serde_json::Map<String, serde_json::Value> = node
        .attrs()?
        .into_iter()
        .map(|(name, value)| (name, json!(value.to_string())))
        .collect();
    let children = node
        .children()?
        .iter()
        .map(|name| render_tree_json(&node.child(name)?))
        .collect::<Result<Vec<_>, StoreError>>()?;
    let dataset = node.dataset()?.map(|d| d.shape_label());
    Ok(json!({
        "path": node.path(),
        "attrs": attrs,
        "dataset": dataset,
        "children": children,
    }))
}
