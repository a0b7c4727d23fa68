//! `mapping` commands

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Subcommand;

use super::output::Output;
use crate::storage::ContentMapping;

#[derive(Subcommand)]
pub enum MappingCommands {
    /// List every source -> destination pair in a mapping file
    Show {
        /// Mapping file
        file: PathBuf,
    },

    /// Print the destination ID for a source ID
    Get {
        /// Mapping file
        file: PathBuf,

        /// Source content item ID
        id: String,
    },
}

pub fn run(cmd: MappingCommands, output: &Output) -> Result<bool> {
    match cmd {
        MappingCommands::Show { file } => show(output, &file),
        MappingCommands::Get { file, id } => get(output, &file, &id),
    }
}

fn show(output: &Output, file: &Path) -> Result<bool> {
    let mapping = ContentMapping::load(file)?;

    if output.is_json() {
        let pairs: Vec<_> = mapping
            .entries()
            .iter()
            .map(|(source, destination)| {
                serde_json::json!({
                    "source": source,
                    "destination": destination,
                })
            })
            .collect();
        output.data(&pairs);
    } else if mapping.is_empty() {
        println!("No mappings in {}", file.display());
    } else {
        for (source, destination) in mapping.entries() {
            output.row(&[source.as_str(), destination.as_str()]);
        }
        println!();
        println!("{} mapping(s)", mapping.len());
    }

    Ok(true)
}

fn get(output: &Output, file: &Path, id: &str) -> Result<bool> {
    let mapping = ContentMapping::load(file)?;

    let Some(destination) = mapping.get(id) else {
        output.error(&format!("No mapping for {}", id));
        return Ok(false);
    };

    if output.is_json() {
        output.data(&serde_json::json!({
            "source": id,
            "destination": destination,
        }));
    } else {
        println!("{}", destination);
    }

    Ok(true)
}
