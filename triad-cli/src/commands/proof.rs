//! Proof command handlers

use crate::config::Config;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use triad_merkle::{leaf_id_to_tree_id_and_triad_id, MerkleProof};

pub async fn handle(action: crate::ProofAction, config: &Config) -> Result<()> {
    match action {
        crate::ProofAction::Prove { snapshot, index, circuit } => {
            let tree = super::load_snapshot(&snapshot, config)?;
            let proof = tree.gen_merkle_path(index)?;

            // stdout carries only the JSON so it can be piped
            let json = if circuit {
                serde_json::to_string_pretty(&proof.to_circuit_signals())?
            } else {
                serde_json::to_string_pretty(&proof)?
            };
            println!("{}", json);
            Ok(())
        }

        crate::ProofAction::Verify { proof } => {
            let content = fs::read_to_string(&proof)
                .with_context(|| format!("Failed to read {}", proof.display()))?;
            let parsed: MerkleProof = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a Merkle proof", proof.display()))?;

            let hasher = config.tree.build_hasher()?;
            if parsed.verify(hasher.as_ref())? {
                println!(
                    "{} Proof for leaf {} is valid",
                    "✓".green().bold(),
                    parsed.leaf_index.to_string().cyan()
                );
                println!("  Root: {}", parsed.root.to_string().cyan());
                Ok(())
            } else {
                println!(
                    "{} Proof for leaf {} does not reach root {}",
                    "✗".red().bold(),
                    parsed.leaf_index,
                    parsed.root.to_string().red()
                );
                bail!("Invalid proof");
            }
        }

        crate::ProofAction::Locate { leaf_id } => {
            let location = leaf_id_to_tree_id_and_triad_id(leaf_id, config.tree.depth)?;
            println!(
                "{} Leaf {} (depth {})",
                "→".cyan().bold(),
                leaf_id.to_string().cyan(),
                config.tree.depth
            );
            println!("  Tree:     {}", location.tree_id);
            println!("  Triad:    {}", location.triad_id);
            println!("  Position: {}", location.position);
            Ok(())
        }
    }
}
