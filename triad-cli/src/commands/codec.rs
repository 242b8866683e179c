//! String codec handlers

use crate::config::Config;
use anyhow::{Context, Result};
use std::io::{self, Read};
use triad_merkle::{compress_string, decompress_string};

pub async fn handle(action: crate::CodecAction, _config: &Config) -> Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;

    match action {
        crate::CodecAction::Compress => {
            println!("{}", compress_string(&input)?);
        }
        crate::CodecAction::Decompress => {
            print!("{}", decompress_string(&input)?);
        }
    }
    Ok(())
}
