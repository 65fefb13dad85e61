//! Generates the Object Text grammar table and writes it to `OUT_DIR` for the
//! library to embed.

mod grammar;

use std::path::PathBuf;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    println!("cargo:rerun-if-changed=grammar.rs");

    let table = grammar::objecttext().build().context("failed to generate the Object Text grammar")?;
    let blob = table.to_blob().context("failed to encode the grammar table")?;

    let out_dir = PathBuf::from(std::env::var_os("OUT_DIR").context("OUT_DIR is not set")?);
    let path = out_dir.join("objecttext.blob");
    std::fs::write(&path, blob).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
