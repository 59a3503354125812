use std::{fs, path::Path};

use anyhow::Context;
use dotshade::prelude::*;
use serde::Serialize;

use crate::{app::GlobalOptions, output::print_output};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyInfo {
    path: String,
    public_key_token: String,
    public_key: String,
}

pub fn run(out: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let key = StrongNameKey::generate()?;
    fs::write(out, key.export_snk()?)
        .with_context(|| format!("failed to write key pair: {}", out.display()))?;

    let info = KeyInfo {
        path: out.display().to_string(),
        public_key_token: hex::encode(key.public_key_token()),
        public_key: hex::encode(key.public_key_blob()),
    };

    print_output(&info, opts, |info| {
        println!("Wrote {}", info.path);
        println!("Public key token: {}", info.public_key_token);
    })
}
