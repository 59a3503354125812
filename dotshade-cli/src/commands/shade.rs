use std::path::PathBuf;

use anyhow::bail;
use dotshade::prelude::*;
use serde::Serialize;

use crate::{app::GlobalOptions, app::ShadeArgs, commands::common, output::print_output};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureInfo {
    path: PathBuf,
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShadeInfo<'a> {
    public_key_token: String,
    written: &'a [PathBuf],
    failed: Vec<FailureInfo>,
    #[serde(flatten)]
    outputs: &'a HostOutputs,
}

pub fn run(args: &ShadeArgs, opts: &GlobalOptions) -> anyhow::Result<()> {
    let session = common::plan(args)?;
    let report = Rewriter::new(&session.key)
        .with_parallel(session.config.parallel)
        .rewrite(&session.plan);

    let info = ShadeInfo {
        public_key_token: hex::encode(session.key.public_key_token()),
        written: &report.written,
        failed: report
            .errors
            .iter()
            .map(|(path, error)| FailureInfo {
                path: path.clone(),
                error: error.to_string(),
            })
            .collect(),
        outputs: &session.outputs,
    };

    print_output(&info, opts, |info| {
        common::display_outputs(info.outputs);
        println!();
        println!(
            "Wrote {} of {} assemblies, signed with token {}",
            info.written.len(),
            session.plan.len(),
            info.public_key_token
        );
        for failure in &info.failed {
            println!("  FAILED {}: {}", failure.path.display(), failure.error);
        }
    })?;

    if !report.is_success() {
        bail!(
            "{} of {} assemblies could not be shaded",
            report.errors.len(),
            session.plan.len()
        );
    }
    Ok(())
}
