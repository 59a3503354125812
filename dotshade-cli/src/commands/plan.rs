use dotshade::prelude::*;
use serde::Serialize;

use crate::{app::GlobalOptions, app::ShadeArgs, commands::common, output::print_output};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanInfo<'a> {
    target_framework: &'a str,
    public_key_token: String,
    #[serde(flatten)]
    outputs: &'a HostOutputs,
}

pub fn run(args: &ShadeArgs, opts: &GlobalOptions) -> anyhow::Result<()> {
    let session = common::plan(args)?;

    let info = PlanInfo {
        target_framework: &session.config.target_framework,
        public_key_token: hex::encode(session.key.public_key_token()),
        outputs: &session.outputs,
    };

    print_output(&info, opts, |info| {
        println!("Target framework: {}", info.target_framework);
        println!("Public key token: {}", info.public_key_token);
        println!();
        common::display_outputs(info.outputs);
    })
}
