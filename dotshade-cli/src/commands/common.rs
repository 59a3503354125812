use std::sync::Arc;

use anyhow::Context;
use dotshade::prelude::*;

use crate::{
    app::ShadeArgs,
    output::{file_display_name, Align, TabWriter},
};

/// A planned shading run.
pub struct Session {
    pub config: ShadeConfig,
    pub key: Arc<StrongNameKey>,
    pub plan: ShadingPlan,
    pub outputs: HostOutputs,
}

/// Translate the command line into a configuration, without central versions.
pub fn config_from_args(args: &ShadeArgs) -> ShadeConfig {
    let mut config = ShadeConfig::new(args.framework.as_str())
        .with_package_root(&args.packages)
        .with_intermediate_output(&args.out)
        .with_parallel(!args.sequential);

    if let Some(moniker) = &args.moniker {
        config = config.with_moniker(moniker.as_str());
    }
    for fallback in &args.fallback {
        config = config.with_fallback(fallback.as_str());
    }
    if let Some(key) = &args.key {
        config = config.with_key_file(key, args.password.clone());
    }

    config
}

/// Load the inputs named by `args` and plan the run.
pub fn plan(args: &ShadeArgs) -> anyhow::Result<Session> {
    let cache = ShadingCache::new();

    let document = RequestDocument::load(&args.request)
        .with_context(|| format!("failed to load request: {}", args.request.display()))?;
    let config = document.apply_central_versions(config_from_args(args));

    let assets = cache
        .assets(&args.assets, &JsonGraphLoader::new())
        .with_context(|| format!("failed to load lock file: {}", args.assets.display()))?;
    let key = cache
        .key(config.key_file.as_deref(), config.key_password.as_deref())
        .context("failed to obtain signing key")?;

    let resolver = FileSystemResolver::new(config.package_root());
    let planner = Planner::new(&config, &resolver, &MetadataReader).with_cache(&cache);
    let plan = planner.plan(&assets, &document.package_references, &document.references, &key)?;
    let outputs = HostOutputs::compute(&plan, &document.references, &MetadataReader);

    Ok(Session {
        config,
        key,
        plan,
        outputs,
    })
}

/// Print the planned binaries and the reference changes for the host.
pub fn display_outputs(outputs: &HostOutputs) {
    if outputs.assemblies_to_shade.is_empty() {
        println!("Nothing to shade.");
        return;
    }

    println!("Assemblies to shade:");
    let mut table = TabWriter::new(&[
        ("Kind", Align::Left),
        ("Assembly", Align::Left),
        ("Shaded", Align::Left),
        ("Output", Align::Left),
    ])
    .indent("  ");
    for assembly in &outputs.assemblies_to_shade {
        table.row(vec![
            assembly.kind.to_string(),
            simple_name(&assembly.assembly_name).to_string(),
            simple_name(&assembly.shaded_assembly_name).to_string(),
            assembly.shaded_path.display().to_string(),
        ]);
    }
    table.print();

    let changes = [
        ("References to remove", &outputs.references_to_remove),
        ("References to add", &outputs.references_to_add),
        ("Project references to remove", &outputs.project_references_to_remove),
        ("Project references to add", &outputs.project_references_to_add),
    ];
    for (title, items) in changes {
        if items.is_empty() {
            continue;
        }
        println!();
        println!("{title}:");
        for item in items {
            match &item.original_path {
                Some(original) => println!(
                    "  {} (replaces {})",
                    item.path.display(),
                    file_display_name(original)
                ),
                None => println!("  {}", item.path.display()),
            }
        }
    }
}

fn simple_name(display_name: &str) -> &str {
    display_name
        .split_once(',')
        .map_or(display_name, |(name, _)| name)
}
