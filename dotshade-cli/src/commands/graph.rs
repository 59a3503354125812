use std::path::Path;

use anyhow::{bail, Context};
use dotshade::prelude::*;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct PackageInfo {
    package: String,
    dependencies: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SectionInfo {
    framework: String,
    packages: Vec<PackageInfo>,
}

pub fn run(
    path: &Path,
    framework: Option<&str>,
    package: Option<&str>,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let assets = JsonGraphLoader::new()
        .load(path)
        .with_context(|| format!("failed to load lock file: {}", path.display()))?;
    let package = package.map(PackageIdentity::parse).transpose()?;

    let mut names: Vec<&str> = assets.section_names().collect();
    names.sort_unstable();

    let mut sections = Vec::new();
    for name in names {
        if framework.is_some_and(|wanted| !same_section(&assets, name, wanted)) {
            continue;
        }
        let Some(section) = assets.section(name) else {
            continue;
        };
        sections.push(describe(name, section, package.as_ref()));
    }

    if let Some(wanted) = framework {
        if sections.is_empty() {
            bail!("lock file has no target for '{wanted}'");
        }
    }

    print_output(&sections, opts, |sections| {
        for section in sections {
            println!("{}", section.framework);
            if section.packages.is_empty() {
                println!("  (no matching packages)");
                continue;
            }

            let mut table = TabWriter::new(&[
                ("Package", Align::Left),
                ("Closure", Align::Right),
                ("Dependencies", Align::Left),
            ])
            .indent("  ");
            for info in &section.packages {
                table.row(vec![
                    info.package.clone(),
                    info.dependencies.len().to_string(),
                    info.dependencies.join(", "),
                ]);
            }
            table.print();
            println!();
        }
    })
}

fn same_section(assets: &AssetsFile, name: &str, wanted: &str) -> bool {
    // a short name also finds a moniker key and vice versa
    match (assets.section(name), assets.section(wanted)) {
        (Some(section), Some(found)) => std::ptr::eq(section, found),
        _ => false,
    }
}

fn describe(
    name: &str,
    section: &PackageGraphSection,
    filter: Option<&PackageIdentity>,
) -> SectionInfo {
    let packages = section
        .packages()
        .into_iter()
        .filter(|package| filter.map_or(true, |wanted| *package == wanted))
        .map(|package| {
            let mut dependencies: Vec<String> = section
                .dependencies(package)
                .into_iter()
                .flatten()
                .map(ToString::to_string)
                .collect();
            dependencies.sort_unstable_by_key(|dependency| dependency.to_ascii_lowercase());

            PackageInfo {
                package: package.to_string(),
                dependencies,
            }
        })
        .collect();

    SectionInfo {
        framework: name.to_string(),
        packages,
    }
}
