//! End-to-end shading of an on-disk package layout.
//!
//! A lock file, an extracted package folder and the consuming project's binaries are written to
//! a temporary directory; the run is then planned and rewritten exactly as the CLI does it.

#[allow(dead_code)]
#[path = "../src/test/image.rs"]
mod image;

use std::{
    fs,
    path::{Path, PathBuf},
};

use dotshade::{prelude::*, strongname::verify_image};
use image::ImageBuilder;

const LOCK_FILE: &str = r#"{
  "version": 3,
  "targets": {
    "net6.0": {
      "Contoso.Client/2.1.0": {
        "type": "package",
        "dependencies": { "Contoso.Core": "[1.0.0, )" }
      },
      "Contoso.Core/1.0.0": { "type": "package" },
      "Unrelated/3.0.0": { "type": "package" },
    }
  }
}"#;

struct Layout {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Layout {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        Layout { _dir: dir, root }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn write(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }
}

fn identity_of(path: &Path) -> AssemblyIdentity {
    AssemblyView::from_file(path).unwrap().identity().unwrap()
}

#[test]
fn shade_package_closure() -> Result<()> {
    let layout = Layout::new();
    let assets = layout.write("app/obj/project.assets.json", LOCK_FILE.as_bytes());

    let client = layout.write(
        "packages/contoso.client/2.1.0/lib/netstandard2.0/Contoso.Client.dll",
        &ImageBuilder::new("Contoso.Client")
            .version(2, 1, 0, 0)
            .reference("Contoso.Core", (1, 0, 0, 0), None)
            .build(),
    );
    let core = layout.write(
        "packages/contoso.core/1.0.0/lib/netstandard2.0/Contoso.Core.dll",
        &ImageBuilder::new("Contoso.Core")
            .internals_visible_to("Contoso.Core.Tests")
            .build(),
    );
    layout.write(
        "packages/contoso.core/1.0.0/lib/netstandard2.0/Contoso.Core.pdb",
        b"portable pdb",
    );
    layout.write(
        "packages/contoso.core/1.0.0/lib/netstandard2.0/de/Contoso.Core.resources.dll",
        &ImageBuilder::new("Contoso.Core.resources").culture("de").build(),
    );
    layout.write(
        "packages/contoso.core/1.0.0/lib/net45/Contoso.Core.Legacy.dll",
        &ImageBuilder::new("Contoso.Core.Legacy").build(),
    );
    layout.write(
        "packages/unrelated/3.0.0/lib/netstandard2.0/Unrelated.dll",
        &ImageBuilder::new("Unrelated").version(3, 0, 0, 0).build(),
    );

    let plugin = layout.write(
        "app/bin/App.Plugin.dll",
        &ImageBuilder::new("App.Plugin")
            .reference("Contoso.Core", (1, 0, 0, 0), None)
            .reference("Unrelated", (3, 0, 0, 0), None)
            .build(),
    );
    let tests = layout.write(
        "app/bin/Contoso.Core.Tests.dll",
        &ImageBuilder::new("Contoso.Core.Tests").build(),
    );
    let unrelated_user = layout.write(
        "app/bin/App.Other.dll",
        &ImageBuilder::new("App.Other")
            .reference("Unrelated", (3, 0, 0, 0), None)
            .build(),
    );

    let mut requests = vec![ShadeRequest::package("Contoso.Client", "2.1.0")];
    requests[0].shade_dependencies = Some("*".to_string());
    let references: Vec<ResolvedReference> = [&client, &core, &plugin, &tests, &unrelated_user]
        .into_iter()
        .map(ResolvedReference::new)
        .collect();

    let config = ShadeConfig::new("net6.0")
        .with_package_root(layout.path("packages"))
        .with_intermediate_output(layout.path("app/obj"));
    let cache = ShadingCache::new();
    let lock = cache.assets(&assets, &JsonGraphLoader::new())?;
    let key = cache.key(None, None)?;

    let resolver = FileSystemResolver::new(config.package_root());
    let planner = Planner::new(&config, &resolver, &MetadataReader).with_cache(&cache);
    let plan = planner.plan(&lock, &requests, &references, &key)?;

    let kinds: Vec<(String, BinaryKind)> = plan
        .iter()
        .map(|descriptor| (descriptor.shaded_identity.name.clone(), descriptor.kind))
        .collect();
    assert_eq!(plan.len(), 5, "{kinds:?}");
    for expected in [
        ("Contoso.Client.2.1.0.0", BinaryKind::Package),
        ("Contoso.Core.1.0.0.0", BinaryKind::Package),
        ("App.Plugin", BinaryKind::Dependent),
        ("Contoso.Core.Tests", BinaryKind::Friend),
        ("Contoso.Core.1.0.0.0.resources", BinaryKind::Satellite),
    ] {
        assert!(
            kinds.contains(&(expected.0.to_string(), expected.1)),
            "{expected:?} missing from {kinds:?}"
        );
    }

    let report = Rewriter::new(&key).rewrite(&plan);
    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.written.len(), 5);

    let shaded = layout.path("app/obj/ShadedAssemblies");
    let token = key.public_key_token();

    // renamed package binaries, signed with the new key
    let shaded_client = shaded.join("Contoso.Client.2.1.0.0.dll");
    verify_image(&fs::read(&shaded_client)?, key.public_key_blob())?;
    let view = AssemblyView::from_file(&shaded_client)?;
    assert_eq!(view.identity()?.name, "Contoso.Client.2.1.0.0");
    assert_eq!(view.identity()?.version.to_string(), "2.1.0.0");
    let client_references = view.references()?;
    assert_eq!(client_references[0].name, "Contoso.Core.1.0.0.0");
    assert_eq!(client_references[0].public_key_token(), Some(token));

    let shaded_core = shaded.join("Contoso.Core.1.0.0.0.dll");
    let view = AssemblyView::from_file(&shaded_core)?;
    assert_eq!(
        view.internals_visible_to()?[0].value,
        format!(
            "Contoso.Core.Tests, PublicKey={}",
            hex::encode(key.public_key_blob())
        )
    );
    assert_eq!(fs::read(shaded.join("Contoso.Core.1.0.0.0.pdb"))?, b"portable pdb");

    // dependents and friends keep their names and are only re-keyed
    let view = AssemblyView::from_file(&shaded.join("App.Plugin.dll"))?;
    assert_eq!(view.identity()?.name, "App.Plugin");
    assert_eq!(view.identity()?.public_key_token(), Some(token));
    let plugin_references = view.references()?;
    assert_eq!(plugin_references[0].name, "Contoso.Core.1.0.0.0");
    assert_eq!(plugin_references[1].name, "Unrelated");
    assert_eq!(plugin_references[1].public_key_token(), None);

    let friend = identity_of(&shaded.join("Contoso.Core.Tests.dll"));
    assert_eq!(friend.public_key_token(), Some(token));

    // satellites follow their owner's name and keep the culture folder
    let satellite = identity_of(&shaded.join("de/Contoso.Core.1.0.0.0.resources.dll"));
    assert_eq!(satellite.name, "Contoso.Core.1.0.0.0.resources");
    assert_eq!(satellite.culture.as_deref(), Some("de"));

    assert!(!shaded.join("Unrelated.3.0.0.0.dll").exists());
    assert!(!shaded.join("App.Other.dll").exists());
    assert!(!shaded.join("Contoso.Core.Legacy.dll").exists());

    // the original binaries are untouched
    assert_eq!(identity_of(&core).name, "Contoso.Core");
    assert_eq!(identity_of(&core).public_key_token(), None);

    let outputs = HostOutputs::compute(&plan, &references, &MetadataReader);
    assert_eq!(outputs.assemblies_to_shade.len(), 5);
    assert_eq!(outputs.references_to_remove.len(), 4);
    assert!(outputs
        .references_to_remove
        .iter()
        .all(|item| item.path != unrelated_user));
    assert!(outputs
        .references_to_add
        .iter()
        .any(|item| item.hint_path.as_deref() == Some(shaded_client.as_path())));
    assert!(outputs.project_references_to_add.is_empty());

    Ok(())
}

#[test]
fn missing_target_plans_nothing() -> Result<()> {
    let layout = Layout::new();
    let assets = layout.write("obj/project.assets.json", LOCK_FILE.as_bytes());

    let config = ShadeConfig::new("net472").with_package_root(layout.path("packages"));
    let lock = JsonGraphLoader::new().load(&assets)?;
    let key = StrongNameKey::generate()?;

    let resolver = FileSystemResolver::new(config.package_root());
    let plan = Planner::new(&config, &resolver, &MetadataReader).plan(
        &lock,
        &[ShadeRequest::package("Contoso.Client", "2.1.0")],
        &[],
        &key,
    )?;
    assert!(plan.is_empty());
    assert!(Rewriter::new(&key).rewrite(&plan).is_success());

    Ok(())
}
