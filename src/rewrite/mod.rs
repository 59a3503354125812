//! Applying a shading plan to disk.
//!
//! The [`Rewriter`] builds a [`ShadeLookup`] from the complete plan first and then rewrites every
//! planned binary independently: rename, reference patches, friend declaration replacement and
//! a fresh strong-name signature. A failing binary does not stop the others; its error is
//! collected in the [`RewriteReport`]. Binaries already written stay in place.

mod edits;

pub use edits::ShadeLookup;

use std::{fs, path::PathBuf};

use log::{error, info};
use rayon::prelude::*;

use crate::{
    metadata::assemblyview::AssemblyView,
    shading::{BinaryDescriptor, ShadingPlan},
    strongname::StrongNameKey,
    Error, Result,
};

/// Outcome of a rewrite.
#[derive(Debug, Default)]
pub struct RewriteReport {
    /// Shaded paths written successfully
    pub written: Vec<PathBuf>,
    /// Original path and cause of every binary that failed
    pub errors: Vec<(PathBuf, Error)>,
}

impl RewriteReport {
    /// Returns true if every planned binary was written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Writes the shaded binaries of a plan, signed with one key.
pub struct Rewriter<'a> {
    key: &'a StrongNameKey,
    parallel: bool,
}

impl<'a> Rewriter<'a> {
    /// Create a rewriter signing with `key`.
    #[must_use]
    pub fn new(key: &'a StrongNameKey) -> Self {
        Rewriter {
            key,
            parallel: true,
        }
    }

    /// Write binaries in parallel (the default) or one after another.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Rewrite every binary of `plan`.
    pub fn rewrite(&self, plan: &ShadingPlan) -> RewriteReport {
        let lookup = ShadeLookup::new(plan, self.key.public_key_token());

        let outcomes: Vec<(&BinaryDescriptor, Result<()>)> = if self.parallel {
            plan.binaries()
                .par_iter()
                .map(|descriptor| (descriptor, self.rewrite_one(descriptor, &lookup)))
                .collect()
        } else {
            plan.iter()
                .map(|descriptor| (descriptor, self.rewrite_one(descriptor, &lookup)))
                .collect()
        };

        let mut report = RewriteReport::default();
        for (descriptor, outcome) in outcomes {
            match outcome {
                Ok(()) => report.written.push(descriptor.shaded_path.clone()),
                Err(cause) => {
                    error!(
                        "Failed to write assembly '{}': {}",
                        descriptor.shaded_path.display(),
                        cause
                    );
                    report.errors.push((
                        descriptor.original_path.clone(),
                        Error::Rewrite {
                            path: descriptor.original_path.clone(),
                            source: Box::new(cause),
                        },
                    ));
                }
            }
        }

        report
    }

    /// Rewrite a single planned binary against `lookup`.
    ///
    /// # Errors
    /// Returns an error if the original can not be read, the image can not be rewritten or
    /// signed, or the output can not be written.
    pub fn rewrite_one(&self, descriptor: &BinaryDescriptor, lookup: &ShadeLookup) -> Result<()> {
        let view = AssemblyView::from_file(&descriptor.original_path)?;
        let original = view.identity()?;

        info!(
            "Shading assembly {} => {}",
            descriptor.original_path.display(),
            descriptor.shaded_path.display()
        );
        info!(
            "  Name: {} => {}",
            original.display_name(),
            descriptor.shaded_identity.display_name()
        );

        let edits = lookup.edits(
            descriptor,
            &view.references()?,
            &view.internals_visible_to()?,
        );
        view.write_to_file(&descriptor.shaded_path, &edits, self.key)?;

        let symbols = descriptor.original_path.with_extension("pdb");
        if symbols.is_file() {
            fs::copy(&symbols, descriptor.shaded_path.with_extension("pdb"))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{
        shading::{BinaryKind, MetadataReader, AssemblyReader},
        strongname::verify_image,
        test::{test_key, ImageBuilder},
    };

    fn descriptor(original: &Path, shaded: &Path, kind: BinaryKind, rename: bool) -> BinaryDescriptor {
        let identity = MetadataReader.read(original).unwrap().identity;
        let name = if rename {
            crate::shading::shaded_name(&identity)
        } else {
            identity.name.clone()
        };
        BinaryDescriptor::new(
            original.to_path_buf(),
            identity,
            name,
            shaded.to_path_buf(),
            PathBuf::new(),
            kind,
            test_key(),
        )
    }

    #[test]
    fn rewrites_plan() {
        let key = test_key();
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("in/Lib.dll");
        let consumer = dir.path().join("in/Consumer.dll");
        fs::create_dir_all(lib.parent().unwrap()).unwrap();

        fs::write(
            &lib,
            ImageBuilder::new("Lib")
                .version(3, 1, 0, 0)
                .internals_visible_to("Consumer")
                .build(),
        )
        .unwrap();
        fs::write(dir.path().join("in/Lib.pdb"), b"symbols").unwrap();
        fs::write(
            &consumer,
            ImageBuilder::new("Consumer")
                .reference("Lib", (3, 1, 0, 0), None)
                .reference("Other", (1, 0, 0, 0), None)
                .build(),
        )
        .unwrap();

        let out = dir.path().join("out");
        let mut plan = ShadingPlan::new();
        plan.insert(descriptor(&lib, &out.join("Lib.3.1.0.0.dll"), BinaryKind::Package, true));
        plan.insert(descriptor(&consumer, &out.join("Consumer.dll"), BinaryKind::Dependent, false));

        for parallel in [false, true] {
            let report = Rewriter::new(key).with_parallel(parallel).rewrite(&plan);
            assert!(report.is_success(), "{:?}", report.errors);
            assert_eq!(report.written.len(), 2);
        }

        let shaded_lib = fs::read(out.join("Lib.3.1.0.0.dll")).unwrap();
        verify_image(&shaded_lib, key.public_key_blob()).unwrap();
        let view = AssemblyView::from_mem(shaded_lib).unwrap();
        assert_eq!(view.identity().unwrap().name, "Lib.3.1.0.0");
        assert_eq!(
            view.internals_visible_to().unwrap()[0].value,
            format!("Consumer, PublicKey={}", hex::encode(key.public_key_blob()))
        );
        assert_eq!(fs::read(out.join("Lib.3.1.0.0.pdb")).unwrap(), b"symbols");

        let view = AssemblyView::from_file(&out.join("Consumer.dll")).unwrap();
        let identity = view.identity().unwrap();
        assert_eq!(identity.name, "Consumer");
        assert_eq!(identity.public_key_token(), Some(key.public_key_token()));

        let references = view.references().unwrap();
        assert_eq!(references[0].name, "Lib.3.1.0.0");
        assert_eq!(references[0].public_key_token(), Some(key.public_key_token()));
        assert_eq!(references[1].name, "Other");
        assert_eq!(references[1].public_key_token(), None);
    }

    #[test]
    fn collects_failures() {
        let key = test_key();
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("Good.dll");
        let crowded = dir.path().join("Crowded.dll");
        fs::write(&good, ImageBuilder::new("Good").build()).unwrap();
        fs::write(&crowded, ImageBuilder::new("Crowded").crowded_headers().build()).unwrap();

        let mut plan = ShadingPlan::new();
        plan.insert(descriptor(&crowded, &dir.path().join("out/Crowded.dll"), BinaryKind::Dependent, false));
        plan.insert(descriptor(&good, &dir.path().join("out/Good.1.0.0.0.dll"), BinaryKind::Package, true));

        let mut missing = descriptor(&good, &dir.path().join("out/Missing.dll"), BinaryKind::Dependent, false);
        missing.original_path = dir.path().join("Missing.dll");
        missing.identity.name = "Missing".to_string();
        plan.insert(missing);

        let report = Rewriter::new(key).rewrite(&plan);

        assert!(!report.is_success());
        assert_eq!(report.written, vec![dir.path().join("out/Good.1.0.0.0.dll")]);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].0, crowded);
        assert!(matches!(
            &report.errors[0].1,
            Error::Rewrite { source, .. } if matches!(**source, Error::NotSupported(_))
        ));
        assert!(dir.path().join("out/Good.1.0.0.0.dll").is_file());
    }
}
